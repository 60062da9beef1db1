//! Clustering algorithms behind the model bank.
//!
//! Every algorithm is fitted once on the standardized corpus with its own
//! seeded RNG and implements [`ClusterModel`]. Points are `Vec<f64>` rows;
//! labels are opaque `usize` values.
//!
//! | model          | type               | native predict |
//! |----------------|--------------------|----------------|
//! | `kmeans`       | [`KMeans`]         | yes            |
//! | `hierarchical` | [`Agglomerative`]  | no             |
//! | `gmm`          | [`GaussianMixture`]| yes            |
//! | `spectral`     | [`Spectral`]       | no             |
//! | `birch`        | [`Birch`]          | yes            |
//! | `minibatch`    | [`MiniBatchKMeans`]| yes            |

pub mod agglomerative;
pub mod birch;
pub mod centroid;
pub mod error;
pub mod gmm;
pub mod kmeans;
pub mod linalg;
pub mod minibatch;
pub mod model;
pub mod spectral;

pub use agglomerative::{Agglomerative, HierarchicalParams, Merge};
pub use birch::{Birch, BirchParams, CfTree, ClusteringFeature};
pub use centroid::{nearest_index, squared_euclidean, GroupCentroid, GroupCentroids};
pub use error::{ClusterError, ClusterResult};
pub use gmm::{GaussianMixture, GmmParams};
pub use kmeans::{KMeans, KMeansParams};
pub use minibatch::{MiniBatchKMeans, MiniBatchParams};
pub use model::{ClusterModel, ModelKind};
pub use spectral::{Spectral, SpectralParams};
