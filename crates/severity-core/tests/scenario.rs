//! End-to-end properties of a trained ensemble on the 200-record,
//! ten-cluster corpus.

use std::sync::OnceLock;

use severity_core::{ModelKind, SeverityConfig, TrainedEnsemble};
use severity_test_utils::{clustered_corpus, record_from_values, scenario_corpus, ClusteredCorpus};

fn corpus() -> &'static ClusteredCorpus {
    static CORPUS: OnceLock<ClusteredCorpus> = OnceLock::new();
    CORPUS.get_or_init(scenario_corpus)
}

fn ensemble() -> &'static TrainedEnsemble {
    static ENSEMBLE: OnceLock<TrainedEnsemble> = OnceLock::new();
    ENSEMBLE.get_or_init(|| {
        TrainedEnsemble::train(&SeverityConfig::default(), &corpus().records)
            .expect("scenario corpus must train")
    })
}

// ============================================================================
// Mapping properties
// ============================================================================

#[test]
fn test_every_model_ranks_ten_groups() {
    let ensemble = ensemble();
    assert_eq!(
        ensemble.model_names(),
        vec!["kmeans", "hierarchical", "gmm", "spectral", "birch", "minibatch"]
    );
    assert!(ensemble.bank().excluded().is_empty());

    for mapping in ensemble.mappings() {
        let mut ranks: Vec<usize> = mapping.groups().iter().map(|g| g.rank).collect();
        ranks.sort_unstable();
        assert_eq!(ranks, (1..=10).collect::<Vec<_>>(), "model {}", mapping.model());

        assert!(
            mapping
                .groups()
                .windows(2)
                .all(|w| w[0].severity_index < w[1].severity_index),
            "model {} severity index not strictly increasing",
            mapping.model()
        );
        assert_eq!(mapping.groups().iter().map(|g| g.size).sum::<usize>(), 200);
    }
    println!("[PASS] test_every_model_ranks_ten_groups - 6 models x 10 ranks");
}

#[test]
fn test_rank_order_matches_severity_order() {
    for mapping in ensemble().mappings() {
        for a in mapping.groups() {
            for b in mapping.groups() {
                if a.severity_index < b.severity_index {
                    assert!(a.rank < b.rank, "model {}", mapping.model());
                }
            }
        }
    }
}

// ============================================================================
// Scoring
// ============================================================================

#[test]
fn test_most_severe_centroid_scores_near_top() {
    let corpus = corpus();
    let ensemble = ensemble();
    let top = corpus.n_clusters() - 1;

    let score = ensemble
        .score_values(&corpus.sample_centroid(top))
        .unwrap();
    assert!((score - 10.0).abs() <= 0.5, "score {}", score);

    let score = ensemble.score_one(&corpus.center_record(top)).unwrap();
    assert!((score - 10.0).abs() <= 0.5, "score {}", score);
    println!("[PASS] test_most_severe_centroid_scores_near_top - {}", ensemble.display(score));
}

#[test]
fn test_scores_increase_with_cluster_severity() {
    let corpus = corpus();
    let ensemble = ensemble();

    let scores: Vec<f64> = (0..corpus.n_clusters())
        .map(|c| ensemble.score_one(&corpus.center_record(c)).unwrap())
        .collect();
    for (c, score) in scores.iter().enumerate() {
        assert!((score - (c + 1) as f64).abs() <= 0.5, "cluster {} scored {}", c, score);
    }
    assert!(scores.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_scores_stay_within_scale_bounds() {
    let ensemble = ensemble();
    // Training records, wild extrapolations and points between clusters.
    let mut queries = corpus().records.clone();
    for (i, v) in [-1e4, -50.0, 0.0, 45.0, 1e4].iter().enumerate() {
        queries.push(record_from_values(format!("query-{}", i), &[*v; 10]));
    }

    for result in ensemble.score(&queries) {
        let score = result.unwrap();
        assert!((1.0..=10.0).contains(&score), "score {} out of range", score);
    }
}

#[test]
fn test_explain_votes_match_score() {
    let corpus = corpus();
    let ensemble = ensemble();
    let breakdown = ensemble.explain(&corpus.records[0]).unwrap();

    assert_eq!(breakdown.votes.len(), 6);
    let mean = breakdown.votes.iter().map(|v| v.rank as f64).sum::<f64>() / 6.0;
    assert_eq!(breakdown.score, mean);
    // Least severe cluster.
    assert!(breakdown.votes.iter().all(|v| v.rank == 1));

    let fallback: Vec<ModelKind> = breakdown
        .votes
        .iter()
        .filter(|v| !v.native_predict)
        .map(|v| v.model)
        .collect();
    assert_eq!(fallback, vec![ModelKind::Hierarchical, ModelKind::Spectral]);
}

// ============================================================================
// Fallback consistency
// ============================================================================

#[test]
fn test_fallback_reproduces_training_labels() {
    let ensemble = ensemble();
    let data = ensemble.normalizer().transform(&corpus().records).unwrap();

    for kind in [ModelKind::Hierarchical, ModelKind::Spectral] {
        let model = ensemble.bank().get(kind).unwrap();
        assert!(!model.native_predict());
        assert_eq!(model.assign_new(&data).unwrap(), model.assign_existing(), "model {}", kind);
    }
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn test_independent_trainings_agree() {
    let corpus = clustered_corpus(4, 12, 99);
    let mut config = SeverityConfig::default();
    config.training.n_groups = 4;

    let a = TrainedEnsemble::train(&config, &corpus.records).unwrap();
    let b = TrainedEnsemble::train(&config, &corpus.records).unwrap();

    assert_ne!(a.id(), b.id());
    assert_eq!(a.mappings(), b.mappings());

    let queries: Vec<_> = (0..4).map(|c| corpus.center_record(c)).collect();
    let sa: Vec<f64> = a.score(&queries).into_iter().map(|r| r.unwrap()).collect();
    let sb: Vec<f64> = b.score(&queries).into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(sa, sb);
    println!("[PASS] test_independent_trainings_agree - scores={:?}", sa);
}

#[test]
fn test_parallel_training_matches_sequential() {
    let corpus = clustered_corpus(4, 12, 5);
    let mut config = SeverityConfig::default();
    config.training.n_groups = 4;
    let sequential = TrainedEnsemble::train(&config, &corpus.records).unwrap();

    config.training.parallel = true;
    let parallel = TrainedEnsemble::train(&config, &corpus.records).unwrap();

    assert_eq!(sequential.model_names(), parallel.model_names());
    assert_eq!(sequential.mappings(), parallel.mappings());
    let q = corpus.center_record(2);
    assert_eq!(sequential.score_one(&q).unwrap(), parallel.score_one(&q).unwrap());
}

#[test]
fn test_ensemble_is_shareable_across_threads() {
    let ensemble = ensemble();
    let corpus = corpus();
    let expected = ensemble.score_one(&corpus.records[42]).unwrap();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| ensemble.score_one(&corpus.records[42]).unwrap()))
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
    });
}
