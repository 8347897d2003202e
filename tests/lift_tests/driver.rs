use crate::lift_tests::{RvGraph, eval_graph, init_logging, output_op_name};
use randgraph::config::RewriteConfig;
use randgraph::random_graph::ops::{DimShuffleOp, Distribution, ShuffleAxis};
use randgraph::random_graph::{NodeId, RandomGraph, SpliceOutcome};
use randgraph::rewrite::{EquilibriumOutcome, EquilibriumRewriter, LiftRewrite, RewriteObserver};
use std::io::Write;

#[derive(Default)]
struct Recorder {
    rewrites: Vec<String>,
    passes: Vec<(usize, usize)>,
}

impl RewriteObserver for Recorder {
    fn on_rewrite(&mut self, rule: &str, _node: NodeId, outcome: &SpliceOutcome) {
        assert!(!outcome.inserted.is_empty());
        self.rewrites.push(rule.to_string());
    }

    fn on_pass_complete(&mut self, pass: usize, firings: usize) {
        self.passes.push((pass, firings));
    }
}

/// `normal([3, 7], 1e-6, size=(4, 2)).dimshuffle(1, 0)`
fn shuffled_sized_normal() -> RvGraph {
    let mut rv = RvGraph::new();
    let mean = rv.param("mean", vec![3.0, 7.0], &[2]);
    let std = rv.param("std", vec![1e-6], &[]);
    let x = rv.sample(Distribution::Normal, &[4, 2], vec![mean, std]);
    let order = ShuffleAxis::parse_order("1, 0").unwrap();
    let out = DimShuffleOp::apply(&mut rv.graph, x, order).unwrap();
    rv.graph.set_outputs(vec![out]).unwrap();
    rv
}

#[test]
fn test_all_rules_reach_equilibrium() {
    init_logging();
    let rv = shuffled_sized_normal();
    let mut graph = rv.graph.clone();
    let mut recorder = Recorder::default();
    let report = EquilibriumRewriter::from_config(&RewriteConfig::default())
        .apply_with_observer(&mut graph, &mut recorder)
        .unwrap();

    assert_eq!(report.outcome, EquilibriumOutcome::Quiescent);
    assert_eq!(report.firings, 2);
    assert_eq!(report.per_rule["rv_size_lift"], 1);
    assert_eq!(report.per_rule["dimshuffle_rv_lift"], 1);
    assert_eq!(recorder.rewrites, vec!["rv_size_lift", "dimshuffle_rv_lift"]);
    assert_eq!(recorder.passes.len(), report.passes);
    assert_eq!(recorder.passes.last(), Some(&(report.passes, 2)));
    assert_eq!(output_op_name(&graph).unwrap(), "Sample(normal)");

    let values = eval_graph(&graph, &rv.values);
    assert_eq!(values[0].shape(), vec![2, 4]);
    for (i, row) in values[0].to_f64_vec().unwrap().chunks(4).enumerate() {
        let mean = [3.0, 7.0][i];
        assert!(row.iter().all(|v| (v - mean).abs() < 1e-4));
    }
}

#[test]
fn test_rerun_is_a_no_op() {
    init_logging();
    let rv = shuffled_sized_normal();
    let mut graph = rv.graph.clone();
    let rewriter = EquilibriumRewriter::from_config(&RewriteConfig::default());
    rewriter.apply(&mut graph).unwrap();
    let node_ids = graph.node_ids();
    let report = rewriter.apply(&mut graph).unwrap();
    assert_eq!(report.firings, 0);
    assert_eq!(report.passes, 1);
    assert_eq!(graph.node_ids(), node_ids);
}

#[test]
fn test_budget_exhaustion_leaves_valid_graph() {
    init_logging();
    let rv = shuffled_sized_normal();
    let mut graph: RandomGraph = rv.graph.clone();
    // Two nodes, so a ratio of 0.5 allows exactly one firing.
    assert_eq!(graph.num_nodes(), 2);
    let report = EquilibriumRewriter::new(
        vec![LiftRewrite::RvSizeLift, LiftRewrite::DimshuffleRvLift],
        0.5,
    )
    .apply(&mut graph)
    .unwrap();
    assert_eq!(report.outcome, EquilibriumOutcome::BudgetExhausted);
    assert_eq!(report.firings, 1);
    graph.validate().unwrap();
    assert!(output_op_name(&graph).unwrap().starts_with("DimShuffle"));
    assert_eq!(eval_graph(&graph, &rv.values)[0].shape(), vec![2, 4]);
}

#[test]
fn test_config_file_selects_rules() {
    init_logging();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"rules": ["dimshuffle_rv_lift"], "max_use_ratio": 10}}"#).unwrap();
    let config = RewriteConfig::from_path(file.path()).unwrap();
    assert_eq!(config.rules, vec![LiftRewrite::DimshuffleRvLift]);

    let rv = shuffled_sized_normal();
    let mut graph = rv.graph.clone();
    let report = EquilibriumRewriter::from_config(&config).apply(&mut graph).unwrap();
    assert_eq!(report.firings, 1);
    assert!(!report.per_rule.contains_key("rv_size_lift"));
    assert_eq!(output_op_name(&graph).unwrap(), "Sample(normal)");
}

#[test]
fn test_config_file_missing() {
    let dir = tempfile::tempdir().unwrap();
    let res = RewriteConfig::from_path(dir.path().join("rewrites.json"));
    assert!(matches!(res, Err(randgraph::ConfigError::Io(_))));
}
