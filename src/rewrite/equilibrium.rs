use crate::config::RewriteConfig;
use crate::random_graph::{NodeId, RandomGraph};
use crate::rewrite::observer::RewriteObserver;
use crate::rewrite::{LiftRewrite, LocalRewrite, RewriteError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EquilibriumOutcome {
    /// A full pass fired no rule.
    Quiescent,
    /// The firing budget ran out first. The graph is still well formed.
    BudgetExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquilibriumReport {
    pub outcome: EquilibriumOutcome,
    pub passes: usize,
    pub firings: usize,
    pub per_rule: BTreeMap<String, usize>,
}

/// Applies a set of local rewrites until none of them fires.
///
/// Each pass visits the nodes in topological order. After a firing, the
/// nodes the splice inserted or rewired are queued again within the same
/// pass. Total firings are capped at `max_use_ratio` times the initial node
/// count.
pub struct EquilibriumRewriter<R: LocalRewrite> {
    rules: Vec<R>,
    max_use_ratio: f64,
}

impl EquilibriumRewriter<LiftRewrite> {
    pub fn from_config(config: &RewriteConfig) -> Self {
        Self::new(config.rules.clone(), config.max_use_ratio)
    }
}

impl<R: LocalRewrite> EquilibriumRewriter<R> {
    pub fn new(rules: Vec<R>, max_use_ratio: f64) -> Self {
        Self { rules, max_use_ratio }
    }

    pub fn apply(&self, graph: &mut RandomGraph) -> Result<EquilibriumReport, RewriteError> {
        self.apply_with_observer(graph, &mut ())
    }

    pub fn apply_with_observer<O: RewriteObserver>(
        &self,
        graph: &mut RandomGraph,
        observer: &mut O,
    ) -> Result<EquilibriumReport, RewriteError> {
        let budget = (self.max_use_ratio * graph.num_nodes() as f64).ceil().max(0.0) as usize;
        let mut report = EquilibriumReport {
            outcome: EquilibriumOutcome::Quiescent,
            passes: 0,
            firings: 0,
            per_rule: BTreeMap::new(),
        };

        loop {
            report.passes += 1;
            let mut fired = false;
            let mut worklist: VecDeque<NodeId> = graph.toposort()?.into();
            let mut queued: HashSet<NodeId> = worklist.iter().copied().collect();

            while let Some(node) = worklist.pop_front() {
                queued.remove(&node);
                if !graph.contains_node(node) {
                    continue;
                }
                for rule in &self.rules {
                    let Some(replacement) = rule.transform(graph, node)? else {
                        continue;
                    };
                    if report.firings >= budget {
                        log::warn!(
                            "Rewrite budget of {budget} firings exhausted after {} passes",
                            report.passes
                        );
                        report.outcome = EquilibriumOutcome::BudgetExhausted;
                        return Ok(report);
                    }
                    let invalid = |source| RewriteError::InvalidReplacement {
                        rule: rule.name(),
                        node,
                        source,
                    };
                    let outcome = graph.splice(node, replacement).map_err(invalid)?;
                    graph.validate().map_err(invalid)?;

                    report.firings += 1;
                    *report.per_rule.entry(rule.name()).or_default() += 1;
                    fired = true;
                    log::debug!(
                        "{} fired on {node}: {} nodes inserted, {} rewired",
                        rule.name(),
                        outcome.inserted.len(),
                        outcome.touched.len()
                    );
                    observer.on_rewrite(&rule.name(), node, &outcome);
                    for n in outcome.inserted.iter().chain(&outcome.touched) {
                        if queued.insert(*n) {
                            worklist.push_back(*n);
                        }
                    }
                    break;
                }
            }

            observer.on_pass_complete(report.passes, report.firings);
            if !fired {
                break;
            }
        }

        log::info!(
            "Rewrites reached equilibrium after {} passes with {} firings",
            report.passes,
            report.firings
        );
        Ok(report)
    }
}
