use crate::random_graph::{NodeId, SpliceOutcome};

/// Instrumentation hooks for the equilibrium driver.
pub trait RewriteObserver {
    fn on_rewrite(&mut self, rule: &str, node: NodeId, outcome: &SpliceOutcome);
    fn on_pass_complete(&mut self, pass: usize, firings: usize);
}

impl RewriteObserver for () {
    fn on_rewrite(&mut self, _rule: &str, _node: NodeId, _outcome: &SpliceOutcome) {}
    fn on_pass_complete(&mut self, _pass: usize, _firings: usize) {}
}
