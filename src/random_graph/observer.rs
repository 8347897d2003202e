use crate::random_graph::eval::RuntimeValue;
use crate::random_graph::{NodeId, ValueId};
use std::time::Instant;

pub trait GraphEvalObserver {
    fn on_value_assigned(&mut self, value: ValueId, runtime_value: &RuntimeValue);
    fn on_node_executed(&mut self, node: NodeId, start: Instant, end: Instant);
}

impl GraphEvalObserver for () {
    fn on_value_assigned(&mut self, _value: ValueId, _runtime_value: &RuntimeValue) {}
    fn on_node_executed(&mut self, _node: NodeId, _start: Instant, _end: Instant) {}
}
