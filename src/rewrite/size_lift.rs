use crate::random_graph::ops::{BroadcastToOp, SampleOp, infer_broadcast_shape};
use crate::random_graph::{GraphPatch, GraphRead, NodeId, RandomGraph, Replacement};
use crate::rewrite::{RewriteError, empty_size};

/// Drop an explicit size from a sampling node, moving the shape information
/// into the parameters.
///
/// When the parameter batch shapes already broadcast to exactly the constant
/// size the size is simply removed; otherwise each parameter is first
/// broadcast to `size ++ core shape`. Both outputs of the node are replaced.
pub fn local_rv_size_lift(graph: &RandomGraph, node: NodeId) -> Result<Option<Replacement>, RewriteError> {
    let Some(rv) = graph.node(node) else {
        return Ok(None);
    };
    let Some(rv_op) = rv.op.as_sample() else {
        return Ok(None);
    };
    let (rng, size, params) = rv_op.split_inputs(&rv.inputs)?;
    let Some(size_entries) = graph.static_int_entries(size) else {
        return Ok(None);
    };
    if size_entries.is_empty() {
        return Ok(None);
    }

    let mut batch_shapes = vec![];
    for (param, nd) in params.iter().zip(rv_op.ndims_params()) {
        let t = graph.tensor_type(*param)?;
        batch_shapes.push(t.shape[..t.rank() - nd].to_vec());
    }
    let implied = infer_broadcast_shape(&batch_shapes);
    let already_implied = match implied {
        Some(batch) => {
            batch.len() == size_entries.len()
                && batch
                    .iter()
                    .zip(&size_entries)
                    .all(|(b, s)| matches!((b, s), (Some(b), Some(s)) if *b as i64 == *s))
        }
        None => false,
    };

    let mut patch = GraphPatch::new(graph);
    let new_params = if already_implied {
        params.to_vec()
    } else {
        params
            .iter()
            .zip(rv_op.ndims_params())
            .map(|(param, nd)| BroadcastToOp::apply(&mut patch, *param, size, *nd))
            .collect::<Result<Vec<_>, _>>()?
    };
    let empty = empty_size(&mut patch);
    let (rng_out, sample) = SampleOp::apply(&mut patch, rv_op.dist, rng, empty, new_params)?;
    log::debug!(
        "Lifted size of {} node {node} into its parameters (broadcast: {})",
        rv_op.dist,
        !already_implied
    );
    Ok(Some(patch.into_replacement(vec![rng_out, sample], vec![])))
}
