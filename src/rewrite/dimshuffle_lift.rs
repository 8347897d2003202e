use crate::random_graph::ops::{DimShuffleOp, Operation, SampleOp, ShuffleAxis};
use crate::random_graph::{GraphBuild, GraphError, GraphPatch, GraphRead, NodeId, RandomGraph, Replacement};
use crate::rewrite::usage::detach_shape_clients;
use crate::rewrite::{LiftSite, RewriteError, RvUsage, build_size, rv_usage, size_entry_values};

/// Lift `dimshuffle(rv(params, size))` to `rv(dimshuffle(params), dimshuffle(size))`.
///
/// Support axes must stay trailing and in order. Each parameter is
/// right-aligned against the batch axes of the sample; axes it lacks become
/// broadcast entries, and its own core axes are appended unchanged. An
/// explicit size is permuted along, with a broadcast entry becoming 1.
pub fn local_dimshuffle_rv_lift(graph: &RandomGraph, node: NodeId) -> Result<Option<Replacement>, RewriteError> {
    let Some(ds) = graph.node(node) else {
        return Ok(None);
    };
    let Some(ds_op) = ds.op.as_dimshuffle() else {
        return Ok(None);
    };
    let Some(x) = ds.inputs.first().copied() else {
        return Ok(None);
    };
    let Some(site) = LiftSite::of_sample(graph, x)? else {
        return Ok(None);
    };

    let rank = graph.tensor_type(x)?.rank();
    let ndim_supp = site.rv_op.ndim_supp();
    let batch_rank = rank - ndim_supp;
    let order = &ds_op.new_order;
    if order.len() < ndim_supp {
        log::trace!("{node}: {} drops support axes", ds_op.get_name());
        return Ok(None);
    }
    let (batch_order, support_order) = order.split_at(order.len() - ndim_supp);
    let support_kept = support_order
        .iter()
        .enumerate()
        .all(|(i, a)| *a == ShuffleAxis::Axis(batch_rank + i));
    let support_mixed = batch_order
        .iter()
        .any(|a| a.axis().is_some_and(|a| a >= batch_rank));
    if !support_kept || support_mixed {
        log::trace!("{node}: {} disturbs the support axes of {}", ds_op.get_name(), site.rv_op.dist);
        return Ok(None);
    }

    let shape_clients = match rv_usage(graph, site.rv_node, &[node])? {
        RvUsage::Used(reason) => {
            log::trace!("{node}: not lifting, {reason}");
            return Ok(None);
        }
        RvUsage::Unused { shape_clients } => shape_clients,
    };

    let mut param_types = vec![];
    for (param, nd) in site.params.iter().zip(site.rv_op.ndims_params()) {
        let t = graph.tensor_type(*param)?;
        let param_batch = t.rank() - nd;
        if param_batch > batch_rank {
            return Ok(None);
        }
        param_types.push((*param, batch_rank - param_batch, t));
    }

    // Leading axes that only the size covers must keep their place ahead of
    // the parameter axes.
    let size_only = param_types.iter().map(|(_, missing, _)| *missing).min().unwrap_or(batch_rank);
    let mut seen_param_axis = false;
    for axis in batch_order.iter().filter_map(|a| a.axis()) {
        if axis >= size_only {
            seen_param_axis = true;
        } else if seen_param_axis {
            log::trace!("{node}: {} moves size-only axis {axis} past parameter axes", ds_op.get_name());
            return Ok(None);
        }
    }

    let dropped: Vec<usize> = (0..batch_rank)
        .filter(|a| !batch_order.contains(&ShuffleAxis::Axis(*a)))
        .collect();
    let mut param_orders = vec![];
    for (param, missing, t) in param_types {
        if let Some(axis) = dropped.iter().find(|a| **a >= missing && !t.is_broadcastable(**a - missing)) {
            log::trace!("{node}: parameter {param} cannot drop axis {}", axis - missing);
            return Ok(None);
        }
        let mut param_order: Vec<ShuffleAxis> = batch_order
            .iter()
            .map(|entry| match entry {
                ShuffleAxis::Axis(a) if *a >= missing => ShuffleAxis::Axis(a - missing),
                _ => ShuffleAxis::Broadcast,
            })
            .collect();
        param_order.extend((batch_rank - missing..t.rank()).map(ShuffleAxis::Axis));
        param_orders.push((param, DimShuffleOp::new(param_order), t.rank()));
    }

    let mut patch = GraphPatch::new(graph);
    let mut new_params = vec![];
    for (param, op, param_rank) in param_orders {
        if op.is_identity(param_rank) {
            new_params.push(param);
        } else {
            new_params.push(DimShuffleOp::apply(&mut patch, param, op.new_order)?);
        }
    }

    let explicit_size = graph.static_int_entries(site.size).is_some_and(|e| !e.is_empty());
    let new_size = if explicit_size {
        let entries = size_entry_values(&mut patch, site.size)?;
        let mut new_entries = vec![];
        for entry in batch_order {
            match entry {
                ShuffleAxis::Axis(a) => new_entries.push(*entries.get(*a).ok_or_else(|| {
                    GraphError::InvalidInput("size".to_string(), format!("size has no entry for axis {a}"))
                })?),
                ShuffleAxis::Broadcast => new_entries.push(patch.int_constant(1)),
            }
        }
        build_size(&mut patch, new_entries)?
    } else {
        site.size
    };

    let (_, new_sample) = SampleOp::apply(&mut patch, site.rv_op.dist, site.rng, new_size, new_params)?;
    let detached = detach_shape_clients(&mut patch, site.sample, &shape_clients)?;
    log::debug!(
        "Lifted {} through {} node {}",
        ds_op.get_name(),
        site.rv_op.dist,
        site.rv_node
    );
    Ok(Some(patch.into_replacement(vec![new_sample], detached)))
}
