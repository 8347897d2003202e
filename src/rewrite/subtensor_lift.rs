use crate::dtype::DType;
use crate::numeric_tensor::slice_length;
use crate::random_graph::ops::{Index, SampleOp, SliceLengthOp, SubtensorOp};
use crate::random_graph::{GraphBuild, GraphError, GraphPatch, GraphRead, NodeId, RandomGraph, Replacement, ValueId};
use crate::rewrite::usage::detach_shape_clients;
use crate::rewrite::{LiftSite, RewriteError, RvUsage, build_size, rv_usage, size_entry_values};
use std::collections::HashSet;

/// Lift `rv(params, size)[idx]` to `rv(params[idx'], size')`.
///
/// Only batch axes may be indexed; indices on support axes must be full
/// slices. Parameters are right-aligned against the batch axes. A parameter
/// axis of static length 1 is indexed with 0 for a scalar index and left whole
/// otherwise, unless the size is implicit and every parameter broadcasts along
/// that axis. An explicit size is updated with the length of each index.
pub fn local_subtensor_rv_lift(graph: &RandomGraph, node: NodeId) -> Result<Option<Replacement>, RewriteError> {
    let Some(st) = graph.node(node) else {
        return Ok(None);
    };
    let Some(st_op) = st.op.as_subtensor() else {
        return Ok(None);
    };
    let Some((&x, index_inputs)) = st.inputs.split_first() else {
        return Ok(None);
    };
    let Some(site) = LiftSite::of_sample(graph, x)? else {
        return Ok(None);
    };

    let rank = graph.tensor_type(x)?.rank();
    let batch_rank = rank - site.rv_op.ndim_supp();
    let mut indices = st_op.resolve(index_inputs)?;
    if indices.iter().skip(batch_rank).any(|i| !i.is_full_slice()) {
        log::trace!("{node}: index selects within the support of {}", site.rv_op.dist);
        return Ok(None);
    }
    indices.truncate(batch_rank);

    // A repeated position would hand one draw to several outputs.
    let sample_shape = graph.tensor_type(x)?.shape.clone();
    for (axis, index) in indices.iter().enumerate() {
        let Index::Array(v) = index else {
            continue;
        };
        if graph.tensor_type(*v)?.dtype == DType::BOOL {
            continue;
        }
        let len = sample_shape.get(axis).copied().flatten();
        if !has_distinct_positions(graph, *v, len) {
            log::trace!("{node}: array index {v} may select a position twice");
            return Ok(None);
        }
    }

    let shape_clients = match rv_usage(graph, site.rv_node, &[node])? {
        RvUsage::Used(reason) => {
            log::trace!("{node}: not lifting, {reason}");
            return Ok(None);
        }
        RvUsage::Unused { shape_clients } => shape_clients,
    };

    let size_entries = graph.static_int_entries(site.size).unwrap_or_default();
    let explicit_size = !size_entries.is_empty();

    // Lengths of the new size entries, decided before anything is built.
    let mut size_plan = vec![];
    if explicit_size {
        for (axis, entry) in size_entries.iter().enumerate() {
            let plan = match indices.get(axis) {
                None => SizeEntry::Keep,
                Some(Index::Scalar(_)) => SizeEntry::Drop,
                Some(index) if index.is_full_slice() => SizeEntry::Keep,
                Some(index @ Index::Slice { .. }) => {
                    let parts: Option<Vec<Option<i64>>> = [index_part(index, 0), index_part(index, 1), index_part(index, 2)]
                        .into_iter()
                        .map(|p| match p {
                            Some(v) => graph.static_int_scalar(v).map(Some),
                            None => Some(None),
                        })
                        .collect();
                    match (entry, parts.as_deref()) {
                        (Some(len), Some([start, stop, step])) if *len >= 0 => {
                            let len = slice_length(*start, *stop, *step, *len as usize).map_err(GraphError::from)?;
                            SizeEntry::Constant(len as i64)
                        }
                        _ => SizeEntry::SliceLength,
                    }
                }
                Some(Index::Array(v)) => {
                    let t = graph.tensor_type(*v)?;
                    let len = match t.dtype {
                        DType::BOOL => graph
                            .static_bool_vector(*v)
                            .map(|m| m.iter().filter(|b| **b).count() as i64),
                        _ => t.shape.first().copied().flatten().map(|d| d as i64),
                    };
                    match len {
                        Some(len) => SizeEntry::Constant(len),
                        None => {
                            log::trace!("{node}: array index {v} has no static length");
                            return Ok(None);
                        }
                    }
                }
            };
            size_plan.push(plan);
        }
    }

    // Per-parameter index lists.
    let mut param_types = vec![];
    for (param, nd) in site.params.iter().zip(site.rv_op.ndims_params()) {
        let t = graph.tensor_type(*param)?;
        let param_batch = t.rank() - nd;
        if param_batch > batch_rank {
            return Ok(None);
        }
        param_types.push((*param, batch_rank - param_batch, t));
    }
    let all_broadcastable = |axis: usize| {
        param_types
            .iter()
            .all(|(_, missing, t)| axis < *missing || t.is_broadcastable(axis - missing))
    };

    let mut patch = GraphPatch::new(graph);
    let detached = detach_shape_clients(&mut patch, site.sample, &shape_clients)?;

    let mut new_params = vec![];
    for (param, missing, t) in &param_types {
        let mut param_indices = vec![];
        for (axis, index) in indices.iter().enumerate().skip(*missing) {
            let param_axis = axis - missing;
            let translated = if t.is_broadcastable(param_axis) && (explicit_size || !all_broadcastable(axis)) {
                match index {
                    Index::Scalar(_) => Index::Scalar(patch.int_constant(0)),
                    _ => Index::full_slice(),
                }
            } else {
                index.clone()
            };
            param_indices.push(translated);
        }
        while param_indices.last().is_some_and(|i| i.is_full_slice()) {
            param_indices.pop();
        }
        if param_indices.is_empty() {
            new_params.push(*param);
        } else {
            new_params.push(SubtensorOp::apply(&mut patch, *param, param_indices)?);
        }
    }

    let new_size = if explicit_size {
        let entries = size_entry_values(&mut patch, site.size)?;
        let mut new_entries = vec![];
        for (axis, (plan, entry)) in size_plan.iter().zip(entries).enumerate() {
            match plan {
                SizeEntry::Keep => new_entries.push(entry),
                SizeEntry::Drop => {}
                SizeEntry::Constant(len) => new_entries.push(patch.int_constant(*len)),
                SizeEntry::SliceLength => {
                    let index = &indices[axis];
                    let length = SliceLengthOp::apply(
                        &mut patch,
                        entry,
                        index_part(index, 0),
                        index_part(index, 1),
                        index_part(index, 2),
                    )?;
                    new_entries.push(length);
                }
            }
        }
        build_size(&mut patch, new_entries)?
    } else {
        site.size
    };

    let (_, new_sample) = SampleOp::apply(&mut patch, site.rv_op.dist, site.rng, new_size, new_params)?;
    log::debug!("Lifted Subtensor node {node} through {} node {}", site.rv_op.dist, site.rv_node);
    Ok(Some(patch.into_replacement(vec![new_sample], detached)))
}

enum SizeEntry {
    Keep,
    Drop,
    Constant(i64),
    SliceLength,
}

/// Whether the constant integer index `index` selects every position at most
/// once along an axis of length `len`.
fn has_distinct_positions(graph: &RandomGraph, index: ValueId, len: Option<u64>) -> bool {
    let Some(positions) = graph.constant_value(index).and_then(|c| c.to_i64_vec().ok()) else {
        return false;
    };
    let resolved: Vec<i64> = match len {
        Some(len) => positions
            .iter()
            .map(|p| if *p < 0 { p + len as i64 } else { *p })
            .collect(),
        None if positions.iter().all(|p| *p >= 0) || positions.iter().all(|p| *p < 0) => positions,
        None => return false,
    };
    let mut seen = HashSet::new();
    resolved.into_iter().all(|p| seen.insert(p))
}

/// Start (0), stop (1) or step (2) of a slice index.
fn index_part(index: &Index<ValueId>, part: usize) -> Option<ValueId> {
    match index {
        Index::Slice { start, stop, step } => [*start, *stop, *step][part],
        _ => None,
    }
}
