use crate::dtype::DType;
use crate::numeric_tensor::{NumericTensor, NumericTensorError, broadcast_shapes};
use crate::random_graph::eval::{EvalError, RuntimeValue};
use crate::random_graph::ops::{
    AnyOp, Operation, infer_broadcast_shape, invalid_input, static_shape_entries, tensor_arg, tensor_type,
};
use crate::random_graph::{GraphBuild, GraphError, GraphRead, ValueId};
use crate::value_type::ValueType;
use ndarray::IxDyn;
use rand::Rng;
use rand_distr::Distribution as _;
use rand_distr::{Gamma, Normal, Poisson, StandardNormal};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// Distribution kind of a sampling node, with its static core descriptors.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Distribution {
    Normal,
    Uniform,
    Poisson,
    Dirichlet,
    MultivariateNormal,
}

impl Distribution {
    /// Rank of one atomic draw.
    pub fn ndim_supp(&self) -> usize {
        match self {
            Distribution::Normal | Distribution::Uniform | Distribution::Poisson => 0,
            Distribution::Dirichlet | Distribution::MultivariateNormal => 1,
        }
    }

    /// Core rank of each parameter, in parameter order.
    pub fn ndims_params(&self) -> &'static [usize] {
        match self {
            Distribution::Normal | Distribution::Uniform => &[0, 0],
            Distribution::Poisson => &[0],
            Distribution::Dirichlet => &[1],
            Distribution::MultivariateNormal => &[1, 2],
        }
    }

    pub fn num_params(&self) -> usize {
        self.ndims_params().len()
    }

    pub fn dtype(&self) -> DType {
        match self {
            Distribution::Poisson => DType::I64,
            _ => DType::F64,
        }
    }

    /// Support shape of one draw given the core shapes of the parameters.
    /// The support axes are the trailing axes of every parameter's core.
    fn support_shape<T: Clone>(&self, core_shapes: &[Vec<T>]) -> Vec<T> {
        let ndim_supp = self.ndim_supp();
        match core_shapes.first() {
            Some(core) if ndim_supp > 0 => core[core.len() - ndim_supp..].to_vec(),
            _ => vec![],
        }
    }

    /// Draw one atomic sample from `args` (the flattened core slices of each
    /// parameter) and append it to `out`.
    fn draw<R: Rng>(&self, rng: &mut R, args: &[&[f64]], out: &mut Vec<f64>) -> Result<(), EvalError> {
        let invalid = |message: String| EvalError::InvalidParameter(self.to_string(), message);
        let scalar = |i: usize| {
            args.get(i)
                .and_then(|a| a.first().copied())
                .ok_or_else(|| invalid(format!("missing parameter {i}")))
        };
        match self {
            Distribution::Normal => {
                let d = Normal::new(scalar(0)?, scalar(1)?).map_err(|e| invalid(e.to_string()))?;
                out.push(d.sample(rng));
            }
            Distribution::Uniform => {
                let (low, high) = (scalar(0)?, scalar(1)?);
                if !(low <= high) {
                    return Err(invalid(format!("low {low} exceeds high {high}")));
                }
                out.push(low + (high - low) * rng.r#gen::<f64>());
            }
            Distribution::Poisson => {
                let lam = scalar(0)?;
                if lam == 0.0 {
                    out.push(0.0);
                } else {
                    let d = Poisson::new(lam).map_err(|e| invalid(e.to_string()))?;
                    out.push(d.sample(rng));
                }
            }
            Distribution::Dirichlet => {
                let alpha = args.first().ok_or_else(|| invalid("missing concentration".to_string()))?;
                let mut draws = Vec::with_capacity(alpha.len());
                for a in alpha.iter() {
                    let g = Gamma::new(*a, 1.0).map_err(|e| invalid(e.to_string()))?;
                    draws.push(g.sample(rng));
                }
                let total: f64 = draws.iter().sum();
                if total <= 0.0 {
                    return Err(invalid("gamma draws sum to zero".to_string()));
                }
                out.extend(draws.iter().map(|g| g / total));
            }
            Distribution::MultivariateNormal => {
                let (mean, cov) = match args {
                    [mean, cov] => (*mean, *cov),
                    _ => return Err(invalid("expected mean and covariance".to_string())),
                };
                let k = mean.len();
                if cov.len() != k * k {
                    return Err(invalid(format!("covariance has {} entries for dimension {k}", cov.len())));
                }
                let l = cholesky(cov, k).ok_or_else(|| invalid("covariance is not positive semi-definite".to_string()))?;
                let z: Vec<f64> = (0..k).map(|_| StandardNormal.sample(rng)).collect();
                for i in 0..k {
                    out.push(mean[i] + (0..=i).map(|j| l[i * k + j] * z[j]).sum::<f64>());
                }
            }
        }
        Ok(())
    }
}

/// Lower Cholesky factor of a row-major `k x k` matrix. Zero pivots are
/// tolerated so that degenerate covariances still sample.
fn cholesky(a: &[f64], k: usize) -> Option<Vec<f64>> {
    let mut l = vec![0.0; k * k];
    for i in 0..k {
        for j in 0..=i {
            let s: f64 = (0..j).map(|m| l[i * k + m] * l[j * k + m]).sum();
            if i == j {
                let d = a[i * k + i] - s;
                if d < -1e-12 * a[i * k + i].abs().max(1.0) {
                    return None;
                }
                l[i * k + i] = d.max(0.0).sqrt();
            } else if l[j * k + j] > 0.0 {
                l[i * k + j] = (a[i * k + j] - s) / l[j * k + j];
            }
        }
    }
    Some(l)
}

/// A random-variable node: inputs `[rng, size, *params]`, outputs
/// `[rng_out, sample]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleOp {
    pub dist: Distribution,
}

impl SampleOp {
    pub const RNG_OUTPUT: usize = 0;
    pub const SAMPLE_OUTPUT: usize = 1;

    pub fn new(dist: Distribution) -> Self {
        Self { dist }
    }

    /// Add a sampling node, returning `(rng_out, sample)`.
    pub fn apply<G: GraphBuild + ?Sized>(
        graph: &mut G,
        dist: Distribution,
        rng: ValueId,
        size: ValueId,
        params: Vec<ValueId>,
    ) -> Result<(ValueId, ValueId), GraphError> {
        let op = Self::new(dist);
        let name = op.get_name();
        let mut inputs = vec![rng, size];
        inputs.extend(params);
        match graph.apply(AnyOp::Sample(op), inputs)?.as_slice() {
            [rng_out, sample] => Ok((*rng_out, *sample)),
            _ => Err(invalid_input(&name, "sampling node must have two outputs")),
        }
    }

    pub fn ndim_supp(&self) -> usize {
        self.dist.ndim_supp()
    }

    pub fn ndims_params(&self) -> &'static [usize] {
        self.dist.ndims_params()
    }

    /// Split node inputs into `(rng, size, params)`.
    pub fn split_inputs<'a>(&self, inputs: &'a [ValueId]) -> Result<(ValueId, ValueId, &'a [ValueId]), GraphError> {
        let expected = 2 + self.dist.num_params();
        match inputs {
            [rng, size, params @ ..] if inputs.len() == expected => Ok((*rng, *size, params)),
            _ => Err(GraphError::WrongInputCount {
                op: self.get_name(),
                expected,
                got: inputs.len(),
            }),
        }
    }
}

impl Operation for SampleOp {
    fn infer_types<G: GraphRead + ?Sized>(
        &self,
        graph: &G,
        inputs: &[ValueId],
    ) -> Result<Vec<ValueType>, GraphError> {
        let name = self.get_name();
        let (rng, size, params) = self.split_inputs(inputs)?;
        if *graph.value_type(rng)? != ValueType::RandomState {
            return Err(invalid_input(&name, format!("{rng} is not a random state")));
        }
        let size_entries = static_shape_entries(graph, &name, size)?;

        let mut batch_shapes = vec![];
        let mut core_shapes = vec![];
        for (param, nd) in params.iter().zip(self.ndims_params()) {
            let t = graph.tensor_type(*param)?;
            if t.dtype == DType::BOOL {
                return Err(invalid_input(&name, format!("parameter {param} is boolean")));
            }
            if t.rank() < *nd {
                return Err(invalid_input(
                    &name,
                    format!("parameter {param} has rank {} but needs at least {nd}", t.rank()),
                ));
            }
            let split = t.rank() - nd;
            batch_shapes.push(t.shape[..split].to_vec());
            core_shapes.push(t.shape[split..].to_vec());
        }

        let support = self.dist.support_shape(&core_shapes);
        for core in &core_shapes {
            let trailing = &core[core.len() - support.len()..];
            for (a, b) in trailing.iter().zip(&support) {
                if let (Some(a), Some(b)) = (a, b) {
                    if a != b {
                        return Err(invalid_input(&name, "parameter core shapes disagree"));
                    }
                }
            }
        }

        let params_batch = infer_broadcast_shape(&batch_shapes)
            .ok_or_else(|| invalid_input(&name, "parameter batch shapes do not broadcast"))?;
        let mut shape = if size_entries.is_empty() {
            params_batch
        } else {
            if params_batch.len() > size_entries.len() {
                return Err(invalid_input(&name, "parameters have more batch axes than the size"));
            }
            let offset = size_entries.len() - params_batch.len();
            let mut batch = size_entries;
            for (i, dim) in params_batch.iter().enumerate() {
                match (batch[offset + i], dim) {
                    (_, Some(1)) | (_, None) => {}
                    (Some(s), Some(d)) if s != *d => {
                        return Err(invalid_input(&name, format!("parameter dimension {d} does not broadcast to {s}")));
                    }
                    (Some(_), Some(_)) => {}
                    (None, Some(d)) => batch[offset + i] = Some(*d),
                }
            }
            batch
        };
        shape.extend(support);
        Ok(vec![ValueType::RandomState, tensor_type(self.dist.dtype(), shape)])
    }

    fn eval(&self, inputs: &[RuntimeValue]) -> Result<Vec<RuntimeValue>, EvalError> {
        let name = self.get_name();
        let mut state = match inputs.first() {
            Some(RuntimeValue::RandomState(s)) => s.clone(),
            _ => return Err(EvalError::ExpectedRandomState(name, 0)),
        };
        let size = tensor_arg(&name, inputs, 1)?.to_shape()?;

        let mut params = vec![];
        let mut batch_shapes = vec![];
        let mut core_shapes = vec![];
        for (i, nd) in self.ndims_params().iter().enumerate() {
            let p = tensor_arg(&name, inputs, 2 + i)?.to_f64_array()?;
            if p.ndim() < *nd {
                return Err(EvalError::InvalidParameter(name, format!("parameter {i} has too few axes")));
            }
            let split = p.ndim() - nd;
            batch_shapes.push(p.shape()[..split].to_vec());
            core_shapes.push(p.shape()[split..].to_vec());
            params.push(p);
        }
        let batch = if size.is_empty() {
            broadcast_shapes(&batch_shapes)?
        } else {
            size
        };

        let mut flat = vec![];
        for (p, core) in params.iter().zip(&core_shapes) {
            let mut target = batch.clone();
            target.extend(core);
            let view = p
                .broadcast(IxDyn(&target))
                .ok_or_else(|| NumericTensorError::BroadcastError(p.shape().to_vec(), target.clone()))?;
            flat.push((view.iter().copied().collect::<Vec<f64>>(), core.iter().product::<usize>()));
        }

        let count: usize = batch.iter().product();
        let support = self.dist.support_shape(&core_shapes);
        let mut values = Vec::with_capacity(count * support.iter().product::<usize>());
        for b in 0..count {
            let args: Vec<&[f64]> = flat.iter().map(|(f, n)| &f[b * n..(b + 1) * n]).collect();
            self.dist.draw(state.rng(), &args, &mut values)?;
        }

        let mut shape = batch;
        shape.extend(support);
        let sample = match self.dist.dtype() {
            DType::I64 => NumericTensor::from_vec_shape(values.iter().map(|v| *v as i64).collect(), shape)?,
            _ => NumericTensor::from_vec_shape(values, shape)?,
        };
        Ok(vec![RuntimeValue::RandomState(state), RuntimeValue::Tensor(sample)])
    }

    fn get_name(&self) -> String {
        format!("Sample({})", self.dist)
    }
}
