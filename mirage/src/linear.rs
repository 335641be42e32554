//! Linear softmax actor-critic on luminance states.
//!
//! The policy logits and the value are affine functions of the flattened
//! `(H, W, 1)` state. It has no recurrent state, so its features are `()`.
mod adam;
pub use adam::{Adam, DEFAULT_LEARNING_RATE};
use anyhow::{bail, Result};
use mirage_core::{
    advantage::Batch, frame::one_hot, grad::global_norm, loss::a3c_loss, Gradients,
    GradientReport, Image, LocalModel, Policy, PolicyOutput, SharedModel, SyncModel,
};
use ndarray::{Array1, Array2, Axis};

/// Parameters of [`LinearActorCritic`].
#[derive(Debug, Clone, PartialEq)]
pub struct LinearParams {
    /// Policy weights, `(n_actions, input_dim)`.
    pub w_pi: Array2<f32>,

    /// Policy bias, `(n_actions,)`.
    pub b_pi: Array1<f32>,

    /// Value weights, `(input_dim,)`.
    pub w_v: Array1<f32>,

    /// Value bias, `(1,)`.
    pub b_v: Array1<f32>,
}

impl LinearParams {
    /// Parameters filled with zeros.
    pub fn zeros(input_dim: usize, n_actions: usize) -> Self {
        Self {
            w_pi: Array2::zeros((n_actions, input_dim)),
            b_pi: Array1::zeros(n_actions),
            w_v: Array1::zeros(input_dim),
            b_v: Array1::zeros(1),
        }
    }

    /// Weights drawn uniformly from `[-scale, scale)`, biases set to zero.
    pub fn random(input_dim: usize, n_actions: usize, scale: f32, seed: u64) -> Self {
        let rng = fastrand::Rng::with_seed(seed);
        let mut params = Self::zeros(input_dim, n_actions);
        params
            .w_pi
            .mapv_inplace(|_| (rng.f32() * 2.0 - 1.0) * scale);
        params.w_v.mapv_inplace(|_| (rng.f32() * 2.0 - 1.0) * scale);
        params
    }

    /// Length of the flattened state.
    pub fn input_dim(&self) -> usize {
        self.w_v.len()
    }

    /// Number of actions.
    pub fn n_actions(&self) -> usize {
        self.b_pi.len()
    }

    /// Global norm of all parameters.
    pub fn global_norm(&self) -> f32 {
        global_norm(self.tensors().iter())
    }

    /// Flattened tensors in the order of [`Gradients`] computed by the model.
    fn tensors(&self) -> Vec<Array1<f32>> {
        vec![
            self.w_pi.iter().cloned().collect(),
            self.b_pi.clone(),
            self.w_v.clone(),
            self.b_v.clone(),
        ]
    }

    fn check_shapes(&self, tensors: &[Array1<f32>]) -> Result<()> {
        let expected = self.tensors().iter().map(|t| t.len()).collect::<Vec<_>>();
        let actual = tensors.iter().map(|t| t.len()).collect::<Vec<_>>();
        if expected != actual {
            bail!("Tensor shapes {:?} differ from parameters {:?}", actual, expected);
        }
        Ok(())
    }

    /// Subtracts flattened `updates` from the parameters.
    fn subtract(&mut self, updates: &[Array1<f32>]) {
        self.w_pi
            .iter_mut()
            .zip(updates[0].iter())
            .for_each(|(p, u)| *p -= u);
        self.b_pi -= &updates[1];
        self.w_v -= &updates[2];
        self.b_v -= &updates[3];
    }

    /// Logits `(L, n_actions)` and values `(L,)` of flattened states `(L, input_dim)`.
    fn forward(&self, x: &Array2<f32>) -> (Array2<f32>, Array1<f32>) {
        let logits = x.dot(&self.w_pi.t()) + &self.b_pi;
        let values = x.dot(&self.w_v) + self.b_v[0];
        (logits, values)
    }

    fn flatten(&self, state: &Image) -> Result<Array2<f32>> {
        if state.len() != self.input_dim() {
            bail!(
                "State of shape {:?} does not match input dimension {}",
                state.shape(),
                self.input_dim()
            );
        }
        Ok(state.iter().cloned().collect::<Array1<f32>>().insert_axis(Axis(0)))
    }
}

/// Linear softmax actor-critic.
///
/// Acts as the [`Policy`] of the environment driver and as the [`LocalModel`] of
/// the training coordinator.
#[derive(Debug, Clone)]
pub struct LinearActorCritic {
    params: LinearParams,
    rng: fastrand::Rng,
}

impl LinearActorCritic {
    /// Creates a model sampling actions with the random `seed`.
    pub fn new(params: LinearParams, seed: u64) -> Self {
        Self {
            params,
            rng: fastrand::Rng::with_seed(seed),
        }
    }

    /// Current parameters.
    pub fn params(&self) -> &LinearParams {
        &self.params
    }

    fn sample(&self, logits: &Array1<f32>) -> usize {
        let max = logits.fold(f32::MIN, |m, &x| m.max(x));
        let weights = logits.mapv(|x| (x - max).exp());
        let mut u = self.rng.f32() * weights.sum();
        for (i, w) in weights.iter().enumerate() {
            if u < *w {
                return i;
            }
            u -= w;
        }
        weights.len() - 1
    }
}

impl Policy for LinearActorCritic {
    type Features = ();

    fn initial_features(&self) {}

    fn act(&mut self, state: &Image, _features: &()) -> Result<PolicyOutput<()>> {
        let x = self.params.flatten(state)?;
        let (logits, values) = self.params.forward(&x);
        let ix = self.sample(&logits.row(0).to_owned());
        Ok(PolicyOutput {
            action: one_hot(ix, self.params.n_actions()),
            value: values[0],
            features: (),
        })
    }

    fn value(&mut self, state: &Image, _features: &()) -> Result<f32> {
        let x = self.params.flatten(state)?;
        Ok(self.params.forward(&x).1[0])
    }
}

impl SyncModel for LinearActorCritic {
    type ModelInfo = LinearParams;

    fn model_info(&self) -> (usize, LinearParams) {
        (0, self.params.clone())
    }

    fn sync_model(&mut self, model_info: &LinearParams) {
        self.params = model_info.clone();
    }
}

impl LocalModel<()> for LinearActorCritic {
    fn compute_gradients(&mut self, batch: &Batch<()>) -> Result<GradientReport> {
        let n = batch.len();
        let d = self.params.input_dim();
        if batch.states.len() != n * d {
            bail!(
                "States of shape {:?} do not match input dimension {}",
                batch.states.shape(),
                d
            );
        }
        let x = Array2::from_shape_vec((n, d), batch.states.iter().cloned().collect())?;
        let (logits, values) = self.params.forward(&x);
        let loss = a3c_loss(&logits, &values, batch);

        let d_w_pi = loss.logit_grads.t().dot(&x);
        let d_b_pi = loss.logit_grads.sum_axis(Axis(0));
        let d_w_v = x.t().dot(&loss.value_grads);
        let d_b_v = Array1::from_elem(1, loss.value_grads.sum());

        Ok(GradientReport {
            grads: Gradients::new(vec![
                d_w_pi.iter().cloned().collect(),
                d_b_pi,
                d_w_v,
                d_b_v,
            ]),
            policy_loss: loss.policy_loss,
            value_loss: loss.value_loss,
            entropy: loss.entropy,
        })
    }

    fn param_global_norm(&self) -> f32 {
        self.params.global_norm()
    }
}

/// Shared parameters of [`LinearActorCritic`]s, updated with [`Adam`].
#[derive(Debug, Clone)]
pub struct SharedLinearModel {
    params: LinearParams,
    opt: Adam,
    global_step: usize,
}

impl SharedLinearModel {
    /// Creates a model at global step 0 optimized with learning rate `lr`.
    pub fn new(params: LinearParams, lr: f32) -> Self {
        Self {
            params,
            opt: Adam::new(lr),
            global_step: 0,
        }
    }

    /// Current parameters.
    pub fn params(&self) -> &LinearParams {
        &self.params
    }
}

impl SharedModel for SharedLinearModel {
    type ModelInfo = LinearParams;

    fn model_info(&self) -> (usize, LinearParams) {
        (self.global_step, self.params.clone())
    }

    fn apply_gradients(&mut self, grads: &Gradients) -> Result<()> {
        self.params.check_shapes(&grads.0)?;
        let updates = self.opt.step(grads)?;
        self.params.subtract(&updates);
        Ok(())
    }

    fn global_step(&self) -> usize {
        self.global_step
    }

    fn advance_global_step(&mut self, n: usize) -> usize {
        self.global_step += n;
        self.global_step
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use mirage_core::{advantage::process_segment, frame::rgb_to_gray, TrajectorySegment};
    use ndarray::Array3;

    fn state(v: f32) -> Image {
        rgb_to_gray(&Array3::from_elem((3, 2, 2), v))
    }

    fn batch(params: &LinearParams, rewards: &[f32]) -> Batch<()> {
        let mut model = LinearActorCritic::new(params.clone(), 0);
        let mut segment = TrajectorySegment::new();
        for (i, &r) in rewards.iter().enumerate() {
            let s = state(i as f32 * 0.1);
            let out = model.act(&s, &()).unwrap();
            segment.add(s, out.action, r, out.value, i + 1 == rewards.len(), ());
        }
        process_segment(&segment, 0.99, 1.0)
    }

    #[test]
    fn test_act_with_uniform_params() -> Result<()> {
        let mut model = LinearActorCritic::new(LinearParams::zeros(4, 3), 1);
        let out = model.act(&state(0.5), &())?;
        assert_eq!(out.action.len(), 3);
        assert_eq!(out.action.sum(), 1.0);
        assert_eq!(out.value, 0.0);
        assert!(model.act(&Image::zeros((3, 3, 1)), &()).is_err());
        Ok(())
    }

    #[test]
    fn test_sampling_follows_logits() -> Result<()> {
        let mut params = LinearParams::zeros(4, 2);
        params.b_pi[1] = 20.0;
        let mut model = LinearActorCritic::new(params, 3);
        for _ in 0..20 {
            assert_eq!(model.act(&state(0.3), &())?.action[1], 1.0);
        }
        Ok(())
    }

    #[test]
    fn test_value_gradient_direction() -> Result<()> {
        let params = LinearParams::zeros(4, 2);
        let b = batch(&params, &[1.0, 1.0, 1.0]);
        let mut model = LinearActorCritic::new(params, 0);
        let report = model.compute_gradients(&b)?;
        assert_eq!(report.grads.len(), 4);
        assert_eq!(report.grads.0[0].len(), 8);
        // Values are below the returns, so the value bias must go up
        assert!(report.grads.0[3][0] < 0.0);
        assert!(report.value_loss > 0.0);
        Ok(())
    }

    #[test]
    fn test_shared_model_descends() -> Result<()> {
        let params = LinearParams::random(4, 2, 0.1, 5);
        let mut shared = SharedLinearModel::new(params.clone(), 0.05);
        let mut local = LinearActorCritic::new(params.clone(), 0);
        let b = batch(&params, &[1.0, 0.0, 2.0]);

        let before = local.compute_gradients(&b)?;
        for _ in 0..50 {
            let report = local.compute_gradients(&b)?;
            shared.apply_gradients(&report.grads)?;
            local.sync_model(&shared.model_info().1);
        }
        let after = local.compute_gradients(&b)?;
        assert!(after.value_loss < before.value_loss);
        assert_ne!(shared.params(), &params);
        assert_eq!(shared.advance_global_step(3), 3);
        Ok(())
    }

    #[test]
    fn test_mismatched_gradients_are_rejected() {
        let mut shared = SharedLinearModel::new(LinearParams::zeros(4, 2), 0.1);
        let grads = Gradients::new(vec![Array1::zeros(3)]);
        assert!(shared.apply_gradients(&grads).is_err());
        assert_eq!(shared.params(), &LinearParams::zeros(4, 2));
    }
}
