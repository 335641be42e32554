//! Returns and advantages of trajectory segments.
use crate::segment::TrajectorySegment;
use ndarray::{Array1, Array2, Array4};

/// Discount factor used by the coordinator unless configured otherwise.
pub const DEFAULT_GAMMA: f32 = 0.99;

/// GAE lambda used by the coordinator unless configured otherwise.
pub const DEFAULT_LAMBDA: f32 = 1.0;

/// Discounted cumulative sum from the end of `x`.
///
/// Applies the filter `y[t] = x[t] + gamma * y[t + 1]` in reverse time.
pub fn discount(x: &[f32], gamma: f32) -> Vec<f32> {
    let mut y = vec![0f32; x.len()];
    let mut acc = 0f32;
    for t in (0..x.len()).rev() {
        acc = x[t] + gamma * acc;
        y[t] = acc;
    }
    y
}

/// Training-ready data derived from a [`TrajectorySegment`].
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<F> {
    /// States stacked along the first axis, `(L, H, W, 1)`.
    pub states: Array4<f32>,

    /// One-hot actions, `(L, n_actions)`.
    pub actions: Array2<f32>,

    /// Generalized advantage estimates.
    pub advantages: Array1<f32>,

    /// Discounted returns, bootstrapped with the segment's `r`.
    pub returns: Array1<f32>,

    /// Terminal flag of the segment.
    pub terminal: bool,

    /// Recurrent features to replay the segment from its first transition.
    pub features: F,
}

impl<F> Batch<F> {
    /// Number of transitions in the batch.
    pub fn len(&self) -> usize {
        self.returns.len()
    }

    /// Returns `true` if the batch has no transition.
    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }
}

/// Computes returns and advantages of a segment.
///
/// * `returns = discount(rewards ++ [r], gamma)` without its last element.
/// * `delta[t] = rewards[t] + gamma * values[t + 1] - values[t]`, with
///   `values[L] = r`.
/// * `advantages = discount(delta, gamma * lambda)`
///   ([Generalized Advantage Estimation](https://arxiv.org/abs/1506.02438)).
///
/// The segment must be non-empty and all its states and actions must share
/// one shape.
pub fn process_segment<F: Clone>(
    segment: &TrajectorySegment<F>,
    gamma: f32,
    lambda: f32,
) -> Batch<F> {
    debug_assert!(!segment.is_empty(), "empty trajectory segment");
    let n = segment.len();

    let rewards_plus_v: Vec<f32> = segment
        .rewards
        .iter()
        .copied()
        .chain(std::iter::once(segment.r))
        .collect();
    let mut returns = discount(&rewards_plus_v, gamma);
    returns.truncate(n);

    let next_values = segment.values.iter().skip(1).chain(std::iter::once(&segment.r));
    let delta: Vec<f32> = segment
        .rewards
        .iter()
        .zip(segment.values.iter())
        .zip(next_values)
        .map(|((reward, v), v_next)| reward + gamma * v_next - v)
        .collect();
    let advantages = discount(&delta, gamma * lambda);

    let (h, w, c) = segment.states[0].dim();
    let states = Array4::from_shape_fn((n, h, w, c), |(i, y, x, k)| segment.states[i][[y, x, k]]);
    let n_actions = segment.actions[0].len();
    let actions = Array2::from_shape_fn((n, n_actions), |(i, a)| segment.actions[i][a]);

    Batch {
        states,
        actions,
        advantages: Array1::from(advantages),
        returns: Array1::from(returns),
        terminal: segment.terminal,
        features: segment.features[0].clone(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frame::{one_hot, Image};

    fn segment(rewards: &[f32], values: &[f32], r: f32, terminal: bool) -> TrajectorySegment<u8> {
        let mut seg = TrajectorySegment::new();
        for (i, (&reward, &value)) in rewards.iter().zip(values.iter()).enumerate() {
            seg.add(
                Image::from_elem((3, 2, 1), i as f32),
                one_hot(i % 2, 2),
                reward,
                value,
                terminal && i + 1 == rewards.len(),
                i as u8 + 7,
            );
        }
        seg.r = r;
        seg
    }

    fn assert_close(xs: &[f32], ys: &[f32]) {
        assert_eq!(xs.len(), ys.len());
        for (x, y) in xs.iter().zip(ys.iter()) {
            assert!((x - y).abs() < 1e-5, "{:?} != {:?}", xs, ys);
        }
    }

    #[test]
    fn test_discount_recursion() {
        let xs = [0.5, -1.0, 2.0, 0.0, 3.5];
        for &gamma in &[0.1f32, 0.5, 0.99] {
            let y = discount(&xs, gamma);
            assert_eq!(y[xs.len() - 1], xs[xs.len() - 1]);
            for t in 0..xs.len() - 1 {
                assert!((y[t] - (xs[t] + gamma * y[t + 1])).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_discount_empty() {
        assert!(discount(&[], 0.99).is_empty());
    }

    #[test]
    fn test_returns_of_terminal_segment() {
        let seg = segment(&[1.0, 1.0, 1.0], &[0.0, 0.0, 0.0], 0.0, true);
        let batch = process_segment(&seg, 0.99, 1.0);
        assert_close(batch.returns.as_slice().unwrap(), &[2.9701, 1.99, 1.0]);
        assert!(batch.terminal);
    }

    #[test]
    fn test_bootstrap_value_enters_returns() {
        let seg = segment(&[0.0, 0.0], &[0.0, 0.0], 10.0, false);
        let batch = process_segment(&seg, 0.5, 1.0);
        assert_close(batch.returns.as_slice().unwrap(), &[2.5, 5.0]);
    }

    #[test]
    fn test_advantages_gae() {
        let seg = segment(&[1.0, 0.0], &[0.5, 0.25], 2.0, false);
        let batch = process_segment(&seg, 0.9, 0.5);
        // delta = [1 + 0.9 * 0.25 - 0.5, 0 + 0.9 * 2 - 0.25] = [0.725, 1.55]
        let d1 = 1.55;
        let d0 = 0.725 + 0.45 * d1;
        assert_close(batch.advantages.as_slice().unwrap(), &[d0, d1]);
    }

    #[test]
    fn test_lambda_one_matches_returns_minus_values() {
        let values = [0.3, -0.2, 0.7, 0.1];
        let seg = segment(&[1.0, 0.5, -1.0, 2.0], &values, 0.4, false);
        let batch = process_segment(&seg, 0.95, 1.0);
        let expected: Vec<f32> = batch
            .returns
            .iter()
            .zip(values.iter())
            .map(|(r, v)| r - v)
            .collect();
        assert_close(batch.advantages.as_slice().unwrap(), &expected);
    }

    #[test]
    fn test_batch_shapes_and_features() {
        let seg = segment(&[1.0, 2.0, 3.0, 4.0, 5.0], &[0.0; 5], 1.0, false);
        let batch = process_segment(&seg, 0.99, 1.0);
        assert_eq!(batch.len(), 5);
        assert_eq!(batch.advantages.len(), 5);
        assert_eq!(batch.states.dim(), (5, 3, 2, 1));
        assert_eq!(batch.actions.dim(), (5, 2));
        assert_eq!(batch.states[[3, 0, 0, 0]], 3.0);
        assert_eq!(batch.features, 7);
    }

    #[test]
    fn test_process_segment_is_pure() {
        let seg = segment(&[0.3, 0.1, 0.7], &[0.2, 0.9, 0.4], 0.6, false);
        let a = process_segment(&seg, 0.97, 0.9);
        let b = process_segment(&seg, 0.97, 0.9);
        assert_eq!(a, b);
        for (x, y) in a.advantages.iter().zip(b.advantages.iter()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }
}
