//! Loss terms of A3C.
//!
//! Network internals are outside of this library, but every actor-critic model
//! shares the same objective on top of its logits and value outputs:
//!
//! `loss = policy_loss + 0.5 * value_loss - 0.01 * entropy`
//!
//! where all terms are sums over the batch. [`a3c_loss`] evaluates the terms and
//! their gradients w.r.t. the logits and the values, which models backpropagate
//! through their own layers.
use crate::advantage::Batch;
use ndarray::{Array1, Array2, Axis};

/// Weight of the value loss in the total loss.
pub const VALUE_LOSS_COEF: f32 = 0.5;

/// Weight of the entropy bonus in the total loss.
pub const ENTROPY_COEF: f32 = 0.01;

/// Loss terms of a batch and gradients of the total loss.
#[derive(Debug, Clone)]
pub struct A3cLoss {
    /// `-sum_i adv_i * log pi(a_i | s_i)`.
    pub policy_loss: f32,

    /// `0.5 * sum_i (v_i - R_i)^2`.
    pub value_loss: f32,

    /// `-sum_i sum_a pi(a | s_i) log pi(a | s_i)`.
    pub entropy: f32,

    /// Combined loss.
    pub total: f32,

    /// d total / d logits, `(L, n_actions)`.
    pub logit_grads: Array2<f32>,

    /// d total / d values, `(L,)`.
    pub value_grads: Array1<f32>,
}

/// Row-wise log-softmax.
pub fn log_softmax(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::MIN, |m, &x| m.max(x));
        let log_z = row.iter().map(|&x| (x - max).exp()).sum::<f32>().ln() + max;
        row.mapv_inplace(|x| x - log_z);
    }
    out
}

/// Evaluates the A3C loss on `logits` and `values` computed from `batch.states`.
pub fn a3c_loss<F>(logits: &Array2<f32>, values: &Array1<f32>, batch: &Batch<F>) -> A3cLoss {
    let log_probs = log_softmax(logits);
    let probs = log_probs.mapv(f32::exp);

    let mut policy_loss = 0f32;
    let mut entropy = 0f32;
    let mut logit_grads = Array2::zeros(logits.raw_dim());

    for i in 0..batch.len() {
        let adv = batch.advantages[i];
        let ac = batch.actions.row(i);
        let lp = log_probs.row(i);
        let p = probs.row(i);

        let ac_sum = ac.sum();
        let h = -(&p * &lp).sum();
        policy_loss -= adv * (&lp * &ac).sum();
        entropy += h;

        for b in 0..p.len() {
            let d_policy = -adv * (ac[b] - p[b] * ac_sum);
            let d_entropy = -p[b] * (lp[b] + h);
            logit_grads[[i, b]] = d_policy - ENTROPY_COEF * d_entropy;
        }
    }

    let diff = values - &batch.returns;
    let value_loss = 0.5 * diff.mapv(|d| d * d).sum();
    let value_grads = diff * VALUE_LOSS_COEF;

    A3cLoss {
        policy_loss,
        value_loss,
        entropy,
        total: policy_loss + VALUE_LOSS_COEF * value_loss - ENTROPY_COEF * entropy,
        logit_grads,
        value_grads,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::{array, Array4};

    fn batch(actions: Array2<f32>, advantages: Array1<f32>, returns: Array1<f32>) -> Batch<()> {
        let n = returns.len();
        Batch {
            states: Array4::zeros((n, 1, 1, 1)),
            actions,
            advantages,
            returns,
            terminal: false,
            features: (),
        }
    }

    #[test]
    fn test_uniform_policy() {
        let b = batch(array![[1.0, 0.0]], array![1.0], array![1.0]);
        let loss = a3c_loss(&array![[0.0, 0.0]], &array![0.0], &b);
        let ln2 = 2f32.ln();
        assert!((loss.policy_loss - ln2).abs() < 1e-6);
        assert!((loss.value_loss - 0.5).abs() < 1e-6);
        assert!((loss.entropy - ln2).abs() < 1e-6);
        assert!((loss.logit_grads[[0, 0]] + 0.5).abs() < 1e-6);
        assert!((loss.logit_grads[[0, 1]] - 0.5).abs() < 1e-6);
        assert!((loss.value_grads[0] + 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_logit_grads_match_finite_differences() {
        let b = batch(
            array![[0.0, 1.0, 0.0], [1.0, 0.0, 0.0]],
            array![0.7, -1.3],
            array![0.5, 2.0],
        );
        let logits = array![[0.2, -0.4, 1.1], [0.9, 0.3, -0.6]];
        let values = array![0.1, 0.4];
        let loss = a3c_loss(&logits, &values, &b);

        let eps = 1e-2;
        for i in 0..2 {
            for k in 0..3 {
                let mut plus = logits.clone();
                plus[[i, k]] += eps;
                let mut minus = logits.clone();
                minus[[i, k]] -= eps;
                let fd = (a3c_loss(&plus, &values, &b).total - a3c_loss(&minus, &values, &b).total)
                    / (2.0 * eps);
                assert!((fd - loss.logit_grads[[i, k]]).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_log_softmax_is_stable() {
        let lp = log_softmax(&array![[1000.0, 1000.0]]);
        assert!((lp[[0, 0]] + 2f32.ln()).abs() < 1e-3);
    }
}
