//! Adam optimizer on flattened tensors.
use anyhow::{bail, Result};
use mirage_core::Gradients;
use ndarray::Array1;

/// Learning rate of [`Adam`] unless configured otherwise.
pub const DEFAULT_LEARNING_RATE: f32 = 1e-4;

/// Adam optimizer.
///
/// Moment estimates are created on the first step from the shapes of the
/// gradients; later gradients must have the same shapes.
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    t: i32,
    m: Vec<Array1<f32>>,
    v: Vec<Array1<f32>>,
}

impl Adam {
    /// Creates an optimizer with learning rate `lr`.
    pub fn new(lr: f32) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            t: 0,
            m: vec![],
            v: vec![],
        }
    }

    /// Number of steps taken so far.
    pub fn n_steps(&self) -> i32 {
        self.t
    }

    /// Returns the updates to subtract from the parameters.
    pub fn step(&mut self, grads: &Gradients) -> Result<Vec<Array1<f32>>> {
        if self.m.is_empty() {
            self.m = grads.iter().map(|g| Array1::zeros(g.len())).collect();
            self.v = self.m.clone();
        }
        if self.m.len() != grads.len()
            || self.m.iter().zip(grads.iter()).any(|(m, g)| m.len() != g.len())
        {
            bail!(
                "Gradient shapes {:?} differ from the optimizer state {:?}",
                grads.iter().map(|g| g.len()).collect::<Vec<_>>(),
                self.m.iter().map(|m| m.len()).collect::<Vec<_>>()
            );
        }

        self.t += 1;
        let bc1 = 1.0 - self.beta1.powi(self.t);
        let bc2 = 1.0 - self.beta2.powi(self.t);
        let (beta1, beta2, eps, lr) = (self.beta1, self.beta2, self.eps, self.lr);

        let updates = grads
            .iter()
            .zip(self.m.iter_mut().zip(self.v.iter_mut()))
            .map(|(g, (m, v))| {
                m.zip_mut_with(g, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
                v.zip_mut_with(g, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);
                let mut update = Array1::zeros(g.len());
                ndarray::Zip::from(&mut update)
                    .and(&*m)
                    .and(&*v)
                    .for_each(|u, &m, &v| *u = lr * (m / bc1) / ((v / bc2).sqrt() + eps));
                update
            })
            .collect();
        Ok(updates)
    }
}
