//! Adam (adaptive moment estimation).

use ndarray::{Array, Dimension, Zip};

#[derive(Debug, Clone)]
pub(crate) struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: i32,
}

impl Adam {
    pub(crate) fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            t: 0,
        }
    }

    /// Advance the step counter. The returned step applies the same
    /// bias correction to every parameter tensor of this update.
    pub(crate) fn step(&mut self) -> AdamStep {
        self.t += 1;
        AdamStep {
            learning_rate: self.learning_rate,
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            bias1: 1.0 - self.beta1.powi(self.t),
            bias2: 1.0 - self.beta2.powi(self.t),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct AdamStep {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    bias1: f64,
    bias2: f64,
}

impl AdamStep {
    /// Update one parameter tensor with its first/second moment buffers.
    pub(crate) fn update<D: Dimension>(
        &self,
        param: &mut Array<f64, D>,
        grad: &Array<f64, D>,
        m: &mut Array<f64, D>,
        v: &mut Array<f64, D>,
    ) {
        Zip::from(param)
            .and(grad)
            .and(m)
            .and(v)
            .for_each(|p, &g, m, v| {
                *m = self.beta1 * *m + (1.0 - self.beta1) * g;
                *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
                let m_hat = *m / self.bias1;
                let v_hat = *v / self.bias2;
                *p -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let mut adam = Adam::new(0.001);
        let mut weights = Array2::ones((3, 2));
        let grads = Array2::ones((3, 2));
        let mut m = Array2::zeros((3, 2));
        let mut v = Array2::zeros((3, 2));

        adam.step().update(&mut weights, &grads, &mut m, &mut v);
        // Bias-corrected first step is lr * sign(g).
        assert!((weights[[0, 0]] - 0.999).abs() < 1e-6);
    }

    #[test]
    fn test_minimizes_quadratic() {
        let mut adam = Adam::new(0.1);
        let mut x = Array1::from_vec(vec![3.0, -2.0]);
        let mut m = Array1::zeros(2);
        let mut v = Array1::zeros(2);
        for _ in 0..500 {
            let grad = x.mapv(|xi| 2.0 * xi);
            adam.step().update(&mut x, &grad, &mut m, &mut v);
        }
        assert!(x.iter().all(|xi| xi.abs() < 0.1));
    }
}
