//! Adam: gradient descent with per-parameter adaptive step sizes.
//!
//! Each parameter keeps exponentially decayed estimates of its gradient's
//! first and second moments. The step taken is the bias-corrected first moment
//! scaled by the inverse square root of the bias-corrected second moment, so
//! parameters with small but consistent gradients still move at roughly the
//! base learning rate.

use ndarray::{Array1, Zip};

pub const DEFAULT_LEARNING_RATE: f64 = 0.01;
pub const DEFAULT_BETA1: f64 = 0.9;
pub const DEFAULT_BETA2: f64 = 0.999;
pub const DEFAULT_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdamConfig {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
            beta1: DEFAULT_BETA1,
            beta2: DEFAULT_BETA2,
            epsilon: DEFAULT_EPSILON,
        }
    }
}

/// Bias-correction denominators for a 1-based time step.
#[derive(Debug, Clone, Copy)]
pub struct BiasCorrection {
    first: f64,
    second: f64,
}

impl AdamConfig {
    /// `time_step` must start at 1; at 0 both corrections would be zero.
    pub fn bias_correction(&self, time_step: usize) -> BiasCorrection {
        let t = i32::try_from(time_step).unwrap_or(i32::MAX);
        BiasCorrection {
            first: 1.0 - self.beta1.powi(t),
            second: 1.0 - self.beta2.powi(t),
        }
    }

    /// Advances one moment pair with `grad` and returns the signed step to subtract.
    #[inline]
    fn advance(&self, first: &mut f64, second: &mut f64, grad: f64, bias: BiasCorrection) -> f64 {
        *first = self.beta1 * *first + (1.0 - self.beta1) * grad;
        *second = self.beta2 * *second + (1.0 - self.beta2) * grad * grad;
        let m_hat = *first / bias.first;
        let v_hat = *second / bias.second;
        self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon)
    }
}

/// Moment estimates for a block of parameters.
#[derive(Debug, Clone)]
pub struct AdamMoments {
    first: Array1<f64>,
    second: Array1<f64>,
}

impl AdamMoments {
    pub fn zeros(len: usize) -> Self {
        Self {
            first: Array1::zeros(len),
            second: Array1::zeros(len),
        }
    }

    pub fn len(&self) -> usize {
        self.first.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_empty()
    }

    /// Applies one Adam update to every element of `params`.
    ///
    /// Elements are independent, so the update is spread across the rayon pool;
    /// each element sees the same arithmetic regardless of scheduling.
    pub fn step(
        &mut self,
        config: &AdamConfig,
        bias: BiasCorrection,
        params: &mut Array1<f64>,
        grads: &Array1<f64>,
    ) {
        assert_eq!(params.len(), self.len(), "parameter block length changed");
        assert_eq!(grads.len(), self.len(), "gradient block length mismatch");
        Zip::from(params)
            .and(grads)
            .and(&mut self.first)
            .and(&mut self.second)
            .par_for_each(|param, &grad, first, second| {
                *param -= config.advance(first, second, grad, bias);
            });
    }
}

/// Moment estimates for a lone scalar parameter such as the global intercept.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarMoments {
    first: f64,
    second: f64,
}

impl ScalarMoments {
    pub fn step(&mut self, config: &AdamConfig, bias: BiasCorrection, param: &mut f64, grad: f64) {
        *param -= config.advance(&mut self.first, &mut self.second, grad, bias);
    }
}
