//! Criteria applied to per-entry distances against a zero target.

use crate::config::LossKind;

/// A scalar criterion `f(x)` measured against zero, with its derivative.
pub trait MatchingLoss: Send + Sync {
    /// Loss of a single residual.
    fn value(&self, residual: f32) -> f32;

    /// Derivative of [`MatchingLoss::value`] at `residual`.
    fn derivative(&self, residual: f32) -> f32;
}

/// Absolute value.
#[derive(Debug, Clone, Copy)]
pub struct L1Loss;

impl MatchingLoss for L1Loss {
    fn value(&self, residual: f32) -> f32 {
        residual.abs()
    }

    fn derivative(&self, residual: f32) -> f32 {
        // subgradient 0 at the kink
        if residual > 0.0 {
            1.0
        } else if residual < 0.0 {
            -1.0
        } else {
            0.0
        }
    }
}

/// Squared value.
#[derive(Debug, Clone, Copy)]
pub struct L2Loss;

impl MatchingLoss for L2Loss {
    fn value(&self, residual: f32) -> f32 {
        residual * residual
    }

    fn derivative(&self, residual: f32) -> f32 {
        2.0 * residual
    }
}

/// Smooth L1: quadratic below `beta`, linear above.
#[derive(Debug, Clone, Copy)]
pub struct HuberLoss {
    /// Threshold between the quadratic and linear regions.
    pub beta: f32,
}

impl HuberLoss {
    /// Huber loss with threshold `beta`. Panics unless `beta > 0`.
    pub fn new(beta: f32) -> Self {
        assert!(beta > 0.0, "Huber beta must be positive, got {}", beta);
        HuberLoss { beta }
    }
}

impl MatchingLoss for HuberLoss {
    fn value(&self, residual: f32) -> f32 {
        let abs = residual.abs();
        if abs < self.beta {
            0.5 * residual * residual / self.beta
        } else {
            abs - 0.5 * self.beta
        }
    }

    fn derivative(&self, residual: f32) -> f32 {
        if residual.abs() < self.beta {
            residual / self.beta
        } else {
            L1Loss.derivative(residual)
        }
    }
}

impl LossKind {
    /// The criterion for this kind.
    pub fn criterion(&self) -> Box<dyn MatchingLoss> {
        match self {
            LossKind::L1 => Box::new(L1Loss),
            LossKind::L2 => Box::new(L2Loss),
            LossKind::Huber => Box::new(HuberLoss::new(1.0)),
        }
    }
}

/// Mean criterion over `residuals` and its gradient with respect to each residual.
pub fn mean_loss(criterion: &dyn MatchingLoss, residuals: &[f32]) -> (f32, Vec<f32>) {
    if residuals.is_empty() {
        return (0.0, Vec::new());
    }
    let n = residuals.len() as f32;
    let loss = residuals.iter().map(|&r| criterion.value(r)).sum::<f32>() / n;
    let grads = residuals
        .iter()
        .map(|&r| criterion.derivative(r) / n)
        .collect();
    (loss, grads)
}
