//! First-order optimizers over a flat parameter vector.
//!
//! Hyper-parameters default to the values commonly used for latent-code
//! optimization; only the learning rate is configurable.

use crate::config::OptimizerKind;

/// One optimizer update rule with its running state.
pub trait GradientStep: Send {
    /// Update `params` in place from `grad`.
    fn step(&mut self, params: &mut [f32], grad: &[f32]);

    /// Current learning rate.
    fn learning_rate(&self) -> f32;

    /// Change the learning rate, keeping the running state.
    fn set_learning_rate(&mut self, lr: f32);
}

/// Plain gradient descent.
#[derive(Debug, Clone)]
pub struct Sgd {
    lr: f32,
}

impl GradientStep for Sgd {
    fn step(&mut self, params: &mut [f32], grad: &[f32]) {
        for (p, g) in params.iter_mut().zip(grad) {
            *p -= self.lr * g;
        }
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.lr = lr;
    }
}

/// Gradient descent with heavy-ball momentum.
#[derive(Debug, Clone)]
pub struct Momentum {
    lr: f32,
    momentum: f32,
    velocity: Vec<f32>,
}

impl GradientStep for Momentum {
    fn step(&mut self, params: &mut [f32], grad: &[f32]) {
        // zero-initialised, so the first step uses the raw gradient
        for ((p, g), v) in params.iter_mut().zip(grad).zip(self.velocity.iter_mut()) {
            *v = self.momentum * *v + g;
            *p -= self.lr * *v;
        }
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.lr = lr;
    }
}

/// Adaptive moment estimation with bias correction.
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    t: i32,
    m: Vec<f32>,
    v: Vec<f32>,
}

impl GradientStep for Adam {
    fn step(&mut self, params: &mut [f32], grad: &[f32]) {
        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t);
        let bias2 = 1.0 - self.beta2.powi(self.t);
        for (((p, g), m), v) in params
            .iter_mut()
            .zip(grad)
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
        {
            *m = self.beta1 * *m + (1.0 - self.beta1) * g;
            *v = self.beta2 * *v + (1.0 - self.beta2) * g * g;
            let denom = (*v / bias2).sqrt() + self.eps;
            *p -= self.lr * (*m / bias1) / denom;
        }
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.lr = lr;
    }
}

/// Adadelta, with the update scaled by the learning rate.
#[derive(Debug, Clone)]
pub struct Adadelta {
    lr: f32,
    rho: f32,
    eps: f32,
    square_avg: Vec<f32>,
    acc_delta: Vec<f32>,
}

impl GradientStep for Adadelta {
    fn step(&mut self, params: &mut [f32], grad: &[f32]) {
        for (((p, g), sq), acc) in params
            .iter_mut()
            .zip(grad)
            .zip(self.square_avg.iter_mut())
            .zip(self.acc_delta.iter_mut())
        {
            *sq = self.rho * *sq + (1.0 - self.rho) * g * g;
            let delta = (*acc + self.eps).sqrt() / (*sq + self.eps).sqrt() * g;
            *acc = self.rho * *acc + (1.0 - self.rho) * delta * delta;
            *p -= self.lr * delta;
        }
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.lr = lr;
    }
}

/// Adagrad.
#[derive(Debug, Clone)]
pub struct Adagrad {
    lr: f32,
    eps: f32,
    sum: Vec<f32>,
}

impl GradientStep for Adagrad {
    fn step(&mut self, params: &mut [f32], grad: &[f32]) {
        for ((p, g), s) in params.iter_mut().zip(grad).zip(self.sum.iter_mut()) {
            *s += g * g;
            *p -= self.lr * g / (s.sqrt() + self.eps);
        }
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.lr = lr;
    }
}

/// RMSprop without momentum.
#[derive(Debug, Clone)]
pub struct Rmsprop {
    lr: f32,
    alpha: f32,
    eps: f32,
    square_avg: Vec<f32>,
}

impl GradientStep for Rmsprop {
    fn step(&mut self, params: &mut [f32], grad: &[f32]) {
        for ((p, g), sq) in params
            .iter_mut()
            .zip(grad)
            .zip(self.square_avg.iter_mut())
        {
            *sq = self.alpha * *sq + (1.0 - self.alpha) * g * g;
            *p -= self.lr * g / (sq.sqrt() + self.eps);
        }
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.lr = lr;
    }
}

impl OptimizerKind {
    /// Create the optimizer for a parameter vector of length `dims`.
    pub fn build(&self, lr: f32, dims: usize) -> Box<dyn GradientStep> {
        match self {
            OptimizerKind::Sgd => Box::new(Sgd { lr }),
            OptimizerKind::Momentum => Box::new(Momentum {
                lr,
                momentum: 0.9,
                velocity: vec![0.0; dims],
            }),
            OptimizerKind::Adam => Box::new(Adam {
                lr,
                beta1: 0.9,
                beta2: 0.999,
                eps: 1e-8,
                t: 0,
                m: vec![0.0; dims],
                v: vec![0.0; dims],
            }),
            OptimizerKind::Adadelta => Box::new(Adadelta {
                lr,
                rho: 0.9,
                eps: 1e-6,
                square_avg: vec![0.0; dims],
                acc_delta: vec![0.0; dims],
            }),
            OptimizerKind::Adagrad => Box::new(Adagrad {
                lr,
                eps: 1e-10,
                sum: vec![0.0; dims],
            }),
            OptimizerKind::Rmsprop => Box::new(Rmsprop {
                lr,
                alpha: 0.99,
                eps: 1e-8,
                square_avg: vec![0.0; dims],
            }),
        }
    }
}

/// Clamp every gradient component to `[-clip, clip]`.
pub fn clip_grad_value(grad: &mut [f32], clip: f32) {
    for g in grad.iter_mut() {
        *g = g.clamp(-clip, clip);
    }
}
