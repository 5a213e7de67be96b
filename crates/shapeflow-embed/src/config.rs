use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EmbedError;

/// Gradient-based optimizer used to update the latent code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OptimizerKind {
    /// Plain gradient descent.
    Sgd,
    /// Gradient descent with heavy-ball momentum.
    Momentum,
    /// Adaptive moment estimation.
    #[default]
    Adam,
    /// Adaptive learning rate from running averages of updates.
    Adadelta,
    /// Per-coordinate learning rate from accumulated squared gradients.
    Adagrad,
    /// Per-coordinate learning rate from a running average of squared gradients.
    Rmsprop,
}

/// Which directions of the point-set distance are penalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MatchingPolicy {
    /// Completeness only: every observed point must be explained, extra
    /// deformed geometry is tolerated. Suited to partial observations.
    #[default]
    OneWay,
    /// Full symmetric distance: penalises missing and extra geometry.
    TwoWay,
}

/// Criterion applied to the per-entry distance against zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LossKind {
    /// Absolute value.
    #[default]
    L1,
    /// Square.
    L2,
    /// Smooth L1 with unit threshold.
    Huber,
}

macro_rules! named_enum {
    ($ty:ident, $what:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Every accepted name, in declaration order.
            pub const NAMES: &'static [&'static str] = &[$($name),+];

            /// The lowercase configuration name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl FromStr for $ty {
            type Err = EmbedError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    _ => Err(EmbedError::UnsupportedConfig(format!(
                        "{} must be one of {:?}, got {:?}",
                        $what,
                        Self::NAMES,
                        s
                    ))),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        // serde reads and writes the configuration names
        impl TryFrom<String> for $ty {
            type Error = EmbedError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.as_str().to_string()
            }
        }
    };
}

named_enum!(OptimizerKind, "optimizer", {
    Sgd => "sgd",
    Momentum => "momentum",
    Adam => "adam",
    Adadelta => "adadelta",
    Adagrad => "adagrad",
    Rmsprop => "rmsprop",
});

named_enum!(MatchingPolicy, "matching", {
    OneWay => "one_way",
    TwoWay => "two_way",
});

named_enum!(LossKind, "loss_type", {
    L1 => "l1",
    L2 => "l2",
    Huber => "huber",
});

/// Parameters of [`crate::LatentEmbedder::embed`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    /// Optimizer used for both phases.
    pub optimizer: OptimizerKind,
    /// Learning rate of the coarse phase.
    pub learning_rate: f32,
    /// Seed for the initial latent draw and mini-batch order.
    pub seed: u64,
    /// Number of coarse steps.
    pub num_iterations: usize,
    /// Reference shapes per coarse mini-batch.
    pub batch_size: usize,
    /// Log every step at info level instead of debug.
    pub verbose: bool,
    /// Distance directions penalised.
    pub matching: MatchingPolicy,
    /// Criterion applied to the distance.
    pub loss: LossKind,
    /// Neighbourhood size of the refinement phase.
    pub topk_finetune: usize,
    /// Learning rate of the refinement phase.
    pub finetune_learning_rate: f32,
    /// Number of refinement steps.
    pub finetune_iterations: usize,
    /// How many times the refinement neighbourhood is repeated per epoch.
    pub finetune_oversample: usize,
    /// Gradient components are clamped to `[-grad_clip, grad_clip]`.
    pub grad_clip: f32,
    /// Standard deviation of the initial latent draw.
    pub init_scale: f32,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            optimizer: OptimizerKind::Adam,
            learning_rate: 1e-3,
            seed: 0,
            num_iterations: 20,
            batch_size: 32,
            verbose: false,
            matching: MatchingPolicy::OneWay,
            loss: LossKind::L1,
            topk_finetune: 10,
            finetune_learning_rate: 1e-3,
            finetune_iterations: 10,
            finetune_oversample: 10,
            grad_clip: 1.0,
            init_scale: 1e-4,
        }
    }
}

/// Parameters of [`crate::LatentEmbedder::retrieve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieveConfig {
    /// Number of nearest reference shapes to deform and rank.
    pub topk: usize,
    /// Distance directions used for ranking.
    pub matching: MatchingPolicy,
}

impl Default for RetrieveConfig {
    fn default() -> Self {
        Self {
            topk: 10,
            matching: MatchingPolicy::OneWay,
        }
    }
}
