//! # Weight Decay Plumbing
//!
//! burn applies L2 regularization in the optimizer, not per layer.
//! A built model is paired with its decay coefficient in a [`Regularized`],
//! which hands the training harness a matching [`WeightDecayConfig`].

use anyhow::bail;
use burn::optim::decay::WeightDecayConfig;

/// Optimizer penalty equivalent to an ``wd * sum(w^2)`` loss term.
///
/// The gradient of the loss term is ``2 * wd * w``; the optimizer adds
/// ``penalty * w``.
pub fn l2_penalty(weight_decay: f64) -> f32 {
    (2.0 * weight_decay) as f32
}

/// Check a weight decay coefficient.
pub fn try_check_weight_decay(weight_decay: f64) -> anyhow::Result<f64> {
    if !weight_decay.is_finite() || weight_decay < 0.0 {
        bail!("weight_decay must be finite and >= 0: {weight_decay}");
    }
    Ok(weight_decay)
}

/// The optimizer decay config for an L2 coefficient; `None` when it is zero.
pub fn weight_decay_config(weight_decay: f64) -> Option<WeightDecayConfig> {
    if weight_decay == 0.0 {
        None
    } else {
        Some(WeightDecayConfig::new(l2_penalty(weight_decay)))
    }
}

/// A model paired with its L2 weight decay coefficient.
#[derive(Debug, Clone)]
pub struct Regularized<M> {
    /// The model.
    pub model: M,

    /// The L2 coefficient, as passed to the builder.
    pub weight_decay: f64,
}

impl<M> Regularized<M> {
    /// Pair a model with a (checked) weight decay coefficient.
    pub fn try_new(
        model: M,
        weight_decay: f64,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            model,
            weight_decay: try_check_weight_decay(weight_decay)?,
        })
    }

    /// The optimizer decay config; `None` when the coefficient is zero.
    pub fn weight_decay_config(&self) -> Option<WeightDecayConfig> {
        weight_decay_config(self.weight_decay)
    }

    /// Apply a mapping to the model, keeping the coefficient.
    pub fn map<N, F>(
        self,
        f: F,
    ) -> Regularized<N>
    where
        F: FnOnce(M) -> N,
    {
        Regularized {
            model: f(self.model),
            weight_decay: self.weight_decay,
        }
    }

    /// Drop the coefficient.
    pub fn into_model(self) -> M {
        self.model
    }
}
