//! # `WideResNet`
//!
//! Pre-activation residual networks with a ``6n + 4`` depth rule and
//! a channel widen factor.

pub mod basic_block;
pub mod stage;
pub mod wide_resnet_model;

pub use wide_resnet_model::*;

use crate::models::regularization::Regularized;
use crate::models::try_check_input_shape;
use burn::prelude::Backend;

/// Build a [`WideResNet`] classifier.
///
/// # Arguments
///
/// - `input_shape`: ``[channels, height, width]``.
/// - `n_classes`: number of output classes.
/// - `depth`: ``6n + 4``; ``n`` blocks per stage, at least one.
/// - `weight_decay`: L2 coefficient for the optimizer.
/// - `widen`: stage width multiplier.
/// - `device`: the device to build on.
#[tracing::instrument(skip(device))]
pub fn load_resnet<B: Backend>(
    input_shape: [usize; 3],
    n_classes: usize,
    depth: usize,
    weight_decay: f64,
    widen: usize,
    device: &B::Device,
) -> anyhow::Result<Regularized<WideResNet<B>>> {
    let [channels, _, _] = try_check_input_shape(input_shape, [1, 1])?;

    let config = WideResNetAbstractConfig::new(channels, n_classes)
        .with_depth(depth)
        .with_widen(widen);
    tracing::debug!(widths = ?config.stage_widths(), "building wide resnet");

    let structure = config.try_to_structure()?;

    Regularized::try_new(structure.init(device), weight_decay)
}
