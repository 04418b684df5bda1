//! # Classifier Models
//!
//! Every builder returns a [`regularization::Regularized`] model; see
//! [`crate::factory::load_model`] for selection by name.

pub mod inception_v3;
pub mod regularization;
pub mod resnet50;
pub mod simple_cnn;
pub mod transfer;
pub mod wide_resnet;

use anyhow::bail;

/// Check a ``[channels, height, width]`` input shape.
///
/// # Arguments
///
/// - `input_shape`: the shape to check.
/// - `min_resolution`: the smallest accepted ``[height, width]``.
///
/// # Returns
///
/// The shape, unchanged.
pub fn try_check_input_shape(
    input_shape: [usize; 3],
    min_resolution: [usize; 2],
) -> anyhow::Result<[usize; 3]> {
    let [channels, height, width] = input_shape;
    if channels == 0 || height == 0 || width == 0 {
        bail!("input_shape must be positive: {input_shape:?}");
    }
    if height < min_resolution[0] || width < min_resolution[1] {
        bail!(
            "input resolution {:?} is smaller than the minimum {:?}",
            [height, width],
            min_resolution
        );
    }
    Ok(input_shape)
}
