//! # Pretrained Weight Caches
//!
//! * [`disk`] - read-through download cache under ``~/.cache/convnets``.
//! * [`weights`] - pretrained weight descriptors and selection.

pub mod disk;
pub mod weights;
