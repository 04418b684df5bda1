//! # Utilities
//!
//! * [`record`] - shape summaries of module records.
//! * [`pytorch`] - module records from PyTorch checkpoints.

pub mod pytorch;
pub mod record;
