#![warn(missing_docs)]
//!# convnets - Convolutional Image Classifiers
//!
//! Builders for image classification networks on [`burn`].
//!
//! ## Notable Components
//!
//! * [`factory`] - select and build a classifier by name.
//!   * [`factory::load_model`] - build by ``net_type`` tag.
//!   * [`factory::ClassifierConfig`] - the same, as a saveable config.
//! * [`models`] - the classifier families.
//!   * [`models::simple_cnn`] - three conv blocks and a dense head.
//!   * [`models::wide_resnet`] - pre-activation wide residual networks.
//!   * [`models::resnet50`] - ResNet-50 transfer model.
//!   * [`models::inception_v3`] - Inception-V3 transfer model.
//!   * [`models::regularization`] - weight decay plumbing.
//! * [`layers`] - reusable conv / norm / activation blocks.
//! * [`cache`] - pretrained weight download cache.
//! * [`utility`] - record inspection and PyTorch checkpoint loading.

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod cache;
pub mod factory;
pub mod layers;
pub mod models;
pub mod utility;
