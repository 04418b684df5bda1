//! Common low-level modules shared by the model families.
pub mod basic_conv;
pub mod bn_relu;
pub mod conv_pool;
pub mod util;
