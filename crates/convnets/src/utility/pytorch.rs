//! # PyTorch Checkpoint Records

use anyhow::Context;
use burn::prelude::Backend;
use burn::record::{FullPrecisionSettings, Record, Recorder};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use std::path::Path;

/// A ``(pattern, replacement)`` regex pair applied to checkpoint keys.
pub type KeyRemap = (&'static str, &'static str);

/// Load a module record from a PyTorch ``state_dict`` checkpoint.
///
/// Keys are rewritten by each of `key_remaps`, in order, before matching
/// the record's field paths. Checkpoint tensors with no matching field
/// are ignored.
pub fn load_pytorch_record<B: Backend, R: Record<B>>(
    path: &Path,
    key_remaps: &[KeyRemap],
    device: &B::Device,
) -> anyhow::Result<R> {
    let load_args = key_remaps.iter().fold(
        LoadArgs::new(path.to_path_buf()),
        |args, (pattern, replacement)| args.with_key_remap(pattern, replacement),
    );

    let record = PyTorchFileRecorder::<FullPrecisionSettings>::new()
        .load(load_args, device)
        .with_context(|| format!("loading pytorch weights from {}", path.display()))?;

    Ok(record)
}
