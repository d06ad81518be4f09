//! Kernel source text and the argument block every kernel receives.
//!
//! Kernels are WGSL compute shaders using `f64`. The bind group contract is
//! fixed:
//!
//! ```text
//! @group(0) @binding(0) var<storage, read_write> old_state: array<f64>;
//! @group(0) @binding(1) var<uniform> args: KernelArgs;
//! @group(0) @binding(2) var<storage, read_write> new_state: array<f64>;
//! ```
//!
//! and the entry point must be declared with `@workgroup_size(64)`.
//!
//! Large grids are launched as a 2-D grid of workgroups (see [`launch_shape`]),
//! so a per-cell kernel recovers its flat index as
//! `gid.x + gid.y * num_workgroups.x * 64u` and skips indices past the last cell.

use crate::error::{HeatError, Result};
use bytemuck::{Pod, Zeroable};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// Invocations per workgroup. Must match the kernel's `@workgroup_size`.
pub const WORKGROUP_SIZE: u32 = 64;

/// Entry point looked up when the caller does not name one.
pub const DEFAULT_ENTRY_POINT: &str = "main";

/// Uniform block at binding 1, laid out as the WGSL struct
/// `{ td: f64, h: f64, rows: u32, cols: u32, iterations: u32, _pad: u32 }`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct KernelArgs {
    pub td: f64,
    pub h: f64,
    pub rows: u32,
    pub cols: u32,
    /// Steps the kernel runs internally. Host-driven dispatch always passes 1.
    pub iterations: u32,
    _padding: u32,
}

impl KernelArgs {
    pub fn new(td: f64, h: f64, rows: u32, cols: u32, iterations: u32) -> Self {
        Self {
            td,
            h,
            rows,
            cols,
            iterations,
            _padding: 0,
        }
    }

    pub fn cells(&self) -> u32 {
        self.rows * self.cols
    }
}

/// Number of workgroups needed to give every work item an invocation.
pub fn workgroup_count(work_items: u32) -> u32 {
    work_items.div_ceil(WORKGROUP_SIZE)
}

/// Splits the workgroups for `work_items` into an `(x, y)` grid with neither
/// dimension above `max_per_dimension`.
///
/// `x * y` may exceed the workgroups needed by less than one row of `x`.
pub fn launch_shape(work_items: u32, max_per_dimension: u32) -> Result<(u32, u32)> {
    let groups = workgroup_count(work_items);
    if groups == 0 || max_per_dimension == 0 {
        return Err(HeatError::DispatchError(format!(
            "cannot launch {} work items with {} workgroups per dimension",
            work_items, max_per_dimension
        )));
    }
    let x = groups.min(max_per_dimension);
    let y = groups.div_ceil(x);
    if y > max_per_dimension {
        return Err(HeatError::DispatchError(format!(
            "{} workgroups exceed the device's {}x{} launch grid",
            groups, max_per_dimension, max_per_dimension
        )));
    }
    Ok((x, y))
}

/// Where the kernel text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelSource {
    Literal(String),
    File(PathBuf),
}

impl KernelSource {
    pub fn literal(text: impl Into<String>) -> Self {
        KernelSource::Literal(text.into())
    }

    pub fn from_path(path: impl AsRef<Path>) -> Self {
        KernelSource::File(path.as_ref().to_path_buf())
    }

    /// Returns the source text, reading it from disk for `File`.
    pub fn load(&self) -> Result<Cow<'_, str>> {
        match self {
            KernelSource::Literal(text) => {
                if text.trim().is_empty() {
                    return Err(empty_source("kernel literal".to_string()));
                }
                Ok(Cow::Borrowed(text.as_str()))
            }
            KernelSource::File(path) => {
                log::debug!("Reading kernel source from {}", path.display());
                let text = std::fs::read_to_string(path)?;
                if text.trim().is_empty() {
                    return Err(empty_source(format!("kernel file {}", path.display())));
                }
                Ok(Cow::Owned(text))
            }
        }
    }
}

fn empty_source(what: String) -> HeatError {
    HeatError::IoError(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("{} is empty", what),
    ))
}

impl From<&str> for KernelSource {
    fn from(text: &str) -> Self {
        KernelSource::literal(text)
    }
}
