use heat_core::{
    ComputeBackend, HeatError, HostMatrix, KernelSource, Matrix, TransferStats, DEFAULT_ENTRY_POINT,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod dispatch_engine;

/// Summary of a finished solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    /// Time steps applied to the matrix.
    pub iterations: usize,
    /// Kernel launches submitted to the device.
    pub dispatches: usize,
    pub mode: DispatchMode,
    /// Device the solve ran on, `None` when no device work was needed.
    pub adapter: Option<String>,
    pub transfer: TransferStats,
    pub elapsed: Duration,
}

impl SolveReport {
    pub(crate) fn untouched(mode: DispatchMode) -> Self {
        Self {
            iterations: 0,
            dispatches: 0,
            mode,
            adapter: None,
            transfer: TransferStats::default(),
            elapsed: Duration::ZERO,
        }
    }
}

/// Who drives the time loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DispatchMode {
    /// One dispatch per time step, buffers swapped on the host between steps.
    /// Intermediate states can be observed.
    #[default]
    HostDriven,
    /// A single dispatch of one workgroup; the kernel loops over `iterations`
    /// itself and leaves the result in the new-state buffer.
    DeviceIterated,
}

// --- Algorithm Trait Definition ---
/// A time-stepping algorithm run through a compute backend.
pub trait StepAlgorithm<B: ComputeBackend> {
    type Report: std::fmt::Debug;

    /// Advances `matrix` in place. On error the matrix is left untouched.
    fn solve(
        &self,
        backend: &B,
        kernel: &KernelSource,
        matrix: &mut HostMatrix,
    ) -> Result<Self::Report, HeatError>;

    /// Checks the grid shape before any device call and returns it in the
    /// `u32` form the kernel arguments use.
    fn validate_inputs(&self, matrix: &HostMatrix) -> Result<(u32, u32), HeatError> {
        let (rows, cols) = matrix.dims();
        if rows == 0 || cols == 0 {
            return Err(HeatError::InvalidDimensions(format!(
                "Grid must have at least one row and one column (dims: {}x{})",
                rows, cols
            )));
        }
        let cells = rows
            .checked_mul(cols)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                HeatError::InvalidDimensions(format!(
                    "Grid {}x{} exceeds the kernel's u32 cell index",
                    rows, cols
                ))
            })?;
        log::trace!("Validated {}x{} grid ({} cells)", rows, cols, cells);
        // Both factors fit because their product does.
        Ok((rows as u32, cols as u32))
    }
}

// --- Algorithm Struct Definitions ---

/// Explicit finite-difference heat diffusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatDiffusion {
    /// Time delta per step.
    pub td: f64,
    /// Spatial step.
    pub h: f64,
    pub iterations: usize,
    pub mode: DispatchMode,
    /// Kernel entry point to extract after the build.
    pub entry_point: String,
}

impl Default for HeatDiffusion {
    fn default() -> Self {
        Self {
            td: 0.1,
            h: 1.0,
            iterations: 1,
            mode: DispatchMode::HostDriven,
            entry_point: DEFAULT_ENTRY_POINT.to_string(),
        }
    }
}

impl HeatDiffusion {
    /// Creates a new instance with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new instance with the given step sizes and iteration count.
    pub fn with_params(td: f64, h: f64, iterations: usize) -> Self {
        Self {
            td,
            h,
            iterations,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: DispatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    /// Iteration count as passed to a device-iterated kernel.
    pub(crate) fn device_iterations(&self) -> Result<u32, HeatError> {
        match self.mode {
            DispatchMode::HostDriven => Ok(1),
            DispatchMode::DeviceIterated => u32::try_from(self.iterations).map_err(|_| {
                HeatError::InvalidDimensions(format!(
                    "{} iterations exceed the kernel's u32 argument",
                    self.iterations
                ))
            }),
        }
    }
}
