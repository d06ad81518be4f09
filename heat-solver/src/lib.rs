//! `heat-solver`: explicit 2D heat diffusion dispatched to a GPU through wgpu.
//!
//! The grid is handed over column-indexed (`columns[col][row]`), flattened
//! row-major for the kernel, advanced `iterations` time steps on the device
//! and written back in place. Edge cells are fixed boundary values.

pub mod algorithms;

/// WGSL kernels shipped with the solver.
pub mod kernels {
    /// One time step per dispatch, one invocation per cell.
    pub const HEAT_STEP_WGSL: &str = include_str!("../kernels/heat_step.wgsl");
    /// All time steps inside a single one-workgroup dispatch.
    pub const HEAT_MULTI_STEP_WGSL: &str = include_str!("../kernels/heat_multi_step.wgsl");
}

pub use algorithms::{
    dispatch_engine::StepObserver, DispatchMode, HeatDiffusion, SolveReport, StepAlgorithm,
};
pub use heat_core::{
    AdapterSummary, Ambiguity, BackendKind, ComputeBackend, ComputeSession, DevicePolicy,
    Diagnostic, GpuBackend, GpuKind, HeatError, HostMatrix, KernelSource, Matrix, Severity,
    TransferStats,
};

/// Advances a column-indexed grid `iterations` steps on the default GPU.
///
/// `columns` must hold `cols` columns of `rows` values each. It is only
/// overwritten when the whole solve succeeds.
pub fn solve_heat(
    rows: usize,
    cols: usize,
    iterations: usize,
    td: f64,
    h: f64,
    columns: &mut Vec<Vec<f64>>,
    kernel: &KernelSource,
) -> Result<SolveReport, HeatError> {
    solve_heat_with(&GpuBackend::new(), rows, cols, iterations, td, h, columns, kernel)
}

/// [`solve_heat`] against an explicit backend.
#[allow(clippy::too_many_arguments)]
pub fn solve_heat_with<B: ComputeBackend>(
    backend: &B,
    rows: usize,
    cols: usize,
    iterations: usize,
    td: f64,
    h: f64,
    columns: &mut Vec<Vec<f64>>,
    kernel: &KernelSource,
) -> Result<SolveReport, HeatError> {
    let mut matrix = HostMatrix::from_columns(rows, cols, columns.clone())?;
    let report = HeatDiffusion::with_params(td, h, iterations).solve(backend, kernel, &mut matrix)?;
    *columns = matrix.into_columns();
    Ok(report)
}
