//! The per-solve dispatch state machine.
//!
//! One solve opens one session, compiles one program and allocates one buffer
//! pair, then runs INIT, UPLOAD, BIND, LAUNCH, SYNC and DOWNLOAD. Host-driven
//! solves repeat BIND..SYNC once per time step, swapping the buffer roles in
//! between. The session is closed on every exit path and the host matrix is
//! only written after a complete download.

use heat_core::{
    BufferPair, ComputeBackend, ComputeSession, HeatError, HostMatrix, KernelArgs, KernelSource,
    WORKGROUP_SIZE,
};
use log::{debug, info, trace};
use std::time::Instant;

use super::{DispatchMode, HeatDiffusion, SolveReport, StepAlgorithm};

/// Called with the step number and the state after that step.
pub type StepObserver<'a> = &'a mut dyn FnMut(usize, &HostMatrix);

impl<B: ComputeBackend> StepAlgorithm<B> for HeatDiffusion {
    type Report = SolveReport;

    fn solve(
        &self,
        backend: &B,
        kernel: &KernelSource,
        matrix: &mut HostMatrix,
    ) -> Result<SolveReport, HeatError> {
        execute(self, backend, kernel, matrix, None)
    }
}

impl HeatDiffusion {
    /// Like `solve`, but hands every intermediate state to `observer`.
    ///
    /// In host-driven mode this downloads the state after each step. A
    /// device-iterated solve only has its final state to show.
    pub fn solve_with_observer<B: ComputeBackend>(
        &self,
        backend: &B,
        kernel: &KernelSource,
        matrix: &mut HostMatrix,
        observer: StepObserver<'_>,
    ) -> Result<SolveReport, HeatError> {
        execute(self, backend, kernel, matrix, Some(observer))
    }
}

fn execute<B: ComputeBackend>(
    params: &HeatDiffusion,
    backend: &B,
    kernel: &KernelSource,
    matrix: &mut HostMatrix,
    observer: Option<StepObserver<'_>>,
) -> Result<SolveReport, HeatError> {
    let (rows, cols) = <HeatDiffusion as StepAlgorithm<B>>::validate_inputs(params, matrix)?;
    let device_iterations = params.device_iterations()?;
    if params.iterations == 0 {
        info!("Zero iterations requested, matrix left unchanged");
        return Ok(SolveReport::untouched(params.mode));
    }

    let source = kernel.load()?;
    let initial = matrix.to_flat()?;
    let started = Instant::now();

    let mut session = backend.open()?;
    info!(
        "Solving {}x{} grid for {} iterations ({:?}) on {}",
        rows,
        cols,
        params.iterations,
        params.mode,
        session.adapter_name()
    );
    let args = KernelArgs::new(params.td, params.h, rows, cols, device_iterations);
    let outcome = run(&session, params, &source, &args, &initial, observer);
    let transfer = session.transfer_stats();
    let adapter = session.adapter_name().to_string();
    session.close();

    let (state, dispatches) = outcome?;
    matrix.copy_from_flat(&state)?;

    let elapsed = started.elapsed();
    info!(
        "Solve finished: {} dispatches, {} bytes up, {} bytes down, {:?}",
        dispatches, transfer.bytes_to_gpu, transfer.bytes_from_gpu, elapsed
    );
    Ok(SolveReport {
        iterations: params.iterations,
        dispatches,
        mode: params.mode,
        adapter: Some(adapter),
        transfer,
        elapsed,
    })
}

/// Everything that needs the open session. Program, buffers and bindings are
/// dropped here, before the caller closes the session.
fn run<S: ComputeSession>(
    session: &S,
    params: &HeatDiffusion,
    source: &str,
    args: &KernelArgs,
    initial: &[f64],
    mut observer: Option<StepObserver<'_>>,
) -> Result<(Vec<f64>, usize), HeatError> {
    let (rows, cols) = (args.rows as usize, args.cols as usize);
    let program = session.compile(source, &params.entry_point)?;

    // INIT
    let mut pair = BufferPair::allocate(session, rows, cols)?;
    // UPLOAD
    session.upload(pair.old_state(), initial)?;
    debug!("Uploaded {} bytes of initial state", pair.size_bytes());

    if params.mode == DispatchMode::DeviceIterated {
        let binding = session.bind(&program, pair.old_state(), pair.new_state(), args)?;
        session.launch(&program, &binding, WORKGROUP_SIZE)?;
        session.sync()?;
        let state = session.download(pair.new_state())?;
        if let Some(observe) = observer.as_mut() {
            observe(params.iterations, &HostMatrix::from_flat(&state, rows, cols)?);
        }
        return Ok((state, 1));
    }

    // One binding per buffer orientation, created on first use.
    let mut bindings: [Option<S::Binding>; 2] = [None, None];
    let mut observed: Option<Vec<f64>> = None;
    for step in 1..=params.iterations {
        let slot = pair.orientation();
        let binding = match bindings[slot].take() {
            Some(binding) => binding,
            None => session.bind(&program, pair.old_state(), pair.new_state(), args)?,
        };
        session.launch(&program, &binding, args.cells())?;
        session.sync()?;
        bindings[slot] = Some(binding);
        pair.swap();
        trace!("Step {}/{} complete", step, params.iterations);

        if let Some(observe) = observer.as_mut() {
            let state = session.download(pair.old_state())?;
            observe(step, &HostMatrix::from_flat(&state, rows, cols)?);
            observed = Some(state);
        }
    }

    // After the final swap the latest state sits in the old-state buffer.
    let state = match observed {
        Some(state) => state,
        None => session.download(pair.old_state())?,
    };
    Ok((state, params.iterations))
}
