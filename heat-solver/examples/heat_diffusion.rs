//! Diffuses a hot spot across a square plate.
//!
//! Usage: `cargo run --example heat_diffusion [config.json] [kernel.wgsl]`
//!
//! The optional JSON config deserializes into `HeatDiffusion`; missing fields
//! keep their defaults. Without a kernel path the bundled kernel for the
//! configured mode is used.

use heat_solver::{
    algorithms::{DispatchMode, HeatDiffusion, StepAlgorithm},
    kernels::{HEAT_MULTI_STEP_WGSL, HEAT_STEP_WGSL},
    GpuBackend, HostMatrix, KernelSource, TransferStats,
};
use std::{env, fs, process};

/// An n x n plate at 0 with a 100 degree square in the middle.
fn create_hot_plate(n: usize) -> HostMatrix {
    let mut plate = HostMatrix::zeros(n, n);
    let (lo, hi) = (n * 2 / 5, n * 3 / 5);
    for row in lo..hi {
        for col in lo..hi {
            if let Some(cell) = plate.get_mut(row, col) {
                *cell = 100.0;
            }
        }
    }
    plate
}

fn load_config(path: Option<&String>) -> HeatDiffusion {
    let Some(path) = path else {
        return HeatDiffusion::with_params(0.2, 1.0, 500);
    };
    let parsed = fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()));
    match parsed {
        Ok(config) => config,
        Err(e) => {
            log::error!("Could not read config '{}': {}", path, e);
            process::exit(2);
        }
    }
}

fn main() {
    // Initialize logging based on RUST_LOG environment variable
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .filter_module("wgpu", log::LevelFilter::Off)
        .init();

    let args: Vec<String> = env::args().collect();
    let algorithm = load_config(args.get(1));
    let kernel = match args.get(2) {
        Some(path) => KernelSource::from_path(path),
        None => match algorithm.mode {
            DispatchMode::HostDriven => KernelSource::literal(HEAT_STEP_WGSL),
            DispatchMode::DeviceIterated => KernelSource::literal(HEAT_MULTI_STEP_WGSL),
        },
    };

    let n = 256;
    log::info!("Setting up {}x{} plate with a hot square...", n, n);
    let mut plate = create_hot_plate(n);
    let initial_heat: f64 = plate.columns().iter().flatten().sum();

    let backend = GpuBackend::new();
    log::info!("Device policy: {:?}", backend.policy());
    for (adapter, qualifies) in backend.list_adapters() {
        let status = if qualifies { "candidate" } else { "skipped" };
        log::info!("  Found adapter: {} [{}]", adapter, status);
    }

    log::info!("Running GPU heat diffusion...");
    log::info!("  Time delta: {}", algorithm.td);
    log::info!("  Spatial step: {}", algorithm.h);
    log::info!("  Iterations: {}", algorithm.iterations);
    log::info!("  Mode: {:?}", algorithm.mode);

    match algorithm.solve(&backend, &kernel, &mut plate) {
        Ok(report) => {
            let TransferStats {
                bytes_to_gpu,
                bytes_from_gpu,
            } = report.transfer;
            let final_heat: f64 = plate.columns().iter().flatten().sum();
            log::info!("\nSolve finished successfully!");
            log::info!("  Adapter: {}", report.adapter.as_deref().unwrap_or("none"));
            log::info!("  Dispatches: {}", report.dispatches);
            log::info!("  Bytes CPU -> GPU: {}", bytes_to_gpu);
            log::info!("  Bytes GPU -> CPU: {}", bytes_from_gpu);
            log::info!("  Time elapsed: {:?}", report.elapsed);
            log::info!("  Total heat: {:.3} -> {:.3}", initial_heat, final_heat);
            log::debug!("  Centre temperature: {:?}", plate.get(n / 2, n / 2));
        }
        Err(e) => {
            log::error!("\nSolve failed ({}): {}", e.kind(), e);
            process::exit(1);
        }
    }
}
