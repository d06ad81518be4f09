//! # Heat Core Library
//!
//! Device-facing layer of the heat-diffusion engine: device selection, the
//! wgpu compute session, state buffers, kernel compilation and the host/kernel
//! matrix layout conversion.

pub mod buffer;
pub mod context;
pub mod device;
pub mod error;
pub mod kernel;
pub mod layout;
pub mod matrix;
pub mod program;
pub mod traits;

// Re-export public types
pub use buffer::{BufferPair, DeviceBuffer};
pub use context::{DeviceSession, TransferStats};
pub use device::{AdapterSummary, Ambiguity, BackendKind, DevicePolicy, GpuBackend, GpuKind};
pub use error::{Diagnostic, HeatError, Severity};
pub use kernel::{KernelArgs, KernelSource, DEFAULT_ENTRY_POINT, WORKGROUP_SIZE};
pub use matrix::HostMatrix;
pub use program::{KernelBinding, KernelProgram};

pub use traits::{ComputeBackend, ComputeSession, Matrix, Vector};
