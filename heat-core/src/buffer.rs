use crate::context::DeviceSession;
use crate::error::{HeatError, Result};
use crate::traits::{ComputeSession, Vector};
use std::mem;

/// A device-resident `f64` array backed by a `wgpu::Buffer`.
///
/// The buffer is destroyed when this value drops.
#[derive(Debug)]
pub struct DeviceBuffer {
    buffer: wgpu::Buffer,
    len: usize,
    usage: wgpu::BufferUsages,
    label: String,
}

impl DeviceBuffer {
    /// Allocates an uninitialised storage buffer for `len` values.
    pub(crate) fn allocate(session: &DeviceSession, label: &str, len: usize) -> Result<Self> {
        if len == 0 {
            return Err(HeatError::AllocationError(format!(
                "Cannot create device buffer '{}' with size 0",
                label
            )));
        }
        let usage = wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST;
        let byte_size = len.checked_mul(mem::size_of::<f64>()).ok_or_else(|| {
            HeatError::AllocationError(format!("'{}': {} values overflow", label, len))
        })? as u64;
        let buffer = session.create_empty_buffer(label, byte_size, usage)?;
        Ok(Self {
            buffer,
            len,
            usage,
            label: label.to_string(),
        })
    }

    pub(crate) fn inner(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn usage(&self) -> wgpu::BufferUsages {
        self.usage
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns a `BindingResource` for the entire buffer.
    pub fn as_entire_binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }
}

impl Vector for DeviceBuffer {
    type Value = f64;

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        log::trace!("Releasing device buffer '{}'", self.label);
        self.buffer.destroy();
    }
}

/// The old/new state buffers of one solve, keyed by the grid shape.
///
/// Both buffers hold exactly `rows * cols` values and are distinct
/// allocations. `swap` exchanges their roles without touching device memory.
#[derive(Debug)]
pub struct BufferPair<B> {
    buffers: [B; 2],
    old: usize,
    rows: usize,
    cols: usize,
}

impl<B: Vector<Value = f64>> BufferPair<B> {
    /// Allocates both state buffers through `session`.
    pub fn allocate<S>(session: &S, rows: usize, cols: usize) -> Result<Self>
    where
        S: ComputeSession<Buffer = B>,
    {
        let cells = rows.checked_mul(cols).filter(|&n| n > 0).ok_or_else(|| {
            HeatError::AllocationError(format!("cannot size state buffers for {}x{}", rows, cols))
        })?;
        let expected_bytes = (cells * mem::size_of::<f64>()) as u64;

        let old = session.allocate("heat old state", cells)?;
        let new = session.allocate("heat new state", cells)?;
        for buffer in [&old, &new] {
            if buffer.len() != cells || buffer.size_bytes() != expected_bytes {
                return Err(HeatError::AllocationError(format!(
                    "state buffer holds {} bytes, expected {}",
                    buffer.size_bytes(),
                    expected_bytes
                )));
            }
        }
        log::debug!(
            "Allocated state buffer pair for {}x{} ({} bytes each)",
            rows,
            cols,
            expected_bytes
        );
        Ok(Self {
            buffers: [old, new],
            old: 0,
            rows,
            cols,
        })
    }

    /// Buffer holding the state the next dispatch reads.
    pub fn old_state(&self) -> &B {
        &self.buffers[self.old]
    }

    /// Buffer the next dispatch writes.
    pub fn new_state(&self) -> &B {
        &self.buffers[1 - self.old]
    }

    /// Exchanges the old and new roles.
    pub fn swap(&mut self) {
        self.old = 1 - self.old;
    }

    /// Index of the physical buffer currently playing "old", 0 or 1.
    pub fn orientation(&self) -> usize {
        self.old
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn size_bytes(&self) -> u64 {
        self.buffers[0].size_bytes()
    }
}
