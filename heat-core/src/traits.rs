use crate::context::TransferStats;
use crate::error::Result;
use crate::kernel::KernelArgs;
use bytemuck::{Pod, Zeroable};
use std::fmt::Debug;

/// Generic trait representing a matrix.
pub trait Matrix: Debug {
    /// The underlying numeric type of the matrix elements.
    type Value: Copy + Debug + Default + Pod + Zeroable;

    /// Returns the dimensions of the matrix as (rows, columns).
    fn dims(&self) -> (usize, usize);

    /// Returns the number of rows.
    fn rows(&self) -> usize {
        self.dims().0
    }

    /// Returns the number of columns.
    fn cols(&self) -> usize {
        self.dims().1
    }

    /// Number of cells, `rows * cols`.
    fn cells(&self) -> usize {
        let (rows, cols) = self.dims();
        rows * cols
    }
}

/// Generic trait representing a vector, host or device resident.
pub trait Vector: Debug {
    /// The underlying numeric type of the vector elements.
    type Value: Copy + Debug + Default + Pod + Zeroable;

    /// Returns the number of elements in the vector.
    fn len(&self) -> usize;

    /// Checks if the vector is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the element storage in bytes.
    fn size_bytes(&self) -> u64 {
        (self.len() * std::mem::size_of::<Self::Value>()) as u64
    }
}

/// Hands out compute sessions. Every device interaction of a solve goes through
/// the session returned by `open`, so nothing touches the device before it.
pub trait ComputeBackend: Debug {
    type Session: ComputeSession;

    /// Selects a device and creates its context and in-order queue.
    fn open(&self) -> Result<Self::Session>;
}

/// An open device session: one device, one context, one in-order queue.
///
/// All calls block until the device has accepted (or, for `sync` and
/// `download`, finished) the work.
pub trait ComputeSession: Debug {
    /// A compiled kernel bound to this session.
    type Program;
    /// A device-resident `f64` array.
    type Buffer: Vector<Value = f64>;
    /// Kernel arguments bound to a concrete (old, new) buffer orientation.
    type Binding;

    /// Human readable name of the selected device.
    fn adapter_name(&self) -> &str;

    fn compile(&self, source: &str, entry_point: &str) -> Result<Self::Program>;

    fn allocate(&self, label: &str, len: usize) -> Result<Self::Buffer>;

    fn upload(&self, buffer: &Self::Buffer, data: &[f64]) -> Result<()>;

    fn bind(
        &self,
        program: &Self::Program,
        old: &Self::Buffer,
        new: &Self::Buffer,
        args: &KernelArgs,
    ) -> Result<Self::Binding>;

    /// Enqueues one dispatch covering `work_items` invocations.
    fn launch(
        &self,
        program: &Self::Program,
        binding: &Self::Binding,
        work_items: u32,
    ) -> Result<()>;

    /// Blocks until the queue has drained.
    fn sync(&self) -> Result<()>;

    fn download(&self, buffer: &Self::Buffer) -> Result<Vec<f64>>;

    fn transfer_stats(&self) -> TransferStats;

    /// Releases the queue and context. Calling it again is a no-op.
    fn close(&mut self);
}
