use crate::buffer::DeviceBuffer;
use crate::device::{AdapterSummary, DevicePolicy, GpuBackend};
use crate::error::{HeatError, Result};
use crate::kernel::{launch_shape, KernelArgs};
use crate::program::{KernelBinding, KernelProgram};
use crate::traits::{ComputeSession, Vector};
use std::sync::atomic::{AtomicU64, Ordering};
use wgpu::PollType;

/// Error filters every device call is wrapped in, innermost last.
pub(crate) const SCOPE_FILTERS: [wgpu::ErrorFilter; 3] = [
    wgpu::ErrorFilter::OutOfMemory,
    wgpu::ErrorFilter::Internal,
    wgpu::ErrorFilter::Validation,
];

/// Defaults raised to what the adapter offers for the limits that bound the
/// grid size: buffer and binding sizes and the workgroup launch grid.
pub(crate) fn grid_limits(adapter: &wgpu::Limits) -> wgpu::Limits {
    wgpu::Limits {
        max_buffer_size: adapter.max_buffer_size,
        max_storage_buffer_binding_size: adapter.max_storage_buffer_binding_size,
        max_compute_workgroups_per_dimension: adapter.max_compute_workgroups_per_dimension,
        ..wgpu::Limits::default().using_resolution(adapter.clone())
    }
}

/// Bytes moved between host and device during a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub bytes_to_gpu: u64,
    pub bytes_from_gpu: u64,
}

/// One selected adapter with its device and in-order queue.
///
/// Owned by exactly one solve call. Released by `close` or on drop, whichever
/// comes first.
#[derive(Debug)]
pub struct DeviceSession {
    adapter: AdapterSummary,
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    /// Tracks bytes transferred from CPU to GPU.
    bytes_to_gpu: AtomicU64,
    /// Tracks bytes transferred from GPU to CPU.
    bytes_from_gpu: AtomicU64,
    closed: bool,
}

impl DeviceSession {
    /// Selects an adapter under `policy` and creates its device and queue.
    pub fn open(policy: &DevicePolicy) -> Result<Self> {
        pollster::block_on(Self::open_async(policy))
    }

    pub async fn open_async(policy: &DevicePolicy) -> Result<Self> {
        log::info!("Opening wgpu compute session");

        let backends = policy.wgpu_backends();
        let instance = GpuBackend::instance(backends);
        let adapters = instance.enumerate_adapters(backends);
        let summaries: Vec<AdapterSummary> =
            adapters.iter().map(AdapterSummary::from_adapter).collect();
        log::debug!("Enumerated {} adapters", summaries.len());

        let chosen = policy.choose(&summaries)?;
        let summary = summaries[chosen].clone();
        let adapter = adapters.into_iter().nth(chosen).ok_or_else(|| {
            HeatError::DeviceUnavailable(format!("adapter {} disappeared", summary))
        })?;
        log::info!("Selected adapter: {}", summary);

        let limits = grid_limits(&adapter.limits());
        log::debug!(
            "Requesting max_buffer_size {} and max_storage_buffer_binding_size {}",
            limits.max_buffer_size,
            limits.max_storage_buffer_binding_size
        );
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("heat_core device"),
                trace: wgpu::Trace::Off,
                memory_hints: wgpu::MemoryHints::Performance,
                required_features: wgpu::Features::SHADER_F64,
                required_limits: limits,
            })
            .await
            .map_err(|e| {
                HeatError::DeviceUnavailable(format!("Failed to request device: {}", e))
            })?;

        // Everything the engine submits runs inside an error scope; anything
        // that still escapes is logged instead of panicking the host.
        device.on_uncaptured_error(Box::new(|e: wgpu::Error| {
            log::error!("Uncaptured wgpu error: {}", e);
        }));

        log::info!("Device and queue obtained successfully");
        Ok(Self {
            adapter: summary,
            device,
            queue,
            bytes_to_gpu: AtomicU64::new(0),
            bytes_from_gpu: AtomicU64::new(0),
            closed: false,
        })
    }

    /// Runs `op` inside validation, internal and out-of-memory error scopes
    /// and returns the first error the device reported for it.
    pub(crate) fn scoped<T>(&self, op: impl FnOnce() -> T) -> (T, Option<wgpu::Error>) {
        for filter in SCOPE_FILTERS {
            self.device.push_error_scope(filter);
        }
        let value = op();
        let mut first = None;
        for _ in SCOPE_FILTERS {
            let error = pollster::block_on(self.device.pop_error_scope());
            first = first.or(error);
        }
        (value, first)
    }

    /// Helper to create a GPU buffer with initial data and track the transfer size.
    pub(crate) fn create_buffer_with_data(
        &self,
        label: &str,
        contents: &[u8],
        usage: wgpu::BufferUsages,
    ) -> Result<wgpu::Buffer> {
        use wgpu::util::DeviceExt;

        let byte_len = contents.len() as u64;
        log::debug!("Creating GPU buffer '{}' with {} bytes", label, byte_len);
        let (buffer, error) = self.scoped(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents,
                    usage,
                })
        });
        if let Some(e) = error {
            return Err(HeatError::AllocationError(format!("'{}': {}", label, e)));
        }
        self.record_upload(byte_len);
        Ok(buffer)
    }

    /// Helper to create an uninitialised GPU buffer.
    pub(crate) fn create_empty_buffer(
        &self,
        label: &str,
        size: u64,
        usage: wgpu::BufferUsages,
    ) -> Result<wgpu::Buffer> {
        log::debug!("Creating empty GPU buffer '{}' of size {}", label, size);
        let (buffer, error) = self.scoped(|| {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage,
                mapped_at_creation: false,
            })
        });
        match error {
            Some(e) => Err(HeatError::AllocationError(format!("'{}': {}", label, e))),
            None => Ok(buffer),
        }
    }

    /// Blocking copy of `data` into `buffer`; returns once the device holds it.
    pub(crate) fn write_buffer(&self, buffer: &DeviceBuffer, data: &[f64]) -> Result<()> {
        let byte_len = std::mem::size_of_val(data) as u64;
        if byte_len != buffer.size_bytes() {
            return Err(HeatError::TransferError(format!(
                "Upload of {} bytes does not fit buffer '{}' of {} bytes",
                byte_len,
                buffer.label(),
                buffer.size_bytes()
            )));
        }
        if !buffer.usage().contains(wgpu::BufferUsages::COPY_DST) {
            return Err(HeatError::TransferError(format!(
                "Buffer '{}' lacks COPY_DST usage",
                buffer.label()
            )));
        }

        log::debug!("Writing {} bytes to buffer '{}'", byte_len, buffer.label());
        let ((), error) = self.scoped(|| {
            self.queue
                .write_buffer(buffer.inner(), 0, bytemuck::cast_slice(data));
            self.queue.submit(None);
        });
        if let Some(e) = error {
            return Err(HeatError::TransferError(format!(
                "Upload to '{}' failed: {}",
                buffer.label(),
                e
            )));
        }
        self.device.poll(PollType::Wait).map_err(|e| {
            HeatError::TransferError(format!(
                "Upload to '{}' did not complete: {:?}",
                buffer.label(),
                e
            ))
        })?;

        self.record_upload(byte_len);
        Ok(())
    }

    /// Reads the contents of a GPU buffer back to the CPU through a staging buffer.
    pub(crate) fn read_buffer(&self, buffer: &DeviceBuffer) -> Result<Vec<f64>> {
        let size_bytes = buffer.size_bytes();
        if !buffer.usage().contains(wgpu::BufferUsages::COPY_SRC) {
            return Err(HeatError::TransferError(format!(
                "Buffer '{}' lacks COPY_SRC usage",
                buffer.label()
            )));
        }

        let staging = self
            .create_empty_buffer(
                "Readback Staging Buffer",
                size_bytes,
                wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            )
            .map_err(|e| HeatError::TransferError(format!("staging buffer: {}", e)))?;

        let ((), error) = self.scoped(|| {
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Readback Encoder"),
                });
            encoder.copy_buffer_to_buffer(buffer.inner(), 0, &staging, 0, size_bytes);
            self.queue.submit(Some(encoder.finish()));
        });
        if let Some(e) = error {
            return Err(HeatError::TransferError(format!(
                "Copy out of '{}' failed: {}",
                buffer.label(),
                e
            )));
        }

        log::debug!("Mapping staging buffer for '{}'", buffer.label());
        let slice = staging.slice(..);
        let (sender, receiver) = futures::channel::oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            if let Err(e) = sender.send(result) {
                log::error!("Failed to send map result back: {:?}", e);
            }
        });
        self.device.poll(PollType::Wait).map_err(|e| {
            HeatError::TransferError(format!(
                "Readback of '{}' did not complete: {:?}",
                buffer.label(),
                e
            ))
        })?;

        match pollster::block_on(receiver) {
            Ok(Ok(())) => {
                let values = {
                    let data = slice.get_mapped_range();
                    bytemuck::try_cast_slice::<u8, f64>(&data)
                        .map(<[f64]>::to_vec)
                        .map_err(|e| {
                            HeatError::TransferError(format!(
                                "Mapped range of '{}' is not an f64 array: {:?}",
                                buffer.label(),
                                e
                            ))
                        })
                };
                staging.unmap();
                let values = values?;
                self.bytes_from_gpu.fetch_add(size_bytes, Ordering::Relaxed);
                log::trace!(
                    "bytes_from_gpu incremented by {}, now: {}",
                    size_bytes,
                    self.bytes_from_gpu.load(Ordering::Relaxed)
                );
                Ok(values)
            }
            Ok(Err(e)) => Err(HeatError::TransferError(format!(
                "Buffer mapping failed: {}",
                e
            ))),
            Err(_) => Err(HeatError::TransferError(
                "Channel receive error during buffer mapping".to_string(),
            )),
        }
    }

    /// Encodes and submits one compute pass covering `work_items` invocations.
    pub(crate) fn submit_dispatch(
        &self,
        program: &KernelProgram,
        binding: &KernelBinding,
        work_items: u32,
    ) -> Result<()> {
        let max = self.device.limits().max_compute_workgroups_per_dimension;
        let (x, y) = launch_shape(work_items, max)?;
        log::trace!("Dispatching {}x{} workgroups for {} items", x, y, work_items);

        let ((), error) = self.scoped(|| {
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Heat Step Encoder"),
                });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("Heat Step Compute Pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(program.pipeline());
                pass.set_bind_group(0, binding.bind_group(), &[]);
                pass.dispatch_workgroups(x, y, 1);
            }
            self.queue.submit(Some(encoder.finish()));
        });
        match error {
            Some(e) => Err(HeatError::DispatchError(format!(
                "'{}' launch failed: {}",
                program.entry_point(),
                e
            ))),
            None => Ok(()),
        }
    }

    fn record_upload(&self, byte_len: u64) {
        self.bytes_to_gpu.fetch_add(byte_len, Ordering::Relaxed);
        log::trace!(
            "bytes_to_gpu incremented by {}, now: {}",
            byte_len,
            self.bytes_to_gpu.load(Ordering::Relaxed)
        );
    }
}

impl ComputeSession for DeviceSession {
    type Program = KernelProgram;
    type Buffer = DeviceBuffer;
    type Binding = KernelBinding;

    fn adapter_name(&self) -> &str {
        &self.adapter.name
    }

    fn compile(&self, source: &str, entry_point: &str) -> Result<KernelProgram> {
        KernelProgram::compile(self, source, entry_point)
    }

    fn allocate(&self, label: &str, len: usize) -> Result<DeviceBuffer> {
        DeviceBuffer::allocate(self, label, len)
    }

    fn upload(&self, buffer: &DeviceBuffer, data: &[f64]) -> Result<()> {
        self.write_buffer(buffer, data)
    }

    fn bind(
        &self,
        program: &KernelProgram,
        old: &DeviceBuffer,
        new: &DeviceBuffer,
        args: &KernelArgs,
    ) -> Result<KernelBinding> {
        program.bind(self, old, new, args)
    }

    fn launch(
        &self,
        program: &KernelProgram,
        binding: &KernelBinding,
        work_items: u32,
    ) -> Result<()> {
        self.submit_dispatch(program, binding, work_items)
    }

    fn sync(&self) -> Result<()> {
        self.device
            .poll(PollType::Wait)
            .map(|_| ())
            .map_err(|e| HeatError::SyncError(format!("{:?}", e)))
    }

    fn download(&self, buffer: &DeviceBuffer) -> Result<Vec<f64>> {
        self.read_buffer(buffer)
    }

    fn transfer_stats(&self) -> TransferStats {
        TransferStats {
            bytes_to_gpu: self.bytes_to_gpu.load(Ordering::Relaxed),
            bytes_from_gpu: self.bytes_from_gpu.load(Ordering::Relaxed),
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        log::info!("Closing compute session on {}", self.adapter.name);
        self.device.destroy();
        self.closed = true;
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes_capture_backend_failures() {
        assert!(SCOPE_FILTERS.contains(&wgpu::ErrorFilter::Internal));
        assert!(SCOPE_FILTERS.contains(&wgpu::ErrorFilter::Validation));
        assert!(SCOPE_FILTERS.contains(&wgpu::ErrorFilter::OutOfMemory));
    }

    #[test]
    fn test_grid_limits_take_adapter_buffer_sizes() {
        let adapter = wgpu::Limits {
            max_buffer_size: 1 << 34,
            max_storage_buffer_binding_size: u32::MAX,
            max_compute_workgroups_per_dimension: 65_535,
            ..wgpu::Limits::default()
        };
        let limits = grid_limits(&adapter);
        assert_eq!(limits.max_buffer_size, 1 << 34);
        assert_eq!(limits.max_storage_buffer_binding_size, u32::MAX);
        assert!(limits.check_limits(&adapter));
        // 3000 x 3000 f64 cells no longer exceed the binding size.
        assert!(limits.max_storage_buffer_binding_size as u64 >= 3000 * 3000 * 8);
    }

    #[test]
    fn test_transfer_stats_start_at_zero() {
        assert_eq!(
            TransferStats::default(),
            TransferStats {
                bytes_to_gpu: 0,
                bytes_from_gpu: 0
            }
        );
    }
}
