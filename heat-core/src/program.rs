use crate::buffer::DeviceBuffer;
use crate::context::DeviceSession;
use crate::error::{Diagnostic, HeatError, Result, Severity};
use crate::kernel::KernelArgs;
use std::borrow::Cow;
use std::mem;

/// A compiled compute pipeline with its bind group layout.
///
/// Created once per solve and dropped before the session that built it.
#[derive(Debug)]
pub struct KernelProgram {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    entry_point: String,
}

/// Arguments bound to one (old, new) buffer orientation.
#[derive(Debug)]
pub struct KernelBinding {
    bind_group: wgpu::BindGroup,
    _args_buffer: wgpu::Buffer,
}

impl KernelBinding {
    pub(crate) fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}

fn storage_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn to_diagnostic(message: &wgpu::CompilationMessage) -> Diagnostic {
    let severity = match message.message_type {
        wgpu::CompilationMessageType::Error => Severity::Error,
        wgpu::CompilationMessageType::Warning => Severity::Warning,
        wgpu::CompilationMessageType::Info => Severity::Info,
    };
    let diagnostic = Diagnostic::new(severity, message.message.clone());
    match message.location {
        Some(location) => diagnostic.at(location.line_number, location.line_position),
        None => diagnostic,
    }
}

impl KernelProgram {
    /// Builds `source` and extracts `entry_point` as a compute pipeline.
    pub(crate) fn compile(
        session: &DeviceSession,
        source: &str,
        entry_point: &str,
    ) -> Result<Self> {
        log::info!("Compiling kernel entry point '{}'", entry_point);
        let device = &session.device;
        let compile_error = |diagnostics: Vec<Diagnostic>| HeatError::CompileError {
            entry_point: entry_point.to_string(),
            diagnostics,
        };

        let (module, error) = session.scoped(|| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("heat kernel"),
                source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(source)),
            })
        });
        let info = pollster::block_on(module.get_compilation_info());
        let mut diagnostics: Vec<Diagnostic> = info.messages.iter().map(to_diagnostic).collect();
        let reported = diagnostics.iter().any(|d| d.severity == Severity::Error);
        if let Some(e) = error {
            if !reported {
                diagnostics.push(Diagnostic::error(e.to_string()));
            }
            return Err(compile_error(diagnostics));
        }
        if reported {
            return Err(compile_error(diagnostics));
        }
        for diagnostic in &diagnostics {
            log::warn!("Kernel build: {}", diagnostic);
        }

        let ((bind_group_layout, pipeline), error) = session.scoped(|| {
            let bind_group_layout =
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Heat Kernel Bind Group Layout"),
                    entries: &[
                        // old_state (f64)
                        storage_entry(0),
                        // args
                        wgpu::BindGroupLayoutEntry {
                            binding: 1,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: wgpu::BufferSize::new(
                                    mem::size_of::<KernelArgs>() as u64,
                                ),
                            },
                            count: None,
                        },
                        // new_state (f64)
                        storage_entry(2),
                    ],
                });
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Heat Kernel Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });
            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("Heat Kernel Pipeline"),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(entry_point),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            });
            (bind_group_layout, pipeline)
        });
        if let Some(e) = error {
            return Err(compile_error(vec![Diagnostic::error(e.to_string())]));
        }

        log::debug!("Kernel '{}' compiled", entry_point);
        Ok(Self {
            pipeline,
            bind_group_layout,
            entry_point: entry_point.to_string(),
        })
    }

    /// Uploads `args` and binds (old, args, new) to this program's layout.
    pub(crate) fn bind(
        &self,
        session: &DeviceSession,
        old: &DeviceBuffer,
        new: &DeviceBuffer,
        args: &KernelArgs,
    ) -> Result<KernelBinding> {
        let args_buffer = session
            .create_buffer_with_data(
                "Heat Kernel Args Buffer",
                bytemuck::bytes_of(args),
                wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            )
            .map_err(|e| HeatError::DispatchError(format!("argument block: {}", e)))?;

        let (bind_group, error) = session.scoped(|| {
            session.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Heat Kernel Bind Group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: old.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: args_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: new.as_entire_binding(),
                    },
                ],
            })
        });
        if let Some(e) = error {
            return Err(HeatError::DispatchError(format!(
                "binding '{}' -> '{}' failed: {}",
                old.label(),
                new.label(),
                e
            )));
        }
        Ok(KernelBinding {
            bind_group,
            _args_buffer: args_buffer,
        })
    }

    pub(crate) fn pipeline(&self) -> &wgpu::ComputePipeline {
        &self.pipeline
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}
