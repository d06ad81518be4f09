use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HeatError>;

#[derive(Error, Debug)]
pub enum HeatError {
    #[error("No qualifying compute device: {0}")]
    DeviceUnavailable(String),

    #[error("Kernel build failed for entry point '{entry_point}': {}", summarize(.diagnostics))]
    CompileError {
        entry_point: String,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("Device buffer allocation failed: {0}")]
    AllocationError(String),

    #[error("Host/device transfer failed: {0}")]
    TransferError(String),

    #[error("Kernel dispatch failed: {0}")]
    DispatchError(String),

    #[error("Device queue synchronization failed: {0}")]
    SyncError(String),

    #[error("Invalid matrix dimensions: {0}")]
    InvalidDimensions(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl HeatError {
    /// Short stable name of the failure class, handy for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            HeatError::DeviceUnavailable(_) => "device_unavailable",
            HeatError::CompileError { .. } => "compile_error",
            HeatError::AllocationError(_) => "allocation_error",
            HeatError::TransferError(_) => "transfer_error",
            HeatError::DispatchError(_) => "dispatch_error",
            HeatError::SyncError(_) => "sync_error",
            HeatError::InvalidDimensions(_) => "invalid_dimensions",
            HeatError::IoError(_) => "io_error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// One message produced while building a kernel.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// 1-based line in the kernel source, when the compiler reported one.
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            line: None,
            column: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        match (self.line, self.column) {
            (Some(line), Some(column)) => write!(f, "{level} at {line}:{column}: {}", self.message),
            _ => write!(f, "{level}: {}", self.message),
        }
    }
}

fn summarize(diagnostics: &[Diagnostic]) -> String {
    if diagnostics.is_empty() {
        return "no diagnostics reported".to_string();
    }
    diagnostics
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
