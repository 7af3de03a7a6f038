//! Compilation errors and their diagnostic codes.
//!
//! Codes `V200`--`V207` are raised by the pipeline itself; transforms use
//! `V210`--`V213` and output validation `V220`.

use crate::device::DeviceError;
use kiln_codegen::GenerateError;
use kiln_common::InternalError;
use kiln_diagnostics::{Category, Diagnostic, DiagnosticCode};
use kiln_ir::IrError;
use kiln_transform::TransformError;

/// A binding used by the entry point is not in the pipeline layout.
pub const V200: DiagnosticCode = DiagnosticCode::new(Category::Validation, 200);

/// Workgroup width is not a multiple of the required full-subgroup size.
pub const V201: DiagnosticCode = DiagnosticCode::new(Category::Validation, 201);

/// Workgroup size exceeds device limits.
pub const V202: DiagnosticCode = DiagnosticCode::new(Category::Validation, 202);

/// A supplied override constant is not declared by the program.
pub const V203: DiagnosticCode = DiagnosticCode::new(Category::Validation, 203);

/// Requested stage does not match the entry point's stage.
pub const V204: DiagnosticCode = DiagnosticCode::new(Category::Validation, 204);

/// A binding's kind does not match the pipeline layout.
pub const V205: DiagnosticCode = DiagnosticCode::new(Category::Validation, 205);

/// The program is malformed.
pub const V206: DiagnosticCode = DiagnosticCode::new(Category::Validation, 206);

/// One override is initialized by more than one constant.
pub const V207: DiagnosticCode = DiagnosticCode::new(Category::Validation, 207);

/// A compiled binary could not be written to the blob store.
pub const W200: DiagnosticCode = DiagnosticCode::new(Category::Warning, 200);

/// How a [`CompileError`] should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A compiler bug; not retryable.
    Internal,
    /// The request is invalid; reported to the user.
    Validation,
    /// The device could not create the native object; fatal.
    Device,
}

/// A failure compiling a shader variant. Nothing is retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// A transform hit an internal failure.
    #[error("transform failed: {0}")]
    Transform(TransformError),

    /// Binary generation failed.
    #[error("binary generation failed: {0}")]
    Generation(#[from] GenerateError),

    /// The request failed validation.
    #[error("{}", .0.message)]
    Validation(Diagnostic),

    /// The generated binary failed post-generation validation.
    #[error("{}", .0.message)]
    OutputValidation(Diagnostic),

    /// The device failed to create the native module.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// An internal invariant was violated.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl CompileError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::Transform(_) | CompileError::Generation(_) | CompileError::Internal(_) => {
                ErrorKind::Internal
            }
            CompileError::Validation(_) | CompileError::OutputValidation(_) => ErrorKind::Validation,
            CompileError::Device(_) => ErrorKind::Device,
        }
    }

    /// The structured diagnostic, for validation failures.
    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        match self {
            CompileError::Validation(d) | CompileError::OutputValidation(d) => Some(d),
            _ => None,
        }
    }

    /// Builds a validation error.
    pub fn validation(diag: Diagnostic) -> Self {
        CompileError::Validation(diag)
    }
}

impl From<TransformError> for CompileError {
    fn from(err: TransformError) -> Self {
        match err.to_diagnostic() {
            Some(diag) => CompileError::Validation(diag),
            None => CompileError::Transform(err),
        }
    }
}

impl From<IrError> for CompileError {
    fn from(err: IrError) -> Self {
        CompileError::Validation(
            Diagnostic::error(V206, format!("malformed program: {err}"))
                .with_note("the program must pass validation before variants are compiled"),
        )
    }
}
