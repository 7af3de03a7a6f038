//! Transform failures and their diagnostic codes.
//!
//! Codes `V210`--`V214` cover user-correctable failures (unknown entry point,
//! override values). Internal failures carry no code of their own; the caller
//! reports them as internal compiler errors.

use kiln_diagnostics::{Category, Diagnostic, DiagnosticCode};
use kiln_ir::{OverrideId, ScalarType};

/// Requested entry point does not exist.
pub const V210: DiagnosticCode = DiagnosticCode::new(Category::Validation, 210);

/// Override used by the entry point has neither a supplied value nor a default.
pub const V211: DiagnosticCode = DiagnosticCode::new(Category::Validation, 211);

/// Override value is not representable in the override's type.
pub const V212: DiagnosticCode = DiagnosticCode::new(Category::Validation, 212);

/// Override sizing a workgroup dimension is not a positive integer.
pub const V213: DiagnosticCode = DiagnosticCode::new(Category::Validation, 213);

/// A failure raised by a [`Transform`](crate::Transform).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    /// The entry point to isolate is not declared.
    #[error("entry point '{0}' not found")]
    EntryPointNotFound(String),

    /// An override has no value.
    #[error("override '{name}' ({id}) has no value and no default")]
    MissingOverride {
        /// Original override name.
        name: String,
        /// Override id.
        id: OverrideId,
    },

    /// An override value cannot be converted to the override's type.
    #[error("value {value} is not representable as {ty} for override '{name}'")]
    InvalidOverrideValue {
        /// Original override name.
        name: String,
        /// Declared type.
        ty: ScalarType,
        /// Supplied or default value.
        value: f64,
    },

    /// An override sizing the workgroup does not yield a usable extent.
    #[error("override '{name}' sizes the workgroup but has value {value}")]
    InvalidWorkgroupOverride {
        /// Original override name.
        name: String,
        /// Supplied or default value.
        value: f64,
    },

    /// A transform found the program in a state it cannot handle.
    #[error("{transform}: {message}")]
    Internal {
        /// The failing transform.
        transform: &'static str,
        /// What went wrong.
        message: String,
    },
}

impl TransformError {
    /// Returns `true` for failures the user can correct.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, TransformError::Internal { .. })
    }

    /// Converts a user-correctable failure into a diagnostic. Returns `None`
    /// for internal failures.
    pub fn to_diagnostic(&self) -> Option<Diagnostic> {
        let diag = match self {
            TransformError::EntryPointNotFound(name) => Diagnostic::error(V210, self.to_string())
                .with_origin(format!("entry point '{name}'"))
                .with_help("check the entry point name in the programmable stage"),
            TransformError::MissingOverride { name, .. } => {
                Diagnostic::error(V211, self.to_string())
                    .with_origin(format!("override '{name}'"))
                    .with_help(format!("supply a value for '{name}' in the pipeline constants"))
            }
            TransformError::InvalidOverrideValue { name, .. } => {
                Diagnostic::error(V212, self.to_string()).with_origin(format!("override '{name}'"))
            }
            TransformError::InvalidWorkgroupOverride { name, .. } => {
                Diagnostic::error(V213, self.to_string())
                    .with_origin(format!("override '{name}'"))
                    .with_note("workgroup dimensions must be positive integers")
            }
            TransformError::Internal { .. } => return None,
        };
        Some(diag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_override_diagnostic() {
        let err = TransformError::MissingOverride {
            name: "gain".into(),
            id: OverrideId::from_raw(4),
        };
        let diag = err.to_diagnostic().unwrap();
        assert_eq!(diag.code, V211);
        assert_eq!(diag.message, "override 'gain' (@id(4)) has no value and no default");
        assert_eq!(diag.origin.as_deref(), Some("override 'gain'"));
    }

    #[test]
    fn internal_has_no_diagnostic() {
        let err = TransformError::Internal {
            transform: "Renamer",
            message: "boom".into(),
        };
        assert!(!err.is_user_error());
        assert!(err.to_diagnostic().is_none());
        assert_eq!(err.to_string(), "Renamer: boom");
    }

    #[test]
    fn invalid_value_display() {
        let err = TransformError::InvalidOverrideValue {
            name: "n".into(),
            ty: ScalarType::U32,
            value: -1.0,
        };
        assert_eq!(err.to_string(), "value -1 is not representable as u32 for override 'n'");
    }
}
