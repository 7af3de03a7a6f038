//! Generation and binary-validation failures.

use kiln_diagnostics::{Category, Diagnostic, DiagnosticCode};
use kiln_ir::{BindingKind, BindingPoint};

/// Generated binary failed post-generation validation.
pub const V220: DiagnosticCode = DiagnosticCode::new(Category::Validation, 220);

/// A failure while generating a binary. Every variant indicates a bug in an
/// earlier stage or in the generator itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerateError {
    /// The program does not contain exactly one entry point.
    #[error("expected exactly one entry point, found {0}")]
    EntryPointCount(usize),

    /// An override was not substituted before generation.
    #[error("override '{0}' was not substituted")]
    UnresolvedOverride(String),

    /// A resource has no destination slot.
    #[error("resource '{name}' at {point} has no remap entry")]
    MissingRemap {
        /// Resource name.
        name: String,
        /// Source binding point.
        point: BindingPoint,
    },

    /// A remap entry has the wrong shape for the resource's kind.
    #[error("remap entry for '{name}' does not fit a {kind}")]
    RemapKindMismatch {
        /// Resource name.
        name: String,
        /// Declared kind.
        kind: BindingKind,
    },

    /// A name could not be resolved during lowering.
    #[error("unresolved {kind} '{name}' during lowering")]
    Unresolved {
        /// Declaration kind.
        kind: &'static str,
        /// The name.
        name: String,
    },

    /// The binary could not be serialized.
    #[error("failed to encode binary: {0}")]
    Encode(String),
}

/// A structural problem in an encoded binary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BinaryValidationError {
    /// The input is shorter than the fixed header.
    #[error("binary is {0} bytes, shorter than the header")]
    TooShort(usize),

    /// The magic number does not match.
    #[error("bad magic number")]
    BadMagic,

    /// The format version is not supported.
    #[error("unsupported binary format version {0}")]
    UnsupportedVersion(u16),

    /// The payload length recorded in the header does not match.
    #[error("payload length mismatch: header says {expected}, found {actual}")]
    LengthMismatch {
        /// Length from the header.
        expected: usize,
        /// Actual payload length.
        actual: usize,
    },

    /// The payload checksum does not match.
    #[error("payload checksum mismatch")]
    ChecksumMismatch,

    /// The payload could not be decoded.
    #[error("malformed payload: {0}")]
    Decode(String),

    /// The decoded module is inconsistent.
    #[error("invalid module: {0}")]
    Invalid(String),
}

impl BinaryValidationError {
    /// Converts the failure into a diagnostic.
    pub fn to_diagnostic(&self, entry_point: &str) -> Diagnostic {
        Diagnostic::error(V220, format!("generated binary is invalid: {self}"))
            .with_origin(format!("entry point '{entry_point}'"))
    }
}
