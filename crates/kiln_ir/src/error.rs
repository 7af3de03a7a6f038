//! Well-formedness errors for portable programs.

use crate::resource::BindingPoint;
use crate::types::ShaderStage;

/// A structural problem found by [`Program::validate`](crate::Program::validate)
/// or a reflection query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IrError {
    /// Two module-scope declarations share a name.
    #[error("duplicate module-scope name '{0}'")]
    DuplicateName(String),

    /// Two overrides share a numeric id.
    #[error("override id {0} is declared more than once")]
    DuplicateOverrideId(u32),

    /// Two resources share a binding point.
    #[error("{0} is bound more than once")]
    DuplicateBinding(BindingPoint),

    /// A name does not resolve to a declaration of the expected kind.
    #[error("unresolved {kind} '{name}' in '{scope}'")]
    Unresolved {
        /// What kind of declaration was expected.
        kind: &'static str,
        /// The name that failed to resolve.
        name: String,
        /// The function or entry point containing the reference.
        scope: String,
    },

    /// A call passes the wrong number of arguments.
    #[error("call to '{callee}' in '{scope}' passes {found} arguments, expected {expected}")]
    ArityMismatch {
        /// Callee name.
        callee: String,
        /// The caller.
        scope: String,
        /// Declared parameter count.
        expected: usize,
        /// Supplied argument count.
        found: usize,
    },

    /// The call graph contains a cycle.
    #[error("recursive call chain through '{0}'")]
    Recursion(String),

    /// An entry point's workgroup size is missing or present for the wrong stage.
    #[error("entry point '{name}' for {stage} stage {problem}")]
    WorkgroupSize {
        /// Entry point name.
        name: String,
        /// Entry point stage.
        stage: ShaderStage,
        /// What is wrong.
        problem: &'static str,
    },

    /// A statement writes an input-only builtin or a read-only resource.
    #[error("'{target}' is not writable in '{scope}'")]
    NotWritable {
        /// The builtin or resource written.
        target: String,
        /// The enclosing function or entry point.
        scope: String,
    },

    /// The requested entry point does not exist.
    #[error("no entry point named '{0}'")]
    EntryPointNotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unresolved() {
        let err = IrError::Unresolved {
            kind: "override",
            name: "scale".into(),
            scope: "main".into(),
        };
        assert_eq!(err.to_string(), "unresolved override 'scale' in 'main'");
    }

    #[test]
    fn display_duplicate_binding() {
        let err = IrError::DuplicateBinding(BindingPoint::new(1, 2));
        assert_eq!(err.to_string(), "@group(1) @binding(2) is bound more than once");
    }
}
