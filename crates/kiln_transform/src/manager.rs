//! Ordered execution of transforms.

use crate::errors::TransformError;
use kiln_ir::Program;
use std::collections::BTreeMap;

/// A program-to-program rewrite.
pub trait Transform: Send + Sync {
    /// Short name used in logs and internal error messages.
    fn name(&self) -> &'static str;

    /// Rewrites `program`, recording side data in `outputs`.
    fn apply(&self, program: Program, outputs: &mut TransformOutputs)
        -> Result<Program, TransformError>;
}

/// Side data published by transforms for later passes and the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOutputs {
    /// Module-scope renames, original name to new name. Empty unless the
    /// renamer ran.
    pub renamed: BTreeMap<String, String>,
}

impl TransformOutputs {
    /// Returns the new name of `original`, if the renamer changed it.
    pub fn renamed(&self, original: &str) -> Option<&str> {
        self.renamed.get(original).map(String::as_str)
    }

    /// Returns the original name of a renamed symbol, or `name` itself if no
    /// rename produced it.
    pub fn original_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.renamed
            .iter()
            .find(|(_, new)| new.as_str() == name)
            .map(|(old, _)| old.as_str())
            .unwrap_or(name)
    }
}

/// Runs a sequence of transforms in insertion order.
#[derive(Default)]
pub struct Manager {
    transforms: Vec<Box<dyn Transform>>,
}

impl Manager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a transform.
    pub fn add(&mut self, transform: impl Transform + 'static) -> &mut Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// Returns the names of the queued transforms, in run order.
    pub fn names(&self) -> Vec<&'static str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    /// Runs every transform, stopping at the first failure.
    pub fn run(&self, mut program: Program) -> Result<(Program, TransformOutputs), TransformError> {
        let mut outputs = TransformOutputs::default();
        for transform in &self.transforms {
            tracing::trace!(transform = transform.name(), "applying transform");
            program = transform.apply(program, &mut outputs).map_err(|err| {
                tracing::debug!(transform = transform.name(), %err, "transform failed");
                err
            })?;
        }
        Ok((program, outputs))
    }
}
