//! Native shader binary generation for the software backend.
//!
//! This crate turns a fully transformed [`kiln_ir::Program`] (one entry point,
//! no overrides) into the backend's binary container. Generation applies the
//! binding remap, fragment-depth clamping, and point-size emission, then
//! emits either structured code or the lowered stack-machine form
//! ([`lower`]). [`validate_binary`] re-reads an encoded container and checks
//! it for internal consistency before it is handed to a device.

#![warn(missing_docs)]

pub mod binary;
pub mod crc;
pub mod error;
pub mod generate;
pub mod lower;
pub mod remap;
pub mod validate;

pub use binary::{BoundResource, Code, CodegenFlags, ShaderBinary};
pub use error::{BinaryValidationError, GenerateError, V220};
pub use generate::{generate, GeneratedBinary, GeneratorOptions};
pub use lower::{lower, Instr, LowerOptions, LoweredFunction, LoweredModule};
pub use remap::{BindingRemap, ExternalTextureSlots, RemapTarget};
pub use validate::validate_binary;
