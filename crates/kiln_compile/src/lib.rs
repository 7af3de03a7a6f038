//! Transformed shader module compilation and the compiled-variant cache.
//!
//! A [`ShaderModule`] wraps a validated [`Program`](kiln_ir::Program) and
//! answers [`get_compiled_variant`](ShaderModule::get_compiled_variant):
//! given a stage, an entry point with override constants, a
//! [`PipelineLayout`], and a few per-pipeline flags, it returns a native
//! module created by the [`Device`], compiling it at most once per
//! [`CacheKey`] for as long as the module lives.
//!
//! Compilation ([`pipeline`]) builds a binding remap from the layout,
//! isolates and renames the entry point, substitutes overrides, validates
//! compute workgroup sizes, generates and validates the binary, and creates
//! the native object. A [`BlobStore`](kiln_blob::BlobStore) can short-circuit
//! the middle of that sequence across runs.
//!
//! The cache ([`CompiledModuleCache`]) borrows the device, so the borrow
//! checker guarantees the device outlives it. Race losers are destroyed
//! immediately; everything stored is handed to deferred deletion on drop.

#![warn(missing_docs)]

pub mod cache;
pub mod device;
pub mod error;
pub mod fingerprint;
pub mod key;
pub mod layout;
pub mod module;
pub mod pipeline;
pub mod remap;
pub mod software;

pub use cache::{CacheEntry, CacheStats, CompiledModuleCache};
pub use device::{Device, DeviceError, NativeModuleHandle};
pub use error::{CompileError, ErrorKind};
pub use key::{CacheKey, OverrideConstants};
pub use layout::{BindGroupLayoutEntry, LayoutError, LayoutId, PipelineLayout};
pub use module::{ProgrammableStage, ShaderModule};
pub use pipeline::{compile_variant, CompileContext, CompileRequest, CompiledVariant};
pub use remap::{build_binding_remap, RemapOutcome};
pub use software::{DeviceStats, SoftwareDevice};
