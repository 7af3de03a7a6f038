//! The native binary container.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! offset  size  field
//!      0     4  magic "KSBN"
//!      4     2  format version
//!      6     2  reserved, zero
//!      8     4  payload length
//!     12     4  payload CRC-32
//!     16     n  payload: bincode-encoded ShaderBinary
//! ```

use crate::crc::crc32;
use crate::error::{BinaryValidationError, GenerateError};
use crate::lower::LoweredModule;
use kiln_ir::{BindingKind, Function, ShaderStage, Stmt};
use serde::{Deserialize, Serialize};

/// Magic number at the start of every binary.
pub const MAGIC: [u8; 4] = *b"KSBN";

/// Current container format version.
pub const FORMAT_VERSION: u16 = 1;

/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 16;

/// Code-generation switches recorded in the binary so the device can honor
/// them at pipeline creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodegenFlags {
    /// Resource accesses are bounds-checked.
    pub robust_buffer_access: bool,
    /// Workgroup memory is zeroed before the entry point body runs.
    pub zero_initialize_workgroup_memory: bool,
    /// Matrix arguments are passed by pointer.
    pub pass_matrix_by_pointer: bool,
    /// The module requires subgroup-uniform control flow.
    pub subgroup_uniform_control_flow: bool,
    /// Fragment depth writes are clamped.
    pub clamp_frag_depth: bool,
    /// Vertex shaders write point size.
    pub emit_point_size: bool,
}

/// One entry of the binding table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundResource {
    /// Resource name as it appears in the code.
    pub name: String,
    /// Resource kind.
    pub kind: BindingKind,
    /// Destination slots: three for external textures, one otherwise.
    pub slots: Vec<u32>,
}

/// Executable code in one of the two supported forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Code {
    /// Structured statements, as produced by the transforms.
    Structured {
        /// Helper functions.
        functions: Vec<Function>,
        /// Entry point body.
        entry: Vec<Stmt>,
    },
    /// Flat stack-machine instructions.
    Lowered(LoweredModule),
}

/// A decoded native shader module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderBinary {
    /// Pipeline stage.
    pub stage: ShaderStage,
    /// Entry point name.
    pub entry_point: String,
    /// Fixed workgroup size, for compute.
    pub workgroup_size: Option<[u32; 3]>,
    /// Code-generation switches.
    pub flags: CodegenFlags,
    /// Binding table.
    pub bindings: Vec<BoundResource>,
    /// Module code.
    pub code: Code,
}

impl ShaderBinary {
    /// Serializes the module into the container format.
    pub fn encode(&self) -> Result<Vec<u8>, GenerateError> {
        let payload = bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| GenerateError::Encode(e.to_string()))?;
        let len = u32::try_from(payload.len())
            .map_err(|_| GenerateError::Encode("payload exceeds 4 GiB".to_string()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&len.to_le_bytes());
        out.extend_from_slice(&crc32(&payload).to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Decodes a container, checking the header and checksum. Structural
    /// checks of the decoded module are done by
    /// [`validate_binary`](crate::validate_binary).
    pub fn decode(bytes: &[u8]) -> Result<ShaderBinary, BinaryValidationError> {
        let payload = check_header(bytes)?;
        let (binary, read) = bincode::serde::decode_from_slice::<ShaderBinary, _>(
            payload,
            bincode::config::standard(),
        )
        .map_err(|e| BinaryValidationError::Decode(e.to_string()))?;
        if read != payload.len() {
            return Err(BinaryValidationError::Decode(format!(
                "{} trailing bytes after module",
                payload.len() - read
            )));
        }
        Ok(binary)
    }
}

/// Checks magic, version, length, and checksum, returning the payload.
pub fn check_header(bytes: &[u8]) -> Result<&[u8], BinaryValidationError> {
    if bytes.len() < HEADER_LEN {
        return Err(BinaryValidationError::TooShort(bytes.len()));
    }
    if bytes[0..4] != MAGIC {
        return Err(BinaryValidationError::BadMagic);
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != FORMAT_VERSION {
        return Err(BinaryValidationError::UnsupportedVersion(version));
    }
    let expected = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
    let checksum = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
    let payload = &bytes[HEADER_LEN..];
    if payload.len() != expected {
        return Err(BinaryValidationError::LengthMismatch {
            expected,
            actual: payload.len(),
        });
    }
    if crc32(payload) != checksum {
        return Err(BinaryValidationError::ChecksumMismatch);
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary() -> ShaderBinary {
        ShaderBinary {
            stage: ShaderStage::Fragment,
            entry_point: "main".into(),
            workgroup_size: None,
            flags: CodegenFlags::default(),
            bindings: vec![BoundResource {
                name: "tex".into(),
                kind: BindingKind::Texture,
                slots: vec![0],
            }],
            code: Code::Structured {
                functions: vec![],
                entry: vec![Stmt::Return { value: None }],
            },
        }
    }

    #[test]
    fn encode_decode_preserves_module() {
        let bytes = binary().encode().unwrap();
        assert_eq!(&bytes[0..4], b"KSBN");
        assert_eq!(ShaderBinary::decode(&bytes).unwrap(), binary());
    }

    #[test]
    fn truncated_input() {
        let err = ShaderBinary::decode(b"KSBN").unwrap_err();
        assert_eq!(err, BinaryValidationError::TooShort(4));
    }

    #[test]
    fn corrupted_payload_fails_checksum() {
        let mut bytes = binary().encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert_eq!(
            ShaderBinary::decode(&bytes).unwrap_err(),
            BinaryValidationError::ChecksumMismatch
        );
    }

    #[test]
    fn wrong_version() {
        let mut bytes = binary().encode().unwrap();
        bytes[4] = 9;
        assert_eq!(
            ShaderBinary::decode(&bytes).unwrap_err(),
            BinaryValidationError::UnsupportedVersion(9)
        );
    }

    #[test]
    fn bad_magic() {
        let mut bytes = binary().encode().unwrap();
        bytes[0] = b'X';
        assert_eq!(check_header(&bytes).unwrap_err(), BinaryValidationError::BadMagic);
    }
}
