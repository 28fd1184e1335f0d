//! Binary module format
//!
//! ## Wire format
//!
//! ```text
//! Header:   b"KILN" | version(u16) | module_name(str) | next_temp(u32)
//! Sections: tag(u8) | body, in this order:
//!   TYPES      count(u32) | [type]       children before parents
//!   GLOBALS    count(u32) | [global]
//!   FUNCTIONS  count(u32) | [function]
//!   ATTRIBUTES count(u32) | [function(u32) | index | attribute]
//!   TARGET     triple(str) | data_layout(str)
//!   END
//! Integers are little-endian; str is len(u32) + UTF-8 bytes; types are
//! referenced by their index in the type table.
//! ```
//!
//! Encoding is a pure function of the module, so equal modules give
//! identical bytes.

mod reader;
mod writer;

pub use reader::decode;
pub use writer::encode;

use kiln_common::SerializationError;
use kiln_ir::VerifiedModule;
use log::info;
use std::io::Write;
use thiserror::Error;

pub const MAGIC: &[u8; 4] = b"KILN";
pub const VERSION: u16 = 1;

// ── section tags ────────────────────────────────────────────────────────────
const SECTION_TYPES: u8 = 0x01;
const SECTION_GLOBALS: u8 = 0x02;
const SECTION_FUNCTIONS: u8 = 0x03;
const SECTION_ATTRIBUTES: u8 = 0x04;
const SECTION_TARGET: u8 = 0x05;
const SECTION_END: u8 = 0xFF;

// ── type tags ───────────────────────────────────────────────────────────────
const TY_VOID: u8 = 0x00;
const TY_INT: u8 = 0x01;
const TY_F32: u8 = 0x02;
const TY_F64: u8 = 0x03;
const TY_PTR: u8 = 0x04;
const TY_ARRAY: u8 = 0x05;
const TY_FUNCTION: u8 = 0x06;

// ── value tags ──────────────────────────────────────────────────────────────
const VAL_TEMP: u8 = 0x00;
const VAL_CONST_INT: u8 = 0x01;
const VAL_CONST_FLOAT: u8 = 0x02;
const VAL_NULL: u8 = 0x03;
const VAL_GLOBAL: u8 = 0x04;
const VAL_FUNCTION: u8 = 0x05;
const VAL_ARGUMENT: u8 = 0x06;
const VAL_UNDEF: u8 = 0x07;

// ── initializer tags ────────────────────────────────────────────────────────
const INIT_NONE: u8 = 0x00;
const INIT_BYTES: u8 = 0x01;
const INIT_INT: u8 = 0x02;
const INIT_FLOAT: u8 = 0x03;
const INIT_ZERO: u8 = 0x04;

// ── attribute tags ──────────────────────────────────────────────────────────
const ATTR_INDEX_FUNCTION: u8 = 0x00;
const ATTR_INDEX_RETURN: u8 = 0x01;
const ATTR_INDEX_PARAM: u8 = 0x02;

const ATTR_NOCAPTURE: u8 = 0x00;
const ATTR_NOUNWIND: u8 = 0x01;
const ATTR_READONLY: u8 = 0x02;
const ATTR_NONNULL: u8 = 0x03;
const ATTR_NORETURN: u8 = 0x04;
const ATTR_DEREFERENCEABLE: u8 = 0x05;
const ATTR_ALIGN: u8 = 0x06;

const LINKAGE_EXTERNAL: u8 = 0x00;
const LINKAGE_INTERNAL: u8 = 0x01;

/// Why a byte stream is not a module
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Not a kiln module: bad magic")]
    BadMagic,

    #[error("Unsupported bitcode version {0}")]
    UnsupportedVersion(u16),

    #[error("Unexpected end of data at offset {offset} while reading {what}")]
    UnexpectedEof { what: &'static str, offset: usize },

    #[error("Invalid UTF-8 in string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("Unknown {what} tag {tag:#04x} at offset {offset}")]
    UnknownTag { what: &'static str, tag: u8, offset: usize },

    #[error("Expected section {expected:#04x}, found {found:#04x}")]
    UnexpectedSection { expected: u8, found: u8 },

    #[error("Type index {0} is out of range")]
    BadTypeIndex(u32),

    #[error("Malformed module: {0}")]
    Malformed(String),

    #[error("{0} trailing byte(s) after the end section")]
    TrailingBytes(usize),
}

/// Encode a verified module and write it to `sink`
pub fn serialize<W: Write>(module: &VerifiedModule<'_>, sink: &mut W) -> Result<(), SerializationError> {
    let bytes = encode(module);
    sink.write_all(&bytes)?;
    sink.flush()?;
    info!("Wrote module '{}' as {} bytes of bitcode", module.name, bytes.len());
    Ok(())
}
