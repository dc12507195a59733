//! Specification table and document loader
//!
//! This module contains the typed specification table the codec decodes and
//! encodes against, and the loader for the JSON specification document.

pub mod loader;
pub mod table;

// Re-export key types for convenience
pub use loader::{bundled_spec, load_spec_file, parse_spec_str};
pub use table::{
    claimed_masks, DataType, DecoderDefinition, FieldDefinition, Span, SpecStats, SpecTable,
    ValueTable, PAYLOAD_LEN,
};
