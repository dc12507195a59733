//! RV-C Codec Library
//!
//! A specification-driven codec for RV-C, the SAE J1939-derived protocol used
//! on recreational-vehicle CAN networks, plus the status correlator that joins
//! window-shade driver streams into one composite record.
//!
//! # Architecture
//!
//! - A JSON specification document is loaded into an immutable [`SpecTable`]
//!   (DGN → decoder definition). A default document is bundled.
//! - [`Codec`] decodes 8-byte payloads into ordered [`DecodedRecord`]s and
//!   encodes named values into conformant payloads, applying the
//!   compatibility [`OverrideTable`] after generic encoding.
//! - [`StatusCorrelator`] keeps per-driver state and emits a composite
//!   [`Publication`] only when the composite changes.
//!
//! The library does NOT:
//! - Open CAN sockets
//! - Talk to a message broker
//! - Parse command lines
//!
//! Transport lives in the application layer (rvc-bridge).
//!
//! # Example Usage
//!
//! ```no_run
//! use rvc_codec::{BridgeConfig, Codec, FieldInput, StatusCorrelator};
//!
//! let codec = Codec::bundled().unwrap();
//! let config = BridgeConfig::new();
//! let correlator = StatusCorrelator::from_config(&config);
//!
//! // Decode a frame payload
//! let record = codec.decode_hex("1FEDA", "01FFC8FCFF04FFFF").unwrap();
//! println!("{} {}", config.record_topic(&record), record.to_json());
//!
//! if let Ok(Some(publication)) = correlator.update(&record) {
//!     println!("{} {}", publication.topic, publication.payload());
//! }
//!
//! // Encode a command
//! let input = FieldInput::from_json_str(r#"{"instance": 1, "command": "on (duration)"}"#).unwrap();
//! let (dgn, payload) = codec.encode_by_name("DC_DIMMER_COMMAND_2", &input).unwrap();
//! println!("{} {:02X?}", dgn, payload);
//! ```

// Public modules
pub mod codec;
pub mod config;
pub mod correlator;
pub mod formats;
pub mod frame;
pub mod overrides;
pub mod spec;
pub mod types;
pub mod units;

// Re-export main types for convenience
pub use codec::{Codec, DecodedFrame, DecodingIterator};
pub use config::{BridgeConfig, StatusStreams};
pub use correlator::{StatusCorrelator, StatusStream};
pub use frame::{CanFrame, CanId};
pub use overrides::{OverridePatch, OverrideTable};
pub use spec::{SpecStats, SpecTable, PAYLOAD_LEN};
pub use types::{
    CodecError, DecodedRecord, Dgn, FieldInput, InputValue, Publication, RecordValue, Result,
    Timestamp, NOT_AVAILABLE,
};

// Internal modules (not exposed in public API)
mod message_decoder;
mod message_encoder;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: the bundled specification loads
        let codec = Codec::bundled().unwrap();
        assert!(codec.stats().num_definitions > 0);
        assert!(!VERSION.is_empty());
    }
}
