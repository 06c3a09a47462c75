//! Legacy event-stream logs.
//!
//! The first generation of experiments wrote metrics only to binary event
//! streams. This module reads their record framing, decodes the protobuf
//! payloads and renders scalar summaries as canonical log rows.

pub mod decoder;
pub mod proto;
pub mod record;

pub use decoder::{DecodedLog, EventStreamDecoder, ScalarRow};
pub use record::{RecordError, RecordReader, frame_record};
