//! Length-prefixed record framing used by event-stream files.
//!
//! Each record is laid out as:
//!
//! ```text
//! u64 LE  payload length
//! u32 LE  masked crc32c of the 8 length bytes
//! [u8]    payload
//! u32 LE  masked crc32c of the payload
//! ```

use std::io::{self, Read};
use thiserror::Error;

const MASK_DELTA: u32 = 0xa282_ead8;
const LENGTH_BYTES: usize = 8;
const CRC_BYTES: usize = 4;

/// A framing or payload problem. The decoder treats any of these as the end of
/// the readable stream.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("truncated record {section}: expected {expected} bytes, got {got}")]
    Truncated {
        section: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("checksum mismatch on record {section}")]
    Checksum { section: &'static str },

    #[error("undecodable event payload: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Masked crc32c as stored in the framing.
pub fn masked_crc(data: &[u8]) -> u32 {
    let crc = crc32c::crc32c(data);
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

/// Frame `payload` as a single record.
pub fn frame_record(payload: &[u8]) -> Vec<u8> {
    let len = (payload.len() as u64).to_le_bytes();
    let mut out = Vec::with_capacity(LENGTH_BYTES + 2 * CRC_BYTES + payload.len());
    out.extend_from_slice(&len);
    out.extend_from_slice(&masked_crc(&len).to_le_bytes());
    out.extend_from_slice(payload);
    out.extend_from_slice(&masked_crc(payload).to_le_bytes());
    out
}

/// Iterator over record payloads. Stops for good after the first error.
pub struct RecordReader<R> {
    inner: R,
    done: bool,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, done: false }
    }

    fn read_record(&mut self) -> Result<Option<Vec<u8>>, RecordError> {
        let mut len_buf = [0u8; LENGTH_BYTES];
        let got = read_up_to(&mut self.inner, &mut len_buf)?;
        if got == 0 {
            return Ok(None);
        }
        expect_len("length", LENGTH_BYTES, got)?;

        let mut crc_buf = [0u8; CRC_BYTES];
        let got = read_up_to(&mut self.inner, &mut crc_buf)?;
        expect_len("length checksum", CRC_BYTES, got)?;
        if u32::from_le_bytes(crc_buf) != masked_crc(&len_buf) {
            return Err(RecordError::Checksum { section: "length" });
        }

        let len = u64::from_le_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        let got = read_up_to(&mut self.inner, &mut payload)?;
        expect_len("payload", len, got)?;

        let got = read_up_to(&mut self.inner, &mut crc_buf)?;
        expect_len("payload checksum", CRC_BYTES, got)?;
        if u32::from_le_bytes(crc_buf) != masked_crc(&payload) {
            return Err(RecordError::Checksum { section: "payload" });
        }

        Ok(Some(payload))
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Vec<u8>, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(payload)) => Some(Ok(payload)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn expect_len(section: &'static str, expected: usize, got: usize) -> Result<(), RecordError> {
    if got == expected {
        Ok(())
    } else {
        Err(RecordError::Truncated {
            section,
            expected,
            got,
        })
    }
}

// Like `read_exact`, but reports how much was read before EOF instead of failing.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn stream(payloads: &[&[u8]]) -> Vec<u8> {
        payloads.iter().flat_map(|p| frame_record(p)).collect()
    }

    #[test]
    fn test_reads_all_records() {
        let bytes = stream(&[b"first", b"", b"third record"]);
        let records: Vec<_> = RecordReader::new(Cursor::new(bytes))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            records,
            vec![b"first".to_vec(), Vec::new(), b"third record".to_vec()]
        );
    }

    #[test]
    fn test_empty_stream() {
        assert_eq!(RecordReader::new(Cursor::new(Vec::new())).count(), 0);
    }

    #[test]
    fn test_truncated_payload_ends_iteration() {
        let mut bytes = stream(&[b"complete", b"cut short"]);
        bytes.truncate(bytes.len() - 6);
        let mut reader = RecordReader::new(Cursor::new(bytes));
        assert_eq!(reader.next().unwrap().unwrap(), b"complete");
        assert!(matches!(
            reader.next(),
            Some(Err(RecordError::Truncated { section: "payload", .. }))
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_payload_checksum_mismatch() {
        let mut bytes = frame_record(b"payload");
        bytes[14] ^= 0xff;
        let mut reader = RecordReader::new(Cursor::new(bytes));
        assert!(matches!(
            reader.next(),
            Some(Err(RecordError::Checksum { section: "payload" }))
        ));
    }

    #[test]
    fn test_length_checksum_mismatch() {
        let mut bytes = frame_record(b"payload");
        bytes[8] ^= 0x01;
        let mut reader = RecordReader::new(Cursor::new(bytes));
        assert!(matches!(
            reader.next(),
            Some(Err(RecordError::Checksum { section: "length" }))
        ));
    }

    #[test]
    fn test_masked_crc_differs_from_raw_crc() {
        let data = b"events";
        assert_ne!(masked_crc(data), crc32c::crc32c(data));
    }
}
