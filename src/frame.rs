//! Length-prefixed framing for binary responses.
//!
//! Wire format: `[4 bytes: little-endian u32 = N][N bytes: UTF-8 JSON
//! metadata envelope][remaining bytes: raw payload]`. Everything after the
//! declared metadata length is opaque payload, regardless of content.

use thiserror::Error;

pub const METADATA_PREFIX_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame too short for length prefix: got {got_bytes} bytes")]
    MissingPrefix { got_bytes: usize },
    #[error("frame metadata truncated: declared {declared_bytes} bytes, {available_bytes} available")]
    TruncatedMetadata {
        declared_bytes: usize,
        available_bytes: usize,
    },
    #[error("metadata length {0} exceeds u32")]
    MetadataTooLarge(usize),
}

/// Concatenates the length prefix, metadata, and payload into one frame.
pub fn encode(metadata: &[u8], payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let declared =
        u32::try_from(metadata.len()).map_err(|_| FrameError::MetadataTooLarge(metadata.len()))?;

    let mut frame = Vec::with_capacity(METADATA_PREFIX_LEN + metadata.len() + payload.len());
    frame.extend_from_slice(&declared.to_le_bytes());
    frame.extend_from_slice(metadata);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Splits a frame into its metadata and payload sections.
pub fn split(frame: &[u8]) -> Result<(&[u8], &[u8]), FrameError> {
    if frame.len() < METADATA_PREFIX_LEN {
        return Err(FrameError::MissingPrefix {
            got_bytes: frame.len(),
        });
    }
    let declared = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
    let rest = &frame[METADATA_PREFIX_LEN..];
    if rest.len() < declared {
        return Err(FrameError::TruncatedMetadata {
            declared_bytes: declared,
            available_bytes: rest.len(),
        });
    }
    Ok(rest.split_at(declared))
}
