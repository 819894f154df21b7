//! Length-prefixed `bincode` framing.
//!
//! Each frame is a 4-byte little-endian payload length followed by the payload,
//! encoded with `bincode`'s serde API and standard configuration.

use std::io::{ErrorKind, Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ProtocolError;

/// Largest payload a peer may announce.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Encodes `value` and writes it as one frame, flushing the writer.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<(), ProtocolError> {
    let payload = bincode::serde::encode_to_vec(value, bincode::config::standard()).map_err(|e| {
        ProtocolError::Encode {
            reason: e.to_string(),
        }
    })?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len: payload.len(),
            max: MAX_FRAME_LEN,
        });
    }

    let len = payload.len() as u32;
    let mut output = Vec::with_capacity(4 + payload.len());
    output.extend_from_slice(&len.to_le_bytes());
    output.extend_from_slice(&payload);
    writer.write_all(&output)?;
    writer.flush()?;
    Ok(())
}

/// Reads one frame and decodes it.
///
/// A clean end-of-stream before the length prefix is [`ProtocolError::Closed`];
/// a stream ending inside a frame is an I/O error.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T, ProtocolError> {
    let mut len_bytes = [0u8; 4];
    let mut filled = 0;
    while filled < len_bytes.len() {
        match reader.read(&mut len_bytes[filled..]) {
            Ok(0) if filled == 0 => return Err(ProtocolError::Closed),
            Ok(0) => return Err(std::io::Error::from(ErrorKind::UnexpectedEof).into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }

    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge {
            len,
            max: MAX_FRAME_LEN,
        });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;

    let (value, consumed): (T, usize) =
        bincode::serde::decode_from_slice(&payload, bincode::config::standard()).map_err(|e| {
            ProtocolError::Decode {
                reason: e.to_string(),
            }
        })?;
    if consumed != len {
        return Err(ProtocolError::Decode {
            reason: format!("{} trailing bytes in frame", len - consumed),
        });
    }
    Ok(value)
}
