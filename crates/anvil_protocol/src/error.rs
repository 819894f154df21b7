//! Error types for frame encoding and decoding.

/// Errors raised while exchanging frames with a peer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The underlying stream failed.
    #[error("connection I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The peer closed the stream cleanly between frames.
    #[error("connection closed by peer")]
    Closed,

    /// A frame announced a payload larger than the limit.
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Announced payload length.
        len: usize,
        /// Maximum accepted payload length.
        max: usize,
    },

    /// A value could not be encoded.
    #[error("failed to encode frame: {reason}")]
    Encode {
        /// Description of the encoding failure.
        reason: String,
    },

    /// A payload could not be decoded.
    #[error("failed to decode frame: {reason}")]
    Decode {
        /// Description of the decoding failure.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_too_large_display() {
        let err = ProtocolError::FrameTooLarge { len: 20, max: 10 };
        assert_eq!(err.to_string(), "frame of 20 bytes exceeds the 10 byte limit");
    }

    #[test]
    fn io_from() {
        let err: ProtocolError = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset").into();
        assert!(err.to_string().starts_with("connection I/O error"));
    }

    #[test]
    fn decode_display() {
        let err = ProtocolError::Decode {
            reason: "unexpected end".to_string(),
        };
        assert!(err.to_string().contains("unexpected end"));
    }
}
