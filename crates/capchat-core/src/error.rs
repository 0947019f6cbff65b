//! Error types for the CapChat core.
//!
//! Authorization failures are deliberately absent here: they are reported as
//! [`Event::Unauthorized`](crate::event::Event::Unauthorized) records on a
//! successful return, never as errors. The only error class at this layer is
//! malformed input of the wrong fixed width, rejected before any state is
//! read.

use thiserror::Error;

/// Errors produced when decoding fixed-width values from external input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    /// Input had the wrong number of bytes for a fixed-width field
    #[error("invalid {field} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Field being decoded
        field: &'static str,
        /// Required width in bytes
        expected: usize,
        /// Width that was supplied
        actual: usize,
    },

    /// Text form was not valid hex
    #[error("invalid hex in {field}: {reason}")]
    InvalidHex {
        /// Field being decoded
        field: &'static str,
        /// Decoder message
        reason: String,
    },
}

impl EncodingError {
    /// Field name the error refers to.
    pub fn field(&self) -> &'static str {
        match self {
            Self::InvalidLength { field, .. } | Self::InvalidHex { field, .. } => field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_field_and_widths() {
        let err = EncodingError::InvalidLength { field: "identity key", expected: 32, actual: 31 };
        assert_eq!(err.to_string(), "invalid identity key length: expected 32 bytes, got 31");
        assert_eq!(err.field(), "identity key");
    }
}
