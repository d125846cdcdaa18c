//! Value codecs for the key-value store.
//!
//! Stored values carry a `!` prefix so the spreadsheet never types them as
//! numbers, booleans or formulas.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sheetdb_core::{CodecError, CodecKind};
use std::fmt::Debug;

const PREFIX: char = '!';

/// Converts between caller bytes and the text kept in the value column.
pub trait ValueCodec: Send + Sync + Debug {
    fn encode(&self, value: &[u8]) -> Result<String, CodecError>;
    fn decode(&self, stored: &str) -> Result<Vec<u8>, CodecError>;
}

/// UTF-8 text behind a `!` prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicCodec;

impl ValueCodec for BasicCodec {
    fn encode(&self, value: &[u8]) -> Result<String, CodecError> {
        let text = std::str::from_utf8(value).map_err(|_| CodecError::InvalidUtf8)?;
        Ok(format!("{}{}", PREFIX, text))
    }

    fn decode(&self, stored: &str) -> Result<Vec<u8>, CodecError> {
        strip(stored).map(|s| s.as_bytes().to_vec())
    }
}

/// Arbitrary bytes, standard base64 behind a `!` prefix.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Codec;

impl ValueCodec for Base64Codec {
    fn encode(&self, value: &[u8]) -> Result<String, CodecError> {
        Ok(format!("{}{}", PREFIX, STANDARD.encode(value)))
    }

    fn decode(&self, stored: &str) -> Result<Vec<u8>, CodecError> {
        STANDARD
            .decode(strip(stored)?)
            .map_err(|e| CodecError::InvalidBase64 {
                reason: e.to_string(),
            })
    }
}

fn strip(stored: &str) -> Result<&str, CodecError> {
    stored
        .strip_prefix(PREFIX)
        .ok_or(CodecError::MissingPrefix { expected: PREFIX })
}

/// Codec selected by configuration.
pub fn codec_for(kind: CodecKind) -> Box<dyn ValueCodec> {
    match kind {
        CodecKind::Basic => Box::new(BasicCodec),
        CodecKind::Base64 => Box::new(Base64Codec),
    }
}
