use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub text: String,
    pub encoding_label: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("failed to decode record with {encoding}: {message}")]
    DecodeFailure { encoding: String, message: String },
}

/// Decode a raw record into UTF-8 using: BOM -> strict UTF-8 -> chardetng fallback.
///
/// Old PGN archives are often Latin-1, which chardetng reports as windows-1252.
pub fn decode_record(bytes: &[u8]) -> Result<DecodedRecord, DecodeError> {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(DecodedRecord {
            text: text.to_string(),
            encoding_label: UTF_8.name().to_string(),
        });
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let enc = detector.guess(None, true);
    decode_with(bytes, enc)
}

fn decode_with(bytes: &[u8], enc: &'static Encoding) -> Result<DecodedRecord, DecodeError> {
    // `decode` strips a matching BOM.
    let (text, used, had_errors) = enc.decode(bytes);
    if had_errors {
        return Err(DecodeError::DecodeFailure {
            encoding: used.name().to_string(),
            message: "invalid byte sequence".into(),
        });
    }
    Ok(DecodedRecord {
        text: text.into_owned(),
        encoding_label: used.name().to_string(),
    })
}
