use std::io::{Read, Write};

use data_encoding::BASE64;
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use raven_config::Encoding;
use serde_json::Value;

use crate::TransportError;

/// An encoded event document ready to be shipped.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Payload {
    /// The encoded body.
    pub data: Vec<u8>,
    /// Content type matching the encoding of `data`.
    pub content_type: &'static str,
}

impl Payload {
    /// Returns the body as text. Both encodings produce valid UTF-8.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.data).unwrap_or_default()
    }
}

/// Encodes a document.
///
/// [`Encoding::Json`] produces plain JSON. [`Encoding::Gzip`] deflates the JSON with zlib and
/// encodes the result in base64.
pub fn encode(document: &Value, encoding: Encoding) -> Result<Payload, TransportError> {
    let json = serde_json::to_vec(document)?;

    let data = match encoding {
        Encoding::Json => json,
        Encoding::Gzip => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&json).map_err(TransportError::Compress)?;
            let compressed = encoder.finish().map_err(TransportError::Compress)?;
            BASE64.encode(&compressed).into_bytes()
        }
    };

    Ok(Payload {
        data,
        content_type: encoding.content_type(),
    })
}

/// Decodes a payload produced by [`encode`].
pub fn decode(data: &[u8], encoding: Encoding) -> Result<Value, TransportError> {
    match encoding {
        Encoding::Json => Ok(serde_json::from_slice(data)?),
        Encoding::Gzip => {
            let compressed = BASE64
                .decode(data)
                .map_err(|e| TransportError::Compress(std::io::Error::other(e)))?;
            let mut json = Vec::new();
            ZlibDecoder::new(compressed.as_slice())
                .read_to_end(&mut json)
                .map_err(TransportError::Compress)?;
            Ok(serde_json::from_slice(&json)?)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use similar_asserts::assert_eq;

    use super::*;

    fn document() -> Value {
        json!({
            "event_id": "52df9022835246eeb317dbd739ccd059",
            "message": "héllo",
            "extra": {"nested": [1, 2.5, null, true]}
        })
    }

    #[test]
    fn test_json_round_trip() {
        let payload = encode(&document(), Encoding::Json).unwrap();
        assert_eq!(payload.content_type, "application/json");
        assert!(payload.as_str().starts_with('{'));
        assert_eq!(decode(&payload.data, Encoding::Json).unwrap(), document());
    }

    #[test]
    fn test_gzip_is_base64_zlib() {
        let payload = encode(&document(), Encoding::Gzip).unwrap();
        assert_eq!(payload.content_type, "application/octet-stream");

        // zlib streams with default compression start with 0x78 0x9c, which is "eJ" in base64.
        assert!(payload.as_str().starts_with("eJ"));
        assert_eq!(decode(&payload.data, Encoding::Gzip).unwrap(), document());
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            decode(b"not base64!", Encoding::Gzip),
            Err(TransportError::Compress(_))
        ));
        assert!(matches!(
            decode(b"{", Encoding::Json),
            Err(TransportError::Encode(_))
        ));
    }
}
