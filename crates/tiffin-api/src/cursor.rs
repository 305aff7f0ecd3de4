use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;
const CURSOR_VERSION_V1: &str = "v1";
pub const MAX_CURSOR_DEPTH: u32 = 10_000;
const MAX_CURSOR_TOKEN_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum CursorErrorCode {
    InvalidFormat,
    UnsupportedVersion,
    InvalidSignature,
    InvalidPayload,
    CollectionMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorError {
    pub code: CursorErrorCode,
    pub message: String,
}

impl CursorError {
    #[must_use]
    pub fn new(code: CursorErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for CursorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for CursorError {}

/// Keyset position for list endpoints ordered by (created_at, id). The
/// collection name is baked in so a cursor minted for one resource cannot
/// page through another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CursorPayload {
    #[serde(default = "cursor_version_v1")]
    pub cursor_version: String,
    pub collection: String,
    pub last_created_at: String,
    pub last_id: String,
    #[serde(default)]
    pub depth: u32,
}

impl CursorPayload {
    #[must_use]
    pub fn first_page(collection: &str, last_created_at: &str, last_id: &str) -> Self {
        Self {
            cursor_version: cursor_version_v1(),
            collection: collection.to_string(),
            last_created_at: last_created_at.to_string(),
            last_id: last_id.to_string(),
            depth: 0,
        }
    }
}

pub fn encode_cursor(payload: &CursorPayload, secret: &[u8]) -> Result<String, CursorError> {
    let payload_bytes = serde_json::to_vec(payload)
        .map_err(|e| CursorError::new(CursorErrorCode::InvalidPayload, e.to_string()))?;
    let payload_part = URL_SAFE_NO_PAD.encode(payload_bytes);
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| CursorError::new(CursorErrorCode::InvalidPayload, e.to_string()))?;
    mac.update(payload_part.as_bytes());
    let sig = mac.finalize().into_bytes();
    let sig_part = URL_SAFE_NO_PAD.encode(sig);
    Ok(format!("{CURSOR_VERSION_V1}.{payload_part}.{sig_part}"))
}

pub fn decode_cursor(
    token: &str,
    secret: &[u8],
    expected_collection: &str,
) -> Result<CursorPayload, CursorError> {
    if token.len() > MAX_CURSOR_TOKEN_LEN {
        return Err(CursorError::new(
            CursorErrorCode::InvalidFormat,
            "cursor exceeds max length",
        ));
    }
    let (payload_part, sig_part) = parse_cursor_parts(token)?;

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| CursorError::new(CursorErrorCode::InvalidPayload, e.to_string()))?;
    mac.update(payload_part.as_bytes());
    let expected = URL_SAFE_NO_PAD
        .decode(sig_part)
        .map_err(|e| CursorError::new(CursorErrorCode::InvalidFormat, e.to_string()))?;
    mac.verify_slice(&expected).map_err(|_| {
        CursorError::new(
            CursorErrorCode::InvalidSignature,
            "cursor signature mismatch",
        )
    })?;

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_part)
        .map_err(|e| CursorError::new(CursorErrorCode::InvalidFormat, e.to_string()))?;
    let payload: CursorPayload = serde_json::from_slice(&payload_bytes)
        .map_err(|e| CursorError::new(CursorErrorCode::InvalidPayload, e.to_string()))?;

    if payload.cursor_version != CURSOR_VERSION_V1 {
        return Err(CursorError::new(
            CursorErrorCode::UnsupportedVersion,
            "cursor version unsupported",
        ));
    }
    if payload.collection != expected_collection {
        return Err(CursorError::new(
            CursorErrorCode::CollectionMismatch,
            "cursor minted for a different collection",
        ));
    }
    if payload.depth > MAX_CURSOR_DEPTH {
        return Err(CursorError::new(
            CursorErrorCode::InvalidPayload,
            "cursor depth exceeds max",
        ));
    }
    Ok(payload)
}

fn parse_cursor_parts(token: &str) -> Result<(&str, &str), CursorError> {
    let parts: Vec<&str> = token.split('.').collect();
    match parts.as_slice() {
        [version, payload, sig] if *version == CURSOR_VERSION_V1 => Ok((payload, sig)),
        [version, _, _] => Err(CursorError::new(
            CursorErrorCode::UnsupportedVersion,
            format!("unsupported cursor version: {version}"),
        )),
        _ => Err(CursorError::new(
            CursorErrorCode::InvalidFormat,
            "invalid cursor format",
        )),
    }
}

fn cursor_version_v1() -> String {
    CURSOR_VERSION_V1.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-cursor-secret";

    #[test]
    fn round_trip_preserves_position() {
        let payload = CursorPayload::first_page("orders", "2025-03-14T10:00:00Z", "o-1");
        let token = encode_cursor(&payload, SECRET).unwrap();
        let decoded = decode_cursor(&token, SECRET, "orders").unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn tampered_tokens_are_rejected() {
        let payload = CursorPayload::first_page("orders", "2025-03-14T10:00:00Z", "o-1");
        let token = encode_cursor(&payload, SECRET).unwrap();
        let mut tampered = token.clone();
        tampered.replace_range(3..4, if &token[3..4] == "A" { "B" } else { "A" });
        assert!(decode_cursor(&tampered, SECRET, "orders").is_err());
        assert!(decode_cursor(&token, b"other-secret", "orders").is_err());
    }

    #[test]
    fn collection_mismatch_is_rejected() {
        let payload = CursorPayload::first_page("orders", "2025-03-14T10:00:00Z", "o-1");
        let token = encode_cursor(&payload, SECRET).unwrap();
        let err = decode_cursor(&token, SECRET, "reviews").unwrap_err();
        assert_eq!(err.code, CursorErrorCode::CollectionMismatch);
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(decode_cursor("not-a-cursor", SECRET, "orders").is_err());
        assert!(decode_cursor("v2.abc.def", SECRET, "orders").is_err());
    }
}
