// SPDX-License-Identifier: Apache-2.0

//! Password hashing and bearer tokens. Tokens are HMAC-SHA256 signed
//! `v1.<payload>.<sig>` strings, the same envelope the pagination cursors
//! use, so a token minted by one deployment never verifies under another
//! secret.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::Duration;
use tiffin_api::ApiError;
use tiffin_model::{Role, User, UserId, REFERRAL_CODE_ALPHABET, REFERRAL_CODE_LEN};

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION_V1: &str = "v1";
const SALT_BYTES: usize = 16;
const DERIVED_KEY_BYTES: usize = 32;
const MAX_TOKEN_LEN: usize = 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TokenClaims {
    pub sub: String,
    pub role: String,
    pub exp: i64,
}

pub(crate) fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex_encode(&bytes)
}

pub(crate) fn generate_referral_code() -> String {
    let mut rng = rand::thread_rng();
    (0..REFERRAL_CODE_LEN)
        .map(|_| REFERRAL_CODE_ALPHABET[rng.gen_range(0..REFERRAL_CODE_ALPHABET.len())] as char)
        .collect()
}

fn derive_key(
    password: &str,
    salt: &str,
    rounds: u32,
) -> Result<[u8; DERIVED_KEY_BYTES], ApiError> {
    let mut out = [0u8; DERIVED_KEY_BYTES];
    pbkdf2::pbkdf2::<HmacSha256>(password.as_bytes(), salt.as_bytes(), rounds, &mut out)
        .map_err(|e| ApiError::internal(format!("key derivation failed: {e}")))?;
    Ok(out)
}

pub(crate) fn hash_password(password: &str, salt: &str, rounds: u32) -> Result<String, ApiError> {
    Ok(hex_encode(&derive_key(password, salt, rounds)?))
}

/// Compares in constant time over the full derived key regardless of where
/// the first mismatch sits.
pub(crate) fn verify_password(
    password: &str,
    salt: &str,
    rounds: u32,
    expected_hash: &str,
) -> Result<bool, ApiError> {
    let derived = hex_encode(&derive_key(password, salt, rounds)?);
    if derived.len() != expected_hash.len() {
        return Ok(false);
    }
    let mut diff = 0u8;
    for (a, b) in derived.bytes().zip(expected_hash.bytes()) {
        diff |= a ^ b;
    }
    Ok(diff == 0)
}

pub(crate) fn issue_token(
    user: &User,
    now: DateTime<Utc>,
    ttl: Duration,
    secret: &[u8],
) -> Result<String, ApiError> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| ApiError::internal(format!("token ttl out of range: {e}")))?;
    let claims = TokenClaims {
        sub: user.id.as_str().to_string(),
        role: user.role.as_str().to_string(),
        exp: (now + ttl).timestamp(),
    };
    let payload_bytes = serde_json::to_vec(&claims)
        .map_err(|e| ApiError::internal(format!("token payload serialize failed: {e}")))?;
    let payload_part = URL_SAFE_NO_PAD.encode(payload_bytes);
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| ApiError::internal(format!("token signing failed: {e}")))?;
    mac.update(payload_part.as_bytes());
    let sig_part = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{TOKEN_VERSION_V1}.{payload_part}.{sig_part}"))
}

pub(crate) fn verify_token(
    token: &str,
    secret: &[u8],
    now: DateTime<Utc>,
) -> Result<TokenClaims, ApiError> {
    if token.len() > MAX_TOKEN_LEN {
        return Err(ApiError::unauthorized("token exceeds max length"));
    }
    let parts: Vec<&str> = token.split('.').collect();
    let [version, payload_part, sig_part] = parts.as_slice() else {
        return Err(ApiError::unauthorized("malformed token"));
    };
    if *version != TOKEN_VERSION_V1 {
        return Err(ApiError::unauthorized("unsupported token version"));
    }
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| ApiError::internal(format!("token verification failed: {e}")))?;
    mac.update(payload_part.as_bytes());
    let sig = URL_SAFE_NO_PAD
        .decode(sig_part)
        .map_err(|_| ApiError::unauthorized("malformed token signature"))?;
    mac.verify_slice(&sig)
        .map_err(|_| ApiError::unauthorized("token signature mismatch"))?;

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(payload_part)
        .map_err(|_| ApiError::unauthorized("malformed token payload"))?;
    let claims: TokenClaims = serde_json::from_slice(&payload_bytes)
        .map_err(|_| ApiError::unauthorized("malformed token payload"))?;
    if claims.exp <= now.timestamp() {
        return Err(ApiError::unauthorized("token expired"));
    }
    Ok(claims)
}

/// Resolves the bearer token to a live user row. Role and approval come
/// from the store, not the token, so revocations take effect immediately.
pub(crate) async fn authenticate(
    state: &crate::AppState,
    headers: &axum::http::HeaderMap,
) -> Result<User, ApiError> {
    let raw = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;
    let token = raw
        .strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .ok_or_else(|| ApiError::unauthorized("authorization header is not a bearer token"))?;
    let claims = verify_token(token, state.api.token_secret.as_bytes(), Utc::now())?;
    let user_id = UserId::parse(&claims.sub)
        .map_err(|_| ApiError::unauthorized("malformed token subject"))?;
    let user = state
        .store
        .user_by_id(&user_id)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    user.ok_or_else(|| ApiError::unauthorized("token subject no longer exists"))
}

pub(crate) fn require_role(user: &User, role: Role) -> Result<(), ApiError> {
    if user.role == role {
        Ok(())
    } else {
        Err(ApiError::forbidden(&format!(
            "requires {} role",
            role.as_str()
        )))
    }
}

pub(crate) fn require_approved(user: &User) -> Result<(), ApiError> {
    if user.approved {
        Ok(())
    } else {
        Err(ApiError::forbidden("account is not approved"))
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &[u8] = b"test-token-secret";
    const ROUNDS: u32 = 1_000;

    fn user() -> User {
        User {
            id: UserId::fresh(),
            role: Role::Customer,
            name: "Asha".to_string(),
            email: "asha@example.com".to_string(),
            password_hash: String::new(),
            password_salt: String::new(),
            phone: None,
            wallet_balance_cents: 0,
            address: None,
            referral_code: "ABCD2345".to_string(),
            referred_by: None,
            approved: true,
            available: false,
            delivered_order_count: 0,
            restaurant_profile: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn password_round_trip_verifies_and_rejects() {
        let salt = generate_salt();
        let hash = hash_password("correct horse", &salt, ROUNDS).unwrap();
        assert!(verify_password("correct horse", &salt, ROUNDS, &hash).unwrap());
        assert!(!verify_password("wrong horse", &salt, ROUNDS, &hash).unwrap());
        assert!(!verify_password("correct horse", &generate_salt(), ROUNDS, &hash).unwrap());
    }

    #[test]
    fn token_round_trip_preserves_claims() {
        let user = user();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let token = issue_token(&user, now, Duration::from_secs(3600), SECRET).unwrap();
        let claims = verify_token(&token, SECRET, now).unwrap();
        assert_eq!(claims.sub, user.id.as_str());
        assert_eq!(claims.role, "customer");
    }

    #[test]
    fn expired_and_tampered_tokens_are_rejected() {
        let user = user();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let token = issue_token(&user, now, Duration::from_secs(60), SECRET).unwrap();

        let later = now + chrono::Duration::seconds(61);
        assert!(verify_token(&token, SECRET, later).is_err());

        assert!(verify_token(&token, b"other-secret", now).is_err());

        let mut tampered = token.clone();
        tampered.replace_range(3..4, if &token[3..4] == "A" { "B" } else { "A" });
        assert!(verify_token(&tampered, SECRET, now).is_err());

        assert!(verify_token("not-a-token", SECRET, now).is_err());
    }

    #[test]
    fn referral_codes_stay_inside_the_alphabet() {
        for _ in 0..32 {
            let code = generate_referral_code();
            assert_eq!(code.len(), REFERRAL_CODE_LEN);
            assert!(code.bytes().all(|b| REFERRAL_CODE_ALPHABET.contains(&b)));
        }
    }
}
