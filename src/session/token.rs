use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};

use crate::error::{ClientError, ClientResult};

/// Decode the JWT `exp` claim without verifying the signature.
///
/// Only used to decide when to refresh; the service remains the authority on
/// whether a token is valid.
pub fn decode_expiry(jwt: &str) -> ClientResult<DateTime<Utc>> {
    let parts: Vec<&str> = jwt.split('.').collect();
    if parts.len() != 3 {
        return Err(ClientError::validation("invalid JWT format"));
    }
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| ClientError::validation(format!("base64 decode failed: {e}")))?;
    let value: serde_json::Value = serde_json::from_slice(&payload)
        .map_err(|e| ClientError::validation(format!("JSON parse failed: {e}")))?;
    let exp = value["exp"]
        .as_i64()
        .ok_or_else(|| ClientError::validation("missing exp claim"))?;
    DateTime::from_timestamp(exp, 0).ok_or_else(|| ClientError::validation("invalid exp timestamp"))
}

/// True when the token expires within `buffer`. Opaque tokens never are.
pub fn is_near_expiry(jwt: &str, buffer: Duration) -> bool {
    match decode_expiry(jwt) {
        Ok(expires_at) => expires_at - buffer <= Utc::now(),
        Err(_) => false,
    }
}

#[cfg(test)]
pub(crate) fn make_jwt_with_exp(exp: i64) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(r#"{"alg":"HS256"}"#);
    let payload = engine.encode(format!(r#"{{"sub":"user-1","exp":{exp}}}"#));
    let signature = engine.encode("sig");
    format!("{header}.{payload}.{signature}")
}
