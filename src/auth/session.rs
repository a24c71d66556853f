//! Session data and access token claims

use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::{DecodePaddingMode, Engine as _};
use base64::alphabet;
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Error;

/// Token pair returned by the login endpoint. This is the only piece of
/// session state that is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Bearer token sent with every API call
    pub access: String,

    /// Refresh token. Stored but never used to renew the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

/// Claims carried by the access token.
///
/// Malformed `exp` or `roles` values deserialize to `None` instead of
/// failing, so a structurally valid token with odd claims degrades to
/// "not live" or "no roles".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Expiry, in seconds since the epoch. Fractional values are kept.
    #[serde(default, deserialize_with = "lenient_exp")]
    pub exp: Option<f64>,

    /// Role names (the user's groups on the server)
    #[serde(default, deserialize_with = "lenient_roles")]
    pub roles: Option<Vec<String>>,

    /// Login name
    #[serde(default)]
    pub username: Option<String>,

    /// Server-side user identifier
    #[serde(default)]
    pub user_id: Option<serde_json::Value>,

    /// Token kind, `"access"` for access tokens
    #[serde(default)]
    pub token_type: Option<String>,
}

impl Claims {
    /// Whether `exp` lies strictly after `now` (seconds since the epoch)
    pub fn is_live_at(&self, now: f64) -> bool {
        matches!(self.exp, Some(exp) if exp > now)
    }

    /// Whether any of `required` is among the token's roles
    pub fn has_any_role<S: AsRef<str>>(&self, required: &[S]) -> bool {
        match &self.roles {
            Some(roles) => required
                .iter()
                .any(|r| roles.iter().any(|role| role == r.as_ref())),
            None => false,
        }
    }
}

fn lenient_exp<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    })
}

fn lenient_roles<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    serde_json::Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    })
}

/// URL-safe base64 that accepts payloads with or without padding
const PAYLOAD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode the claims of an access token without verifying its signature.
///
/// The server is the only party that checks signatures; the client reads
/// the payload segment for expiry and roles, nothing more. The header is
/// not inspected, so any `alg` (including `none`) is accepted.
pub fn decode_claims(token: &str) -> Result<Claims, Error> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| Error::token_decode("missing payload segment"))?;
    let bytes = PAYLOAD
        .decode(payload)
        .map_err(|err| Error::token_decode(format!("invalid base64 payload: {}", err)))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| Error::token_decode(format!("invalid JSON payload: {}", err)))
}

/// Current time in seconds since the epoch
pub(crate) fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// Current time in seconds since the epoch, with millisecond precision
pub(crate) fn now_fractional() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// The authenticated principal
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// The raw token pair
    pub tokens: TokenPair,

    /// Claims decoded from `tokens.access`
    pub claims: Claims,
}

impl Session {
    /// Build a session by decoding the access token of `tokens`
    pub fn from_tokens(tokens: TokenPair) -> Result<Self, Error> {
        let claims = decode_claims(&tokens.access)?;
        Ok(Self { tokens, claims })
    }

    /// The bearer token
    pub fn access_token(&self) -> &str {
        &self.tokens.access
    }

    /// Re-decode the access token and check its expiry against the clock.
    ///
    /// Never cached: the answer changes as time passes.
    pub fn is_live(&self) -> bool {
        if self.tokens.access.is_empty() {
            return false;
        }
        match decode_claims(&self.tokens.access) {
            Ok(claims) => claims.is_live_at(now_fractional()),
            Err(err) => {
                log::debug!("Access token no longer decodes: {}", err);
                false
            }
        }
    }

    /// Whether the session holds any of `required`
    pub fn has_any_role<S: AsRef<str>>(&self, required: &[S]) -> bool {
        self.claims.has_any_role(required)
    }
}

#[cfg(test)]
pub(crate) mod test_tokens {
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::{json, Value};

    use super::now_secs;

    /// Sign `claims` with a throwaway key
    pub fn token(claims: Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .expect("encode token")
    }

    /// Token expiring `offset` seconds from now with the given roles
    pub fn token_with(offset: i64, roles: &[&str]) -> String {
        token(json!({
            "token_type": "access",
            "exp": now_secs() + offset,
            "user_id": 7,
            "username": "maria",
            "roles": roles,
        }))
    }
}
