//! Request signing.
//!
//! Every request carries `params` (JSON) and `signature`, where the
//! signature is `sha384:` followed by the hex HMAC-SHA384 of the exact
//! `params` string, keyed with the auth secret.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha384;

use crate::error::{ClientError, ClientResult};

type HmacSha384 = Hmac<Sha384>;

/// Format used by the service for `auth.expires`.
pub const EXPIRES_FORMAT: &str = "%Y/%m/%d %H:%M:%S+00:00";

/// Sign a serialized params document.
pub fn sign(secret: &str, params: &str) -> ClientResult<String> {
    let mut mac = HmacSha384::new_from_slice(secret.as_bytes())
        .map_err(|e| ClientError::Config(format!("invalid signing key: {e}")))?;
    mac.update(params.as_bytes());
    Ok(format!("sha384:{}", hex::encode(mac.finalize().into_bytes())))
}

/// Expiry timestamp `ttl` after `now`, in the service's format.
pub fn expires_at(now: DateTime<Utc>, ttl: Duration) -> String {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
    (now + ttl).format(EXPIRES_FORMAT).to_string()
}
