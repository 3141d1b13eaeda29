// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unverified claim decoding for compact three-segment bearer tokens.
//!
//! Only the payload is read. Signatures are never checked here: the decoded
//! expiry drives refresh scheduling and is not a trust boundary.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde_json::{Map, Value};

use crate::error::MalformedToken;

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode the payload segment into its claim object.
pub fn decode_claims(token: &str) -> Result<Map<String, Value>, MalformedToken> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        return Err(MalformedToken::Segments(segments.len()));
    }

    let payload = segments[1];
    let bytes = match URL_SAFE_LENIENT.decode(payload) {
        Ok(b) => b,
        Err(e) => STANDARD_LENIENT.decode(payload).map_err(|_| e)?,
    };

    Ok(serde_json::from_slice::<Map<String, Value>>(&bytes)?)
}

/// Return the token's `exp` claim converted to epoch milliseconds.
pub fn decode_expiry(token: &str) -> Result<i64, MalformedToken> {
    let claims = decode_claims(token)?;
    expiry_ms(&claims).ok_or(MalformedToken::MissingExpiry)
}

fn expiry_ms(claims: &Map<String, Value>) -> Option<i64> {
    let exp = claims.get("exp")?;
    if let Some(secs) = exp.as_i64() {
        return secs.checked_mul(1000);
    }
    let secs = exp.as_f64()?;
    if !secs.is_finite() {
        return None;
    }
    Some((secs * 1000.0) as i64)
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
