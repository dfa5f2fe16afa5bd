//! Request signature verification for slash-command webhooks.
//!
//! The platform signs `v0:<timestamp>:<raw body>` with HMAC-SHA256 keyed by the
//! tenant's signing secret and sends the hex digest as `v0=<hex>`.

use hmac::{Hmac, Mac};
use http::HeaderMap;
use sha2::Sha256;
use thiserror::Error;

pub const SIGNATURE_VERSION: &str = "v0";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const SIGNATURE_HEADER: &str = "x-slack-signature";
/// Maximum distance, in seconds, between the request timestamp and local time.
pub const REPLAY_WINDOW_SECS: u64 = 5 * 60;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("header '{0}' is required")]
    MissingHeader(&'static str),
    #[error("timestamp '{0}' is not an integer")]
    MalformedTimestamp(String),
    #[error("request timestamp is {age_secs}s away from local time (window {window_secs}s)")]
    Expired { age_secs: i64, window_secs: u64 },
    #[error("signature header is malformed: {0}")]
    MalformedSignature(String),
    #[error("signature did not match")]
    SignatureMismatch,
}

/// Outcome of [`verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Valid,
    Invalid(SignatureError),
    Expired(SignatureError),
}

impl From<SignatureError> for Verification {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::Expired { .. } => Verification::Expired(err),
            other => Verification::Invalid(other),
        }
    }
}

/// Verifies `body` against the signature headers using `secret`.
///
/// `now` is seconds since the Unix epoch. `body` must be the exact bytes
/// received on the wire.
pub fn verify(headers: &HeaderMap, body: &[u8], secret: &[u8], now: i64) -> Verification {
    match check(headers, body, secret, now) {
        Ok(()) => Verification::Valid,
        Err(err) => err.into(),
    }
}

fn check(headers: &HeaderMap, body: &[u8], secret: &[u8], now: i64) -> Result<(), SignatureError> {
    let timestamp = required_header(headers, TIMESTAMP_HEADER)?;
    let signature = required_header(headers, SIGNATURE_HEADER)?;

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::MalformedTimestamp(timestamp.to_string()))?;
    check_timestamp(ts, now)?;

    let hex_part = signature
        .strip_prefix(SIGNATURE_VERSION)
        .and_then(|rest| rest.strip_prefix('='))
        .ok_or_else(|| {
            SignatureError::MalformedSignature(format!("missing '{SIGNATURE_VERSION}=' prefix"))
        })?;
    let expected = hex::decode(hex_part)
        .map_err(|err| SignatureError::MalformedSignature(err.to_string()))?;

    // verify_slice compares in constant time
    base_mac(secret, timestamp, body)
        .verify_slice(&expected)
        .map_err(|_| SignatureError::SignatureMismatch)
}

fn required_header<'a>(
    headers: &'a HeaderMap,
    name: &'static str,
) -> Result<&'a str, SignatureError> {
    let value = headers
        .get(name)
        .ok_or(SignatureError::MissingHeader(name))?;
    let value = value.to_str().map_err(|_| match name {
        TIMESTAMP_HEADER => SignatureError::MalformedTimestamp("<non-ascii>".to_string()),
        _ => SignatureError::MalformedSignature("header is not ascii".to_string()),
    })?;
    let value = value.trim();
    if value.is_empty() {
        return Err(SignatureError::MissingHeader(name));
    }
    Ok(value)
}

fn check_timestamp(ts: i64, now: i64) -> Result<(), SignatureError> {
    let age = now.saturating_sub(ts);
    if age.unsigned_abs() > REPLAY_WINDOW_SECS {
        return Err(SignatureError::Expired {
            age_secs: age,
            window_secs: REPLAY_WINDOW_SECS,
        });
    }
    Ok(())
}

fn base_mac(secret: &[u8], timestamp: &str, body: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC key length valid");
    mac.update(SIGNATURE_VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    mac
}

/// Produces the `v0=<hex>` header value the platform would send for `body`.
pub fn sign(secret: &[u8], timestamp: i64, body: &[u8]) -> String {
    let digest = base_mac(secret, &timestamp.to_string(), body)
        .finalize()
        .into_bytes();
    format!("{SIGNATURE_VERSION}={}", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    const SECRET: &[u8] = b"8f742231b10e8888abcd99yyyzzz85a5";
    const BODY: &[u8] = b"token=xyz&team_domain=acme&command=%2Fweather&text=paris";
    const NOW: i64 = 1_700_000_000;

    fn headers(timestamp: &str, signature: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from_str(timestamp).unwrap());
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(signature).unwrap());
        headers
    }

    fn signed_headers(timestamp: i64) -> HeaderMap {
        headers(&timestamp.to_string(), &sign(SECRET, timestamp, BODY))
    }

    #[test]
    fn accepts_signature_within_window() {
        for offset in [0, 1, 60, 299, 300] {
            let ts = NOW - offset;
            assert_eq!(verify(&signed_headers(ts), BODY, SECRET, NOW), Verification::Valid);
        }
    }

    #[test]
    fn future_timestamp_within_window_is_accepted() {
        let ts = NOW + 300;
        assert_eq!(verify(&signed_headers(ts), BODY, SECRET, NOW), Verification::Valid);
    }

    #[test]
    fn matches_platform_reference_vector() {
        let secret = b"8f742231b10e8888abcd99yyyzzz85a5";
        let body = b"token=xyzz0WbapA4vBCDEFasx0q6G&team_id=T1DC2JH3J&team_domain=testteamnow&channel_id=G8PSS9T3V&channel_name=foobar&user_id=U2CERLKJA&user_name=roadrunner&command=%2Fwebhook-collect&text=&response_url=https%3A%2F%2Fhooks.slack.com%2Fcommands%2FT1DC2JH3J%2F397700885554%2F96rGlfmibIGlgcZRskXaIFfN&trigger_id=398738663015.47445629121.803a0bc887a14d10d2c447fce8b6703c";
        assert_eq!(
            sign(secret, 1_531_420_618, body),
            "v0=a2114d57b48eac39b9ad189dd8316235a7b4a8d21a10bd27519666489c69b503"
        );
    }

    #[test]
    fn single_bit_mutations_are_rejected() {
        let ts = NOW - 10;
        let valid = sign(SECRET, ts, BODY);
        let digest = hex::decode(valid.trim_start_matches("v0=")).unwrap();
        for byte in 0..digest.len() {
            for bit in 0..8 {
                let mut mutated = digest.clone();
                mutated[byte] ^= 1 << bit;
                let header = format!("v0={}", hex::encode(&mutated));
                let result = verify(&headers(&ts.to_string(), &header), BODY, SECRET, NOW);
                assert_eq!(
                    result,
                    Verification::Invalid(SignatureError::SignatureMismatch)
                );
            }
        }
    }

    #[test]
    fn tampered_body_is_rejected() {
        let ts = NOW;
        let result = verify(&signed_headers(ts), b"text=london", SECRET, NOW);
        assert_eq!(
            result,
            Verification::Invalid(SignatureError::SignatureMismatch)
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let result = verify(&signed_headers(NOW), BODY, b"another-secret", NOW);
        assert_ne!(result, Verification::Valid);
    }

    #[test]
    fn expired_one_second_past_window_regardless_of_signature() {
        let ts = NOW - 301;
        let result = verify(&signed_headers(ts), BODY, SECRET, NOW);
        assert!(matches!(result, Verification::Expired(_)));

        let result = verify(&headers(&ts.to_string(), "v0=00"), BODY, SECRET, NOW);
        assert_eq!(
            result,
            Verification::Expired(SignatureError::Expired {
                age_secs: 301,
                window_secs: 300
            })
        );
    }

    #[test]
    fn far_future_timestamp_is_expired() {
        let ts = NOW + 301;
        let result = verify(&signed_headers(ts), BODY, SECRET, NOW);
        assert!(matches!(result, Verification::Expired(_)));
    }

    #[test]
    fn missing_headers_are_reported() {
        let mut only_sig = HeaderMap::new();
        only_sig.insert(SIGNATURE_HEADER, HeaderValue::from_static("v0=00"));
        assert_eq!(
            verify(&only_sig, BODY, SECRET, NOW),
            Verification::Invalid(SignatureError::MissingHeader(TIMESTAMP_HEADER))
        );

        let mut only_ts = HeaderMap::new();
        only_ts.insert(TIMESTAMP_HEADER, HeaderValue::from_static("1700000000"));
        assert_eq!(
            verify(&only_ts, BODY, SECRET, NOW),
            Verification::Invalid(SignatureError::MissingHeader(SIGNATURE_HEADER))
        );

        assert_eq!(
            verify(&headers("", "v0=00"), BODY, SECRET, NOW),
            Verification::Invalid(SignatureError::MissingHeader(TIMESTAMP_HEADER))
        );
    }

    #[test]
    fn malformed_timestamp_is_reported() {
        let result = verify(&headers("yesterday", "v0=00"), BODY, SECRET, NOW);
        assert_eq!(
            result,
            Verification::Invalid(SignatureError::MalformedTimestamp("yesterday".into()))
        );
    }

    #[test]
    fn malformed_hex_is_distinct_from_mismatch() {
        let result = verify(&headers(&NOW.to_string(), "v0=zz11"), BODY, SECRET, NOW);
        assert!(matches!(
            result,
            Verification::Invalid(SignatureError::MalformedSignature(_))
        ));

        let unversioned = sign(SECRET, NOW, BODY).replacen("v0=", "", 1);
        let result = verify(&headers(&NOW.to_string(), &unversioned), BODY, SECRET, NOW);
        assert!(matches!(
            result,
            Verification::Invalid(SignatureError::MalformedSignature(_))
        ));
    }

    #[test]
    fn header_lookup_ignores_case() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Slack-Request-Timestamp",
            HeaderValue::from_str(&NOW.to_string()).unwrap(),
        );
        headers.insert(
            "X-Slack-Signature",
            HeaderValue::from_str(&sign(SECRET, NOW, BODY)).unwrap(),
        );
        assert_eq!(verify(&headers, BODY, SECRET, NOW), Verification::Valid);
    }
}
