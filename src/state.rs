use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use subtle::ConstantTimeEq;

/// Generate a random correlation state for the Discord login URL.
/// 32 random bytes, base64url-encoded without padding.
pub fn generate_state() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// True when both values are present, non-empty and equal. The comparison
/// runs in constant time for equal-length inputs.
pub fn states_match(expected: Option<&str>, received: Option<&str>) -> bool {
    let (Some(expected), Some(received)) = (expected, received) else {
        return false;
    };
    if expected.is_empty() {
        return false;
    }
    expected.as_bytes().ct_eq(received.as_bytes()).into()
}

/// Whether `value` has the shape of a [`generate_state`] output.
pub fn is_well_formed(value: &str) -> bool {
    value.len() == 43
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}
