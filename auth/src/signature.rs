use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Generate a fresh opaque session id (32 random bytes, hex-encoded).
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Sign a session id as `<id>.<hex hmac-sha256>` for the cookie value.
pub fn sign_session_id(secret: &str, session_id: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(session_id.as_bytes());
    format!("{}.{}", session_id, hex::encode(mac.finalize().into_bytes()))
}

/// Verify a signed cookie value, returning the bare session id.
/// Comparison is constant-time via the MAC verify.
pub fn verify_session_id(secret: &str, signed: &str) -> Option<String> {
    let (session_id, signature) = signed.split_once('.')?;
    if session_id.is_empty() || signature.is_empty() {
        return None;
    }

    let expected = hex::decode(signature).ok()?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(session_id.as_bytes());
    if mac.verify_slice(&expected).is_err() {
        return None;
    }

    Some(session_id.to_string())
}
