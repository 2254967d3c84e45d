//! Stable content-addressed identifiers and IP anonymization.
//!
//! User ids are derived as `<provider>_<sha1(provider_user_id)>` and avatar
//! file names as `sha1(user_id)`. Client addresses are never stored; only an
//! HMAC-SHA1 keyed with the site secret is kept, so recovering an address
//! from a leaked database requires the secret as well.

use hmac::{Hmac, Mac};
use sha1::{Digest, Sha1};

type HmacSha1 = Hmac<Sha1>;

/// Length of a hex-encoded SHA1 digest.
const SHA1_HEX_LEN: usize = 40;

/// Returns the hex-encoded SHA1 of `id`.
pub fn encode_id(id: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Builds a user id for an identity provider, `<provider>_<sha1(id)>`.
pub fn provider_user_id(provider: &str, provider_user_id: &str) -> String {
    format!("{}_{}", provider, encode_id(provider_user_id))
}

/// Returns true if `value` already looks like a hex SHA1 digest.
pub fn is_hashed(value: &str) -> bool {
    value.len() == SHA1_HEX_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Returns the hex HMAC-SHA1 of `ip` keyed by `secret`.
///
/// Values that are already hashed are returned unchanged so that re-saving a
/// comment never hashes twice. An empty address stays empty.
pub fn hash_ip(ip: &str, secret: &str) -> String {
    if ip.is_empty() || is_hashed(ip) {
        return ip.to_string();
    }
    let mut mac = match HmacSha1::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length
        Err(_) => return encode_id(ip),
    };
    mac.update(ip.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_id() {
        assert_eq!(encode_id("myid"), "6e34471f84557e1713012d64a7477c71bfdac631");
        assert_eq!(encode_id("").len(), 40);
    }

    #[test]
    fn test_provider_user_id() {
        let id = provider_user_id("github", "12345");
        assert!(id.starts_with("github_"));
        assert_eq!(id.len(), "github_".len() + 40);
    }

    #[test]
    fn test_hash_ip() {
        let hashed = hash_ip("127.0.0.1", "secret");
        assert_eq!(hashed.len(), 40);
        assert!(is_hashed(&hashed));
        assert_ne!(hashed, hash_ip("127.0.0.1", "other-secret"));
        assert_eq!(hashed, hash_ip("127.0.0.1", "secret"));
    }

    #[test]
    fn test_hash_ip_idempotent() {
        let hashed = hash_ip("10.0.0.1", "secret");
        assert_eq!(hash_ip(&hashed, "secret"), hashed);
        assert_eq!(hash_ip(&hashed, "another"), hashed);
        assert_eq!(hash_ip("", "secret"), "");
    }

    #[test]
    fn test_is_hashed() {
        assert!(is_hashed("6e34471f84557e1713012d64a7477c71bfdac631"));
        assert!(!is_hashed("6E34471F84557E1713012D64A7477C71BFDAC631"));
        assert!(!is_hashed("127.0.0.1"));
        assert!(!is_hashed("6e34471f84557e1713012d64a7477c71bfdac63"));
    }
}
