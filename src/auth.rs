//! Wallet-signature authentication.
//!
//! Login is a two-step challenge: the client fetches a single-use nonce
//! message for its address, signs it with the wallet (EIP-191 personal sign),
//! and posts the signature back. The recovered signer must match the claimed
//! address; success yields a bearer token.

use alloy::primitives::{Address, Signature};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;

pub const NONCE_LENGTH: usize = 32;
pub const MAX_ADDRESS_LEN: usize = 128;

/// Lowercases and validates a wallet address: 0x-prefixed hex, 20 bytes for
/// EVM wallets or 32 bytes for Sui wallets.
pub fn normalize_address(value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Wallet address cannot be empty"));
    }
    if trimmed.len() > MAX_ADDRESS_LEN {
        return Err(anyhow!(
            "Wallet address exceeds {MAX_ADDRESS_LEN} character limit"
        ));
    }
    let lowered = trimmed.to_ascii_lowercase();
    let digits = lowered
        .strip_prefix("0x")
        .ok_or_else(|| anyhow!("Wallet address must be 0x-prefixed"))?;
    if !matches!(digits.len(), 40 | 64) {
        return Err(anyhow!("Wallet address must be 20 or 32 bytes of hex"));
    }
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(anyhow!("Wallet address contains non-hex characters"));
    }
    Ok(lowered)
}

pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LENGTH)
        .map(char::from)
        .collect()
}

pub fn challenge_message(address: &str, nonce: &str, issued_at: DateTime<Utc>) -> String {
    assert!(!nonce.is_empty(), "Challenge nonce cannot be empty");
    format!(
        "FaucetHub wants you to sign in with your wallet:\n{address}\n\nNonce: {nonce}\nIssued At: {}",
        issued_at.to_rfc3339()
    )
}

/// Pulls the nonce back out of a signed challenge message.
pub fn extract_nonce(message: &str) -> Option<&str> {
    message
        .lines()
        .find_map(|line| line.strip_prefix("Nonce: "))
        .map(str::trim)
        .filter(|nonce| !nonce.is_empty())
}

/// EIP-191 verification: recover the signer from the personal-sign signature
/// and compare against the claimed address. EVM wallets only.
pub fn verify_wallet_signature(address: &str, message: &str, signature: &str) -> Result<()> {
    let expected: Address = address
        .trim()
        .parse()
        .map_err(|_| anyhow!("Invalid wallet address"))?;
    let parsed: Signature = signature
        .trim()
        .parse()
        .map_err(|_| anyhow!("Malformed signature"))?;
    let recovered = parsed
        .recover_address_from_msg(message)
        .map_err(|_| anyhow!("Signature recovery failed"))?;
    if recovered != expected {
        return Err(anyhow!("Recovered signer does not match address"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub address: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct AuthKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    token_ttl_seconds: u64,
    nonce_ttl_seconds: u64,
}

impl AuthKeys {
    pub fn new(config: &AuthConfig) -> Self {
        assert!(
            config.token_secret.len() >= 32,
            "Token secret below minimum length"
        );
        Self {
            encoding: EncodingKey::from_secret(config.token_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.token_secret.as_bytes()),
            token_ttl_seconds: config.token_ttl_seconds,
            nonce_ttl_seconds: config.nonce_ttl_seconds,
        }
    }

    pub fn issue(&self, user_id: i64, address: &str, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            sub: user_id,
            address: address.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.token_ttl_seconds as i64)).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|err| anyhow!("Failed to sign token: {err}"))
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|err| anyhow!("Token rejected: {err}"))?;
        Ok(data.claims)
    }

    pub fn nonce_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::seconds(self.nonce_ttl_seconds as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> AuthKeys {
        AuthKeys::new(&AuthConfig {
            token_secret: "0123456789abcdef0123456789abcdef".to_string(),
            token_ttl_seconds: 3_600,
            nonce_ttl_seconds: 300,
        })
    }

    #[test]
    fn address_normalization() {
        let evm = normalize_address("0xAbC0000000000000000000000000000000000001").unwrap();
        assert_eq!(evm, "0xabc0000000000000000000000000000000000001");
        let sui = normalize_address(&format!("0x{}", "a".repeat(64))).unwrap();
        assert_eq!(sui.len(), 66);

        assert!(normalize_address("").is_err());
        assert!(normalize_address("abc").is_err());
        assert!(normalize_address("0x1234").is_err());
        assert!(normalize_address(&format!("0x{}", "g".repeat(40))).is_err());
    }

    #[test]
    fn nonce_round_trips_through_message() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), NONCE_LENGTH);
        let message = challenge_message("0xabc", &nonce, Utc::now());
        assert_eq!(extract_nonce(&message), Some(nonce.as_str()));
        assert_eq!(extract_nonce("no nonce here"), None);
    }

    #[test]
    fn nonces_are_unique() {
        assert_ne!(generate_nonce(), generate_nonce());
    }

    #[test]
    fn token_round_trip() {
        let keys = keys();
        let token = keys
            .issue(42, "0xabc0000000000000000000000000000000000001", Utc::now())
            .unwrap();
        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.address, "0xabc0000000000000000000000000000000000001");
    }

    #[test]
    fn expired_token_is_rejected() {
        let keys = keys();
        let long_ago = Utc::now() - Duration::seconds(7_200);
        let token = keys.issue(42, "0xabc", long_ago).unwrap();
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn garbage_signature_is_rejected() {
        assert!(
            verify_wallet_signature(
                "0xabc0000000000000000000000000000000000001",
                "message",
                "0xdeadbeef"
            )
            .is_err()
        );
    }
}
