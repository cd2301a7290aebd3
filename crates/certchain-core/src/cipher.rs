//! Measurement cipher: ChaCha20-Poly1305 with a per-record random nonce.
//!
//! The configured secret is 16 bytes. The AEAD key is derived from it with
//! BLAKE3 in key-derivation mode, so the secret itself is never used as a
//! cipher key directly.
//!
//! Ciphertext format (hex encoded): `nonce (12) || ciphertext || tag (16)`.
//! Two encryptions of the same plaintext produce different ciphertexts.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use std::fmt;

use crate::error::CipherError;

/// Length of the configured secret.
pub const CIPHER_KEY_LEN: usize = 16;

/// Length of the per-record nonce.
pub const NONCE_LEN: usize = 12;

/// Length of the Poly1305 tag.
pub const TAG_LEN: usize = 16;

/// Key-derivation context for the AEAD key.
const KDF_CONTEXT: &str = "certchain 2024 measurement-cipher v1";

/// The process-wide 16-byte measurement secret.
///
/// Loaded once from configuration. There is no API to mutate it.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherKey([u8; CIPHER_KEY_LEN]);

impl CipherKey {
    pub const fn from_bytes(bytes: [u8; CIPHER_KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CipherError> {
        let arr: [u8; CIPHER_KEY_LEN] = bytes.try_into().map_err(|_| CipherError::InvalidKey {
            expected: CIPHER_KEY_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Use the UTF-8 bytes of a configured key string.
    pub fn from_str_key(s: &str) -> Result<Self, CipherError> {
        Self::from_slice(s.as_bytes())
    }

    /// Generate a random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; CIPHER_KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CipherKey(..)")
    }
}

/// Authenticated encryption of measurement payloads.
#[derive(Clone)]
pub struct MeasurementCipher {
    aead: ChaCha20Poly1305,
}

impl MeasurementCipher {
    pub fn new(key: &CipherKey) -> Self {
        let derived = blake3::derive_key(KDF_CONTEXT, &key.0);
        Self {
            aead: ChaCha20Poly1305::new(Key::from_slice(&derived)),
        }
    }

    /// Encrypt a plaintext payload to hex.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let sealed = self
            .aead
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| CipherError::Encryption(e.to_string()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(hex::encode(out))
    }

    /// Decrypt a hex ciphertext produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, ciphertext_hex: &str) -> Result<String, CipherError> {
        let raw = hex::decode(ciphertext_hex).map_err(|e| CipherError::Decode(e.to_string()))?;
        if raw.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::Decode(format!(
                "ciphertext too short: {} bytes",
                raw.len()
            )));
        }

        let (nonce, sealed) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .aead
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CipherError::Decryption("authentication failed".into()))?;

        String::from_utf8(plaintext).map_err(|e| CipherError::Decryption(e.to_string()))
    }
}

impl fmt::Debug for MeasurementCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MeasurementCipher(ChaCha20-Poly1305)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cipher() -> MeasurementCipher {
        MeasurementCipher::new(&CipherKey::from_str_key("1234567890123456").unwrap())
    }

    #[test]
    fn test_encrypt_decrypt_measurement_payload() {
        let cipher = cipher();
        let plaintext = "95.000000|0.010000|-0.500000|5.000|230.000";

        let ciphertext = cipher.encrypt(plaintext).unwrap();
        assert!(ciphertext.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(ciphertext.len(), 2 * (NONCE_LEN + plaintext.len() + TAG_LEN));

        assert_eq!(cipher.decrypt(&ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn test_same_plaintext_different_ciphertext() {
        let cipher = cipher();
        let a = cipher.encrypt("100.000000|0.000000|0.000000|5.000|220.000").unwrap();
        let b = cipher.encrypt("100.000000|0.000000|0.000000|5.000|220.000").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hex_is_decode_error() {
        assert!(matches!(cipher().decrypt("zz-not-hex"), Err(CipherError::Decode(_))));
        assert!(matches!(cipher().decrypt("abc"), Err(CipherError::Decode(_))));
        assert!(matches!(cipher().decrypt("00ff"), Err(CipherError::Decode(_))));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = cipher();
        let ciphertext = cipher.encrypt("secret").unwrap();
        let mut raw = hex::decode(&ciphertext).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        assert!(matches!(
            cipher.decrypt(&hex::encode(raw)),
            Err(CipherError::Decryption(_))
        ));
    }

    #[test]
    fn test_decrypt_wrong_key_fails() {
        let ciphertext = cipher().encrypt("secret").unwrap();
        let other = MeasurementCipher::new(&CipherKey::from_str_key("6543210987654321").unwrap());
        assert!(matches!(other.decrypt(&ciphertext), Err(CipherError::Decryption(_))));
    }

    #[test]
    fn test_key_length_enforced() {
        assert!(matches!(
            CipherKey::from_str_key("short"),
            Err(CipherError::InvalidKey { expected: 16, actual: 5 })
        ));
        assert!(CipherKey::from_str_key("12345678901234567").is_err());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = CipherKey::from_str_key("1234567890123456").unwrap();
        assert_eq!(format!("{:?}", key), "CipherKey(..)");
    }

    proptest! {
        #[test]
        fn roundtrip_any_string(plaintext in ".*") {
            let cipher = cipher();
            let ciphertext = cipher.encrypt(&plaintext).unwrap();
            prop_assert_eq!(cipher.decrypt(&ciphertext).unwrap(), plaintext);
        }
    }
}
