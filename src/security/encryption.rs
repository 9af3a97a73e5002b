use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use thiserror::Error;

const KEY_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncryptionError {
    #[error("encryption key is not valid hex")]
    KeyNotHex,

    #[error("encryption key must be {} hex characters", KEY_LEN * 2)]
    KeyLength,

    #[error("failed to generate a nonce")]
    NonceGeneration,

    #[error("token could not be sealed")]
    Seal,

    #[error("stored ciphertext is malformed")]
    Malformed,

    #[error("stored ciphertext could not be opened (key mismatch or corruption)")]
    Open,

    #[error("decrypted token is not valid UTF-8")]
    NotUtf8,
}

/// AES-256-GCM over bot tokens. Stored form is
/// `base64(nonce || ciphertext || tag)`; the per-call random nonce makes
/// equal tokens encrypt to distinct rows.
#[derive(Debug)]
pub struct TokenEncryption {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl TokenEncryption {
    /// `key_hex` comes from configuration: 64 hex characters for AES-256.
    pub fn new(key_hex: &str) -> Result<TokenEncryption, EncryptionError> {
        let decoded = hex::decode(key_hex).map_err(|_| EncryptionError::KeyNotHex)?;
        let key_bytes: [u8; KEY_LEN] = decoded
            .try_into()
            .map_err(|_| EncryptionError::KeyLength)?;

        let unbound =
            UnboundKey::new(&AES_256_GCM, &key_bytes).map_err(|_| EncryptionError::KeyLength)?;
        Ok(TokenEncryption {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, EncryptionError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut nonce_bytes)
            .map_err(|_| EncryptionError::NonceGeneration)?;

        let mut sealed =
            Vec::with_capacity(NONCE_LEN + plaintext.len() + AES_256_GCM.tag_len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(plaintext.as_bytes());

        let nonce = Nonce::assume_unique_for_key(nonce_bytes);
        let tag = self
            .key
            .seal_in_place_separate_tag(nonce, Aad::empty(), &mut sealed[NONCE_LEN..])
            .map_err(|_| EncryptionError::Seal)?;
        sealed.extend_from_slice(tag.as_ref());

        Ok(BASE64.encode(sealed))
    }

    pub fn decrypt(&self, encoded: &str) -> Result<String, EncryptionError> {
        let data = BASE64.decode(encoded).map_err(|_| EncryptionError::Malformed)?;
        let (nonce_bytes, sealed) = data
            .split_first_chunk::<NONCE_LEN>()
            .ok_or(EncryptionError::Malformed)?;

        let nonce = Nonce::assume_unique_for_key(*nonce_bytes);
        let mut buffer = sealed.to_vec();
        let opened = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut buffer)
            .map_err(|_| EncryptionError::Open)?;

        String::from_utf8(opened.to_vec()).map_err(|_| EncryptionError::NotUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_encryption_roundtrip() {
        let enc = TokenEncryption::new(KEY).expect("valid key");

        let original = "123456:test-token";
        let encrypted = enc.encrypt(original).expect("Encryption should work");
        let decrypted = enc.decrypt(&encrypted).expect("Decryption should work");

        assert_eq!(original, decrypted);
        assert_ne!(original, encrypted);
        assert!(encrypted.len() > original.len());
    }

    #[test]
    fn test_same_token_encrypts_differently() {
        let enc = TokenEncryption::new(KEY).expect("valid key");

        let token = "same-token";
        let first = enc.encrypt(token).unwrap();
        let second = enc.encrypt(token).unwrap();

        // Random nonces make the stored forms differ.
        assert_ne!(first, second);
        assert_eq!(enc.decrypt(&first).unwrap(), token);
        assert_eq!(enc.decrypt(&second).unwrap(), token);
    }

    #[test]
    fn test_bad_keys_rejected() {
        assert_eq!(
            TokenEncryption::new("not-hex").unwrap_err(),
            EncryptionError::KeyNotHex
        );
        assert_eq!(
            TokenEncryption::new("abcd").unwrap_err(),
            EncryptionError::KeyLength
        );
    }

    #[test]
    fn test_malformed_ciphertext() {
        let enc = TokenEncryption::new(KEY).expect("valid key");

        assert_eq!(
            enc.decrypt("!!! not base64 !!!").unwrap_err(),
            EncryptionError::Malformed
        );
        // Valid base64 but shorter than a nonce.
        assert_eq!(
            enc.decrypt(&BASE64.encode(b"tiny")).unwrap_err(),
            EncryptionError::Malformed
        );
    }

    #[test]
    fn test_wrong_key_fails_to_open() {
        let enc = TokenEncryption::new(KEY).expect("valid key");
        let other = TokenEncryption::new(
            "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff",
        )
        .expect("valid key");

        let sealed = enc.encrypt("123456:test-token").unwrap();
        assert_eq!(other.decrypt(&sealed).unwrap_err(), EncryptionError::Open);
    }
}
