//! AES-256-GCM encryption of catalog secrets.
//!
//! Stored form is `base64(nonce || ciphertext)` with a fresh random nonce per
//! value. The empty string maps to itself so unset passwords stay unset.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::PanelError;
use crate::repository::SecretCipher;

/// Size of the AES-GCM nonce in bytes
const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes
const TAG_SIZE: usize = 16;

/// `SecretCipher` backed by AES-256-GCM.
pub struct AesSecretCipher {
    cipher: Aes256Gcm,
}

impl AesSecretCipher {
    /// Create a cipher from a 256-bit key.
    pub fn new(key: &[u8; 32]) -> Self {
        Self { cipher: Aes256Gcm::new(key.into()) }
    }
}

impl SecretCipher for AesSecretCipher {
    fn encrypt(&self, plaintext: &str) -> Result<String, PanelError> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| PanelError::crypto(format!("Encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String, PanelError> {
        if ciphertext.is_empty() {
            return Ok(String::new());
        }

        let sealed = STANDARD
            .decode(ciphertext)
            .map_err(|e| PanelError::crypto(format!("Ciphertext is not base64: {e}")))?;
        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(PanelError::crypto("Ciphertext too short"));
        }

        let (nonce, body) = sealed.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| PanelError::crypto("Decryption failed: wrong key or corrupted value"))?;
        String::from_utf8(plaintext).map_err(|e| PanelError::crypto(format!("Decrypted value is not UTF-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decrypt_recovers_plaintext() {
        let cipher = AesSecretCipher::new(&[7u8; 32]);
        let sealed = cipher.encrypt("p@ss1").unwrap();
        assert_ne!(sealed, "p@ss1");
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "p@ss1");
        // Fresh nonce per value
        assert_ne!(cipher.encrypt("p@ss1").unwrap(), sealed);
    }

    #[test]
    fn test_empty_stays_empty() {
        let cipher = AesSecretCipher::new(&[7u8; 32]);
        assert_eq!(cipher.encrypt("").unwrap(), "");
        assert_eq!(cipher.decrypt("").unwrap(), "");
    }

    #[test]
    fn test_wrong_key_or_garbage_fails() {
        let sealed = AesSecretCipher::new(&[1u8; 32]).encrypt("secret").unwrap();
        let other = AesSecretCipher::new(&[2u8; 32]);
        assert!(matches!(other.decrypt(&sealed), Err(PanelError::Crypto { .. })));
        assert!(other.decrypt("not base64!").is_err());
        assert!(other.decrypt("AAAA").is_err());
    }
}
