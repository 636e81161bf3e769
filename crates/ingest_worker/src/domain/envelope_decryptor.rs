use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use common::domain::{DomainError, DomainResult, EnvelopeData};
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

const NONCE_LEN: usize = 12;

/// Verifies and decrypts envelope bodies with the bucket's secret
///
/// Blob format: `<hex nonce>:<hex ciphertext>`, AES-256-GCM with the tag appended
/// to the ciphertext and the key derived as `SHA-256(secret_key)`.
#[derive(Debug, Clone, Default)]
pub struct EnvelopeDecryptor {
    allow_plaintext: bool,
}

impl EnvelopeDecryptor {
    pub fn new(allow_plaintext: bool) -> Self {
        Self { allow_plaintext }
    }

    /// Decrypt an envelope body into its payload object
    pub fn open(&self, data: &EnvelopeData, secret: &str) -> DomainResult<Map<String, Value>> {
        match data {
            EnvelopeData::Encrypted(blob) => open_blob(blob, secret),
            EnvelopeData::Plain(payload) if self.allow_plaintext => {
                debug!("accepting plaintext payload");
                Ok(payload.clone())
            }
            EnvelopeData::Plain(_) => Err(DomainError::DecryptionFailed(
                "plaintext payloads are not accepted".to_string(),
            )),
        }
    }

    /// Encrypt a payload into the blob format accepted by [`EnvelopeDecryptor::open`]
    pub fn seal(payload: &Value, secret: &str) -> DomainResult<String> {
        let plaintext = serde_json::to_vec(payload)
            .map_err(|e| DomainError::ParseError(format!("unserializable payload: {}", e)))?;

        let cipher = cipher_for(secret)?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|e| DomainError::DecryptionFailed(format!("encrypt failed: {}", e)))?;

        Ok(format!(
            "{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(ciphertext)
        ))
    }
}

fn cipher_for(secret: &str) -> DomainResult<Aes256Gcm> {
    let key = Sha256::digest(secret.as_bytes());
    Aes256Gcm::new_from_slice(&key)
        .map_err(|e| DomainError::DecryptionFailed(format!("key init failed: {}", e)))
}

fn open_blob(blob: &str, secret: &str) -> DomainResult<Map<String, Value>> {
    let (nonce_hex, ciphertext_hex) = blob
        .split_once(':')
        .ok_or_else(|| DomainError::DecryptionFailed("malformed blob: missing nonce".to_string()))?;

    let nonce_bytes = hex::decode(nonce_hex)
        .map_err(|e| DomainError::DecryptionFailed(format!("malformed nonce: {}", e)))?;
    if nonce_bytes.len() != NONCE_LEN {
        return Err(DomainError::DecryptionFailed(format!(
            "malformed nonce: expected {} bytes, got {}",
            NONCE_LEN,
            nonce_bytes.len()
        )));
    }
    let ciphertext = hex::decode(ciphertext_hex)
        .map_err(|e| DomainError::DecryptionFailed(format!("malformed ciphertext: {}", e)))?;

    let plaintext = cipher_for(secret)?
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
        .map_err(|_| {
            DomainError::DecryptionFailed("authentication failed (wrong secret or tampered payload)".to_string())
        })?;

    match serde_json::from_slice::<Value>(&plaintext) {
        Ok(Value::Object(payload)) => Ok(payload),
        Ok(_) => Err(DomainError::DecryptionFailed(
            "decrypted payload is not a JSON object".to_string(),
        )),
        Err(e) => Err(DomainError::DecryptionFailed(format!(
            "decrypted payload is not valid JSON: {}",
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sealed(payload: &Value, secret: &str) -> EnvelopeData {
        EnvelopeData::Encrypted(EnvelopeDecryptor::seal(payload, secret).unwrap())
    }

    #[test]
    fn test_open_sealed_payload() {
        let payload = json!({"server_name": "node.internal", "monitoring": {"total_mem": 1000}});
        let data = sealed(&payload, "s3cret");

        let opened = EnvelopeDecryptor::default().open(&data, "s3cret").unwrap();

        assert_eq!(Value::Object(opened), payload);
    }

    #[test]
    fn test_wrong_secret_fails() {
        let data = sealed(&json!({"server_name": "a"}), "s3cret");

        let result = EnvelopeDecryptor::default().open(&data, "other");

        assert!(matches!(result, Err(DomainError::DecryptionFailed(_))));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let blob = EnvelopeDecryptor::seal(&json!({"server_name": "a"}), "s3cret").unwrap();
        let (nonce, ciphertext) = blob.split_once(':').unwrap();
        let mut bytes = hex::decode(ciphertext).unwrap();
        bytes[0] ^= 0x01;
        let tampered = EnvelopeData::Encrypted(format!("{}:{}", nonce, hex::encode(bytes)));

        let result = EnvelopeDecryptor::default().open(&tampered, "s3cret");

        assert!(matches!(result, Err(DomainError::DecryptionFailed(_))));
    }

    #[test]
    fn test_malformed_blobs_fail() {
        let decryptor = EnvelopeDecryptor::default();
        for blob in ["no-separator", "zz:00", "0011:00", ":", "000000000000000000000000:xyz"] {
            let result = decryptor.open(&EnvelopeData::Encrypted(blob.to_string()), "s3cret");
            assert!(
                matches!(result, Err(DomainError::DecryptionFailed(_))),
                "blob {:?} should fail",
                blob
            );
        }
    }

    #[test]
    fn test_non_object_plaintext_fails() {
        let data = sealed(&json!([1, 2, 3]), "s3cret");

        let result = EnvelopeDecryptor::default().open(&data, "s3cret");

        assert!(matches!(result, Err(DomainError::DecryptionFailed(_))));
    }

    #[test]
    fn test_plaintext_gate() {
        let mut payload = Map::new();
        payload.insert("server_name".to_string(), json!("a"));
        let data = EnvelopeData::Plain(payload.clone());

        assert!(matches!(
            EnvelopeDecryptor::new(false).open(&data, "s3cret"),
            Err(DomainError::DecryptionFailed(_))
        ));
        assert_eq!(EnvelopeDecryptor::new(true).open(&data, "s3cret").unwrap(), payload);
    }
}
