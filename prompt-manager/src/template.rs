//! Vendor template loading: encrypted-at-rest bodies decrypted
//! just-in-time, with a plaintext registry fallback for dev/test builds
//! (spec §4.3 step 2, §9 "Structured prompts").

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use std::collections::HashMap;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// An encrypted vendor template: base64 nonce + ciphertext, AES-256-GCM.
pub struct EncryptedTemplate {
    pub nonce_b64: String,
    pub ciphertext_b64: String,
}

/// In-repo plaintext fallback registry used when `TEMPLATE_ENCRYPTION_KEY`
/// is unset, e.g. in dev/test builds (spec §4.3 step 2).
#[derive(Default)]
pub struct PlaintextRegistry {
    templates: HashMap<String, String>,
}

impl PlaintextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, prompt_key: impl Into<String>, body: impl Into<String>) {
        self.templates.insert(prompt_key.into(), body.into());
    }

    pub fn get(&self, prompt_key: &str) -> Option<&str> {
        self.templates.get(prompt_key).map(String::as_str)
    }
}

/// Loads the plaintext body for `prompt_key`, decrypting `encrypted` with
/// the key read from `TEMPLATE_ENCRYPTION_KEY` (32 raw bytes, base64) when
/// set, otherwise falling back to `registry`.
///
/// The decrypted buffer is wrapped in [`Zeroizing`] so it is overwritten on
/// drop at the end of the caller's rendering scope, per spec §9's
/// "the render path must zeroise decrypted buffers on exit".
pub fn load_body(
    prompt_key: &str,
    encrypted: Option<&EncryptedTemplate>,
    registry: &PlaintextRegistry,
) -> Result<Zeroizing<String>> {
    match std::env::var("TEMPLATE_ENCRYPTION_KEY").ok().filter(|v| !v.trim().is_empty()) {
        Some(key_b64) => {
            let enc = encrypted
                .ok_or_else(|| Error::UnknownPromptKey(prompt_key.to_string()))?;
            decrypt(&key_b64, enc).map(Zeroizing::new)
        }
        None => registry
            .get(prompt_key)
            .map(|s| Zeroizing::new(s.to_string()))
            .ok_or_else(|| Error::UnknownPromptKey(prompt_key.to_string())),
    }
}

fn decrypt(key_b64: &str, enc: &EncryptedTemplate) -> Result<String> {
    use base64::Engine;
    let engine = base64::engine::general_purpose::STANDARD;

    let key_bytes = engine
        .decode(key_b64)
        .map_err(|e| Error::Decrypt(format!("invalid TEMPLATE_ENCRYPTION_KEY: {e}")))?;
    let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
    let cipher = Aes256Gcm::new(key);

    let nonce_bytes = engine
        .decode(&enc.nonce_b64)
        .map_err(|e| Error::Decrypt(format!("invalid nonce: {e}")))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = engine
        .decode(&enc.ciphertext_b64)
        .map_err(|e| Error::Decrypt(format!("invalid ciphertext: {e}")))?;

    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_ref())
        .map_err(|e| Error::Decrypt(e.to_string()))?;

    String::from_utf8(plaintext).map_err(|e| Error::Decrypt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_plaintext_registry_without_key() {
        // SAFETY: test-local env mutation; no other test in this crate reads
        // TEMPLATE_ENCRYPTION_KEY concurrently.
        unsafe {
            std::env::remove_var("TEMPLATE_ENCRYPTION_KEY");
        }
        let mut registry = PlaintextRegistry::new();
        registry.insert("review.default", "hello {{VAR:x}}");
        let body = load_body("review.default", None, &registry).unwrap();
        assert_eq!(&*body, "hello {{VAR:x}}");
    }

    #[test]
    fn round_trips_through_aes_gcm() {
        use aes_gcm::aead::OsRng;
        use aes_gcm::AeadCore;
        use base64::Engine;

        let key = Aes256Gcm::generate_key(OsRng);
        let cipher = Aes256Gcm::new(&key);
        let nonce = Aes256Gcm::generate_nonce(OsRng);
        let ciphertext = cipher.encrypt(&nonce, b"secret template".as_ref()).unwrap();

        let engine = base64::engine::general_purpose::STANDARD;
        let enc = EncryptedTemplate {
            nonce_b64: engine.encode(nonce),
            ciphertext_b64: engine.encode(ciphertext),
        };

        unsafe {
            std::env::set_var("TEMPLATE_ENCRYPTION_KEY", engine.encode(key));
        }
        let body = load_body("review.default", Some(&enc), &PlaintextRegistry::new()).unwrap();
        assert_eq!(&*body, "secret template");
        unsafe {
            std::env::remove_var("TEMPLATE_ENCRYPTION_KEY");
        }
    }
}
