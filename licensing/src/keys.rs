//! Cached RSA public keys used to verify licence tokens offline, keyed by
//! `kid` (spec §5 "the public-key cache is guarded by a reader-writer
//! lock").

use std::collections::HashMap;
use std::sync::Arc;

use jsonwebtoken::DecodingKey;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct PublicKeyCache {
    keys: Arc<RwLock<HashMap<String, DecodingKey>>>,
}

impl PublicKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the PEM-encoded RSA public key for `kid`.
    pub async fn insert_pem(&self, kid: impl Into<String>, pem: &[u8]) -> Result<(), String> {
        let key = DecodingKey::from_rsa_pem(pem).map_err(|e| e.to_string())?;
        self.keys.write().await.insert(kid.into(), key);
        Ok(())
    }

    pub async fn get(&self, kid: &str) -> Option<DecodingKey> {
        self.keys.read().await.get(kid).cloned()
    }
}
