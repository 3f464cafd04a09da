//! Offline licence token verification: RSA signature check against a
//! cached public key for the token's `kid`, with `exp` in the future
//! (spec §4.5 "offline validation").

use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::keys::PublicKeyCache;

/// Claims carried by a licence token (spec §3 `LicenceState` fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenceClaims {
    pub sub: String,
    pub app: String,
    #[serde(default)]
    pub seat_count: Option<u32>,
    #[serde(default)]
    pub unlimited: bool,
    pub exp: i64,
}

#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub kid: String,
    pub claims: LicenceClaims,
}

/// Verifies `token`'s RSA signature against `keys`, then checks `exp`.
/// Distinguishes a signature/kid mismatch (`invalid`) from an expired-but-
/// well-signed token (`expired`), per spec §4.5's transition rules.
pub async fn verify(token: &str, keys: &PublicKeyCache) -> Result<VerifiedToken> {
    let header = decode_header(token).map_err(|e| Error::Malformed(e.to_string()))?;
    let kid = header.kid.ok_or_else(|| Error::Malformed("token header has no kid".to_string()))?;
    let key = keys.get(&kid).await.ok_or_else(|| Error::UnknownKid(kid.clone()))?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = false;
    validation.set_required_spec_claims(&["sub", "app", "exp"]);

    let data = decode::<LicenceClaims>(token, &key, &validation)
        .map_err(|_| Error::SignatureMismatch)?;

    let now = chrono::Utc::now().timestamp();
    if data.claims.exp <= now {
        return Err(Error::Expired);
    }

    Ok(VerifiedToken { kid, claims: data.claims })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const TEST_KID: &str = "test-key-1";

    fn test_keys_pem() -> (Vec<u8>, Vec<u8>) {
        // A fixed 2048-bit RSA keypair used only by this test module.
        // Generated once offline; not used anywhere else.
        let private = include_bytes!("../testdata/test_rsa_private.pem").to_vec();
        let public = include_bytes!("../testdata/test_rsa_public.pem").to_vec();
        (private, public)
    }

    async fn cache_with_test_key() -> PublicKeyCache {
        let (_, public) = test_keys_pem();
        let cache = PublicKeyCache::new();
        cache.insert_pem(TEST_KID, &public).await.unwrap();
        cache
    }

    fn sign(claims: &LicenceClaims) -> String {
        let (private, _) = test_keys_pem();
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(TEST_KID.to_string());
        let key = EncodingKey::from_rsa_pem(&private).unwrap();
        encode(&header, claims, &key).unwrap()
    }

    #[tokio::test]
    async fn accepts_a_validly_signed_unexpired_token() {
        let cache = cache_with_test_key().await;
        let claims = LicenceClaims {
            sub: "org-1".into(),
            app: "livereview".into(),
            seat_count: Some(5),
            unlimited: false,
            exp: chrono::Utc::now().timestamp() + 3600,
        };
        let token = sign(&claims);
        let verified = verify(&token, &cache).await.unwrap();
        assert_eq!(verified.kid, TEST_KID);
        assert_eq!(verified.claims.sub, "org-1");
    }

    #[tokio::test]
    async fn rejects_an_expired_token() {
        let cache = cache_with_test_key().await;
        let claims = LicenceClaims {
            sub: "org-1".into(),
            app: "livereview".into(),
            seat_count: None,
            unlimited: true,
            exp: chrono::Utc::now().timestamp() - 10,
        };
        let token = sign(&claims);
        assert!(matches!(verify(&token, &cache).await, Err(Error::Expired)));
    }

    #[tokio::test]
    async fn rejects_an_unknown_kid() {
        let cache = PublicKeyCache::new();
        let claims = LicenceClaims {
            sub: "org-1".into(),
            app: "livereview".into(),
            seat_count: None,
            unlimited: true,
            exp: chrono::Utc::now().timestamp() + 3600,
        };
        let token = sign(&claims);
        assert!(matches!(verify(&token, &cache).await, Err(Error::UnknownKid(_))));
    }
}
