//! Signed download URLs and their expiry bookkeeping.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::io;

use crate::config::SigningConfig;
use crate::db::SignedUrl;
use crate::error::{AnnotationError, Result};

const MAX_VALIDITY_MINUTES: i64 = 60 * 24 * 365 * 10;

/// Issues a capability URL for an object key that is valid until `expires_at`.
pub trait UrlSigner: Send + Sync {
    fn sign(&self, key: &str, expires_at: DateTime<Utc>) -> io::Result<String>;
}

/// Signs URLs for objects served from a local base URL.
///
/// The URL carries `expires` (unix seconds) and a SHA-256 digest of the secret,
/// key and expiry, which the serving side recomputes before answering.
pub struct LocalUrlSigner {
    base_url: String,
    secret: String,
}

impl LocalUrlSigner {
    pub fn new(config: &SigningConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret: config.secret.clone(),
        }
    }

    fn signature(&self, key: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.secret.as_bytes());
        hasher.update(b"\n");
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Check a signature produced by [`UrlSigner::sign`].
    #[cfg(test)]
    fn verify(&self, key: &str, expires: i64, signature: &str, now: DateTime<Utc>) -> bool {
        expires > now.timestamp() && self.signature(key, expires) == signature
    }
}

impl UrlSigner for LocalUrlSigner {
    fn sign(&self, key: &str, expires_at: DateTime<Utc>) -> io::Result<String> {
        if key.is_empty() || key.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot sign object key {:?}", key),
            ));
        }
        let expires = expires_at.timestamp();
        Ok(format!(
            "{}/{}?expires={}&signature={}",
            self.base_url,
            key,
            expires,
            self.signature(key, expires)
        ))
    }
}

/// Wraps a [`UrlSigner`] with the process-wide validity window.
pub struct SignedUrlIssuer {
    signer: Box<dyn UrlSigner>,
    validity: Duration,
}

impl SignedUrlIssuer {
    pub fn new(signer: Box<dyn UrlSigner>, validity_minutes: i64) -> Self {
        // Keep the addition in `obtain_at` far away from chrono's range limits.
        let minutes = validity_minutes.min(MAX_VALIDITY_MINUTES);
        Self {
            signer,
            validity: Duration::minutes(minutes),
        }
    }

    pub fn from_config(config: &SigningConfig) -> Self {
        Self::new(Box::new(LocalUrlSigner::new(config)), config.duration_minutes)
    }

    pub fn obtain(&self, key: &str) -> Result<SignedUrl> {
        self.obtain_at(key, Utc::now())
    }

    /// Sign `key` with an expiry of `now` plus the validity window.
    pub fn obtain_at(&self, key: &str, now: DateTime<Utc>) -> Result<SignedUrl> {
        let expires_at = now + self.validity;
        let url = self
            .signer
            .sign(key, expires_at)
            .map_err(|e| AnnotationError::Signing {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        if url.is_empty() {
            return Err(AnnotationError::Signing {
                key: key.to_string(),
                reason: "signer returned an empty URL".to_string(),
            });
        }
        Ok(SignedUrl { url, expires_at })
    }

    /// Re-sign `key` when `current` is missing or expired at `now`.
    /// Returns `None` when the current URL is still usable.
    pub fn refresh_at(
        &self,
        key: &str,
        current: Option<&SignedUrl>,
        now: DateTime<Utc>,
    ) -> Result<Option<SignedUrl>> {
        match current {
            Some(signed) if !signed.is_expired_at(now) => Ok(None),
            _ => self.obtain_at(key, now).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    struct BrokenSigner;

    impl UrlSigner for BrokenSigner {
        fn sign(&self, _key: &str, _expires_at: DateTime<Utc>) -> io::Result<String> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "credentials endpoint down"))
        }
    }

    fn local_signer() -> LocalUrlSigner {
        LocalUrlSigner::new(&SigningConfig {
            base_url: "https://cdn.test/objects/".to_string(),
            secret: "s3cret".to_string(),
            duration_minutes: 10,
        })
    }

    #[test]
    fn test_local_signer_url_shape_and_verification() {
        let signer = local_signer();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let expires_at = now + Duration::minutes(10);

        let url = signer.sign("thumbnail/abc1", expires_at).unwrap();
        let prefix = format!(
            "https://cdn.test/objects/thumbnail/abc1?expires={}&signature=",
            expires_at.timestamp()
        );
        assert!(url.starts_with(&prefix));

        let signature = &url[prefix.len()..];
        assert_eq!(signature.len(), 64);
        assert!(signer.verify("thumbnail/abc1", expires_at.timestamp(), signature, now));
        assert!(!signer.verify("abc1", expires_at.timestamp(), signature, now));
        assert!(!signer.verify("thumbnail/abc1", expires_at.timestamp(), signature, expires_at));
    }

    #[test]
    fn test_local_signer_rejects_bad_keys() {
        let signer = local_signer();
        let at = Utc::now();
        assert!(signer.sign("", at).is_err());
        assert!(signer.sign("../etc/passwd", at).is_err());
        assert!(signer.sign("thumbnail/", at).is_err());
    }

    #[test]
    fn test_issuer_sets_expiry_from_validity() {
        let issuer = SignedUrlIssuer::new(Box::new(local_signer()), 30);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let signed = issuer.obtain_at("abc1", now).unwrap();
        assert_eq!(signed.expires_at, now + Duration::minutes(30));
        assert!(!signed.url.is_empty());
    }

    #[test]
    fn test_issuer_maps_provider_failure() {
        let issuer = SignedUrlIssuer::new(Box::new(BrokenSigner), 30);
        match issuer.obtain("abc1") {
            Err(AnnotationError::Signing { key, reason }) => {
                assert_eq!(key, "abc1");
                assert!(reason.contains("credentials endpoint down"));
            }
            other => panic!("expected signing error, got {:?}", other),
        }
    }

    #[test]
    fn test_refresh_only_when_expired() {
        let issuer = SignedUrlIssuer::new(Box::new(local_signer()), 30);
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let current = issuer.obtain_at("abc1", now).unwrap();

        assert!(issuer
            .refresh_at("abc1", Some(&current), now + Duration::minutes(29))
            .unwrap()
            .is_none());

        let later = now + Duration::minutes(31);
        let fresh = issuer.refresh_at("abc1", Some(&current), later).unwrap().unwrap();
        assert_eq!(fresh.expires_at, later + Duration::minutes(30));

        assert!(issuer.refresh_at("abc1", None, now).unwrap().is_some());
    }
}
