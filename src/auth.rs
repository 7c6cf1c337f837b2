//! Device token lookup.
//!
//! Tokens are opaque pre-shared strings listed in the config file. Each one
//! maps to the Readeck client for its user; users sharing a Readeck
//! credential share a client, and all clients share one connection pool.

use anyhow::Result;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::ApiError;
use crate::readeck::{BookmarkBackend, ReadeckClient};

/// Short stable identifier for a token, safe to put in logs.
pub fn fingerprint(token: &str) -> String {
    let digest = hex::encode(Sha256::digest(token.as_bytes()));
    digest[..8].to_string()
}

#[derive(Default)]
pub struct UserDirectory {
    backends: HashMap<String, Arc<dyn BookmarkBackend>>,
}

impl UserDirectory {
    pub fn from_config(cfg: &Config, http: Client) -> Result<Self> {
        let base_url = cfg.readeck.base_url()?;
        let timeout = cfg.readeck.timeout();

        let mut clients: HashMap<&str, Arc<dyn BookmarkBackend>> = HashMap::new();
        let mut directory = UserDirectory::default();

        for user in &cfg.users {
            let backend = clients
                .entry(user.readeck_access_token.as_str())
                .or_insert_with(|| {
                    let client: Arc<dyn BookmarkBackend> = Arc::new(ReadeckClient::new(
                        http.clone(),
                        base_url.clone(),
                        user.readeck_access_token.as_str(),
                        timeout,
                    ));
                    client
                })
                .clone();

            tracing::info!(
                user = user.name.as_deref().unwrap_or("unnamed"),
                token = %fingerprint(&user.token),
                "registered device"
            );
            directory.insert(user.token.as_str(), backend);
        }

        Ok(directory)
    }

    pub fn insert(&mut self, token: impl Into<String>, backend: Arc<dyn BookmarkBackend>) {
        self.backends.insert(token.into(), backend);
    }

    pub fn resolve(&self, token: &str) -> Option<Arc<dyn BookmarkBackend>> {
        if token.is_empty() {
            return None;
        }
        self.backends.get(token).cloned()
    }

    pub fn authenticate(&self, token: &str) -> Result<Arc<dyn BookmarkBackend>, ApiError> {
        self.resolve(token).ok_or_else(|| {
            tracing::warn!(token = %fingerprint(token), "rejected unknown access token");
            ApiError::Unauthorized
        })
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::from_yaml(
            r#"
readeck:
  host: https://readeck.example.com
users:
  - name: bedroom
    token: device-a
    readeck_access_token: shared
  - name: office
    token: device-b
    readeck_access_token: shared
  - token: device-c
    readeck_access_token: other
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_fingerprint() {
        let fp = fingerprint("device-a");
        assert_eq!(fp.len(), 8);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(fp, fingerprint("device-a"));
        assert_ne!(fp, fingerprint("device-b"));
    }

    #[test]
    fn test_resolve() {
        let directory = UserDirectory::from_config(&config(), Client::new()).unwrap();
        assert_eq!(directory.len(), 3);

        assert!(directory.resolve("device-a").is_some());
        assert!(directory.resolve("device-c").is_some());
        assert!(directory.resolve("").is_none());
        assert!(directory.resolve("device-z").is_none());
        assert!(matches!(directory.authenticate("nope"), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn test_shared_credentials_share_a_client() {
        let directory = UserDirectory::from_config(&config(), Client::new()).unwrap();
        let a = directory.resolve("device-a").unwrap();
        let b = directory.resolve("device-b").unwrap();
        let c = directory.resolve("device-c").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
