use std::sync::Arc;

use anyhow::{Context, Result};
use oo7::Keyring;

use crate::config::APP_ID;

const KEYRING_ATTR_APP: &str = "application";
const KEYRING_ATTR_REF: &str = "key-ref";

/// Reference under which the completion provider's key is stored.
pub const PROVIDER_KEY_REF: &str = "provider";

/// Secret storage for the provider API key, backed by the desktop keyring.
#[derive(Debug, Clone)]
pub struct KeyringService {
    keyring: Arc<Keyring>,
}

impl KeyringService {
    pub async fn new() -> Result<Self> {
        let keyring = Keyring::new()
            .await
            .context("Failed to initialize keyring")?;
        Ok(Self {
            keyring: Arc::new(keyring),
        })
    }

    pub async fn store_api_key(&self, secret: &str) -> Result<()> {
        let attributes = Self::attributes(PROVIDER_KEY_REF);
        let attr_refs = attribute_refs(&attributes);
        self.keyring
            .create_item("Essay Assistant provider key", &attr_refs, secret, true)
            .await
            .context("Failed to store API key in keyring")?;
        tracing::info!("Stored provider API key in keyring");
        Ok(())
    }

    pub async fn api_key(&self) -> Result<Option<String>> {
        let attributes = Self::attributes(PROVIDER_KEY_REF);
        let items = self
            .keyring
            .search_items(&attribute_refs(&attributes))
            .await
            .context("Failed to search keyring")?;

        match items.first() {
            Some(item) => {
                let secret = item.secret().await.context("Failed to read secret")?;
                let key = String::from_utf8(secret.to_vec()).context("Secret is not valid UTF-8")?;
                Ok(Some(key))
            }
            None => Ok(None),
        }
    }

    fn attributes(key_ref: &str) -> Vec<(&'static str, String)> {
        vec![
            (KEYRING_ATTR_APP, APP_ID.to_string()),
            (KEYRING_ATTR_REF, key_ref.to_string()),
        ]
    }
}

fn attribute_refs<'a>(attributes: &'a [(&'static str, String)]) -> Vec<(&'static str, &'a str)> {
    attributes.iter().map(|(k, v)| (*k, v.as_str())).collect()
}
