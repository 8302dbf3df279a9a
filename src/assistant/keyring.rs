use std::collections::HashMap;

use crate::error::{Error, Result};

pub(crate) const SERVICE_NAME: &str = "agenda";
const KEYRING_SERVER: &str = "groq-api";

fn attributes() -> HashMap<&'static str, &'static str> {
    let mut attrs = HashMap::new();
    attrs.insert("service", SERVICE_NAME);
    attrs.insert("server", KEYRING_SERVER);
    attrs
}

async fn open() -> Result<oo7::Keyring> {
    oo7::Keyring::new()
        .await
        .map_err(|e| Error::Keyring(format!("Failed to connect to keyring: {}", e)))
}

/// Store the assistant API key in the system keyring via Secret Service.
pub async fn store_api_key(key: &str) -> Result<()> {
    let keyring = open().await?;
    keyring
        .create_item(
            "Agenda assistant API key",
            &attributes(),
            key.trim().as_bytes(),
            true, // replace existing
        )
        .await
        .map_err(|e| Error::Keyring(format!("Failed to store API key: {}", e)))?;
    Ok(())
}

/// Load the assistant API key from the system keyring.
pub async fn load_api_key() -> Result<Option<String>> {
    let keyring = open().await?;
    let items = keyring
        .search_items(&attributes())
        .await
        .map_err(|e| Error::Keyring(format!("Failed to search keyring: {}", e)))?;

    if let Some(item) = items.first() {
        let secret = item
            .secret()
            .await
            .map_err(|e| Error::Keyring(format!("Failed to read secret: {}", e)))?;
        let key = String::from_utf8(secret.to_vec())
            .map_err(|e| Error::Keyring(format!("Invalid UTF-8 in secret: {}", e)))?;
        if !key.is_empty() {
            return Ok(Some(key));
        }
    }

    Ok(None)
}

/// Remove the assistant API key from the system keyring.
pub async fn delete_api_key() -> Result<()> {
    let keyring = open().await?;
    let items = keyring
        .search_items(&attributes())
        .await
        .map_err(|e| Error::Keyring(format!("Failed to search keyring: {}", e)))?;

    for item in items {
        item.delete()
            .await
            .map_err(|e| Error::Keyring(format!("Failed to delete API key: {}", e)))?;
    }
    Ok(())
}
