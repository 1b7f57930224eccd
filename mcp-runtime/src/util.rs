use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A bearer token saved by an external login helper. The runtime only reads
/// this file; nothing here writes it.
#[derive(Debug, Deserialize)]
pub struct StoredCredentials {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

pub fn client() -> reqwest::Client {
    reqwest::Client::new()
}

pub fn config_path() -> std::path::PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("fabric-rti");
    config_dir.join("config.json")
}

pub fn load_credentials() -> Option<StoredCredentials> {
    let path = config_path();
    let data = std::fs::read_to_string(&path).ok()?;
    serde_json::from_str(&data).ok()
}

/// Resolve the Fabric API bearer token: `FABRIC_API_TOKEN` wins, then the
/// stored credential file. Entra-issued tokens cannot be refreshed from here,
/// so an expired stored token is an error asking the operator to sign in
/// again rather than a silent retry.
pub fn resolve_token() -> Result<String, String> {
    if let Ok(token) = std::env::var("FABRIC_API_TOKEN") {
        if !token.trim().is_empty() {
            return Ok(token);
        }
    }

    if let Some(creds) = load_credentials() {
        let buffer = chrono::Duration::minutes(5);
        if Utc::now() + buffer >= creds.expires_at {
            return Err(
                "Stored Fabric token is expired. Sign in again or set FABRIC_API_TOKEN."
                    .to_string(),
            );
        }
        return Ok(creds.access_token);
    }

    Err(
        "No credentials found. Set FABRIC_API_TOKEN or store a token via your login helper."
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_ends_with_fabric_rti_config() {
        let path = config_path();
        assert!(path.ends_with("fabric-rti/config.json"));
    }

    #[test]
    fn stored_credentials_deserialize() {
        let creds: StoredCredentials = serde_json::from_str(
            r#"{"access_token": "tok", "expires_at": "2030-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(creds.access_token, "tok");
        assert!(creds.expires_at > Utc::now());
    }
}
