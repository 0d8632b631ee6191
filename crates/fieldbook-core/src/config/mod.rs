//! Cloud sync configuration.
//!
//! A `SyncConfig` names the shared remote document (`syncKey`) and the
//! project that hosts it. It is persisted as JSON next to the records and can
//! be supplied or overridden from the environment.

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};

pub const ENV_SYNC_KEY: &str = "FIELDBOOK_SYNC_KEY";
pub const ENV_API_KEY: &str = "FIELDBOOK_API_KEY";
pub const ENV_PROJECT_ID: &str = "FIELDBOOK_PROJECT_ID";
pub const ENV_DATABASE_URL: &str = "FIELDBOOK_DATABASE_URL";
pub const ENV_AUTH_DOMAIN: &str = "FIELDBOOK_AUTH_DOMAIN";

/// Connection details for the shared remote document.
///
/// The API key is a public client identifier, not a secret, but it is still
/// kept out of `Debug` output.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub sync_key: String,
    pub api_key: String,
    pub project_id: String,
    #[serde(rename = "databaseURL", alias = "databaseUrl")]
    pub database_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_domain: Option<String>,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncConfig")
            .field("sync_key", &self.sync_key)
            .field("api_key", &"[REDACTED]")
            .field("project_id", &self.project_id)
            .field("database_url", &self.database_url)
            .field("auth_domain", &self.auth_domain)
            .finish()
    }
}

impl SyncConfig {
    /// Required fields that are blank, by their JSON names.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("syncKey", &self.sync_key),
            ("apiKey", &self.api_key),
            ("projectId", &self.project_id),
            ("databaseURL", &self.database_url),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Check the config is usable for a connection.
    pub fn validate(&self) -> Result<(), String> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(format!("sync config is missing {}", missing.join(", ")));
        }
        if !is_http_url(self.database_url.trim()) {
            return Err("sync config field 'databaseURL' must include http:// or https://".to_string());
        }
        Ok(())
    }

    /// Trim every field and strip a trailing slash from the database URL.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            sync_key: self.sync_key.trim().to_string(),
            api_key: self.api_key.trim().to_string(),
            project_id: self.project_id.trim().to_string(),
            database_url: self.database_url.trim().trim_end_matches('/').to_string(),
            auth_domain: normalize_text_option(self.auth_domain),
        }
    }

    /// Auth domain, defaulting to `{projectId}.firebaseapp.com`.
    pub fn resolved_auth_domain(&self) -> String {
        normalize_text_option(self.auth_domain.clone())
            .unwrap_or_else(|| format!("{}.firebaseapp.com", self.project_id.trim()))
    }

    /// Build a config from `FIELDBOOK_*` environment variables.
    ///
    /// Returns `None` when none of them are set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Overlay any `FIELDBOOK_*` environment variables onto this config.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.overlay(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let any_set = [
            ENV_SYNC_KEY,
            ENV_API_KEY,
            ENV_PROJECT_ID,
            ENV_DATABASE_URL,
            ENV_AUTH_DOMAIN,
        ]
        .into_iter()
        .any(|name| normalize_text_option(lookup(name)).is_some());

        any_set.then(|| Self::default().overlay(lookup))
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| normalize_text_option(lookup(name));
        if let Some(value) = read(ENV_SYNC_KEY) {
            self.sync_key = value;
        }
        if let Some(value) = read(ENV_API_KEY) {
            self.api_key = value;
        }
        if let Some(value) = read(ENV_PROJECT_ID) {
            self.project_id = value;
        }
        if let Some(value) = read(ENV_DATABASE_URL) {
            self.database_url = value;
        }
        if let Some(value) = read(ENV_AUTH_DOMAIN) {
            self.auth_domain = Some(value);
        }
        self.normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn complete() -> SyncConfig {
        SyncConfig {
            sync_key: "crew-1".to_string(),
            api_key: "AIza-test".to_string(),
            project_id: "fieldbook-demo".to_string(),
            database_url: "https://fieldbook-demo.firebaseio.com".to_string(),
            auth_domain: None,
        }
    }

    #[test]
    fn missing_fields_are_reported_by_json_name() {
        let config = SyncConfig {
            api_key: "  ".to_string(),
            ..complete()
        };
        assert_eq!(config.missing_fields(), vec!["apiKey"]);
        assert!(!config.is_complete());
        assert!(config.validate().unwrap_err().contains("apiKey"));
    }

    #[test]
    fn validate_requires_http_database_url() {
        let config = SyncConfig {
            database_url: "fieldbook-demo.firebaseio.com".to_string(),
            ..complete()
        };
        assert!(config.validate().unwrap_err().contains("databaseURL"));
        assert!(complete().validate().is_ok());
    }

    #[test]
    fn auth_domain_defaults_from_project_id() {
        assert_eq!(
            complete().resolved_auth_domain(),
            "fieldbook-demo.firebaseapp.com"
        );
        let custom = SyncConfig {
            auth_domain: Some("auth.example.com".to_string()),
            ..complete()
        };
        assert_eq!(custom.resolved_auth_domain(), "auth.example.com");
    }

    #[test]
    fn serde_uses_original_field_names() {
        let json = serde_json::to_value(complete()).unwrap();
        assert_eq!(json["databaseURL"], "https://fieldbook-demo.firebaseio.com");
        assert_eq!(json["syncKey"], "crew-1");
        assert!(json.get("authDomain").is_none());

        let parsed: SyncConfig =
            serde_json::from_str(r#"{"syncKey":"k","databaseUrl":"https://x"}"#).unwrap();
        assert_eq!(parsed.database_url, "https://x");
        assert_eq!(parsed.api_key, "");
    }

    #[test]
    fn lookup_builds_and_normalizes() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_SYNC_KEY, " crew-9 "),
            (ENV_DATABASE_URL, "https://db.example.com/"),
        ]);
        let config = SyncConfig::from_lookup(|name| vars.get(name).map(ToString::to_string))
            .expect("config from env");

        assert_eq!(config.sync_key, "crew-9");
        assert_eq!(config.database_url, "https://db.example.com");
        assert_eq!(config.missing_fields(), vec!["apiKey", "projectId"]);
    }

    #[test]
    fn lookup_without_any_variable_is_none() {
        assert!(SyncConfig::from_lookup(|_| None).is_none());
    }

    #[test]
    fn debug_redacts_api_key() {
        let debug = format!("{:?}", complete());
        assert!(!debug.contains("AIza-test"));
        assert!(debug.contains("[REDACTED]"));
    }
}
