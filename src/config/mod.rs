use std::env;
use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::upstream::bolna::DEFAULT_API_URL;

/// Caller role. `admin` bypasses per-agent ownership checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Member,
}

/// A tenant-configured upstream bot identity a user may query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Internal identifier.
    pub id: String,
    /// Upstream provider agent id.
    pub agent_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One configured dashboard user. The credential store proper is an external
/// collaborator; its interface here is "bearer token -> identity".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: String,
    pub token: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BasicSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for BasicSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Provider credentials. Absence is a per-request configuration error (500),
/// never a startup failure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BolnaSettings {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_bolna_api_url")]
    pub api_url: String,
    /// Fallback agent for call bridges when the request names none.
    #[serde(default)]
    pub default_agent_id: Option<String>,
}

fn default_bolna_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl Default for BolnaSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_bolna_api_url(),
            default_agent_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct KnowlaritySettings {
    #[serde(default)]
    pub api_key: Option<String>,
    /// The carrier number calls are placed through.
    #[serde(default)]
    pub sr_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageKind,
    /// File-backed variant only; defaults to a scratch path under the OS
    /// temp directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl StorageSettings {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| env::temp_dir().join("calldeck").join("latest-conversation.json"))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub basic: BasicSettings,
    #[serde(default)]
    pub bolna: BolnaSettings,
    #[serde(default)]
    pub knowlarity: KnowlaritySettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Start with defaults
            .add_source(File::with_name("config/default").required(false))
            // Add environment-specific file
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Add local configuration file (not tracked by git)
            .add_source(File::with_name("config/local").required(false))
            // Add in settings from environment variables (with prefix CALLDECK)
            .add_source(Environment::with_prefix("CALLDECK").separator("__"))
            .build()?;

        s.try_deserialize()
    }

    /// Find the configured user owning this bearer token.
    pub fn user_for_token(&self, token: &str) -> Option<&UserConfig> {
        self.users.iter().find(|u| u.token == token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_defaults_to_member() {
        let user: UserConfig = serde_json::from_value(serde_json::json!({
            "name": "ops",
            "token": "t-1",
        }))
        .unwrap();
        assert_eq!(user.role, Role::Member);
        assert!(user.agents.is_empty());
    }

    #[test]
    fn test_storage_path_defaults_under_temp_dir() {
        let storage = StorageSettings::default();
        let path = storage.resolved_path();
        assert!(path.ends_with("calldeck/latest-conversation.json"));
    }
}
