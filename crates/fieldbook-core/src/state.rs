//! Shared sync connection state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where the cloud connection is in its lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Uninitialized,
    /// Sync is enabled but the configuration is incomplete
    ConfigMissing,
    /// No transport could be loaded
    SdkMissing,
    /// The transport failed to start or rejected a request
    SdkError,
    /// Sign-in was refused
    AuthError,
    Init,
    Ready,
    Disabled,
}

impl ConnectionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::ConfigMissing => "config_missing",
            Self::SdkMissing => "sdk_missing",
            Self::SdkError => "sdk_error",
            Self::AuthError => "auth_error",
            Self::Init => "init",
            Self::Ready => "ready",
            Self::Disabled => "disabled",
        }
    }

    /// True once a channel is connected and usable.
    #[must_use]
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&ConnectionStatus::ConfigMissing).unwrap();
        assert_eq!(json, "\"config_missing\"");
        assert_eq!(ConnectionStatus::AuthError.to_string(), "auth_error");
    }
}
