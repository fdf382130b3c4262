//! Session identity for the Spectra ingest server.
//!
//! The identity is sent once in the `auth` handshake and merged into every
//! outgoing frame afterwards. It never changes for the lifetime of a session.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// A team shown on one side of the observed match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    pub tricode: String,
    pub url: String,
}

impl Team {
    pub fn new(
        name: impl Into<String>,
        tricode: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            tricode: tricode.into(),
            url: url.into(),
        }
    }

    /// Reads `SPECTRA_{SIDE}_TEAM_{NAME,TRICODE,URL}`, defaulting missing fields to empty.
    fn from_env(side: &str) -> Self {
        let var = |field: &str| {
            std::env::var(format!("SPECTRA_{}_TEAM_{}", side, field)).unwrap_or_default()
        };

        Self {
            name: var("NAME"),
            tricode: var("TRICODE"),
            url: var("URL"),
        }
    }
}

/// Who is observing, which group they stream to, and the two teams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub observer_name: String,
    pub group_code: String,
    pub left_team: Team,
    pub right_team: Team,
}

impl SessionIdentity {
    /// Creates an identity from explicit values.
    pub fn new(
        observer_name: impl Into<String>,
        group_code: impl Into<String>,
        left_team: Team,
        right_team: Team,
    ) -> Self {
        Self {
            observer_name: observer_name.into(),
            group_code: group_code.into(),
            left_team,
            right_team,
        }
    }

    /// Loads the identity from environment variables.
    ///
    /// Observer name and group code are required; team fields are optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        let required = |key: &'static str| match std::env::var(key) {
            Ok(value) if !value.trim().is_empty() => Ok(value),
            _ => Err(ConfigError::Missing(key)),
        };

        Ok(Self {
            observer_name: required("SPECTRA_OBSERVER_NAME")?,
            group_code: required("SPECTRA_GROUP_CODE")?,
            left_team: Team::from_env("LEFT"),
            right_team: Team::from_env("RIGHT"),
        })
    }
}
