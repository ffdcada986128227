//! Connection settings for the MongoDB binding.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use mongodb::options::{AuthMechanism, ClientOptions, Credential, ServerAddress};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError, ValidationError};

/// Mechanism used when credentials are given without one.
pub const DEFAULT_AUTH_MECHANISM: &str = "SCRAM-SHA-256";

/// Deserializable connection settings. Empty strings and zeros mean "unset".
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MongoOptions {
    pub auth_mechanism: String,
    pub username: String,
    pub password: String,
    /// Database the credentials are defined in.
    pub auth_database: String,
    /// Database holding the tables.
    pub database: String,
    pub connect_timeout_seconds: u64,
    pub min_pool_size: u32,
    pub max_pool_size: u32,
    /// `host:port` entries.
    pub hosts: Vec<String>,
}

impl fmt::Debug for MongoOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoOptions")
            .field("auth_mechanism", &self.auth_mechanism)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("auth_database", &self.auth_database)
            .field("database", &self.database)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("min_pool_size", &self.min_pool_size)
            .field("max_pool_size", &self.max_pool_size)
            .field("hosts", &self.hosts)
            .finish()
    }
}

impl MongoOptions {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.hosts.is_empty() || self.hosts.iter().any(|h| h.trim().is_empty()) {
            return Err(ValidationError::InvalidOptions("at least one host is required".into()));
        }
        if self.database.is_empty() {
            return Err(ValidationError::InvalidOptions("database is required".into()));
        }
        if self.max_pool_size > 0 && self.min_pool_size > self.max_pool_size {
            return Err(ValidationError::InvalidOptions(format!(
                "minPoolSize {} exceeds maxPoolSize {}",
                self.min_pool_size, self.max_pool_size
            )));
        }
        if self.username.is_empty() && !self.password.is_empty() {
            return Err(ValidationError::InvalidOptions(
                "password given without username".into(),
            ));
        }
        Ok(())
    }

    fn credential(&self) -> Result<Option<Credential>> {
        if self.username.is_empty() {
            return Ok(None);
        }
        let name = if self.auth_mechanism.is_empty() {
            DEFAULT_AUTH_MECHANISM
        } else {
            self.auth_mechanism.as_str()
        };
        let mechanism = AuthMechanism::from_str(name).map_err(|e| {
            StorageError::connection(format!("unsupported auth mechanism {name}"), e)
        })?;
        let mut credential = Credential::default();
        credential.username = Some(self.username.clone());
        credential.password = Some(self.password.clone()).filter(|p| !p.is_empty());
        credential.source = Some(self.auth_database.clone()).filter(|s| !s.is_empty());
        credential.mechanism = Some(mechanism);
        Ok(Some(credential))
    }

    /// Driver options equivalent to these settings.
    pub fn client_options(&self) -> Result<ClientOptions> {
        self.validate()?;
        let hosts = self
            .hosts
            .iter()
            .map(|h| {
                ServerAddress::parse(h.trim())
                    .map_err(|e| StorageError::connection(format!("invalid host {h}"), e))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut options = ClientOptions::default();
        options.hosts = hosts;
        options.credential = self.credential()?;
        if self.connect_timeout_seconds > 0 {
            options.connect_timeout = Some(Duration::from_secs(self.connect_timeout_seconds));
        }
        if self.min_pool_size > 0 {
            options.min_pool_size = Some(self.min_pool_size);
        }
        if self.max_pool_size > 0 {
            options.max_pool_size = Some(self.max_pool_size);
        }
        Ok(options)
    }
}

// ============================================================================
// Tests
// ============================================================================
