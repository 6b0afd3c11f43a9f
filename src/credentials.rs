//! Portal login credentials
//!
//! Read from a YAML file shaped like:
//!
//! ```yaml
//! login:
//!   username: someone
//!   password: hunter2
//! ```

use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::config::ConfigError;

#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Deserialize)]
struct CredentialsFile {
    login: Credentials,
}

impl Credentials {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::CredentialsNotFound(path.to_path_buf()))?;
        Self::from_yaml(&content).map_err(|source| ConfigError::InvalidCredentials {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        let file: CredentialsFile = serde_yaml::from_str(yaml)?;
        Ok(file.login)
    }
}
