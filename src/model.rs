use serde::{Deserialize, Serialize};

use crate::algorithms::AlgorithmLists;

/// Expect/send pair run after login.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginScript {
    pub expect: String,
    pub send: String,
    #[serde(default)]
    pub is_regex: bool,
    #[serde(default)]
    pub optional: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub private_key_path: String,
    #[serde(default)]
    pub key_passphrase: String,
    /// Preference order per category; empty or missing means transport defaults.
    #[serde(default)]
    pub algorithms: AlgorithmLists,
    #[serde(default)]
    pub scripts: Vec<LoginScript>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            username: String::new(),
            password: String::new(),
            private_key_path: String::new(),
            key_passphrase: String::new(),
            algorithms: AlgorithmLists::new(),
            scripts: Vec::new(),
        }
    }
}

impl ConnectionSettings {
    pub fn endpoint(&self) -> String {
        format!("{}@{}:{}", self.username.trim(), self.host.trim(), self.port)
    }
}
