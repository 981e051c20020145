//! Environment secrets, keyed by environment id.
//!
//! Secrets are only read from configuration; Ferry never writes them anywhere.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CredentialsConfig(BTreeMap<String, String>);

impl CredentialsConfig {
    /// Secret for `environment_id`, if configured.
    ///
    /// Environment variable names cannot portably contain `-`, so
    /// `FERRY_CREDENTIALS__ENV_1A2B3C4D` is accepted for `env-1a2b3c4d`.
    #[must_use]
    pub fn password_for(&self, environment_id: &str) -> Option<&str> {
        let id = environment_id.to_ascii_lowercase();
        self.0
            .get(&id)
            .or_else(|| self.0.get(&id.replace('-', "_")))
            .map(String::as_str)
            .filter(|secret| !secret.is_empty())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CredentialsConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into().to_ascii_lowercase(), v.into()))
                .collect(),
        )
    }
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|k| (k, "<redacted>")))
            .finish()
    }
}
