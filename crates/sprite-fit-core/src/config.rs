//! Session configuration document: user overrides, selections and notes,
//! persisted by the host as JSON. Every field except `version` is optional
//! so old documents keep loading as the schema grows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analyzer::Overrides;
use crate::error::{Result, SpriteFitError};
use crate::index::normalize_key;

pub const CONFIG_VERSION: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// (image key, percentage) pairs.
    #[serde(default)]
    pub overrides: Vec<(String, u32)>,
    /// Composite keys of per-animation scale overrides.
    #[serde(default)]
    pub local_overrides: Vec<String>,
    #[serde(default)]
    pub selections: Vec<String>,
    #[serde(default)]
    pub track_list: Vec<String>,
    #[serde(default)]
    pub skin_docs: Vec<(String, String)>,
    #[serde(default)]
    pub event_docs: Vec<(String, String)>,
    #[serde(default)]
    pub bone_docs: Vec<(String, String)>,
    #[serde(default)]
    pub general_notes: String,
    #[serde(default = "default_safety_buffer")]
    pub safety_buffer: u32,
}

fn default_safety_buffer() -> u32 {
    0
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            timestamp: None,
            overrides: Vec::new(),
            local_overrides: Vec::new(),
            selections: Vec::new(),
            track_list: Vec::new(),
            skin_docs: Vec::new(),
            event_docs: Vec::new(),
            bone_docs: Vec::new(),
            general_notes: String::new(),
            safety_buffer: 0,
        }
    }
}

impl SessionConfig {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| SpriteFitError::InvalidConfig(e.to_string()))
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| SpriteFitError::InvalidConfig(e.to_string()))
    }

    /// Stamp the current time before persisting.
    pub fn touch(&mut self) {
        self.timestamp = Some(Utc::now());
    }

    /// The analyzer-facing view of the persisted overrides.
    pub fn to_overrides(&self) -> Overrides {
        let mut out = Overrides::default();
        for (key, pct) in &self.overrides {
            out.global.insert(normalize_key(key), *pct);
        }
        for key in &self.local_overrides {
            out.local.insert(key.clone());
        }
        out
    }
}
