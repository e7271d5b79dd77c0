use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::warn;

use crate::k8s::{K8sClient, K8sError};

/// Name of the config map the cluster settings are persisted in.
pub const SETTINGS_CONFIG_MAP_NAME: &str = "orchestra-settings";

/// Key inside the config map holding the settings JSON document.
const SETTINGS_DATA_KEY: &str = "settings.json";

/// Value kind a setting is allowed to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Bool,
    Integer,
    String,
}

impl SettingKind {
    /// Returns whether the given JSON value conforms to this kind.
    ///
    /// Floats are not valid integers; JSON has no separate integer type, so
    /// the distinction is made here.
    fn matches(&self, value: &Value) -> bool {
        match self {
            SettingKind::Bool => value.is_boolean(),
            SettingKind::Integer => value.is_i64() || value.is_u64(),
            SettingKind::String => value.is_string(),
        }
    }
}

impl fmt::Display for SettingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SettingKind::Bool => "boolean",
            SettingKind::Integer => "integer",
            SettingKind::String => "string",
        };
        write!(f, "{name}")
    }
}

/// Declaration of a single recognized setting.
pub struct SettingSpec {
    /// Option name.
    pub key: &'static str,
    /// Value kind the setting must hold.
    pub kind: SettingKind,
    /// Whether a full replace may drop the key. Protected keys
    /// (`removable = false`) are retained with their previous value when
    /// absent from a replacement.
    pub removable: bool,
    /// Whether a change to the persisted value requires a cluster restart to
    /// take effect.
    pub requires_restart: bool,
}

/// The fixed schema of recognized cluster settings.
pub const SETTINGS_SCHEMA: &[SettingSpec] = &[
    SettingSpec {
        key: "auth_enabled",
        kind: SettingKind::Bool,
        removable: false,
        requires_restart: true,
    },
    SettingSpec {
        key: "telemetry_enabled",
        kind: SettingKind::Bool,
        removable: false,
        requires_restart: true,
    },
    SettingSpec {
        key: "telemetry_uuid",
        kind: SettingKind::String,
        removable: false,
        requires_restart: false,
    },
    SettingSpec {
        key: "max_interactive_runs",
        kind: SettingKind::Integer,
        removable: false,
        requires_restart: true,
    },
    SettingSpec {
        key: "max_job_runs",
        kind: SettingKind::Integer,
        removable: false,
        requires_restart: true,
    },
    SettingSpec {
        key: "notification_email",
        kind: SettingKind::String,
        removable: true,
        requires_restart: false,
    },
    SettingSpec {
        key: "custom_jupyter_image",
        kind: SettingKind::String,
        removable: true,
        requires_restart: false,
    },
];

/// Looks up the schema entry for a key.
fn spec_for(key: &str) -> Option<&'static SettingSpec> {
    SETTINGS_SCHEMA.iter().find(|spec| spec.key == key)
}

/// Default values for all protected settings.
///
/// Removable settings have no default and are absent until set.
fn default_settings() -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("auth_enabled".to_owned(), json!(false)),
        ("telemetry_enabled".to_owned(), json!(true)),
        ("telemetry_uuid".to_owned(), json!("")),
        ("max_interactive_runs".to_owned(), json!(4)),
        ("max_job_runs".to_owned(), json!(4)),
    ])
}

/// Validation errors for settings mutations.
///
/// These are reported to the caller as a 400 with the offending key; they
/// never abort the request pipeline as generic failures.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("unknown setting: {0}")]
    UnknownKey(String),

    #[error("setting {key} must be of type {expected}")]
    WrongType {
        key: String,
        expected: SettingKind,
    },
}

/// In-memory view of the cluster settings.
///
/// Mutations are validated against [`SETTINGS_SCHEMA`] and applied
/// atomically: a failed [`update`](Self::update) or [`set`](Self::set)
/// leaves the settings untouched. Persistence goes through a
/// [`K8sClient`]-managed config map; concurrent writers are not serialized
/// here.
pub struct ClusterSettings {
    values: BTreeMap<String, Value>,
    /// Snapshot of the last persisted state, used to decide whether a save
    /// requires a cluster restart.
    persisted: BTreeMap<String, Value>,
}

impl Default for ClusterSettings {
    /// Settings as they are before anything was ever persisted.
    fn default() -> Self {
        let values = default_settings();
        Self {
            persisted: values.clone(),
            values,
        }
    }
}

impl ClusterSettings {
    /// Loads the settings from the persisted config map.
    ///
    /// A missing config map yields the defaults. Persisted entries that are
    /// no longer in the schema, or whose stored value does not conform to
    /// it, are dropped with a warning.
    pub async fn load(client: &dyn K8sClient) -> Result<ClusterSettings, K8sError> {
        let config_map = client.get_config_map(SETTINGS_CONFIG_MAP_NAME).await?;

        let stored = config_map
            .and_then(|cm| cm.data)
            .and_then(|mut data| data.remove(SETTINGS_DATA_KEY));

        let Some(stored) = stored else {
            return Ok(ClusterSettings::default());
        };

        let stored: Map<String, Value> = serde_json::from_str(&stored)?;

        let mut values = default_settings();
        for (key, value) in stored {
            match spec_for(&key) {
                Some(spec) if spec.kind.matches(&value) => {
                    values.insert(key, value);
                }
                _ => warn!(key, "dropping persisted setting not conforming to the schema"),
            }
        }

        Ok(ClusterSettings {
            persisted: values.clone(),
            values,
        })
    }

    /// Merges the given key/value pairs into the current settings.
    ///
    /// Every pair is validated before any of them is applied, so a failure
    /// leaves the settings exactly as they were. Keys absent from `partial`
    /// keep their current value.
    pub fn update(&mut self, partial: &Map<String, Value>) -> Result<(), SettingsError> {
        for (key, value) in partial {
            validate(key, value)?;
        }

        for (key, value) in partial {
            self.values.insert(key.clone(), value.clone());
        }

        Ok(())
    }

    /// Replaces the settings with `full`.
    ///
    /// Protected keys present in the current settings but absent from `full`
    /// are retained with their previous value, never silently dropped.
    /// Validation failures leave the settings untouched.
    pub fn set(&mut self, full: &Map<String, Value>) -> Result<(), SettingsError> {
        for (key, value) in full {
            validate(key, value)?;
        }

        let mut values: BTreeMap<String, Value> = full.clone().into_iter().collect();

        for spec in SETTINGS_SCHEMA.iter().filter(|spec| !spec.removable) {
            if !values.contains_key(spec.key)
                && let Some(previous) = self.values.get(spec.key)
            {
                values.insert(spec.key.to_owned(), previous.clone());
            }
        }

        self.values = values;

        Ok(())
    }

    /// Persists the current settings to the settings config map.
    ///
    /// Returns whether any persisted field flagged as requiring a restart
    /// differs from the previously persisted value. The flag is computed
    /// here, at save time, and never stored.
    pub async fn save(&mut self, client: &dyn K8sClient) -> Result<bool, K8sError> {
        let requires_restart = self.restart_required();

        let document = serde_json::to_string(&self.values)?;
        let data = BTreeMap::from([(SETTINGS_DATA_KEY.to_owned(), document)]);
        client
            .create_or_update_config_map(SETTINGS_CONFIG_MAP_NAME, data)
            .await?;

        self.persisted = self.values.clone();

        Ok(requires_restart)
    }

    /// Returns the full settings mapping for external consumption.
    pub fn as_map(&self) -> BTreeMap<String, Value> {
        self.values.clone()
    }

    /// Returns the value of a single setting, if present.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Whether the pending values differ from the persisted ones in any
    /// field flagged as requiring a restart.
    fn restart_required(&self) -> bool {
        SETTINGS_SCHEMA
            .iter()
            .filter(|spec| spec.requires_restart)
            .any(|spec| self.persisted.get(spec.key) != self.values.get(spec.key))
    }
}

/// Validates a single key/value pair against the schema.
fn validate(key: &str, value: &Value) -> Result<(), SettingsError> {
    let spec = spec_for(key).ok_or_else(|| SettingsError::UnknownKey(key.to_owned()))?;

    if !spec.kind.matches(value) {
        return Err(SettingsError::WrongType {
            key: key.to_owned(),
            expected: spec.kind,
        });
    }

    Ok(())
}
