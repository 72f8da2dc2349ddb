//! Provision document resolution.
//!
//! The document is a JSON object whose keys override the built-in defaults
//! one by one. Legacy key names are accepted as aliases, unknown keys are kept
//! in [`ProvisionConfig::extra`] and otherwise ignored.

use std::collections::BTreeMap;
use std::io;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shell_escape::unix::escape;
use tracing::{debug, warn};

use super::ConfigError;
use crate::provider::IngressRule;
use crate::remote::expand_tilde;

/// Document read by `hoist start` when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Port the deployed service listens on unless configured otherwise.
pub const DEFAULT_SERVICE_PORT: u16 = 8080;

/// Source range allowed to reach the service unless configured otherwise.
pub const DEFAULT_INGRESS_CIDR: &str = "0.0.0.0/0";

/// Token in bootstrap commands replaced by the shell-escaped `source_repo`.
pub const SOURCE_REPO_PLACEHOLDER: &str = "{source_repo}";

const DEFAULT_IMAGE: &str = "Ubuntu 24.04 Noble Numbat";
const DEFAULT_INSTANCE_TYPE: &str = "DEV1-S";
const DEFAULT_KEY_NAME: &str = "hoist";
const DEFAULT_SSH_USER: &str = "root";
const DEFAULT_SSH_KEY_PATH: &str = "~/.ssh/id_rsa";
const DEFAULT_SOURCE_REPO: &str = "https://github.com/Caripson/parse-yoast-sitemap.git";
const DEFAULT_BOOTSTRAP_COMMANDS: [&str; 4] = [
    "sudo apt-get update",
    "sudo apt-get install -y git python3-pip",
    "git clone {source_repo} project",
    "cd project && pip3 install -r requirements.txt psutil",
];
const DEFAULT_UPLOADS: [(&str, &str); 2] = [
    ("config.json", "project/config.json"),
    ("server_config.json", "project/server_config.json"),
];
const DEFAULT_SERVICE_START_COMMAND: &str = concat!(
    "cd project && nohup python3 -m yoast_monitor.serve_reports ",
    "server_config.json > server.log 2>&1 &"
);

/// Legacy key names mapped onto their canonical field.
const KEY_ALIASES: [(&str, &str); 5] = [
    ("ami", "image_id"),
    ("security_groups", "security_group_ids"),
    ("allowed_ip", "ingress_cidr"),
    ("repo_url", "source_repo"),
    ("server_port", "service_port"),
];

/// Single-group alias that accepts a bare string.
const SINGLE_GROUP_ALIAS: &str = "security_group";

/// Local file copied to the instance before the service starts.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct UploadFile {
    /// Path on the machine running `hoist`, relative to the working directory.
    pub local_path: String,
    /// Destination on the instance, relative to the SSH user's home.
    pub remote_path: String,
}

/// Everything needed to provision, bootstrap, and start the service.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct ProvisionConfig {
    /// Image identifier, or an image label resolved by the provider.
    pub image_id: String,
    /// Commercial type or flavour to request.
    pub instance_type: String,
    /// SSH key name recorded on the instance.
    pub key_name: String,
    /// Security groups attached at creation, in order.
    pub security_group_ids: Vec<String>,
    /// Source range for the ingress rule opened before creation.
    pub ingress_cidr: String,
    /// TCP port the service listens on.
    pub service_port: u16,
    /// Remote user for SSH.
    pub ssh_user: String,
    /// Private key used for SSH. Supports `~/` expansion.
    pub ssh_key_path: String,
    /// Repository cloned on the instance by the bootstrap commands.
    pub source_repo: String,
    /// Shell commands run in order to prepare the instance.
    pub bootstrap_commands: Vec<String>,
    /// Files copied to the instance after bootstrapping.
    pub upload_files: Vec<UploadFile>,
    /// Command that launches the long-running service.
    pub service_start_command: String,
    /// Unrecognised document keys, kept for collaborators that read them.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            image_id: DEFAULT_IMAGE.to_owned(),
            instance_type: DEFAULT_INSTANCE_TYPE.to_owned(),
            key_name: DEFAULT_KEY_NAME.to_owned(),
            security_group_ids: Vec::new(),
            ingress_cidr: DEFAULT_INGRESS_CIDR.to_owned(),
            service_port: DEFAULT_SERVICE_PORT,
            ssh_user: DEFAULT_SSH_USER.to_owned(),
            ssh_key_path: DEFAULT_SSH_KEY_PATH.to_owned(),
            source_repo: DEFAULT_SOURCE_REPO.to_owned(),
            bootstrap_commands: DEFAULT_BOOTSTRAP_COMMANDS
                .iter()
                .map(|command| (*command).to_owned())
                .collect(),
            upload_files: DEFAULT_UPLOADS
                .iter()
                .map(|(local, remote)| UploadFile {
                    local_path: (*local).to_owned(),
                    remote_path: (*remote).to_owned(),
                })
                .collect(),
            service_start_command: DEFAULT_SERVICE_START_COMMAND.to_owned(),
            extra: BTreeMap::new(),
        }
    }
}

impl ProvisionConfig {
    /// Resolves the configuration from an optional JSON document.
    ///
    /// A missing path, a missing file, or an unreadable file all yield the
    /// defaults. A document that exists must be a valid JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the document is malformed or a merged
    /// value fails validation.
    pub fn resolve(path: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let Some(document_path) = path else {
            return Ok(defaults);
        };
        let Some(contents) = read_document(document_path) else {
            return Ok(defaults);
        };

        let document = parse_document(document_path, &contents)?;
        let config = Self::merge(&defaults, document)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlays `document` onto `defaults` key by key.
    ///
    /// Aliased keys are normalised first; when both an alias and its
    /// canonical key appear, the canonical key wins.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Field`] when a recognised key has the wrong type.
    pub fn merge(defaults: &Self, document: Map<String, Value>) -> Result<Self, ConfigError> {
        let Value::Object(mut merged) =
            serde_json::to_value(defaults).map_err(|err| ConfigError::Field(err.to_string()))?
        else {
            return Err(ConfigError::Field(String::from(
                "defaults did not serialise to an object",
            )));
        };

        for (key, value) in normalise_aliases(document) {
            merged.insert(key, value);
        }

        serde_json::from_value(Value::Object(merged))
            .map_err(|err| ConfigError::Field(err.to_string()))
    }

    /// Checks the invariants a merged configuration must satisfy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_port == 0 {
            return Err(ConfigError::Invalid {
                field: "service_port",
                reason: String::from("must be between 1 and 65535"),
            });
        }

        self.ingress_cidr
            .parse::<IpNet>()
            .map_err(|err| ConfigError::Invalid {
                field: "ingress_cidr",
                reason: format!("'{}' is not a CIDR range: {err}", self.ingress_cidr),
            })?;

        for (field, value) in [
            ("image_id", &self.image_id),
            ("instance_type", &self.instance_type),
            ("ssh_user", &self.ssh_user),
            ("service_start_command", &self.service_start_command),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: String::from("must not be empty"),
                });
            }
        }

        if self
            .upload_files
            .iter()
            .any(|file| file.local_path.trim().is_empty() || file.remote_path.trim().is_empty())
        {
            return Err(ConfigError::Invalid {
                field: "upload_files",
                reason: String::from("entries need both local_path and remote_path"),
            });
        }

        Ok(())
    }

    /// Ingress rule for the first configured security group, if any.
    #[must_use]
    pub fn ingress_rule(&self) -> Option<IngressRule> {
        self.security_group_ids.first().map(|group| IngressRule {
            security_group: group.clone(),
            cidr: self.ingress_cidr.clone(),
            port: self.service_port,
        })
    }

    /// Bootstrap commands with the source repository substituted in.
    #[must_use]
    pub fn expanded_bootstrap_commands(&self) -> Vec<String> {
        let repo = escape(self.source_repo.as_str().into());
        self.bootstrap_commands
            .iter()
            .map(|command| command.replace(SOURCE_REPO_PLACEHOLDER, repo.as_ref()))
            .collect()
    }

    /// SSH private key path with a leading `~/` expanded.
    #[must_use]
    pub fn ssh_identity_file(&self) -> String {
        expand_tilde(&self.ssh_key_path)
    }
}

fn normalise_aliases(document: Map<String, Value>) -> Map<String, Value> {
    let mut normalised = Map::new();
    let mut aliased = Vec::new();

    for (key, value) in document {
        if key == SINGLE_GROUP_ALIAS {
            aliased.push(("security_group_ids", single_group(value)));
        } else if let Some((_, canonical)) = KEY_ALIASES.iter().find(|(alias, _)| *alias == key) {
            aliased.push((*canonical, value));
        } else {
            normalised.insert(key, value);
        }
    }

    for (canonical, value) in aliased {
        normalised.entry(canonical).or_insert(value);
    }
    normalised
}

fn single_group(value: Value) -> Value {
    match value {
        Value::String(group) if group.trim().is_empty() => Value::Array(Vec::new()),
        Value::String(group) => Value::Array(vec![Value::String(group)]),
        other => other,
    }
}

fn parse_document(path: &Utf8Path, contents: &str) -> Result<Map<String, Value>, ConfigError> {
    if contents.trim().is_empty() {
        return Ok(Map::new());
    }

    let value: Value = serde_json::from_str(contents).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ConfigError::NotAnObject {
            path: path.to_path_buf(),
        }),
    }
}

fn read_document(path: &Utf8Path) -> Option<String> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    let file_name = path.file_name()?;

    let contents = Dir::open_ambient_dir(parent, ambient_authority())
        .and_then(|dir| dir.read_to_string(file_name));
    match contents {
        Ok(text) => Some(text),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(%path, "provision document not found; using defaults");
            None
        }
        Err(err) => {
            warn!(%path, error = %err, "provision document unreadable; using defaults");
            None
        }
    }
}
