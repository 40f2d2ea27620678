//! Run configuration: `config.json` (policy) and `machines.json` (fleet)
//!
//! Every section of `config.json` is optional. A missing `config.json` means
//! all defaults; a missing or malformed `machines.json` is fatal.

use crate::constants::*;
use crate::core::auditor::AuditSettings;
use crate::core::credential::StaticCredentialStore;
use crate::core::fleet::FleetSettings;
use crate::models::{CredentialProfile, Credentials, Host, SecureString, Username};
use crate::normalize::{normalize_address, normalize_host_name, normalize_images, normalize_keywords};
use crate::utils::ConfigError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const DEFAULT_MACHINES_FILE: &str = "machines.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub critical_packages: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            critical_packages: DEFAULT_CRITICAL_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    pub alert_threshold: u8,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            alert_threshold: DEFAULT_DISK_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// 0 = Monday ... 6 = Sunday
    pub report_weekday: u8,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            report_weekday: DEFAULT_REPORT_WEEKDAY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainersConfig {
    /// Added to the built-in ignore list
    pub ignored_images: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    pub port: u16,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            port: DEFAULT_SSH_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub max_concurrency: usize,
    pub deadline_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            deadline_secs: DEFAULT_RUN_DEADLINE_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsConfig {
    pub directory: PathBuf,
    pub max_files: usize,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_REPORT_DIR),
            max_files: DEFAULT_REPORT_MAX_FILES,
        }
    }
}

/// Contents of `config.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub security: SecurityConfig,
    pub disk: DiskConfig,
    pub schedule: ScheduleConfig,
    pub containers: ContainersConfig,
    pub ssh: SshConfig,
    pub run: RunConfig,
    pub reports: ReportsConfig,
}

impl Config {
    /// Check ranges and normalise keyword and image lists in place
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.disk.alert_threshold > 100 {
            return Err(ConfigError::Invalid(format!(
                "disk.alert_threshold must be between 0 and 100 (got {})",
                self.disk.alert_threshold
            )));
        }
        if self.schedule.report_weekday > 6 {
            return Err(ConfigError::Invalid(format!(
                "schedule.report_weekday must be between 0 and 6 (got {})",
                self.schedule.report_weekday
            )));
        }
        if self.run.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "run.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.ssh.connect_timeout_secs == 0 || self.ssh.command_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "ssh timeouts must be at least 1 second".to_string(),
            ));
        }
        if self.reports.max_files == 0 {
            return Err(ConfigError::Invalid(
                "reports.max_files must be at least 1".to_string(),
            ));
        }

        self.security.critical_packages =
            normalize_keywords(&self.security.critical_packages).map_err(ConfigError::Invalid)?;
        self.containers.ignored_images =
            normalize_images(&self.containers.ignored_images).map_err(ConfigError::Invalid)?;
        Ok(self)
    }

    /// Built-in ignore list followed by the configured extras
    pub fn ignored_images(&self) -> Vec<String> {
        let builtin = IGNORED_IMAGES.iter().map(|s| s.to_string());
        let merged: Vec<String> = builtin
            .chain(self.containers.ignored_images.iter().cloned())
            .collect();
        normalize_images(&merged).unwrap_or(merged)
    }

    pub fn audit_settings(&self) -> AuditSettings {
        AuditSettings {
            critical_keywords: self.security.critical_packages.clone(),
            disk_threshold: self.disk.alert_threshold,
            ignored_images: self.ignored_images(),
            connect_timeout: Duration::from_secs(self.ssh.connect_timeout_secs),
        }
    }

    pub fn fleet_settings(&self) -> FleetSettings {
        FleetSettings {
            max_concurrency: self.run.max_concurrency,
            deadline: Duration::from_secs(self.run.deadline_secs),
            report_weekday: self.schedule.report_weekday,
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.ssh.command_timeout_secs)
    }
}

/// One entry of `machines.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineEntry {
    pub name: String,
    pub ip: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub sudo_password: Option<String>,
    #[serde(default)]
    pub disk_threshold: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachinesFile {
    #[serde(default)]
    pub machines: Vec<MachineEntry>,
}

/// Validated fleet: host descriptors plus the credentials they reference
#[derive(Debug, Default)]
pub struct Fleet {
    pub hosts: Vec<Host>,
    pub credentials: StaticCredentialStore,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and validate `config.json`; a missing file yields the defaults
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        return Config::default().validate();
    }
    let config: Config = read_json(path)?;
    let config = config.validate()?;
    tracing::debug!(
        path = %path.display(),
        keywords = config.security.critical_packages.len(),
        threshold = config.disk.alert_threshold,
        "config loaded"
    );
    Ok(config)
}

/// Write a default `config.json`. Refuses to overwrite an existing file.
pub fn write_default_config(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Err(ConfigError::Invalid(format!(
            "{} already exists",
            path.display()
        )));
    }
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let contents = serde_json::to_string_pretty(&Config::default()).map_err(|source| {
        ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        }
    })?;
    fs::write(path, contents).map_err(io_err)?;
    tracing::info!(path = %path.display(), "default config written");
    Ok(())
}

/// Load `machines.json` and turn it into hosts and a credential store
pub fn load_machines(path: &Path, config: &Config) -> Result<Fleet, ConfigError> {
    let file: MachinesFile = read_json(path)?;
    build_fleet(file, config)
}

pub fn build_fleet(file: MachinesFile, config: &Config) -> Result<Fleet, ConfigError> {
    let mut fleet = Fleet::default();
    let mut seen = HashSet::new();

    for entry in file.machines {
        let name = normalize_host_name(&entry.name).map_err(ConfigError::Invalid)?;
        if !seen.insert(name.clone()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate machine name '{}'",
                name
            )));
        }
        let address = normalize_address(&entry.ip)
            .map_err(|e| ConfigError::Invalid(format!("machine '{}': {}", name, e)))?;
        if let Some(threshold) = entry.disk_threshold.filter(|t| *t > 100) {
            return Err(ConfigError::Invalid(format!(
                "machine '{}': disk_threshold must be between 0 and 100 (got {})",
                name, threshold
            )));
        }

        let mut host = Host::new(name.clone(), address);
        host.port = entry.port.unwrap_or(config.ssh.port);
        host.disk_threshold = entry.disk_threshold;

        if let Some(credentials) = machine_credentials(&name, &entry)? {
            fleet
                .credentials
                .insert(CredentialProfile::for_host(&name), credentials);
        }
        fleet.hosts.push(host);
    }

    tracing::debug!(
        hosts = fleet.hosts.len(),
        with_credentials = fleet.credentials.len(),
        "machines loaded"
    );
    Ok(fleet)
}

fn machine_credentials(
    name: &str,
    entry: &MachineEntry,
) -> Result<Option<Credentials>, ConfigError> {
    let (Some(username), Some(password)) = (&entry.username, &entry.password) else {
        return Ok(None);
    };
    let username = Username::new(username.trim())
        .map_err(|e| ConfigError::Invalid(format!("machine '{}': {}", name, e)))?;
    let escalation = entry
        .sudo_password
        .clone()
        .unwrap_or_else(|| password.clone());

    Ok(Some(
        Credentials::new(username, SecureString::new(password.clone()))
            .with_escalation(SecureString::new(escalation)),
    ))
}
