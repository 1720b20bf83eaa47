// ABOUTME: Configuration loading and management for hearth
// ABOUTME: TOML file listing compose services plus compose CLI settings

use crate::adapters::{FactorioServer, MinecraftServer};
use crate::compose::{ComposeCli, DEFAULT_BINARY};
use crate::service::{GameService, RunningService, ServiceDefinition};
use crate::supervisor::{Supervisor, SupervisorOptions};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Compose CLI settings
    pub compose: ComposeConfig,
    /// Services that can be started
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    /// Binary providing `compose` (defaults to "docker")
    pub binary: String,
    /// Limit on `compose up` in seconds; 0 waits indefinitely
    pub setup_timeout_secs: u64,
    /// Default wait for a console command response, in milliseconds
    pub command_timeout_ms: u64,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            setup_timeout_secs: 300,
            command_timeout_ms: 2000,
        }
    }
}

impl ComposeConfig {
    pub fn cli(&self) -> ComposeCli {
        ComposeCli::new(&self.binary)
    }

    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            command_timeout: Duration::from_millis(self.command_timeout_ms),
            setup_timeout: (self.setup_timeout_secs > 0)
                .then(|| Duration::from_secs(self.setup_timeout_secs)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Plain compose project without a user query
    #[default]
    Generic,
    Minecraft,
    Factorio,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Unique service name
    pub name: String,
    /// Compose project directory (`~` is expanded)
    pub directory: String,
    #[serde(default)]
    pub kind: ServiceKind,
}

impl ServiceConfig {
    pub fn definition(&self) -> ServiceDefinition {
        ServiceDefinition::new(&self.name, &self.directory)
    }

    /// Build the service for console use, whatever its kind.
    pub fn build(&self, compose: &ComposeConfig) -> Box<dyn RunningService> {
        let (definition, cli, options) = self.parts(compose);
        match self.kind {
            ServiceKind::Generic => Box::new(Supervisor::new(definition, cli, options)),
            ServiceKind::Minecraft => Box::new(MinecraftServer::new(definition, cli, options)),
            ServiceKind::Factorio => Box::new(FactorioServer::new(definition, cli, options)),
        }
    }

    /// Build the typed game adapter; `None` for generic services.
    pub fn build_game(&self, compose: &ComposeConfig) -> Option<Box<dyn GameService>> {
        let (definition, cli, options) = self.parts(compose);
        match self.kind {
            ServiceKind::Generic => None,
            ServiceKind::Minecraft => Some(Box::new(MinecraftServer::new(definition, cli, options))),
            ServiceKind::Factorio => Some(Box::new(FactorioServer::new(definition, cli, options))),
        }
    }

    fn parts(&self, compose: &ComposeConfig) -> (ServiceDefinition, ComposeCli, SupervisorOptions) {
        (
            self.definition(),
            compose.cli(),
            compose.supervisor_options(),
        )
    }
}

impl Config {
    /// Get the XDG config directory for hearth (~/.config/hearth)
    pub fn config_dir() -> PathBuf {
        // Respect XDG_CONFIG_HOME if set, otherwise use ~/.config
        std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .map(|p| p.join(".config"))
                    .unwrap_or_else(|| PathBuf::from("."))
            })
            .join("hearth")
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load config from the XDG config directory, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject duplicate service names
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for service in &self.services {
            if !seen.insert(service.name.as_str()) {
                anyhow::bail!("Duplicate service name in config: {}", service.name);
            }
        }
        Ok(())
    }

    /// Look up a configured service by name
    pub fn service(&self, name: &str) -> Result<&ServiceConfig> {
        self.services
            .iter()
            .find(|s| s.name == name)
            .with_context(|| format!("No service named '{}' in config", name))
    }

    /// Generate a default config file content
    pub fn default_toml() -> String {
        r#"# hearth configuration
# Location: ~/.config/hearth/config.toml

[compose]
binary = "docker"
# Seconds to wait for `compose up`; 0 waits indefinitely
setup_timeout_secs = 300
# Milliseconds to wait for a console response
command_timeout_ms = 2000

[[services]]
name = "minecraft-server"
directory = "~/minecraft-server"
kind = "minecraft"   # minecraft | factorio | generic

# [[services]]
# name = "terraria-server"
# directory = "~/terraria-server"
# kind = "generic"
"#
        .to_string()
    }

    /// Initialize config directory and create default config if needed
    pub fn init() -> Result<PathBuf> {
        let config_dir = Self::config_dir();
        let config_path = Self::config_path();

        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

        if !config_path.exists() {
            std::fs::write(&config_path, Self::default_toml())
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        Ok(config_path)
    }
}
