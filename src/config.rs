use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Runtime settings for the sidecar
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    /// API server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Managed nginx settings
    #[serde(default)]
    pub nginx: NginxSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    /// Bind address (default: 0.0.0.0)
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// API port (default: 3000)
    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NginxSettings {
    /// nginx binary to invoke (default: "nginx", resolved via PATH)
    #[serde(default = "default_nginx_binary")]
    pub binary: String,

    /// Directory holding the live vhost configs (default: /etc/nginx/conf.d)
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Directory for candidate files awaiting validation (default: the
    /// system temp directory). Must be on the same filesystem as
    /// `config_dir` so promotion stays a single atomic rename.
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
}

impl ServerSettings {
    /// Address string the API server binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_api_port(),
        }
    }
}

impl Default for NginxSettings {
    fn default() -> Self {
        Self {
            binary: default_nginx_binary(),
            config_dir: default_config_dir(),
            scratch_dir: default_scratch_dir(),
        }
    }
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    3000
}

fn default_nginx_binary() -> String {
    "nginx".to_string()
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("/etc/nginx/conf.d")
}

fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir()
}

impl Settings {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate all settings
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server.port must be greater than 0".to_string());
        }
        if self.nginx.binary.trim().is_empty() {
            errors.push("nginx.binary must not be empty".to_string());
        }
        if self.nginx.config_dir.as_os_str().is_empty() {
            errors.push("nginx.config_dir must not be empty".to_string());
        }
        if self.nginx.scratch_dir.as_os_str().is_empty() {
            errors.push("nginx.scratch_dir must not be empty".to_string());
        }

        if !errors.is_empty() {
            anyhow::bail!("Configuration errors:\n  - {}", errors.join("\n  - "));
        }

        Ok(())
    }
}
