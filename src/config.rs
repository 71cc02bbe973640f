use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub wakeup: WakeupConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// The only user allowed to run management commands.
    #[serde(default)]
    pub admin_id: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Public base URL of this service, e.g. "https://xxx.onrender.com".
    #[serde(default)]
    pub public_url: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default = "default_true")]
    pub delete_webhook_on_shutdown: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            public_url: String::new(),
            port: default_port(),
            webhook_secret: None,
            delete_webhook_on_shutdown: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_users_file")]
    pub users_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            users_file: default_users_file(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// When set, logs are appended to this file in addition to stdout.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WakeupConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: u64,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for WakeupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_delay_secs: default_initial_delay(),
            interval_secs: default_interval(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl WakeupConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_port() -> u16 {
    10000
}

fn default_true() -> bool {
    true
}

fn default_users_file() -> PathBuf {
    PathBuf::from("users.json")
}

fn default_initial_delay() -> u64 {
    10
}

fn default_interval() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    30
}

impl Config {
    /// Load the optional TOML file, overlay the process environment and validate.
    ///
    /// Without an explicit path, `config.toml` in the working directory is used
    /// if it exists; otherwise the configuration comes from the environment alone.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let default_path = Path::new("config.toml");
        let path = match path {
            Some(p) => Some(p),
            None if default_path.exists() => Some(default_path),
            None => None,
        };

        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                Self::from_toml_str(&content)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            None => Config::default(),
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Override file values with environment variables, looked up through `var`.
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = var("BOT_TOKEN") {
            self.telegram.bot_token = token;
        }
        if let Some(id) = var("ADMIN_ID") {
            self.telegram.admin_id = id
                .trim()
                .parse()
                .with_context(|| format!("ADMIN_ID must be a numeric user id, got {:?}", id))?;
        }
        if let Some(url) = var("WEBHOOK_URL") {
            self.server.public_url = url;
        }
        if let Some(port) = var("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a port number, got {:?}", port))?;
        }
        if let Some(secret) = var("WEBHOOK_SECRET") {
            self.server.webhook_secret = Some(secret).filter(|s| !s.is_empty());
        }
        if let Some(file) = var("USERS_FILE") {
            self.storage.users_file = PathBuf::from(file);
        }
        if let Some(file) = var("LOG_FILE") {
            self.logging.file = Some(PathBuf::from(file)).filter(|p| !p.as_os_str().is_empty());
        }
        if let Some(enabled) = var("WAKEUP_ENABLED") {
            self.wakeup.enabled = matches!(
                enabled.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }

        let trimmed = self.server.public_url.trim().trim_end_matches('/').to_string();
        self.server.public_url = trimmed;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            bail!("Bot token is not set (BOT_TOKEN or [telegram] bot_token)");
        }
        if self.telegram.admin_id == 0 {
            bail!("Admin id is not set (ADMIN_ID or [telegram] admin_id)");
        }
        if self.server.public_url.is_empty() {
            bail!("Public URL is not set (WEBHOOK_URL or [server] public_url)");
        }
        if !self.server.public_url.starts_with("http://")
            && !self.server.public_url.starts_with("https://")
        {
            bail!(
                "Public URL must start with http:// or https://, got {}",
                self.server.public_url
            );
        }
        if self.wakeup.interval_secs == 0 {
            bail!("[wakeup] interval_secs must be greater than zero");
        }
        Ok(())
    }

    /// Where the platform should deliver updates.
    pub fn webhook_url(&self) -> String {
        format!("{}/webhook", self.server.public_url)
    }

    /// The public health URL pinged by the wakeup loop.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.server.public_url)
    }
}

#[cfg(test)]
pub fn test_config(users_file: &Path) -> Config {
    Config {
        telegram: TelegramConfig {
            bot_token: "123:TEST".to_string(),
            admin_id: 1000,
        },
        server: ServerConfig {
            public_url: "https://guard.example.com".to_string(),
            ..ServerConfig::default()
        },
        storage: StorageConfig {
            users_file: users_file.to_path_buf(),
        },
        ..Config::default()
    }
}
