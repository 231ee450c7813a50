//! Server configuration.

use std::path::PathBuf;

use clap::Parser;
use registrar_core::StorageConfig;
use uuid::Uuid;

/// Default HTTP listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Default storage directory.
pub const DEFAULT_DATA_PATH: &str = "./registrar_data";

/// Default page cache size (64 MB).
pub const DEFAULT_CACHE_CAPACITY: u64 = 64 * 1024 * 1024;

/// Default storage flush interval in milliseconds.
pub const DEFAULT_FLUSH_EVERY_MS: u64 = 1000;

/// Registrar server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on for HTTP requests.
    pub listen_addr: String,

    /// Path to the database storage directory.
    pub data_path: PathBuf,

    /// Use a throwaway in-memory database.
    pub temporary: bool,

    /// HMAC secret shared with the auth provider for bearer tokens.
    pub jwt_secret: Option<String>,

    /// Required token issuer, if any.
    pub jwt_issuer: Option<String>,

    /// Required token audience, if any.
    pub jwt_audience: Option<String>,

    /// Secret the auth provider sends with identity events. None disables the hook.
    pub hook_secret: Option<String>,

    /// Identity granted the admin role at startup.
    pub bootstrap_admin: Option<Uuid>,

    /// Storage page cache capacity in bytes.
    pub cache_capacity: u64,

    /// Storage flush interval in milliseconds. None flushes on every write.
    pub flush_every_ms: Option<u64>,
}

impl ServerConfig {
    /// Create a new server configuration with the given data path.
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            data_path: data_path.into(),
            temporary: false,
            jwt_secret: None,
            jwt_issuer: None,
            jwt_audience: None,
            hook_secret: None,
            bootstrap_admin: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            flush_every_ms: Some(DEFAULT_FLUSH_EVERY_MS),
        }
    }

    /// Set the listen address.
    pub fn with_listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = addr.into();
        self
    }

    /// Use a temporary database.
    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    /// Set the JWT secret.
    pub fn with_jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.jwt_secret = Some(secret.into());
        self
    }

    /// Set the identity hook secret.
    pub fn with_hook_secret(mut self, secret: impl Into<String>) -> Self {
        self.hook_secret = Some(secret.into());
        self
    }

    /// Set the identity to bootstrap as administrator.
    pub fn with_bootstrap_admin(mut self, identity: Uuid) -> Self {
        self.bootstrap_admin = Some(identity);
        self
    }

    /// Check if the identity hook is enabled.
    pub fn has_hook(&self) -> bool {
        self.hook_secret.is_some()
    }

    /// Storage configuration for the database.
    pub fn storage_config(&self) -> StorageConfig {
        let config = if self.temporary {
            StorageConfig::temporary()
        } else {
            StorageConfig::new(&self.data_path)
        };
        config
            .with_cache_capacity(self.cache_capacity)
            .with_flush_every_ms(self.flush_every_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_PATH)
    }
}

/// Command-line arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "registrar-server")]
#[command(version, about = "Registrar HTTP/JSON API", long_about = None)]
pub struct Args {
    /// Address to listen on for HTTP requests.
    #[arg(short, long, default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: String,

    /// Path to the database storage directory.
    #[arg(short, long, default_value = DEFAULT_DATA_PATH)]
    pub data_path: PathBuf,

    /// Use a throwaway in-memory database.
    #[arg(long)]
    pub temporary: bool,

    /// HMAC secret for verifying bearer tokens.
    #[arg(long, env = "REGISTRAR_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    /// Required token issuer.
    #[arg(long)]
    pub jwt_issuer: Option<String>,

    /// Required token audience.
    #[arg(long)]
    pub jwt_audience: Option<String>,

    /// Shared secret for the identity event hook.
    #[arg(long, env = "REGISTRAR_HOOK_SECRET", hide_env_values = true)]
    pub hook_secret: Option<String>,

    /// Grant the admin role to this already provisioned identity at startup.
    #[arg(long)]
    pub bootstrap_admin: Option<Uuid>,

    /// Storage page cache capacity in megabytes.
    #[arg(long, default_value_t = 64)]
    pub cache_mb: u64,

    /// Storage flush interval in milliseconds. Set to 0 to flush on every write.
    #[arg(long, default_value_t = DEFAULT_FLUSH_EVERY_MS)]
    pub flush_every_ms: u64,
}

impl Args {
    /// Convert command-line arguments to server configuration.
    pub fn into_config(self) -> ServerConfig {
        let flush_every_ms = if self.flush_every_ms == 0 {
            None
        } else {
            Some(self.flush_every_ms)
        };

        ServerConfig {
            listen_addr: self.listen,
            data_path: self.data_path,
            temporary: self.temporary,
            jwt_secret: self.jwt_secret.filter(|s| !s.is_empty()),
            jwt_issuer: self.jwt_issuer,
            jwt_audience: self.jwt_audience,
            hook_secret: self.hook_secret.filter(|s| !s.is_empty()),
            bootstrap_admin: self.bootstrap_admin,
            cache_capacity: self.cache_mb * 1024 * 1024,
            flush_every_ms,
        }
    }
}
