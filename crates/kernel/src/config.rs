//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use crate::menu::VisibilityPolicy;
use crate::token::DEFAULT_ISSUER;

/// Minimum HS256 secret length in bytes.
const MIN_SECRET_LEN: usize = 32;

/// Application configuration.
#[derive(Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// PostgreSQL connection URL. When None, role permissions live in memory.
    pub database_url: Option<String>,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Redis connection URL. When None, the revocation list uses Moka.
    pub redis_url: Option<String>,

    /// Token signing secret (required, at least 32 bytes).
    pub token_secret: String,

    /// Token issuer identity (default: custode).
    pub token_issuer: String,

    /// Access token lifetime in seconds (default: 3600).
    pub access_token_ttl: u64,

    /// Refresh token lifetime in seconds (default: 30 days).
    pub refresh_token_ttl: u64,

    /// Directory scanned for plugin manifests (default: ./plugins).
    pub metadata_dir: PathBuf,

    /// Menu visibility policy: "prune" (default) or "per_node".
    pub menu_visibility: VisibilityPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let database_url = env::var("DATABASE_URL").ok().filter(|s| !s.is_empty());

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let redis_url = env::var("REDIS_URL").ok().filter(|s| !s.is_empty());

        let token_secret =
            env::var("TOKEN_SECRET").context("TOKEN_SECRET environment variable is required")?;
        if token_secret.len() < MIN_SECRET_LEN {
            bail!("TOKEN_SECRET must be at least {MIN_SECRET_LEN} bytes");
        }

        let token_issuer = env::var("TOKEN_ISSUER").unwrap_or_else(|_| DEFAULT_ISSUER.to_string());

        let access_token_ttl = env::var("ACCESS_TOKEN_TTL")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .context("ACCESS_TOKEN_TTL must be a number of seconds")?;

        let refresh_token_ttl = env::var("REFRESH_TOKEN_TTL")
            .unwrap_or_else(|_| (30 * 24 * 3600).to_string())
            .parse()
            .context("REFRESH_TOKEN_TTL must be a number of seconds")?;

        let metadata_dir = Self::metadata_dir_from_env();

        let menu_visibility = env::var("MENU_VISIBILITY")
            .unwrap_or_else(|_| "prune".to_string())
            .parse()
            .context("MENU_VISIBILITY must be \"prune\" or \"per_node\"")?;

        Ok(Self {
            port,
            database_url,
            database_max_connections,
            redis_url,
            token_secret,
            token_issuer,
            access_token_ttl,
            refresh_token_ttl,
            metadata_dir,
            menu_visibility,
        })
    }

    /// METADATA_DIR alone, for commands that only read manifests.
    pub fn metadata_dir_from_env() -> PathBuf {
        env::var("METADATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./plugins"))
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database", &self.database_url.is_some())
            .field("database_max_connections", &self.database_max_connections)
            .field("redis", &self.redis_url.is_some())
            .field("token_secret", &"[redacted]")
            .field("token_issuer", &self.token_issuer)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("metadata_dir", &self.metadata_dir)
            .field("menu_visibility", &self.menu_visibility)
            .finish()
    }
}
