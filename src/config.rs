//! Configuration management for tilemap-cache.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `TMC_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Environment Variables
//!
//! - `TMC_HOST` - Server bind address (default: 0.0.0.0)
//! - `TMC_PORT` - Server port (default: 3000)
//! - `TMC_CACHE_DIR` - Directory of the disk tier (memory only if unset)
//! - `TMC_MEMORY_BYTES` / `TMC_MEMORY_ENTRIES` - Memory tier bounds
//! - `TMC_SERVER_PREFIX` - Current server prefix (default: 1)
//! - `TMC_GROUP_SIZE` - Descriptors handled per group (default: 10)
//! - `TMC_TIME_BUDGET_MS` - Default client time budget (default: 5000)
//! - `TMC_MAX_BATCH_BYTES` - Default output byte limit per batch
//! - `TMC_MAX_ATTEMPTS` - Origin attempts per group (default: 5)
//! - `TMC_ACP_LAYER` / `TMC_ACP_RIGHTS` - Access-controlled layer and its bits
//! - `TMC_IMPORTANCES` - Importance levels per tile of the synthetic origin
//! - `TMC_BITMAP_DIR` / `TMC_REQUIRED_BITMAPS` - Bitmap resources
//! - `TMC_USER_RIGHTS` - `user=bits` entries (comma-separated)
//! - `TMC_ANONYMOUS_RIGHTS` - Rights of requests without a user
//! - `TMC_VERIFY_CACHED` - Re-check cached string groups (default: true)
//! - `TMC_CORS_ORIGINS` - Allowed CORS origins (comma-separated)

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::descriptor::{MapRights, StaticRights, DEFAULT_ACP_LAYER, MAX_LAYER};
use crate::store::{DEFAULT_MEMORY_CAPACITY, DEFAULT_MEMORY_ENTRIES};
use crate::tile::{
    RetryPolicy, ServiceConfig, DEFAULT_GROUP_SIZE, DEFAULT_IMPORTANCES, DEFAULT_MAX_ATTEMPTS,
};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default server prefix.
pub const DEFAULT_SERVER_PREFIX: u32 = 1;

/// Default client time budget in milliseconds.
pub const DEFAULT_TIME_BUDGET_MS: u64 = 5000;

// =============================================================================
// CLI Arguments
// =============================================================================

/// tilemap-cache - A caching tile server for vector map clients.
///
/// Answers batched tile requests from a memory and disk cache, keeping text
/// tiles consistent with their geometry and composing access-controlled
/// tiles per user.
#[derive(Parser, Debug, Clone)]
#[command(name = "tilemap-cache")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "TMC_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "TMC_PORT")]
    pub port: u16,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Directory for the disk tier. Without it only the memory tier is used.
    #[arg(long, env = "TMC_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Maximum bytes held by the memory tier.
    #[arg(long, default_value_t = DEFAULT_MEMORY_CAPACITY, env = "TMC_MEMORY_BYTES")]
    pub memory_bytes: usize,

    /// Maximum groups held by the memory tier.
    #[arg(long, default_value_t = DEFAULT_MEMORY_ENTRIES, env = "TMC_MEMORY_ENTRIES")]
    pub memory_entries: usize,

    /// Re-check cached string groups against their data group on every hit
    /// (`--verify-cached false` turns it off).
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set, env = "TMC_VERIFY_CACHED")]
    pub verify_cached: bool,

    // =========================================================================
    // Batch Configuration
    // =========================================================================
    /// Current server prefix. Tiles requested with another prefix make the
    /// client reload its format descriptor.
    #[arg(long, default_value_t = DEFAULT_SERVER_PREFIX, env = "TMC_SERVER_PREFIX")]
    pub server_prefix: u32,

    /// Descriptors handled per group.
    #[arg(long, default_value_t = DEFAULT_GROUP_SIZE, env = "TMC_GROUP_SIZE")]
    pub group_size: usize,

    /// Default time budget per batch in milliseconds.
    #[arg(long, default_value_t = DEFAULT_TIME_BUDGET_MS, env = "TMC_TIME_BUDGET_MS")]
    pub time_budget_ms: u64,

    /// Default output byte limit per batch.
    #[arg(long, env = "TMC_MAX_BATCH_BYTES")]
    pub max_batch_bytes: Option<usize>,

    /// Origin attempts per tile group.
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS, env = "TMC_MAX_ATTEMPTS")]
    pub max_attempts: u32,

    /// Importance levels per tile produced by the synthetic origin.
    #[arg(long, default_value_t = DEFAULT_IMPORTANCES, env = "TMC_IMPORTANCES")]
    pub importances: u32,

    // =========================================================================
    // Rights Configuration
    // =========================================================================
    /// Layer whose tiles are composed from per-right slices.
    #[arg(long, default_value_t = DEFAULT_ACP_LAYER, env = "TMC_ACP_LAYER")]
    pub acp_layer: u32,

    /// Rights bits that have slices on the access-controlled layer.
    #[arg(long, default_value_t = u64::MAX, env = "TMC_ACP_RIGHTS")]
    pub acp_rights: u64,

    /// Rights per user as `user=bits` entries (comma-separated).
    #[arg(long, env = "TMC_USER_RIGHTS", value_delimiter = ',')]
    pub user_rights: Vec<String>,

    /// Rights of requests without a user.
    #[arg(long, default_value_t = 0, env = "TMC_ANONYMOUS_RIGHTS")]
    pub anonymous_rights: u64,

    // =========================================================================
    // Resource Configuration
    // =========================================================================
    /// Directory of bitmap resources (`large/` and `small/` below it).
    #[arg(long, env = "TMC_BITMAP_DIR")]
    pub bitmap_dir: Option<PathBuf>,

    /// Bitmaps that must be present (comma-separated).
    #[arg(long, env = "TMC_REQUIRED_BITMAPS", value_delimiter = ',')]
    pub required_bitmaps: Vec<String>,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "TMC_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.memory_bytes == 0 {
            return Err("memory_bytes must be greater than 0".to_string());
        }
        if self.memory_entries == 0 {
            return Err("memory_entries must be greater than 0".to_string());
        }
        if self.group_size == 0 {
            return Err("group_size must be greater than 0".to_string());
        }
        if self.time_budget_ms == 0 {
            return Err("time_budget_ms must be greater than 0".to_string());
        }
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.importances == 0 {
            return Err("importances must be at least 1".to_string());
        }
        if self.acp_layer > MAX_LAYER {
            return Err(format!("acp_layer must be at most {}", MAX_LAYER));
        }
        if self.max_batch_bytes == Some(0) {
            return Err("max_batch_bytes must be greater than 0".to_string());
        }
        if !self.required_bitmaps.is_empty() && self.bitmap_dir.is_none() {
            return Err(
                "Required bitmaps are configured but no bitmap directory. \
                 Set --bitmap-dir or TMC_BITMAP_DIR"
                    .to_string(),
            );
        }

        self.rights_table().map(|_| ())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Rights table built from `user_rights` and `anonymous_rights`.
    pub fn rights_table(&self) -> Result<StaticRights, String> {
        Ok(StaticRights::from_entries(&self.user_rights)?
            .with_anonymous(MapRights::new(self.anonymous_rights)))
    }

    /// Library-side service settings.
    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            server_prefix: self.server_prefix,
            group_size: self.group_size,
            time_budget: Duration::from_millis(self.time_budget_ms),
            max_batch_bytes: self.max_batch_bytes,
            acp_layer: self.acp_layer,
            acp_rights: MapRights::new(self.acp_rights),
            verify_cached: self.verify_cached,
            retry: RetryPolicy::new(self.max_attempts),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::RightsEvaluator;

    fn test_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cache_dir: None,
            memory_bytes: 1024 * 1024,
            memory_entries: 100,
            verify_cached: true,
            server_prefix: 3,
            group_size: 10,
            time_budget_ms: 2000,
            max_batch_bytes: None,
            max_attempts: 3,
            importances: 4,
            acp_layer: DEFAULT_ACP_LAYER,
            acp_rights: 0xff,
            user_rights: vec!["alice=6".to_string()],
            anonymous_rights: 1,
            bitmap_dir: None,
            required_bitmaps: Vec::new(),
            cors_origins: None,
            verbose: false,
            no_tracing: false,
        }
    }

    #[test]
    fn test_valid_config() {
        let config = test_config();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_defaults() {
        let config = Config::try_parse_from(["tilemap-cache"]).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.group_size, DEFAULT_GROUP_SIZE);
        assert!(config.verify_cached);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_verify_cached_off() {
        let config = Config::try_parse_from(["tilemap-cache", "--verify-cached", "false"]).unwrap();
        assert!(!config.verify_cached);
        assert!(!config.service_config().verify_cached);

        let config = Config::try_parse_from(["tilemap-cache", "--verify-cached=false"]).unwrap();
        assert!(!config.verify_cached);

        let config = Config::try_parse_from(["tilemap-cache", "--verify-cached", "true"]).unwrap();
        assert!(config.verify_cached);
    }

    #[test]
    fn test_parse_lists() {
        let config = Config::try_parse_from([
            "tilemap-cache",
            "--user-rights",
            "alice=6,bob=1",
            "--required-bitmaps",
            "fuel,parking",
            "--bitmap-dir",
            "/srv/bitmaps",
        ])
        .unwrap();
        assert_eq!(config.user_rights.len(), 2);
        assert_eq!(config.required_bitmaps, vec!["fuel", "parking"]);
    }

    #[test]
    fn test_invalid_sizes() {
        let mut config = test_config();
        config.memory_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.group_size = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.max_batch_bytes = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_acp_layer() {
        let mut config = test_config();
        config.acp_layer = MAX_LAYER + 1;
        assert!(config.validate().unwrap_err().contains("acp_layer"));
    }

    #[test]
    fn test_required_bitmaps_need_dir() {
        let mut config = test_config();
        config.required_bitmaps = vec!["fuel".to_string()];
        assert!(config.validate().unwrap_err().contains("bitmap"));

        config.bitmap_dir = Some(PathBuf::from("/srv/bitmaps"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_user_rights() {
        let mut config = test_config();
        config.user_rights = vec!["alice".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rights_table() {
        let rights = test_config().rights_table().unwrap();
        assert_eq!(rights.permissions_for(Some("alice")), MapRights::new(6));
        assert_eq!(rights.permissions_for(None), MapRights::new(1));
    }

    #[test]
    fn test_service_config() {
        let service = test_config().service_config();
        assert_eq!(service.server_prefix, 3);
        assert_eq!(service.time_budget, Duration::from_millis(2000));
        assert_eq!(service.retry.max_attempts(), 3);
        assert_eq!(service.acp_rights, MapRights::new(0xff));
    }

    #[test]
    fn test_bind_address() {
        let config = test_config();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }
}
