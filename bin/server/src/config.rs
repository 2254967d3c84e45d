//! Configuration for the HTTP server
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use remark42::config::{CacheConfig, ServiceConfig};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Remark42 server - comment engine HTTP/JSON API
#[derive(Parser, Debug, Clone)]
#[command(name = "remark42-server")]
#[command(about = "HTTP/JSON API of the remark42 comment engine")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "REMARK_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,

    /// Directory holding one database per site
    #[arg(long, env = "REMARK_DB_ROOT", default_value = "./var")]
    pub db_root: PathBuf,

    /// Sites served by this instance
    #[arg(long, env = "REMARK_SITES", value_delimiter = ',', default_value = "remark")]
    pub sites: Vec<String>,

    /// Secret for IP address hashing
    #[arg(long, env = "REMARK_SECRET", hide_env_values = true)]
    pub secret: String,

    /// Admin user ids, granted admin on every site
    #[arg(long, env = "REMARK_ADMINS", value_delimiter = ',')]
    pub admins: Vec<String>,

    /// Seconds after creation during which the author may edit
    #[arg(long, env = "REMARK_EDIT_DURATION", default_value = "300")]
    pub edit_duration_secs: u64,

    /// Maximum comment size in characters
    #[arg(long, env = "REMARK_MAX_COMMENT_SIZE", default_value = "2000")]
    pub max_comment_size: usize,

    /// Posts older than this many days become read-only, 0 disables
    #[arg(long, env = "REMARK_READ_ONLY_AGE", default_value = "0")]
    pub read_only_age_days: u32,

    /// Maximum votes per comment, 0 is unlimited
    #[arg(long, env = "REMARK_MAX_VOTES", default_value = "0")]
    pub max_votes: usize,

    /// Reject downvotes below a zero score
    #[arg(long, env = "REMARK_POSITIVE_SCORE", default_value = "false")]
    pub positive_score: bool,

    /// User allowed to vote for their own comments
    #[arg(long, env = "REMARK_DEV_PRINCIPAL")]
    pub dev_principal: Option<String>,

    /// Avatar URL for users without a picture
    #[arg(long, env = "REMARK_DEFAULT_AVATAR", default_value = "")]
    pub default_avatar: String,

    /// Maximum number of cached responses
    #[arg(long, env = "REMARK_CACHE_MAX_KEYS", default_value = "1000")]
    pub cache_max_keys: usize,

    /// Responses larger than this are not cached, 0 is unlimited
    #[arg(long, env = "REMARK_CACHE_MAX_VALUE", default_value = "0")]
    pub cache_max_value: usize,

    /// Maximum total size of cached responses in bytes
    #[arg(long, env = "REMARK_CACHE_MAX_SIZE", default_value = "52428800")]
    pub cache_max_size: usize,

    /// Request timeout in milliseconds
    #[arg(long, env = "REMARK_REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,
}

impl Args {
    pub fn service_config(&self) -> ServiceConfig {
        let admins: HashMap<String, Vec<String>> = self
            .sites
            .iter()
            .map(|site| (site.clone(), self.admins.clone()))
            .collect();
        ServiceConfig {
            edit_duration: Duration::from_secs(self.edit_duration_secs),
            max_comment_size: self.max_comment_size,
            read_only_age_days: self.read_only_age_days,
            dev_principal: self.dev_principal.clone(),
            max_votes: self.max_votes,
            positive_score: self.positive_score,
            default_avatar: self.default_avatar.clone(),
            admins,
            ..ServiceConfig::with_secret(self.secret.clone())
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_keys: self.cache_max_keys,
            max_value_size: self.cache_max_value,
            max_cache_size: self.cache_max_size,
            ..CacheConfig::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_convert() {
        let args = Args::try_parse_from([
            "remark42-server",
            "--secret",
            "s3cret",
            "--sites",
            "radio-t,blog",
            "--admins",
            "admin1",
            "--edit-duration-secs",
            "60",
        ])
        .unwrap();

        assert_eq!(args.sites, vec!["radio-t", "blog"]);
        let config = args.service_config();
        assert_eq!(config.edit_duration, Duration::from_secs(60));
        assert_eq!(config.admins["blog"], vec!["admin1".to_string()]);
        assert_eq!(config.secret.as_str(), "s3cret");
        assert_eq!(args.cache_config().max_keys, 1000);
    }
}
