//! Configuration loading for the auditor service.

use anyhow::{bail, Context};
use pos_merkle::ChunkLayout;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Auditor configuration loaded from TOML + environment overrides.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditorConfig {
    /// Root of the block store (`<data_dir>/<pool>/finalized/blk_<id>`)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// HTTP listen address for the health API
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Chunk size in bytes, a multiple of 64
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Merkle tree height; blocks are split into `2^tree_height` chunks
    #[serde(default = "default_tree_height")]
    pub tree_height: u32,

    /// Challenges per block and round
    #[serde(default = "default_challenge_count")]
    pub challenge_count: usize,

    /// Host reporting cycle in seconds
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,

    /// Minimum spacing between audit rounds of one pool
    #[serde(default = "default_audit_interval_secs")]
    pub audit_interval_secs: u64,

    /// Pools this node stores blocks for
    #[serde(default)]
    pub pools: Vec<String>,

    /// Pools this node is the primary reporter for. Empty means all pools.
    #[serde(default)]
    pub primary_pools: Vec<String>,

    /// Commitment build workers (0 = available parallelism)
    #[serde(default)]
    pub build_workers: usize,

    /// Prover executable
    #[serde(default = "default_prover_binary")]
    pub prover_binary: PathBuf,

    /// Working directory for prover scratch files
    #[serde(default = "default_prover_work_dir")]
    pub prover_work_dir: PathBuf,

    /// Per-step prover timeout in seconds
    #[serde(default = "default_prover_timeout_secs")]
    pub prover_timeout_secs: u64,

    /// Ledger gateway endpoint
    #[serde(default = "default_ledger_url")]
    pub ledger_url: String,

    /// Optional API key for the ledger gateway
    #[serde(default)]
    pub ledger_api_key: Option<String>,

    /// Ledger request timeout in seconds
    #[serde(default = "default_ledger_timeout_secs")]
    pub ledger_timeout_secs: u64,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/auditor")
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3005))
}

fn default_chunk_size() -> usize {
    pos_merkle::DEFAULT_CHUNK_SIZE
}

fn default_tree_height() -> u32 {
    pos_merkle::DEFAULT_TREE_HEIGHT
}

fn default_challenge_count() -> usize {
    pos_merkle::DEFAULT_CHALLENGE_COUNT
}

fn default_report_interval_secs() -> u64 {
    3
}

fn default_audit_interval_secs() -> u64 {
    300
}

fn default_prover_binary() -> PathBuf {
    PathBuf::from("./zokrates")
}

fn default_prover_work_dir() -> PathBuf {
    PathBuf::from("data/auditor/prover")
}

fn default_prover_timeout_secs() -> u64 {
    600
}

fn default_ledger_url() -> String {
    "http://localhost:3004".to_string()
}

fn default_ledger_timeout_secs() -> u64 {
    30
}

impl Default for AuditorConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            listen_addr: default_listen_addr(),
            chunk_size: default_chunk_size(),
            tree_height: default_tree_height(),
            challenge_count: default_challenge_count(),
            report_interval_secs: default_report_interval_secs(),
            audit_interval_secs: default_audit_interval_secs(),
            pools: Vec::new(),
            primary_pools: Vec::new(),
            build_workers: 0,
            prover_binary: default_prover_binary(),
            prover_work_dir: default_prover_work_dir(),
            prover_timeout_secs: default_prover_timeout_secs(),
            ledger_url: default_ledger_url(),
            ledger_api_key: None,
            ledger_timeout_secs: default_ledger_timeout_secs(),
        }
    }
}

impl AuditorConfig {
    /// Chunk geometry derived from `chunk_size` and `tree_height`.
    pub fn layout(&self) -> anyhow::Result<ChunkLayout> {
        ChunkLayout::from_height(self.chunk_size, self.tree_height)
            .context("Invalid chunk layout")
    }

    /// Number of commitment build workers to run.
    pub fn effective_build_workers(&self) -> usize {
        if self.build_workers > 0 {
            return self.build_workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Reject configurations the audit pipeline cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tree_height == 0 {
            bail!("tree_height must be at least 1");
        }
        self.layout()?;
        if self.challenge_count == 0 {
            bail!("challenge_count must be at least 1");
        }
        if self.report_interval_secs == 0 {
            bail!("report_interval_secs must be greater than 0");
        }
        if self.audit_interval_secs == 0 {
            bail!("audit_interval_secs must be greater than 0");
        }
        if self.prover_timeout_secs == 0 {
            bail!("prover_timeout_secs must be greater than 0");
        }
        if let Some(pool) = self.primary_pools.iter().find(|p| !self.pools.contains(p)) {
            bail!("primary pool {} is not listed in pools", pool);
        }
        Ok(())
    }
}

/// Load configuration from TOML file with environment variable overrides.
pub fn load_config(path: Option<&str>) -> anyhow::Result<AuditorConfig> {
    let config_path = path.map(std::path::Path::new).or_else(|| {
        let default = std::path::Path::new("auditor.toml");
        default.exists().then_some(default)
    });

    let config = match config_path {
        Some(p) => {
            let raw = std::fs::read_to_string(p)
                .with_context(|| format!("Failed to read config {}", p.display()))?;
            toml::from_str(&raw).context("Failed to parse config")?
        }
        None => AuditorConfig::default(),
    };

    Ok(apply_env_overrides(config))
}

/// Read an env var and parse it, returning None if missing or parse fails.
fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Split a comma separated env var into trimmed, non-empty entries.
fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
}

fn apply_env_overrides(mut config: AuditorConfig) -> AuditorConfig {
    if let Ok(val) = std::env::var("AUDITOR_DATA_DIR") {
        config.data_dir = PathBuf::from(val);
    }
    if let Some(addr) = env_parse("AUDITOR_LISTEN_ADDR") {
        config.listen_addr = addr;
    }
    if let Some(v) = env_parse("AUDITOR_CHUNK_SIZE") {
        config.chunk_size = v;
    }
    if let Some(v) = env_parse("AUDITOR_TREE_HEIGHT") {
        config.tree_height = v;
    }
    if let Some(v) = env_parse("AUDITOR_CHALLENGE_COUNT") {
        config.challenge_count = v;
    }
    if let Some(v) = env_parse("AUDITOR_REPORT_INTERVAL_SECS") {
        config.report_interval_secs = v;
    }
    if let Some(v) = env_parse("AUDITOR_AUDIT_INTERVAL_SECS") {
        config.audit_interval_secs = v;
    }
    if let Some(v) = env_list("AUDITOR_POOLS") {
        config.pools = v;
    }
    if let Some(v) = env_list("AUDITOR_PRIMARY_POOLS") {
        config.primary_pools = v;
    }
    if let Some(v) = env_parse("AUDITOR_BUILD_WORKERS") {
        config.build_workers = v;
    }
    if let Ok(val) = std::env::var("AUDITOR_PROVER_BINARY") {
        config.prover_binary = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("AUDITOR_PROVER_WORK_DIR") {
        config.prover_work_dir = PathBuf::from(val);
    }
    if let Some(v) = env_parse("AUDITOR_PROVER_TIMEOUT_SECS") {
        config.prover_timeout_secs = v;
    }
    if let Ok(val) = std::env::var("AUDITOR_LEDGER_URL") {
        config.ledger_url = val;
    }
    if let Ok(val) = std::env::var("AUDITOR_LEDGER_API_KEY") {
        if !val.trim().is_empty() {
            config.ledger_api_key = Some(val);
        }
    }
    if let Some(v) = env_parse("AUDITOR_LEDGER_TIMEOUT_SECS") {
        config.ledger_timeout_secs = v;
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AuditorConfig::default();
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.tree_height, 13);
        assert_eq!(config.challenge_count, 8);
        assert!(config.validate().is_ok());

        let layout = config.layout().unwrap();
        assert_eq!(layout.chunk_count(), 8192);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: AuditorConfig = toml::from_str(
            r#"
            chunk_size = 1024
            pools = ["pool-a", "pool-b"]
            primary_pools = ["pool-a"]
            ledger_api_key = "secret"
            "#,
        )
        .unwrap();

        assert_eq!(config.chunk_size, 1024);
        assert_eq!(config.tree_height, 13);
        assert_eq!(config.pools.len(), 2);
        assert_eq!(config.ledger_api_key.as_deref(), Some("secret"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_layout() {
        let config = AuditorConfig {
            chunk_size: 100,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AuditorConfig {
            tree_height: 40,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AuditorConfig {
            tree_height: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_challenges() {
        let config = AuditorConfig {
            challenge_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unknown_primary_pool() {
        let config = AuditorConfig {
            pools: vec!["pool-a".into()],
            primary_pools: vec!["pool-b".into()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auditor.toml");
        std::fs::write(&path, "challenge_count = 3\naudit_interval_secs = 60\n").unwrap();

        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.challenge_count, 3);
        assert_eq!(config.audit_interval_secs, 60);
    }

    #[test]
    fn test_effective_build_workers() {
        let config = AuditorConfig {
            build_workers: 3,
            ..Default::default()
        };
        assert_eq!(config.effective_build_workers(), 3);
        assert!(AuditorConfig::default().effective_build_workers() >= 1);
    }
}
