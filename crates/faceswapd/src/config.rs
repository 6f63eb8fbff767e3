use anyhow::{bail, Context, Result};
use faceswap_core::storage::is_safe_extension;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Daemon configuration.
///
/// Built from defaults, then an optional TOML file named by
/// `FACESWAP_CONFIG`, then `FACESWAP_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:3000).
    pub bind_addr: SocketAddr,
    /// Shared storage directory for uploads and outputs.
    pub storage_dir: PathBuf,
    /// URL prefix under which `storage_dir` is served.
    pub public_prefix: String,
    /// Program that performs the swap.
    pub command: String,
    /// Arguments placed before the job flags.
    pub command_args: Vec<String>,
    /// Extension of generated output files.
    pub output_extension: String,
    /// Request body limit for the upload endpoint.
    pub max_upload_bytes: usize,
    /// Kill the command after this many seconds. Unset waits forever.
    pub process_timeout_secs: Option<u64>,
    /// Check that the output file exists before answering success.
    pub verify_output: bool,
    /// Delete stored files older than this. Unset keeps everything.
    pub retention_secs: Option<u64>,
    /// How often the retention sweep runs.
    pub sweep_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            storage_dir: PathBuf::from("./uploads"),
            public_prefix: "/uploads".to_string(),
            command: "python3".to_string(),
            command_args: vec!["face_swap.py".to_string()],
            output_extension: "jpg".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            process_timeout_secs: None,
            verify_output: true,
            retention_secs: None,
            sweep_interval_secs: 300,
        }
    }
}

/// On-disk shape; every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    bind_addr: Option<SocketAddr>,
    storage_dir: Option<PathBuf>,
    public_prefix: Option<String>,
    command: Option<String>,
    command_args: Option<Vec<String>>,
    output_extension: Option<String>,
    max_upload_bytes: Option<usize>,
    process_timeout_secs: Option<u64>,
    verify_output: Option<bool>,
    retention_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

impl Config {
    /// Load configuration from the optional file and `FACESWAP_*` variables.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("FACESWAP_CONFIG") {
            config.merge_file(Path::new(&path))?;
        }
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the router or the storage layer cannot use.
    pub fn validate(&self) -> Result<()> {
        let prefix = self.public_prefix.trim_end_matches('/');
        if prefix.is_empty() || !prefix.starts_with('/') {
            bail!(
                "public_prefix {:?} must start with '/' and name a path below the root",
                self.public_prefix
            );
        }
        if !is_safe_extension(&self.output_extension) {
            bail!(
                "output_extension {:?} must be non-empty ASCII alphanumeric",
                self.output_extension
            );
        }
        Ok(())
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let file = Self::parse_file(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        self.merge(file);
        tracing::info!(path = %path.display(), "config file loaded");
        Ok(())
    }

    fn parse_file(text: &str) -> Result<FileConfig> {
        Ok(toml::from_str(text)?)
    }

    fn merge(&mut self, file: FileConfig) {
        if let Some(v) = file.bind_addr {
            self.bind_addr = v;
        }
        if let Some(v) = file.storage_dir {
            self.storage_dir = v;
        }
        if let Some(v) = file.public_prefix {
            self.public_prefix = v;
        }
        if let Some(v) = file.command {
            self.command = v;
        }
        if let Some(v) = file.command_args {
            self.command_args = v;
        }
        if let Some(v) = file.output_extension {
            self.output_extension = v;
        }
        if let Some(v) = file.max_upload_bytes {
            self.max_upload_bytes = v;
        }
        if file.process_timeout_secs.is_some() {
            self.process_timeout_secs = file.process_timeout_secs;
        }
        if let Some(v) = file.verify_output {
            self.verify_output = v;
        }
        if file.retention_secs.is_some() {
            self.retention_secs = file.retention_secs;
        }
        if let Some(v) = file.sweep_interval_secs {
            self.sweep_interval_secs = v;
        }
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_parse("FACESWAP_BIND") {
            self.bind_addr = v;
        }
        if let Ok(v) = std::env::var("FACESWAP_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("FACESWAP_PUBLIC_PREFIX") {
            self.public_prefix = v;
        }
        if let Ok(v) = std::env::var("FACESWAP_COMMAND") {
            self.command = v;
        }
        if let Ok(v) = std::env::var("FACESWAP_COMMAND_ARGS") {
            self.command_args = v.split_whitespace().map(str::to_string).collect();
        }
        if let Ok(v) = std::env::var("FACESWAP_OUTPUT_EXT") {
            self.output_extension = v;
        }
        if let Some(v) = env_parse("FACESWAP_MAX_UPLOAD_BYTES") {
            self.max_upload_bytes = v;
        }
        if let Some(v) = env_parse("FACESWAP_PROCESS_TIMEOUT_SECS") {
            self.process_timeout_secs = Some(v);
        }
        if let Ok(v) = std::env::var("FACESWAP_VERIFY_OUTPUT") {
            self.verify_output = v != "0";
        }
        if let Some(v) = env_parse("FACESWAP_RETENTION_SECS") {
            self.retention_secs = Some(v);
        }
        if let Some(v) = env_parse("FACESWAP_SWEEP_INTERVAL_SECS") {
            self.sweep_interval_secs = v;
        }
    }

    pub fn process_timeout(&self) -> Option<Duration> {
        self.process_timeout_secs.map(Duration::from_secs)
    }

    pub fn retention(&self) -> Option<Duration> {
        self.retention_secs.map(Duration::from_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_overrides_defaults() {
        let file = Config::parse_file(
            r#"
            bind_addr = "127.0.0.1:8080"
            storage_dir = "/var/lib/faceswap"
            command = "/usr/bin/swapper"
            command_args = []
            process_timeout_secs = 120
            verify_output = false
            "#,
        )
        .unwrap();

        let mut config = Config::default();
        config.merge(file);

        assert_eq!(config.bind_addr, "127.0.0.1:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.storage_dir, PathBuf::from("/var/lib/faceswap"));
        assert_eq!(config.command, "/usr/bin/swapper");
        assert!(config.command_args.is_empty());
        assert_eq!(config.process_timeout(), Some(Duration::from_secs(120)));
        assert!(!config.verify_output);
        // untouched keys keep defaults
        assert_eq!(config.output_extension, "jpg");
        assert_eq!(config.retention(), None);
    }

    #[test]
    fn test_example_file_parses() {
        let file = Config::parse_file(include_str!("../../../contrib/faceswapd.toml")).unwrap();
        let mut config = Config::default();
        config.merge(file);
        assert_eq!(config.command_args, ["/opt/faceswap/face_swap.py"]);
        assert_eq!(config.process_timeout(), None);
    }

    #[test]
    fn test_validate_public_prefix() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        for bad in ["", "/", "//", "uploads"] {
            config.public_prefix = bad.to_string();
            assert!(config.validate().is_err(), "accepted {bad:?}");
        }

        config.public_prefix = "/files/".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_output_extension() {
        let mut config = Config::default();
        for bad in ["", "../x", "j/pg", "tar.gz"] {
            config.output_extension = bad.to_string();
            assert!(config.validate().is_err(), "accepted {bad:?}");
        }
        config.output_extension = "png".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(Config::parse_file("blend = 3").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.public_prefix, "/uploads");
        assert_eq!(config.command_args, ["face_swap.py"]);
        assert_eq!(config.max_upload_bytes, 20 * 1024 * 1024);
        assert!(config.verify_output);
    }
}
