//! Command line and environment configuration.
//!
//! Every flag can also be set through a `LOGSTREAM_*` environment variable,
//! which in turn may come from a `.env` file loaded at startup.

use crate::pipeline::{
    DEFAULT_MAX_PERSIST_FAILURES, DEFAULT_WINDOW_SIZE, DedupeWindow, EventRouter, ForwardConfig,
    ForwardSink, RotatingLog, RotatingLogConfig,
};
use crate::source::{StreamConfig, StreamSource};
use crate::{Error, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Streaming event ingester.
#[derive(Parser, Clone)]
#[command(name = "logstream-ingest")]
#[command(about = "Stream events into a rotating log and forward them to a local listener")]
#[command(version)]
pub struct Args {
    /// Cluster identifier for the stream
    #[arg(long, env = "LOGSTREAM_CLUSTER_ID")]
    pub cluster_id: Option<String>,

    /// Bearer token for the stream
    #[arg(long, env = "LOGSTREAM_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// WebSocket endpoint
    #[arg(
        long,
        env = "LOGSTREAM_ENDPOINT",
        default_value = "wss://logstream.proofpoint.com/v1/stream"
    )]
    pub endpoint: String,

    /// Stream type query parameter
    #[arg(long, env = "LOGSTREAM_STREAM_TYPE", default_value = "message")]
    pub stream_type: String,

    /// Host of the local TCP listener events are forwarded to
    #[arg(long, env = "LOGSTREAM_FORWARD_HOST", default_value = "127.0.0.1")]
    pub forward_host: String,

    /// Port of the local TCP listener
    #[arg(long, env = "LOGSTREAM_FORWARD_PORT", default_value = "12229")]
    pub forward_port: u16,

    /// Timeout for a single forward, in seconds
    #[arg(long, env = "LOGSTREAM_FORWARD_TIMEOUT_SECS", default_value = "5")]
    pub forward_timeout_secs: u64,

    /// Directory for the rotating event log
    #[arg(long, env = "LOGSTREAM_LOG_DIR", default_value = "./logs")]
    pub log_dir: PathBuf,

    /// Name of the active log file
    #[arg(long, env = "LOGSTREAM_LOG_FILE", default_value = "stream.log")]
    pub log_file: String,

    /// Size in bytes at which the active log file is rotated
    #[arg(long, env = "LOGSTREAM_MAX_FILE_SIZE", default_value = "52428800")] // 50 MiB
    pub max_file_size: u64,

    /// Rotated log files to keep (0 keeps none)
    #[arg(long, env = "LOGSTREAM_BACKUP_COUNT", default_value = "4")]
    pub backup_count: usize,

    /// Number of recent event fingerprints remembered for dedupe
    #[arg(long, env = "LOGSTREAM_DEDUPE_WINDOW", default_value = "1000")]
    pub dedupe_window: usize,

    /// Seconds between keepalive pings
    #[arg(long, env = "LOGSTREAM_KEEPALIVE_INTERVAL_SECS", default_value = "30")]
    pub keepalive_interval_secs: u64,

    /// Seconds to wait for a keepalive pong
    #[arg(long, env = "LOGSTREAM_KEEPALIVE_TIMEOUT_SECS", default_value = "10")]
    pub keepalive_timeout_secs: u64,

    /// Seconds allowed for connecting to the stream
    #[arg(long, env = "LOGSTREAM_CONNECT_TIMEOUT_SECS", default_value = "30")]
    pub connect_timeout_secs: u64,

    /// Fixed delay between reconnect attempts, in seconds
    #[arg(long, env = "LOGSTREAM_RECONNECT_DELAY_SECS", default_value = "10")]
    pub reconnect_delay_secs: u64,

    /// Consecutive log failures tolerated before exiting
    #[arg(long, env = "LOGSTREAM_MAX_PERSIST_FAILURES", default_value = "3")]
    pub max_persist_failures: u32,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, env = "LOGSTREAM_METRICS_PORT", default_value = "0")]
    pub metrics_port: u16,

    /// Environment file to load before reading configuration
    #[arg(long = "dotenv", env = "DOTENV_PATH", default_value = ".env")]
    pub dotenv_path: PathBuf,
}

/// Validated ingester configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub stream: StreamConfig,
    pub log: RotatingLogConfig,
    pub forward: ForwardConfig,
    pub dedupe_window: usize,
    pub max_persist_failures: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            log: RotatingLogConfig::default(),
            forward: ForwardConfig::default(),
            dedupe_window: DEFAULT_WINDOW_SIZE,
            max_persist_failures: DEFAULT_MAX_PERSIST_FAILURES,
        }
    }
}

impl From<&Args> for IngestConfig {
    fn from(args: &Args) -> Self {
        Self {
            stream: StreamConfig {
                endpoint: args.endpoint.clone(),
                cluster_id: args.cluster_id.clone().unwrap_or_default(),
                access_token: args.access_token.clone().unwrap_or_default(),
                stream_type: args.stream_type.clone(),
                keepalive_interval: Duration::from_secs(args.keepalive_interval_secs),
                keepalive_timeout: Duration::from_secs(args.keepalive_timeout_secs),
                connect_timeout: Duration::from_secs(args.connect_timeout_secs),
                reconnect_delay: Duration::from_secs(args.reconnect_delay_secs),
            },
            log: RotatingLogConfig {
                log_dir: args.log_dir.clone(),
                file_name: args.log_file.clone(),
                max_file_size: args.max_file_size,
                backup_count: args.backup_count,
            },
            forward: ForwardConfig {
                host: args.forward_host.clone(),
                port: args.forward_port,
                timeout: Duration::from_secs(args.forward_timeout_secs),
            },
            dedupe_window: args.dedupe_window,
            max_persist_failures: args.max_persist_failures,
        }
    }
}

impl IngestConfig {
    /// Reject incomplete or nonsensical settings before anything starts.
    pub fn validate(&self) -> Result<()> {
        self.stream.validate()?;

        if self.log.file_name.trim().is_empty() {
            return Err(Error::Config("log file name must not be empty".to_string()));
        }
        if self.log.max_file_size == 0 {
            return Err(Error::Config("max file size must be greater than zero".to_string()));
        }
        if self.forward.host.trim().is_empty() {
            return Err(Error::Config("forward host must not be empty".to_string()));
        }
        if self.forward.timeout.is_zero() {
            return Err(Error::Config("forward timeout must be greater than zero".to_string()));
        }
        if self.dedupe_window == 0 {
            return Err(Error::Config("dedupe window must be at least 1".to_string()));
        }
        if self.max_persist_failures == 0 {
            return Err(Error::Config("max persist failures must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Validate, then assemble the stream source and the event router.
    ///
    /// Creates the log directory if it does not exist.
    pub fn build(self) -> Result<(StreamSource, EventRouter)> {
        self.validate()?;

        let log = RotatingLog::new(self.log)?;
        let forward = ForwardSink::new(self.forward);
        let router = EventRouter::new(DedupeWindow::new(self.dedupe_window), log, forward)
            .with_max_persist_failures(self.max_persist_failures);
        let source = StreamSource::new(self.stream)?;

        Ok((source, router))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::ffi::OsString;
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use tempfile::TempDir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Environment isolation for tests that parse [`Args`].
    ///
    /// Clears every variable `Args` reads, sets `vars`, and restores the
    /// previous values on drop. Holds a lock so env-reading tests run one at
    /// a time.
    struct ScopedEnv {
        saved: Vec<(OsString, Option<OsString>)>,
        _lock: MutexGuard<'static, ()>,
    }

    impl ScopedEnv {
        fn new(vars: &[(&str, &str)]) -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            let saved: Vec<_> = Args::command()
                .get_arguments()
                .filter_map(|arg| arg.get_env())
                .map(|key| (key.to_os_string(), std::env::var_os(key)))
                .collect();

            // SAFETY: env access in this module is serialized by ENV_LOCK.
            unsafe {
                for (key, _) in &saved {
                    std::env::remove_var(key);
                }
                for (key, value) in vars {
                    std::env::set_var(key, value);
                }
            }

            Self { saved, _lock: lock }
        }
    }

    impl Drop for ScopedEnv {
        fn drop(&mut self) {
            // SAFETY: still holding ENV_LOCK.
            unsafe {
                for (key, value) in &self.saved {
                    match value {
                        Some(value) => std::env::set_var(key, value),
                        None => std::env::remove_var(key),
                    }
                }
            }
        }
    }

    fn parse(argv: &[&str]) -> IngestConfig {
        let argv = std::iter::once("logstream-ingest").chain(argv.iter().copied());
        let args = Args::try_parse_from(argv).unwrap();
        IngestConfig::from(&args)
    }

    fn valid() -> IngestConfig {
        IngestConfig {
            stream: StreamConfig {
                cluster_id: "acme_hosted".to_string(),
                access_token: "token".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn config_defaults() {
        let _env = ScopedEnv::new(&[]);
        let config = parse(&[]);
        assert_eq!(
            config.stream.endpoint,
            "wss://logstream.proofpoint.com/v1/stream"
        );
        assert_eq!(config.stream.stream_type, "message");
        assert_eq!(config.stream.keepalive_interval, Duration::from_secs(30));
        assert_eq!(config.stream.keepalive_timeout, Duration::from_secs(10));
        assert_eq!(config.stream.reconnect_delay, Duration::from_secs(10));
        assert_eq!(config.forward.host, "127.0.0.1");
        assert_eq!(config.forward.port, 12229);
        assert_eq!(config.log.log_dir, PathBuf::from("./logs"));
        assert_eq!(config.log.file_name, "stream.log");
        assert_eq!(config.log.max_file_size, 50 * 1024 * 1024);
        assert_eq!(config.log.backup_count, 4);
        assert_eq!(config.dedupe_window, 1000);
        assert_eq!(config.max_persist_failures, 3);
    }

    #[test]
    fn config_missing_credentials_fails_closed() {
        let _env = ScopedEnv::new(&[]);
        let config = parse(&[]);
        assert!(config.stream.cluster_id.is_empty());
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn config_from_env() {
        let _env = ScopedEnv::new(&[
            ("LOGSTREAM_CLUSTER_ID", "acme_hosted"),
            ("LOGSTREAM_ACCESS_TOKEN", "token"),
            ("LOGSTREAM_FORWARD_PORT", "5140"),
            ("LOGSTREAM_BACKUP_COUNT", "7"),
            ("LOGSTREAM_DEDUPE_WINDOW", "50"),
            ("LOGSTREAM_RECONNECT_DELAY_SECS", "2"),
        ]);

        let config = parse(&[]);
        assert_eq!(config.stream.cluster_id, "acme_hosted");
        assert_eq!(config.stream.access_token, "token");
        assert_eq!(config.forward.port, 5140);
        assert_eq!(config.log.backup_count, 7);
        assert_eq!(config.dedupe_window, 50);
        assert_eq!(config.stream.reconnect_delay, Duration::from_secs(2));
        config.validate().unwrap();
    }

    #[test]
    fn config_flags_override_env() {
        let _env = ScopedEnv::new(&[("LOGSTREAM_FORWARD_HOST", "10.0.0.1")]);
        let config = parse(&["--forward-host", "192.168.1.5", "--cluster-id", "c"]);
        assert_eq!(config.forward.host, "192.168.1.5");
        assert_eq!(config.stream.cluster_id, "c");
    }

    #[test]
    fn config_rejects_zero_sizes() {
        let mut config = valid();
        config.log.max_file_size = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = valid();
        config.dedupe_window = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = valid();
        config.forward.timeout = Duration::ZERO;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = valid();
        config.max_persist_failures = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn config_allows_zero_backups() {
        let mut config = valid();
        config.log.backup_count = 0;
        config.validate().unwrap();
    }

    #[test]
    fn config_build_creates_log_dir() {
        let tmp = TempDir::new().unwrap();
        let log_dir = tmp.path().join("nested").join("logs");
        let mut config = valid();
        config.log.log_dir = log_dir.clone();
        config.dedupe_window = 5;

        let (source, router) = config.build().unwrap();
        assert!(log_dir.is_dir());
        assert_eq!(router.window().capacity(), 5);
        assert_eq!(source.config().cluster_id, "acme_hosted");
    }

    #[test]
    fn config_build_rejects_invalid_before_touching_disk() {
        let tmp = TempDir::new().unwrap();
        let log_dir = tmp.path().join("logs");
        let mut config = valid();
        config.log.log_dir = log_dir.clone();
        config.stream.access_token = String::new();

        assert!(config.build().is_err());
        assert!(!log_dir.exists());
    }
}
