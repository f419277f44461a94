//! Configuration - CLI 引数と環境変数
//!
//! clap の derive で `Args` を定義し、`runtime_settings()` で型付きの設定に変換します。
//! 変換に失敗した場合は `SetupError::Config`（起動時の致命的エラー）です。
//!
//! 期間は Go 形式の文字列（`1h30m`, `500ms`, `1.5s`）で指定します。
//! retention time には無期限を表す `-1` / `infinite` も使えます。

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::codec::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_FRAME_SIZE};
use crate::domain::{MemoryType, RetentionPolicy, SetupError, Ttl};
use crate::facade::FacadeLimits;
use crate::impls::nats::DEFAULT_REQUEST_SUBJECT;
use crate::impls::{DEFAULT_BUCKET, DEFAULT_REGION};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("missing unit in duration '{0}'")]
    MissingUnit(String),

    #[error("unknown unit '{unit}' in duration '{input}'")]
    UnknownUnit { unit: String, input: String },

    #[error("{0}")]
    Invalid(String),
}

const INFINITE_SENTINELS: [&str; 4] = ["-1", "infinite", "inf", "never"];

/// Parse a Go-style duration such as `300ms`, `1.5h` or `2h45m`.
///
/// A bare `0` is accepted without a unit. Negative durations are rejected.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(input.to_string());
    let s = input.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s.is_empty() || s.starts_with('-') {
        return Err(invalid());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_nanos: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
            return Err(invalid());
        }

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale: u128 = match unit {
            "" => return Err(ConfigError::MissingUnit(input.to_string())),
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            other => {
                return Err(ConfigError::UnknownUnit {
                    unit: other.to_string(),
                    input: input.to_string(),
                });
            }
        };

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(invalid)?;
        // 小数部は ns 未満を切り捨て
        let mut place = scale;
        for digit in fraction.bytes() {
            place /= 10;
            nanos += u128::from(digit - b'0') * place;
        }
        total_nanos = total_nanos.checked_add(nanos).ok_or_else(invalid)?;
        rest = tail;
    }

    let secs = u64::try_from(total_nanos / 1_000_000_000).map_err(|_| invalid())?;
    let subsec = (total_nanos % 1_000_000_000) as u32;
    Ok(Duration::new(secs, subsec))
}

/// Parse a retention time: a duration or one of the infinite sentinels.
pub fn parse_ttl(input: &str) -> Result<Ttl, ConfigError> {
    let s = input.trim();
    if INFINITE_SENTINELS
        .iter()
        .any(|sentinel| s.eq_ignore_ascii_case(sentinel))
    {
        return Ok(Ttl::Infinite);
    }
    parse_duration(s).map(Ttl::Finite)
}

/// Typed settings shared by the app builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub limits: FacadeLimits,
    pub chunk_size: usize,
    pub retention: RetentionPolicy,
    pub dispatch_memory_type: MemoryType,
    pub ingest_memory_type: MemoryType,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            limits: FacadeLimits::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            retention: RetentionPolicy::disabled(),
            dispatch_memory_type: MemoryType::Volatile,
            ingest_memory_type: MemoryType::Volatile,
        }
    }
}

/// imagestore - volatile/durable image blob gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "imagestore")]
#[command(about = "Image blob gateway over a volatile cache and a durable object store")]
pub struct Args {
    /// Root directory of the durable object store
    #[arg(long, env = "IMAGESTORE_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Durable bucket name
    #[arg(long, env = "IMAGESTORE_BUCKET", default_value = DEFAULT_BUCKET)]
    pub bucket: String,

    /// Durable region identifier
    #[arg(long, env = "IMAGESTORE_REGION", default_value = DEFAULT_REGION)]
    pub region: String,

    /// TTL of durable objects (e.g. 24h, 1h30m), or -1 / infinite to keep forever
    #[arg(long, env = "RETENTION_TIME", default_value = "-1")]
    pub retention_time: String,

    /// How often the retention sweeper runs (e.g. 10m)
    #[arg(long, env = "RETENTION_POLL_INTERVAL", default_value = "1m")]
    pub retention_poll_interval: String,

    /// Largest blob accepted by Store, in bytes
    #[arg(long, env = "MAX_FRAME_SIZE", default_value_t = DEFAULT_MAX_FRAME_SIZE)]
    pub max_frame_size: usize,

    /// Chunk size of streamed transfers, in bytes
    #[arg(long, env = "CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Timeout of backend control calls (delete) in milliseconds
    #[arg(long, env = "BACKEND_TIMEOUT_MS", default_value = "1000")]
    pub backend_timeout_ms: u64,

    /// Timeout of backend data calls (put, get) in milliseconds
    #[arg(long, env = "DATA_TIMEOUT_MS", default_value = "30000")]
    pub data_timeout_ms: u64,

    /// NATS server URL. Without it no network transport is bound
    #[arg(long, env = "NATS_URL")]
    pub nats_url: Option<String>,

    /// Subject the dispatcher answers requests on
    #[arg(long, env = "REQUEST_SUBJECT", default_value = DEFAULT_REQUEST_SUBJECT)]
    pub request_subject: String,

    /// Topics to ingest frames from (comma separated)
    #[arg(long, env = "TOPICS", value_delimiter = ',')]
    pub topics: Vec<String>,

    /// Backend for ingested frames (inmemory, persistent)
    #[arg(long, env = "INGEST_MEMORY_TYPE", default_value = "inmemory")]
    pub ingest_memory_type: String,

    /// Backend for dispatcher Store commands (inmemory, persistent)
    #[arg(long, env = "DISPATCH_MEMORY_TYPE", default_value = "inmemory")]
    pub dispatch_memory_type: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

impl Args {
    /// Validate flags that do not need parsing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.is_empty() {
            return Err(ConfigError::Invalid("bucket must not be empty".into()));
        }
        if self.max_frame_size == 0 {
            return Err(ConfigError::Invalid("max frame size must be positive".into()));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk size must be positive".into()));
        }
        if self.backend_timeout_ms == 0 || self.data_timeout_ms == 0 {
            return Err(ConfigError::Invalid("backend timeouts must be positive".into()));
        }
        if let Some(topic) = self.topics.iter().find(|t| t.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("invalid topic name '{topic}'")));
        }
        Ok(())
    }

    pub fn retention_policy(&self) -> Result<RetentionPolicy, ConfigError> {
        let ttl = parse_ttl(&self.retention_time)?;
        if ttl == Ttl::Infinite {
            return Ok(RetentionPolicy::disabled());
        }
        let poll_interval = parse_duration(&self.retention_poll_interval)?;
        if poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "retention poll interval must be positive".into(),
            ));
        }
        Ok(RetentionPolicy::new(ttl, poll_interval))
    }

    /// Configured topics with surrounding whitespace removed.
    pub fn topic_names(&self) -> Vec<String> {
        self.topics.iter().map(|t| t.trim().to_string()).collect()
    }

    pub fn runtime_settings(&self) -> Result<RuntimeSettings, SetupError> {
        self.build_settings()
            .map_err(|e| SetupError::Config(e.to_string()))
    }

    fn build_settings(&self) -> Result<RuntimeSettings, ConfigError> {
        self.validate()?;
        let memory_type = |value: &str| {
            value
                .parse::<MemoryType>()
                .map_err(|e| ConfigError::Invalid(e.to_string()))
        };
        Ok(RuntimeSettings {
            limits: FacadeLimits {
                max_frame_size: self.max_frame_size,
                backend_timeout: Duration::from_millis(self.backend_timeout_ms),
                data_timeout: Duration::from_millis(self.data_timeout_ms),
            },
            chunk_size: self.chunk_size,
            retention: self.retention_policy()?,
            dispatch_memory_type: memory_type(&self.dispatch_memory_type)?,
            ingest_memory_type: memory_type(&self.ingest_memory_type)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["imagestore"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[rstest]
    #[case("0", Duration::ZERO)]
    #[case("300ms", Duration::from_millis(300))]
    #[case("1.5s", Duration::from_millis(1500))]
    #[case("2h45m", Duration::from_secs(2 * 3600 + 45 * 60))]
    #[case("1h30m10s", Duration::from_secs(5410))]
    #[case("10us", Duration::from_micros(10))]
    #[case("10µs", Duration::from_micros(10))]
    #[case("7ns", Duration::from_nanos(7))]
    #[case(" 24h ", Duration::from_secs(86_400))]
    fn parses_go_durations(#[case] input: &str, #[case] expected: Duration) {
        assert_eq!(parse_duration(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("10")]
    #[case("h")]
    #[case("5d")]
    #[case("-5m")]
    #[case("1..2s")]
    fn rejects_bad_durations(#[case] input: &str) {
        assert!(parse_duration(input).is_err(), "{input} should not parse");
    }

    #[rstest]
    #[case("-1", Ttl::Infinite)]
    #[case("Infinite", Ttl::Infinite)]
    #[case("never", Ttl::Infinite)]
    #[case("90m", Ttl::Finite(Duration::from_secs(5400)))]
    fn parses_ttls(#[case] input: &str, #[case] expected: Ttl) {
        assert_eq!(parse_ttl(input).unwrap(), expected);
    }

    #[test]
    fn defaults_disable_retention() {
        let settings = args(&[]).runtime_settings().unwrap();
        assert_eq!(settings, RuntimeSettings::default());
        assert!(!settings.retention.is_enabled());
    }

    #[test]
    fn flags_become_typed_settings() {
        let args = args(&[
            "--retention-time",
            "24h",
            "--retention-poll-interval",
            "10m",
            "--max-frame-size",
            "1024",
            "--backend-timeout-ms",
            "250",
            "--data-timeout-ms",
            "5000",
            "--ingest-memory-type",
            "persistent",
            "--topics",
            "cam-a, cam-b",
        ]);
        let settings = args.runtime_settings().unwrap();

        assert_eq!(
            settings.retention,
            RetentionPolicy::new(
                Ttl::Finite(Duration::from_secs(86_400)),
                Duration::from_secs(600)
            )
        );
        assert_eq!(settings.limits.max_frame_size, 1024);
        assert_eq!(settings.limits.backend_timeout, Duration::from_millis(250));
        assert_eq!(settings.limits.data_timeout, Duration::from_secs(5));
        assert_eq!(settings.ingest_memory_type, MemoryType::Durable);
        assert_eq!(settings.dispatch_memory_type, MemoryType::Volatile);
        assert_eq!(args.topic_names(), ["cam-a", "cam-b"]);
    }

    #[rstest]
    #[case(&["--retention-time", "1h", "--retention-poll-interval", "0"])]
    #[case(&["--retention-time", "soon"])]
    #[case(&["--chunk-size", "0"])]
    #[case(&["--data-timeout-ms", "0"])]
    #[case(&["--dispatch-memory-type", "disk"])]
    #[case(&["--topics", "a,,b"])]
    fn invalid_flags_are_setup_errors(#[case] extra: &[&str]) {
        let err = args(extra).runtime_settings().unwrap_err();
        assert!(matches!(err, SetupError::Config(_)), "{err:?}");
    }
}
