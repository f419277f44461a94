//! Observability - ログ初期化と運用向けカウンタ
//!
//! `RUST_LOG` があればそれを使い、なければ `--log-level` から EnvFilter を組み立てます。

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Snapshot of one topic's ingestion counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestCounts {
    pub stored: u64,
    pub failed: u64,
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(log_level: &str) -> String {
    format!("imagestore={log_level},imagestore_core={log_level},info")
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));
    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_covers_both_crates() {
        assert_eq!(
            default_filter("debug"),
            "imagestore=debug,imagestore_core=debug,info"
        );
    }

    #[test]
    fn counts_serialize_as_plain_numbers() {
        let counts = IngestCounts { stored: 3, failed: 1 };
        assert_eq!(
            serde_json::to_value(counts).unwrap(),
            serde_json::json!({ "stored": 3, "failed": 1 })
        );
    }
}
