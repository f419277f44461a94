//! imagestore - volatile/durable image blob gateway
//!
//! 1. 設定を読み、ログを初期化
//! 2. backend と transport に接続（失敗したら終了コード 1）
//! 3. Sweeper / Dispatcher / Ingestion を起動
//! 4. ctrl-c でキャンセルを配り、全タスクの終了を待つ

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use imagestore_core::app::AppBuilder;
use imagestore_core::config::Args;
use imagestore_core::domain::SetupError;
use imagestore_core::impls::nats::{self, NatsFrameSource, NatsRequestTransport};
use imagestore_core::impls::{InMemoryCache, LocalObjectStore};
use imagestore_core::observability::init_tracing;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal setup error");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), SetupError> {
    let settings = args.runtime_settings()?;
    let topics = args.topic_names();

    let volatile = Arc::new(InMemoryCache::new());
    let durable = Arc::new(LocalObjectStore::new(&args.data_dir, &args.region, &args.bucket));
    info!(
        bucket_dir = %durable.bucket_dir().display(),
        retention = ?settings.retention,
        "configured backends"
    );

    let mut builder = AppBuilder::new(volatile, durable).settings(settings);

    match &args.nats_url {
        Some(url) => {
            let client = nats::connect(url, "imagestore").await?;
            let transport = NatsRequestTransport::subscribe(client.clone(), &args.request_subject).await?;
            info!(subject = %args.request_subject, "dispatcher bound");
            builder = builder.request_transport(Box::new(transport));
            for topic in &topics {
                let source = NatsFrameSource::subscribe(&client, topic).await?;
                builder = builder.topic(topic.clone(), Box::new(source));
            }
        }
        None if !topics.is_empty() => {
            return Err(SetupError::Config(
                "topics are configured but no NATS URL is set".into(),
            ));
        }
        None => warn!("no NATS URL set, running without network transports"),
    }

    let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
    let app = builder.expect_topics(&topic_refs).build().await?;
    let tasks = app.start();

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c, shutting down");
    }
    info!("shutting down");
    tasks.shutdown_and_join().await;
    info!("bye");
    Ok(())
}
