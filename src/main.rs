mod compiler;
mod config;
mod dispatcher;
mod error;
mod languages;
mod pipeline;
mod pool;
mod queue;
mod runner;
mod task;
mod workspace;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::config::WorkerConfig;
use crate::dispatcher::Dispatcher;
use crate::languages::LanguageRegistry;
use crate::pipeline::Pipeline;
use crate::pool::WorkerPool;
use crate::queue::RedisQueue;
use crate::runner::ProcessRunner;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("judge_compile=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    info!("Starting Judge Compile Worker...");
    let config = WorkerConfig::from_env()?;

    // Load language configurations
    let registry = match &config.languages_config {
        Some(path) => {
            let registry = LanguageRegistry::from_path(path)?;
            info!("Loaded language configurations from {:?}", path);
            registry
        }
        None => LanguageRegistry::builtin()?,
    };
    info!("Supported languages: {:?}", registry.supported());

    match config.compile_timeout {
        Some(limit) => info!("Compile timeout: {:?}", limit),
        None => warn!("Compile timeout disabled; a hung toolchain blocks its worker"),
    }
    let runner = Arc::new(ProcessRunner::new(config.compile_timeout));
    let pipeline = Arc::new(Pipeline::new(
        registry,
        runner,
        config.workspace_root.clone(),
    ));
    info!("Task workspaces under {:?}", config.workspace_root);

    let queue = Arc::new(
        RedisQueue::connect(
            &config.redis_url,
            config.task_queue.clone(),
            config.result_queue.clone(),
            config.pull_timeout,
        )
        .await?,
    );
    info!("Consuming {}, replying to {}", config.task_queue, config.result_queue);

    let pool = WorkerPool::start(config.pool.clone());
    let dispatcher = Dispatcher::new(queue, pipeline, config.idle_delay);

    let (stop, shutdown) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
        }
        warn!("Received shutdown signal, finishing in-flight tasks...");
        stop.send_replace(true);
    });

    dispatcher.run(&pool, shutdown).await;

    pool.shutdown().await;
    info!("Worker shutdown complete");
    Ok(())
}
