use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use serde::Deserialize;
use tokio::time::{Duration, sleep};
use tracing::info;
use tracing_subscriber::EnvFilter;

use shuttle_core::domain::{ExecutionResult, Task, TaskId, TaskType};
use shuttle_core::impls::{HandlerRegistry, InMemoryEphemeralStore, RegistryExecutor, TaskHandler};
use shuttle_core::ports::TaskStore;
use shuttle_core::{ExecutorError, SchedulerConfig, TaskScheduler};
use shuttle_sqlite::SqliteTaskStore;

/// Run a batch of demo tasks through the scheduler.
#[derive(Debug, Parser)]
#[command(name = "shuttle", version)]
struct Args {
    /// SQLite database file. In-memory when omitted.
    #[arg(long)]
    db: Option<PathBuf>,

    /// JSON file with scheduler settings; unspecified fields keep defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured worker count.
    #[arg(long)]
    workers: Option<usize>,

    /// Number of tasks to submit.
    #[arg(long, default_value_t = 5)]
    tasks: usize,

    /// How many of the first executions should fail on purpose.
    #[arg(long, default_value_t = 1)]
    failures: u32,
}

#[derive(Debug, Deserialize)]
struct HelloInput {
    name: String,
}

struct HelloHandler {
    remaining_failures: AtomicU32,
}

impl HelloHandler {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl TaskHandler for HelloHandler {
    async fn handle(&self, task: &Task) -> Result<ExecutionResult, ExecutorError> {
        let input: HelloInput = match serde_json::from_str(&task.input) {
            Ok(input) => input,
            Err(err) => return Ok(ExecutionResult::failure(format!("json decode: {err}"))),
        };

        let left = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if let Ok(left) = left {
            return Ok(ExecutionResult::failure(format!(
                "intentional failure (left={left})"
            )));
        }

        sleep(Duration::from_millis(20)).await;
        Ok(ExecutionResult::success(format!("Hello, {}!", input.name)))
    }
}

fn load_config(args: &Args) -> anyhow::Result<SchedulerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => SchedulerConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    Ok(config)
}

async fn wait_for_all(store: &dyn TaskStore, ids: &[TaskId]) -> anyhow::Result<()> {
    loop {
        let mut finished = 0;
        for id in ids {
            if let Some(task) = store.get_task(id).await?
                && task.status.is_terminal()
            {
                finished += 1;
            }
        }
        if finished == ids.len() {
            return Ok(());
        }
        sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    // (A) stores + executor
    let store: Arc<SqliteTaskStore> = Arc::new(match &args.db {
        Some(path) => SqliteTaskStore::open(path).await?,
        None => SqliteTaskStore::in_memory().await?,
    });
    let ephemeral = Arc::new(InMemoryEphemeralStore::new());

    let mut registry = HandlerRegistry::new();
    registry.register(TaskType::new("hello"), Arc::new(HelloHandler::new(args.failures)))?;
    let executor = Arc::new(RegistryExecutor::new(Arc::new(registry)));

    let scheduler = TaskScheduler::builder()
        .config(config)
        .task_store(store.clone())
        .ephemeral_store(ephemeral)
        .executor(executor)
        .build()?;

    // (B) start loops
    scheduler.start()?;

    // (C) submit
    let mut ids = Vec::with_capacity(args.tasks);
    for i in 0..args.tasks {
        let input = serde_json::json!({ "name": format!("shuttle-{i}") }).to_string();
        let task = Task::new("demo-user", "demo-session", TaskType::new("hello"), input)
            .with_priority((i % 10) as i32);
        ids.push(scheduler.submit_task(task).await?);
    }
    info!(count = ids.len(), "submitted demo tasks");

    // (D) wait for completion (or Ctrl-C)
    tokio::select! {
        res = wait_for_all(store.as_ref(), &ids) => res?,
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }

    for id in &ids {
        if let Some(task) = store.get_task(id).await? {
            println!(
                "{id}: status={} output={:?} error={:?}",
                task.status, task.output, task.error
            );
        }
    }
    let stats = scheduler.get_today_stats().await?;
    println!(
        "today: total={} success={} failure={}",
        stats.total, stats.success, stats.failure
    );

    // (E) graceful shutdown
    scheduler.stop().await;
    Ok(())
}
