use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use spindle_core::domain::{BoxError, DispatchError, Operation};
use spindle_core::{Actor, Dispatcher, FiberBuilder, FiberConfig, RetrySettings};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// デモ用の設定（JSON ファイルのパスを第 1 引数で渡せる）
#[derive(Debug, Deserialize)]
#[serde(default)]
struct DemoConfig {
    fiber: FiberConfig,
    retry: RetrySettings,
    /// Probability that one attempt of the flaky job fails.
    failure_rate: f64,
    jobs: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            fiber: FiberConfig {
                name: Some("spindle-demo".to_string()),
                ..FiberConfig::default()
            },
            retry: RetrySettings {
                wait_ms: vec![50, 100, 200],
                max_retries: Some(5),
            },
            failure_rate: 0.5,
            jobs: 5,
        }
    }
}

fn load_config() -> Result<DemoConfig, Box<dyn Error>> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(DemoConfig::default());
    };
    let text = std::fs::read_to_string(&path)?;
    let config: DemoConfig = serde_json::from_str(&text)?;
    config.fiber.validate()?;
    if !(0.0..=1.0).contains(&config.failure_rate) {
        return Err(format!("failure_rate must be within 0..=1, got {}", config.failure_rate).into());
    }
    Ok(config)
}

/// 内側の dispatcher に渡す前後でログを出すだけのデコレータ
struct LoggingDispatcher<D> {
    inner: D,
    submitted: AtomicU32,
}

impl<D> LoggingDispatcher<D> {
    fn new(inner: D) -> Self {
        Self {
            inner,
            submitted: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl<D: Dispatcher> Dispatcher for LoggingDispatcher<D> {
    fn dispatch_with(&self, operation: Operation<()>, cancel: Option<CancellationToken>) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        tracing::info!("dispatch");
        self.inner.dispatch_with(operation, cancel);
    }

    async fn enqueue_with<T: Send + 'static>(
        &self,
        operation: Operation<T>,
        cancel: Option<CancellationToken>,
    ) -> Result<T, DispatchError> {
        let n = self.submitted.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(submission = n, "enqueue");
        let result = self.inner.enqueue_with(operation, cancel).await;
        if let Err(e) = &result {
            tracing::info!(submission = n, error = %e, "attempt failed");
        }
        result
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,spindle_core=debug")),
        )
        .init();

    let config = load_config()?;
    tracing::info!(?config, "starting demo");

    // (A) fiber を作り、ログ付き dispatcher → リトライ の順に包む
    let fiber = FiberBuilder::from_config(config.fiber.clone())
        .on_thread_start(|t| tracing::info!(thread = ?t.name(), "fiber thread started"))
        .build()?;
    let logging = Arc::new(LoggingDispatcher::new(fiber.clone()));
    let policy = config.retry.clone().into_policy().with_shared_dispatcher(Arc::clone(&logging));

    // (B) 失敗しやすい job を投入（同じ closure がリトライごとに呼ばれる）
    let failure_rate = config.failure_rate;
    for job in 1..=config.jobs {
        let op = Operation::func(move || -> Result<String, BoxError> {
            if rand::thread_rng().gen_bool(failure_rate) {
                return Err(format!("job {job}: transient failure").into());
            }
            let thread = std::thread::current();
            Ok(format!("job {job} done on {}", thread.name().unwrap_or("?")))
        });
        match policy.enqueue(op).await {
            Ok(message) => tracing::info!(%message, "job succeeded"),
            Err(e) => tracing::warn!(error = %e, "job gave up"),
        }
    }
    tracing::info!(
        submissions = logging.submitted.load(Ordering::Relaxed),
        pending = fiber.pending(),
        "retry demo finished"
    );

    // (C) Actor: 状態は専用 fiber の中だけで書き換える
    let counter = Actor::spawn(0u64)?;
    for _ in 0..10 {
        counter.tell(|n| *n += 1);
    }
    let total = counter.ask(|n| *n).await?;
    tracing::info!(total, "actor counted");

    // (D) 後片付け（dispose は冪等）
    counter.fiber().dispose_async().await;
    fiber.dispose_async().await;
    tracing::info!(state = ?fiber.state(), "fiber disposed");
    Ok(())
}
