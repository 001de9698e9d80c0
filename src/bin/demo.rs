use std::{collections::BTreeMap, fmt, time::Duration};

use miniexec::{
    BoxError, Describable, Executor, ExecutorConfig, TaskContext, render_table,
};
use tokio::time::sleep;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Everything the demo tasks can hand back.
#[derive(Debug, Clone, PartialEq)]
enum Payload {
    Text(String),
    Integer(i64),
    List(Vec<String>),
    Map(BTreeMap<String, i64>),
    Float(f64),
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Text(text) => write!(f, "{text}"),
            Payload::Integer(n) => write!(f, "{n}"),
            Payload::List(items) => write!(f, "[{}]", items.join(", ")),
            Payload::Map(map) => {
                let entries: Vec<String> = map.iter().map(|(k, v)| format!("{k}: {v}")).collect();
                write!(f, "{{{}}}", entries.join(", "))
            }
            Payload::Float(x) => write!(f, "{x:.5}"),
        }
    }
}

async fn after(millis: u64, payload: Payload) -> Result<Payload, BoxError> {
    sleep(Duration::from_millis(millis)).await;
    Ok(payload)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ExecutorConfig::from_env()?;

    let (events_tx, events_rx) = async_channel::bounded(64);
    let consumer = tokio::spawn(async move {
        while let Ok(event) = events_rx.recv().await {
            info!(?event, "executor event");
        }
    });

    let executor = Executor::new(config.clone().with_events(events_tx));
    executor.register("data", || after(200, Payload::Text("processed".into())))?;
    executor.register("compute", || after(150, Payload::Integer(42)))?;
    executor.register("list", || {
        after(300, Payload::List(vec!["a".into(), "b".into(), "c".into()]))
    })?;
    executor.register("map", || {
        after(100, Payload::Map(BTreeMap::from([("count".to_string(), 100)])))
    })?;
    executor.register("float", || after(250, Payload::Float(9.80665)))?;
    executor.register_blocking("checksum", || {
        let sum = (1..=1_000_000i64).fold(0i64, |acc, n| acc.wrapping_add(n * n % 7));
        Ok::<_, BoxError>(Payload::Integer(sum))
    })?;
    executor.register("broken", || async { Err::<Payload, _>("upstream unavailable") })?;

    executor.run_all().await?;
    let summary = executor.summary()?;
    let results = executor.all_results();

    println!("{}", render_table(&results, &summary));
    println!("{}", summary.describe());
    for result in &results {
        println!("  {}", result.describe());
    }

    drop(executor);
    consumer.await?;

    let bounded = Executor::new(config);
    bounded.register("quick", || after(20, Payload::Text("made it".into())))?;
    bounded.register_with_context("stuck", |ctx: TaskContext| async move {
        ctx.cancelled().await;
        Err::<Payload, _>("gave up once the run stopped waiting")
    })?;

    let outcome = bounded.run_all_with_deadline(Duration::from_millis(100)).await?;
    println!("{}", outcome.describe());
    println!("{}", render_table(&bounded.all_results(), &bounded.summary()?));

    Ok(())
}
