//! Example: a resilient stand-in for a flaky code unit
//!
//! This example demonstrates:
//! - Transient chunk failures retried behind a busy indicator
//! - The watchdog switching to the "slow" affordance
//! - A manual retry after a terminal failure
//! - Lifecycle events and tracing output
//!
//! Run with: RUST_LOG=steadyload=debug cargo run -p steadyload --example stand_in_demo

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use steadyload::{
    EventSink, LoaderOptions, Placeholder, ResilienceConfig, ResilientStandIn, UnitLoader,
    loader_fn, make_loader,
};
use tracing_subscriber::EnvFilter;

async fn render_until_settled<L>(stand_in: &ResilientStandIn<L>) -> anyhow::Result<()>
where
    L: UnitLoader,
    L::Unit: std::fmt::Display,
{
    loop {
        match stand_in.view() {
            Ok(Placeholder::Busy { .. }) => println!("  [spinner]"),
            Ok(Placeholder::Slow { .. }) => println!("  [taking longer than usual, retry?]"),
            Ok(Placeholder::Ready(unit)) => {
                println!("  rendered: {unit}");
                return Ok(());
            }
            Err(err) => {
                println!("  [recovery panel] {err}");
                return Ok(());
            }
        }
        stand_in.changed().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let events = EventSink::new(|event| println!("  event: {}", event.description()));
    let config = ResilienceConfig::from_toml_str(
        r#"
        retries = 2
        retry_delay_ms = 300
        timeout_ms = 500
        min_display_ms = 200
        "#,
    )?;

    println!("1. Two dropped chunks, then the unit arrives");
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let flaky = loader_fn(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                Err(std::io::Error::other("ChunkLoadError: Loading chunk 3 failed"))
            } else {
                Ok("invoice editor")
            }
        }
    })
    .with_label("invoice-editor");
    let options = LoaderOptions::from(&config).with_events(events.clone());
    let stand_in = make_loader(flaky, options)?;
    render_until_settled(&stand_in).await?;

    println!("\n2. Unit fails for good, user presses retry");
    let broken = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&broken);
    let unit = loader_fn(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(Duration::from_millis(700)).await;
            if n == 0 {
                Err(std::io::Error::other("SyntaxError: unexpected token"))
            } else {
                Ok("reports page")
            }
        }
    })
    .with_label("reports");
    let stand_in = make_loader(unit, config.loader_options().with_events(events))?;
    render_until_settled(&stand_in).await?;

    let generation = stand_in.retry()?;
    println!("  retrying as {generation}");
    render_until_settled(&stand_in).await?;

    Ok(())
}
