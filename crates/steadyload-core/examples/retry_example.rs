//! Example: classifying failures and retrying with a policy
//!
//! This example demonstrates:
//! 1. A chunk-download failure that is retried until it succeeds
//! 2. A programming error that the classifier refuses to retry
//! 3. A custom classifier layered on top of the built-in patterns
//!
//! Run with:
//! ```bash
//! cargo run -p steadyload-core --example retry_example
//! ```

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use steadyload_core::prelude::*;

/// A bundle server that drops the first few chunk requests
struct FlakyBundle {
    requests: Arc<AtomicU32>,
    drops: u32,
}

impl FlakyBundle {
    fn new(drops: u32) -> Self {
        Self {
            requests: Arc::new(AtomicU32::new(0)),
            drops,
        }
    }

    async fn fetch(&self) -> Result<&'static str, std::io::Error> {
        let request = self.requests.fetch_add(1, Ordering::SeqCst);
        if request < self.drops {
            println!("  Request {}: ChunkLoadError", request + 1);
            Err(std::io::Error::other(format!(
                "ChunkLoadError: Loading chunk {} failed",
                request + 7
            )))
        } else {
            println!("  Request {}: loaded", request + 1);
            Ok("settings-panel.js")
        }
    }
}

/// Example 1: transient failures are retried
async fn example_transient() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 1: Transient Failures ===\n");

    let policy = RetryPolicy::builder()
        .max_retries(3)
        .delay(
            ExponentialBackoff::builder()
                .initial_delay(Duration::from_millis(100))
                .multiplier(2.0)
                .jitter(0.0)
                .build(),
        )
        .build();

    let bundle = FlakyBundle::new(2);
    let start = Instant::now();
    let unit = policy
        .execute(|| bundle.fetch())
        .await
        .map_err(|gave_up| gave_up.error)?;

    println!("\nLoaded {unit} in {:?}", start.elapsed());
    println!("Expected delays: 100ms + 200ms");
    Ok(())
}

/// Example 2: terminal failures stop after one attempt
async fn example_terminal() {
    println!("\n=== Example 2: Terminal Failure ===\n");

    let policy = RetryPolicy::builder()
        .max_retries(5)
        .delay(DelayPolicy::fixed_ms(50))
        .build();

    let result = policy
        .execute(|| async {
            Err::<(), _>(std::io::Error::other("TypeError: render is not a function"))
        })
        .await;

    if let Err(gave_up) = result {
        println!(
            "  Gave up after {} attempt(s): {} ({})",
            gave_up.attempts, gave_up.error, gave_up.reason
        );
    }
}

/// Example 3: extending the built-in patterns
async fn example_custom_classifier() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 3: Custom Classifier ===\n");

    let patterns = MessagePatterns::with_extra(["503 service unavailable"])?;
    for message in ["503 Service Unavailable", "Failed to fetch", "401 unauthorized"] {
        println!(
            "  {message:<28} -> {}",
            if patterns.matches_message(message) {
                "retry"
            } else {
                "give up"
            }
        );
    }

    let policy = RetryPolicy::builder()
        .max_retries(1)
        .delay(DelayPolicy::fixed_ms(10))
        .classifier(|err: &(dyn Error + 'static)| err.to_string().contains("busy"))
        .build();
    let err = std::io::Error::other("server busy");
    println!("\n  Decision for 'server busy': {:?}", policy.decide(0, &err));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    example_transient().await?;
    example_terminal().await;
    example_custom_classifier().await?;

    println!("\n=== All examples completed ===");
    Ok(())
}
