//! Keep a connection open and watch the heartbeat.
//!
//! Demonstrates:
//! - Loading options from JSON
//! - Printing every notification until the connection drops
//! - How a heartbeat timeout surfaces as a `disconnect`
//!
//! Pause the server process (e.g. `kill -STOP`) to see the timeout.
//!
//! Usage:
//!   cargo run --example heartbeat_watch -- --url ws://localhost:8080
//!   cargo run --example heartbeat_watch -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use common::Args;
use ws_transport::{Result, Transport, TransportEvent, TransportOptions};

// ============================================================================
// Constants
// ============================================================================

const OPTIONS: &str = r#"{
    "heartbeat_interval_ms": 2000,
    "heartbeat_timeout_ms": 1500
}"#;

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Heartbeat Watch ===\n");

    let options = TransportOptions::from_json(OPTIONS)?;
    println!(
        "[1] Heartbeat every {}ms, timeout {}ms",
        options.heartbeat_interval_ms, options.heartbeat_timeout_ms
    );

    let transport = Transport::builder()
        .address(&args.url)
        .options(options)
        .build()?;
    let mut events = transport.subscribe();

    println!("[2] Connecting to {}...", args.url);
    transport.connect()?;

    println!("[3] Watching (Ctrl+C to exit)...\n");
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                common::print_event(&event);
                if let TransportEvent::Disconnect(Some(err)) = &event {
                    if err.is_heartbeat_failure() {
                        println!("\n    Server stopped answering pings");
                    }
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                transport.disconnect(None)?;
                break;
            }
        }
    }

    println!("\n=== Done ===");
    Ok(())
}
