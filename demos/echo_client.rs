//! Connect, exchange frames with an echo server, disconnect, reconnect.
//!
//! Demonstrates:
//! - Building a transport with the builder
//! - Waiting for `connect` before sending
//! - Receiving `message` notifications
//! - Reconnecting right after a disconnect
//!
//! Usage:
//!   cargo run --example echo_client
//!   cargo run --example echo_client -- --url ws://localhost:8080
//!   cargo run --example echo_client -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use common::Args;
use tokio::time::timeout;
use ws_transport::{Error, EventReceiver, Result, Transport, TransportEvent};

// ============================================================================
// Constants
// ============================================================================

const FRAMES: &[&str] = &["hello", r#"{"Locale":"en"}"#, "goodbye"];

const WAIT: Duration = Duration::from_secs(10);

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
    println!("=== Echo Client ===\n");

    // ========================================================================
    // Create Transport
    // ========================================================================

    println!("[1] Creating transport...");
    println!("    Address: {}", args.url);

    let transport = Transport::builder()
        .address(&args.url)
        .heartbeat(5000, 4500)
        .passthrough("disable_nagle", true)
        .build()?;
    let mut events = transport.subscribe();

    println!("    ✓ Transport ready\n");

    // ========================================================================
    // Connect and Exchange
    // ========================================================================

    println!("[2] Connecting...");
    transport.connect()?;
    wait_connected(&mut events).await?;

    println!("\n[3] Sending {} frames...", FRAMES.len());
    for frame in FRAMES {
        transport.send(*frame)?;
        println!("    > {frame}");
    }

    let mut received = 0;
    while received < FRAMES.len() {
        let event = next(&mut events).await?;
        common::print_event(&event);
        if matches!(event, TransportEvent::Message(_)) {
            received += 1;
        }
    }

    // ========================================================================
    // Reconnect
    // ========================================================================

    println!("\n[4] Disconnecting and reconnecting...");
    transport.disconnect(None)?;
    transport.connect()?;
    wait_connected(&mut events).await?;

    transport.disconnect(None)?;
    common::print_event(&next(&mut events).await?);

    println!("\n=== Done ===");
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

async fn next(events: &mut EventReceiver) -> Result<TransportEvent> {
    timeout(WAIT, events.recv())
        .await
        .map_err(|_| Error::application("timed out waiting for a notification"))?
        .ok_or_else(|| Error::application("transport dropped"))
}

async fn wait_connected(events: &mut EventReceiver) -> Result<()> {
    loop {
        let event = next(events).await?;
        common::print_event(&event);
        match event {
            TransportEvent::Connect => return Ok(()),
            TransportEvent::Disconnect(Some(err)) => {
                return Err(Error::application(err.to_string()));
            }
            _ => {}
        }
    }
}
