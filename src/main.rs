//! ceiling-ducker: Background daemon for ceiling microphone ducking
//!
//! This daemon runs next to a room codec and provides:
//! - Debounced detection of talkers on the amplified (handheld/boundary) mics
//! - Explicit state machine that ducks, holds and fades in the ceiling mics
//! - Durable baseline gains reconciled against the configured mic layout
//! - IPC server for the codec bridge (samples, mode signals, gain events)
//!
//! Out of scope:
//! - Audio processing; VU levels arrive already measured
//! - Talking to the codec directly; the bridge applies published gains

mod config;
mod events;
mod gain;
mod ipc;
mod levels;
mod lifecycle;
mod mode;
mod state;
mod store;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::events::DuckerEvent;
use crate::gain::MirrorGainDevice;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::state::{DuckingStateMachine, Input};
use crate::store::JsonBaselineStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "ceiling-ducker starting");

    // Load configuration
    let config = Config::load()?;
    info!(?config.socket_path, ?config.store_path, "configuration loaded");

    // A bad mic layout disables the automation entirely
    if let Err(e) = config.ducker.validate() {
        error!(%e, "ducker disabled, correct the microphone configuration and restart");
        return Err(e).context("invalid microphone configuration");
    }
    info!(
        monitored = ?config.ducker.microphones.monitored,
        amplified = ?config.ducker.microphones.amplified,
        ceiling = ?config.ducker.microphones.ceiling,
        "microphone layout validated"
    );

    config.ensure_dirs()?;

    let shutdown = ShutdownSignal::new();

    // Create channels for inter-component communication
    // IPC server -> State machine (single consumer, serializes every input)
    let (input_tx, input_rx) = mpsc::channel::<Input>(256);
    // State machine -> IPC server and subscribers
    let (event_tx, _event_rx) = broadcast::channel::<DuckerEvent>(64);

    // every write goes out to the bridge as a GAIN_SET event
    let device =
        MirrorGainDevice::with_gains(&config.ducker.initial_gains).publishing(event_tx.clone());
    let store = Arc::new(JsonBaselineStore::new(&config.store_path));

    // Create the state machine and settle the baseline before taking input
    let mut state_machine =
        DuckingStateMachine::new(&config.ducker, Arc::new(device.clone()), event_tx.clone());

    let server = Server::new(&config.socket_path, input_tx, device, event_tx.clone())?;

    let mut status_rx = event_tx.subscribe();

    state_machine.initialize(store).await;

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the state machine (processes samples and mode signals)
        _ = state_machine.run(input_rx) => {
            info!("state machine exited");
        }

        // Run the IPC server (accepts bridge connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Keep the status snapshot in step with the state machine
        _ = async {
            loop {
                match status_rx.recv().await {
                    Ok(event) => {
                        info!(%event, "ducker event");
                        server.apply_event(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "status receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        break;
                    }
                }
            }
        } => {
            info!("status handler exited");
        }

        // Wait for shutdown signal
        result = shutdown.wait() => {
            if let Err(e) = result {
                error!(?e, "shutdown handler failed");
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    // leave the room at baseline
    state_machine.handle(Input::Stop).await;
    server.shutdown().await;

    info!("ceiling-ducker stopped");

    Ok(())
}
