//! `cardcast serve`: wires the broadcast service, the video producer and the
//! operator console together.
//!
//! ```text
//! stdin thread --Line--+
//!                      +--> host loop --BridgeHandle--> BroadcastService (tokio)
//! ctrlc handler --Int--+                                     ^
//!                                                            | FrameSink
//!                                  producer thread ----------+
//! ```

use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use crossbeam::channel::{self, Sender};

use super::console::{self, Flow, Operator};
use super::{Cli, ServeArgs};
use crate::bridge;
use crate::config::CardcastConfig;
use crate::overlay::{CardData, OverlayState};
use crate::producer::{FrameProducer, ProducerControls};
use crate::server::BroadcastServer;
use crate::service::BroadcastService;
use crate::{debug, log};

/// How long shutdown waits for the service to close clients and the port.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

enum HostEvent {
    Line(String),
    Interrupt,
}

pub fn run(cli: &Cli, args: &ServeArgs) -> Result<()> {
    let mut config = CardcastConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    config.apply_serve_args(args);

    let (events_tx, events) = channel::unbounded();
    setup_shutdown_handler(events_tx.clone())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("cardcast-rt")
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let state = Arc::new(OverlayState::new(
        CardData::default(),
        config.overlay.to_overlay_config(config.serve.port),
    ));
    let (handle, sink, inbox) = bridge::channel();
    let server = BroadcastServer::new(Arc::clone(&state));
    let service = runtime.spawn(BroadcastService::new(server, config.serve.interface, inbox).run());

    let controls = Arc::new(ProducerControls::new(config.producer.enabled));
    controls.set_crop(config.producer.crop_region());
    let source = config.producer.source.open();
    log!("frame"; "{} ({:?} profile)", source.describe(), config.producer.profile);
    let producer = FrameProducer::new(source, sink, Arc::clone(&controls), config.producer.profile)
        .with_min_interval(config.producer.min_interval())
        .with_quality(config.producer.quality())
        .spawn(config.producer.tick())
        .context("failed to start video producer")?;

    if config.serve.autostart {
        match runtime.block_on(handle.start(None)) {
            Ok(urls) => console::print_urls(&urls),
            // Not fatal: the operator can `start` on another port
            Err(e) => log!("error"; "{}", crate::server::error_chain(&e)),
        }
    }

    spawn_stdin_reader(events_tx)?;
    log!("console"; "type `help` for commands");

    let mut operator = Operator::new(&runtime, handle.clone(), controls);
    for event in events.iter() {
        match event {
            HostEvent::Line(line) => {
                if operator.handle_line(&line) == Flow::Quit {
                    break;
                }
            }
            HostEvent::Interrupt => {
                log!("serve"; "shutting down...");
                break;
            }
        }
    }

    drop(operator);
    handle.shutdown();
    runtime.block_on(async {
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, service).await.is_err() {
            log!("serve"; "service did not stop in time");
        }
    });
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
    // The inbox is gone with the service, so the producer sees a closed sink
    if producer.join().is_err() {
        log!("error"; "video producer panicked");
    }
    debug!("serve"; "bye");
    Ok(())
}

fn setup_shutdown_handler(events: Sender<HostEvent>) -> Result<()> {
    ctrlc::set_handler(move || {
        let _ = events.send(HostEvent::Interrupt);
    })
    .map_err(|e| anyhow!("failed to set Ctrl+C handler: {}", e))
}

/// Forward stdin lines to the host loop. On EOF the host keeps serving until
/// Ctrl+C.
fn spawn_stdin_reader(events: Sender<HostEvent>) -> Result<()> {
    thread::Builder::new()
        .name("cardcast-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if events.send(HostEvent::Line(line)).is_err() {
                    return;
                }
            }
            debug!("console"; "stdin closed, Ctrl+C to exit");
        })
        .context("failed to start console reader")?;
    Ok(())
}
