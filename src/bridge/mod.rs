//! Transport Bridge - channels between the host, the producer and the
//! broadcast service.
//!
//! ```text
//! BridgeHandle --Command (ordered, lossless)--------> BridgeInbox --> BroadcastService
//! FrameSink    --Frame (latest-wins, depth 1)-------> BridgeInbox
//! FrameSink    <--running (watch<bool>)-------------- BridgeInbox
//! ```
//!
//! Commands never drop. Frames overwrite each other: a consumer that falls
//! behind sees only the most recent frame.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

use crate::overlay::{CardData, CardDataPatch, OverlayConfig, OverlayConfigPatch, StateError};
use crate::producer::Frame;
use crate::server::{ServerError, ServerStatus, ServerUrls};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("broadcast service is not running")]
    Closed,

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    State(#[from] StateError),
}

/// Messages to the broadcast service.
#[derive(Debug)]
pub enum Command {
    /// Start serving. `None` uses the port from the overlay config.
    Start {
        port: Option<u16>,
        reply: oneshot::Sender<Result<ServerUrls, ServerError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    UpdateCardData {
        patch: CardDataPatch,
        reply: oneshot::Sender<Arc<CardData>>,
    },
    UpdateConfig {
        patch: OverlayConfigPatch,
        reply: oneshot::Sender<Result<Arc<OverlayConfig>, StateError>>,
    },
    GetStatus {
        reply: oneshot::Sender<ServerStatus>,
    },
    /// Stop the server and exit the service loop.
    Shutdown,
}

/// Create a connected handle, frame sink and inbox.
pub fn channel() -> (BridgeHandle, FrameSink, BridgeInbox) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (frame_tx, frame_rx) = watch::channel(None);
    let (running_tx, running_rx) = watch::channel(false);

    let handle = BridgeHandle {
        commands: command_tx,
        running: running_rx.clone(),
    };
    let sink = FrameSink {
        frames: frame_tx,
        running: running_rx,
    };
    let inbox = BridgeInbox {
        commands: command_rx,
        frames: frame_rx,
        running: running_tx,
    };
    (handle, sink, inbox)
}

// ============================================================================
// Host side
// ============================================================================

/// Cloneable operator handle to the broadcast service.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    commands: mpsc::UnboundedSender<Command>,
    running: watch::Receiver<bool>,
}

impl BridgeHandle {
    pub async fn start(&self, port: Option<u16>) -> Result<ServerUrls, BridgeError> {
        Ok(self.request(|reply| Command::Start { port, reply }).await??)
    }

    pub async fn stop(&self) -> Result<(), BridgeError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    pub async fn update_card_data(&self, patch: CardDataPatch) -> Result<Arc<CardData>, BridgeError> {
        self.request(|reply| Command::UpdateCardData { patch, reply }).await
    }

    pub async fn update_config(
        &self,
        patch: OverlayConfigPatch,
    ) -> Result<Arc<OverlayConfig>, BridgeError> {
        Ok(self.request(|reply| Command::UpdateConfig { patch, reply }).await??)
    }

    pub async fn status(&self) -> Result<ServerStatus, BridgeError> {
        self.request(|reply| Command::GetStatus { reply }).await
    }

    /// Ask the service to stop and exit. Does not wait.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    /// Whether the server was running after the last lifecycle change.
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, BridgeError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| BridgeError::Closed)?;
        response.await.map_err(|_| BridgeError::Closed)
    }
}

// ============================================================================
// Producer side
// ============================================================================

/// Producer end of the latest-wins frame slot.
#[derive(Debug)]
pub struct FrameSink {
    frames: watch::Sender<Option<Frame>>,
    running: watch::Receiver<bool>,
}

impl FrameSink {
    /// Replace whatever frame is waiting. Never blocks.
    pub fn push(&self, frame: Frame) {
        self.frames.send_replace(Some(frame));
    }

    /// Whether frames would currently reach anyone.
    pub fn is_ready(&self) -> bool {
        *self.running.borrow()
    }

    /// The service side is gone for good.
    pub fn is_closed(&self) -> bool {
        self.frames.is_closed()
    }
}

// ============================================================================
// Service side
// ============================================================================

/// Receiving end, owned by the broadcast service.
#[derive(Debug)]
pub struct BridgeInbox {
    pub(crate) commands: mpsc::UnboundedReceiver<Command>,
    pub(crate) frames: watch::Receiver<Option<Frame>>,
    running: watch::Sender<bool>,
}

impl BridgeInbox {
    /// Publish whether the server is running to the handle and sink.
    pub fn set_running(&self, running: bool) {
        self.running.send_replace(running);
    }
}
