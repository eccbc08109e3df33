//! Broadcast Service - the actor that owns the [`BroadcastServer`].
//!
//! ```text
//! BridgeHandle --Command--> +------------------+ --publish--> clients
//! FrameSink ----Frame-----> | BroadcastService |
//!                           +------------------+ --running--> FrameSink
//! ```
//!
//! Commands are handled strictly in arrival order and take priority over
//! frames. Only the newest waiting frame is ever forwarded.

use std::net::IpAddr;

use tokio::task::block_in_place;

use crate::bridge::{BridgeInbox, Command};
use crate::server::{BroadcastServer, ServerEvent};
use crate::{debug, log};

pub struct BroadcastService {
    server: BroadcastServer,
    interface: IpAddr,
    inbox: BridgeInbox,
}

impl BroadcastService {
    pub fn new(server: BroadcastServer, interface: IpAddr, inbox: BridgeInbox) -> Self {
        Self {
            server,
            interface,
            inbox,
        }
    }

    /// Run until `Shutdown` or until every handle is dropped.
    ///
    /// Needs a multi-threaded runtime: start and stop block on sockets and
    /// threads.
    pub async fn run(mut self) {
        let mut frames_open = true;
        loop {
            tokio::select! {
                biased;

                command = self.inbox.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },

                changed = self.inbox.frames.changed(), if frames_open => match changed {
                    Ok(()) => self.forward_frame(),
                    Err(_) => {
                        debug!("frame"; "producer gone");
                        frames_open = false;
                    }
                },
            }
        }

        block_in_place(|| self.server.stop());
        self.inbox.set_running(false);
        debug!("serve"; "broadcast service exited");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Start { port, reply } => {
                let port = port.unwrap_or_else(|| self.server.state().config().port);
                let interface = self.interface;
                let result = block_in_place(|| self.server.start(interface, port));
                self.inbox.set_running(self.server.is_running());
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                block_in_place(|| self.server.stop());
                self.inbox.set_running(false);
                let _ = reply.send(());
            }
            Command::UpdateCardData { patch, reply } => {
                let _ = reply.send(self.server.update_card_data(&patch));
            }
            Command::UpdateConfig { patch, reply } => {
                let result = self.server.update_config(&patch);
                if let Err(e) = &result {
                    log!("serve"; "config update rejected: {}", e);
                }
                let _ = reply.send(result);
            }
            Command::GetStatus { reply } => {
                let _ = reply.send(self.server.status());
            }
            Command::Shutdown => {}
        }
    }

    fn forward_frame(&mut self) {
        let frame = self.inbox.frames.borrow_and_update().clone();
        if let Some(frame) = frame
            && self.server.is_running()
        {
            self.server.publish(&ServerEvent::FrameReady(frame));
        }
    }
}
