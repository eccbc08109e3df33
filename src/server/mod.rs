//! Broadcast Server - HTTP pages, JSON snapshots and WebSocket fan-out on
//! one listener.
//!
//! ```text
//!                                +--> Upgrade: websocket --> ClientSet --> thread per client
//! TcpListener --> front door ----+
//!                                +--> relay --> tiny_http --> GET /overlay, /overlay-webcam (HTML)
//!                                                         --> GET /api/card-data, /api/config (JSON)
//! ```
//!
//! The server is an owned value with an explicit lifecycle:
//! `Stopped -> Starting -> Running -> Stopping -> Stopped`.
//!
//! # Module Structure
//!
//! - `clients` - connected sockets and non-blocking fan-out
//! - `front` - accept loop, WebSocket handshake, HTTP relay
//! - `lifecycle` - bind and port release
//! - `message` - events and their JSON wire format
//! - `response` - HTTP response helpers
//! - `routes` - HTTP request loop and routing

mod clients;
mod front;
mod lifecycle;
mod message;
mod response;
mod routes;

pub use message::ServerEvent;

use std::io;
use std::mem;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::thread::JoinHandle;

use serde::Serialize;
use thiserror::Error;
use tiny_http::Server;
use tungstenite::protocol::Message;

use crate::overlay::{CardData, CardDataPatch, OverlayConfig, OverlayConfigPatch, OverlayState, StateError};
use crate::{debug, log};
use clients::ClientSet;
use front::Front;
use routes::Shared;

/// Lifecycle failures, returned to whoever asked for the transition.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server is already running on port {port}")]
    AlreadyRunning { port: u16 },

    #[error("failed to bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to start server threads")]
    Spawn(#[source] io::Error),
}

/// Where the overlay pages can be opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerUrls {
    pub overlay: String,
    pub webcam_overlay: String,
}

impl ServerUrls {
    pub fn for_port(port: u16) -> Self {
        Self {
            overlay: format!("http://localhost:{port}/overlay"),
            webcam_overlay: format!("http://localhost:{port}/overlay-webcam"),
        }
    }
}

/// Snapshot of the server for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    pub running: bool,
    /// Bound port while running, otherwise the configured one.
    pub port: u16,
    pub urls: ServerUrls,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Observable lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

struct RunningServer {
    addr: SocketAddr,
    front: Arc<Front>,
    acceptor: JoinHandle<()>,
    http: Arc<Server>,
    request_loop: JoinHandle<()>,
}

enum Lifecycle {
    Stopped,
    Starting,
    Running(RunningServer),
    Stopping,
}

/// The overlay server and the state it publishes.
pub struct BroadcastServer {
    state: Arc<OverlayState>,
    clients: Arc<ClientSet>,
    lifecycle: Lifecycle,
    last_error: Option<String>,
}

impl BroadcastServer {
    pub fn new(state: Arc<OverlayState>) -> Self {
        Self {
            state,
            clients: ClientSet::new(),
            lifecycle: Lifecycle::Stopped,
            last_error: None,
        }
    }

    pub fn state(&self) -> &Arc<OverlayState> {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        match self.lifecycle {
            Lifecycle::Stopped => Phase::Stopped,
            Lifecycle::Starting => Phase::Starting,
            Lifecycle::Running(_) => Phase::Running,
            Lifecycle::Stopping => Phase::Stopping,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Running(_))
    }

    /// Bound address while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.lifecycle {
            Lifecycle::Running(running) => Some(running.addr),
            _ => None,
        }
    }

    /// Bind `interface:port` and start serving.
    ///
    /// Port 0 binds an ephemeral port. On failure the server stays `Stopped`
    /// and the error is kept for [`status`](Self::status).
    pub fn start(&mut self, interface: IpAddr, port: u16) -> Result<ServerUrls, ServerError> {
        if let Some(addr) = self.local_addr() {
            return Err(ServerError::AlreadyRunning { port: addr.port() });
        }

        self.lifecycle = Lifecycle::Starting;
        match self.launch(SocketAddr::new(interface, port)) {
            Ok(running) => {
                let urls = ServerUrls::for_port(running.addr.port());
                log!("serve"; "http://{}", running.addr);
                self.last_error = None;
                self.lifecycle = Lifecycle::Running(running);
                Ok(urls)
            }
            Err(e) => {
                log!("serve"; "{}", error_chain(&e));
                self.last_error = Some(error_chain(&e));
                self.lifecycle = Lifecycle::Stopped;
                Err(e)
            }
        }
    }

    fn launch(&self, addr: SocketAddr) -> Result<RunningServer, ServerError> {
        let listener = lifecycle::bind(addr)?;
        let addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        // tiny_http sits behind the front door on a loopback port
        let internal = lifecycle::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0))?;
        let upstream = internal
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;
        let http = Server::from_listener(internal, None).map_err(|e| ServerError::Bind {
            addr: upstream,
            source: io::Error::other(e),
        })?;
        let http = Arc::new(http);
        let shared = Arc::new(Shared {
            state: Arc::clone(&self.state),
        });
        let request_loop =
            routes::spawn_request_loop(Arc::clone(&http), shared).map_err(ServerError::Spawn)?;

        self.clients.open();
        let front = Front::new(Arc::clone(&self.clients), upstream);
        let acceptor = match front::spawn_acceptor(listener, Arc::clone(&front)) {
            Ok(handle) => handle,
            Err(e) => {
                self.clients.close_all();
                http.unblock();
                let _ = request_loop.join();
                return Err(ServerError::Spawn(e));
            }
        };

        Ok(RunningServer {
            addr,
            front,
            acceptor,
            http,
            request_loop,
        })
    }

    /// Close every client, stop serving and release the port.
    ///
    /// Clients that do not take their close frame in time are hung up, so
    /// this never waits on a stuck socket. Does nothing unless running.
    pub fn stop(&mut self) {
        let running = match mem::replace(&mut self.lifecycle, Lifecycle::Stopping) {
            Lifecycle::Running(running) => running,
            other => {
                self.lifecycle = other;
                return;
            }
        };

        // Joining the acceptor drops the listener
        running.front.close();
        let _ = running.acceptor.join();

        let closed = self.clients.close_all();
        let relays = running.front.close_relays();
        running.http.unblock();
        let _ = running.request_loop.join();
        drop(running.http);
        if !lifecycle::wait_for_release(running.addr) {
            debug!("serve"; "port {} still busy after stop", running.addr.port());
        }

        self.lifecycle = Lifecycle::Stopped;
        debug!("serve"; "{} http connections dropped", relays);
        log!("serve"; "stopped ({} clients closed)", closed);
    }

    /// Send `event` to every connected client.
    ///
    /// Returns the number of clients it was queued for. Never blocks on a
    /// socket, and per-client failures only prune that client.
    pub fn publish(&self, event: &ServerEvent) -> usize {
        if self.clients.is_empty() {
            return 0;
        }

        let json = match event.to_wire().to_json() {
            Ok(json) => json,
            Err(e) => {
                log!("ws"; "failed to serialize message: {}", e);
                return 0;
            }
        };
        let sent = self.clients.broadcast(&Message::text(json));
        if !matches!(event, ServerEvent::FrameReady(_)) {
            debug!("ws"; "broadcast to {} clients", sent);
        }
        sent
    }

    /// Merge `patch` into the card data and publish the result.
    pub fn update_card_data(&self, patch: &CardDataPatch) -> Arc<CardData> {
        let card = self.state.apply_card_data(patch);
        self.publish(&ServerEvent::CardDataChanged(Arc::clone(&card)));
        card
    }

    /// Merge `patch` into the config and publish the result.
    ///
    /// An invalid patch is rejected and nothing is published.
    pub fn update_config(&self, patch: &OverlayConfigPatch) -> Result<Arc<OverlayConfig>, StateError> {
        let config = self.state.apply_config(patch)?;
        self.publish(&ServerEvent::ConfigChanged(Arc::clone(&config)));
        Ok(config)
    }

    pub fn status(&self) -> ServerStatus {
        let port = self
            .local_addr()
            .map_or_else(|| self.state.config().port, |addr| addr.port());
        ServerStatus {
            running: self.is_running(),
            port,
            urls: ServerUrls::for_port(port),
            error: self.last_error.clone(),
        }
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

impl Drop for BroadcastServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// `error: cause: cause` on one line.
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::io::{Read, Write};
    use std::net::{Ipv4Addr, TcpListener, TcpStream};
    use std::thread;
    use std::time::{Duration, Instant};
    use tungstenite::Error as WsError;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn server() -> BroadcastServer {
        BroadcastServer::new(Arc::new(OverlayState::default()))
    }

    fn started() -> (BroadcastServer, u16) {
        let mut server = server();
        server.start(LOCALHOST, 0).unwrap();
        let port = server.local_addr().unwrap().port();
        (server, port)
    }

    fn http(port: u16, method: &str, path: &str) -> String {
        let mut stream = TcpStream::connect((LOCALHOST, port)).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        write!(
            stream,
            "{method} {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
        )
        .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    type Client = tungstenite::WebSocket<TcpStream>;

    fn connect(server: &BroadcastServer, port: u16) -> Client {
        let before = server.client_count();
        let stream = TcpStream::connect((LOCALHOST, port)).unwrap();
        let (ws, _) = tungstenite::client(format!("ws://127.0.0.1:{port}/"), stream).unwrap();
        ws.get_ref()
            .set_read_timeout(Some(Duration::from_millis(300)))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while server.client_count() == before && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(server.client_count(), before + 1);
        ws
    }

    fn is_timeout(result: &Result<Message, WsError>) -> bool {
        matches!(
            result,
            Err(WsError::Io(e)) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
        )
    }

    fn read_json(ws: &mut Client) -> Value {
        match ws.read().unwrap() {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_start_while_running_is_rejected() {
        let (mut server, port) = started();
        let err = server.start(LOCALHOST, 0).unwrap_err();
        assert!(matches!(err, ServerError::AlreadyRunning { port: p } if p == port));

        // The running instance is untouched
        assert_eq!(server.local_addr().unwrap().port(), port);
        assert!(http(port, "GET", "/api/config").starts_with("HTTP/1.1 200"));
        server.stop();
    }

    #[test]
    fn test_stop_when_stopped_is_noop() {
        let mut server = server();
        server.stop();
        server.stop();
        assert_eq!(server.phase(), Phase::Stopped);
        assert!(!server.status().running);
    }

    #[test]
    fn test_publish_without_clients() {
        let (server, _) = started();
        let event = ServerEvent::CardDataChanged(server.state().card_data());
        assert_eq!(server.publish(&event), 0);
        assert_eq!(server.client_count(), 0);
    }

    #[test]
    fn test_restart_on_same_port() {
        let (mut server, port) = started();
        for _ in 0..3 {
            server.stop();
            assert_eq!(server.phase(), Phase::Stopped);
            server.start(LOCALHOST, port).unwrap();
            assert_eq!(server.local_addr().unwrap().port(), port);
        }
        server.stop();
    }

    #[test]
    fn test_bind_failure_leaves_server_stopped() {
        let holder = TcpListener::bind((LOCALHOST, 0)).unwrap();
        let port = holder.local_addr().unwrap().port();

        let mut server = server();
        let err = server.start(LOCALHOST, port).unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
        assert_eq!(server.phase(), Phase::Stopped);

        let status = server.status();
        assert!(!status.running);
        assert!(status.error.is_some());

        // A later successful start clears the error
        drop(holder);
        server.start(LOCALHOST, port).unwrap();
        assert!(server.status().error.is_none());
        server.stop();
    }

    #[test]
    fn test_status() {
        let (mut server, port) = started();
        let status = server.status();
        assert!(status.running);
        assert_eq!(status.port, port);
        assert_eq!(status.urls.overlay, format!("http://localhost:{port}/overlay"));

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["urls"]["webcamOverlay"], format!("http://localhost:{port}/overlay-webcam"));
        assert!(json.get("error").is_none());

        server.stop();
        assert_eq!(server.status().port, 3030);
    }

    #[test]
    fn test_http_routes() {
        let (server, port) = started();

        let card = http(port, "GET", "/api/card-data");
        assert!(card.starts_with("HTTP/1.1 200"));
        assert!(card.contains("Access-Control-Allow-Origin: *"));
        assert!(card.contains(r#""name":"Black Lotus""#));

        let config = http(port, "GET", "/api/config");
        assert!(config.contains(r#""anchor":"top-left""#));

        let page = http(port, "GET", "/overlay-webcam");
        assert!(page.contains("text/html"));
        assert!(page.contains("webcam-feed"));

        let head = http(port, "HEAD", "/overlay");
        assert!(head.starts_with("HTTP/1.1 200"));
        assert!(!head.contains("<!DOCTYPE html>"));

        assert!(http(port, "GET", "/missing").starts_with("HTTP/1.1 404"));
        assert!(http(port, "POST", "/api/config").starts_with("HTTP/1.1 405"));
        drop(server);
    }

    #[test]
    fn test_updates_work_while_stopped() {
        let server = server();
        let card = server.update_card_data(&CardDataPatch {
            price: Some("$1".into()),
            ..CardDataPatch::default()
        });
        assert_eq!(card.price, "$1");
        assert_eq!(server.state().card_data().price, "$1");
    }

    #[test]
    fn test_invalid_config_is_not_published() {
        let (server, port) = started();
        let mut ws = connect(&server, port);

        let patch: OverlayConfigPatch = serde_json::from_str(r#"{"anchor":"invalid"}"#).unwrap();
        assert!(server.update_config(&patch).is_err());
        assert!(is_timeout(&ws.read()));
        assert_eq!(*server.state().config(), OverlayConfig::default());
    }

    #[test]
    fn test_card_update_reaches_client_once() {
        let mut server = server();
        // Prefer the documented port, fall back if something else holds it
        match server.start(LOCALHOST, 9000) {
            Ok(_) => {}
            Err(ServerError::Bind { .. }) => {
                server.start(LOCALHOST, 0).unwrap();
            }
            Err(e) => panic!("{e}"),
        }
        let port = server.local_addr().unwrap().port();
        let mut ws = connect(&server, port);

        let patch: CardDataPatch =
            serde_json::from_str(r#"{"name":"Mox Sapphire","price":"$12,000"}"#).unwrap();
        server.update_card_data(&patch);

        ws.get_ref()
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let message = read_json(&mut ws);
        assert_eq!(message["type"], "card-data");
        assert_eq!(message["payload"]["name"], "Mox Sapphire");
        assert_eq!(message["payload"]["price"], "$12,000");
        assert_eq!(message["payload"]["set"], "Alpha");

        ws.get_ref()
            .set_read_timeout(Some(Duration::from_millis(300)))
            .unwrap();
        assert!(is_timeout(&ws.read()));
        server.stop();
    }

    #[test]
    fn test_config_and_frames_fan_out() {
        let (server, port) = started();
        let mut first = connect(&server, port);
        let mut second = connect(&server, port);

        let patch: OverlayConfigPatch =
            serde_json::from_str(r#"{"anchor":"center","customCss":".x{}"}"#).unwrap();
        server.update_config(&patch).unwrap();

        let frame = crate::producer::Frame::new(vec![1, 2, 3], "image/jpeg", (1, 1), Instant::now());
        assert_eq!(server.publish(&ServerEvent::FrameReady(frame)), 2);

        for ws in [&mut first, &mut second] {
            ws.get_ref()
                .set_read_timeout(Some(Duration::from_secs(2)))
                .unwrap();
            let config = read_json(ws);
            assert_eq!(config["type"], "config");
            assert_eq!(config["payload"]["anchor"], "center");
            let frame = read_json(ws);
            assert_eq!(frame["type"], "video-frame");
            assert_eq!(frame["payload"], "data:image/jpeg;base64,AQID");
        }
    }

    #[test]
    fn test_stop_closes_clients() {
        let (mut server, port) = started();
        let mut ws = connect(&server, port);
        ws.get_ref()
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        server.stop();
        assert_eq!(server.client_count(), 0);

        let result = ws.read();
        assert!(!is_timeout(&result), "client was not closed");
        assert!(matches!(result, Ok(Message::Close(_)) | Err(_)));
    }

    #[test]
    fn test_disconnected_client_is_pruned() {
        let (server, port) = started();
        let ws = connect(&server, port);
        drop(ws);

        // Writes to a closed socket fail within a few messages
        let deadline = Instant::now() + Duration::from_secs(5);
        while server.client_count() > 0 && Instant::now() < deadline {
            server.update_card_data(&CardDataPatch::default());
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(server.client_count(), 0);
    }

    #[test]
    fn test_client_close_is_noticed_without_traffic() {
        let (server, port) = started();
        let mut ws = connect(&server, port);
        ws.close(None).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while server.client_count() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(server.client_count(), 0);

        // The server answers the closing handshake
        ws.get_ref()
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let reply = ws.read();
        assert!(!is_timeout(&reply), "no close reply");
        assert!(matches!(reply, Ok(Message::Close(_))));
    }

    #[test]
    fn test_stop_hangs_up_stalled_client() {
        let (mut server, port) = started();
        // Never reads, so writes to it block once the socket buffers fill
        let _stalled = connect(&server, port);

        let frame = crate::producer::Frame::new(vec![0; 4 << 20], "image/jpeg", (1, 1), Instant::now());
        for _ in 0..6 {
            server.publish(&ServerEvent::FrameReady(frame.clone()));
        }
        thread::sleep(Duration::from_millis(200));

        let started = Instant::now();
        server.stop();
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(server.client_count(), 0);
        assert_eq!(server.clients.live_threads(), 0);

        // The port is free again
        TcpListener::bind((LOCALHOST, port)).unwrap();
    }

    #[test]
    fn test_http_and_websocket_share_the_port() {
        let (server, port) = started();
        let mut ws = connect(&server, port);

        assert!(http(port, "GET", "/api/card-data").starts_with("HTTP/1.1 200"));
        server.update_card_data(&CardDataPatch {
            name: Some("Time Walk".into()),
            ..CardDataPatch::default()
        });

        ws.get_ref()
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        assert_eq!(read_json(&mut ws)["payload"]["name"], "Time Walk");
    }
}
