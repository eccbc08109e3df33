//! Front door: the public listener, split between WebSocket clients and
//! HTTP.
//!
//! ```text
//!                        +--> Upgrade: websocket --> handshake --> ClientSet
//! TcpListener --peek-----+
//!                        +--> anything else --relay--> tiny_http (loopback)
//! ```
//!
//! WebSocket sockets stay in our hands so client threads can poll them and
//! `stop` can hang them up. Plain HTTP is relayed byte for byte to the
//! request loop.

use std::io;
use std::mem;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use parking_lot::Mutex;

use super::clients::{self, ClientSet};
use crate::{debug, log};

/// How often the acceptor checks for new connections and for `close`.
const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// Time a new connection gets to send its request head.
const HEAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest request head inspected when looking for an upgrade.
const HEAD_LIMIT: usize = 8 * 1024;

const PEEK_RETRY: Duration = Duration::from_millis(5);

/// State shared by the acceptor and its connection threads.
pub(super) struct Front {
    clients: Arc<ClientSet>,
    /// Address of the loopback tiny_http listener.
    upstream: SocketAddr,
    relays: Mutex<Relays>,
    closing: AtomicBool,
}

#[derive(Default)]
struct Relays {
    open: Vec<(u64, TcpStream)>,
    next_id: u64,
}

impl Front {
    pub fn new(clients: Arc<ClientSet>, upstream: SocketAddr) -> Arc<Self> {
        Arc::new(Self {
            clients,
            upstream,
            relays: Mutex::new(Relays::default()),
            closing: AtomicBool::new(false),
        })
    }

    /// Make the acceptor drop the listener on its next poll.
    pub fn close(&self) {
        self.closing.store(true, Ordering::SeqCst);
    }

    /// Hang up every relayed HTTP connection. Returns how many were open.
    pub fn close_relays(&self) -> usize {
        let open = mem::take(&mut self.relays.lock().open);
        for (_, stream) in &open {
            let _ = stream.shutdown(Shutdown::Both);
        }
        open.len()
    }

    fn track(&self, stream: &TcpStream) -> io::Result<u64> {
        let handle = stream.try_clone()?;
        let mut relays = self.relays.lock();
        let id = relays.next_id;
        relays.next_id += 1;
        relays.open.push((id, handle));
        Ok(id)
    }

    fn untrack(&self, id: u64) {
        self.relays.lock().open.retain(|(open, _)| *open != id);
    }
}

/// Accept on `listener` until [`Front::close`]. The listener is dropped,
/// and the port released, when the returned thread exits.
pub(super) fn spawn_acceptor(listener: TcpListener, front: Arc<Front>) -> io::Result<JoinHandle<()>> {
    listener.set_nonblocking(true)?;
    thread::Builder::new()
        .name("cardcast-accept".into())
        .spawn(move || run_acceptor(&listener, &front))
}

fn run_acceptor(listener: &TcpListener, front: &Arc<Front>) {
    while !front.closing.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let front = Arc::clone(front);
                let spawned = thread::Builder::new()
                    .name("cardcast-conn".into())
                    .spawn(move || {
                        if let Err(e) = handle_connection(stream, &front) {
                            debug!("serve"; "connection from {} failed: {}", peer, e);
                        }
                    });
                if let Err(e) = spawned {
                    log!("serve"; "failed to spawn connection thread: {}", e);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                debug!("serve"; "accept failed: {}", e);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
    debug!("serve"; "acceptor finished");
}

fn handle_connection(stream: TcpStream, front: &Front) -> Result<()> {
    // Accepted sockets may inherit the listener's non-blocking mode
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(HEAD_TIMEOUT))?;

    if peek_is_upgrade(&stream)? {
        accept_websocket(stream, front)
    } else {
        stream.set_read_timeout(None)?;
        relay(stream, front)
    }
}

/// Peek at the request head without consuming it.
fn peek_is_upgrade(stream: &TcpStream) -> io::Result<bool> {
    let mut buf = vec![0; HEAD_LIMIT];
    let deadline = Instant::now() + HEAD_TIMEOUT;
    loop {
        let n = stream.peek(&mut buf)?;
        let head = &buf[..n];
        if let Some(end) = find_head_end(head) {
            return Ok(wants_websocket(&head[..end]));
        }
        if n == 0 || n == buf.len() || Instant::now() >= deadline {
            return Ok(false);
        }
        thread::sleep(PEEK_RETRY);
    }
}

fn find_head_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Whether a request head asks for `Upgrade: websocket`.
fn wants_websocket(head: &[u8]) -> bool {
    let head = String::from_utf8_lossy(head);
    head.split("\r\n").skip(1).any(|line| {
        line.split_once(':').is_some_and(|(name, value)| {
            name.trim().eq_ignore_ascii_case("upgrade")
                && value
                    .split(',')
                    .any(|token| token.trim().eq_ignore_ascii_case("websocket"))
        })
    })
}

fn accept_websocket(stream: TcpStream, front: &Front) -> Result<()> {
    let hangup = stream.try_clone()?;
    let ws = tungstenite::accept(stream).map_err(|e| anyhow!("handshake failed: {e}"))?;
    ws.get_ref().set_read_timeout(Some(clients::READ_WAIT))?;

    match front.clients.register(ws, hangup) {
        Some(id) => debug!("ws"; "client {} connected (total: {})", id, front.clients.len()),
        None => debug!("ws"; "connection refused, server stopping"),
    }
    Ok(())
}

/// Pipe `client` to the request loop until either side closes.
fn relay(client: TcpStream, front: &Front) -> Result<()> {
    let upstream = TcpStream::connect(front.upstream)?;
    let id = front.track(&client)?;

    thread::scope(|s| {
        s.spawn(|| pipe(&client, &upstream));
        pipe(&upstream, &client);
    });

    front.untrack(id);
    Ok(())
}

fn pipe(mut from: &TcpStream, mut to: &TcpStream) {
    let _ = io::copy(&mut from, &mut to);
    let _ = to.shutdown(Shutdown::Write);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wants_websocket() {
        let upgrade = b"GET / HTTP/1.1\r\nHost: x\r\nConnection: Upgrade\r\nUpgrade: websocket";
        assert!(wants_websocket(upgrade));
        assert!(wants_websocket(b"GET / HTTP/1.1\r\nupgrade: WebSocket"));
        assert!(wants_websocket(b"GET / HTTP/1.1\r\nUpgrade: h2c, websocket"));

        assert!(!wants_websocket(b"GET /overlay HTTP/1.1\r\nHost: x"));
        assert!(!wants_websocket(b"GET / HTTP/1.1\r\nUpgrade: h2c"));
        // Only header lines count
        assert!(!wants_websocket(b"GET /upgrade:websocket HTTP/1.1\r\nHost: x"));
    }

    #[test]
    fn test_find_head_end() {
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\n\r\nbody"), Some(14));
        assert_eq!(find_head_end(b"GET / HTTP/1.1\r\nHost: x\r\n"), None);
        assert_eq!(find_head_end(b""), None);
    }

    #[test]
    fn test_peek_leaves_request_unread() {
        use std::io::{Read, Write};

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let request = b"GET /api/config HTTP/1.1\r\nHost: x\r\n\r\n";
        client.write_all(request).unwrap();

        let (mut stream, _) = listener.accept().unwrap();
        stream.set_read_timeout(Some(HEAD_TIMEOUT)).unwrap();
        assert!(!peek_is_upgrade(&stream).unwrap());

        let mut read = vec![0; request.len()];
        stream.read_exact(&mut read).unwrap();
        assert_eq!(read, request);
    }
}
