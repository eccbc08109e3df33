//! Connected WebSocket clients and non-blocking fan-out.
//!
//! ```text
//! publish --try_send--> [outbox: bounded] --> client thread <--> socket
//! ```
//!
//! Each client owns a thread draining a small bounded outbox, so
//! `broadcast` never blocks on a socket. Between messages the thread polls
//! the socket for a close frame or EOF. A full outbox means the client is
//! not keeping up: it is evicted and its socket hung up. A failed write or
//! a peer close makes the thread remove its own client.

use std::io::{self, Read, Write};
use std::mem;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use crate::debug;

/// Messages a client may lag behind before it is disconnected.
const OUTBOX_DEPTH: usize = 8;

/// How long `close_all` waits for clients to flush their close frames
/// before hanging up on them.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// How often a client thread checks its socket for incoming frames.
const READ_INTERVAL: Duration = Duration::from_millis(50);

/// Read timeout for registered sockets, so a check never stalls the outbox.
pub const READ_WAIT: Duration = Duration::from_millis(5);

/// Tears a client socket down from another thread, failing any read or
/// write blocked on it.
pub(crate) trait Hangup: Send + 'static {
    fn hang_up(&self);
}

impl Hangup for TcpStream {
    fn hang_up(&self) {
        let _ = self.shutdown(Shutdown::Both);
    }
}

struct Client {
    id: u64,
    outbox: Sender<Message>,
    hangup: Box<dyn Hangup>,
    thread: JoinHandle<()>,
}

struct Inner {
    clients: Vec<Client>,
    /// Threads of hung-up clients that may still be unwinding.
    evicted: Vec<JoinHandle<()>>,
    next_id: u64,
    accepting: bool,
}

impl Inner {
    fn evict(&mut self, client: Client) {
        client.hangup.hang_up();
        self.evicted.retain(|thread| !thread.is_finished());
        self.evicted.push(client.thread);
    }
}

/// Counts a client thread while it runs.
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(live))
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Set of connected clients shared by the acceptor and `publish`.
pub(crate) struct ClientSet {
    inner: Mutex<Inner>,
    live: Arc<AtomicUsize>,
}

impl ClientSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                clients: Vec::new(),
                evicted: Vec::new(),
                next_id: 1,
                accepting: false,
            }),
            live: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Start accepting registrations.
    pub fn open(&self) {
        self.inner.lock().accepting = true;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().clients.is_empty()
    }

    /// Client threads still running, including evicted ones.
    #[cfg(test)]
    pub fn live_threads(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Take ownership of an upgraded socket.
    ///
    /// Reads on `ws` must time out (see [`READ_WAIT`]). `hangup` must reach
    /// the same socket. Returns the client id, or `None` if the set is
    /// closed, in which case the socket is closed right away.
    pub fn register<S, H>(self: &Arc<Self>, mut ws: WebSocket<S>, hangup: H) -> Option<u64>
    where
        S: Read + Write + Send + 'static,
        H: Hangup,
    {
        let mut inner = self.inner.lock();
        if !inner.accepting {
            drop(inner);
            let _ = ws.close(None);
            let _ = ws.flush();
            return None;
        }

        let id = inner.next_id;
        inner.next_id += 1;

        let (outbox, queue) = channel::bounded(OUTBOX_DEPTH);
        let owner = Arc::downgrade(self);
        let live = LiveGuard::new(&self.live);
        let thread = thread::Builder::new()
            .name(format!("cardcast-ws-{id}"))
            .spawn(move || {
                let _live = live;
                run_client(id, ws, queue, owner);
            });

        match thread {
            Ok(thread) => {
                inner.clients.push(Client {
                    id,
                    outbox,
                    hangup: Box::new(hangup),
                    thread,
                });
                Some(id)
            }
            Err(e) => {
                crate::log!("ws"; "failed to spawn client thread: {}", e);
                hangup.hang_up();
                None
            }
        }
    }

    /// Queue `message` for every client without blocking.
    ///
    /// Returns how many clients it was queued for. Slow or dead clients are
    /// evicted.
    pub fn broadcast(&self, message: &Message) -> usize {
        let mut inner = self.inner.lock();
        if inner.clients.is_empty() {
            return 0;
        }

        let mut queued = 0;
        for client in mem::take(&mut inner.clients) {
            match client.outbox.try_send(message.clone()) {
                Ok(()) => {
                    queued += 1;
                    inner.clients.push(client);
                }
                Err(TrySendError::Full(_)) => {
                    debug!("ws"; "client {} too slow, disconnecting", client.id);
                    inner.evict(client);
                }
                Err(TrySendError::Disconnected(_)) => {
                    debug!("ws"; "client {} gone", client.id);
                    inner.evict(client);
                }
            }
        }
        queued
    }

    /// Stop accepting and send every client a close frame. Clients that do
    /// not finish within [`CLOSE_GRACE`] are hung up. Returns once every
    /// client thread has exited, with the number of clients closed.
    pub fn close_all(&self) -> usize {
        let (clients, evicted) = {
            let mut inner = self.inner.lock();
            inner.accepting = false;
            (mem::take(&mut inner.clients), mem::take(&mut inner.evicted))
        };
        let count = clients.len();

        for client in &clients {
            let _ = client.outbox.try_send(Message::Close(None));
        }

        let deadline = Instant::now() + CLOSE_GRACE;
        while clients.iter().any(|c| !c.thread.is_finished()) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        for client in clients {
            let Client {
                id,
                outbox,
                hangup,
                thread,
            } = client;
            drop(outbox);
            if !thread.is_finished() {
                debug!("ws"; "client {} did not close in time, hanging up", id);
                hangup.hang_up();
            }
            let _ = thread.join();
        }
        for thread in evicted {
            let _ = thread.join();
        }
        count
    }

    fn remove(&self, id: u64) {
        self.inner.lock().clients.retain(|client| client.id != id);
    }
}

fn run_client<S: Read + Write>(
    id: u64,
    mut ws: WebSocket<S>,
    queue: Receiver<Message>,
    owner: Weak<ClientSet>,
) {
    let mut last_read = Instant::now();
    loop {
        match queue.recv_timeout(READ_INTERVAL) {
            Ok(Message::Close(_)) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(message) => {
                if let Err(e) = ws.send(message) {
                    debug!("ws"; "client {} write failed: {}", id, e);
                    forget(&owner, id);
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
        }

        if last_read.elapsed() >= READ_INTERVAL {
            last_read = Instant::now();
            if poll_peer(id, &mut ws) == Peer::Gone {
                forget(&owner, id);
                return;
            }
        }
    }

    let _ = ws.close(None);
    let _ = ws.flush();
    debug!("ws"; "client {} closed", id);
}

#[derive(Debug, PartialEq, Eq)]
enum Peer {
    Open,
    Gone,
}

/// Drain what the peer sent. Overlay pages send nothing we use, so only a
/// close frame or a dead socket matters. Pings and close frames are
/// answered by tungstenite on flush.
fn poll_peer<S: Read + Write>(id: u64, ws: &mut WebSocket<S>) -> Peer {
    loop {
        match ws.read() {
            Ok(Message::Close(_)) => {
                let _ = ws.flush();
                debug!("ws"; "client {} disconnected", id);
                return Peer::Gone;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                return match ws.flush() {
                    Ok(()) => Peer::Open,
                    Err(_) => Peer::Gone,
                };
            }
            Err(e) => {
                debug!("ws"; "client {} dropped: {}", id, e);
                return Peer::Gone;
            }
        }
    }
}

fn forget(owner: &Weak<ClientSet>, id: u64) {
    if let Some(set) = owner.upgrade() {
        set.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicBool;
    use tungstenite::protocol::Role;

    /// In-memory socket. Reads come from `incoming` and otherwise time out.
    /// Writes fail once the pipe is broken and block while it is stalled.
    #[derive(Clone, Default)]
    struct MemSocket {
        incoming: Arc<Mutex<VecDeque<u8>>>,
        written: Arc<Mutex<Vec<u8>>>,
        broken: Arc<AtomicBool>,
        stalled: Arc<AtomicBool>,
    }

    impl MemSocket {
        fn new() -> Self {
            Self::default()
        }

        fn break_pipe(&self) {
            self.broken.store(true, Ordering::SeqCst);
        }

        fn stall(&self) {
            self.stalled.store(true, Ordering::SeqCst);
        }

        fn bytes_written(&self) -> usize {
            self.written.lock().len()
        }

        /// Queue a masked client frame with an empty payload.
        fn push_frame(&self, opcode: u8) {
            self.incoming
                .lock()
                .extend([0x80 | opcode, 0x80, 0x11, 0x22, 0x33, 0x44]);
        }
    }

    impl Hangup for MemSocket {
        fn hang_up(&self) {
            self.break_pipe();
        }
    }

    impl Read for MemSocket {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.broken.load(Ordering::SeqCst) {
                return Ok(0);
            }
            let mut incoming = self.incoming.lock();
            if incoming.is_empty() {
                drop(incoming);
                thread::sleep(READ_WAIT);
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = buf.len().min(incoming.len());
            for (slot, byte) in buf.iter_mut().zip(incoming.drain(..n)) {
                *slot = byte;
            }
            Ok(n)
        }
    }

    impl Write for MemSocket {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            while self.stalled.load(Ordering::SeqCst) && !self.broken.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
            if self.broken.load(Ordering::SeqCst) {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            self.written.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn socket(mem: &MemSocket) -> WebSocket<MemSocket> {
        WebSocket::from_raw_socket(mem.clone(), Role::Server, None)
    }

    fn register(set: &Arc<ClientSet>, mem: &MemSocket) -> Option<u64> {
        set.register(socket(mem), mem.clone())
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn test_broadcast_without_clients() {
        let set = ClientSet::new();
        set.open();
        assert_eq!(set.broadcast(&Message::text("hello")), 0);
    }

    #[test]
    fn test_register_requires_open() {
        let set = ClientSet::new();
        let mem = MemSocket::new();
        assert_eq!(register(&set, &mem), None);
        assert_eq!(set.len(), 0);
        assert_eq!(set.live_threads(), 0);
    }

    #[test]
    fn test_broadcast_reaches_client() {
        let set = ClientSet::new();
        set.open();
        let mem = MemSocket::new();
        assert_eq!(register(&set, &mem), Some(1));

        assert_eq!(set.broadcast(&Message::text("hello")), 1);
        assert!(wait_until(|| mem.bytes_written() >= "hello".len() + 2));
    }

    #[test]
    fn test_failed_write_prunes_client() {
        let set = ClientSet::new();
        set.open();
        let healthy = MemSocket::new();
        let broken = MemSocket::new();
        register(&set, &healthy);
        register(&set, &broken);
        broken.break_pipe();

        set.broadcast(&Message::text("one"));
        assert!(wait_until(|| set.len() == 1));
        assert_eq!(set.broadcast(&Message::text("two")), 1);
    }

    #[test]
    fn test_peer_close_removes_client_without_traffic() {
        let set = ClientSet::new();
        set.open();
        let mem = MemSocket::new();
        register(&set, &mem);

        mem.push_frame(0x8);
        assert!(wait_until(|| set.len() == 0));
        assert!(wait_until(|| set.live_threads() == 0));
        // The close reply: FIN + close opcode
        assert_eq!(mem.written.lock().first(), Some(&0x88));
    }

    #[test]
    fn test_ping_keeps_client() {
        let set = ClientSet::new();
        set.open();
        let mem = MemSocket::new();
        register(&set, &mem);

        mem.push_frame(0x9);
        // Pong: FIN + pong opcode
        assert!(wait_until(|| mem.written.lock().first() == Some(&0x8A)));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_slow_client_is_evicted_and_hung_up() {
        let set = ClientSet::new();
        set.open();
        let mem = MemSocket::new();
        register(&set, &mem);
        mem.stall();

        let mut sent = 0;
        while set.broadcast(&Message::text("frame")) == 1 {
            sent += 1;
            assert!(sent <= OUTBOX_DEPTH + 1, "outbox never filled");
        }
        assert_eq!(set.len(), 0);
        assert!(wait_until(|| set.live_threads() == 0));
    }

    #[test]
    fn test_close_all_hangs_up_blocked_clients() {
        let set = ClientSet::new();
        set.open();
        let idle = MemSocket::new();
        let blocked = MemSocket::new();
        register(&set, &idle);
        register(&set, &blocked);
        blocked.stall();
        set.broadcast(&Message::text("stuck"));

        let started = Instant::now();
        assert_eq!(set.close_all(), 2);
        assert!(started.elapsed() < CLOSE_GRACE + Duration::from_secs(1));
        assert_eq!(set.live_threads(), 0);
        assert!(blocked.broken.load(Ordering::SeqCst));
    }

    #[test]
    fn test_close_all_stops_accepting() {
        let set = ClientSet::new();
        set.open();
        let mem = MemSocket::new();
        register(&set, &mem);

        assert_eq!(set.close_all(), 1);
        assert_eq!(set.len(), 0);
        assert_eq!(register(&set, &MemSocket::new()), None);
        assert_eq!(set.broadcast(&Message::text("late")), 0);
    }
}
