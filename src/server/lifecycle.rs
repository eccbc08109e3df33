//! Binding and releasing the listening port.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::thread;
use std::time::Duration;

use super::ServerError;

/// Attempts made by [`wait_for_release`].
const RELEASE_POLLS: u32 = 40;
const RELEASE_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Bind `addr`. Port 0 picks a free port; read it back from the listener.
pub fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })
}

/// Wait until `addr` can be bound again, or give up after about a second.
pub fn wait_for_release(addr: SocketAddr) -> bool {
    for _ in 0..RELEASE_POLLS {
        match TcpListener::bind(addr) {
            Ok(_) => return true,
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => thread::sleep(RELEASE_POLL_INTERVAL),
            Err(_) => return false,
        }
    }
    false
}
