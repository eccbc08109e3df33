//! HTTP request loop and routing. WebSocket upgrades never get here, the
//! front door takes them first.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::Result;
use rayon::ThreadPool;
use tiny_http::{Method, Request, Server};

use super::response;
use crate::embed::overlay::{self, PageKind};
use crate::overlay::OverlayState;
use crate::{debug, log};

/// Handler threads. Requests are tiny; this only keeps one slow client from
/// holding up the others.
const HANDLER_THREADS: usize = 4;

/// What a request handler needs.
pub(super) struct Shared {
    pub state: Arc<OverlayState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Overlay(PageKind),
    CardData,
    Config,
}

impl Route {
    fn parse(url: &str) -> Option<Self> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let path = path.strip_suffix('/').filter(|p| !p.is_empty()).unwrap_or(path);
        match path {
            "/overlay" => Some(Self::Overlay(PageKind::Plain)),
            "/overlay-webcam" => Some(Self::Overlay(PageKind::Webcam)),
            "/api/card-data" => Some(Self::CardData),
            "/api/config" => Some(Self::Config),
            _ => None,
        }
    }
}

/// Run the request loop on its own thread until `server.unblock()`.
pub(super) fn spawn_request_loop(
    server: Arc<Server>,
    shared: Arc<Shared>,
) -> io::Result<JoinHandle<()>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(HANDLER_THREADS)
        .thread_name(|i| format!("cardcast-http-{i}"))
        .build()
        .map_err(io::Error::other)?;

    thread::Builder::new()
        .name("cardcast-serve".into())
        .spawn(move || run_request_loop(&server, &pool, &shared))
}

fn run_request_loop(server: &Server, pool: &ThreadPool, shared: &Arc<Shared>) {
    for request in server.incoming_requests() {
        let shared = Arc::clone(shared);
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &shared) {
                log!("serve"; "request error: {e}");
            }
        });
    }
    debug!("serve"; "request loop finished");
}

fn handle_request(request: Request, shared: &Shared) -> Result<()> {
    if !matches!(request.method(), Method::Get | Method::Head) {
        return response::respond_method_not_allowed(request);
    }

    match Route::parse(request.url()) {
        Some(Route::Overlay(kind)) => {
            let page = overlay::render(kind, &shared.state.card_data(), &shared.state.config());
            response::respond_html(request, page)
        }
        Some(Route::CardData) => response::respond_json(request, &*shared.state.card_data()),
        Some(Route::Config) => response::respond_json(request, &*shared.state.config()),
        None => response::respond_not_found(request),
    }
}
