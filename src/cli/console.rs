//! Operator console: one command per stdin line.

use std::sync::Arc;

use thiserror::Error;
use tokio::runtime::Runtime;

use crate::bridge::BridgeHandle;
use crate::crop::{CropEditor, CropRegion, DisplaySize, Point};
use crate::overlay::{CardDataPatch, OverlayConfigPatch};
use crate::producer::ProducerControls;
use crate::server::ServerUrls;
use crate::log;

pub const HELP: &str = "\
commands:
  start [port]                       start serving (default port from config)
  stop                               stop serving and release the port
  status                             print server status
  card <json>                        update card data, e.g. card {\"name\":\"Black Lotus\"}
  config <json>                      update overlay config, e.g. config {\"anchor\":\"center\"}
  crop <x> <y> <w> <h>               crop video to a region in source pixels
  crop clear                         send the full frame
  select <x1> <y1> <x2> <y2> <w> <h> crop from a selection on a preview drawn at w x h
  video on|off                       enable or pause video capture
  preview on|off                     show or hide the local preview
  help                               show this list
  quit                               stop everything and exit";

#[derive(Debug, Error, PartialEq)]
pub enum ConsoleError {
    #[error("unknown command `{0}`, try `help`")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("{0}")]
    Crop(#[from] crate::crop::CropError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Start(Option<u16>),
    Stop,
    Status,
    Card(CardDataPatch),
    Config(OverlayConfigPatch),
    Crop(CropRegion),
    CropClear,
    Select {
        from: Point,
        to: Point,
        display: DisplaySize,
    },
    Video(bool),
    Preview(bool),
    Help,
    Quit,
}

/// Parse one console line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>, ConsoleError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word {
        "" => return Ok(None),
        "start" if rest.is_empty() => ConsoleCommand::Start(None),
        "start" => ConsoleCommand::Start(Some(
            rest.parse().map_err(|_| ConsoleError::Usage("start [port]"))?,
        )),
        "stop" => ConsoleCommand::Stop,
        "status" => ConsoleCommand::Status,
        "card" => ConsoleCommand::Card(parse_json(rest)?),
        "config" => ConsoleCommand::Config(parse_json(rest)?),
        "crop" if rest == "clear" => ConsoleCommand::CropClear,
        "crop" => {
            let [x, y, w, h] = numbers::<u32, 4>(rest, "crop <x> <y> <w> <h> | crop clear")?;
            ConsoleCommand::Crop(CropRegion::new(x, y, w, h)?)
        }
        "select" => {
            let [x1, y1, x2, y2, w, h] =
                numbers::<f64, 6>(rest, "select <x1> <y1> <x2> <y2> <display_w> <display_h>")?;
            ConsoleCommand::Select {
                from: Point::new(x1, y1),
                to: Point::new(x2, y2),
                display: DisplaySize::new(w, h),
            }
        }
        "video" => ConsoleCommand::Video(on_off(rest, "video on|off")?),
        "preview" => ConsoleCommand::Preview(on_off(rest, "preview on|off")?),
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => return Err(ConsoleError::Unknown(other.to_owned())),
    };
    Ok(Some(command))
}

fn parse_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, ConsoleError> {
    serde_json::from_str(raw).map_err(|e| ConsoleError::Json(e.to_string()))
}

fn numbers<T: std::str::FromStr + Copy + Default, const N: usize>(
    raw: &str,
    usage: &'static str,
) -> Result<[T; N], ConsoleError> {
    let mut out = [T::default(); N];
    let mut parts = raw.split_whitespace();
    for slot in &mut out {
        *slot = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or(ConsoleError::Usage(usage))?;
    }
    if parts.next().is_some() {
        return Err(ConsoleError::Usage(usage));
    }
    Ok(out)
}

fn on_off(raw: &str, usage: &'static str) -> Result<bool, ConsoleError> {
    match raw {
        "on" => Ok(true),
        "off" => Ok(false),
        _ => Err(ConsoleError::Usage(usage)),
    }
}

/// Whether the console loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Executes console commands against the running host.
pub struct Operator<'rt> {
    runtime: &'rt Runtime,
    bridge: BridgeHandle,
    controls: Arc<ProducerControls>,
    editor: CropEditor,
}

impl<'rt> Operator<'rt> {
    pub fn new(runtime: &'rt Runtime, bridge: BridgeHandle, controls: Arc<ProducerControls>) -> Self {
        let mut editor = CropEditor::new(false);
        if let Some(region) = controls.crop() {
            editor.set_region(region);
        }
        Self {
            runtime,
            bridge,
            controls,
            editor,
        }
    }

    /// Parse and run one line.
    pub fn handle_line(&mut self, line: &str) -> Flow {
        match parse_line(line) {
            Ok(Some(command)) => self.execute(command),
            Ok(None) => Flow::Continue,
            Err(e) => {
                log!("console"; "{}", e);
                Flow::Continue
            }
        }
    }

    pub fn execute(&mut self, command: ConsoleCommand) -> Flow {
        match command {
            ConsoleCommand::Start(port) => match self.runtime.block_on(self.bridge.start(port)) {
                Ok(urls) => print_urls(&urls),
                Err(e) => log!("error"; "{}", crate::server::error_chain(&e)),
            },
            ConsoleCommand::Stop => match self.runtime.block_on(self.bridge.stop()) {
                Ok(()) => log!("serve"; "stopped"),
                Err(e) => log!("error"; "{}", e),
            },
            ConsoleCommand::Status => self.print_status(),
            ConsoleCommand::Card(patch) => {
                match self.runtime.block_on(self.bridge.update_card_data(patch)) {
                    Ok(card) => log!("console"; "card: {} {}", card.name, card.price),
                    Err(e) => log!("error"; "{}", e),
                }
            }
            ConsoleCommand::Config(patch) => {
                match self.runtime.block_on(self.bridge.update_config(patch)) {
                    Ok(config) => log!(
                        "console";
                        "overlay: {} ({}, {})", config.anchor, config.offset_x, config.offset_y
                    ),
                    Err(e) => log!("error"; "{}", e),
                }
            }
            ConsoleCommand::Crop(region) => {
                self.editor.set_region(region);
                self.controls.set_crop(Some(region));
                log!("crop"; "{}", region);
            }
            ConsoleCommand::CropClear => {
                self.editor.clear();
                self.controls.set_crop(None);
                log!("crop"; "cleared");
            }
            ConsoleCommand::Select { from, to, display } => self.select(from, to, display),
            ConsoleCommand::Video(enabled) => {
                self.controls.set_enabled(enabled);
                log!("frame"; "video {}", if enabled { "on" } else { "off" });
            }
            ConsoleCommand::Preview(visible) => {
                self.editor.set_preview_visible(visible);
                log!("console"; "preview {}", if self.editor.preview_visible() { "on" } else { "off" });
            }
            ConsoleCommand::Help => println!("{HELP}"),
            ConsoleCommand::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    fn select(&mut self, from: Point, to: Point, display: DisplaySize) {
        let Some(source) = self.controls.source_size() else {
            log!("crop"; "no frame captured yet, source size unknown");
            return;
        };

        self.editor.begin();
        self.editor.press(from);
        self.editor.drag(to);
        self.editor.release();
        match self.editor.commit(display, source) {
            Some(region) => {
                self.controls.set_crop(Some(region));
                log!("crop"; "{}", region);
            }
            None => log!("crop"; "selection too small, cancelled"),
        }
    }

    fn print_status(&self) {
        let status = match self.runtime.block_on(self.bridge.status()) {
            Ok(status) => status,
            Err(e) => {
                log!("error"; "{}", e);
                return;
            }
        };
        match serde_json::to_string_pretty(&status) {
            Ok(json) => println!("{json}"),
            Err(e) => log!("error"; "{}", e),
        }

        let crop = self
            .controls
            .crop()
            .map_or_else(|| "none".to_owned(), |region| region.to_string());
        log!(
            "console";
            "video {}, crop {}, preview {}",
            if self.controls.is_enabled() { "on" } else { "off" },
            crop,
            if self.editor.preview_visible() { "on" } else { "off" }
        );
    }
}

pub fn print_urls(urls: &ServerUrls) {
    log!("serve"; "overlay: {}", urls.overlay);
    log!("serve"; "webcam overlay: {}", urls.webcam_overlay);
}
