//! Configuration section definitions.
//!
//! Each module corresponds to a section in `cardcast.toml`:
//!
//! | Module     | TOML Section   | Purpose                              |
//! |------------|----------------|--------------------------------------|
//! | `serve`    | `[serve]`      | Broadcast server interface and port  |
//! | `producer` | `[producer]`   | Video source, profile, initial crop  |
//! | `overlay`  | `[overlay]`    | Initial overlay layout               |

mod overlay;
mod producer;
mod serve;

pub use overlay::OverlaySection;
pub use producer::{CropSection, ProducerConfig, SourceSpec};
pub use serve::ServeConfig;
