//! Backscroll replay tool
//!
//! Loads a room export, imports session keys, then drives a [`Timeline`]
//! through the initial sync and backward pagination exactly as a client
//! would, with history pages served from the export instead of a homeserver.
//!
//! [`Timeline`]: backscroll_timeline::Timeline

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod export;
mod render;
mod replay;

pub use error::CliError;
pub use export::{ExportedProfile, FixtureTransport, RoomExport};
pub use render::{render_row, render_timeline};
pub use replay::{ReplayOutcome, paginate, replay};
