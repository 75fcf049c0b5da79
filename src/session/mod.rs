//! Session tracking module
//!
//! - `SessionRegistry` - Owns every live session and its output bridge
//! - `SessionMeta` / `SessionView` - Stored records and derived listings
//! - `classify` - Status from idle time and foreground command

mod preview;
mod registry;
mod status;
mod types;

pub use preview::*;
pub use registry::*;
pub use status::*;
pub use types::*;
