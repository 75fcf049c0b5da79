//! Async tmux integration module
//!
//! Provides the command surface the rest of the crate talks to:
//! - `Multiplexer` - The trait every component depends on
//! - `TmuxExecutor` - Semaphore-controlled async command execution
//! - `Pane` - One row of `list-panes` output
//! - `CONFIRM_KEY` and raw key sequence parsing

mod executor;
mod input;
mod multiplexer;
mod panes;

#[cfg(test)]
pub(crate) mod fake;

pub use executor::*;
pub use input::*;
pub use multiplexer::*;
pub use panes::*;
