//! Multiplex gateway: the client-facing surface
//!
//! - `Connection` - One client's subscriptions and frame dispatch
//! - `ClientFrame` / `ServerFrame` - The JSON wire protocol
//! - `router` / `serve` - axum routes for `/ws`, `/api` and static files

pub mod api;
mod connection;
mod frames;
mod server;

pub use connection::*;
pub use frames::*;
pub use server::*;
