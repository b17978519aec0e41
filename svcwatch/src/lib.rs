//! Library surface for the svcwatch client: watchlist projection, pinned
//! chart buffers and the push-stream reconciler, plus the HTTP client and
//! app loop the binary is built from.

pub mod api;
pub mod app;
pub mod config;
pub mod events;
pub mod history;
pub mod pins;
pub mod sse;
pub mod state;
pub mod stream;
pub mod types;
pub mod watchlist;

pub use app::{App, Command};
pub use state::Dashboard;
pub use stream::{ConnectionState, Reconciler, StreamSignal, Subscription};
