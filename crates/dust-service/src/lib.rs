//! HTTP API service for the DUST ledger.
//!
//! Wires the durable store, the coordination store, the transaction
//! processor, the collaborator clients, and the background reconciler into
//! an axum application.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod apps;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod ledger;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use ledger::{ConsumeArgs, GrantArgs, Ledger, Receipt};
pub use routes::create_router;
pub use state::AppState;
