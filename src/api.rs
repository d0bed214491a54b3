//! HTTP API for the chat front end.
//!
//! Chat turns, conversation CRUD, and the signed-in user's file records.
//! Identity comes from a header set by the hosted auth layer in front of us.

mod auth;
mod chat;
mod conversations;
mod error;
mod files;
mod server;
mod state;

pub use error::ApiError;
pub use server::{router, start_http_server};
pub use state::ApiState;
