//! REST JSON interface.
//!
//! The API is transport independent: a server adapter turns its HTTP request
//! into an [`ApiRequest`], calls [`Router::handle`] and writes the returned
//! [`ApiResponse`] back. Every JSON body uses the envelope
//! `{success, message, data?, errors?}`.

pub mod envelope;
mod handlers;
mod request;
mod router;

pub use envelope::{status_for, Envelope};
pub use request::{ApiRequest, ApiResponse, Method};
pub use router::Router;

/// Header carrying the acting user's id.
pub const ACTOR_HEADER: &str = "x-user-id";
