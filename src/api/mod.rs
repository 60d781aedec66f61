//! HTTP surface: JSend envelopes over the file and folder services.

pub mod handlers;
pub mod identity;
pub mod response;
mod routes;

pub use routes::create_router;
