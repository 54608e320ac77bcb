//! Upstream HTTP transport

pub mod http;

pub use http::{HttpTransport, TransportError};
