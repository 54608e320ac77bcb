//! Integration tests with mock HTTP server

pub mod error_handling;
pub mod mock_server;
pub mod streaming;
pub mod tools;
