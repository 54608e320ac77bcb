//! 补全代理客户端：连接池、超时、重试与流式聚合。
//!
//! Completion proxy client.
//!
//! Keep the public surface small and predictable: a [`CompletionClient`] built once,
//! shared by reference, and the [`CompletionBackend`] seam the tool layer depends on.
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod core;
mod error_classification;
mod execution;
mod metrics;
mod policy;
mod preflight;

pub use builder::CompletionClientBuilder;
pub use self::core::{CompletionBackend, CompletionClient};
pub use metrics::PerformanceStats;
