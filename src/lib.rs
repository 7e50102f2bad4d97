//! Library crate for port-scan-rs exposing the scanning engine and its HTTP surface.
pub mod config;
pub mod engine;
pub mod error;
pub mod ports;
pub mod probe;
pub mod report;
pub mod scanner;
pub mod server;
pub mod services;
pub mod store;
pub mod types;
