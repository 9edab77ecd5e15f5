// Library interface for gsc-exporter
// This allows integration tests to access the modules

pub mod aggregate;
pub mod auth;
pub mod error;
pub mod fetch;
pub mod metrics;
pub mod network;
pub mod options;
pub mod report;
pub mod runner;
pub mod sitekey;
pub mod storage;
pub mod utils;
pub mod windows;
