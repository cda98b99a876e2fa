//! Provisioner implementations: the HTTP client that talks to the real
//! provisioning API, and a log-only stand-in for local runs.

pub mod http;
pub mod log;

pub use http::HttpProvisioner;
pub use log::LogProvisioner;
