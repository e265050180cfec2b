//! Proxy agent: validates operator configuration, dials the proxy server
//! over mutually-authenticated TLS, and exposes a local admin HTTP surface
//! (`/healthz`, `/ready`, `/metrics`) for orchestration platforms.

pub mod admin;
pub mod agent;
pub mod metrics;
pub mod options;
