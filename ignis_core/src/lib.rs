//! Platform plumbing shared by the protocol engine in `ignis_http`: the
//! edge-triggered event loop abstraction, server configuration, the
//! typed context bag, the TLS collaborator interface, and process-wide
//! counters.

pub mod config;
pub mod context;
pub mod metrics;
pub mod os;
pub mod tls;
