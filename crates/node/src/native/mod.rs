//! Native side of the node: configuration, HTTP endpoint, HTTP transport and DNS discovery.
pub mod config;
pub mod discovery;
pub mod endpoint;
pub mod transport;
