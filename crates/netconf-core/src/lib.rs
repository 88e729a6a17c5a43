//! Core NETCONF definitions shared by the protocol and client crates.
//!
//! This crate holds the capability URIs and XML namespaces of the base
//! protocol, the hello negotiation rule, and the tracing setup used by the
//! `netconf` binary.

pub mod capability;
pub mod tracing;

pub use capability::{
    BASE_1_0, BASE_1_1, NETCONF_NS, NOTIFICATION_NS, Negotiated, default_capabilities, negotiate,
};
pub use tracing::{
    SESSION_TARGET, TracingConfig, TracingError, TracingOutputFormat, WIRE_TARGET, init_tracing,
};
