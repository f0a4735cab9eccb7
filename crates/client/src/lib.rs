//! Gateway client and connection lifecycle management.
//!
//! Provides the transport seam to the messaging gateway, a WebSocket
//! implementation of it, the bounded-backoff retry policy, and the
//! lifecycle manager that keeps one connection alive across transient
//! drops until the session is logged out or retries run out.

pub mod gateway;
pub mod lifecycle;
pub mod messages;
pub mod reconnect;
pub mod transport;
