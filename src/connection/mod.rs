// src/connection/mod.rs

//! The client-connection layer: a unified stream type over plain TCP and
//! TLS, wrapped with traffic counting that feeds the node counters.

mod counting;

pub use counting::{AnyStream, CountingStream, IN_TRAFFIC_BYTES, OUT_TRAFFIC_BYTES};
