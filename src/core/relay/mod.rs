//! Realtime relay core.
//!
//! This module contains the provider-facing half of the relay: frame
//! classification, the upstream session client, and the connector trait
//! that lets tests replace the network transport. The per-client state
//! machine that drives these types lives in `handlers::relay`.

mod base;
mod frame;
mod upstream;

pub use base::{
    ABNORMAL_CLOSE_CODE, NORMAL_CLOSE_CODE, RelayError, RelayResult, UPSTREAM_CHANNEL_CAPACITY,
    UpstreamConfig, UpstreamConnector, UpstreamEvent, UpstreamHandle,
};
pub use frame::{RelayFrame, SESSION_CREATE_TYPE};
pub use upstream::{OPENAI_REALTIME_URL, RealtimeConnector};
