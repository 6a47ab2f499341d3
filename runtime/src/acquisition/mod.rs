//! HTTP acquisition layer: the injected transport and request pacing.
//!
//! Everything above this module talks to upstream feature services only
//! through the [`http_client::Transport`] trait, so tests and embedders can
//! substitute their own client.

pub mod http_client;
pub mod rate_limiter;
