//! API layer
//!
//! HTTP handlers for:
//! - ActivityPub (for federation)
//! - Metrics (Prometheus)

mod activitypub;
pub mod metrics;

pub use activitypub::inbox_router;
pub use metrics::metrics_router;
