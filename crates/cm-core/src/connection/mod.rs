//! Connection lifecycle: driver seam, retrying connector, shared registry

mod connector;
mod redact;
mod registry;
mod traits;

pub use connector::{BackoffConnector, jitter_delay};
pub use redact::redact_endpoint;
pub use registry::ConnectionRegistry;
pub use traits::{DatabaseClient, Driver, SessionCollection};
