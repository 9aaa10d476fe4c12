//! Driver implementations

mod memory;
mod mongo;

pub use memory::{MemoryClient, MemoryDriver};
pub use mongo::{MongoClient, MongoDriver};

use std::sync::Arc;

use crate::connection::Driver;

/// Endpoint scheme served by [`MemoryDriver`]
pub const MEMORY_SCHEME: &str = "memory://";

/// Pick a driver for an endpoint: `memory://` stays in process, anything else
/// goes to MongoDB
pub fn driver_for(endpoint: &str) -> Arc<dyn Driver> {
    if endpoint.starts_with(MEMORY_SCHEME) {
        Arc::new(MemoryDriver::new())
    } else {
        Arc::new(MongoDriver::new())
    }
}
