pub mod aggregate;
pub mod link_health;
pub mod registry;
pub mod sync;

pub use aggregate::{AggregatedCatalog, AggregatedItem};
pub use link_health::{LinkHealth, LinkHealthCache};
pub use registry::{AdapterFactory, DefaultAdapterFactory, ResourceRegistry};
pub use sync::{SyncOrchestrator, SyncOutcome};
