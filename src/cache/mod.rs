pub mod codec;
pub mod coordinator;
pub mod entry;
pub mod registry;
pub mod store;

pub use coordinator::{FetchCoordinator, FetchMetrics};
pub use entry::{CacheEntry, FetchError, KeyState, Outcome};
pub use registry::{Claim, InFlightHandle, InFlightRegistry};
pub use store::{CacheStats, CacheStore};
