//! Coalescing fetch cache with a producer-to-consumer handoff.
//!
//! Many callers asking for the same URL share one in-flight fetch. Settled
//! results live in a [`cache::CacheStore`] that can be encoded on a producer
//! (a server rendering a page) and hydrated on a consumer (the browser side),
//! so the consumer never repeats a fetch the producer already did.

pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod subscription;
pub mod transport;

pub use cache::{CacheEntry, CacheStore, FetchCoordinator, FetchError, KeyState, Outcome};
pub use context::CacheContext;
pub use subscription::{FetchState, Subscription, SubscriptionAdapter};
pub use transport::{HttpTransport, Transport, TransportResponse};
