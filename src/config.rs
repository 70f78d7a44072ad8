/**
 * Configuration constants for the fetch cache and its subscribers
 */
/// User agent sent by the HTTP transport when none is configured
pub const DEFAULT_USER_AGENT: &str = concat!("fetchcache/", env!("CARGO_PKG_VERSION"));

/// Default tracing filter for the preload driver
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Configuration for one cache context
#[derive(Debug, Clone, Default)]
pub struct CacheConfig {
    /// User agent header for outbound requests; invalid values fall back to the default
    pub user_agent: Option<String>,
}

impl CacheConfig {
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Validate configuration constants at compile time
const _: () = {
    assert!(!DEFAULT_USER_AGENT.is_empty(), "DEFAULT_USER_AGENT must not be empty");
    assert!(!DEFAULT_LOG_FILTER.is_empty(), "DEFAULT_LOG_FILTER must not be empty");
};
