//! Lifecycle-core configuration.

/// Configuration for the lifecycle services.
#[derive(Debug, Clone)]
pub struct CaConfig {
    /// Upper bound on one publish delivery attempt in milliseconds
    /// (default: 10_000). A timeout counts as a failed attempt.
    pub delivery_timeout_ms: u64,
    /// First retry delay after a failed delivery in milliseconds
    /// (default: 1_000).
    pub retry_initial_delay_ms: u64,
    /// Cap on the retry delay in milliseconds (default: 60_000).
    pub retry_max_delay_ms: u64,
    /// Multiplier applied to the retry delay per attempt
    /// (default: 2.0).
    pub retry_multiplier: f64,
    /// CRL retention count for new CAs that do not specify one
    /// (default: 30).
    pub default_num_crls: u32,
    /// CA certificate validity in days for new CAs that do not specify
    /// one (default: 365).
    pub default_expiration_period_days: u32,
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: 10_000,
            retry_initial_delay_ms: 1_000,
            retry_max_delay_ms: 60_000,
            retry_multiplier: 2.0,
            default_num_crls: 30,
            default_expiration_period_days: 365,
        }
    }
}
