//! Analyzer configuration and whitelist.

use std::collections::HashSet;
use std::net::IpAddr;

use ipnet::IpNet;

use crate::strategy::StrategyKind;

/// Default requests-per-minute above which an address is suspicious.
pub const DEFAULT_RATE_THRESHOLD: f64 = 100.0;

/// Default minimum total requests before any group may be blocked.
pub const DEFAULT_MIN_TOTAL_REQUESTS: usize = 100;

/// Default minimum aggregate danger score (`volume_danger`, `combined`).
pub const DEFAULT_DANGER_THRESHOLD: f64 = 50.0;

/// Default minimum distinct addresses (`volume_coordination`, `combined`,
/// `coordinated_sustained`).
pub const DEFAULT_MEMBER_COUNT_THRESHOLD: usize = 10;

/// Default minimum peak per-address rate (`volume_peak_rpm`).
pub const DEFAULT_PEAK_MEMBER_RATE_THRESHOLD: f64 = 62.0;

/// Default minimum busiest-minute rate for a whole group (`peak_total_rpm`).
pub const DEFAULT_PEAK_GROUP_RATE_THRESHOLD: f64 = 62.0;

/// Default minimum average rate for a whole group (`coordinated_sustained`).
pub const DEFAULT_AVERAGE_GROUP_RATE_THRESHOLD: f64 = 60.0;

/// Default minimum first-to-last activity span (`coordinated_sustained`).
pub const DEFAULT_MIN_ACTIVITY_SPAN_SECS: i64 = 1800;

/// Default number of top-scored threats considered for individual blocks.
pub const DEFAULT_TOP_N: usize = 10;

/// Default block duration in minutes.
pub const DEFAULT_BLOCK_DURATION_MINUTES: u64 = 60;

/// Thresholds consumed by the blocking strategies.
///
/// Each strategy reads only the thresholds it combines; `min_total_requests`
/// gates every strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub min_total_requests: usize,
    pub danger_threshold: f64,
    pub member_count_threshold: usize,
    pub peak_member_rate_threshold: f64,
    pub peak_group_rate_threshold: f64,
    pub average_group_rate_threshold: f64,
    pub min_activity_span_secs: i64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_total_requests: DEFAULT_MIN_TOTAL_REQUESTS,
            danger_threshold: DEFAULT_DANGER_THRESHOLD,
            member_count_threshold: DEFAULT_MEMBER_COUNT_THRESHOLD,
            peak_member_rate_threshold: DEFAULT_PEAK_MEMBER_RATE_THRESHOLD,
            peak_group_rate_threshold: DEFAULT_PEAK_GROUP_RATE_THRESHOLD,
            average_group_rate_threshold: DEFAULT_AVERAGE_GROUP_RATE_THRESHOLD,
            min_activity_span_secs: DEFAULT_MIN_ACTIVITY_SPAN_SECS,
        }
    }
}

impl StrategyConfig {
    /// Builder: set the base total-request floor.
    pub fn with_min_total_requests(mut self, floor: usize) -> Self {
        self.min_total_requests = floor;
        self
    }

    /// Builder: set the aggregate danger threshold.
    pub fn with_danger_threshold(mut self, threshold: f64) -> Self {
        self.danger_threshold = threshold;
        self
    }

    /// Builder: set the distinct-member threshold.
    pub fn with_member_count_threshold(mut self, threshold: usize) -> Self {
        self.member_count_threshold = threshold;
        self
    }

    /// Builder: set the peak per-member rate threshold.
    pub fn with_peak_member_rate_threshold(mut self, threshold: f64) -> Self {
        self.peak_member_rate_threshold = threshold;
        self
    }

    /// Builder: set the peak group rate threshold.
    pub fn with_peak_group_rate_threshold(mut self, threshold: f64) -> Self {
        self.peak_group_rate_threshold = threshold;
        self
    }

    /// Builder: set the average group rate threshold.
    pub fn with_average_group_rate_threshold(mut self, threshold: f64) -> Self {
        self.average_group_rate_threshold = threshold;
        self
    }

    /// Builder: set the minimum activity span.
    pub fn with_min_activity_span_secs(mut self, secs: i64) -> Self {
        self.min_activity_span_secs = secs;
        self
    }
}

/// Configuration for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub rate_threshold: f64,
    pub strategy: StrategyKind,
    pub thresholds: StrategyConfig,
    pub top_n: usize,
    pub block_duration_minutes: u64,
    pub dry_run: bool,
    pub whitelist: Whitelist,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            rate_threshold: DEFAULT_RATE_THRESHOLD,
            strategy: StrategyKind::default(),
            thresholds: StrategyConfig::default(),
            top_n: DEFAULT_TOP_N,
            block_duration_minutes: DEFAULT_BLOCK_DURATION_MINUTES,
            dry_run: false,
            whitelist: Whitelist::empty(),
        }
    }
}

impl AnalyzerConfig {
    /// Create a config with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the suspicious-rate threshold.
    pub fn with_rate_threshold(mut self, threshold: f64) -> Self {
        self.rate_threshold = threshold;
        self
    }

    /// Builder: set the blocking strategy.
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.strategy = strategy;
        self
    }

    /// Builder: set strategy thresholds.
    pub fn with_thresholds(mut self, thresholds: StrategyConfig) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Builder: set top-N.
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Builder: set block duration in minutes.
    pub fn with_block_duration_minutes(mut self, minutes: u64) -> Self {
        self.block_duration_minutes = minutes;
        self
    }

    /// Builder: set dry-run.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Builder: set whitelist.
    pub fn with_whitelist(mut self, whitelist: Whitelist) -> Self {
        self.whitelist = whitelist;
        self
    }
}

/// Addresses and networks that are never analyzed or blocked.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    addresses: HashSet<IpAddr>,
    networks: Vec<IpNet>,
}

impl Whitelist {
    /// Create an empty whitelist.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a single address.
    pub fn add_address(&mut self, address: IpAddr) {
        self.addresses.insert(address);
    }

    /// Add a network; host bits are cleared.
    pub fn add_network(&mut self, network: IpNet) {
        self.networks.push(network.trunc());
    }

    /// Parse and add an address such as `10.0.0.1` or `2001:db8::1`.
    pub fn add_address_str(&mut self, s: &str) -> Result<(), WhitelistError> {
        let address: IpAddr = s
            .parse()
            .map_err(|_| WhitelistError::InvalidAddress(s.to_string()))?;
        self.add_address(address);
        Ok(())
    }

    /// Parse and add a network such as `192.168.0.0/16`.
    pub fn add_network_str(&mut self, s: &str) -> Result<(), WhitelistError> {
        let network: IpNet = s
            .parse()
            .map_err(|_| WhitelistError::InvalidNetwork(s.to_string()))?;
        self.add_network(network);
        Ok(())
    }

    /// Parse and add either form, deciding by the presence of `/`.
    pub fn add_entry_str(&mut self, s: &str) -> Result<(), WhitelistError> {
        if s.contains('/') {
            self.add_network_str(s)
        } else {
            self.add_address_str(s)
        }
    }

    /// Whether the address is whitelisted exactly or by network containment.
    pub fn contains(&self, address: &IpAddr) -> bool {
        self.addresses.contains(address) || self.networks.iter().any(|net| net.contains(address))
    }

    /// Check if the whitelist is empty.
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty() && self.networks.is_empty()
    }

    /// Number of entries (addresses plus networks).
    pub fn len(&self) -> usize {
        self.addresses.len() + self.networks.len()
    }

    /// Count of individual addresses.
    pub fn address_count(&self) -> usize {
        self.addresses.len()
    }

    /// Count of networks.
    pub fn network_count(&self) -> usize {
        self.networks.len()
    }
}

/// Errors from whitelist parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WhitelistError {
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),
    #[error("invalid CIDR notation: {0}")]
    InvalidNetwork(String),
}
