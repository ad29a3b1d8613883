//! botstats analysis core.
//!
//! Turns an access log into a block plan:
//! - `scan` - windowed forward/reverse log reading, whitelist filtering
//! - `aggregate` - per-address request timestamps for one run
//! - `metrics` - request rate and danger score per address
//! - `threat` - grouping suspicious addresses by /24 (IPv4) or /64 (IPv6)
//! - `strategy` - interchangeable scoring and blocking policies
//! - `consolidate` - /16 consolidation and top-N selection
//! - `enforce` - submitting the plan to a rule sink

pub mod aggregate;
pub mod config;
pub mod consolidate;
pub mod enforce;
pub mod metrics;
pub mod pipeline;
pub mod prefix;
pub mod scan;
pub mod strategy;
pub mod threat;

pub use aggregate::{AddressRecord, Analysis};
pub use config::{AnalyzerConfig, StrategyConfig, Whitelist, WhitelistError};
pub use consolidate::{plan_blocks, BlockKind, BlockPlan, BlockStatus, PlannedBlock};
pub use enforce::{submit_plan, RecordingSink, RuleSink, RuleSinkError, SubmissionSummary};
pub use metrics::AddressMetric;
pub use pipeline::{execute, AnalysisOutcome};
pub use prefix::BlockTarget;
pub use scan::{ScanError, ScanStats, WindowedEntries};
pub use strategy::{ScoredThreat, StrategyKind, ThreatStrategy, UnknownStrategy, Verdict};
pub use threat::{SubnetThreat, ThreatGroup};
