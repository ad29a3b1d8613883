//! Evaluation pipeline: metrics, grouping, scoring and planning.

use crate::aggregate::Analysis;
use crate::config::AnalyzerConfig;
use crate::consolidate::{plan_blocks, BlockPlan};
use crate::strategy::{score_threats, ScoredThreat};
use crate::threat::build_threat_groups;

/// Result of evaluating one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub entries_processed: usize,
    /// Distinct addresses seen.
    pub addresses: usize,
    /// Addresses above the rate threshold.
    pub suspicious: usize,
    /// Threat groups in score order.
    pub threats: Vec<ScoredThreat>,
    pub plan: BlockPlan,
}

impl AnalysisOutcome {
    /// Threats whose verdict allows blocking.
    pub fn blockable(&self) -> impl Iterator<Item = &ScoredThreat> {
        self.threats.iter().filter(|t| t.verdict.block)
    }
}

/// Evaluate an ingested analysis under `config`.
///
/// The plan is built regardless of `config.dry_run`; whether it is applied
/// is up to the caller.
pub fn execute(analysis: &Analysis, config: &AnalyzerConfig) -> AnalysisOutcome {
    let metrics = analysis.evaluate(config.rate_threshold);
    let addresses = metrics.len();
    let suspicious = metrics.iter().filter(|m| m.suspicious).count();

    let groups = build_threat_groups(metrics);
    let threats = score_threats(groups, config.strategy.strategy(), &config.thresholds);
    let plan = plan_blocks(&threats, config.top_n, config.block_duration_minutes);

    AnalysisOutcome {
        entries_processed: analysis.entries_processed(),
        addresses,
        suspicious,
        threats,
        plan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use crate::consolidate::BlockKind;
    use crate::enforce::{submit_plan, RecordingSink};
    use crate::strategy::StrategyKind;
    use botstats_schema::LogEntry;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::net::IpAddr;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn burst(analysis: &mut Analysis, ip: &str, count: i64, span_secs: i64) {
        let address: IpAddr = ip.parse().unwrap();
        for i in 0..count {
            let offset = i * span_secs / (count - 1).max(1);
            analysis.ingest(&LogEntry::new(address, t0() + Duration::seconds(offset)));
        }
    }

    // ===========================================
    // End-to-end Scenarios
    // ===========================================

    #[test]
    fn test_empty_analysis_no_threats() {
        let outcome = execute(&Analysis::new(), &AnalyzerConfig::new());

        assert_eq!(outcome.entries_processed, 0);
        assert!(outcome.threats.is_empty());
        assert!(outcome.plan.is_empty());
    }

    #[test]
    fn test_lone_member_becomes_single_address_block() {
        let mut analysis = Analysis::new();
        // A: 120 requests in 60s, danger 13.2; B: 5 requests in 600s
        burst(&mut analysis, "10.0.0.1", 120, 60);
        burst(&mut analysis, "10.0.0.2", 5, 600);

        let config = AnalyzerConfig::new().with_thresholds(
            StrategyConfig::default()
                .with_min_total_requests(100)
                .with_danger_threshold(10.0),
        );
        let outcome = execute(&analysis, &config);

        assert_eq!(outcome.addresses, 2);
        assert_eq!(outcome.suspicious, 1);
        assert_eq!(outcome.threats.len(), 1);
        assert!(!outcome.threats[0].group.is_subnet());
        assert_eq!(outcome.plan.len(), 1);
        assert_eq!(outcome.plan.blocks[0].kind, BlockKind::Address);
        assert_eq!(outcome.plan.blocks[0].target.to_string(), "10.0.0.1");
    }

    #[test]
    fn test_two_subnets_consolidate_into_supernet() {
        let mut analysis = Analysis::new();
        for ip in ["10.0.0.1", "10.0.0.2", "10.0.1.1", "10.0.1.2"] {
            burst(&mut analysis, ip, 300, 60);
        }

        let config = AnalyzerConfig::new().with_strategy(StrategyKind::VolumeDanger);
        let outcome = execute(&analysis, &config);

        assert_eq!(outcome.threats.len(), 2);
        assert_eq!(outcome.blockable().count(), 2);
        assert_eq!(outcome.plan.len(), 1);
        assert_eq!(outcome.plan.blocks[0].target.to_string(), "10.0.0.0/16");
        assert_eq!(outcome.plan.covered.len(), 2);

        let mut sink = RecordingSink::new();
        let summary = submit_plan(&outcome.plan, &mut sink, |_, _| {});
        assert_eq!(summary.submitted, 1);
        assert_eq!(sink.submitted()[0].to_string(), "10.0.0.0/16");
    }

    #[test]
    fn test_block_duration_flows_into_targets() {
        let mut analysis = Analysis::new();
        burst(&mut analysis, "203.0.113.5", 1_000, 60);

        let config = AnalyzerConfig::new().with_block_duration_minutes(15);
        let outcome = execute(&analysis, &config);

        assert_eq!(outcome.plan.blocks[0].target.duration_minutes, 15);
    }

    #[test]
    fn test_top_n_limits_individual_blocks() {
        let mut analysis = Analysis::new();
        for (i, ip) in ["1.1.1.1", "2.2.2.2", "3.3.3.3"].iter().enumerate() {
            burst(&mut analysis, ip, 1_000 + 100 * i as i64, 60);
        }

        let outcome = execute(&analysis, &AnalyzerConfig::new().with_top_n(2));

        let targets: Vec<String> = outcome
            .plan
            .blocks
            .iter()
            .map(|b| b.target.to_string())
            .collect();
        assert_eq!(targets, vec!["3.3.3.3", "2.2.2.2"]);
    }
}
