//! Blocking strategies.
//!
//! A strategy scores a [`ThreatGroup`] and decides whether it may be blocked.
//! Strategies are pure: the same group and config always yield the same
//! [`Verdict`]. Every strategy refuses groups below the total-request floor.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::config::StrategyConfig;
use crate::threat::ThreatGroup;

/// Outcome of evaluating one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub score: f64,
    pub block: bool,
    pub reason: String,
}

/// A threat group together with its verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredThreat {
    pub group: ThreatGroup,
    pub verdict: Verdict,
}

/// Scores threat groups and decides blockability.
pub trait ThreatStrategy: Send + Sync {
    /// Configuration key, e.g. `volume_danger`.
    fn name(&self) -> &'static str;

    /// One-line human description.
    fn description(&self) -> &'static str;

    fn evaluate(&self, group: &ThreatGroup, config: &StrategyConfig) -> Verdict;
}

/// The built-in strategies, selectable by key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    VolumeDanger,
    VolumeCoordination,
    VolumePeakRpm,
    Combined,
    PeakTotalRpm,
    CoordinatedSustained,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::VolumeDanger,
        StrategyKind::VolumeCoordination,
        StrategyKind::VolumePeakRpm,
        StrategyKind::Combined,
        StrategyKind::PeakTotalRpm,
        StrategyKind::CoordinatedSustained,
    ];

    /// The implementation behind this key.
    pub fn strategy(self) -> &'static dyn ThreatStrategy {
        match self {
            StrategyKind::VolumeDanger => &VolumeDanger,
            StrategyKind::VolumeCoordination => &VolumeCoordination,
            StrategyKind::VolumePeakRpm => &VolumePeakRpm,
            StrategyKind::Combined => &Combined,
            StrategyKind::PeakTotalRpm => &PeakTotalRpm,
            StrategyKind::CoordinatedSustained => &CoordinatedSustained,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.strategy().name()
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized strategy key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown strategy '{0}' (expected one of: volume_danger, volume_coordination, volume_peak_rpm, combined, peak_total_rpm, coordinated_sustained)")]
pub struct UnknownStrategy(pub String);

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StrategyKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownStrategy(s.to_string()))
    }
}

/// Check shared by every strategy: `Some(verdict)` when the group is refused
/// for low volume.
fn below_floor(group: &ThreatGroup, config: &StrategyConfig, score: f64) -> Option<Verdict> {
    let requests = group.total_requests();
    (requests < config.min_total_requests).then(|| Verdict {
        score,
        block: false,
        reason: format!(
            "total requests {requests} below minimum {}",
            config.min_total_requests
        ),
    })
}

fn check(label: &str, passed: bool, value: impl fmt::Display, threshold: impl fmt::Display) -> String {
    let cmp = if passed { ">=" } else { "<" };
    format!("{label} {value} {cmp} {threshold}")
}

// ===========================================
// Built-in strategies
// ===========================================

/// Score by aggregate danger.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeDanger;

impl ThreatStrategy for VolumeDanger {
    fn name(&self) -> &'static str {
        "volume_danger"
    }

    fn description(&self) -> &'static str {
        "aggregate danger score of the group"
    }

    fn evaluate(&self, group: &ThreatGroup, config: &StrategyConfig) -> Verdict {
        let danger = group.danger_score();
        if let Some(refused) = below_floor(group, config, danger) {
            return refused;
        }
        let block = danger >= config.danger_threshold;
        Verdict {
            score: danger,
            block,
            reason: check("danger", block, format!("{danger:.2}"), config.danger_threshold),
        }
    }
}

/// Score by number of distinct addresses.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeCoordination;

impl ThreatStrategy for VolumeCoordination {
    fn name(&self) -> &'static str {
        "volume_coordination"
    }

    fn description(&self) -> &'static str {
        "number of distinct suspicious addresses in the group"
    }

    fn evaluate(&self, group: &ThreatGroup, config: &StrategyConfig) -> Verdict {
        let members = group.member_count();
        let score = members as f64;
        if let Some(refused) = below_floor(group, config, score) {
            return refused;
        }
        let block = members >= config.member_count_threshold;
        Verdict {
            score,
            block,
            reason: check("members", block, members, config.member_count_threshold),
        }
    }
}

/// Score by the highest individual request rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolumePeakRpm;

impl ThreatStrategy for VolumePeakRpm {
    fn name(&self) -> &'static str {
        "volume_peak_rpm"
    }

    fn description(&self) -> &'static str {
        "highest requests per minute of any single member"
    }

    fn evaluate(&self, group: &ThreatGroup, config: &StrategyConfig) -> Verdict {
        let peak = group.peak_member_rate();
        if let Some(refused) = below_floor(group, config, peak) {
            return refused;
        }
        let block = peak >= config.peak_member_rate_threshold;
        Verdict {
            score: peak,
            block,
            reason: check(
                "peak member rpm",
                block,
                format!("{peak:.2}"),
                config.peak_member_rate_threshold,
            ),
        }
    }
}

/// Danger and coordination, normalized by their thresholds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Combined;

impl ThreatStrategy for Combined {
    fn name(&self) -> &'static str {
        "combined"
    }

    fn description(&self) -> &'static str {
        "danger and member count, each relative to its threshold"
    }

    fn evaluate(&self, group: &ThreatGroup, config: &StrategyConfig) -> Verdict {
        let danger = group.danger_score();
        let members = group.member_count();
        let score = ratio(danger, config.danger_threshold)
            + ratio(members as f64, config.member_count_threshold as f64);
        if let Some(refused) = below_floor(group, config, score) {
            return refused;
        }

        let danger_ok = danger >= config.danger_threshold;
        let members_ok = members >= config.member_count_threshold;
        Verdict {
            score,
            block: danger_ok || members_ok,
            reason: format!(
                "{}, {}",
                check("danger", danger_ok, format!("{danger:.2}"), config.danger_threshold),
                check("members", members_ok, members, config.member_count_threshold)
            ),
        }
    }
}

fn ratio(value: f64, threshold: f64) -> f64 {
    if threshold > 0.0 {
        value / threshold
    } else {
        value
    }
}

/// Score by the busiest minute across the whole group.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeakTotalRpm;

impl ThreatStrategy for PeakTotalRpm {
    fn name(&self) -> &'static str {
        "peak_total_rpm"
    }

    fn description(&self) -> &'static str {
        "requests in the group's busiest minute"
    }

    fn evaluate(&self, group: &ThreatGroup, config: &StrategyConfig) -> Verdict {
        let peak = group.peak_group_rate();
        if let Some(refused) = below_floor(group, config, peak) {
            return refused;
        }
        let block = peak >= config.peak_group_rate_threshold;
        Verdict {
            score: peak,
            block,
            reason: check(
                "peak total rpm",
                block,
                format!("{peak:.0}"),
                config.peak_group_rate_threshold,
            ),
        }
    }
}

/// Many members sustaining a high combined rate for a long time.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinatedSustained;

impl ThreatStrategy for CoordinatedSustained {
    fn name(&self) -> &'static str {
        "coordinated_sustained"
    }

    fn description(&self) -> &'static str {
        "average group rate times member count, over a minimum activity span"
    }

    fn evaluate(&self, group: &ThreatGroup, config: &StrategyConfig) -> Verdict {
        let members = group.member_count();
        let average = group.average_group_rate();
        let span = group.activity_span_secs();
        let score = average * members as f64;
        if let Some(refused) = below_floor(group, config, score) {
            return refused;
        }

        let members_ok = members >= config.member_count_threshold;
        let average_ok = average >= config.average_group_rate_threshold;
        let span_ok = span >= config.min_activity_span_secs;
        Verdict {
            score,
            block: members_ok && average_ok && span_ok,
            reason: format!(
                "{}, {}, {}",
                check("members", members_ok, members, config.member_count_threshold),
                check(
                    "avg total rpm",
                    average_ok,
                    format!("{average:.2}"),
                    config.average_group_rate_threshold
                ),
                check(
                    "span",
                    span_ok,
                    format!("{span}s"),
                    format!("{}s", config.min_activity_span_secs)
                )
            ),
        }
    }
}

/// Evaluate every group and order by score, highest first.
///
/// The sort is stable, so equal scores keep the incoming (danger) order.
pub fn score_threats(
    groups: Vec<ThreatGroup>,
    strategy: &dyn ThreatStrategy,
    config: &StrategyConfig,
) -> Vec<ScoredThreat> {
    let mut scored: Vec<ScoredThreat> = groups
        .into_iter()
        .map(|group| {
            let verdict = strategy.evaluate(&group, config);
            ScoredThreat { group, verdict }
        })
        .collect();
    scored.sort_by(|a, b| b.verdict.score.total_cmp(&a.verdict.score));
    scored
}
