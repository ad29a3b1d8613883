//! Grouping suspicious addresses into threats.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

use ipnet::IpNet;
use serde::Serialize;

use crate::metrics::AddressMetric;
use crate::prefix::containing_prefix;

/// Two or more suspicious addresses sharing a grouping prefix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubnetThreat {
    pub prefix: IpNet,
    /// Sorted by danger score, highest first.
    pub members: Vec<AddressMetric>,
    pub total_requests: usize,
    pub danger_score: f64,
}

impl SubnetThreat {
    fn new(prefix: IpNet, mut members: Vec<AddressMetric>) -> Self {
        sort_by_danger(&mut members);
        Self {
            prefix,
            total_requests: members.iter().map(|m| m.total_requests).sum(),
            danger_score: members.iter().map(|m| m.danger_score).sum(),
            members,
        }
    }
}

/// The unit a blocking decision is made on.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreatGroup {
    Subnet(SubnetThreat),
    Single(AddressMetric),
}

impl ThreatGroup {
    /// The prefix (subnet) or host network (single address) this group covers.
    pub fn target(&self) -> IpNet {
        match self {
            ThreatGroup::Subnet(subnet) => subnet.prefix,
            ThreatGroup::Single(metric) => IpNet::from(metric.address),
        }
    }

    pub fn is_subnet(&self) -> bool {
        matches!(self, ThreatGroup::Subnet(_))
    }

    pub fn danger_score(&self) -> f64 {
        match self {
            ThreatGroup::Subnet(subnet) => subnet.danger_score,
            ThreatGroup::Single(metric) => metric.danger_score,
        }
    }

    pub fn total_requests(&self) -> usize {
        match self {
            ThreatGroup::Subnet(subnet) => subnet.total_requests,
            ThreatGroup::Single(metric) => metric.total_requests,
        }
    }

    /// Member metrics, highest danger first.
    pub fn members(&self) -> &[AddressMetric] {
        match self {
            ThreatGroup::Subnet(subnet) => &subnet.members,
            ThreatGroup::Single(metric) => std::slice::from_ref(metric),
        }
    }

    pub fn member_count(&self) -> usize {
        self.members().len()
    }

    /// The single member's address, if there is exactly one.
    pub fn sole_address(&self) -> Option<IpAddr> {
        match self.members() {
            [only] => Some(only.address),
            _ => None,
        }
    }

    /// Highest individual request rate among members.
    pub fn peak_member_rate(&self) -> f64 {
        self.members().iter().map(|m| m.rate).fold(0.0, f64::max)
    }

    /// Seconds from the first to the last request across all members.
    pub fn activity_span_secs(&self) -> i64 {
        let members = self.members();
        let first = members.iter().map(|m| m.first_seen).min();
        let last = members.iter().map(|m| m.last_seen).max();
        match (first, last) {
            (Some(first), Some(last)) => last - first,
            _ => 0,
        }
    }

    /// Requests in the busiest minute, summed over all members.
    pub fn peak_group_rate(&self) -> f64 {
        let mut combined: BTreeMap<i64, u64> = BTreeMap::new();
        for member in self.members() {
            for (minute, count) in &member.minute_counts {
                *combined.entry(*minute).or_insert(0) += count;
            }
        }
        combined.values().copied().max().unwrap_or(0) as f64
    }

    /// Total requests per minute over the group's activity span; 0 for a zero span.
    pub fn average_group_rate(&self) -> f64 {
        let span = self.activity_span_secs();
        if span <= 0 {
            return 0.0;
        }
        self.total_requests() as f64 / (span as f64 / 60.0)
    }
}

fn sort_by_danger(metrics: &mut [AddressMetric]) {
    metrics.sort_by(|a, b| {
        b.danger_score
            .total_cmp(&a.danger_score)
            .then_with(|| a.address.cmp(&b.address))
    });
}

/// Group suspicious metrics by containing prefix.
///
/// Prefixes with one member become [`ThreatGroup::Single`]; others become
/// [`ThreatGroup::Subnet`]. Non-suspicious metrics are ignored. The result is
/// sorted by danger score, highest first, ties by target.
pub fn build_threat_groups(metrics: Vec<AddressMetric>) -> Vec<ThreatGroup> {
    let mut by_prefix: HashMap<IpNet, Vec<AddressMetric>> = HashMap::new();
    for metric in metrics.into_iter().filter(|m| m.suspicious) {
        by_prefix
            .entry(containing_prefix(metric.address))
            .or_default()
            .push(metric);
    }

    let mut groups: Vec<ThreatGroup> = by_prefix
        .into_iter()
        .map(|(prefix, mut members)| {
            if members.len() == 1 {
                ThreatGroup::Single(members.remove(0))
            } else {
                ThreatGroup::Subnet(SubnetThreat::new(prefix, members))
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        b.danger_score()
            .total_cmp(&a.danger_score())
            .then_with(|| a.target().cmp(&b.target()))
    });
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Analysis;
    use botstats_schema::LogEntry;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::collections::HashSet;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    /// `count` requests from `ip` spread evenly over `span_secs`, starting at `start_secs`.
    fn burst(analysis: &mut Analysis, ip: &str, count: i64, span_secs: i64, start_secs: i64) {
        let address: IpAddr = ip.parse().unwrap();
        for i in 0..count {
            let offset = start_secs + i * span_secs / (count - 1).max(1);
            analysis.ingest(&LogEntry::new(address, t0() + Duration::seconds(offset)));
        }
    }

    // ===========================================
    // Grouping
    // ===========================================

    #[test]
    fn test_lone_suspicious_member_is_single() {
        // A: 120 requests in 60s. B: 5 requests in 600s. Same /24.
        let mut analysis = Analysis::new();
        burst(&mut analysis, "10.0.0.1", 120, 60, 0);
        burst(&mut analysis, "10.0.0.2", 5, 600, 0);

        let metrics = analysis.evaluate(100.0);
        let a = metrics.iter().find(|m| m.address.to_string() == "10.0.0.1").unwrap();
        let b = metrics.iter().find(|m| m.address.to_string() == "10.0.0.2").unwrap();
        assert_eq!(a.rate, 120.0);
        assert_eq!(b.rate, 0.5);
        assert!(a.suspicious);
        assert!(!b.suspicious);

        let groups = build_threat_groups(analysis.evaluate(100.0));
        assert_eq!(groups.len(), 1);
        match &groups[0] {
            ThreatGroup::Single(metric) => assert_eq!(metric.address.to_string(), "10.0.0.1"),
            other => panic!("expected single group, got {other:?}"),
        }
    }

    #[test]
    fn test_two_members_form_subnet() {
        let mut analysis = Analysis::new();
        burst(&mut analysis, "10.0.0.1", 300, 60, 0);
        burst(&mut analysis, "10.0.0.2", 150, 60, 0);

        let groups = build_threat_groups(analysis.evaluate(100.0));
        assert_eq!(groups.len(), 1);
        let ThreatGroup::Subnet(subnet) = &groups[0] else {
            panic!("expected subnet group");
        };
        assert_eq!(subnet.prefix.to_string(), "10.0.0.0/24");
        assert_eq!(subnet.total_requests, 450);
        assert_eq!(subnet.members[0].address.to_string(), "10.0.0.1");
        let summed: f64 = subnet.members.iter().map(|m| m.danger_score).sum();
        assert!((subnet.danger_score - summed).abs() < 1e-9);
    }

    #[test]
    fn test_every_suspicious_address_in_exactly_one_group() {
        let mut analysis = Analysis::new();
        let ips = [
            "10.0.0.1", "10.0.0.2", "10.0.1.1", "10.1.0.1", "10.1.0.7", "10.1.0.9",
            "2001:db8::1", "2001:db8::2", "2001:db8:0:1::1",
        ];
        for (i, ip) in ips.iter().enumerate() {
            burst(&mut analysis, ip, 200 + i as i64, 60, 0);
        }
        burst(&mut analysis, "10.0.0.3", 2, 600, 0);

        let suspicious: Vec<IpAddr> = analysis
            .evaluate(100.0)
            .into_iter()
            .filter(|m| m.suspicious)
            .map(|m| m.address)
            .collect();
        let groups = build_threat_groups(analysis.evaluate(100.0));

        let members: Vec<IpAddr> = groups
            .iter()
            .flat_map(|g| g.members().iter().map(|m| m.address))
            .collect();
        let unique: HashSet<IpAddr> = members.iter().copied().collect();

        assert_eq!(members.len(), suspicious.len());
        assert_eq!(unique, suspicious.into_iter().collect());
        for group in &groups {
            for member in group.members() {
                assert!(group.target().contains(&member.address));
            }
        }
    }

    #[test]
    fn test_subnet_groups_have_at_least_two_members() {
        let mut analysis = Analysis::new();
        for ip in ["10.0.0.1", "10.0.1.1", "10.0.2.1", "10.0.2.2"] {
            burst(&mut analysis, ip, 200, 60, 0);
        }

        let groups = build_threat_groups(analysis.evaluate(100.0));
        assert_eq!(groups.len(), 3);
        for group in &groups {
            if group.is_subnet() {
                assert!(group.member_count() >= 2);
            } else {
                assert_eq!(group.member_count(), 1);
            }
        }
    }

    #[test]
    fn test_groups_sorted_by_danger_then_target() {
        let mut analysis = Analysis::new();
        burst(&mut analysis, "10.0.9.1", 200, 60, 0);
        burst(&mut analysis, "10.0.3.1", 200, 60, 0);
        burst(&mut analysis, "10.0.5.1", 900, 60, 0);

        let targets: Vec<String> = build_threat_groups(analysis.evaluate(100.0))
            .iter()
            .map(|g| g.target().to_string())
            .collect();
        assert_eq!(targets, vec!["10.0.5.1/32", "10.0.3.1/32", "10.0.9.1/32"]);
    }

    #[test]
    fn test_ipv6_grouped_by_slash_64() {
        let mut analysis = Analysis::new();
        burst(&mut analysis, "2001:db8::1", 200, 60, 0);
        burst(&mut analysis, "2001:db8::ffff", 200, 60, 0);

        let groups = build_threat_groups(analysis.evaluate(100.0));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].target().to_string(), "2001:db8::/64");
    }

    // ===========================================
    // Group Statistics
    // ===========================================

    #[test]
    fn test_group_activity_statistics() {
        let mut analysis = Analysis::new();
        // Both active in the first minute; second continues for 30 minutes.
        burst(&mut analysis, "10.0.0.1", 150, 59, 0);
        burst(&mut analysis, "10.0.0.2", 3_100, 1_800, 0);

        let groups = build_threat_groups(analysis.evaluate(100.0));
        let group = &groups[0];

        assert_eq!(group.member_count(), 2);
        assert_eq!(group.activity_span_secs(), 1_800);
        assert!(group.peak_member_rate() >= 150.0);
        assert!(group.peak_group_rate() > 150.0);
        let expected_avg = 3_250.0 / 30.0;
        assert!((group.average_group_rate() - expected_avg).abs() < 1e-9);
    }

    #[test]
    fn test_single_group_statistics() {
        let mut analysis = Analysis::new();
        burst(&mut analysis, "10.0.0.1", 120, 60, 0);

        let group = &build_threat_groups(analysis.evaluate(100.0))[0];
        assert_eq!(group.sole_address().unwrap().to_string(), "10.0.0.1");
        assert_eq!(group.peak_member_rate(), 120.0);
        assert_eq!(group.activity_span_secs(), 60);
        assert_eq!(group.average_group_rate(), 120.0);
    }

    #[test]
    fn test_threat_group_serializes_tagged() {
        let mut analysis = Analysis::new();
        burst(&mut analysis, "10.0.0.1", 200, 60, 0);
        burst(&mut analysis, "10.0.0.2", 200, 60, 0);

        let groups = build_threat_groups(analysis.evaluate(100.0));
        let json = serde_json::to_value(&groups[0]).unwrap();

        assert_eq!(json["type"], "subnet");
        assert_eq!(json["prefix"], "10.0.0.0/24");
        assert_eq!(json["members"].as_array().unwrap().len(), 2);
        assert!(json["members"][0].get("minute_counts").is_none());
    }

    #[test]
    fn test_average_group_rate_zero_span() {
        let metric = AddressMetric::from_timestamps("10.0.0.1".parse().unwrap(), &[t0(), t0()], 0.0);
        let group = ThreatGroup::Single(metric);
        assert_eq!(group.activity_span_secs(), 0);
        assert_eq!(group.average_group_rate(), 0.0);
        assert_eq!(group.peak_group_rate(), 2.0);
    }
}
