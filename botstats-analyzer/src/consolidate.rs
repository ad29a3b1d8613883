//! Block planning: /16 consolidation and top-N selection.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use ipnet::IpNet;
use serde::Serialize;

use crate::prefix::{ipv4_supernet, BlockTarget, IPV4_GROUP_PREFIX_LEN};
use crate::strategy::ScoredThreat;
use crate::threat::ThreatGroup;

/// Minimum blockable /24 children for a /16 to be blocked as a whole.
pub const MIN_SUPERNET_CHILDREN: usize = 2;

/// What a planned block covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Supernet,
    Subnet,
    Address,
}

/// One target to submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedBlock {
    pub target: BlockTarget,
    pub kind: BlockKind,
    pub reason: String,
}

/// How a scored threat was treated by the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    /// The group (or its sole address) is blocked directly.
    Blocked,
    /// Its /16 is blocked instead.
    CoveredBySupernet,
    /// Blockable, but outside the top-N window.
    OutsideTopN,
    /// The strategy refused to block it.
    NotBlockable,
}

impl fmt::Display for BlockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlockStatus::Blocked => "blocked",
            BlockStatus::CoveredBySupernet => "covered by /16",
            BlockStatus::OutsideTopN => "not selected",
            BlockStatus::NotBlockable => "not blockable",
        };
        f.write_str(s)
    }
}

/// Targets to submit, in order, plus the /24s covered by supernet blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlockPlan {
    pub blocks: Vec<PlannedBlock>,
    pub covered: BTreeSet<IpNet>,
}

impl BlockPlan {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether `prefix` is covered by a supernet block.
    pub fn is_covered(&self, prefix: &IpNet) -> bool {
        self.covered.contains(prefix)
    }

    /// The supernet targets.
    pub fn supernets(&self) -> impl Iterator<Item = &PlannedBlock> {
        self.blocks.iter().filter(|b| b.kind == BlockKind::Supernet)
    }

    /// The planned block that handles `threat`: its /16 when covered, its
    /// own target otherwise.
    pub fn block_for(&self, threat: &ScoredThreat) -> Option<&PlannedBlock> {
        if !threat.verdict.block {
            return None;
        }
        let group_target = threat.group.target();
        if self.is_covered(&group_target) {
            let supernet = ipv4_supernet(&group_target)?;
            return self.supernets().find(|b| b.target.network == supernet);
        }
        let target = individual_target(&threat.group);
        self.blocks
            .iter()
            .find(|b| b.kind != BlockKind::Supernet && b.target.network == target)
    }

    /// Status of one scored threat under this plan.
    pub fn status_of(&self, threat: &ScoredThreat) -> BlockStatus {
        if !threat.verdict.block {
            return BlockStatus::NotBlockable;
        }
        let group_target = threat.group.target();
        if self.is_covered(&group_target) {
            return BlockStatus::CoveredBySupernet;
        }
        let target = individual_target(&threat.group);
        if self
            .blocks
            .iter()
            .any(|b| b.kind != BlockKind::Supernet && b.target.network == target)
        {
            BlockStatus::Blocked
        } else {
            BlockStatus::OutsideTopN
        }
    }
}

/// The network blocked for a group: its sole address if it has one member,
/// its prefix otherwise.
fn individual_target(group: &ThreatGroup) -> IpNet {
    match group.sole_address() {
        Some(address) => IpNet::from(address),
        None => group.target(),
    }
}

/// Build the block plan for score-ordered threats.
///
/// Blockable IPv4 /24 subnet groups are bucketed by /16; a /16 with at least
/// [`MIN_SUPERNET_CHILDREN`] children becomes one supernet block and its
/// children are marked covered. The first `top_n` threats are then walked and
/// every blockable, uncovered one gets its own block.
pub fn plan_blocks(threats: &[ScoredThreat], top_n: usize, duration_minutes: u64) -> BlockPlan {
    let mut children: BTreeMap<IpNet, Vec<IpNet>> = BTreeMap::new();
    for threat in threats.iter().filter(|t| t.verdict.block) {
        let ThreatGroup::Subnet(subnet) = &threat.group else {
            continue;
        };
        if subnet.prefix.prefix_len() != IPV4_GROUP_PREFIX_LEN {
            continue;
        }
        if let Some(supernet) = ipv4_supernet(&subnet.prefix) {
            children.entry(supernet).or_default().push(subnet.prefix);
        }
    }

    let mut plan = BlockPlan::default();
    for (supernet, prefixes) in children {
        if prefixes.len() < MIN_SUPERNET_CHILDREN {
            continue;
        }
        plan.blocks.push(PlannedBlock {
            target: BlockTarget::network(supernet, duration_minutes),
            kind: BlockKind::Supernet,
            reason: format!("{} blockable /24 subnets", prefixes.len()),
        });
        plan.covered.extend(prefixes);
    }

    for threat in threats.iter().take(top_n) {
        if !threat.verdict.block || plan.is_covered(&threat.group.target()) {
            continue;
        }
        let (target, kind) = match threat.group.sole_address() {
            Some(address) => (BlockTarget::address(address, duration_minutes), BlockKind::Address),
            None => (
                BlockTarget::network(threat.group.target(), duration_minutes),
                BlockKind::Subnet,
            ),
        };
        plan.blocks.push(PlannedBlock {
            target,
            kind,
            reason: threat.verdict.reason.clone(),
        });
    }

    plan
}
