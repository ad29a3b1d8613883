//! Report rendering and output writing.
//!
//! Three formats:
//! - text - the human-readable top-N report (also printed to stdout)
//! - json - every scored threat with metrics, members and block status
//! - csv - one row per scored threat

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use botstats_analyzer::{
    AddressMetric, AnalysisOutcome, BlockKind, BlockStatus, BlockTarget, PlannedBlock,
    ScoredThreat, StrategyKind,
};
use botstats_fs::{Filesystem, FsError};
use serde::Serialize;
use thiserror::Error;

use crate::cli::OutputFormat;

/// Errors from output writing.
#[derive(Debug, Error)]
pub enum OutputWriterError {
    #[error("failed to create output directory: {0}")]
    CreateDir(#[source] FsError),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: FsError,
    },

    #[error("failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Run settings shown alongside the results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportContext {
    pub strategy: StrategyKind,
    pub top_n: usize,
    pub blocking: bool,
    pub dry_run: bool,
    /// Targets the firewall rejected.
    pub failed: Vec<BlockTarget>,
}

/// A threat's status as reported, after submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Its block was applied.
    Blocked,
    /// Selected for blocking, but nothing was applied (no `--block`, or a dry run).
    Planned,
    /// Its block was rejected by the firewall.
    Failed,
    /// Its /16 block was applied.
    CoveredBySupernet,
    OutsideTopN,
    NotBlockable,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Blocked => "blocked",
            ReportStatus::Planned => "planned",
            ReportStatus::Failed => "failed",
            ReportStatus::CoveredBySupernet => "covered_by_supernet",
            ReportStatus::OutsideTopN => "outside_top_n",
            ReportStatus::NotBlockable => "not_blockable",
        }
    }
}

/// Fold the submission results in `context` into the plan status of `threat`.
pub fn report_status(
    outcome: &AnalysisOutcome,
    threat: &ScoredThreat,
    context: &ReportContext,
) -> ReportStatus {
    let status = outcome.plan.status_of(threat);
    match status {
        BlockStatus::OutsideTopN => return ReportStatus::OutsideTopN,
        BlockStatus::NotBlockable => return ReportStatus::NotBlockable,
        BlockStatus::Blocked | BlockStatus::CoveredBySupernet => {}
    }
    if !context.blocking || context.dry_run {
        return ReportStatus::Planned;
    }
    let rejected = outcome
        .plan
        .block_for(threat)
        .is_some_and(|block| context.failed.contains(&block.target));
    if rejected {
        ReportStatus::Failed
    } else if status == BlockStatus::CoveredBySupernet {
        ReportStatus::CoveredBySupernet
    } else {
        ReportStatus::Blocked
    }
}

/// Writes rendered results to a file through the [`Filesystem`] trait.
pub struct OutputWriter<'a, F: Filesystem + ?Sized> {
    fs: &'a F,
}

impl<'a, F: Filesystem + ?Sized> OutputWriter<'a, F> {
    pub fn new(fs: &'a F) -> Self {
        Self { fs }
    }

    /// Render `outcome` in `format` and write it to `path`.
    pub fn write(
        &self,
        path: &Path,
        format: OutputFormat,
        outcome: &AnalysisOutcome,
        context: &ReportContext,
    ) -> Result<PathBuf, OutputWriterError> {
        let content = render(format, outcome, context)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !self.fs.exists(parent) {
                self.fs
                    .create_dir_all(parent)
                    .map_err(OutputWriterError::CreateDir)?;
            }
        }

        self.fs
            .write_atomic(path, content.as_bytes())
            .map_err(|source| OutputWriterError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(path.to_path_buf())
    }
}

/// Render results in the given format.
pub fn render(
    format: OutputFormat,
    outcome: &AnalysisOutcome,
    context: &ReportContext,
) -> Result<String, OutputWriterError> {
    match format {
        OutputFormat::Text => Ok(render_text_report(outcome, context)),
        OutputFormat::Json => render_json(outcome, context),
        OutputFormat::Csv => Ok(render_csv(outcome, context)),
    }
}

fn kind_label(threat: &ScoredThreat) -> &'static str {
    if threat.group.is_subnet() {
        "subnet"
    } else {
        "address"
    }
}

/// The identifier shown for a threat: the prefix, or the bare address.
fn threat_id(threat: &ScoredThreat) -> String {
    match threat.group.sole_address() {
        Some(address) if !threat.group.is_subnet() => address.to_string(),
        _ => threat.group.target().to_string(),
    }
}

// ===========================================
// Text
// ===========================================

fn block_tag(
    outcome: &AnalysisOutcome,
    threat: &ScoredThreat,
    context: &ReportContext,
) -> &'static str {
    if !context.blocking {
        return "";
    }
    match (report_status(outcome, threat, context), outcome.plan.status_of(threat)) {
        (ReportStatus::Failed, _) => " [BLOCK FAILED]",
        (ReportStatus::Planned, BlockStatus::CoveredBySupernet) => {
            " [DRY RUN - COVERED BY /16 BLOCK]"
        }
        (ReportStatus::Planned, _) => " [DRY RUN - BLOCKED]",
        (ReportStatus::CoveredBySupernet, _) => " [COVERED BY /16 BLOCK]",
        (ReportStatus::Blocked, _) => " [BLOCKED]",
        _ => "",
    }
}

fn member_line(out: &mut String, member: &AddressMetric) {
    let _ = writeln!(
        out,
        "     - {} ({} reqs, danger {:.2}, avg rpm {:.2}, peak minute {})",
        member.address,
        member.total_requests,
        member.danger_score,
        member.rate,
        member.peak_minute_requests
    );
}

/// Human-readable report of the top-N threats.
pub fn render_text_report(outcome: &AnalysisOutcome, context: &ReportContext) -> String {
    let mut out = String::new();
    let shown = context.top_n.min(outcome.threats.len());

    let _ = writeln!(
        out,
        "=== TOP {shown} THREATS (/24 or /64) sorted by '{}' score ===",
        context.strategy
    );
    if context.blocking {
        let action = if context.dry_run {
            "[DRY RUN] Marked for blocking"
        } else {
            "Blocked"
        };
        let _ = writeln!(
            out,
            "--- {action} by strategy '{}' within the top {} threats; /16 supernets with >= 2 blockable /24s are blocked whole ---",
            context.strategy, context.top_n
        );
    }

    if outcome.threats.is_empty() {
        out.push_str("\nNo threats detected.\n");
    }

    for (rank, threat) in outcome.threats.iter().take(shown).enumerate() {
        let group = &threat.group;
        let label = if group.is_subnet() { "Subnet" } else { "Address" };
        let _ = writeln!(
            out,
            "\n#{} {label}: {} - Score: {:.2} ({} reqs, {} IPs, danger {:.2}, ~{:.1} avg_total_rpm, {:.0} max_total_rpm){}",
            rank + 1,
            threat_id(threat),
            threat.verdict.score,
            group.total_requests(),
            group.member_count(),
            group.danger_score(),
            group.average_group_rate(),
            group.peak_group_rate(),
            block_tag(outcome, threat, context)
        );
        let _ = writeln!(out, "  -> {}", threat.verdict.reason);
        if group.is_subnet() {
            out.push_str("  -> Members:\n");
            for member in group.members() {
                member_line(&mut out, member);
            }
        }
    }

    let supernets: Vec<&PlannedBlock> = outcome.plan.supernets().collect();
    if context.blocking && !supernets.is_empty() {
        out.push_str("\n=== /16 SUPERNET BLOCKS ===\n");
        for block in supernets {
            let _ = writeln!(out, "  {} ({})", block.target, block.reason);
        }
    }

    out
}

// ===========================================
// JSON
// ===========================================

#[derive(Serialize)]
struct ThreatRecord<'a> {
    rank: usize,
    #[serde(rename = "type")]
    kind: &'static str,
    id: String,
    score: f64,
    block: bool,
    reason: &'a str,
    status: ReportStatus,
    danger_score: f64,
    total_requests: usize,
    member_count: usize,
    peak_member_rate: f64,
    peak_group_rate: f64,
    average_group_rate: f64,
    activity_span_secs: i64,
    members: &'a [AddressMetric],
}

#[derive(Serialize)]
struct BlockRecord {
    target: String,
    kind: BlockKind,
    duration_minutes: u64,
    reason: String,
    failed: bool,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    strategy: StrategyKind,
    top_n: usize,
    blocking: bool,
    dry_run: bool,
    entries_processed: usize,
    addresses: usize,
    suspicious: usize,
    threats: Vec<ThreatRecord<'a>>,
    blocks: Vec<BlockRecord>,
}

/// All scored threats as pretty-printed JSON.
pub fn render_json(
    outcome: &AnalysisOutcome,
    context: &ReportContext,
) -> Result<String, OutputWriterError> {
    let threats = outcome
        .threats
        .iter()
        .enumerate()
        .map(|(i, threat)| ThreatRecord {
            rank: i + 1,
            kind: kind_label(threat),
            id: threat_id(threat),
            score: threat.verdict.score,
            block: threat.verdict.block,
            reason: &threat.verdict.reason,
            status: report_status(outcome, threat, context),
            danger_score: threat.group.danger_score(),
            total_requests: threat.group.total_requests(),
            member_count: threat.group.member_count(),
            peak_member_rate: threat.group.peak_member_rate(),
            peak_group_rate: threat.group.peak_group_rate(),
            average_group_rate: threat.group.average_group_rate(),
            activity_span_secs: threat.group.activity_span_secs(),
            members: threat.group.members(),
        })
        .collect();

    let blocks = outcome
        .plan
        .blocks
        .iter()
        .map(|block| BlockRecord {
            target: block.target.to_string(),
            kind: block.kind,
            duration_minutes: block.target.duration_minutes,
            reason: block.reason.clone(),
            failed: context.failed.contains(&block.target),
        })
        .collect();

    let report = JsonReport {
        strategy: context.strategy,
        top_n: context.top_n,
        blocking: context.blocking,
        dry_run: context.dry_run,
        entries_processed: outcome.entries_processed,
        addresses: outcome.addresses,
        suspicious: outcome.suspicious,
        threats,
        blocks,
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

// ===========================================
// CSV
// ===========================================

/// One row per scored threat, in score order.
///
/// Format:
/// type,id,score,danger_score,total_requests,member_count,status
pub fn render_csv(outcome: &AnalysisOutcome, context: &ReportContext) -> String {
    let mut lines = Vec::with_capacity(outcome.threats.len() + 1);
    lines.push("type,id,score,danger_score,total_requests,member_count,status".to_string());

    for threat in &outcome.threats {
        lines.push(format!(
            "{},{},{:.2},{:.2},{},{},{}",
            kind_label(threat),
            threat_id(threat),
            threat.verdict.score,
            threat.group.danger_score(),
            threat.group.total_requests(),
            threat.group.member_count(),
            report_status(outcome, threat, context).as_str(),
        ));
    }

    let mut csv = lines.join("\n");
    csv.push('\n');
    csv
}
