//! Analyze command orchestration.
//!
//! Scans the log window, scores threats, applies the block plan when
//! `--block` is set and renders the results.

use std::path::PathBuf;

use botstats_analyzer::{
    pipeline, submit_plan, Analysis, AnalysisOutcome, RuleSink, ScanStats, SubmissionSummary,
    ThreatStrategy, Whitelist, WindowedEntries,
};
use botstats_clock::Clock;
use botstats_fs::Filesystem;
use botstats_schema::CombinedLogParser;

use crate::cli::AnalyzeArgs;
use crate::io::{load_whitelist, render_text_report, OutputWriter, ReportContext};
use crate::logger::Logger;

use super::CommandResult;

/// Result of analyze command execution.
#[derive(Debug)]
pub struct AnalyzeResult {
    pub outcome: AnalysisOutcome,
    /// Counters from the log scan.
    pub scan: ScanStats,
    /// Present when `--block` was given.
    pub submission: Option<SubmissionSummary>,
    /// Text report of the top threats.
    pub report: String,
    /// Where `--output` was written, if requested.
    pub output_path: Option<PathBuf>,
}

/// Execute the analyze command.
pub fn execute_analyze<F, C, S, L>(
    args: &AnalyzeArgs,
    fs: &F,
    clock: &C,
    sink: &mut S,
    logger: &L,
) -> CommandResult<AnalyzeResult>
where
    F: Filesystem + ?Sized,
    C: Clock + ?Sized,
    S: RuleSink + ?Sized,
    L: Logger + ?Sized,
{
    args.validate()?;

    let whitelist = match args.whitelist {
        Some(ref path) => {
            let whitelist = load_whitelist(fs, path)?;
            logger.verbose(&format!(
                "Loaded whitelist from {}: {} addresses, {} networks",
                path.display(),
                whitelist.address_count(),
                whitelist.network_count()
            ));
            whitelist
        }
        None => Whitelist::empty(),
    };
    let config = args.analyzer_config(whitelist);

    let start = args.resolve_start(clock)?;
    match start {
        Some(start) => logger.info(&format!(
            "Analyzing {} from {}",
            args.file.display(),
            start.format("%d/%b/%Y:%H:%M:%S")
        )),
        None => logger.info(&format!("Analyzing {}", args.file.display())),
    }

    let reader = fs.open_read(&args.file)?;
    let parser = CombinedLogParser::new();
    let mut entries = WindowedEntries::open(reader, &parser, &config.whitelist, start)?
        .with_malformed_callback(|line, err| {
            logger.debug(&format!("Skipping malformed line ({err}): {line}"));
        });

    let mut analysis = Analysis::new();
    analysis.ingest_all(entries.by_ref())?;
    let scan = entries.stats();
    drop(entries);

    logger.verbose(&format!(
        "Scanned {} lines: {} entries, {} malformed, {} whitelisted{}",
        scan.lines_read,
        scan.emitted,
        scan.malformed,
        scan.whitelisted,
        if scan.stopped_early {
            " (stopped at window start)"
        } else {
            ""
        }
    ));
    if analysis.is_empty() {
        logger.info("No log entries in the analysis window");
    }

    let outcome = pipeline::execute(&analysis, &config);
    logger.verbose(&format!(
        "{} addresses, {} suspicious, {} threat groups",
        outcome.addresses,
        outcome.suspicious,
        outcome.threats.len()
    ));

    let mut failed = Vec::new();
    let submission = if args.block {
        logger.info(&format!(
            "Strategy '{}' ({}): {} block target(s) selected",
            config.strategy,
            config.strategy.strategy().description(),
            outcome.plan.len()
        ));
        let summary = submit_plan(&outcome.plan, sink, |block, result| match result {
            Ok(()) => logger.verbose(&format!("Block submitted: {} ({})", block.target, block.reason)),
            Err(e) => {
                logger.info(&format!("Failed to block {}: {}", block.target, e));
                failed.push(block.target);
            }
        });
        Some(summary)
    } else {
        logger.verbose("Blocking is disabled; use --block to apply the plan");
        None
    };

    let context = ReportContext {
        strategy: config.strategy,
        top_n: config.top_n,
        blocking: args.block,
        dry_run: args.dry_run,
        failed,
    };
    let report = render_text_report(&outcome, &context);

    let output_path = match args.output {
        Some(ref path) => {
            let written = OutputWriter::new(fs).write(path, args.format, &outcome, &context)?;
            logger.info(&format!(
                "Results written to {} ({})",
                written.display(),
                args.format
            ));
            Some(written)
        }
        None => None,
    };

    Ok(AnalyzeResult {
        outcome,
        scan,
        submission,
        report,
        output_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{parse_from, Command};
    use crate::commands::CommandError;
    use crate::firewall::{MockCommandRunner, UfwRuleSink};
    use crate::logger::{MockLogger, NullLogger, Verbosity};
    use botstats_analyzer::{BlockStatus, RecordingSink};
    use botstats_clock::MockClock;
    use botstats_fs::{FsError, MockFilesystem};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::path::Path;

    const LOG: &str = "/var/log/nginx/access.log";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    /// One hour after `t0`.
    fn clock() -> MockClock {
        MockClock::new(t0().timestamp() as u64 + 3_600)
    }

    struct Burst {
        ip: &'static str,
        count: i64,
        offset_secs: i64,
        span_secs: i64,
    }

    fn burst(ip: &'static str, count: i64, offset_secs: i64, span_secs: i64) -> Burst {
        Burst {
            ip,
            count,
            offset_secs,
            span_secs,
        }
    }

    /// A time-ordered combined log built from bursts.
    fn log(bursts: &[Burst]) -> String {
        let mut events: Vec<(DateTime<Utc>, &str)> = Vec::new();
        for b in bursts {
            for i in 0..b.count {
                let offset = b.offset_secs + i * b.span_secs / (b.count - 1).max(1);
                events.push((t0() + Duration::seconds(offset), b.ip));
            }
        }
        events.sort();

        let mut out = String::new();
        for (ts, ip) in events {
            out.push_str(&format!(
                "{ip} - - [{}] \"GET /index.html HTTP/1.1\" 200 512 \"-\" \"Mozilla/5.0\"\n",
                ts.format("%d/%b/%Y:%H:%M:%S +0000")
            ));
        }
        out
    }

    /// One hammering address plus light background traffic.
    fn standard_log() -> String {
        log(&[
            burst("203.0.113.9", 1_000, 600, 120),
            burst("198.51.100.1", 5, 0, 600),
            burst("198.51.100.2", 8, 300, 900),
        ])
    }

    fn args(extra: &[&str]) -> AnalyzeArgs {
        let mut argv = vec!["botstats", "analyze", "--file", LOG];
        argv.extend_from_slice(extra);
        match parse_from(argv).unwrap().command {
            Command::Analyze(args) => args,
            other => panic!("unexpected command: {other:?}"),
        }
    }

    fn setup(content: String) -> MockFilesystem {
        let fs = MockFilesystem::new();
        fs.add_file(LOG, content);
        fs
    }

    // ===========================================
    // Reporting Only
    // ===========================================

    #[test]
    fn test_analyze_reports_without_blocking() {
        let fs = setup(standard_log());
        let mut sink = RecordingSink::new();
        let logger = MockLogger::capture_all();

        let result = execute_analyze(&args(&[]), &fs, &clock(), &mut sink, &logger).unwrap();

        assert_eq!(result.outcome.entries_processed, 1_013);
        assert_eq!(result.outcome.addresses, 3);
        assert_eq!(result.outcome.threats.len(), 1);
        assert!(result.submission.is_none());
        assert!(sink.submitted().is_empty());
        assert!(result.report.contains("#1 Address: 203.0.113.9"));
        assert!(result.output_path.is_none());
        assert!(logger.contains("Blocking is disabled"));
    }

    #[test]
    fn test_analyze_empty_log() {
        let fs = setup(String::new());
        let mut sink = RecordingSink::new();
        let logger = MockLogger::capture_all();

        let result = execute_analyze(&args(&[]), &fs, &clock(), &mut sink, &logger).unwrap();

        assert!(result.outcome.threats.is_empty());
        assert!(result.report.contains("No threats detected."));
        assert!(logger.contains("No log entries in the analysis window"));
    }

    #[test]
    fn test_analyze_malformed_lines_skipped() {
        let mut content = String::from("garbage line\n");
        content.push_str(&standard_log());
        content.push_str("another bad line\n");
        let fs = setup(content);
        let mut sink = RecordingSink::new();
        let logger = MockLogger::capture_all();

        let result = execute_analyze(&args(&[]), &fs, &clock(), &mut sink, &logger).unwrap();

        assert_eq!(result.scan.malformed, 2);
        assert_eq!(result.outcome.entries_processed, 1_013);
        assert_eq!(
            logger
                .messages_at_level(Verbosity::Debug)
                .iter()
                .filter(|m| m.starts_with("Skipping malformed line"))
                .count(),
            2
        );
    }

    // ===========================================
    // Blocking
    // ===========================================

    #[test]
    fn test_analyze_block_submits_plan() {
        let fs = setup(standard_log());
        let mut sink = RecordingSink::new();
        let logger = MockLogger::capture_all();

        let result =
            execute_analyze(&args(&["--block"]), &fs, &clock(), &mut sink, &logger).unwrap();

        let submission = result.submission.unwrap();
        assert_eq!(submission.submitted, 1);
        assert_eq!(submission.failed, 0);
        let submitted = sink.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].to_string(), "203.0.113.9");
        assert_eq!(submitted[0].duration_minutes, 60);
        assert!(result.report.contains("[BLOCKED]"));
        assert!(logger.contains(
            "Strategy 'volume_danger' (aggregate danger score of the group): 1 block target(s) selected"
        ));
    }

    #[test]
    fn test_analyze_block_consolidates_supernet() {
        let fs = setup(log(&[
            burst("10.20.1.5", 1_000, 0, 120),
            burst("10.20.1.6", 1_000, 0, 120),
            burst("10.20.2.5", 1_000, 0, 120),
            burst("10.20.2.6", 1_000, 0, 120),
        ]));
        let mut sink = RecordingSink::new();
        let logger = MockLogger::capture_all();

        let result = execute_analyze(
            &args(&["--block", "--block-duration", "30"]),
            &fs,
            &clock(),
            &mut sink,
            &logger,
        )
        .unwrap();

        let submitted = sink.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].to_string(), "10.20.0.0/16");
        assert_eq!(submitted[0].duration_minutes, 30);
        assert!(result
            .outcome
            .threats
            .iter()
            .all(|t| result.outcome.plan.status_of(t) == BlockStatus::CoveredBySupernet));
    }

    #[test]
    fn test_analyze_block_failure_is_counted() {
        let fs = setup(standard_log());
        let mut sink = RecordingSink::new();
        sink.reject("203.0.113.9");
        let logger = MockLogger::capture_all();

        let result =
            execute_analyze(&args(&["--block"]), &fs, &clock(), &mut sink, &logger).unwrap();

        let submission = result.submission.unwrap();
        assert_eq!(submission.submitted, 0);
        assert_eq!(submission.failed, 1);
        assert!(logger.contains("Failed to block 203.0.113.9"));
        assert!(result.report.contains("#1 Address: 203.0.113.9"));
        assert!(result.report.contains("[BLOCK FAILED]"));
        assert!(!result.report.contains(" [BLOCKED]"));
    }

    #[test]
    fn test_analyze_dry_run_ufw_runs_no_commands() {
        let fs = setup(standard_log());
        let runner = MockCommandRunner::new();
        let clock = clock();
        let logger = NullLogger;
        let mut sink = UfwRuleSink::new(&runner, &clock, &logger).with_dry_run(true);

        let result = execute_analyze(
            &args(&["--block", "--dry-run"]),
            &fs,
            &clock,
            &mut sink,
            &logger,
        )
        .unwrap();

        assert_eq!(result.submission.unwrap().submitted, 1);
        assert!(runner.calls().is_empty());
        assert!(result.report.contains("[DRY RUN - BLOCKED]"));
    }

    #[test]
    fn test_analyze_strategy_refusal_blocks_nothing() {
        let fs = setup(standard_log());
        let mut sink = RecordingSink::new();
        let logger = MockLogger::capture_all();

        let result = execute_analyze(
            &args(&["--block", "--block-strategy", "volume_coordination"]),
            &fs,
            &clock(),
            &mut sink,
            &logger,
        )
        .unwrap();

        assert_eq!(result.submission.unwrap().attempted(), 0);
        assert!(sink.submitted().is_empty());
    }

    // ===========================================
    // Filtering
    // ===========================================

    #[test]
    fn test_analyze_whitelist_excludes_address() {
        let fs = setup(standard_log());
        fs.add_file("/etc/botstats/whitelist.txt", "# monitoring\n203.0.113.0/24\n");
        let mut sink = RecordingSink::new();
        let logger = MockLogger::capture_all();

        let result = execute_analyze(
            &args(&["--whitelist", "/etc/botstats/whitelist.txt", "--block"]),
            &fs,
            &clock(),
            &mut sink,
            &logger,
        )
        .unwrap();

        assert_eq!(result.scan.whitelisted, 1_000);
        assert!(result.outcome.threats.is_empty());
        assert!(sink.submitted().is_empty());
    }

    #[test]
    fn test_analyze_time_window_skips_old_entries() {
        let fs = setup(log(&[
            burst("192.0.2.50", 2_000, -7_200, 120),
            burst("198.51.100.1", 5, 0, 600),
        ]));
        let mut sink = RecordingSink::new();
        let logger = MockLogger::capture_all();

        let result = execute_analyze(
            &args(&["--time-window", "hour"]),
            &fs,
            &clock(),
            &mut sink,
            &logger,
        )
        .unwrap();

        assert!(result.scan.stopped_early);
        assert_eq!(result.outcome.entries_processed, 5);
        assert!(result.outcome.threats.is_empty());
    }

    #[test]
    fn test_analyze_start_date() {
        let fs = setup(log(&[
            burst("192.0.2.50", 2_000, -7_200, 120),
            burst("198.51.100.1", 5, 0, 600),
        ]));
        let mut sink = RecordingSink::new();
        let logger = MockLogger::capture_all();

        let result = execute_analyze(
            &args(&["--start-date", "01/Mar/2024:10:00:00"]),
            &fs,
            &clock(),
            &mut sink,
            &logger,
        )
        .unwrap();

        assert_eq!(result.outcome.entries_processed, 2_005);
        assert_eq!(result.outcome.threats.len(), 1);
    }

    // ===========================================
    // Output
    // ===========================================

    #[test]
    fn test_analyze_writes_json_output() {
        let fs = setup(standard_log());
        let mut sink = RecordingSink::new();
        let logger = MockLogger::capture_all();

        let result = execute_analyze(
            &args(&["--output", "/tmp/out/threats.json", "--format", "json"]),
            &fs,
            &clock(),
            &mut sink,
            &logger,
        )
        .unwrap();

        let path = Path::new("/tmp/out/threats.json");
        assert_eq!(result.output_path.as_deref(), Some(path));
        let json: serde_json::Value =
            serde_json::from_str(&fs.get_file_string(path).unwrap()).unwrap();
        assert_eq!(json["threats"][0]["id"], "203.0.113.9");
        assert_eq!(json["threats"][0]["status"], "planned");
        assert_eq!(json["blocking"], false);
        assert!(logger.contains("Results written to /tmp/out/threats.json (json)"));
    }

    // ===========================================
    // Errors
    // ===========================================

    #[test]
    fn test_analyze_missing_log() {
        let fs = MockFilesystem::new();
        let mut sink = RecordingSink::new();
        let logger = MockLogger::capture_all();

        let result = execute_analyze(&args(&[]), &fs, &clock(), &mut sink, &logger);
        assert!(matches!(
            result,
            Err(CommandError::Filesystem(FsError::NotFound(_)))
        ));
    }

    #[test]
    fn test_analyze_missing_whitelist() {
        let fs = setup(standard_log());
        let mut sink = RecordingSink::new();
        let logger = MockLogger::capture_all();

        let result = execute_analyze(
            &args(&["--whitelist", "/missing.txt"]),
            &fs,
            &clock(),
            &mut sink,
            &logger,
        );
        assert!(matches!(result, Err(CommandError::Whitelist(_))));
    }

    #[test]
    fn test_analyze_invalid_argument() {
        let fs = setup(standard_log());
        let mut sink = RecordingSink::new();
        let logger = MockLogger::capture_all();

        let result = execute_analyze(&args(&["--top", "0"]), &fs, &clock(), &mut sink, &logger);
        assert!(matches!(result, Err(CommandError::InvalidArgument(_))));
    }
}
