//! botstats CLI binary.
//!
//! Entry point for the `botstats` command-line tool.

use std::path::Path;
use std::process::ExitCode;

use botstats_cli::exit::{codes, exit_code};
use botstats_cli::{
    execute_analyze, execute_clean_rules, AnalyzeArgs, CleanRulesArgs, Cli, Command,
    CommandError, Logger, StderrLogger, SystemCommandRunner, UfwRuleSink, Verbosity,
};
use botstats_clock::SystemClock;
use botstats_fs::RealFilesystem;
use clap::Parser;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = if e.use_stderr() {
                codes::INVALID_ARGS
            } else {
                codes::SUCCESS
            };
            return ExitCode::from(code as u8);
        }
    };

    let result = match cli.command {
        Command::Analyze(args) => run_analyze(args),
        Command::CleanRules(args) => run_clean_rules(args),
    };

    match result {
        Ok(()) => ExitCode::from(codes::SUCCESS as u8),
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(exit_code(&e) as u8)
        }
    }
}

/// Stderr logger at the requested verbosity, teeing into `log_file` if given.
fn build_logger(verbose: u8, log_file: Option<&Path>) -> StderrLogger {
    let logger = StderrLogger::new(Verbosity::from_count(verbose));
    match log_file {
        Some(path) => match logger.with_log_file(path) {
            Ok(logger) => logger,
            Err(e) => {
                eprintln!("warning: cannot open log file {}: {}", path.display(), e);
                StderrLogger::new(Verbosity::from_count(verbose))
            }
        },
        None => logger,
    }
}

/// Run the analyze command.
fn run_analyze(args: AnalyzeArgs) -> Result<(), CommandError> {
    let logger = build_logger(args.verbose, args.log_file.as_deref());
    let fs = RealFilesystem;
    let clock = SystemClock;
    let runner = SystemCommandRunner;
    let mut sink = UfwRuleSink::new(&runner, &clock, &logger).with_dry_run(args.dry_run);

    let result = execute_analyze(&args, &fs, &clock, &mut sink, &logger)?;

    println!("{}", result.report);
    if let Some(submission) = result.submission {
        let verb = if args.dry_run {
            "would be blocked (dry run)"
        } else {
            "blocked"
        };
        println!(
            "Summary: {} target(s) {}, {} failed, {} threats detected",
            submission.submitted,
            verb,
            submission.failed,
            result.outcome.threats.len()
        );
        if !args.dry_run && submission.submitted > 0 {
            logger.info("Run 'botstats clean-rules' periodically to remove expired rules");
        }
    } else {
        println!(
            "Summary: {} threats detected (blocking disabled)",
            result.outcome.threats.len()
        );
    }

    Ok(())
}

/// Run the clean-rules command.
fn run_clean_rules(args: CleanRulesArgs) -> Result<(), CommandError> {
    let logger = build_logger(args.verbose, args.log_file.as_deref());
    let clock = SystemClock;
    let runner = SystemCommandRunner;
    let mut sink = UfwRuleSink::new(&runner, &clock, &logger).with_dry_run(args.dry_run);

    let removed = execute_clean_rules(&args, &mut sink, &logger)?;
    if args.dry_run {
        println!("{} expired rule(s) would be removed (dry run)", removed);
    } else {
        println!("Removed {} expired rule(s)", removed);
    }

    Ok(())
}
