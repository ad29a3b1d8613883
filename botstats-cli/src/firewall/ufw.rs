//! UFW-backed rule sink.
//!
//! Blocks are inserted at the top of the rule list with an expiry timestamp
//! in the rule comment:
//!
//! ```text
//! ufw insert 1 deny from 10.0.0.0/16 to any comment 'botstats_block_expires:1700003600'
//! ```
//!
//! Cleanup reads `ufw status numbered`, finds rules whose embedded expiry is
//! in the past and deletes them by number, highest first so earlier numbers
//! stay valid.

use std::sync::OnceLock;

use botstats_analyzer::{BlockTarget, RuleSink, RuleSinkError};
use botstats_clock::Clock;
use regex::Regex;

use super::{CommandOutput, CommandRunner};
use crate::logger::Logger;

/// Program name.
pub const UFW: &str = "ufw";

/// Marker at the start of every rule comment written by botstats.
pub const RULE_COMMENT_PREFIX: &str = "botstats_block_expires:";

/// A botstats rule found in `ufw status numbered` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiringRule {
    pub number: u32,
    pub expires_at: u64,
}

fn rule_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\[\s*(\d+)\]\s.*#\s*botstats_block_expires:(\d+)")
            .expect("rule pattern is valid")
    })
}

/// Extract botstats rules from `ufw status numbered` output.
///
/// Lines without the marker, or with unparseable numbers, are skipped.
pub fn parse_expiring_rules(status: &str) -> Vec<ExpiringRule> {
    status
        .lines()
        .filter_map(|line| {
            let caps = rule_pattern().captures(line.trim_start())?;
            Some(ExpiringRule {
                number: caps[1].parse().ok()?,
                expires_at: caps[2].parse().ok()?,
            })
        })
        .collect()
}

/// [`RuleSink`] that manages temporary deny rules through `ufw`.
pub struct UfwRuleSink<'a, R: ?Sized, C: ?Sized, L: ?Sized> {
    runner: &'a R,
    clock: &'a C,
    logger: &'a L,
    dry_run: bool,
}

impl<'a, R, C, L> UfwRuleSink<'a, R, C, L>
where
    R: CommandRunner + ?Sized,
    C: Clock + ?Sized,
    L: Logger + ?Sized,
{
    pub fn new(runner: &'a R, clock: &'a C, logger: &'a L) -> Self {
        Self {
            runner,
            clock,
            logger,
            dry_run: false,
        }
    }

    /// Log commands instead of running them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn run(&self, args: &[String]) -> Result<CommandOutput, RuleSinkError> {
        self.logger
            .debug(&format!("Running: {} {}", UFW, args.join(" ")));
        let output = self
            .runner
            .run(UFW, args)
            .map_err(|source| RuleSinkError::Spawn {
                program: UFW.to_string(),
                source,
            })?;
        if output.is_success() {
            Ok(output)
        } else {
            Err(RuleSinkError::CommandFailed {
                program: UFW.to_string(),
                status: output.status,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

fn insert_args(target: &BlockTarget, expires_at: u64) -> Vec<String> {
    vec![
        "insert".to_string(),
        "1".to_string(),
        "deny".to_string(),
        "from".to_string(),
        target.to_string(),
        "to".to_string(),
        "any".to_string(),
        "comment".to_string(),
        format!("{RULE_COMMENT_PREFIX}{expires_at}"),
    ]
}

fn delete_args(number: u32) -> Vec<String> {
    vec![
        "--force".to_string(),
        "delete".to_string(),
        number.to_string(),
    ]
}

impl<'a, R, C, L> RuleSink for UfwRuleSink<'a, R, C, L>
where
    R: CommandRunner + ?Sized,
    C: Clock + ?Sized,
    L: Logger + ?Sized,
{
    fn submit(&mut self, target: &BlockTarget) -> Result<(), RuleSinkError> {
        let expires_at = self.clock.after_minutes(target.duration_minutes);
        let args = insert_args(target, expires_at);

        if self.dry_run {
            self.logger.info(&format!(
                "[DRY RUN] Would block {} for {} minutes: {} {}",
                target,
                target.duration_minutes,
                UFW,
                args.join(" ")
            ));
            return Ok(());
        }

        self.run(&args)?;
        self.logger.verbose(&format!(
            "Blocked {} until {} ({} minutes)",
            target, expires_at, target.duration_minutes
        ));
        Ok(())
    }

    fn cleanup_expired(&mut self) -> Result<usize, RuleSinkError> {
        let status = self.run(&["status".to_string(), "numbered".to_string()])?;

        let mut expired: Vec<ExpiringRule> = parse_expiring_rules(&status.stdout)
            .into_iter()
            .filter(|rule| self.clock.is_expired(rule.expires_at))
            .collect();
        expired.sort_by(|a, b| b.number.cmp(&a.number));

        if expired.is_empty() {
            self.logger.verbose("No expired botstats rules found");
            return Ok(0);
        }

        let mut removed = 0;
        for rule in &expired {
            if self.dry_run {
                self.logger.info(&format!(
                    "[DRY RUN] Would delete rule {} (expired at {})",
                    rule.number, rule.expires_at
                ));
                removed += 1;
                continue;
            }
            match self.run(&delete_args(rule.number)) {
                Ok(_) => {
                    self.logger.verbose(&format!(
                        "Deleted rule {} (expired at {})",
                        rule.number, rule.expires_at
                    ));
                    removed += 1;
                }
                Err(e) => self
                    .logger
                    .info(&format!("Failed to delete rule {}: {}", rule.number, e)),
            }
        }
        Ok(removed)
    }
}
