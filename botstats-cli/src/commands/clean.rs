//! Clean-rules command orchestration.

use botstats_analyzer::RuleSink;

use crate::cli::CleanRulesArgs;
use crate::logger::Logger;

use super::CommandResult;

/// Execute the clean-rules command; returns the number of rules removed.
///
/// Dry-run handling belongs to the sink, `args.dry_run` only changes the
/// wording here.
pub fn execute_clean_rules<S, L>(args: &CleanRulesArgs, sink: &mut S, logger: &L) -> CommandResult<usize>
where
    S: RuleSink + ?Sized,
    L: Logger + ?Sized,
{
    logger.info("Removing expired botstats firewall rules");
    let removed = sink.cleanup_expired()?;

    if args.dry_run {
        logger.info(&format!("[DRY RUN] {removed} expired rule(s) would be removed"));
    } else {
        logger.info(&format!("{removed} expired rule(s) removed"));
    }
    Ok(removed)
}
