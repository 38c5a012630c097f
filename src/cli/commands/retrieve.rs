//! Retrieve command - restore a target's outputs from the retrieve command

use crate::cache::CommandCache;
use crate::cli::args::RetrieveArgs;
use crate::config::Config;
use crate::error::{PipecacheError, PipecacheResult};
use crate::ui::{self, UiContext};
use tracing::debug;

/// Execute the retrieve command
///
/// A miss is reported as an error so scripts can branch on the exit code.
pub async fn execute(args: RetrieveArgs, config: &Config) -> PipecacheResult<()> {
    if !config.cache.has_retrieve_command() {
        return Err(PipecacheError::CommandNotConfigured("retrieve"));
    }

    let ctx = UiContext::detect();
    let key = args.key.resolve()?;
    let target = args.target.build_target();

    let cache = CommandCache::new(config.cache.clone(), args.target.root.clone());
    let report = cache.retrieve_with_report(&target, &key).await;

    match report.into_result() {
        Ok(summary) => {
            ui::step_ok_detail(&ctx, &format!("Restored {}", target), &summary.to_string());
            Ok(())
        }
        Err(e) => {
            debug!("Retrieve of {} missed: {}", target, e);
            Err(PipecacheError::CacheMiss(key.to_hex()))
        }
    }
}
