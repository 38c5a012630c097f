//! Store command - archive a target's outputs into the store command

use crate::cache::CommandCache;
use crate::cli::args::StoreArgs;
use crate::config::Config;
use crate::error::PipecacheResult;
use crate::ui::{self, UiContext};

/// Execute the store command
///
/// Storing is best effort: a failing store command is reported but never
/// turns into a non-zero exit.
pub async fn execute(args: StoreArgs, config: &Config) -> PipecacheResult<()> {
    let ctx = UiContext::detect();
    let key = args.key.resolve()?;
    let target = args.target.build_target();

    let cache = CommandCache::new(config.cache.clone(), args.target.root.clone());
    let Some(report) = cache.store_with_report(&target, &key, &args.outputs).await else {
        ui::step_warn_hint(
            &ctx,
            "Nothing stored",
            "Set cache.store_command or pass --store-command",
        );
        return Ok(());
    };

    ui::key_value(&ctx, "key", &key.to_hex());
    match (&report.exit, &report.fed) {
        (Ok(()), Ok(summary)) => {
            ui::step_ok_detail(&ctx, &format!("Stored {}", target), &summary.to_string())
        }
        (Err(e), _) | (_, Err(e)) => {
            ui::step_warn_hint(&ctx, &format!("Store of {} failed", target), &e.to_string())
        }
    }

    Ok(())
}
