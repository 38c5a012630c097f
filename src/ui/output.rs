//! Output functions for consistent CLI formatting

use super::context::UiContext;
use console::style;

/// Display a success step with detail
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_styled_output() {
        println!(
            "  {} {} ({})",
            style("[OK]").green(),
            message,
            style(detail).dim()
        );
    } else {
        println!("  [OK] {} ({})", message, detail);
    }
}

/// Display a warning step with hint
pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    if ctx.use_styled_output() {
        println!(
            "  {} {} - {}",
            style("[WARN]").yellow(),
            message,
            style(hint).dim()
        );
    } else {
        println!("  [WARN] {} - {}", message, hint);
    }
}

/// Display an error step with detail
pub fn step_error_detail(ctx: &UiContext, message: &str, detail: &str) {
    if ctx.use_styled_output() {
        println!("  {} {}: {}", style("[FAIL]").red(), message, style(detail).red());
    } else {
        println!("  [FAIL] {}: {}", message, detail);
    }
}

/// Display a remark/hint
pub fn remark(ctx: &UiContext, message: &str) {
    if ctx.use_styled_output() {
        println!("  {}", style(message).dim());
    } else {
        println!("  {}", message);
    }
}

/// Print styled key-value pair
pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    if ctx.use_styled_output() {
        println!("  {}: {}", style(key).dim(), value);
    } else {
        println!("  {}: {}", key, value);
    }
}
