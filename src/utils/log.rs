// src/utils/log.rs

//! Banner-style helpers for console output.
//!
//! Everything is routed through the `log` facade so that the level filter
//! installed by the binary applies to banners as well.

/// Width of separator lines.
const WIDTH: usize = 60;

/// Log a separator line
pub fn separator() {
    log::info!("{}", "─".repeat(WIDTH));
}

/// Log a header
pub fn header(title: &str) {
    let border = "═".repeat(WIDTH);
    log::info!("{}", border);
    log::info!("  {}", title);
    log::info!("{}", border);
}

/// Log a sub-item (indented)
pub fn sub_item(message: &str) {
    log::info!("    {}", message);
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    log::info!("[SUMMARY] {}", title);
    for (key, value) in items {
        log::info!("    {}: {}", key, value);
    }
}

/// Render a block of notification lines for the console.
pub fn block(title: &str, lines: &[String]) {
    separator();
    log::info!("{}", title);
    for line in lines {
        sub_item(line);
    }
    separator();
}
