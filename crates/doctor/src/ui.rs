//! Console output helpers shared by the doctor commands.
//!
//! Provides consistent formatting for the operator-facing report lines.

use colored::Colorize;

/// Print a wide section banner.
pub fn section(title: &str) {
    println!();
    println!("{}", "=".repeat(80));
    println!("{title}");
    println!("{}", "=".repeat(80));
}

/// Print a success line.
pub fn success(message: &str) {
    println!("✅ {}", message.green());
}

/// Print a warning line.
pub fn warning(message: &str) {
    println!("⚠️  {}", message.yellow());
}

/// Print an error line.
pub fn error(message: &str) {
    println!("❌ {}", message.red());
}
