//! Subcommand presentation. The core returns structured results; everything
//! printed to the terminal is decided here.

use colored::Color;

pub mod check;
pub mod dev;
pub mod graph;
pub mod list;
pub mod run;
pub mod sync;

/// Stable label color for a task name
pub fn task_color(task_name: &str) -> Color {
    // Use a simple hash of the task name bytes for consistent colors
    let hash = task_name
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));

    // Label colors that stay clear of the status colors used for ok/missing/mismatch
    let colors = [
        Color::TrueColor { r: 147, g: 112, b: 219 },
        Color::TrueColor { r: 64, g: 224, b: 208 },
        Color::TrueColor { r: 255, g: 140, b: 0 },
        Color::TrueColor { r: 199, g: 21, b: 133 },
        Color::TrueColor { r: 138, g: 43, b: 226 },
    ];

    colors[(hash % colors.len() as u64) as usize]
}
