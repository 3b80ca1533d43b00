use std::process::ExitCode;

use anyhow::Result;
use colored::*;
use pinion_core::results::{CheckReport, ToolStatus};
use pinion_core::Project;
use serde::Serialize;

#[derive(Serialize)]
struct Summary<'a> {
    tools: &'a [pinion_core::results::ToolStatusRow],
    missing: usize,
    mismatched: usize,
    extra: &'a [String],
}

pub fn execute(project: &Project, json: bool) -> Result<ExitCode> {
    let report = project.check()?;

    if json {
        let summary = Summary {
            tools: &report.rows,
            missing: report.missing,
            mismatched: report.mismatched,
            extra: &report.extra_binaries,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_table(&report);
    }

    if report.is_ready() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn short(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}

fn print_table(report: &CheckReport) {
    println!("{}", "Tools".bold().underline());

    if report.rows.is_empty() {
        println!("  {}", "No tools declared".dimmed());
    }

    for row in &report.rows {
        let status = match row.status {
            ToolStatus::Ok => row.status.to_string().green().bold(),
            ToolStatus::Missing => row.status.to_string().red().bold(),
            ToolStatus::Mismatch => row.status.to_string().yellow().bold(),
        };
        println!(
            "  {:<9} {} {}",
            status,
            row.name.bold(),
            format!("({})", row.bin).dimmed()
        );
        if row.status == ToolStatus::Mismatch {
            println!(
                "            {} {}  {} {}",
                "want".dimmed(),
                short(&row.want),
                "have".dimmed(),
                short(&row.have)
            );
        }
    }

    for extra in &report.extra_binaries {
        println!(
            "  {} {}",
            "Warning:".yellow().bold(),
            format!("{} is not declared in [tools]", extra).yellow()
        );
    }

    println!();
    if report.is_ready() {
        println!("{} {}", "✓".green().bold(), "All tools verified".green().bold());
    } else {
        println!(
            "{} {} missing, {} mismatched (run `pinion sync`)",
            "✗".red().bold(),
            report.missing,
            report.mismatched
        );
    }
}
