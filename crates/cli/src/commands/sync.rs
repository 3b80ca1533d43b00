use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use colored::*;
use pinion_core::results::SyncAction;
use pinion_core::tools::pool::PoolConfig;
use pinion_core::tools::GoToolchain;
use pinion_core::Project;

pub async fn execute(project: &Project, jobs: Option<usize>) -> Result<ExitCode> {
    println!("{}", "Syncing tools".bold());

    let report = project
        .sync(Arc::new(GoToolchain::new()), &PoolConfig { max_parallel: jobs })
        .await?;

    if let Some(version) = &report.toolchain {
        println!("  {} {}", "toolchain".dimmed(), version.cyan());
    }

    for row in &report.rows {
        let action = match row.action {
            SyncAction::Installed => row.action.to_string().green().bold(),
            SyncAction::Unchanged => row.action.to_string().dimmed(),
        };
        println!("  {:<9} {} {}", action, row.name.bold(), row.resolved.dimmed());
    }

    for extra in &report.extra_binaries {
        println!(
            "  {} {}",
            "Warning:".yellow().bold(),
            format!("{} is not declared in [tools]", extra).yellow()
        );
    }

    println!();
    println!(
        "{} {}",
        "✓".green().bold(),
        format!("Wrote {}", project.lockfile_path.display()).green().bold()
    );

    Ok(ExitCode::SUCCESS)
}
