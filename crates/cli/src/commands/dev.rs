use std::process::ExitCode;

use anyhow::Result;
use colored::*;
use pinion_core::dev::keys::stdin_is_terminal;
use pinion_core::dev::SupervisorConfig;
use pinion_core::tools::GoToolchain;
use pinion_core::Project;

use super::run::print_task_header;

pub async fn execute(project: &Project, args: &[String], config: &SupervisorConfig) -> Result<ExitCode> {
    if config.hotkeys && stdin_is_terminal() {
        println!(
            "{} {} reload, {} stop",
            "dev:".cyan().bold(),
            "Ctrl-R".bold(),
            "Ctrl-C".bold()
        );
    }

    project
        .dev(args, &GoToolchain::new(), config, print_task_header)
        .await?;

    println!("{} {}", "✓".green().bold(), "dev stopped".green());
    Ok(ExitCode::SUCCESS)
}
