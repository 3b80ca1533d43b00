use std::process::ExitCode;

use anyhow::Result;
use colored::*;
use pinion_core::execution::PreparedCommand;
use pinion_core::tools::GoToolchain;
use pinion_core::Project;

use super::task_color;

/// Header printed before each task in a chain
pub fn print_task_header(prepared: &PreparedCommand) {
    println!();
    println!(
        "┌─ {} {}",
        "Running task".bold(),
        prepared.task.color(task_color(&prepared.task)).bold()
    );
    println!("└─ {} {}", "$".bright_black(), prepared.display_line().bright_black());
}

pub async fn execute(project: &Project, task: &str, args: &[String]) -> Result<ExitCode> {
    let order = project.task_order(task)?;
    println!(
        "{} {}",
        "Running".bold(),
        order
            .iter()
            .map(|name| name.color(task_color(name)).to_string())
            .collect::<Vec<_>>()
            .join(" → ")
    );

    project
        .run_task(task, args, &GoToolchain::new(), print_task_header)
        .await?;

    println!();
    println!(
        "{} {}",
        "✓".green().bold(),
        format!("Completed {}", task).green().bold()
    );

    Ok(ExitCode::SUCCESS)
}
