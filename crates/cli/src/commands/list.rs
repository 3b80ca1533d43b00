use std::process::ExitCode;

use anyhow::Result;
use colored::*;
use pinion_core::Project;

use super::task_color;

pub fn execute(project: &Project) -> Result<ExitCode> {
    println!("{}", "Tasks".bold().underline());

    let tasks = project.list_tasks();
    if tasks.is_empty() {
        println!("  {}", "No tasks found".dimmed());
        return Ok(ExitCode::SUCCESS);
    }

    for task in tasks {
        println!(
            "{}  {}",
            task.name.color(task_color(&task.name)).bold(),
            task.command.dimmed()
        );
        if !task.depends_on.is_empty() {
            println!("  {} {}", "depends on:".dimmed(), task.depends_on.join(", "));
        }
        if !task.watch.is_empty() {
            println!("  {} {}", "watches:".dimmed(), task.watch.join(", "));
        }
    }

    Ok(ExitCode::SUCCESS)
}
