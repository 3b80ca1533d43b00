use std::process::ExitCode;

use anyhow::Result;
use colored::*;
use pinion_core::Project;

use super::task_color;

pub fn execute(project: &Project, task: Option<&str>) -> Result<ExitCode> {
    if let Some(task) = task {
        let order = project.task_order(task)?;
        println!("{} {}", "Execution order for".bold(), task.cyan());
        for (i, name) in order.iter().enumerate() {
            println!("  {}. {}", i + 1, name.color(task_color(name)));
        }
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", "Task Dependency Graph:".bold().underline());

    let graph = project.task_graph();
    let names = graph.task_names();
    if names.is_empty() {
        println!("  {}", "No tasks found".dimmed());
        return Ok(ExitCode::SUCCESS);
    }

    for name in names {
        println!("{}", name.color(task_color(&name)).bold());

        let deps = graph.dependencies(&name);
        if !deps.is_empty() {
            println!("  {} {}", "depends on:".dimmed(), deps.join(", "));
        } else {
            println!("  {}", "no dependencies".dimmed());
        }
        println!();
    }

    Ok(ExitCode::SUCCESS)
}
