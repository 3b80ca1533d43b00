use std::collections::BTreeMap;
use std::path::PathBuf;

use toml::Value;

/// Name of the task driven by `pinion dev`
pub const DEV_TASK: &str = "dev";

const TASK_FIELDS: &[&str] = &["command", "env", "cwd", "depends_on", "watch"];

/// A declared unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: String,
    pub command: String,
    pub env: BTreeMap<String, String>,
    /// Relative to the manifest directory
    pub cwd: Option<PathBuf>,
    pub depends_on: Vec<String>,
    /// Glob patterns, only allowed on the `dev` task
    pub watch: Vec<String>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            env: BTreeMap::new(),
            cwd: None,
            depends_on: Vec::new(),
            watch: Vec::new(),
        }
    }

    pub fn with_dependencies(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|d| d.to_string()).collect();
        self
    }
}

/// Project a `[tasks.<name>]` table onto a [`TaskSpec`]
pub fn parse_task(name: &str, value: &Value) -> Result<TaskSpec, String> {
    let table = value
        .as_table()
        .ok_or_else(|| format!("tasks.{} must be a table", name))?;

    for key in table.keys() {
        if !TASK_FIELDS.contains(&key.as_str()) {
            return Err(format!("unsupported field 'tasks.{}.{}'", name, key));
        }
    }

    let command = match table.get("command") {
        Some(Value::String(command)) => command.clone(),
        Some(_) => return Err(format!("tasks.{}.command must be a string", name)),
        None => return Err(format!("tasks.{}.command is required", name)),
    };
    if command.trim().is_empty() {
        return Err(format!("tasks.{}.command must not be empty", name));
    }

    let mut env = BTreeMap::new();
    if let Some(value) = table.get("env") {
        let env_table = value
            .as_table()
            .ok_or_else(|| format!("tasks.{}.env must be a table", name))?;
        for (key, value) in env_table {
            let value = value
                .as_str()
                .ok_or_else(|| format!("tasks.{}.env.{} must be a string", name, key))?;
            env.insert(key.clone(), value.to_string());
        }
    }

    let cwd = match table.get("cwd") {
        Some(Value::String(cwd)) if !cwd.trim().is_empty() => Some(PathBuf::from(cwd)),
        Some(Value::String(_)) => None,
        Some(_) => return Err(format!("tasks.{}.cwd must be a string", name)),
        None => None,
    };

    let mut depends_on: Vec<String> = Vec::new();
    for dep in string_list(table.get("depends_on"), name, "depends_on")? {
        if !depends_on.contains(&dep) {
            depends_on.push(dep);
        }
    }

    let watch = string_list(table.get("watch"), name, "watch")?;
    if !watch.is_empty() && name != DEV_TASK {
        return Err(format!(
            "unsupported field 'tasks.{}.watch' (only the '{}' task may declare watch patterns)",
            name, DEV_TASK
        ));
    }

    Ok(TaskSpec {
        name: name.to_string(),
        command,
        env,
        cwd,
        depends_on,
        watch,
    })
}

fn string_list(value: Option<&Value>, task: &str, field: &str) -> Result<Vec<String>, String> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    let items = value
        .as_array()
        .ok_or_else(|| format!("tasks.{}.{} must be an array of strings", task, field))?;
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| format!("tasks.{}.{} must be an array of strings", task, field))
        })
        .collect()
}
