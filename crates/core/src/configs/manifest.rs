use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use toml::Table;

use crate::configs::tasks::{parse_task, TaskSpec};
use crate::types::{PinionError, PinionResult};

pub const MANIFEST_NAME: &str = "pinion.toml";

const MANIFEST_FIELDS: &[&str] = &["tools", "tasks"];

/// Declared tool pins: short name or module path -> version string
pub type ToolRequirements = BTreeMap<String, String>;

#[derive(Debug, Clone)]
pub struct Manifest {
    /// Absolute path of `pinion.toml`
    pub path: PathBuf,
    /// Directory containing the manifest; task `cwd`s and the tool directory
    /// are relative to it
    pub dir: PathBuf,
    pub tasks: BTreeMap<String, TaskSpec>,
    pub tools: ToolRequirements,
}

/// Walk up from `start_dir` until a `pinion.toml` is found
pub fn find_manifest(start_dir: &Path) -> PinionResult<PathBuf> {
    let mut current = Some(start_dir);
    while let Some(dir) = current {
        let candidate = dir.join(MANIFEST_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
        current = dir.parent();
    }
    Err(PinionError::Manifest {
        path: start_dir.join(MANIFEST_NAME),
        message: format!(
            "no {} found in {} or any parent directory",
            MANIFEST_NAME,
            start_dir.display()
        ),
    })
}

pub fn load_manifest(path: &Path) -> PinionResult<Manifest> {
    let path = std::path::absolute(path)?;
    let content = std::fs::read_to_string(&path).map_err(|e| PinionError::Manifest {
        path: path.clone(),
        message: format!("failed to read: {}", e),
    })?;
    parse_manifest(&content, &path)
}

/// Parse manifest text. `path` only locates the manifest directory and
/// labels errors.
pub fn parse_manifest(content: &str, path: &Path) -> PinionResult<Manifest> {
    let error = |message: String| PinionError::Manifest {
        path: path.to_path_buf(),
        message,
    };

    let root: Table = toml::from_str(content).map_err(|e| error(e.to_string()))?;

    for key in root.keys() {
        if !MANIFEST_FIELDS.contains(&key.as_str()) {
            return Err(error(format!("unsupported field '{}' in manifest", key)));
        }
    }

    let mut tools = ToolRequirements::new();
    if let Some(value) = root.get("tools") {
        let table = value
            .as_table()
            .ok_or_else(|| error("'tools' must be a table".to_string()))?;
        for (name, version) in table {
            let version = version
                .as_str()
                .ok_or_else(|| error(format!("tools.{} must be a version string", name)))?;
            tools.insert(name.clone(), version.to_string());
        }
    }

    let mut tasks = BTreeMap::new();
    if let Some(value) = root.get("tasks") {
        let table = value
            .as_table()
            .ok_or_else(|| error("'tasks' must be a table".to_string()))?;
        for (name, task) in table {
            let spec = parse_task(name, task).map_err(error)?;
            tasks.insert(name.clone(), spec);
        }
    }

    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok(Manifest {
        path: path.to_path_buf(),
        dir,
        tasks,
        tools,
    })
}

impl Manifest {
    /// In-memory manifest rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            path: dir.join(MANIFEST_NAME),
            dir,
            tasks: BTreeMap::new(),
            tools: ToolRequirements::new(),
        }
    }

    pub fn with_task(mut self, task: TaskSpec) -> Self {
        self.tasks.insert(task.name.clone(), task);
        self
    }

    pub fn with_tool(mut self, name: &str, version: &str) -> Self {
        self.tools.insert(name.to_string(), version.to_string());
        self
    }
}
