//! Process environment construction
//!
//! Every subprocess is spawned with a fully specified environment: the
//! ambient variables, the project tool directory first on `PATH`, then the
//! task's own overrides.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::tools::{is_executable, EXE_SUFFIX};
use crate::types::{PinionError, PinionResult};

/// Sorted environment handed to `env_clear().envs(..)`
pub type Environment = BTreeMap<String, String>;

pub fn ambient_environment() -> Environment {
    environment_from(std::env::vars_os())
}

/// Keep the UTF-8 variables of `vars`; the rest are logged and dropped
fn environment_from(vars: impl IntoIterator<Item = (OsString, OsString)>) -> Environment {
    vars.into_iter()
        .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (Ok(key), Err(_)) => {
                tracing::debug!(%key, "dropping environment variable with non-UTF-8 value");
                None
            }
            (Err(key), _) => {
                tracing::debug!(key = %key.to_string_lossy(), "dropping non-UTF-8 environment variable");
                None
            }
        })
        .collect()
}

/// Name of the search-path variable as it appears in `env`
pub fn path_key(env: &Environment) -> String {
    if cfg!(windows) {
        env.keys()
            .find(|key| key.eq_ignore_ascii_case("PATH"))
            .cloned()
            .unwrap_or_else(|| "Path".to_string())
    } else {
        "PATH".to_string()
    }
}

/// Put `dir` first on the search path, dropping duplicate entries
pub fn prepend_path(env: &mut Environment, dir: &Path) -> PinionResult<()> {
    let key = path_key(env);
    let existing = env.get(&key).cloned().unwrap_or_default();

    let mut entries: Vec<PathBuf> = vec![dir.to_path_buf()];
    for entry in std::env::split_paths(&existing) {
        if entry.as_os_str().is_empty() || entries.contains(&entry) {
            continue;
        }
        entries.push(entry);
    }

    let joined: OsString = std::env::join_paths(entries).map_err(|e| {
        PinionError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
    })?;
    let joined = joined.into_string().map_err(|_| {
        PinionError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "search path is not valid UTF-8",
        ))
    })?;
    env.insert(key, joined);
    Ok(())
}

/// Ambient environment + tool directory on `PATH` + task overrides (task wins)
pub fn task_environment(
    base: &Environment,
    tool_dir: &Path,
    overrides: &BTreeMap<String, String>,
) -> PinionResult<Environment> {
    let mut env = base.clone();
    prepend_path(&mut env, tool_dir)?;
    for (key, value) in overrides {
        env.insert(key.clone(), value.clone());
    }
    Ok(env)
}

/// Look `program` up on the search path carried by `env`
pub fn search_path(program: &str, env: &Environment) -> Option<PathBuf> {
    let paths = env.get(&path_key(env))?;
    for dir in std::env::split_paths(paths) {
        let candidate = dir.join(program);
        if is_executable(&candidate) {
            return Some(candidate);
        }
        if !EXE_SUFFIX.is_empty() {
            let with_suffix = dir.join(format!("{}{}", program, EXE_SUFFIX));
            if is_executable(&with_suffix) {
                return Some(with_suffix);
            }
        }
    }
    None
}
