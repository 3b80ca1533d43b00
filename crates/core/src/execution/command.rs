//! Command construction and execution
//!
//! Task commands are split into argv with shell-word rules but are never
//! handed to a shell. The executable is resolved up front so a managed tool
//! can only ever come from the project tool directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::env::{search_path, Environment};
use crate::lockfile::Lockfile;
use crate::tools::{binary_path, is_executable, TOOLCHAIN_NAME};
use crate::types::{PinionError, PinionResult};

/// Split a command line into argv.
///
/// Single quotes are literal, double quotes allow `\"`, `\\`, `\$` and
/// `` \` `` escapes, a bare backslash escapes the next character. Shell
/// operators have no special meaning.
pub fn tokenize(command: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => current.push(c),
                        None => return Err("unterminated single quote".to_string()),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => current.push(c),
                            Some('\n') => {}
                            Some(c) => {
                                current.push('\\');
                                current.push(c);
                            }
                            None => return Err("unterminated double quote".to_string()),
                        },
                        Some(c) => current.push(c),
                        None => return Err("unterminated double quote".to_string()),
                    }
                }
            }
            '\\' => match chars.next() {
                Some('\n') => {}
                Some(c) => {
                    in_word = true;
                    current.push(c);
                }
                None => return Err("trailing backslash".to_string()),
            },
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// A fully resolved task invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCommand {
    pub task: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Environment,
}

impl PreparedCommand {
    /// Process builder with the exact environment, nothing inherited
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&self.cwd)
            .env_clear()
            .envs(&self.env);
        command
    }

    /// `program args...` for display
    pub fn display_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Resolves executables against the lockfile and runs prepared commands
pub struct CommandExecutor<'a> {
    lockfile: &'a Lockfile,
    tool_dir: &'a Path,
}

impl<'a> CommandExecutor<'a> {
    pub fn new(lockfile: &'a Lockfile, tool_dir: &'a Path) -> Self {
        Self { lockfile, tool_dir }
    }

    /// Resolve `program` to a path.
    ///
    /// A locked tool resolves only to the tool directory and never falls back
    /// to `PATH`. The toolchain binary is the exception: it is not installed
    /// by us, so it comes from `PATH`.
    pub fn resolve(&self, program: &str, cwd: &Path, env: &Environment) -> PinionResult<PathBuf> {
        if program == TOOLCHAIN_NAME {
            return search_path(program, env)
                .ok_or_else(|| PinionError::ExecutableNotFound(program.to_string()));
        }

        let locked = self
            .lockfile
            .tool_by_bin(program)
            .or_else(|| self.lockfile.tool(program));
        if let Some(tool) = locked {
            let bin = tool.bin.as_deref().unwrap_or(program);
            let path = binary_path(self.tool_dir, bin);
            if !is_executable(&path) {
                return Err(PinionError::ToolNotInstalled {
                    name: tool.name().unwrap_or(program).to_string(),
                    path,
                });
            }
            return Ok(path);
        }

        if program.contains('/') || program.contains(std::path::MAIN_SEPARATOR) {
            let path = cwd.join(program);
            if is_executable(&path) {
                return Ok(path);
            }
            return Err(PinionError::ExecutableNotFound(path.display().to_string()));
        }

        search_path(program, env).ok_or_else(|| PinionError::ExecutableNotFound(program.to_string()))
    }

    /// Run with inherited stdio; a non-zero exit is an error tagged with the task
    pub async fn execute(&self, prepared: &PreparedCommand) -> PinionResult<()> {
        tracing::debug!(
            task = %prepared.task,
            program = %prepared.program.display(),
            args = ?prepared.args,
            cwd = %prepared.cwd.display(),
            "spawning task"
        );

        let status = prepared
            .to_command()
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| {
                PinionError::task(
                    &prepared.task,
                    format!("failed to start {}: {}", prepared.program.display(), e),
                )
            })?;

        if !status.success() {
            let message = match status.code() {
                Some(code) => format!("exited with code {}", code),
                None => "terminated by signal".to_string(),
            };
            return Err(PinionError::task(&prepared.task, message));
        }
        Ok(())
    }
}
