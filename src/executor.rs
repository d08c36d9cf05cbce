use std::fmt;
use std::process::Command;
use std::time::Instant;

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::error::PipelineError;

/// One external process: program, arguments, working directory and the
/// artifact path the caller expects it to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<Utf8PathBuf>,
    pub output: Utf8PathBuf,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>, output: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            output: output.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)?;
        if let Some(code) = self.exit_code {
            write!(f, " (exit code {code})")?;
        }
        if let Some(command) = &self.command {
            write!(f, ": {command}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageResult {
    Success(Utf8PathBuf),
    ItemFailure(ItemFailure),
    ToolUnavailable(String),
}

impl StageResult {
    pub fn into_result(self) -> Result<Utf8PathBuf, PipelineError> {
        match self {
            StageResult::Success(path) => Ok(path),
            StageResult::ItemFailure(failure) => Err(PipelineError::ItemFailure(failure.to_string())),
            StageResult::ToolUnavailable(reason) => Err(PipelineError::ToolUnavailable(reason)),
        }
    }
}

pub trait StageExecutor: Send + Sync {
    fn run(&self, invocation: &ToolInvocation) -> StageResult;
}

impl<T: StageExecutor + ?Sized> StageExecutor for &T {
    fn run(&self, invocation: &ToolInvocation) -> StageResult {
        (**self).run(invocation)
    }
}

/// Spawns the invocation as a child process and blocks until it exits.
///
/// Standard streams are inherited so the tool's own progress output stays visible.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

impl StageExecutor for SystemExecutor {
    fn run(&self, invocation: &ToolInvocation) -> StageResult {
        if let Some(dir) = &invocation.working_dir {
            if !dir.is_dir() {
                return StageResult::ItemFailure(ItemFailure {
                    reason: format!("working directory {dir} does not exist"),
                    exit_code: None,
                    command: Some(invocation.command_line()),
                });
            }
        }

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args);
        if let Some(dir) = &invocation.working_dir {
            cmd.current_dir(dir);
        }

        tracing::info!("running {}", invocation.command_line());
        let start = Instant::now();
        let status = match cmd.status() {
            Ok(status) => status,
            Err(err) => {
                return StageResult::ToolUnavailable(format!("{}: {err}", invocation.program));
            }
        };
        let elapsed = start.elapsed().as_secs();
        tracing::debug!("{} exited with {status} after {elapsed}s", invocation.program);

        if status.success() {
            return StageResult::Success(invocation.output.clone());
        }
        StageResult::ItemFailure(ItemFailure {
            reason: match status.code() {
                Some(_) => format!("{} failed", invocation.program),
                None => format!("{} terminated by signal", invocation.program),
            },
            exit_code: status.code(),
            command: Some(invocation.command_line()),
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn missing_program_is_tool_unavailable() {
        let invocation = ToolInvocation::new("definitely-not-a-real-tool-7f3a", "out");
        let result = SystemExecutor.run(&invocation);
        assert_matches!(result, StageResult::ToolUnavailable(_));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_item_failure_with_command() {
        let invocation = ToolInvocation::new("sh", "out").args(["-c", "exit 3"]);
        let result = SystemExecutor.run(&invocation);
        assert_matches!(
            result,
            StageResult::ItemFailure(ItemFailure { exit_code: Some(3), command: Some(ref cmd), .. })
                if cmd == "sh -c exit 3"
        );
    }

    #[cfg(unix)]
    #[test]
    fn zero_exit_reports_declared_output() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let invocation = ToolInvocation::new("sh", dir.join("done"))
            .args(["-c", "touch done"])
            .current_dir(dir.clone());
        let result = SystemExecutor.run(&invocation);
        assert_eq!(result, StageResult::Success(dir.join("done")));
        assert!(dir.join("done").exists());
    }

    #[test]
    fn missing_working_dir_is_item_failure() {
        let invocation =
            ToolInvocation::new("sh", "out").current_dir("/nonexistent/genome-pipeline/dir");
        assert_matches!(SystemExecutor.run(&invocation), StageResult::ItemFailure(_));
    }

    #[test]
    fn item_failure_display_includes_diagnostics() {
        let failure = ItemFailure {
            reason: "RepeatMasker failed".to_string(),
            exit_code: Some(2),
            command: Some("RepeatMasker -pa 4 x.fasta".to_string()),
        };
        assert_eq!(
            failure.to_string(),
            "RepeatMasker failed (exit code 2): RepeatMasker -pa 4 x.fasta"
        );
    }
}
