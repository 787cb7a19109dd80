//! JSON report of a single supervised run, emitted by `shepherd run --json`
//! and written by `--report`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use shepherd_runner::{CompletedProcess, Dump, ManagedProcess, ProcessResult, RunnerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub command: String,
    pub pid: Option<u32>,
    pub status: RunStatus,
    pub exit_code: Option<i32>,
    pub expected_exit_code: i32,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// One-line failure summary
    pub error: Option<String>,
    pub dump: Option<Dump>,
    pub process: Option<CompletedProcess>,
}

impl RunReport {
    /// Describe how `process` ended up with `result`.
    #[must_use]
    pub fn new(
        process: &ManagedProcess,
        result: &ProcessResult,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        let (status, error, dump, completed) = match result {
            Ok(completed) => (RunStatus::Succeeded, None, None, Some(completed.clone())),
            Err(err @ RunnerError::Timeout { .. }) => {
                (RunStatus::TimedOut, Some(err.summary()), None, None)
            }
            Err(err) => (
                RunStatus::Failed,
                Some(err.summary()),
                err.dump().cloned(),
                None,
            ),
        };

        Self {
            command: process.command().to_string(),
            pid: completed.as_ref().map(|c| c.pid).or_else(|| result_pid(result)),
            status,
            exit_code: process.exit_code(),
            expected_exit_code: process.expected_exit_code(),
            started_at,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            error,
            dump,
            process: completed,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn result_pid(result: &ProcessResult) -> Option<u32> {
    result.as_ref().err().and_then(RunnerError::pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shepherd_runner::testing::ScriptedSpawner;
    use shepherd_runner::{CommandSpec, ExecOptions, Launcher, ReaderMode, ShutdownRegistry};
    use std::sync::Arc;

    fn launcher(spawner: ScriptedSpawner) -> Launcher {
        let registry: &'static ShutdownRegistry = Box::leak(Box::new(ShutdownRegistry::new()));
        Launcher::with_spawner(Arc::new(spawner)).registry(registry)
    }

    #[test]
    fn test_success_report_embeds_process() {
        let dir = tempfile::tempdir().unwrap();
        let process = launcher(ScriptedSpawner::new().stdout("hello\n")).prepare(
            CommandSpec::new("greet"),
            ExecOptions::default()
                .reader(ReaderMode::Blocking)
                .dump_dir(dir.path()),
        );
        let result = process.wait_completed();

        let report = RunReport::new(&process, &result, Utc::now(), Duration::from_millis(12));

        assert_eq!(report.status, RunStatus::Succeeded);
        assert_eq!(report.exit_code, Some(0));
        assert_eq!(report.duration_ms, 12);
        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], "succeeded");
        assert!(json["process"]["all"].is_array());
        assert!(json["dump"].is_null());
    }

    #[test]
    fn test_failure_report_carries_dump() {
        let dir = tempfile::tempdir().unwrap();
        let process = launcher(ScriptedSpawner::new().exit_code(2)).prepare(
            CommandSpec::new("fail"),
            ExecOptions::default()
                .reader(ReaderMode::Blocking)
                .dump_dir(dir.path()),
        );
        let result = process.wait_completed();

        let report = RunReport::new(&process, &result, Utc::now(), Duration::ZERO);

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.exit_code, Some(2));
        assert!(report.pid.is_some());
        assert!(report.error.as_deref().unwrap().contains("exit code 2"));
        assert!(report.dump.as_ref().unwrap().is_persisted());
    }
}
