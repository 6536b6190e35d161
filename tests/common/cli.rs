use super::Workspace;
use assert_cmd::Command;
use std::ffi::OsStr;
use std::fs;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct BackfillRun {
    pub stdout: String,
    pub stderr: String,
    pub status: std::process::ExitStatus,
    pub duration: Duration,
}

impl BackfillRun {
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Build a command rooted in the workspace with a hermetic environment.
pub fn backfill_cmd(workspace: &Workspace) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("br-backfill"));
    cmd.current_dir(&workspace.root);
    cmd.env_remove("BEADS_DIR");
    cmd.env_remove("BEADS_JSONL");
    cmd.env_remove("BACKFILL_LOG_FORMAT");
    cmd.env("RUST_LOG", "beads_backfill=debug");
    cmd.env("HOME", &workspace.root);
    cmd
}

pub fn run_backfill<I, S>(workspace: &Workspace, args: I, label: &str) -> BackfillRun
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    run_backfill_with_env(
        workspace,
        args,
        std::iter::empty::<(String, String)>(),
        label,
    )
}

pub fn run_backfill_with_env<I, S, E, K, V>(
    workspace: &Workspace,
    args: I,
    env_vars: E,
    label: &str,
) -> BackfillRun
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
    E: IntoIterator<Item = (K, V)>,
    K: AsRef<OsStr>,
    V: AsRef<OsStr>,
{
    let mut cmd = backfill_cmd(workspace);
    cmd.args(args);
    cmd.envs(env_vars);

    let start = Instant::now();
    let output = cmd.output().expect("run br-backfill");
    let duration = start.elapsed();

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let log_dir = workspace.root.join("logs");
    fs::create_dir_all(&log_dir).expect("log dir");
    let log_body = format!(
        "label: {label}\nduration: {duration:?}\nstatus: {}\n\nstdout:\n{stdout}\n\nstderr:\n{stderr}\n",
        output.status,
    );
    fs::write(log_dir.join(format!("{label}.log")), log_body).expect("write log");

    BackfillRun {
        stdout,
        stderr,
        status: output.status,
        duration,
    }
}

/// Pull the JSON document out of stdout.
pub fn extract_json_payload(stdout: &str) -> String {
    let lines: Vec<&str> = stdout.lines().collect();
    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('[') || trimmed.starts_with('{') {
            return lines[idx..].join("\n").trim().to_string();
        }
    }
    stdout.trim().to_string()
}
