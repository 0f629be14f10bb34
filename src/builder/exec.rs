//! Parallel execution of synthesized compile commands.
//!
//! Each record runs from its own execution directory. A failing command
//! is reported and never aborts the batch; the caller decides what to do
//! with the outcomes.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::builder::with_pool;
use crate::core::CompileCommand;
use crate::util::process::exec_shell;

/// Result of running one compile command (and its bitcode twin, if any).
#[derive(Debug)]
pub struct ExecOutcome {
    pub file: std::path::PathBuf,
    pub fingerprint: String,
    pub success: bool,
    pub output: String,
}

/// Runs compile commands across a rayon pool.
pub struct CommandExecutor {
    jobs: Option<usize>,
    show_progress: bool,
}

impl CommandExecutor {
    pub fn new(jobs: Option<usize>, show_progress: bool) -> Self {
        CommandExecutor {
            jobs,
            show_progress,
        }
    }

    pub fn execute(&self, commands: &[CompileCommand]) -> Result<Vec<ExecOutcome>> {
        // Under verbose logging the per-file lines replace the bar.
        let progress = if self.show_progress {
            let bar = ProgressBar::new(commands.len() as u64);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} compiling [{bar:40.cyan/blue}] {pos}/{len}")
                    .unwrap()
                    .progress_chars("#>-"),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        let outcomes: Vec<ExecOutcome> = with_pool(self.jobs, || {
            commands
                .par_iter()
                .map(|cmd| {
                    let outcome = run_one(cmd);
                    progress.inc(1);
                    outcome
                })
                .collect()
        })?;
        progress.finish_and_clear();

        let failed = outcomes.iter().filter(|o| !o.success).count();
        if failed > 0 {
            tracing::warn!("{failed} of {} command(s) failed", outcomes.len());
        } else {
            tracing::info!("all {} command(s) succeeded", outcomes.len());
        }
        Ok(outcomes)
    }
}

fn run_one(cmd: &CompileCommand) -> ExecOutcome {
    tracing::debug!("compiling {}", cmd.file.display());

    let (mut success, mut output) = match exec_shell(&cmd.command, &cmd.directory) {
        Ok(result) => result,
        Err(err) => (false, err.to_string()),
    };
    if success {
        if let Some(bitcode) = &cmd.bitcode_command {
            match exec_shell(bitcode, &cmd.directory) {
                Ok((bc_success, bc_output)) => {
                    success = bc_success;
                    output.push_str(&bc_output);
                }
                Err(err) => {
                    success = false;
                    output.push_str(&err.to_string());
                }
            }
        }
    }

    if !success {
        tracing::warn!("command failed for {}:\n{output}", cmd.file.display());
    }
    ExecOutcome {
        file: cmd.file.clone(),
        fingerprint: cmd.fingerprint.clone(),
        success,
        output,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn command(line: &str, fingerprint: &str) -> CompileCommand {
        CompileCommand {
            directory: std::env::temp_dir(),
            file: PathBuf::from("/p/a.c"),
            command: line.to_string(),
            fingerprint: fingerprint.to_string(),
            bitcode_command: None,
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_does_not_abort_batch() {
        let commands = vec![command("false", "f1"), command("true", "f2")];
        let outcomes = CommandExecutor::new(Some(2), false).execute(&commands).unwrap();

        assert_eq!(outcomes.len(), 2);
        let by_fp = |fp: &str| outcomes.iter().find(|o| o.fingerprint == fp).unwrap();
        assert!(!by_fp("f1").success);
        assert!(by_fp("f2").success);
    }

    #[cfg(unix)]
    #[test]
    fn test_bitcode_command_runs_after_primary() {
        let mut cmd = command("true", "f1");
        cmd.bitcode_command = Some("false".to_string());
        let outcomes = CommandExecutor::new(Some(1), false).execute(&[cmd]).unwrap();
        assert!(!outcomes[0].success);
    }

    #[cfg(unix)]
    #[test]
    fn test_output_captured() {
        let outcomes = CommandExecutor::new(Some(1), false)
            .execute(&[command("echo built", "f1")])
            .unwrap();
        assert!(outcomes[0].output.contains("built"));
    }
}
