mod cli;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use capture::{ops, CaptureOptions};

use crate::cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "capture=debug" } else { "capture=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    if !cli.project_root.exists() {
        eprintln!(
            "error: project root does not exist: {}",
            cli.project_root.display()
        );
        return ExitCode::FAILURE;
    }

    let options = CaptureOptions {
        project_root: cli.project_root,
        output_dir: cli.output_dir,
        build_type: cli.build_type,
        build_path: cli.build_path,
        prefers: cli.prefers,
        compiler_id: cli.compiler_id,
        generate_bitcode: cli.generate_bitcode,
        update_all: cli.update_all,
        extra_build_args: cli.extra_build_args,
        dry_run: cli.dry_run,
        jobs: cli.jobs,
        verbose: cli.verbose,
    };

    match ops::run(&options) {
        Ok(summary) => {
            if options.dry_run {
                eprintln!(
                    "{} command(s) synthesized, {} stale",
                    summary.total_commands, summary.stale
                );
            } else {
                eprintln!(
                    "{} command(s) synthesized, {} stale, {} succeeded, {} failed",
                    summary.total_commands, summary.stale, summary.succeeded, summary.failed
                );
            }
            if summary.failed > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
