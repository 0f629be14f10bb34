//! Compile-command synthesis pipeline.
//!
//! Fingerprinting, command rendering, incremental filtering, and command
//! execution, in that order.

pub mod exec;
pub mod filter;
pub mod fingerprint;
pub mod synth;

pub use exec::{CommandExecutor, ExecOutcome};
pub use filter::{filter_stale, BuildMetadata, IncrementalStore, JsonStore};
pub use fingerprint::command_fingerprint;
pub use synth::CommandSynthesizer;

use anyhow::{Context, Result};

/// Run `work` on a dedicated rayon pool of `jobs` threads, or on the
/// ambient pool when no job count is given. Keeping the pool local lets
/// the synthesis and execution phases size their parallelism separately.
pub(crate) fn with_pool<R: Send>(
    jobs: Option<usize>,
    work: impl FnOnce() -> R + Send,
) -> Result<R> {
    match jobs {
        Some(jobs) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(jobs)
                .build()
                .context("failed to build worker thread pool")?;
            Ok(pool.install(work))
        }
        None => Ok(work()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_sizes_are_independent() {
        let first = with_pool(Some(2), rayon::current_num_threads).unwrap();
        let second = with_pool(Some(3), rayon::current_num_threads).unwrap();
        assert_eq!(first, 2);
        assert_eq!(second, 3);
    }
}
