#![allow(dead_code)]

use core::num::NonZeroUsize;
use soe::{config::ExecutorConfig, lockable::Lockable};
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Route `tracing` output to the test harness. `RUST_LOG` overrides the
/// default `soe=debug` filter. The first call wins.
pub fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("soe=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_thread_ids(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Config running on a dedicated pool of `threads` workers.
pub fn config(loopname: &str, threads: usize) -> ExecutorConfig {
    init_logging();
    ExecutorConfig::default()
        .with_loopname(loopname)
        .with_threads(NonZeroUsize::new(threads).expect("config: threads"))
}

pub fn locks(n: usize) -> Vec<Lockable> {
    (0..n).map(|_| Lockable::new()).collect()
}

pub fn all_free(locks: &[Lockable]) -> bool {
    locks.iter().all(|lock| !lock.is_locked())
}
