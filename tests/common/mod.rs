//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Install a log subscriber once. `RUST_LOG=thinmeta=trace` shows every
/// rebalance decision.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .try_init();
    });
}

/// Keys `0, step, 2*step, ...` each mapped to its own value.
pub fn entries(n: u64, step: u64) -> Vec<(u64, [u8; 8])> {
    (0..n).map(|i| (i * step, (i * step).to_le_bytes())).collect()
}

/// Deterministic permutation of `keys`.
pub fn shuffled(mut keys: Vec<u64>, seed: u64) -> Vec<u64> {
    let mut state = seed;
    for i in (1..keys.len()).rev() {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let j = ((state >> 33) % (i as u64 + 1)) as usize;
        keys.swap(i, j);
    }
    keys
}
