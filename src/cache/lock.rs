//! Poison-tolerant guards for the in-process cache.
//!
//! A panic while holding the lock leaves at worst one stale count, which the
//! entry's expiry bounds, so the guard is recovered instead of propagated.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read()
        .unwrap_or_else(|poisoned| recover(poisoned, source, op, "read"))
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write()
        .unwrap_or_else(|poisoned| recover(poisoned, source, op, "write"))
}

fn recover<G>(
    poisoned: PoisonError<G>,
    source: &'static str,
    op: &'static str,
    mode: &'static str,
) -> G {
    warn!(
        op,
        source,
        mode,
        "recovered poisoned count cache lock; entries may be stale until they expire"
    );
    poisoned.into_inner()
}
