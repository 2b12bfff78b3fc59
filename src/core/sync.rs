//! Lock poisoning policy
//!
//! Two policies coexist. Fallible pipeline operations (publish, attach)
//! surface a poisoned lock as an error so the caller learns a worker
//! panicked mid-update. Infallible queue operations recover the guard, as
//! every queue critical section leaves its state consistent.

use std::sync::{LockResult, PoisonError, RwLockReadGuard, RwLockWriteGuard};

fn poisoned(lock: &str, access: &str) -> String {
    format!("{lock} poisoned on {access}: a thread panicked while holding it")
}

/// Read-lock an `RwLock`, mapping poison into the caller's error type
///
/// # Examples
/// ```
/// use std::sync::RwLock;
/// use fanout::core::sync::handle_rwlock_read;
/// use fanout::pubsub::api::PipelineError;
///
/// let targets = RwLock::new(vec![1, 2, 3]);
/// let guard = handle_rwlock_read(targets.read(), |message| PipelineError::Synchronisation {
///     message,
/// })
/// .unwrap();
/// assert_eq!(guard.len(), 3);
/// ```
pub fn handle_rwlock_read<T, E>(
    result: LockResult<RwLockReadGuard<'_, T>>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<RwLockReadGuard<'_, T>, E> {
    result.map_err(|_| error_constructor(poisoned("RwLock", "read")))
}

/// Write-lock an `RwLock`, mapping poison into the caller's error type
pub fn handle_rwlock_write<T, E>(
    result: LockResult<RwLockWriteGuard<'_, T>>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<RwLockWriteGuard<'_, T>, E> {
    result.map_err(|_| error_constructor(poisoned("RwLock", "write")))
}

/// Recover the guard from a possibly poisoned lock
///
/// Only for state that stays consistent even if a holder panicked.
pub fn recover_poison<G>(result: LockResult<G>) -> G {
    result.unwrap_or_else(PoisonError::into_inner)
}
