#![allow(unused_macros)]

/// Helper macro for locking items, yielding [`crate::Error::LockError`] on poison
///
/// ```rust, ignore
///  let mut data = lock!(my_mutex)?;
///  data.push(42);
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock.lock().map_err(|_| crate::Error::LockError)
    };
}

/// Helper macro for running a closure against a locked item
///
/// ```rust, ignore
///  let count = with_lock!(my_mutex, |items: &mut Vec<u32>| items.len())?;
/// ```
macro_rules! with_lock {
    ($lock:expr, $closure:expr) => {{
        lock!($lock).map(|mut guard| $closure(&mut *guard))
    }};
}
