//! Closure-based lock wrappers and small helpers shared by the registries.
//!
//! [`Mutex`] and [`RwLock`] wrap their `std::sync` counterparts so that a guard never escapes the
//! closure it was taken for. The `safe_*` methods surface a poisoned lock as an error; the
//! `super_safe_*` variants panic on poison and are used where a poisoned registry leaves nothing
//! sensible to do.

use std::{
    sync::{
        Mutex as Mutex_, MutexGuard, PoisonError, RwLock as RwLock_, RwLockReadGuard,
        RwLockWriteGuard,
    },
    time::{SystemTime, UNIX_EPOCH},
};

#[derive(Debug, Default)]
pub struct Mutex<T: ?Sized>(Mutex_<T>);

impl<T> Mutex<T> {
    pub fn new(v: T) -> Self {
        Mutex(Mutex_::new(v))
    }

    /// Locks and runs `thunk` on the inner value. Never unwrap inside the closure: a panic there
    /// poisons the lock for every other holder.
    pub fn safe_lock<F, Ret>(&self, thunk: F) -> Result<Ret, PoisonError<MutexGuard<'_, T>>>
    where
        F: FnOnce(&mut T) -> Ret,
    {
        let mut lock = self.0.lock()?;
        let return_value = thunk(&mut *lock);
        drop(lock);
        Ok(return_value)
    }

    pub fn super_safe_lock<F, Ret>(&self, thunk: F) -> Ret
    where
        F: FnOnce(&mut T) -> Ret,
    {
        self.safe_lock(thunk).unwrap()
    }
}

/// Reader/writer counterpart of [`Mutex`]. Readers run concurrently, a writer runs alone.
#[derive(Debug, Default)]
pub struct RwLock<T: ?Sized>(RwLock_<T>);

impl<T> RwLock<T> {
    pub fn new(v: T) -> Self {
        RwLock(RwLock_::new(v))
    }

    pub fn safe_read<F, Ret>(&self, thunk: F) -> Result<Ret, PoisonError<RwLockReadGuard<'_, T>>>
    where
        F: FnOnce(&T) -> Ret,
    {
        let lock = self.0.read()?;
        let return_value = thunk(&*lock);
        drop(lock);
        Ok(return_value)
    }

    pub fn safe_write<F, Ret>(
        &self,
        thunk: F,
    ) -> Result<Ret, PoisonError<RwLockWriteGuard<'_, T>>>
    where
        F: FnOnce(&mut T) -> Ret,
    {
        let mut lock = self.0.write()?;
        let return_value = thunk(&mut *lock);
        drop(lock);
        Ok(return_value)
    }

    pub fn super_safe_read<F, Ret>(&self, thunk: F) -> Ret
    where
        F: FnOnce(&T) -> Ret,
    {
        self.safe_read(thunk).unwrap()
    }

    pub fn super_safe_write<F, Ret>(&self, thunk: F) -> Ret
    where
        F: FnOnce(&mut T) -> Ret,
    {
        self.safe_write(thunk).unwrap()
    }
}

/// Milliseconds since the unix epoch, 0 if the clock is before it.
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_super_safe_lock() {
        let m = Mutex::new(1u32);
        m.safe_lock(|i| *i += 1).unwrap();
        m.super_safe_lock(|i| *i = (*i).checked_add(1).unwrap_or_default());
        assert_eq!(m.super_safe_lock(|i| *i), 3);
    }

    #[test]
    fn test_rwlock_read_after_write() {
        let l = RwLock::new(Vec::<u8>::new());
        l.super_safe_write(|v| v.push(7));
        assert_eq!(l.super_safe_read(|v| v.clone()), vec![7]);
    }
}
