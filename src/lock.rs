#[cfg(feature = "std")]
use std::sync as impl_;

#[cfg(not(feature = "std"))]
use spin as impl_;

/// Reader-writer lock used by attribute maps and table shards.
///
/// Critical sections guarded by this lock never run user code, so with the
/// `std` backend a poisoned lock can only come from a bug in this crate.
#[repr(transparent)]
pub(crate) struct Lock<T>(impl_::RwLock<T>);

pub(crate) type LockReadGuard<'a, T> = impl_::RwLockReadGuard<'a, T>;

pub(crate) type LockWriteGuard<'a, T> = impl_::RwLockWriteGuard<'a, T>;

impl<T> Lock<T> {
    #[must_use]
    pub(crate) const fn new(value: T) -> Self {
        Self(impl_::RwLock::new(value))
    }

    #[inline]
    pub(crate) fn read(&self) -> LockReadGuard<'_, T> {
        #[cfg(not(feature = "std"))]
        let guard = self.0.read();

        #[cfg(feature = "std")]
        let guard = self.0.read().expect("Unable to acquire property lock");

        guard
    }

    #[inline]
    pub(crate) fn write(&self) -> LockWriteGuard<'_, T> {
        #[cfg(not(feature = "std"))]
        let guard = self.0.write();

        #[cfg(feature = "std")]
        let guard = self.0.write().expect("Unable to acquire property lock");

        guard
    }
}

impl<T: Default> Default for Lock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static_assertions::assert_impl_all!(Lock<u32>: Send, Sync);

    #[test]
    fn test_read_after_write() {
        let lock = Lock::new(1u32);
        *lock.write() += 41;
        assert_eq!(*lock.read(), 42);
    }

    #[test]
    fn test_concurrent_readers() {
        let lock = Lock::new(7u32);
        let a = lock.read();
        let b = lock.read();
        assert_eq!(*a + *b, 14);
    }

    #[cfg(feature = "std")]
    mod std_backend {
        use super::*;

        static_assertions::assert_type_eq_all!(
            LockWriteGuard<'static, u32>,
            std::sync::RwLockWriteGuard<'static, u32>
        );

        #[test]
        fn test_writers_across_threads() {
            let lock = Lock::new(0u32);
            std::thread::scope(|s| {
                for _ in 0..4 {
                    s.spawn(|| {
                        for _ in 0..100 {
                            *lock.write() += 1;
                        }
                    });
                }
            });
            assert_eq!(*lock.read(), 400);
        }
    }

    #[cfg(not(feature = "std"))]
    static_assertions::assert_type_eq_all!(
        LockWriteGuard<'static, u32>,
        spin::RwLockWriteGuard<'static, u32>
    );
}
