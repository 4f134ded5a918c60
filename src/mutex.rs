/// Mutual exclusion for a bus handle shared between contexts.
///
/// Implementations must behave like a recursive mutex: a protected
/// operation holds the lock while it composes raw primitives, and nested
/// acquisition from the same context must not deadlock.
pub trait BusMutex {
    fn lock(&self);
    fn unlock(&self);
}

/// Single-context bus; locking is a no-op.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct NoMutex;

impl BusMutex for NoMutex {
    fn lock(&self) {}

    fn unlock(&self) {}
}

impl<T: BusMutex + ?Sized> BusMutex for &T {
    fn lock(&self) {
        (**self).lock();
    }

    fn unlock(&self) {
        (**self).unlock();
    }
}
