//! Synchronization primitives used for session state.
//!
//! All group chat state is mutated from short critical sections that never span an `.await`, so the
//! non-async parking_lot locks are the right fit here.

/// A mutual exclusion primitive useful for protecting shared data.
pub type Mutex<T> = parking_lot::Mutex<T>;

/// A reader-writer lock, allowing multiple readers or a single writer at any point in time.
pub type RwLock<T> = parking_lot::RwLock<T>;
