//! Worker-slot admission control for fan-out operations
//!
//! This crate provides the capacity pool used to bound how many transfer tasks may be
//! outstanding at once. A [`SlotPool`] hands out [`Slot`]s; each slot is one unit of the
//! concurrency cap and is returned to the pool when dropped.
//!
//! # Overview
//!
//! Admission is non-blocking: [`SlotPool::try_acquire`] either returns a slot immediately or
//! `None` when the pool is at capacity. Callers that need to wait combine it with their own
//! wakeup strategy (the fan-out scheduler sleeps for a poll interval and reaps finished tasks
//! before trying again).
//!
//! Since a slot is released by `Drop`, a slot can be freed at most once: whoever owns the
//! slot value owns the unit of capacity.
//!
//! # Usage
//!
//! ```rust
//! use throttle::SlotPool;
//!
//! let pool = SlotPool::new(2);
//! let first = pool.try_acquire().expect("pool has room");
//! let second = pool.try_acquire().expect("pool has room");
//! assert!(pool.try_acquire().is_none());
//! assert_eq!(pool.in_use(), 2);
//!
//! drop(first);
//! assert_eq!(pool.in_use(), 1);
//! assert!(pool.try_acquire().is_some());
//! # drop(second);
//! ```
//!
//! # Occupancy tracking
//!
//! The pool records the current number of held slots and the highest number ever held at
//! once ([`SlotPool::high_water`]), which makes it easy to check that the cap was never
//! exceeded.

mod semaphore;

/// Bounded pool of worker slots.
#[derive(Debug)]
pub struct SlotPool {
    capacity: usize,
    sem: semaphore::Semaphore,
}

/// One held unit of pool capacity, released on drop.
#[derive(Debug)]
pub struct Slot {
    _permit: semaphore::Permit,
}

impl SlotPool {
    /// Creates a pool with `capacity` slots. Capacity must be positive.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "slot pool capacity must be positive");
        Self {
            capacity,
            sem: semaphore::Semaphore::new(capacity),
        }
    }

    /// Takes a slot if one is free.
    pub fn try_acquire(&self) -> Option<Slot> {
        self.sem.try_acquire().map(|permit| Slot { _permit: permit })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently held.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.sem.occupancy().in_use()
    }

    /// Number of slots currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.sem.available()
    }

    /// Largest number of slots ever held simultaneously.
    #[must_use]
    pub fn high_water(&self) -> usize {
        self.sem.occupancy().high_water()
    }
}
