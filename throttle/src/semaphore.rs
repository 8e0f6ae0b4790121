use std::sync::atomic::{AtomicUsize, Ordering};

/// Occupancy counters shared between a pool and the permits it hands out.
#[derive(Debug, Default)]
pub struct Occupancy {
    in_use: AtomicUsize,
    high_water: AtomicUsize,
}

impl Occupancy {
    fn enter(&self) -> usize {
        let now = self.in_use.fetch_add(1, Ordering::AcqRel) + 1;
        self.high_water.fetch_max(now, Ordering::AcqRel);
        now
    }

    fn leave(&self) {
        self.in_use.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct Semaphore {
    sem: std::sync::Arc<tokio::sync::Semaphore>,
    occupancy: std::sync::Arc<Occupancy>,
}

impl Semaphore {
    pub fn new(capacity: usize) -> Self {
        Self {
            sem: std::sync::Arc::new(tokio::sync::Semaphore::new(capacity)),
            occupancy: std::sync::Arc::new(Occupancy::default()),
        }
    }

    pub fn try_acquire(&self) -> Option<Permit> {
        let permit = self.sem.clone().try_acquire_owned().ok()?;
        let occupied = self.occupancy.enter();
        tracing::trace!("slot acquired, occupied: {}", occupied);
        Some(Permit {
            _permit: permit,
            occupancy: self.occupancy.clone(),
        })
    }

    pub fn available(&self) -> usize {
        self.sem.available_permits()
    }

    pub fn occupancy(&self) -> &Occupancy {
        &self.occupancy
    }
}

/// A held unit of capacity. Dropping it returns the unit to its pool.
#[derive(Debug)]
pub struct Permit {
    _permit: tokio::sync::OwnedSemaphorePermit,
    occupancy: std::sync::Arc<Occupancy>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.occupancy.leave();
    }
}
