//! Small concurrency primitives shared by the scheduler (spec.md §5).

use std::sync::{Condvar, Mutex};

/// A counting semaphore bounding how many scenarios may run concurrently
/// (spec.md §5 "bounded worker pool, a counting semaphore sized to the
/// configured thread count").
pub struct Semaphore {
    count: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    /// A semaphore initialised with `permits` available slots.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self {
            count: Mutex::new(permits),
            condvar: Condvar::new(),
        }
    }

    /// Block until a permit is available, then take it.
    pub fn acquire(&self) {
        let mut count = self.count.lock().expect("semaphore mutex poisoned");
        while *count == 0 {
            count = self.condvar.wait(count).expect("semaphore mutex poisoned");
        }
        *count -= 1;
    }

    /// Return a permit and wake one waiter.
    pub fn release(&self) {
        let mut count = self.count.lock().expect("semaphore mutex poisoned");
        *count += 1;
        self.condvar.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn limits_concurrent_holders() {
        let sem = Arc::new(Semaphore::new(1));
        sem.acquire();
        let sem2 = Arc::clone(&sem);
        let handle = thread::spawn(move || {
            sem2.acquire();
            sem2.release();
        });
        thread::sleep(std::time::Duration::from_millis(20));
        sem.release();
        handle.join().unwrap();
    }
}
