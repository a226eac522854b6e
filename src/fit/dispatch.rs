//! Order-preserving batch dispatch.
//!
//! A batch is a slice of independent work items. With one worker the items are
//! evaluated strictly in sequence; otherwise they run on a dedicated rayon pool
//! sized to the requested worker count. Either way `map` returns results in
//! input order, so result `i` always belongs to item `i`.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::AppError;

pub enum Dispatcher {
    Serial,
    Pool(ThreadPool),
}

impl Dispatcher {
    pub fn new(njobs: usize) -> Result<Self, AppError> {
        if njobs <= 1 {
            return Ok(Dispatcher::Serial);
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(njobs)
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build worker pool ({njobs} threads): {e}")))?;
        Ok(Dispatcher::Pool(pool))
    }

    pub fn workers(&self) -> usize {
        match self {
            Dispatcher::Serial => 1,
            Dispatcher::Pool(pool) => pool.current_num_threads(),
        }
    }

    /// Apply `f` to every item and block until the whole batch is done.
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        match self {
            Dispatcher::Serial => items.iter().map(f).collect(),
            Dispatcher::Pool(pool) => pool.install(|| items.par_iter().map(f).collect()),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dispatcher::Serial => f.write_str("Dispatcher::Serial"),
            Dispatcher::Pool(pool) => write!(f, "Dispatcher::Pool({})", pool.current_num_threads()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_for_one_worker() {
        let d = Dispatcher::new(1).unwrap();
        assert!(matches!(d, Dispatcher::Serial));
        assert_eq!(d.workers(), 1);
    }

    #[test]
    fn parallel_results_keep_input_order() {
        let items: Vec<u64> = (0..500).collect();
        let serial = Dispatcher::new(1).unwrap().map(&items, |x| x * x);
        let pool = Dispatcher::new(4).unwrap();
        assert_eq!(pool.workers(), 4);
        let parallel = pool.map(&items, |x| x * x);
        assert_eq!(serial, parallel);
        assert_eq!(parallel[17], 289);
    }
}
