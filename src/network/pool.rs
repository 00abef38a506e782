use crate::error::{AppError, AppResult};

/// Fixed worker pool with static row striping: worker `w` owns rows `{w, w+W, w+2W, ...}`.
///
/// Each worker writes only into its own stripe, so no synchronisation happens between workers;
/// `scope` returning is the join barrier between phases.
pub struct RowStripedPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl RowStripedPool {
    pub fn new(workers: usize) -> AppResult<Self> {
        let workers = workers.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("sdn-worker-{}", i))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create worker pool: {}", e)))?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Compute `f(row)` for every row in `0..rows` and return the results in row order.
    pub fn map_rows<T, F>(&self, rows: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync,
    {
        if rows == 0 {
            return Vec::new();
        }
        let stride = self.workers.min(rows);
        let mut stripes: Vec<Vec<T>> = (0..stride)
            .map(|_| Vec::with_capacity(rows / stride + 1))
            .collect();

        let f = &f;
        self.pool.scope(|s| {
            for (w, stripe) in stripes.iter_mut().enumerate() {
                s.spawn(move |_| {
                    let mut row = w;
                    while row < rows {
                        stripe.push(f(row));
                        row += stride;
                    }
                });
            }
        });

        let mut stripes: Vec<_> = stripes.into_iter().map(Vec::into_iter).collect();
        (0..rows)
            .filter_map(|row| stripes[row % stride].next())
            .collect()
    }
}

impl std::fmt::Debug for RowStripedPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStripedPool")
            .field("workers", &self.workers)
            .finish()
    }
}
