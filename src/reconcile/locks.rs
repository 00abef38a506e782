use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Fixed-size lock table keyed by link UID.
///
/// Guards for several keys are always taken in ascending shard order, so two pushes that share
/// links cannot deadlock.
#[derive(Debug)]
pub struct ShardedLocks {
    shards: Vec<Arc<Mutex<()>>>,
}

impl ShardedLocks {
    pub fn new(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1)).map(|_| Arc::new(Mutex::new(()))).collect(),
        }
    }

    pub fn shard_of(&self, key: u64) -> usize {
        (key % self.shards.len() as u64) as usize
    }

    /// Lock every shard covering `keys`. Guards release on drop.
    pub async fn lock_many(&self, keys: impl IntoIterator<Item = u64>) -> Vec<OwnedMutexGuard<()>> {
        let mut shards: Vec<usize> = keys.into_iter().map(|k| self.shard_of(k)).collect();
        shards.sort_unstable();
        shards.dedup();

        let mut guards = Vec::with_capacity(shards.len());
        for shard in shards {
            guards.push(self.shards[shard].clone().lock_owned().await);
        }
        guards
    }
}

impl Default for ShardedLocks {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_shard_is_exclusive() {
        let locks = Arc::new(ShardedLocks::new(4));
        let guards = locks.lock_many([1, 5]).await;
        assert_eq!(guards.len(), 1);

        let other = locks.clone();
        let blocked = tokio::spawn(async move { other.lock_many([9]).await.len() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());

        drop(guards);
        assert_eq!(blocked.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_disjoint_shards_do_not_block() {
        let locks = ShardedLocks::new(4);
        let _a = locks.lock_many([0]).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock_many([3, 2])).await;
        assert_eq!(b.unwrap().len(), 2);
    }
}
