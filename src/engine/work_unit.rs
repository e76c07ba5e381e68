use crate::chain::pool::Pool;
use crate::chain::vault_host::VaultHost;

/// Staged copies of the pool and vault. Every mutation of a rebalance lands
/// on the copies; `commit` swaps them in. Dropping an uncommitted unit leaves
/// the originals untouched.
pub struct WorkUnit<'a, P: Pool + Clone, H: VaultHost + Clone> {
    pool: &'a mut P,
    host: &'a mut H,
    staged_pool: P,
    staged_host: H,
    committed: bool,
}

impl<'a, P: Pool + Clone, H: VaultHost + Clone> WorkUnit<'a, P, H> {
    pub fn begin(pool: &'a mut P, host: &'a mut H) -> Self {
        let staged_pool = pool.clone();
        let staged_host = host.clone();
        Self {
            pool,
            host,
            staged_pool,
            staged_host,
            committed: false,
        }
    }

    pub fn pool(&mut self) -> &mut P {
        &mut self.staged_pool
    }

    pub fn host(&mut self) -> &mut H {
        &mut self.staged_host
    }

    pub fn parts(&mut self) -> (&mut P, &mut H) {
        (&mut self.staged_pool, &mut self.staged_host)
    }

    pub fn commit(mut self) {
        std::mem::swap(self.pool, &mut self.staged_pool);
        std::mem::swap(self.host, &mut self.staged_host);
        self.committed = true;
    }
}

impl<P: Pool + Clone, H: VaultHost + Clone> Drop for WorkUnit<'_, P, H> {
    fn drop(&mut self) {
        if !self.committed {
            log::warn!("discarding uncommitted work unit for vault {:?}", self.host.address());
        }
    }
}
