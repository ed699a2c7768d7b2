//! Swap manager (SPEC_FULL.md §4.B): an allocation bitmap over a fixed
//! pool of page-sized sectors, with transfers delegated to a
//! [`SwapBackingStore`] so the allocation logic is testable without real
//! storage.

use std::sync::Arc;

use spin::Mutex;

use crate::error::{VmError, VmResult};
use crate::machine::{Scheduler, SwapBackingStore};

struct Inner {
    /// `true` = sector allocated.
    allocated: Vec<bool>,
}

pub struct SwapManager {
    inner: Mutex<Inner>,
    store: Arc<dyn SwapBackingStore>,
    scheduler: Arc<dyn Scheduler>,
    page_size: usize,
}

impl SwapManager {
    pub fn new(num_sectors: usize, page_size: usize, store: Arc<dyn SwapBackingStore>, scheduler: Arc<dyn Scheduler>) -> Self {
        SwapManager {
            inner: Mutex::new(Inner { allocated: vec![false; num_sectors] }),
            store,
            scheduler,
            page_size,
        }
    }

    pub fn num_sectors(&self) -> usize {
        self.inner.lock().allocated.len()
    }

    pub fn free_sectors(&self) -> usize {
        self.inner.lock().allocated.iter().filter(|&&a| !a).count()
    }

    fn alloc_sector(&self) -> VmResult<u32> {
        let mut inner = self.inner.lock();
        match inner.allocated.iter().position(|&a| !a) {
            Some(idx) => {
                inner.allocated[idx] = true;
                Ok(idx as u32)
            }
            None => {
                log::warn!("swap pool exhausted ({} sectors)", inner.allocated.len());
                Err(VmError::SwapFull)
            }
        }
    }

    /// `PutPageSwap(sector, buf)`: if `sector` is `None`, allocate a free
    /// sector; write `buf` to that sector; return the sector index.
    /// Models the transfer as blocking I/O (SPEC_FULL.md §4.B): the
    /// simulated current thread yields so other guest threads can run.
    pub fn put_page_swap(&self, sector: Option<u32>, buf: &[u8]) -> VmResult<u32> {
        debug_assert_eq!(buf.len(), self.page_size);
        let sector = match sector {
            Some(s) => {
                let inner = self.inner.lock();
                if !*inner.allocated.get(s as usize).ok_or(VmError::BadSector { sector: s })? {
                    return Err(VmError::BadSector { sector: s });
                }
                s
            }
            None => self.alloc_sector()?,
        };
        self.scheduler.yield_now();
        self.store.write_sector(sector, buf);
        Ok(sector)
    }

    /// `GetPageSwap(sector, buf)`: read one page from `sector` into `buf`.
    pub fn get_page_swap(&self, sector: u32, buf: &mut [u8]) -> VmResult<()> {
        debug_assert_eq!(buf.len(), self.page_size);
        {
            let inner = self.inner.lock();
            if !*inner.allocated.get(sector as usize).ok_or(VmError::BadSector { sector })? {
                return Err(VmError::BadSector { sector });
            }
        }
        self.scheduler.yield_now();
        self.store.read_sector(sector, buf);
        Ok(())
    }

    /// `ReleasePageSwap(sector)`: mark `sector` free. Erroring on an
    /// already-free sector (rather than silently succeeding) is the
    /// "idempotence on already-free sectors is an error" rule of
    /// SPEC_FULL.md §4.B.
    pub fn release_page_swap(&self, sector: u32) -> VmResult<()> {
        let mut inner = self.inner.lock();
        let slot = inner.allocated.get_mut(sector as usize).ok_or(VmError::BadSector { sector })?;
        if !*slot {
            return Err(VmError::BadSector { sector });
        }
        *slot = false;
        Ok(())
    }
}
