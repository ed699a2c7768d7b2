//! Address space handle (SPEC_FULL.md §3.1): the numeric id, translation
//! table, exec-file handle and access-statistics counter that `owner`
//! refers to throughout the frame table and page-fault manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::frame::FrameTable;
use crate::machine::ExecFile;
use crate::swap::SwapManager;
use crate::translation::TranslationTable;

/// Monotonically assigned address-space identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AddrSpaceId(pub u64);

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

pub struct AddressSpace {
    id: AddrSpaceId,
    pub translation_table: TranslationTable,
    exec_file: Arc<dyn ExecFile>,
    memory_access: AtomicU64,
}

impl AddressSpace {
    /// Create an address space whose pages start out exactly as the
    /// executable loader installed them: `addr_disk[v]` is the file
    /// offset for code/data page `v`, or `NONE` for a bss/stack page.
    pub fn new(exec_file: Arc<dyn ExecFile>, addr_disk: &[i64]) -> Arc<Self> {
        let id = AddrSpaceId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
        Arc::new(AddressSpace {
            id,
            translation_table: TranslationTable::new(addr_disk),
            exec_file,
            memory_access: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> AddrSpaceId {
        self.id
    }

    pub fn exec_file(&self) -> &Arc<dyn ExecFile> {
        &self.exec_file
    }

    pub fn exec_name(&self) -> &str {
        self.exec_file.name()
    }

    /// Counts a memory access, as `FindFreePage`/`ChangeOwner` do in the
    /// original kernel (SPEC_FULL.md §4.C).
    pub fn record_memory_access(&self) {
        self.memory_access.fetch_add(1, Ordering::Relaxed);
    }

    pub fn memory_access_count(&self) -> u64 {
        self.memory_access.load(Ordering::Relaxed)
    }

    /// Tear down: release every valid page's frame and every swap sector
    /// this address space still owns (SPEC_FULL.md §3 "Lifecycles").
    pub fn destroy(self: &Arc<Self>, frame_table: &FrameTable, swap: &SwapManager) {
        for vpage in 0..self.translation_table.len() as u64 {
            if self.translation_table.get_valid(vpage) {
                let frame = self.translation_table.get_physical_page(vpage);
                if frame >= 0 {
                    frame_table.remove_physical_to_virtual_mapping(frame as usize);
                }
            } else if self.translation_table.get_swap(vpage) {
                let sector = self.translation_table.get_addr_disk(vpage);
                if sector >= 0 {
                    // A `BadSector` here means this address space's own
                    // bookkeeping disagrees with the swap manager's — a VM
                    // core bug (SPEC_FULL.md §7: "indicates a VM core bug;
                    // assert"), not a condition teardown should paper over.
                    if let Err(e) = swap.release_page_swap(sector as u32) {
                        log::error!(
                            "address space {:?} teardown: releasing swap sector {sector} for vpage {vpage} failed: {e}",
                            self.id(),
                        );
                    }
                }
            }
        }
    }
}
