//! Translation table (SPEC_FULL.md §4.A): a dense per-address-space map
//! from virtual page number to page descriptor, with per-bit accessors.
//!
//! Each page descriptor is guarded by its own lock (§9.1: "per-page
//! locking granularity") so faults on independent pages never contend.

use spin::Mutex;

/// Sentinel meaning "no physical frame" / "not present on disk".
pub const NONE: i64 = -1;

bitflags::bitflags! {
    /// `V`/`U`/`M`/`Swap`/`IO` bits of one page descriptor.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PageBits: u8 {
        /// Valid: frame present and usable by the MMU.
        const VALID = 1 << 0;
        /// Used/referenced since the last clock sweep. Written by the MMU.
        const USED = 1 << 1;
        /// Modified/dirty since last clean load. Written by the MMU.
        const MODIFIED = 1 << 2;
        /// If set, `addr_disk` is a swap sector; else (if >= 0) it is an
        /// exec-file offset.
        const SWAP = 1 << 3;
        /// A fault or writeback is currently touching this page.
        const IO = 1 << 4;
    }
}

/// One page descriptor: the `V/U/M/Swap/IO` bits plus `physicalPage` and
/// `addrDisk`, kept as a packed record (SPEC_FULL.md §9) so that replacing
/// `IO` with a real mutex later stays local to this type.
#[derive(Clone, Copy, Debug)]
struct PageDescriptor {
    bits: PageBits,
    physical_page: i64,
    addr_disk: i64,
}

impl PageDescriptor {
    /// A freshly mapped page with no frame yet; `addr_disk` is the
    /// exec-file offset installed by the loader, or `NONE` for bss/stack.
    fn new(addr_disk: i64) -> Self {
        PageDescriptor { bits: PageBits::empty(), physical_page: NONE, addr_disk }
    }
}

/// Dense per-address-space array of page descriptors.
pub struct TranslationTable {
    entries: Vec<Mutex<PageDescriptor>>,
}

impl TranslationTable {
    /// Create a table for `num_pages` virtual pages, each initialized with
    /// the exec-file offset (or `NONE`) the loader assigns it.
    pub fn new(initial_addr_disk: &[i64]) -> Self {
        let entries = initial_addr_disk
            .iter()
            .map(|&disk| Mutex::new(PageDescriptor::new(disk)))
            .collect();
        TranslationTable { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, vpage: u64) -> &Mutex<PageDescriptor> {
        self.entries
            .get(vpage as usize)
            .unwrap_or_else(|| panic!("virtual page {vpage} out of range (table has {})", self.entries.len()))
    }

    pub fn get_valid(&self, vpage: u64) -> bool {
        self.entry(vpage).lock().bits.contains(PageBits::VALID)
    }
    pub fn set_valid(&self, vpage: u64) {
        self.entry(vpage).lock().bits.insert(PageBits::VALID);
    }
    pub fn clear_valid(&self, vpage: u64) {
        self.entry(vpage).lock().bits.remove(PageBits::VALID);
    }

    pub fn get_used(&self, vpage: u64) -> bool {
        self.entry(vpage).lock().bits.contains(PageBits::USED)
    }
    pub fn set_used(&self, vpage: u64) {
        self.entry(vpage).lock().bits.insert(PageBits::USED);
    }
    pub fn clear_used(&self, vpage: u64) {
        self.entry(vpage).lock().bits.remove(PageBits::USED);
    }

    pub fn get_modified(&self, vpage: u64) -> bool {
        self.entry(vpage).lock().bits.contains(PageBits::MODIFIED)
    }
    pub fn set_modified(&self, vpage: u64) {
        self.entry(vpage).lock().bits.insert(PageBits::MODIFIED);
    }
    pub fn clear_modified(&self, vpage: u64) {
        self.entry(vpage).lock().bits.remove(PageBits::MODIFIED);
    }

    pub fn get_swap(&self, vpage: u64) -> bool {
        self.entry(vpage).lock().bits.contains(PageBits::SWAP)
    }
    pub fn set_swap(&self, vpage: u64) {
        self.entry(vpage).lock().bits.insert(PageBits::SWAP);
    }
    pub fn clear_swap(&self, vpage: u64) {
        self.entry(vpage).lock().bits.remove(PageBits::SWAP);
    }

    pub fn get_io(&self, vpage: u64) -> bool {
        self.entry(vpage).lock().bits.contains(PageBits::IO)
    }
    pub fn set_io(&self, vpage: u64) {
        self.entry(vpage).lock().bits.insert(PageBits::IO);
    }
    pub fn clear_io(&self, vpage: u64) {
        self.entry(vpage).lock().bits.remove(PageBits::IO);
    }

    /// Test-and-set `IO` under a single lock acquisition: if the bit is
    /// already set, returns `false` and leaves it untouched; otherwise sets
    /// it and returns `true`. Two separate `get_io`/`set_io` calls race
    /// under genuine concurrency (both callers can observe the bit clear
    /// before either sets it); this is the atomic primitive the fault
    /// manager's serialization step (SPEC_FULL.md §4.D step 1) actually
    /// needs.
    pub fn try_acquire_io(&self, vpage: u64) -> bool {
        let mut entry = self.entry(vpage).lock();
        if entry.bits.contains(PageBits::IO) {
            false
        } else {
            entry.bits.insert(PageBits::IO);
            true
        }
    }

    pub fn get_physical_page(&self, vpage: u64) -> i64 {
        self.entry(vpage).lock().physical_page
    }
    pub fn set_physical_page(&self, vpage: u64, frame: i64) {
        self.entry(vpage).lock().physical_page = frame;
    }

    pub fn get_addr_disk(&self, vpage: u64) -> i64 {
        self.entry(vpage).lock().addr_disk
    }
    pub fn set_addr_disk(&self, vpage: u64, addr: i64) {
        self.entry(vpage).lock().addr_disk = addr;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_page_is_invalid_and_not_in_swap() {
        let table = TranslationTable::new(&[0, NONE]);
        assert!(!table.get_valid(0));
        assert!(!table.get_swap(0));
        assert_eq!(table.get_physical_page(0), NONE);
        assert_eq!(table.get_addr_disk(0), 0);
        assert_eq!(table.get_addr_disk(1), NONE);
    }

    #[test]
    fn bits_are_independent() {
        let table = TranslationTable::new(&[NONE]);
        table.set_used(0);
        table.set_modified(0);
        assert!(table.get_used(0));
        assert!(table.get_modified(0));
        assert!(!table.get_valid(0));
        table.clear_used(0);
        assert!(!table.get_used(0));
        assert!(table.get_modified(0));
    }

    #[test]
    fn try_acquire_io_is_a_single_acquisition_test_and_set() {
        let table = TranslationTable::new(&[NONE]);
        assert!(table.try_acquire_io(0));
        assert!(table.get_io(0));
        // A second acquisition fails while the first is still held.
        assert!(!table.try_acquire_io(0));
        table.clear_io(0);
        assert!(table.try_acquire_io(0));
    }

    #[test]
    fn try_acquire_io_races_resolve_to_exactly_one_winner() {
        use std::sync::{Arc, Barrier};

        let table = Arc::new(TranslationTable::new(&[NONE]));
        let barrier = Arc::new(Barrier::new(8));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let table = table.clone();
            let barrier = barrier.clone();
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                table.try_acquire_io(0)
            }));
        }
        let winners: usize = handles.into_iter().map(|h| h.join().unwrap()).filter(|&won| won).count();
        assert_eq!(winners, 1, "exactly one thread may observe the IO bit clear and set it");
    }

    #[test]
    #[should_panic]
    fn out_of_range_page_panics() {
        let table = TranslationTable::new(&[NONE]);
        table.get_valid(5);
    }
}
