//! Physical frame table (SPEC_FULL.md §4.C): free list, clock hand,
//! per-frame lock/owner metadata, and the byte contents of physical
//! memory itself (§9.1: "physical memory bytes live in the frame table").

use std::sync::Arc;

use spin::Mutex;

use crate::addrspace::AddressSpace;
use crate::error::{VmError, VmResult};
use crate::swap::SwapManager;

/// One physical frame's bookkeeping. The frame's byte contents live
/// separately in [`FrameTable::memory`] so that swap I/O never needs to
/// hold this struct's lock.
struct FrameDescriptor {
    free: bool,
    locked: bool,
    owner: Option<Arc<AddressSpace>>,
    virtual_page: u64,
}

impl FrameDescriptor {
    fn free() -> Self {
        FrameDescriptor { free: true, locked: false, owner: None, virtual_page: 0 }
    }
}

struct Inner {
    frames: Vec<FrameDescriptor>,
    /// LIFO stack of free frame indices.
    free_list: Vec<usize>,
    /// Last frame selected by the clock algorithm; `None` before the first
    /// eviction (mirrors `i_clock = -1` in the original kernel).
    clock: Option<usize>,
}

/// The result of locking a frame for the caller to fill: which frame, and
/// — if the frame table had to evict someone — who it evicted and whether
/// that page was dirty (so the caller knows to write it back to swap).
pub struct Allocation {
    pub frame: usize,
    pub eviction: Option<Eviction>,
}

pub struct Eviction {
    pub prev_owner: Arc<AddressSpace>,
    pub prev_vpage: u64,
    pub was_modified: bool,
}

pub struct FrameTable {
    inner: Mutex<Inner>,
    memory: Vec<Mutex<Vec<u8>>>,
    page_size: usize,
}

impl FrameTable {
    pub fn new(num_frames: usize, page_size: usize) -> Self {
        let frames = (0..num_frames).map(|_| FrameDescriptor::free()).collect();
        let free_list = (0..num_frames).collect();
        let memory = (0..num_frames).map(|_| Mutex::new(vec![0u8; page_size])).collect();
        FrameTable {
            inner: Mutex::new(Inner { frames, free_list, clock: None }),
            memory,
            page_size,
        }
    }

    pub fn num_frames(&self) -> usize {
        self.memory.len()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of frames currently on the free list. Exposed for tests
    /// (SPEC_FULL.md §8 scenario 1: "free list length = 2").
    pub fn free_count(&self) -> usize {
        self.inner.lock().free_list.len()
    }

    /// Copy `src` into frame `frame`'s byte buffer.
    pub fn write_frame(&self, frame: usize, src: &[u8]) {
        let mut buf = self.memory[frame].lock();
        buf.copy_from_slice(src);
    }

    /// Copy frame `frame`'s byte buffer into `dst`.
    pub fn read_frame(&self, frame: usize, dst: &mut [u8]) {
        let buf = self.memory[frame].lock();
        dst.copy_from_slice(&buf);
    }

    /// `AddPhysicalToVirtualMapping`: returns a frame locked and bound to
    /// `(owner, vpage)`. If eviction was needed the caller is responsible
    /// for writing the evicted page back to swap (via [`Eviction`]) and
    /// then calling [`Self::finish_eviction`] to clear the prior owner's
    /// bits — done this way so no frame-table lock is held across the
    /// simulated blocking swap write (SPEC_FULL.md §5: other threads run
    /// during I/O).
    pub fn add_physical_to_virtual_mapping(
        &self,
        owner: Arc<AddressSpace>,
        vpage: u64,
    ) -> VmResult<Allocation> {
        let mut inner = self.inner.lock();

        if let Some(frame) = inner.free_list.pop() {
            owner.record_memory_access();
            let desc = &mut inner.frames[frame];
            desc.free = false;
            desc.locked = true;
            desc.owner = Some(owner);
            desc.virtual_page = vpage;
            return Ok(Allocation { frame, eviction: None });
        }

        let num_frames = inner.frames.len();
        let start = inner.clock.map(|c| (c + 1) % num_frames).unwrap_or(0);
        let mut i = start;
        let mut selected = None;
        // The algorithm is specified as unbounded (a locked frame only stays
        // locked for the duration of one fault, which always yields), but a
        // hosted library guards against a runaway loop if every frame is
        // pathologically locked forever, per SPEC_FULL.md §9's guidance to
        // treat this as a recoverable diagnostic.
        for _ in 0..num_frames.saturating_mul(2).max(1) {
            let used = {
                let desc = &inner.frames[i];
                if desc.locked {
                    i = (i + 1) % num_frames;
                    continue;
                }
                let owner = desc.owner.as_ref().expect("non-free frame has an owner");
                owner.translation_table.get_used(desc.virtual_page)
            };
            if !used {
                selected = Some(i);
                break;
            }
            let desc = &inner.frames[i];
            let owner = desc.owner.as_ref().expect("non-free frame has an owner");
            owner.translation_table.clear_used(desc.virtual_page);
            i = (i + 1) % num_frames;
        }

        let frame = match selected {
            Some(f) => f,
            None => {
                log::error!(
                    "clock swept {num_frames} frames without finding a victim while loading '{}'",
                    owner.exec_name(),
                );
                return Err(VmError::OutOfFrames { exec_name: owner.exec_name().to_string() });
            }
        };
        log::debug!("clock selected frame {frame} (hand was at {start})");
        inner.clock = Some(frame);

        let desc = &mut inner.frames[frame];
        desc.locked = true;
        let prev_owner = desc.owner.clone().expect("non-free frame has an owner");
        let prev_vpage = desc.virtual_page;
        let was_modified = prev_owner.translation_table.get_modified(prev_vpage);

        drop(inner);

        Ok(Allocation {
            frame,
            eviction: Some(Eviction { prev_owner, prev_vpage, was_modified }),
        })
    }

    /// Finalize an eviction after the caller has (if needed) written the
    /// victim's contents to swap: clear the victim's `V`/`physicalPage`,
    /// then bind the frame to its new owner.
    pub fn finish_eviction(&self, alloc_frame: usize, eviction: &Eviction, new_owner: Arc<AddressSpace>, new_vpage: u64) {
        eviction.prev_owner.translation_table.set_physical_page(eviction.prev_vpage, crate::translation::NONE);
        eviction.prev_owner.translation_table.clear_valid(eviction.prev_vpage);

        let mut inner = self.inner.lock();
        let desc = &mut inner.frames[alloc_frame];
        desc.free = false;
        desc.owner = Some(new_owner);
        desc.virtual_page = new_vpage;
    }

    /// `UnlockPage`: clears `locked`. Asserts the frame was locked and not
    /// free, matching the original kernel's assertions.
    pub fn unlock_page(&self, frame: usize) {
        let mut inner = self.inner.lock();
        let desc = &mut inner.frames[frame];
        assert!(desc.locked, "UnlockPage called on a frame that is not locked");
        assert!(!desc.free, "UnlockPage called on a free frame");
        desc.locked = false;
    }

    /// `RemovePhysicalToVirtualMapping`: clears `V` in the owner's
    /// translation table, returns the frame to the free list head.
    pub fn remove_physical_to_virtual_mapping(&self, frame: usize) {
        let mut inner = self.inner.lock();
        let desc = &mut inner.frames[frame];
        assert!(!desc.free, "RemovePhysicalToVirtualMapping called on an already-free frame");
        desc.free = true;
        desc.locked = false;
        if let Some(owner) = desc.owner.take() {
            owner.translation_table.clear_valid(desc.virtual_page);
        }
        inner.free_list.push(frame);
    }

    /// `ChangeOwner`: updates the back-pointer and counts a memory access
    /// on behalf of the new owner.
    pub fn change_owner(&self, frame: usize, new_owner: Arc<AddressSpace>) {
        new_owner.record_memory_access();
        let mut inner = self.inner.lock();
        inner.frames[frame].owner = Some(new_owner);
    }

    #[cfg(test)]
    fn is_locked(&self, frame: usize) -> bool {
        self.inner.lock().frames[frame].locked
    }

    #[cfg(test)]
    fn is_free(&self, frame: usize) -> bool {
        self.inner.lock().frames[frame].free
    }
}

/// Writes a dirty evicted page to swap and records the resulting sector
/// in the victim's translation table entry. Split out of
/// [`FrameTable::add_physical_to_virtual_mapping`] because it performs
/// the (simulated) blocking I/O described in SPEC_FULL.md §4.B/§4.C.
/// `frame` is the frame being evicted (the same index returned in the
/// [`Allocation`] that produced `eviction`) — its old contents must be
/// read out *before* the page-fault manager overwrites it.
pub fn write_back_if_dirty(
    frame_table: &FrameTable,
    swap: &SwapManager,
    frame: usize,
    eviction: &Eviction,
) -> VmResult<()> {
    if !eviction.was_modified {
        return Ok(());
    }
    eviction.prev_owner.translation_table.set_swap(eviction.prev_vpage);
    eviction.prev_owner.translation_table.set_addr_disk(eviction.prev_vpage, crate::translation::NONE);

    let mut buf = vec![0u8; frame_table.page_size()];
    frame_table.read_frame(frame, &mut buf);
    let sector = swap.put_page_swap(None, &buf)?;
    eviction.prev_owner.translation_table.set_addr_disk(eviction.prev_vpage, sector as i64);
    Ok(())
}
