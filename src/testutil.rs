//! In-memory test doubles for the machine-model traits (SPEC_FULL.md §6,
//! §8.1). Not part of the public API surface of a deployed system — this
//! module exists purely so the rest of the crate can be exercised without a
//! real CPU simulator, file system or serial port.

use std::sync::Mutex;

use crate::machine::{AciaHardware, ExecFile, Machine, Scheduler, WorkingMode};

/// Runs a "guest thread" on the calling OS thread and never actually yields
/// the underlying thread — fine for single-threaded scenario tests where
/// `yield_now` only needs to stand for a potential context switch, not force
/// one. Multi-thread scenarios (SPEC_FULL.md §8 scenario 5) use real threads
/// directly instead of this scheduler's cooperation.
#[derive(Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn yield_now(&self) {
        std::thread::yield_now();
    }

    fn current_thread(&self) -> u64 {
        0
    }
}

/// A fixed byte buffer standing in for an executable's code/data segments.
pub struct FixedExecFile {
    name: String,
    image: Vec<u8>,
}

impl FixedExecFile {
    pub fn new(name: &str, image: Vec<u8>) -> Self {
        FixedExecFile { name: name.to_string(), image }
    }
}

impl ExecFile for FixedExecFile {
    fn read_at(&self, dst: &mut [u8], len: usize, offset: i64) {
        let start = offset as usize;
        let end = start + len;
        dst[..len].copy_from_slice(&self.image[start..end]);
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// A swap backing store that is just a `Vec` of page-sized sectors.
pub struct InMemoryBackingStore {
    sectors: Mutex<Vec<Vec<u8>>>,
}

impl InMemoryBackingStore {
    pub fn new(num_sectors: usize, page_size: usize) -> Self {
        InMemoryBackingStore { sectors: Mutex::new(vec![vec![0u8; page_size]; num_sectors]) }
    }
}

impl crate::machine::SwapBackingStore for InMemoryBackingStore {
    fn read_sector(&self, sector: u32, dst: &mut [u8]) {
        let sectors = self.sectors.lock().unwrap();
        dst.copy_from_slice(&sectors[sector as usize]);
    }

    fn write_sector(&self, sector: u32, src: &[u8]) {
        let mut sectors = self.sectors.lock().unwrap();
        sectors[sector as usize].copy_from_slice(src);
    }
}

/// A `Machine` whose `halt` panics instead of aborting the process, so a
/// test can assert on the unrecoverable path with `catch_unwind` or simply
/// let the panic fail the test.
pub struct PanicMachine;

impl Machine for PanicMachine {
    fn halt(&self, exit_code: i32, diagnostic: &str) -> ! {
        panic!("machine halt({exit_code}): {diagnostic}");
    }
}

/// Records every byte written and/or every working-mode change, for ACIA
/// driver tests. `pending_recv` is drained one byte at a time by
/// `get_char`, standing in for bytes arriving on the wire.
#[derive(Default)]
pub struct RecordingAcia {
    sent: Mutex<Vec<u8>>,
    pending_recv: Mutex<Vec<u8>>,
    modes: Mutex<Vec<WorkingMode>>,
}

impl RecordingAcia {
    pub fn new(incoming: Vec<u8>) -> Self {
        RecordingAcia {
            sent: Mutex::new(Vec::new()),
            pending_recv: Mutex::new(incoming),
            modes: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<u8> {
        self.sent.lock().unwrap().clone()
    }

    pub fn modes(&self) -> Vec<WorkingMode> {
        self.modes.lock().unwrap().clone()
    }
}

impl AciaHardware for RecordingAcia {
    fn put_char(&self, c: u8) {
        self.sent.lock().unwrap().push(c);
    }

    fn get_char(&self) -> u8 {
        let mut pending = self.pending_recv.lock().unwrap();
        if pending.is_empty() {
            0
        } else {
            pending.remove(0)
        }
    }

    fn set_working_mode(&self, mask: WorkingMode) {
        self.modes.lock().unwrap().push(mask);
    }
}
