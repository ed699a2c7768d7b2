//! Startup configuration (read once, per SPEC_FULL.md §6).

/// Serial line driver mode, selected once at driver construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AciaMode {
    /// `TtySend`/`TtyReceive` inline the wait; interrupt handlers are unused.
    BusyWait,
    /// `TtySend`/`TtyReceive` block on semaphores; interrupt handlers drive
    /// the byte-at-a-time transfer.
    Interrupt,
}

/// Configuration inputs consumed at startup by the VM core and ACIA driver.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Total number of physical frames managed by the frame table.
    pub num_phys_pages: usize,
    /// Bytes per page / per frame / per swap sector. Shared by every
    /// component so a page is always the same size everywhere.
    pub page_size: usize,
    /// ACIA driver working mode.
    pub acia_mode: AciaMode,
}

impl Config {
    /// Build a config, validating the invariants every component assumes.
    pub fn new(num_phys_pages: usize, page_size: usize, acia_mode: AciaMode) -> Self {
        assert!(num_phys_pages > 0, "NumPhysPages must be > 0");
        assert!(page_size > 0, "PageSize must be > 0");
        Config { num_phys_pages, page_size, acia_mode }
    }
}
