//! Typed error surface for the virtual memory core.
//!
//! The original teaching kernel enforces invariants with asserts that halt
//! the simulated machine; a hosted library cannot unilaterally abort its
//! embedder, so violations that are *reachable from caller input* (a bad
//! swap sector, an out-of-range virtual page) are returned as `VmError`
//! instead. Violations that indicate a bug in this crate itself (not
//! caller input) still use `assert!`/`debug_assert!` in the hot paths.

/// Errors surfaced by the page-fault manager, frame table and swap manager.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    /// Eviction found no candidate frame, or a dirty eviction needed a swap
    /// sector and the swap pool was full. Fatal in the original kernel
    /// (`g_machine->interrupt->Halt(-1)`); see [`crate::machine::Machine::halt`].
    #[error("out of physical frames while loading '{exec_name}'")]
    OutOfFrames { exec_name: String },

    /// `PutPageSwap` found no free sector.
    #[error("swap pool exhausted")]
    SwapFull,

    /// A swap operation referenced a sector that is not currently allocated.
    #[error("bad swap sector {sector}")]
    BadSector { sector: u32 },

    /// A virtual page number fell outside the translation table's range.
    #[error("virtual page {vpage} is out of range")]
    InvalidVirtualPage { vpage: u64 },

    /// A frame index fell outside the frame table's range.
    #[error("physical frame {frame} is out of range")]
    InvalidFrame { frame: usize },
}

pub type VmResult<T> = Result<T, VmError>;
