//! Virtual memory core of a teaching operating system: page-fault
//! resolution, a clock-replacement physical frame table, a swap manager,
//! and an interrupt-driven ACIA serial driver.
//!
//! Every collaborator that would, in the real machine, live outside this
//! subsystem — the CPU simulator, the scheduler, the file system, the
//! serial hardware — is consumed only through the traits in [`machine`],
//! so this crate links and tests as an ordinary hosted `std` library
//! (SPEC_FULL.md §1.1).

pub mod acia;
pub mod addrspace;
pub mod config;
pub mod error;
pub mod frame;
pub mod machine;
pub mod pagefault;
pub mod swap;
pub mod sync;
pub mod translation;

/// In-memory test doubles for [`machine`]'s traits. Public (not
/// `#[cfg(test)]`-gated) so the `scenario_tests` binary can assemble a full
/// system out of them without a real simulator.
pub mod testutil;
