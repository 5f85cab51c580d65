//! The shared state tree.
//!
//! Every domain and every element of every sequence is
//! `#[repr(C, align(64))]`, so each boundary falls on a cache line by
//! construction rather than by chance. The capacities are const generic
//! parameters so that tests and tools can build small instances of the same
//! shape; the processes sharing a region use [`SharedPcmState`].
//!
//! These types are never built on the stack. They are materialised by
//! zero-filling an aligned block (see [`SharedRegion`]), which is why every
//! field is plain data whose all-zero bit pattern is a valid value.
//!
//! [`SharedRegion`]: ../alloc/struct.SharedRegion.html

#![allow(missing_docs)]

use std::mem::{align_of, size_of};

use crate::abi::{
    AbiContract, CACHE_LINE_SIZE, MAX_CPU_CORES, MAX_SOCKETS, QPI_MAX_LINKS, VERSION_SIZE,
};
use crate::counters::{
    CoreCounters, EnergyUsage, MemorySystemCounters, SocketLinkCounters, SocketMemoryCounters,
    SystemInfo,
};

/// The production layout.
pub type SharedPcmState = SharedTelemetryState<MAX_CPU_CORES, MAX_SOCKETS, QPI_MAX_LINKS>;

/// Per-core counters and package energy.
#[repr(C, align(64))]
pub struct CoreDomain<const CORES: usize, const SOCKETS: usize> {
    pub cores: [CoreCounters; CORES],
    pub energy_usage: EnergyUsage<SOCKETS>,
}

/// Per-socket memory traffic.
#[repr(C, align(64))]
pub struct MemoryDomain<const SOCKETS: usize> {
    pub sockets: [SocketMemoryCounters; SOCKETS],
    pub system: MemorySystemCounters,
    pub dram_energy_metrics_available: bool,
}

/// Per-socket, per-link interconnect traffic in both directions.
#[repr(C, align(64))]
pub struct InterconnectDomain<const SOCKETS: usize, const LINKS: usize> {
    pub incoming: [SocketLinkCounters<LINKS>; SOCKETS],
    pub incoming_total: u64,
    pub outgoing: [SocketLinkCounters<LINKS>; SOCKETS],
    pub outgoing_total: u64,
    pub incoming_metrics_available: bool,
    pub outgoing_metrics_available: bool,
}

/// Root of the shared region.
#[repr(C, align(64))]
pub struct SharedTelemetryState<const CORES: usize, const SOCKETS: usize, const LINKS: usize> {
    /// NUL padded [`AbiContract::version_tag`] of the producer.
    pub version: [u8; VERSION_SIZE],
    pub last_update_tsc_begin: u64,
    pub timestamp: u64,
    pub cycles_to_get_state: u64,
    pub poll_ms: u32,
    pub system: SystemInfo,
    pub core: CoreDomain<CORES, SOCKETS>,
    pub memory: MemoryDomain<SOCKETS>,
    pub interconnect: InterconnectDomain<SOCKETS, LINKS>,
    pub last_update_tsc_end: u64,
}

impl<const CORES: usize, const SOCKETS: usize, const LINKS: usize>
    SharedTelemetryState<CORES, SOCKETS, LINKS>
{
    /// Write the version tag of `contract` so readers can check it before
    /// trusting the rest of the region.
    pub fn stamp_version(&mut self, contract: &AbiContract) {
        self.version = contract.version_tag();
    }

    /// Returns true if the producer stamped the region with `contract`.
    pub fn has_version(&self, contract: &AbiContract) -> bool {
        contract.matches(&self.version)
    }
}

// The production layout is checked at build time as well as by the runtime
// validator.
const _: () = {
    assert!(align_of::<SharedPcmState>() == CACHE_LINE_SIZE);
    assert!(size_of::<SharedPcmState>() % CACHE_LINE_SIZE == 0);
    assert!(align_of::<CoreDomain<MAX_CPU_CORES, MAX_SOCKETS>>() == CACHE_LINE_SIZE);
    assert!(align_of::<MemoryDomain<MAX_SOCKETS>>() == CACHE_LINE_SIZE);
    assert!(align_of::<InterconnectDomain<MAX_SOCKETS, QPI_MAX_LINKS>>() == CACHE_LINE_SIZE);
};
