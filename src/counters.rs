//! Leaf counter records.
//!
//! Each record starts on its own cache line and is the unit the producer
//! updates independently. Field values are best-effort telemetry: a reader
//! may observe a record half way through an update.

#![allow(missing_docs)]

use std::mem::align_of;

use crate::abi::{CACHE_LINE_SIZE, MEMORY_MAX_IMC_CHANNELS};

/// Machine topology as discovered by the producer.
///
/// Counts are of what is present, never more than the capacity constants.
#[repr(C, align(64))]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemInfo {
    pub num_of_cores: u32,
    pub num_of_online_cores: u32,
    pub num_of_sockets: u32,
    pub num_of_online_sockets: u32,
    pub num_of_qpi_links_per_socket: u32,
}

/// Per physical core metrics for the last sampling interval.
#[repr(C, align(64))]
#[derive(Debug, Default, Clone, Copy)]
pub struct CoreCounters {
    pub core_id: u64,
    pub socket_id: i32,
    pub instructions_per_cycle: f64,
    pub cycles: u64,
    pub instructions_retired: u64,
    pub exec_usage: f64,
    pub relative_frequency: f64,
    pub active_relative_frequency: f64,
    pub l3_cache_misses: u64,
    pub l3_cache_reference: u64,
    pub l2_cache_misses: u64,
    pub l3_cache_hit_ratio: f64,
    pub l2_cache_hit_ratio: f64,
    pub l3_cache_mpi: f64,
    pub l2_cache_mpi: f64,
    pub l3_cache_occupancy_available: bool,
    pub l3_cache_occupancy: u64,
    pub local_memory_bw_available: bool,
    pub local_memory_bw: u64,
    pub remote_memory_bw_available: bool,
    pub remote_memory_bw: u64,
    pub local_memory_accesses: u64,
    pub remote_memory_accesses: u64,
    pub thermal_headroom: i32,
}

/// Package energy consumed, per socket.
#[repr(C, align(64))]
#[derive(Debug, Clone, Copy)]
pub struct EnergyUsage<const SOCKETS: usize> {
    pub package_metrics_available: bool,
    /// Joules consumed by each socket during the last interval.
    pub joules_by_socket: [f64; SOCKETS],
}

/// Bandwidth of a single memory controller channel, in MB/s.
#[repr(C, align(64))]
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryChannelCounters {
    pub read: f32,
    pub write: f32,
    pub total: f32,
}

/// Memory traffic of one socket.
#[repr(C, align(64))]
#[derive(Debug, Default, Clone, Copy)]
pub struct SocketMemoryCounters {
    pub socket_id: u64,
    pub channels: [MemoryChannelCounters; MEMORY_MAX_IMC_CHANNELS],
    pub num_of_channels: u32,
    pub read: f32,
    pub write: f32,
    pub partial_write: f32,
    pub total: f32,
    pub dram_energy: f64,
}

/// Memory traffic summed over all sockets.
#[repr(C, align(64))]
#[derive(Debug, Default, Clone, Copy)]
pub struct MemorySystemCounters {
    pub read: f32,
    pub write: f32,
    pub total: f32,
}

/// Traffic over one interconnect link in one direction.
#[repr(C, align(64))]
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkCounters {
    pub bytes: u64,
    pub utilization: f64,
}

/// All links of one socket in one direction.
#[repr(C, align(64))]
#[derive(Debug, Clone, Copy)]
pub struct SocketLinkCounters<const LINKS: usize> {
    pub socket_id: u64,
    pub links: [LinkCounters; LINKS],
    pub total: u64,
}

const _: () = {
    assert!(align_of::<SystemInfo>() == CACHE_LINE_SIZE);
    assert!(align_of::<CoreCounters>() == CACHE_LINE_SIZE);
    assert!(align_of::<MemoryChannelCounters>() == CACHE_LINE_SIZE);
    assert!(align_of::<SocketMemoryCounters>() == CACHE_LINE_SIZE);
    assert!(align_of::<MemorySystemCounters>() == CACHE_LINE_SIZE);
    assert!(align_of::<LinkCounters>() == CACHE_LINE_SIZE);
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    #[test]
    fn test_records_fill_whole_lines() {
        assert_eq!(size_of::<LinkCounters>(), CACHE_LINE_SIZE);
        assert_eq!(size_of::<MemoryChannelCounters>(), CACHE_LINE_SIZE);
        assert_eq!(size_of::<SystemInfo>(), CACHE_LINE_SIZE);
        assert_eq!(size_of::<CoreCounters>() % CACHE_LINE_SIZE, 0);
        assert_eq!(size_of::<SocketMemoryCounters>() % CACHE_LINE_SIZE, 0);
    }

    #[test]
    fn test_generic_records_stay_aligned() {
        assert_eq!(align_of::<EnergyUsage<2>>(), CACHE_LINE_SIZE);
        assert_eq!(align_of::<SocketLinkCounters<3>>(), CACHE_LINE_SIZE);
        assert_eq!(size_of::<EnergyUsage<9>>() % CACHE_LINE_SIZE, 0);
        assert_eq!(size_of::<SocketLinkCounters<3>>(), CACHE_LINE_SIZE * 5);
    }

    #[test]
    fn test_channels_are_separate_lines() {
        let m = SocketMemoryCounters::default();
        let base = &m as *const _ as usize;
        for c in m.channels.iter() {
            assert_eq!((c as *const _ as usize - base) % CACHE_LINE_SIZE, 0);
        }
    }
}
