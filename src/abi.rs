//! Capacity constants and the versioned layout contract shared by the
//! producer and every reader attaching to the same region.
//!
//! A reader built with different capacities (or against a compiler that lays
//! the records out differently) computes a different [`AbiContract`]
//! fingerprint, and must refuse to attach.

use std::fmt;

use crate::field::Layout;
use crate::state::SharedPcmState;

/// Cache line size the layout is padded for.
pub const CACHE_LINE_SIZE: usize = 64;

/// Maximum number of physical cores published in the core domain.
pub const MAX_CPU_CORES: usize = 4096;

/// Maximum number of sockets published in the memory and interconnect
/// domains.
pub const MAX_SOCKETS: usize = 256;

/// Maximum number of interconnect (QPI/UPI) links per socket.
pub const QPI_MAX_LINKS: usize = MAX_SOCKETS * 4;

/// Memory controller channels per socket.
pub const MEMORY_MAX_IMC_CHANNELS: usize = 12;

/// Width of the version string at the start of the shared state.
pub const VERSION_SIZE: usize = 12;

/// Layout revision. Bump whenever a record gains, loses or reorders a field.
pub const ABI_VERSION: u32 = 1;

lazy_static! {
    /// The contract for the production layout ([`SharedPcmState`]).
    ///
    /// Computing the fingerprint walks every checked field, so it is done
    /// once on first use.
    pub static ref PCM_ABI: AbiContract = AbiContract::of::<SharedPcmState>();
}

/// The fixed-size array bounds a state layout was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capacity {
    /// Length of `root.core.cores`.
    pub cores: usize,
    /// Length of `root.memory.sockets`, `root.interconnect.incoming` and
    /// `root.interconnect.outgoing`.
    pub sockets: usize,
    /// Length of every `links` sequence.
    pub links_per_socket: usize,
}

impl Capacity {
    /// Bounds for `cores` cores, `sockets` sockets and `links_per_socket`
    /// links on each socket.
    pub const fn new(cores: usize, sockets: usize, links_per_socket: usize) -> Self {
        Self {
            cores,
            sockets,
            links_per_socket,
        }
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cores={} sockets={} links/socket={}",
            self.cores, self.sockets, self.links_per_socket
        )
    }
}

/// Everything two processes must agree on before sharing a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbiContract {
    /// [`ABI_VERSION`] of the build.
    pub version: u32,
    /// Array bounds of the layout.
    pub capacity: Capacity,
    /// Size of the root state in bytes.
    pub size: usize,
    /// Hash of the version, capacities, size and every checked offset.
    pub fingerprint: u64,
}

impl AbiContract {
    /// Derive the contract of a layout from its capacities, size and the
    /// offset of every checked field.
    pub fn of<T: Layout>() -> Self {
        let capacity = T::capacity();
        let size = T::size();

        let mut fp = Fingerprint::new();
        fp.write(ABI_VERSION as u64);
        fp.write(capacity.cores as u64);
        fp.write(capacity.sockets as u64);
        fp.write(capacity.links_per_socket as u64);
        fp.write(MEMORY_MAX_IMC_CHANNELS as u64);
        fp.write(size as u64);
        fp.write(std::mem::align_of::<T>() as u64);

        for path in capacity.paths() {
            // Every enumerated path is in range for the capacity that
            // produced it.
            if let Some(offset) = T::offset_of(&path) {
                fp.write(offset as u64);
            }
        }

        Self {
            version: ABI_VERSION,
            capacity,
            size,
            fingerprint: fp.finish(),
        }
    }

    /// The tag a producer writes into the version field of the shared state,
    /// `v<version>-<low 32 bits of fingerprint>` NUL padded.
    pub fn version_tag(&self) -> [u8; VERSION_SIZE] {
        let text = format!("v{}-{:08x}", self.version, self.fingerprint as u32);
        let mut tag = [0u8; VERSION_SIZE];
        let n = text.len().min(VERSION_SIZE - 1);
        tag[..n].copy_from_slice(&text.as_bytes()[..n]);
        tag
    }

    /// Returns true if `tag` was written by a producer with this contract.
    pub fn matches(&self, tag: &[u8; VERSION_SIZE]) -> bool {
        *tag == self.version_tag()
    }
}

impl fmt::Display for AbiContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "abi v{} ({}, {} bytes, fingerprint {:016x})",
            self.version, self.capacity, self.size, self.fingerprint
        )
    }
}

/// FNV-1a over 64-bit words. Stable across builds and toolchains.
struct Fingerprint(u64);

impl Fingerprint {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    fn new() -> Self {
        Fingerprint(Self::OFFSET_BASIS)
    }

    fn write(&mut self, word: u64) {
        for byte in word.to_le_bytes().iter() {
            self.0 ^= *byte as u64;
            self.0 = self.0.wrapping_mul(Self::PRIME);
        }
    }

    fn finish(&self) -> u64 {
        self.0
    }
}
