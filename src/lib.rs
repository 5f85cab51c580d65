#![warn(missing_docs)]

//! `pcm-shm` defines the binary layout of the shared memory region a
//! performance counter monitoring daemon publishes its telemetry through, and
//! proves that layout is safe to share.
//!
//! One producer (the daemon, which has privileged access to the hardware
//! counters) writes per-core, per-socket memory and per-link interconnect
//! statistics into the region; any number of reader processes map it and
//! read concurrently. There are no locks. Instead every record that is
//! updated independently starts on its own cache line, so a write to one
//! record never causes false sharing with a read of another.
//!
//! The crate provides:
//!
//! * the [`SharedTelemetryState`] tree, padded to cache lines by
//!   construction, and its production instance [`SharedPcmState`],
//! * layout introspection by [`FieldPath`] (see [`Layout`]),
//! * an aligned allocator ([`alloc::allocate`]) and an owning, zero-filled
//!   [`SharedRegion`],
//! * the [`Validator`] that checks every field of an instance sits on a
//!   cache line,
//! * the [`AbiContract`] both sides of a region must agree on.
//!
//! ```
//! use pcm_shm::{SharedRegion, SharedTelemetryState, Validator};
//!
//! let region = SharedRegion::<SharedTelemetryState<4, 2, 3>>::allocate()?;
//! Validator::default().validate(region.get())?;
//! #
//! # Ok::<(), pcm_shm::error::Error>(())
//! ```
//!
//! Within a single record there is no atomicity: a reader may observe a
//! record part way through an update.
//!
//! [`SharedTelemetryState`]: state/struct.SharedTelemetryState.html
//! [`SharedPcmState`]: state/type.SharedPcmState.html
//! [`FieldPath`]: field/enum.FieldPath.html
//! [`Layout`]: field/trait.Layout.html
//! [`alloc::allocate`]: alloc/fn.allocate.html
//! [`SharedRegion`]: alloc/struct.SharedRegion.html
//! [`Validator`]: validate/struct.Validator.html
//! [`AbiContract`]: abi/struct.AbiContract.html

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
extern crate libc;

pub mod abi;
pub mod alloc;
pub mod counters;
pub mod error;
pub mod field;
pub mod state;
pub mod validate;

pub use self::abi::{AbiContract, Capacity, CACHE_LINE_SIZE, PCM_ABI};
pub use self::alloc::{allocate, release, AlignedBlock, SharedRegion};
pub use self::field::{Direction, FieldPath, Layout};
pub use self::state::{SharedPcmState, SharedTelemetryState};
pub use self::validate::{Check, Report, Validator, Violation};
