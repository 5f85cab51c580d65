//! Alignment validation of a shared state instance.
//!
//! The validator only computes addresses. It never reads or writes the
//! state, so it can be pointed at an arbitrary base address (including a
//! deliberately misaligned one) without touching memory.

use std::fmt;

use crate::abi::CACHE_LINE_SIZE;
use crate::error::{new_error, new_error_with, Error, ErrorKind};
use crate::field::{FieldPath, Layout};

/// The outcome of checking one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Check {
    /// The field checked.
    pub path: FieldPath,
    /// Offset of the field from the root.
    pub offset: usize,
    /// Absolute address of the field.
    pub address: usize,
    /// `address % cache_line`; zero when the check passed.
    pub remainder: usize,
}

impl Check {
    /// True when the field starts on a cache line.
    pub fn passed(&self) -> bool {
        self.remainder == 0
    }
}

/// The first field found off a cache-line boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Violation {
    /// The offending field.
    pub path: FieldPath,
    /// Its absolute address.
    pub address: usize,
    /// Bytes past the previous cache line boundary.
    pub remainder: usize,
    /// The cache line size validated against.
    pub cache_line: usize,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {:#x} is {} bytes past a {} byte cache line",
            self.path, self.address, self.remainder, self.cache_line
        )
    }
}

impl std::error::Error for Violation {}

/// Summary of a validation run in which every field passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Report {
    /// Number of fields checked.
    pub checks: usize,
    /// The cache line size validated against.
    pub cache_line: usize,
}

/// Checks that every independently updated field of a state starts on a
/// cache line.
///
/// ```
/// # use pcm_shm::{alloc::SharedRegion, state::SharedTelemetryState, validate::Validator};
/// let region = SharedRegion::<SharedTelemetryState<4, 2, 3>>::allocate()?;
///
/// let report = Validator::default().validate(region.get())?;
/// assert_eq!(report.checks, 29);
/// #
/// # Ok::<(), pcm_shm::error::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validator {
    cache_line: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Validator {
            cache_line: CACHE_LINE_SIZE,
        }
    }
}

impl Validator {
    /// Validate against a cache line of `size` bytes instead of 64.
    ///
    /// The value must match the line size of the machine sharing the region
    /// for the result to mean anything (see [`detect_cache_line_size`]).
    pub fn cache_line(self, size: usize) -> Self {
        Self { cache_line: size }
    }

    /// The cache line size this validator checks against.
    pub fn cache_line_size(&self) -> usize {
        self.cache_line
    }

    /// Validate every field of `state`.
    pub fn validate<T: Layout>(&self, state: &T) -> Result<Report, Error> {
        self.validate_with(state, |_| {})
    }

    /// Validate every field of `state`, passing each result to `observer` in
    /// validation order.
    ///
    /// On a violation the observer sees the failing check last, and the run
    /// stops without visiting any further field.
    pub fn validate_with<T, F>(&self, state: &T, observer: F) -> Result<Report, Error>
    where
        T: Layout,
        F: FnMut(&Check),
    {
        self.validate_at::<T, F>(state as *const T as usize, observer)
    }

    /// Validate the fields a `T` would have if it started at `base`.
    pub fn validate_at<T, F>(&self, base: usize, mut observer: F) -> Result<Report, Error>
    where
        T: Layout,
        F: FnMut(&Check),
    {
        if self.cache_line == 0 {
            return Err(new_error(ErrorKind::InvalidAlignment));
        }

        let mut checks = 0;
        for path in T::capacity().paths() {
            let offset = match T::offset_of(&path) {
                Some(o) => o,
                None => {
                    error!("layout has no offset for {}", path);
                    return Err(new_error(ErrorKind::InvalidFieldPath));
                }
            };

            let address = base.wrapping_add(offset);
            let check = Check {
                path,
                offset,
                address,
                remainder: address % self.cache_line,
            };

            observer(&check);
            checks += 1;

            if !check.passed() {
                let violation = Violation {
                    path,
                    address,
                    remainder: check.remainder,
                    cache_line: self.cache_line,
                };
                error!("layout violation: {}", violation);
                return Err(new_error_with(ErrorKind::LayoutViolation, violation));
            }
        }

        debug!(
            "{} fields aligned to {} bytes from {:#x}",
            checks, self.cache_line, base
        );

        Ok(Report {
            checks,
            cache_line: self.cache_line,
        })
    }
}

/// The L1 data cache line size reported by the platform, if it reports one.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub fn detect_cache_line_size() -> Option<usize> {
    match unsafe { libc::sysconf(libc::_SC_LEVEL1_DCACHE_LINESIZE) } {
        n if n > 0 => Some(n as usize),
        _ => None,
    }
}

/// The L1 data cache line size reported by the platform, if it reports one.
#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
pub fn detect_cache_line_size() -> Option<usize> {
    None
}
