//! Aligned allocation of the block backing a shared state.

use std::marker::PhantomData;
use std::mem::size_of;
use std::ptr::{self, NonNull};
use std::slice;

use crate::abi::CACHE_LINE_SIZE;
use crate::error::{new_error, new_os_error, Error, ErrorKind};
use crate::field::Layout;

/// An owned block of memory starting at a multiple of its alignment.
///
/// The block is freed when dropped, so it is released exactly once on every
/// exit path. Its contents are uninitialised until written, see [`zero`].
///
/// [`zero`]: #method.zero
#[derive(Debug)]
pub struct AlignedBlock {
    ptr: NonNull<u8>,
    len: usize,
    alignment: usize,
}

// The block is uniquely owned and has no interior mutability.
unsafe impl Send for AlignedBlock {}
unsafe impl Sync for AlignedBlock {}

/// Allocate `size` usable bytes starting at a multiple of `alignment`.
///
/// `alignment` must be a power of two and a multiple of the pointer width,
/// otherwise [`ErrorKind::InvalidAlignment`] is returned and nothing is
/// allocated. A `size` of 0 is treated as a request for a single byte.
///
/// ```
/// # use pcm_shm::alloc::allocate;
/// let block = allocate(64, 1024)?;
/// assert_eq!(block.addr() % 64, 0);
/// assert_eq!(block.len(), 1024);
/// #
/// # Ok::<(), pcm_shm::error::Error>(())
/// ```
///
/// [`ErrorKind::InvalidAlignment`]: ../error/enum.ErrorKind.html#variant.InvalidAlignment
pub fn allocate(alignment: usize, size: usize) -> Result<AlignedBlock, Error> {
    if !alignment.is_power_of_two() || alignment % size_of::<*const u8>() != 0 {
        return Err(new_error(ErrorKind::InvalidAlignment));
    }

    let len = size.max(1);

    let mut mem: *mut libc::c_void = ptr::null_mut();
    match unsafe { libc::posix_memalign(&mut mem, alignment, len) } {
        0 => {}
        libc::EINVAL => return Err(new_os_error(ErrorKind::InvalidAlignment, libc::EINVAL)),
        code => return Err(new_os_error(ErrorKind::OutOfMemory, code)),
    }

    let ptr = NonNull::new(mem as *mut u8).ok_or_else(|| new_error(ErrorKind::OutOfMemory))?;

    debug!(
        "allocated {} bytes at {:#x} (alignment {})",
        len,
        ptr.as_ptr() as usize,
        alignment
    );

    Ok(AlignedBlock {
        ptr,
        len,
        alignment,
    })
}

/// Release a block returned by [`allocate`]. Releasing `None` is a no-op.
///
/// Dropping the block has the same effect; this exists for call sites that
/// want the release to be explicit.
pub fn release(block: Option<AlignedBlock>) {
    drop(block)
}

impl AlignedBlock {
    /// Address of the first usable byte.
    pub fn addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Pointer to the first usable byte.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Mutable pointer to the first usable byte.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Usable length in bytes; at least 1.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false, a zero sized request is rounded up to one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// The alignment the block was requested with.
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Fill the whole block with zero bytes.
    pub fn zero(&mut self) {
        unsafe { ptr::write_bytes(self.ptr.as_ptr(), 0, self.len) };
    }

    /// The block contents.
    ///
    /// # Safety
    ///
    /// Every byte must have been written (e.g. by [`zero`](#method.zero))
    /// before it is read.
    pub unsafe fn as_slice(&self) -> &[u8] {
        slice::from_raw_parts(self.ptr.as_ptr(), self.len)
    }

    /// The block contents, for writing.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBlock {
    fn drop(&mut self) {
        debug!("releasing {} bytes at {:#x}", self.len, self.addr());

        unsafe { libc::free(self.ptr.as_ptr() as *mut libc::c_void) };
    }
}

/// The producer's owning handle to one zero-initialised shared state.
///
/// ```
/// # use pcm_shm::{alloc::SharedRegion, state::SharedTelemetryState};
/// let mut region = SharedRegion::<SharedTelemetryState<4, 2, 3>>::allocate()?;
/// region.get_mut().core.cores[0].cycles = 1000;
/// #
/// # Ok::<(), pcm_shm::error::Error>(())
/// ```
#[derive(Debug)]
pub struct SharedRegion<T: Layout> {
    block: AlignedBlock,
    _state: PhantomData<T>,
}

impl<T: Layout> SharedRegion<T> {
    /// Allocate a cache-line aligned block for one `T` and zero-fill it.
    pub fn allocate() -> Result<Self, Error> {
        // The typed views need at least a whole T whatever size() claims.
        let mut block = allocate(CACHE_LINE_SIZE, T::size().max(size_of::<T>()))?;
        block.zero();

        Ok(SharedRegion {
            block,
            _state: PhantomData,
        })
    }

    /// The state, for reading.
    pub fn get(&self) -> &T {
        // The block is aligned for T, large enough, and zeroed, which the
        // Layout contract makes a valid T.
        unsafe { &*(self.block.as_ptr() as *const T) }
    }

    /// The state, for the producer to update in place.
    pub fn get_mut(&mut self) -> &mut T {
        unsafe { &mut *(self.block.as_mut_ptr() as *mut T) }
    }

    /// The underlying block.
    pub fn block(&self) -> &AlignedBlock {
        &self.block
    }

    /// Give up the typed view, keeping the block alive.
    pub fn into_block(self) -> AlignedBlock {
        self.block
    }
}
