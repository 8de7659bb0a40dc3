//! Runtime linear memory.

use crate::types::ResizableLimits;
use crate::value::LittleEndianConvert;
use crate::Error;
use memory_units::wasm32::Pages;
use memory_units::{Bytes, RoundUpTo};
use std::cell::RefCell;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;

/// Size of a page of [linear memory][`MemoryInstance`] - 64KiB.
///
/// The size of a memory is always an integer multiple of a page size.
///
/// [`MemoryInstance`]: struct.MemoryInstance.html
pub const LINEAR_MEMORY_PAGE_SIZE: Bytes = Bytes(65536);

/// Maximal number of pages: 2^32 addressable bytes.
const LINEAR_MEMORY_MAX_PAGES: Pages = Pages(65536);

/// Reference to a memory (See [`MemoryInstance`] for details).
///
/// This reference has reference-counting semantics.
///
/// [`MemoryInstance`]: struct.MemoryInstance.html
#[derive(Clone, Debug)]
pub struct MemoryRef(Rc<MemoryInstance>);

impl ::std::ops::Deref for MemoryRef {
    type Target = MemoryInstance;
    fn deref(&self) -> &MemoryInstance {
        &self.0
    }
}

/// Runtime representation of a linear memory (or `memory` for short).
///
/// A memory is a contiguous, mutable array of raw bytes. Wasm code can load
/// and store values from/to a linear memory at any byte address. A request
/// outside the bounds of the current memory size traps.
///
/// A memory is created with an initial size but can be grown dynamically;
/// the growth can be bounded by a maximum size. Wasm provides no way to
/// shrink a memory.
pub struct MemoryInstance {
    /// Memory limits, in pages.
    limits: ResizableLimits,
    /// The backing buffer; always a whole number of pages, zero-filled.
    buffer: RefCell<Vec<u8>>,
    initial: Pages,
    maximum: Option<Pages>,
}

impl fmt::Debug for MemoryInstance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MemoryInstance")
            .field("limits", &self.limits)
            .field("buffer.len", &self.buffer.borrow().len())
            .field("maximum", &self.maximum)
            .field("initial", &self.initial)
            .finish()
    }
}

struct CheckedRegion {
    offset: usize,
    size: usize,
}

impl CheckedRegion {
    fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.size
    }
}

impl MemoryInstance {
    /// Allocates a memory instance.
    ///
    /// The memory is created with the given number of `initial` pages, all
    /// zeroed. `maximum`, if given, bounds [`grow`].
    ///
    /// # Errors
    ///
    /// Returns `Err` if:
    ///
    /// - `initial` is greater than `maximum`
    /// - either `initial` or `maximum` is greater than `65536`.
    ///
    /// [`grow`]: #method.grow
    pub fn alloc(initial: Pages, maximum: Option<Pages>) -> Result<MemoryRef, Error> {
        validate_memory(initial, maximum).map_err(Error::Memory)?;
        let memory = MemoryInstance::new(initial, maximum);
        Ok(MemoryRef(Rc::new(memory)))
    }

    fn new(initial: Pages, maximum: Option<Pages>) -> MemoryInstance {
        let limits = ResizableLimits::new(initial.0 as u32, maximum.map(|p| p.0 as u32));
        let initial_size: Bytes = initial.into();
        MemoryInstance {
            limits,
            buffer: RefCell::new(vec![0; initial_size.0]),
            initial,
            maximum,
        }
    }

    /// Returns the linear memory limits, in pages.
    pub(crate) fn limits(&self) -> &ResizableLimits {
        &self.limits
    }

    /// Returns the number of pages this `MemoryInstance` was created with.
    pub fn initial(&self) -> Pages {
        self.initial
    }

    /// Returns the maximum number of pages this `MemoryInstance` can grow
    /// to, or `None` if growth is unbounded (up to 4GiB).
    pub fn maximum(&self) -> Option<Pages> {
        self.maximum
    }

    /// Returns the current linear memory size in pages.
    ///
    /// # Example
    ///
    /// To convert a number of pages to a number of bytes:
    ///
    /// ```rust
    /// use wasmith::MemoryInstance;
    /// use wasmith::memory_units::*;
    ///
    /// let memory = MemoryInstance::alloc(Pages(1), None).unwrap();
    /// let byte_size: Bytes = memory.current_size().into();
    /// assert_eq!(byte_size, Bytes(65536));
    /// ```
    pub fn current_size(&self) -> Pages {
        Bytes(self.buffer.borrow().len()).round_up_to()
    }

    /// Gets a value from memory at the given offset.
    pub fn get_value<T: LittleEndianConvert>(&self, offset: u32) -> Result<T, Error> {
        let buffer = self.buffer.borrow();
        let region = self.checked_region(&buffer, offset as usize, std::mem::size_of::<T>())?;
        Ok(T::from_little_endian(&buffer[region.range()]).expect("slice size is checked"))
    }

    /// Copies data from memory at the given offset into a fresh vector.
    pub fn get(&self, offset: u32, size: usize) -> Result<Vec<u8>, Error> {
        let buffer = self.buffer.borrow();
        let region = self.checked_region(&buffer, offset as usize, size)?;
        Ok(buffer[region.range()].to_vec())
    }

    /// Copies data from the given offset in the memory into the `target`
    /// slice.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the specified region is out of bounds.
    pub fn get_into(&self, offset: u32, target: &mut [u8]) -> Result<(), Error> {
        let buffer = self.buffer.borrow();
        let region = self.checked_region(&buffer, offset as usize, target.len())?;
        target.copy_from_slice(&buffer[region.range()]);
        Ok(())
    }

    /// Copies data into the memory at the given offset.
    pub fn set(&self, offset: u32, value: &[u8]) -> Result<(), Error> {
        let mut buffer = self.buffer.borrow_mut();
        let range = self
            .checked_region(&buffer, offset as usize, value.len())?
            .range();
        buffer[range].copy_from_slice(value);
        Ok(())
    }

    /// Stores a value into the memory at the given offset.
    pub fn set_value<T: LittleEndianConvert>(&self, offset: u32, value: T) -> Result<(), Error> {
        let mut buffer = self.buffer.borrow_mut();
        let range = self
            .checked_region(&buffer, offset as usize, std::mem::size_of::<T>())?
            .range();
        value.into_little_endian(&mut buffer[range]);
        Ok(())
    }

    /// Increases the size of the linear memory by the given number of
    /// pages, zero-filling the new pages. Returns the previous memory size
    /// on success.
    ///
    /// # Errors
    ///
    /// Returns `Err` if more memory was requested than permitted by the
    /// limit; the memory is left unchanged. The `grow_memory` instruction
    /// surfaces this as the `-1` sentinel.
    pub fn grow(&self, additional: Pages) -> Result<Pages, Error> {
        let size_before_grow: Pages = self.current_size();

        if additional == Pages(0) {
            return Ok(size_before_grow);
        }
        if additional > LINEAR_MEMORY_MAX_PAGES {
            return Err(Error::Memory(
                "trying to grow memory by more than 65536 pages".to_string(),
            ));
        }

        let new_size: Pages = size_before_grow + additional;
        let maximum = self.maximum.unwrap_or(LINEAR_MEMORY_MAX_PAGES);
        if new_size > maximum {
            return Err(Error::Memory(format!(
                "trying to grow memory by {} pages when already have {}",
                additional.0, size_before_grow.0,
            )));
        }

        let new_buffer_length: Bytes = new_size.into();
        self.buffer.borrow_mut().resize(new_buffer_length.0, 0);
        Ok(size_before_grow)
    }

    fn checked_region(
        &self,
        buffer: &[u8],
        offset: usize,
        size: usize,
    ) -> Result<CheckedRegion, Error> {
        let end = offset.checked_add(size).ok_or_else(|| {
            Error::Memory(format!(
                "trying to access memory block of size {} from offset {}",
                size, offset
            ))
        })?;

        if end > buffer.len() {
            return Err(Error::Memory(format!(
                "trying to access region [{}..{}] in memory [0..{}]",
                offset,
                end,
                buffer.len()
            )));
        }

        Ok(CheckedRegion { offset, size })
    }

    /// Copies the contents of one memory region to another within this
    /// memory; the regions may overlap.
    ///
    /// # Errors
    ///
    /// Returns `Err` if either of the specified regions is out of bounds.
    pub fn copy(&self, src_offset: usize, dst_offset: usize, len: usize) -> Result<(), Error> {
        let mut buffer = self.buffer.borrow_mut();
        let read_region = self.checked_region(&buffer, src_offset, len)?;
        let write_region = self.checked_region(&buffer, dst_offset, len)?;
        let read_range = read_region.range();
        buffer.copy_within(read_range, write_region.offset);
        Ok(())
    }

    /// Copies memory between two (possibly distinct) memory instances.
    ///
    /// If the same memory instance is passed as both `src` and `dst`, the
    /// overlap-tolerant [`copy`] is used.
    ///
    /// [`copy`]: #method.copy
    pub fn transfer(
        src: &MemoryRef,
        src_offset: usize,
        dst: &MemoryRef,
        dst_offset: usize,
        len: usize,
    ) -> Result<(), Error> {
        if Rc::ptr_eq(&src.0, &dst.0) {
            return src.copy(src_offset, dst_offset, len);
        }

        // Distinct instances, so borrowing both buffers at once is fine.
        let src_buffer = src.buffer.borrow();
        let mut dst_buffer = dst.buffer.borrow_mut();

        let src_range = src.checked_region(&src_buffer, src_offset, len)?.range();
        let dst_range = dst.checked_region(&dst_buffer, dst_offset, len)?.range();

        dst_buffer[dst_range].copy_from_slice(&src_buffer[src_range]);
        Ok(())
    }

    /// Fills the memory region with the specified value.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the specified region is out of bounds.
    pub fn clear(&self, offset: usize, new_val: u8, len: usize) -> Result<(), Error> {
        let mut buffer = self.buffer.borrow_mut();
        let range = self.checked_region(&buffer, offset, len)?.range();
        for val in &mut buffer[range] {
            *val = new_val;
        }
        Ok(())
    }

    /// Fills the specified memory region with zeroes.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the specified region is out of bounds.
    pub fn zero(&self, offset: usize, len: usize) -> Result<(), Error> {
        self.clear(offset, 0, len)
    }

    /// Provides direct access to the underlying memory buffer.
    ///
    /// # Panics
    ///
    /// Any call requiring write access to the memory made within the
    /// closure will panic.
    pub fn with_direct_access<R, F: FnOnce(&[u8]) -> R>(&self, f: F) -> R {
        let buf = self.buffer.borrow();
        f(&buf)
    }

    /// Provides direct mutable access to the underlying memory buffer.
    ///
    /// # Panics
    ///
    /// Any call requiring read or write access to the memory made within
    /// the closure will panic. The closure must not change the buffer's
    /// length.
    pub fn with_direct_access_mut<R, F: FnOnce(&mut [u8]) -> R>(&self, f: F) -> R {
        let mut buf = self.buffer.borrow_mut();
        f(&mut buf)
    }
}

pub(crate) fn validate_memory(initial: Pages, maximum: Option<Pages>) -> Result<(), String> {
    if initial > LINEAR_MEMORY_MAX_PAGES {
        return Err(format!(
            "initial memory size must be at most {} pages",
            LINEAR_MEMORY_MAX_PAGES.0
        ));
    }
    if let Some(maximum) = maximum {
        if initial > maximum {
            return Err(format!(
                "maximum limit {} is less than minimum {}",
                maximum.0, initial.0,
            ));
        }
        if maximum > LINEAR_MEMORY_MAX_PAGES {
            return Err(format!(
                "maximum memory size must be at most {} pages",
                LINEAR_MEMORY_MAX_PAGES.0
            ));
        }
    }
    Ok(())
}

pub(crate) fn match_limits(have: &ResizableLimits, want: &ResizableLimits) -> Result<(), Error> {
    if have.initial() < want.initial() {
        return Err(Error::Instantiation(format!(
            "provided initial size {} is smaller than requested {}",
            have.initial(),
            want.initial()
        )));
    }

    match (have.maximum(), want.maximum()) {
        (_, None) => (),
        (Some(have_max), Some(want_max)) if have_max <= want_max => (),
        _ => {
            return Err(Error::Instantiation(format!(
                "provided maximum {:?} does not satisfy requested maximum {:?}",
                have.maximum(),
                want.maximum()
            )));
        }
    }

    Ok(())
}

pub(crate) fn check_limits(limits: &ResizableLimits) -> Result<(), Error> {
    if let Some(maximum) = limits.maximum() {
        if maximum < limits.initial() {
            return Err(Error::Instantiation(format!(
                "maximum limit {} is less than minimum {}",
                maximum,
                limits.initial()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{MemoryInstance, LINEAR_MEMORY_PAGE_SIZE};
    use memory_units::wasm32::Pages;

    #[test]
    fn alloc() {
        let fixtures = &[
            (0, None, true),
            (0, Some(0), true),
            (1, None, true),
            (1, Some(1), true),
            (0, Some(1), true),
            (1, Some(0), false),
            (0, Some(65536), true),
            (65536, Some(65536), true),
            (65536, Some(0), false),
            (65536, None, true),
        ];

        for (index, &(initial, maybe_max, expected_ok)) in fixtures.iter().enumerate() {
            let initial: Pages = Pages(initial);
            let maximum: Option<Pages> = maybe_max.map(Pages);
            let result = MemoryInstance::alloc(initial, maximum);
            if result.is_ok() != expected_ok {
                panic!(
                    "unexpected error at {}, initial={:?}, max={:?}, expected={}, result={:?}",
                    index, initial, maybe_max, expected_ok, result,
                );
            }
        }
    }

    #[test]
    fn ensure_page_size() {
        use memory_units::ByteSize;
        assert_eq!(LINEAR_MEMORY_PAGE_SIZE, Pages::BYTE_SIZE);
    }

    #[test]
    fn grow_respects_maximum() {
        let mem = MemoryInstance::alloc(Pages(1), Some(Pages(2))).unwrap();
        assert_eq!(mem.grow(Pages(1)).unwrap(), Pages(1));
        assert_eq!(mem.current_size(), Pages(2));
        assert!(mem.grow(Pages(1)).is_err());
        assert_eq!(mem.current_size(), Pages(2));
    }

    #[test]
    fn grown_pages_are_zeroed() {
        let mem = MemoryInstance::alloc(Pages(1), None).unwrap();
        mem.grow(Pages(1)).unwrap();
        assert_eq!(mem.get(65536, 4).unwrap(), vec![0; 4]);
    }

    #[test]
    fn copy_overlaps() {
        let mem = MemoryInstance::alloc(Pages(1), Some(Pages(1))).unwrap();
        mem.set(0, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap();
        mem.copy(0, 4, 6).unwrap();
        assert_eq!(mem.get(0, 10).unwrap(), &[0, 1, 2, 3, 0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn transfer_works() {
        let src = MemoryInstance::alloc(Pages(1), None).unwrap();
        let dst = MemoryInstance::alloc(Pages(1), None).unwrap();
        src.set(0, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap();
        dst.set(0, &[10, 11, 12, 13, 14, 15, 16, 17, 18, 19]).unwrap();

        MemoryInstance::transfer(&src, 4, &dst, 0, 3).unwrap();

        assert_eq!(src.get(0, 10).unwrap(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(
            dst.get(0, 10).unwrap(),
            &[4, 5, 6, 13, 14, 15, 16, 17, 18, 19]
        );
    }

    #[test]
    fn transfer_oob_errors() {
        let src = MemoryInstance::alloc(Pages(1), None).unwrap();
        let dst = MemoryInstance::alloc(Pages(1), None).unwrap();
        src.set(0, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]).unwrap();
        assert!(MemoryInstance::transfer(&src, 65535, &dst, 0, 3).is_err());
        // Contents are untouched on failure.
        assert_eq!(src.get(0, 10).unwrap(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn get_into() {
        let mem = MemoryInstance::alloc(Pages(1), None).unwrap();
        mem.set(6, &[13, 17, 129]).unwrap();

        let mut data = [0u8; 2];
        mem.get_into(7, &mut data[..]).unwrap();

        assert_eq!(data, [17, 129]);
    }

    #[test]
    fn typed_views_round_trip() {
        use crate::nan_preserving_float::F64;

        let mem = MemoryInstance::alloc(Pages(1), None).unwrap();
        mem.set_value(16, -2i32).unwrap();
        assert_eq!(mem.get_value::<i32>(16).unwrap(), -2);
        assert_eq!(mem.get_value::<u8>(16).unwrap(), 0xfe);

        let nan = F64::nan_with_payload(false, 0xbeef);
        mem.set_value(32, nan).unwrap();
        assert_eq!(mem.get_value::<F64>(32).unwrap().to_bits(), nan.to_bits());
    }

    #[test]
    fn out_of_bounds_access_errors() {
        let mem = MemoryInstance::alloc(Pages(1), None).unwrap();
        assert!(mem.get_value::<i64>(65533).is_err());
        assert!(mem.set_value(65533, 0i64).is_err());
        assert!(mem.get_value::<u8>(65536).is_err());
    }
}
