//! Runtime tables.

use crate::func::FuncRef;
use crate::memory::check_limits;
use crate::types::ResizableLimits;
use crate::Error;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Reference to a table (See [`TableInstance`] for details).
///
/// This reference has reference-counting semantics.
///
/// [`TableInstance`]: struct.TableInstance.html
#[derive(Clone, Debug)]
pub struct TableRef(Rc<TableInstance>);

impl ::std::ops::Deref for TableRef {
    type Target = TableInstance;
    fn deref(&self) -> &TableInstance {
        &self.0
    }
}

/// Runtime representation of a table.
///
/// A table is an array of untyped function references. It allows wasm code
/// to call functions indirectly through a dynamic index into a table, which
/// is how function pointers are emulated.
///
/// A table is created with an initial size but can be grown dynamically via
/// the [`grow`] method; growth can be bounded by an optional maximum size.
/// Uninitialized slots hold `None` and trap when called through.
///
/// In the MVP the only element type is `anyfunc`.
///
/// [`grow`]: #method.grow
pub struct TableInstance {
    /// Table limits.
    limits: ResizableLimits,
    /// Table elements.
    buffer: RefCell<Vec<Option<FuncRef>>>,
}

impl fmt::Debug for TableInstance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("TableInstance")
            .field("limits", &self.limits)
            .field("buffer.len", &self.buffer.borrow().len())
            .finish()
    }
}

impl TableInstance {
    /// Allocates a table instance with the given initial size, all
    /// elements uninitialized, and an optional maximum size.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `initial_size` is greater than `maximum_size`.
    pub fn alloc(initial_size: u32, maximum_size: Option<u32>) -> Result<TableRef, Error> {
        let table = TableInstance::new(ResizableLimits::new(initial_size, maximum_size))?;
        Ok(TableRef(Rc::new(table)))
    }

    fn new(limits: ResizableLimits) -> Result<TableInstance, Error> {
        check_limits(&limits)?;
        Ok(TableInstance {
            buffer: RefCell::new(vec![None; limits.initial() as usize]),
            limits,
        })
    }

    /// Returns the table limits.
    pub(crate) fn limits(&self) -> &ResizableLimits {
        &self.limits
    }

    /// Returns the size this table was created with.
    pub fn initial_size(&self) -> u32 {
        self.limits.initial()
    }

    /// Returns the maximum size this `TableInstance` can grow to.
    pub fn maximum_size(&self) -> Option<u32> {
        self.limits.maximum()
    }

    /// Returns the current size of the table.
    pub fn current_size(&self) -> u32 {
        self.buffer.borrow().len() as u32
    }

    /// Increases the size of the table by the given number of elements.
    ///
    /// # Errors
    ///
    /// Returns `Err` if more elements were requested than permitted by the
    /// limit.
    pub fn grow(&self, by: u32) -> Result<(), Error> {
        let mut buffer = self.buffer.borrow_mut();
        let maximum_size = self.maximum_size().unwrap_or(u32::MAX);
        let new_size = self
            .current_size()
            .checked_add(by)
            .filter(|new_size| *new_size <= maximum_size)
            .ok_or_else(|| {
                Error::Table(format!(
                    "trying to grow table by {} items when there are already {} items",
                    by,
                    self.current_size(),
                ))
            })?;
        buffer.resize(new_size as usize, None);
        Ok(())
    }

    /// Gets the element at the given index.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the index is out of bounds.
    pub fn get(&self, offset: u32) -> Result<Option<FuncRef>, Error> {
        let buffer = self.buffer.borrow();
        let buffer_len = buffer.len();
        let table_elem = buffer.get(offset as usize).cloned().ok_or_else(|| {
            Error::Table(format!(
                "trying to read table item with index {} when there are only {} items",
                offset, buffer_len
            ))
        })?;
        Ok(table_elem)
    }

    /// Sets the element at the given index.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the index is out of bounds.
    pub fn set(&self, offset: u32, value: Option<FuncRef>) -> Result<(), Error> {
        let mut buffer = self.buffer.borrow_mut();
        let buffer_len = buffer.len();
        let table_elem = buffer.get_mut(offset as usize).ok_or_else(|| {
            Error::Table(format!(
                "trying to update table item with index {} when there are only {} items",
                offset, buffer_len
            ))
        })?;
        *table_elem = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::TableInstance;

    #[test]
    fn alloc_respects_limits() {
        assert!(TableInstance::alloc(10, Some(20)).is_ok());
        assert!(TableInstance::alloc(10, None).is_ok());
        assert!(TableInstance::alloc(10, Some(5)).is_err());
    }

    #[test]
    fn uninitialized_slots_are_none() {
        let table = TableInstance::alloc(2, None).unwrap();
        assert!(table.get(0).unwrap().is_none());
        assert!(table.get(2).is_err());
    }

    #[test]
    fn grow_respects_maximum() {
        let table = TableInstance::alloc(1, Some(2)).unwrap();
        assert!(table.grow(1).is_ok());
        assert_eq!(table.current_size(), 2);
        assert!(table.grow(1).is_err());
    }
}
