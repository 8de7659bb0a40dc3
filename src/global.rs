//! Runtime global variables.

use crate::types::ValueType;
use crate::value::RuntimeValue;
use crate::Error;
use std::cell::Cell;
use std::rc::Rc;

/// Reference to a global variable (See [`GlobalInstance`] for details).
///
/// This reference has reference-counting semantics.
///
/// [`GlobalInstance`]: struct.GlobalInstance.html
#[derive(Clone, Debug)]
pub struct GlobalRef(Rc<GlobalInstance>);

impl ::std::ops::Deref for GlobalRef {
    type Target = GlobalInstance;
    fn deref(&self) -> &GlobalInstance {
        &self.0
    }
}

/// Runtime representation of a global variable (or `global` for short).
///
/// A global contains a value of a fixed type and a flag specifying whether
/// the global is mutable. Neither the type of the value nor the mutability
/// can change after creation.
///
/// Attempts to change the value of an immutable global or to change the
/// type of the value will lead to an error.
#[derive(Debug)]
pub struct GlobalInstance {
    val: Cell<RuntimeValue>,
    mutable: bool,
}

impl GlobalInstance {
    /// Allocates a global variable instance.
    ///
    /// Since it is only possible to export immutable globals, users likely
    /// want `mutable` set to `false`.
    pub fn alloc(val: RuntimeValue, mutable: bool) -> GlobalRef {
        GlobalRef(Rc::new(GlobalInstance {
            val: Cell::new(val),
            mutable,
        }))
    }

    /// Changes the value of this global variable.
    ///
    /// # Errors
    ///
    /// Returns `Err` if this global isn't mutable or if the type of `val`
    /// doesn't match the global's type.
    pub fn set(&self, val: RuntimeValue) -> Result<(), Error> {
        if !self.mutable {
            return Err(Error::Global(
                "attempt to change an immutable variable".into(),
            ));
        }
        if self.value_type() != val.value_type() {
            return Err(Error::Global("attempt to change variable type".into()));
        }
        self.val.set(val);
        Ok(())
    }

    /// Gets the value of this global variable.
    pub fn get(&self) -> RuntimeValue {
        self.val.get()
    }

    /// Returns whether this global variable is mutable.
    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Returns the value type of this global variable.
    pub fn value_type(&self) -> ValueType {
        self.val.get().value_type()
    }
}

#[cfg(test)]
mod tests {
    use super::GlobalInstance;
    use crate::value::RuntimeValue;

    #[test]
    fn immutable_rejects_set() {
        let global = GlobalInstance::alloc(RuntimeValue::I32(5), false);
        assert!(global.set(RuntimeValue::I32(6)).is_err());
        assert_eq!(global.get(), RuntimeValue::I32(5));
    }

    #[test]
    fn type_is_fixed() {
        let global = GlobalInstance::alloc(RuntimeValue::I32(5), true);
        assert!(global.set(RuntimeValue::I64(6)).is_err());
        assert!(global.set(RuntimeValue::I32(6)).is_ok());
        assert_eq!(global.get(), RuntimeValue::I32(6));
    }
}
