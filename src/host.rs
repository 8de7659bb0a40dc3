//! Host function plumbing: argument lists, host errors and the
//! [`Externals`] dispatch trait.

use crate::value::{FromRuntimeValue, RuntimeValue};
use crate::{Trap, TrapCode};
use downcast_rs::{impl_downcast, Downcast};

/// Wrapper around a slice of [`RuntimeValue`] for using it as an argument
/// list conveniently.
///
/// [`RuntimeValue`]: enum.RuntimeValue.html
#[derive(Debug)]
pub struct RuntimeArgs<'a>(&'a [RuntimeValue]);

impl<'a> From<&'a [RuntimeValue]> for RuntimeArgs<'a> {
    fn from(inner: &'a [RuntimeValue]) -> Self {
        RuntimeArgs(inner)
    }
}

impl<'a> AsRef<[RuntimeValue]> for RuntimeArgs<'a> {
    fn as_ref(&self) -> &[RuntimeValue] {
        self.0
    }
}

impl<'a> RuntimeArgs<'a> {
    /// Extracts an argument by index `idx`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the cast is invalid or there are not enough
    /// arguments.
    pub fn nth_checked<T>(&self, idx: usize) -> Result<T, Trap>
    where
        T: FromRuntimeValue,
    {
        self.nth_value_checked(idx)?
            .try_into()
            .ok_or_else(|| TrapCode::UnexpectedSignature.into())
    }

    /// Extracts an argument as a [`RuntimeValue`] by index `idx`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if this list does not have enough arguments.
    ///
    /// [`RuntimeValue`]: enum.RuntimeValue.html
    pub fn nth_value_checked(&self, idx: usize) -> Result<RuntimeValue, Trap> {
        if self.0.len() <= idx {
            return Err(TrapCode::UnexpectedSignature.into());
        }
        Ok(self.0[idx])
    }

    /// Extracts an argument by index `idx`.
    ///
    /// # Panics
    ///
    /// Panics if the cast is invalid or there are not enough arguments.
    pub fn nth<T>(&self, idx: usize) -> T
    where
        T: FromRuntimeValue,
    {
        let value = self.nth_value_checked(idx).expect("invalid argument index");
        value.try_into().expect("unexpected argument type")
    }

    /// Total number of arguments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the argument list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Trait that allows the host to return custom errors.
///
/// It is useful for representing custom traps, troubles at instantiation
/// time or other host-specific conditions.
///
/// # Examples
///
/// ```rust
/// use std::fmt;
/// use wasmith::{Error, HostError};
///
/// #[derive(Debug)]
/// struct MyError {
///     code: u32,
/// }
///
/// impl fmt::Display for MyError {
///     fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
///         write!(f, "MyError, code={}", self.code)
///     }
/// }
///
/// impl HostError for MyError {}
///
/// fn failable_fn() -> Result<(), Error> {
///     let my_error = MyError { code: 1312 };
///     Err(Error::Host(Box::new(my_error)))
/// }
///
/// match failable_fn() {
///     Err(Error::Host(host_error)) => {
///         let my_error = host_error.downcast_ref::<MyError>().unwrap();
///         assert_eq!(my_error.code, 1312);
///     }
///     _ => panic!(),
/// }
/// ```
pub trait HostError: 'static + ::std::fmt::Display + ::std::fmt::Debug + Downcast {}
impl_downcast!(HostError);

/// Trait that allows to implement host functions.
///
/// Functions imported from the host are identified by the index given to
/// [`FuncInstance::alloc_host`]; the interpreter hands that index back to
/// `invoke_index` together with the popped arguments.
///
/// [`FuncInstance::alloc_host`]: struct.FuncInstance.html#method.alloc_host
pub trait Externals {
    /// Performs the invocation of a host function by the specified `index`.
    fn invoke_index(
        &mut self,
        index: usize,
        args: RuntimeArgs,
    ) -> Result<Option<RuntimeValue>, Trap>;
}

/// Implementation of [`Externals`] that just traps on [`invoke_index`].
///
/// [`Externals`]: trait.Externals.html
/// [`invoke_index`]: trait.Externals.html#tymethod.invoke_index
pub struct NopExternals;

impl Externals for NopExternals {
    fn invoke_index(
        &mut self,
        _index: usize,
        _args: RuntimeArgs,
    ) -> Result<Option<RuntimeValue>, Trap> {
        Err(TrapCode::Unreachable.into())
    }
}

#[cfg(test)]
mod tests {
    use super::{HostError, RuntimeArgs};
    use crate::value::RuntimeValue;

    #[test]
    fn i32_runtime_args() {
        let args: RuntimeArgs = (&[RuntimeValue::I32(0)][..]).into();
        let val: i32 = args.nth_checked(0).unwrap();
        assert_eq!(val, 0);
    }

    #[test]
    fn i64_invalid_arg_cast() {
        let args: RuntimeArgs = (&[RuntimeValue::I64(90534534545322)][..]).into();
        assert!(args.nth_checked::<i32>(0).is_err());
    }

    // Tests that the `HostError` trait is object safe.
    fn _host_error_is_object_safe(_: &dyn HostError) {}
}
