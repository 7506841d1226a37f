//! Reference-counted object lifetime.
//!
//! Handles are cheap `Rc` clones; cloning a handle does not touch the API reference count.
//! The count is explicit, like the native API: objects start at 1, [`Unknown::add_ref`]
//! increments and [`Unknown::release`] decrements. When it reaches zero the object frees its
//! backend objects, releases what it holds (its device, a view's resource) and becomes
//! unusable; later use reports [`D3dError::UseAfterRelease`].

use std::cell::Cell;

use crate::error::{D3dError, Result};

pub trait Unknown {
    /// Increments the reference count and returns the new value.
    fn add_ref(&self) -> Result<u32>;

    /// Decrements the reference count and returns the new value, tearing the object down when
    /// it reaches zero. Releasing an object whose count is already zero is an error.
    fn release(&self) -> Result<u32>;

    fn ref_count(&self) -> u32;
}

#[derive(Debug)]
pub(crate) struct RefCount {
    count: Cell<u32>,
}

impl RefCount {
    pub(crate) fn new() -> Self {
        Self {
            count: Cell::new(1),
        }
    }

    pub(crate) fn get(&self) -> u32 {
        self.count.get()
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.count.get() > 0
    }

    pub(crate) fn ensure_alive(&self, what: &'static str) -> Result<()> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(D3dError::UseAfterRelease(what))
        }
    }

    pub(crate) fn add_ref(&self, what: &'static str) -> Result<u32> {
        self.ensure_alive(what)?;
        let count = self.count.get() + 1;
        self.count.set(count);
        Ok(count)
    }

    /// Returns the decremented count; the caller tears down at zero.
    pub(crate) fn release(&self) -> Result<u32> {
        let count = self
            .count
            .get()
            .checked_sub(1)
            .ok_or(D3dError::AlreadyReleased)?;
        self.count.set(count);
        Ok(count)
    }
}

/// Implements [`Unknown`] for a handle whose `Rc` payload has a `refs: RefCount` field and
/// whose type has an inherent `fn destroy(&self)`.
macro_rules! impl_unknown {
    ($ty:ty, $what:literal) => {
        impl $crate::object::Unknown for $ty {
            fn add_ref(&self) -> $crate::error::Result<u32> {
                self.0.refs.add_ref($what)
            }

            fn release(&self) -> $crate::error::Result<u32> {
                let count = self.0.refs.release()?;
                if count == 0 {
                    ::tracing::debug!(object = $what, "final release");
                    self.destroy();
                }
                Ok(count)
            }

            fn ref_count(&self) -> u32 {
                self.0.refs.get()
            }
        }

        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                ::std::rc::Rc::ptr_eq(&self.0, &other.0)
            }
        }

        impl Eq for $ty {}

        impl ::std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, concat!($what, "@{:p}(refs={})"), ::std::rc::Rc::as_ptr(&self.0), self.0.refs.get())
            }
        }
    };
}

pub(crate) use impl_unknown;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_past_zero_is_an_error() {
        let refs = RefCount::new();
        assert_eq!(refs.add_ref("Buffer").unwrap(), 2);
        assert_eq!(refs.release().unwrap(), 1);
        assert_eq!(refs.release().unwrap(), 0);
        assert!(matches!(refs.release(), Err(D3dError::AlreadyReleased)));
        assert!(matches!(refs.add_ref("Buffer"), Err(D3dError::UseAfterRelease("Buffer"))));
    }
}
