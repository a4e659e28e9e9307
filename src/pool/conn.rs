//! Caller-facing connection handle.

use std::fmt;
use std::sync::Weak;

use crate::pool::error::PoolError;
use crate::pool::node::{close_quietly, Shared};
use crate::pool::Resource;

/// A pooled connection.
///
/// Remembers the node that owns it. Releasing (or dropping) the handle gives
/// the resource back to that node; [`PooledConn::close`] tears it down and
/// frees the slot instead.
pub struct PooledConn<R: Resource> {
    raw: Option<R>,
    released: bool,
    owner: Weak<Shared<R>>,
}

impl<R: Resource> PooledConn<R> {
    pub(crate) fn new(raw: R, owner: Weak<Shared<R>>) -> Self {
        Self {
            raw: Some(raw),
            released: false,
            owner,
        }
    }

    /// The raw resource, or `None` once the handle has been closed or released.
    pub fn raw(&self) -> Option<&R> {
        self.raw.as_ref()
    }

    /// Mutable access to the raw resource.
    pub fn raw_mut(&mut self) -> Option<&mut R> {
        self.raw.as_mut()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Give the connection back to its node for reuse.
    pub fn release(mut self) {
        self.give_back();
    }

    /// Close the underlying resource and free its slot in the owning node.
    ///
    /// Only the first call has any effect; later calls return `Ok(())`.
    pub fn close(&mut self) -> Result<(), PoolError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        if let Some(shared) = self.owner.upgrade() {
            shared.close_conn();
        }
        match self.raw.take() {
            Some(raw) => raw.close().map_err(PoolError::Close),
            None => Ok(()),
        }
    }

    /// Detach the resource without touching the owner's accounting.
    pub(crate) fn into_raw(mut self) -> Option<R> {
        self.released = true;
        self.raw.take()
    }

    fn give_back(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let Some(raw) = self.raw.take() else {
            return;
        };
        match self.owner.upgrade() {
            Some(shared) => shared.put_conn(raw),
            None => close_quietly(raw),
        }
    }
}

impl<R: Resource> Drop for PooledConn<R> {
    fn drop(&mut self) {
        self.give_back();
    }
}

impl<R: Resource> fmt::Debug for PooledConn<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConn")
            .field("released", &self.released)
            .field("has_raw", &self.raw.is_some())
            .finish()
    }
}
