//! Single-slot outbound buffer with overwrite semantics.

use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;

/// Holds at most one unsent message.
///
/// Each `replace` bumps a sequence number so the writer can clear exactly
/// the payload it sent, never a newer one stored while the write was in
/// flight.
#[derive(Debug, Default)]
pub(crate) struct PendingSlot {
    inner: Mutex<Slot>,
}

#[derive(Debug, Default)]
struct Slot {
    seq: u64,
    payload: Option<Bytes>,
}

impl PendingSlot {
    /// Store `payload`, dropping any unsent one. Returns true if one was dropped.
    pub(crate) fn replace(&self, payload: Bytes) -> bool {
        let mut slot = self.lock();
        slot.seq = slot.seq.wrapping_add(1);
        slot.payload.replace(payload).is_some()
    }

    /// The current payload and its sequence number, left in place.
    pub(crate) fn peek(&self) -> Option<(u64, Bytes)> {
        let slot = self.lock();
        slot.payload.as_ref().map(|payload| (slot.seq, payload.clone()))
    }

    /// Clear the slot if it still holds the payload tagged `seq`.
    pub(crate) fn clear_if(&self, seq: u64) -> bool {
        let mut slot = self.lock();
        if slot.seq == seq && slot.payload.is_some() {
            slot.payload = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().payload.is_none()
    }

    // The slot is always left consistent, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
