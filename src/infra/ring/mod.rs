//! Fixed-capacity circular queues over caller-provided pools.
//!
//! [`RingIndex`] only tracks positions; the slots live in a shared pool
//! starting at `base`. Read and write counters advance monotonically (with
//! wrap-around), so fill level is `write_count - read_count` regardless of
//! index wrap.
//!
//! Two views operate on a `RingIndex`:
//! * [`RingQueue`] for `Copy` entries (request queues, Tx confirmation ids);
//! * [`SlotQueue`] for fixed-size byte slots (container Rx queue).
use crate::error::QueueError;

/// Largest supported queue depth.
pub const MAX_QUEUE_DEPTH: u16 = 254;

/// Positions and counters of one ring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingIndex {
    base: u32,
    slots: u16,
    capacity: u16,
    read_idx: u16,
    write_idx: u16,
    read_count: u16,
    write_count: u16,
}

/// Read position snapshot, see [`RingIndex::restore_point`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestorePoint {
    read_idx: u16,
    read_count: u16,
}

impl RingIndex {
    /// Ring over `slots` pool entries starting at `base`, holding at most
    /// `capacity` elements (`capacity <= slots`).
    pub const fn new(base: usize, slots: u16, capacity: u16) -> Self {
        Self {
            base: base as u32,
            slots,
            capacity,
            read_idx: 0,
            write_idx: 0,
            read_count: 0,
            write_count: 0,
        }
    }

    /// Number of stored elements.
    #[inline]
    pub fn len(&self) -> u16 {
        self.write_count.wrapping_sub(self.read_count)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Configured depth.
    #[inline]
    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    /// Offset of slot 0 inside the pool.
    #[inline]
    pub fn base(&self) -> usize {
        self.base as usize
    }

    /// Ring-relative position of the oldest element.
    #[inline]
    pub fn read_position(&self) -> usize {
        self.read_idx as usize
    }

    /// Ring-relative position the next element is written to.
    #[inline]
    pub fn write_position(&self) -> usize {
        self.write_idx as usize
    }

    /// Pool index of the oldest element.
    #[inline]
    pub fn read_slot(&self) -> usize {
        self.base() + self.read_position()
    }

    /// Pool index the next element is written to.
    #[inline]
    pub fn write_slot(&self) -> usize {
        self.base() + self.write_position()
    }

    /// Pool index of the `n`-th oldest element.
    pub fn nth_slot(&self, n: u16) -> Option<usize> {
        if n >= self.len() || self.slots == 0 {
            return None;
        }
        let pos = (self.read_idx as u32 + n as u32) % self.slots as u32;
        Some(self.base() + pos as usize)
    }

    /// Account for an element written at [`write_slot`](Self::write_slot).
    pub fn commit_write(&mut self) -> Result<(), QueueError> {
        if self.is_full() {
            return Err(QueueError::Full);
        }
        self.write_idx = self.advance(self.write_idx);
        self.write_count = self.write_count.wrapping_add(1);
        Ok(())
    }

    /// Drop the oldest element.
    pub fn remove(&mut self) -> Result<(), QueueError> {
        if self.is_empty() {
            return Err(QueueError::Empty);
        }
        self.read_idx = self.advance(self.read_idx);
        self.read_count = self.read_count.wrapping_add(1);
        Ok(())
    }

    /// Drop the `n` newest elements.
    pub fn retract(&mut self, n: u16) -> Result<(), QueueError> {
        if n > self.len() {
            return Err(QueueError::Empty);
        }
        if n == 0 {
            return Ok(());
        }
        let slots = self.slots as u32;
        let back = n as u32 % slots;
        self.write_idx = ((self.write_idx as u32 + slots - back) % slots) as u16;
        self.write_count = self.write_count.wrapping_sub(n);
        Ok(())
    }

    /// Snapshot of the read side, to undo removals that did not take effect.
    pub fn restore_point(&self) -> RestorePoint {
        RestorePoint {
            read_idx: self.read_idx,
            read_count: self.read_count,
        }
    }

    /// Return to `point`.
    ///
    /// Refused (returns `false`) when slots released since the snapshot were
    /// written again in between.
    pub fn rollback(&mut self, point: RestorePoint) -> bool {
        if self.write_count.wrapping_sub(point.read_count) > self.capacity {
            return false;
        }
        self.read_idx = point.read_idx;
        self.read_count = point.read_count;
        true
    }

    fn advance(&self, idx: u16) -> u16 {
        if idx + 1 >= self.slots {
            0
        } else {
            idx + 1
        }
    }
}

//==================================================================================RING_QUEUE

/// Queue of `Copy` entries stored in a shared pool.
pub struct RingQueue<'q, T> {
    index: &'q mut RingIndex,
    pool: &'q mut [T],
}

impl<'q, T: Copy> RingQueue<'q, T> {
    pub fn new(index: &'q mut RingIndex, pool: &'q mut [T]) -> Self {
        Self { index, pool }
    }

    pub fn len(&self) -> u16 {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.index.is_full()
    }

    pub fn capacity(&self) -> u16 {
        self.index.capacity()
    }

    /// Append `value`; fails when full.
    pub fn put(&mut self, value: T) -> Result<(), QueueError> {
        if self.index.is_full() {
            return Err(QueueError::Full);
        }
        let slot = self
            .pool
            .get_mut(self.index.write_slot())
            .ok_or(QueueError::Full)?;
        *slot = value;
        self.index.commit_write()
    }

    /// Oldest element, left in place.
    pub fn peek(&self) -> Option<T> {
        if self.index.is_empty() {
            return None;
        }
        self.pool.get(self.index.read_slot()).copied()
    }

    /// Remove and return the oldest element.
    pub fn get(&mut self) -> Result<T, QueueError> {
        let value = self.peek().ok_or(QueueError::Empty)?;
        self.index.remove()?;
        Ok(value)
    }

    /// Drop the oldest element.
    pub fn remove(&mut self) -> Result<(), QueueError> {
        self.index.remove()
    }

    /// Stored elements, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.index.len())
            .filter_map(move |n| self.index.nth_slot(n))
            .filter_map(move |slot| self.pool.get(slot).copied())
    }
}

//==================================================================================SLOT_QUEUE

/// Queue of byte slots of `slot_len` bytes each, with per-slot lengths.
///
/// Slot `i` lives at `bytes[bytes_base + i * slot_len..]`; its stored length
/// at `lengths[index.base() + i]`.
pub struct SlotQueue<'q> {
    index: &'q mut RingIndex,
    lengths: &'q mut [u16],
    bytes: &'q mut [u8],
    bytes_base: usize,
    slot_len: usize,
}

impl<'q> SlotQueue<'q> {
    pub fn new(
        index: &'q mut RingIndex,
        lengths: &'q mut [u16],
        bytes: &'q mut [u8],
        bytes_base: usize,
        slot_len: usize,
    ) -> Self {
        Self {
            index,
            lengths,
            bytes,
            bytes_base,
            slot_len,
        }
    }

    pub fn len(&self) -> u16 {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.index.is_full()
    }

    /// Store `data`, trimmed to the slot length. Returns the stored length.
    pub fn put(&mut self, data: &[u8]) -> Result<usize, QueueError> {
        if self.index.is_full() {
            return Err(QueueError::Full);
        }
        let stored = data.len().min(self.slot_len);
        let start = self.bytes_base + self.index.write_position() * self.slot_len;
        let slot = self
            .bytes
            .get_mut(start..start + stored)
            .ok_or(QueueError::Full)?;
        slot.copy_from_slice(&data[..stored]);
        let length = self
            .lengths
            .get_mut(self.index.write_slot())
            .ok_or(QueueError::Full)?;
        *length = stored as u16;
        self.index.commit_write()?;
        Ok(stored)
    }

    /// Copy the oldest slot into `out` and remove it.
    ///
    /// The copied length is the stored length, bounded by `out`.
    pub fn get(&mut self, out: &mut [u8]) -> Result<usize, QueueError> {
        if self.index.is_empty() {
            return Err(QueueError::Empty);
        }
        let stored = self
            .lengths
            .get(self.index.read_slot())
            .copied()
            .ok_or(QueueError::Empty)? as usize;
        let len = stored.min(out.len());
        let start = self.bytes_base + self.index.read_position() * self.slot_len;
        let slot = self
            .bytes
            .get(start..start + len)
            .ok_or(QueueError::Empty)?;
        out[..len].copy_from_slice(slot);
        self.index.remove()?;
        Ok(len)
    }

    /// Drop the oldest slot.
    pub fn remove(&mut self) -> Result<(), QueueError> {
        self.index.remove()
    }
}
