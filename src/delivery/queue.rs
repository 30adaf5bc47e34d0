//! Fixed-capacity FIFO of outbound reports.
//!
//! The ring is stored as `head + len`; every index calculation goes through
//! [`DeliveryQueue::slot`]. By default one slot is kept free so the write
//! and read indices alone tell "full" from "empty", matching the classic
//! ring layout. [`SlotPolicy::AllSlots`] uses the whole array.

use super::ReportEntry;
use crate::error::Error;

/// How many of the `N` slots may hold entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotPolicy {
    /// Usable capacity is `N - 1`.
    #[default]
    ReserveOne,
    /// Usable capacity is `N`.
    AllSlots,
}

/// Snapshot of the ring indices, for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueStatus {
    pub write_index: usize,
    pub read_index: usize,
    pub full: bool,
    pub empty: bool,
}

pub struct DeliveryQueue<const N: usize> {
    slots: [ReportEntry; N],
    head: usize,
    len: usize,
    policy: SlotPolicy,
}

impl<const N: usize> DeliveryQueue<N> {
    pub fn new(policy: SlotPolicy) -> Self {
        Self {
            slots: [ReportEntry::default(); N],
            head: 0,
            len: 0,
            policy,
        }
    }

    /// Number of entries the queue can hold under its slot policy.
    pub fn capacity(&self) -> usize {
        match self.policy {
            SlotPolicy::ReserveOne => N.saturating_sub(1),
            SlotPolicy::AllSlots => N,
        }
    }

    fn slot(&self, offset: usize) -> usize {
        (self.head + offset) % N
    }

    /// Append `entry` at the tail.
    ///
    /// Fails without touching the queue when it is full or the entry length
    /// is outside 1..=5.
    pub fn try_enqueue(&mut self, entry: ReportEntry) -> Result<(), Error> {
        if !entry.is_valid() {
            return Err(Error::InvalidReport);
        }
        if self.is_full() {
            return Err(Error::QueueFull);
        }
        let tail = self.slot(self.len);
        self.slots[tail] = entry;
        self.len += 1;
        Ok(())
    }

    /// Remove and return the oldest entry.
    pub fn try_dequeue(&mut self) -> Option<ReportEntry> {
        if self.is_empty() {
            return None;
        }
        let entry = self.slots[self.head];
        self.head = self.slot(1);
        self.len -= 1;
        Some(entry)
    }

    /// Put an entry back at the head, ahead of everything queued.
    pub fn requeue_front(&mut self, entry: ReportEntry) -> Result<(), Error> {
        if !entry.is_valid() {
            return Err(Error::InvalidReport);
        }
        if self.is_full() {
            return Err(Error::QueueFull);
        }
        self.head = (self.head + N - 1) % N;
        self.slots[self.head] = entry;
        self.len += 1;
        Ok(())
    }

    /// Keep only entries for which `keep` returns true, preserving order.
    /// Returns the number of entries removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&ReportEntry) -> bool) -> usize {
        let before = self.len;
        let mut kept = 0;
        for offset in 0..before {
            let entry = self.slots[self.slot(offset)];
            if keep(&entry) {
                let dst = self.slot(kept);
                self.slots[dst] = entry;
                kept += 1;
            }
        }
        self.len = kept;
        before - kept
    }

    pub fn depth(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.capacity()
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            write_index: self.slot(self.len),
            read_index: self.head,
            full: self.is_full(),
            empty: self.is_empty(),
        }
    }
}
