//! Double-ended bump allocator for timestamped event records.
//!
//! One contiguous byte region holds fixed-size records growing from the
//! front and variable-length payloads growing from the back. Reservation
//! and reset are pointer arithmetic only; nothing is allocated after
//! [`EventBuffer::with_capacity`].

#![forbid(unsafe_code)]

/// Bytes taken by one record slot: time, payload size, payload offset (u32 LE each).
pub const EVENT_RECORD_SIZE: usize = 12;

/// Capacity of an event process buffer unless configured otherwise.
pub const DEFAULT_EVENT_CAPACITY: usize = 8192 * 4;

/// Returned by [`EventBuffer::get`] for an index at or past the event count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no event at this index")]
pub struct NoData;

/// A read view of one stored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event<'a> {
    pub time: u32,
    pub data: &'a [u8],
}

/// Fixed-capacity event storage.
pub struct EventBuffer {
    storage: Box<[u8]>,
    count: usize,
    data_start: usize,
}

impl std::fmt::Debug for EventBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBuffer")
            .field("capacity", &self.capacity())
            .field("count", &self.count)
            .field("payload_bytes", &self.payload_bytes())
            .finish()
    }
}

impl EventBuffer {
    /// Allocate a buffer of `capacity` bytes. Capacities beyond `u32::MAX`
    /// are clamped so payload offsets always fit a record field.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.min(u32::MAX as usize);
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            count: 0,
            data_start: capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Total payload bytes currently reserved.
    pub fn payload_bytes(&self) -> usize {
        self.capacity() - self.data_start
    }

    /// Largest payload the next `reserve` call could still satisfy.
    pub fn remaining(&self) -> usize {
        self.data_start
            .saturating_sub((self.count + 1) * EVENT_RECORD_SIZE)
    }

    /// Drop all events. O(1); payload bytes are left as they are.
    pub fn reset(&mut self) {
        self.count = 0;
        self.data_start = self.capacity();
    }

    /// Reserve `size` payload bytes for an event at `time`.
    ///
    /// Succeeds iff `(count + 1) * EVENT_RECORD_SIZE + payload_bytes + size`
    /// fits the capacity. On failure nothing changes.
    pub fn reserve(&mut self, time: u32, size: usize) -> Option<&mut [u8]> {
        let start = self.data_start.checked_sub(size)?;
        let record_at = self.count * EVENT_RECORD_SIZE;
        let records_end = record_at + EVENT_RECORD_SIZE;
        if records_end > start {
            return None;
        }
        let size_field = u32::try_from(size).ok()?;
        let offset_field = u32::try_from(start).ok()?;

        let record = &mut self.storage[record_at..records_end];
        record[0..4].copy_from_slice(&time.to_le_bytes());
        record[4..8].copy_from_slice(&size_field.to_le_bytes());
        record[8..12].copy_from_slice(&offset_field.to_le_bytes());

        self.count += 1;
        self.data_start = start;
        Some(&mut self.storage[start..start + size])
    }

    /// Reserve and copy `data` in one step.
    pub fn push(&mut self, time: u32, data: &[u8]) -> bool {
        match self.reserve(time, data.len()) {
            Some(slot) => {
                slot.copy_from_slice(data);
                true
            }
            None => false,
        }
    }

    /// Read event `index`, in reservation order.
    pub fn get(&self, index: usize) -> Result<Event<'_>, NoData> {
        if index >= self.count {
            return Err(NoData);
        }
        let at = index * EVENT_RECORD_SIZE;
        let field = |o: usize| {
            let mut b = [0u8; 4];
            b.copy_from_slice(&self.storage[at + o..at + o + 4]);
            u32::from_le_bytes(b)
        };
        let time = field(0);
        let size = field(4) as usize;
        let offset = field(8) as usize;
        Ok(Event {
            time,
            data: &self.storage[offset..offset + size],
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Event<'_>> {
        (0..self.count).filter_map(move |i| self.get(i).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_at_64_bytes() {
        let mut buf = EventBuffer::with_capacity(64);
        assert!(buf.reserve(0, 40).is_some());
        // 2 * 12 + 40 + 20 = 84 > 64
        assert!(buf.reserve(1, 20).is_none());
        // 2 * 12 + 40 + 0 = 64, exactly full
        assert!(buf.reserve(2, 0).is_some());
        assert_eq!(buf.count(), 2);
        assert!(buf.reserve(3, 0).is_none());
    }

    #[test]
    fn failed_reserve_changes_nothing() {
        let mut buf = EventBuffer::with_capacity(32);
        assert!(buf.push(5, &[1, 2, 3, 4]));
        let before = (buf.count(), buf.payload_bytes());
        assert!(buf.reserve(6, 100).is_none());
        assert_eq!((buf.count(), buf.payload_bytes()), before);
        assert_eq!(buf.get(0).unwrap().data, &[1, 2, 3, 4]);
    }

    #[test]
    fn get_out_of_range_is_no_data() {
        let mut buf = EventBuffer::with_capacity(DEFAULT_EVENT_CAPACITY);
        assert_eq!(buf.get(0), Err(NoData));
        buf.push(7, &[0x90, 60, 100]);
        let ev = buf.get(0).unwrap();
        assert_eq!(ev.time, 7);
        assert_eq!(ev.data, &[0x90, 60, 100]);
        assert_eq!(buf.get(1), Err(NoData));
    }

    #[test]
    fn reset_restores_full_capacity() {
        let mut buf = EventBuffer::with_capacity(48);
        while buf.push(0, &[0xAA; 4]) {}
        assert!(buf.count() > 0);
        buf.reset();
        assert!(buf.is_empty());
        assert_eq!(buf.payload_bytes(), 0);
        assert_eq!(buf.remaining(), 48 - EVENT_RECORD_SIZE);
    }

    #[test]
    fn zero_capacity_rejects_everything() {
        let mut buf = EventBuffer::with_capacity(0);
        assert!(buf.reserve(0, 0).is_none());
        assert_eq!(buf.remaining(), 0);
    }
}
