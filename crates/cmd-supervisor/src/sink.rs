//! Capacity-bounded write sink.
//!
//! A [`BoundedSink`] accepts a write only if the whole payload fits in the
//! remaining capacity. Oversized writes are rejected without touching the
//! inner writer, so the captured bytes never exceed the cap and never end
//! in a partially written chunk.

use std::io::{self, Write};

/// Rejection returned (wrapped in an `io::Error`) when a write does not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("bounded sink out of capacity: {requested} bytes requested, {remaining} remaining")]
pub struct CapacityExceeded {
    pub requested: usize,
    pub remaining: usize,
}

impl CapacityExceeded {
    /// Recover the rejection from an `io::Error` produced by [`BoundedSink`].
    pub fn find(err: &io::Error) -> Option<&CapacityExceeded> {
        err.get_ref()?.downcast_ref::<CapacityExceeded>()
    }
}

#[derive(Debug)]
pub struct BoundedSink<W> {
    inner: W,
    capacity: usize,
    remaining: usize,
}

impl<W: Write> BoundedSink<W> {
    pub fn new(inner: W, capacity: usize) -> Self {
        Self {
            inner,
            capacity,
            remaining: capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes that can still be written.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for BoundedSink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.len() > self.remaining {
            return Err(io::Error::other(CapacityExceeded {
                requested: buf.len(),
                remaining: self.remaining,
            }));
        }
        let n = self.inner.write(buf)?;
        self.remaining = self.remaining.saturating_sub(n);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_within_capacity_forwards_everything() {
        let mut sink = BoundedSink::new(Vec::new(), 10);
        let n = sink.write(b"123456789").unwrap();
        assert_eq!(n, 9);
        assert_eq!(sink.remaining(), 1);
        assert_eq!(sink.get_ref().as_slice(), b"123456789");
    }

    #[test]
    fn oversized_write_is_rejected_without_partial_write() {
        let mut sink = BoundedSink::new(Vec::new(), 10);
        sink.write_all(b"123456789").unwrap();

        let err = sink.write(b"123456789").unwrap_err();
        let rejection = CapacityExceeded::find(&err).unwrap();
        assert_eq!(
            *rejection,
            CapacityExceeded {
                requested: 9,
                remaining: 1
            }
        );
        assert_eq!(sink.remaining(), 1);
        assert_eq!(sink.get_ref().len(), 9);
    }

    #[test]
    fn last_byte_still_fits_after_rejection() {
        let mut sink = BoundedSink::new(Vec::new(), 10);
        sink.write_all(b"123456789").unwrap();
        assert!(sink.write(b"123456789").is_err());

        assert_eq!(sink.write(b"a").unwrap(), 1);
        assert_eq!(sink.remaining(), 0);
        assert!(sink.write(b"123456789").is_err());
        assert_eq!(sink.into_inner(), b"123456789a".to_vec());
    }

    #[test]
    fn exactly_capacity_then_one_more_fails() {
        let mut sink = BoundedSink::new(Vec::new(), 4);
        assert_eq!(sink.write(b"abcd").unwrap(), 4);
        let err = sink.write(b"e").unwrap_err();
        assert!(CapacityExceeded::find(&err).is_some());
        assert_eq!(sink.get_ref().as_slice(), b"abcd");
    }

    #[test]
    fn empty_write_always_succeeds() {
        let mut sink = BoundedSink::new(Vec::new(), 0);
        assert_eq!(sink.write(b"").unwrap(), 0);
        assert_eq!(sink.remaining(), 0);
        assert_eq!(sink.capacity(), 0);
    }

    #[test]
    fn unrelated_io_errors_are_not_capacity_errors() {
        let err = io::Error::other("boom");
        assert!(CapacityExceeded::find(&err).is_none());
    }

    #[test]
    fn rejection_message_names_sizes() {
        let err = CapacityExceeded {
            requested: 5,
            remaining: 2,
        };
        assert_eq!(
            err.to_string(),
            "bounded sink out of capacity: 5 bytes requested, 2 remaining"
        );
    }
}
