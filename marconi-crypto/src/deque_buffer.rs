//! Byte buffer with cheap front-extension.
//!
//! The encrypted envelope is built body-first; the `key_id` and `msg_key`
//! header lands in front afterwards. Reserving head room up front makes that
//! prepend a plain copy instead of a shift of the whole payload.

use std::ops::{Index, IndexMut};
use std::slice::SliceIndex;

/// Growable byte buffer that supports efficient front-extension.
#[derive(Clone, Debug)]
pub struct DequeBuffer {
    buf: Vec<u8>,
    head: usize,
    default_head: usize,
}

impl DequeBuffer {
    /// Create with room for `back` bytes of payload and `front` bytes of
    /// headers to be prepended later.
    pub fn with_capacity(back: usize, front: usize) -> Self {
        let mut buf = Vec::with_capacity(front + back);
        buf.resize(front, 0);
        Self { buf, head: front, default_head: front }
    }

    /// Empty the buffer, keeping its allocation and head room.
    pub fn clear(&mut self) {
        self.buf.truncate(self.default_head);
        self.buf[..self.head].fill(0);
        self.head = self.default_head;
    }

    /// Prepend `slice`, shifting the contents only when head room runs out.
    pub fn extend_front(&mut self, slice: &[u8]) {
        if self.head >= slice.len() {
            self.head -= slice.len();
        } else {
            let shift = slice.len() - self.head;
            self.buf.extend(std::iter::repeat(0).take(shift));
            self.buf.rotate_right(shift);
            self.head = 0;
        }
        self.buf[self.head..self.head + slice.len()].copy_from_slice(slice);
    }

    /// Number of bytes currently in the buffer.
    pub fn len(&self) -> usize {
        self.buf.len() - self.head
    }

    /// True if no bytes have been written.
    pub fn is_empty(&self) -> bool {
        self.head == self.buf.len()
    }
}

impl AsRef<[u8]> for DequeBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.buf[self.head..]
    }
}

impl AsMut<[u8]> for DequeBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.head..]
    }
}

impl<I: SliceIndex<[u8]>> Index<I> for DequeBuffer {
    type Output = I::Output;
    fn index(&self, i: I) -> &Self::Output {
        self.as_ref().index(i)
    }
}

impl<I: SliceIndex<[u8]>> IndexMut<I> for DequeBuffer {
    fn index_mut(&mut self, i: I) -> &mut Self::Output {
        self.as_mut().index_mut(i)
    }
}

impl Extend<u8> for DequeBuffer {
    fn extend<T: IntoIterator<Item = u8>>(&mut self, iter: T) {
        self.buf.extend(iter);
    }
}

impl<'a> Extend<&'a u8> for DequeBuffer {
    fn extend<T: IntoIterator<Item = &'a u8>>(&mut self, iter: T) {
        self.buf.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepend_within_head_room() {
        let mut buf = DequeBuffer::with_capacity(8, 4);
        buf.extend([1u8, 2, 3]);
        buf.extend_front(&[9, 9]);
        assert_eq!(buf.as_ref(), &[9, 9, 1, 2, 3]);
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn prepend_past_head_room_shifts() {
        let mut buf = DequeBuffer::with_capacity(4, 2);
        buf.extend([1u8, 2]);
        buf.extend_front(&[7, 7, 7, 7]);
        assert_eq!(buf.as_ref(), &[7, 7, 7, 7, 1, 2]);
    }

    #[test]
    fn clear_restores_head_room() {
        let mut buf = DequeBuffer::with_capacity(4, 8);
        buf.extend([5u8; 4]);
        buf.extend_front(&[1, 2]);
        buf.clear();
        assert!(buf.is_empty());
        buf.extend_front(&[3]);
        assert_eq!(buf.as_ref(), &[3]);
    }
}
