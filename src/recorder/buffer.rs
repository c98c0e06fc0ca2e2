use bytes::{Bytes, BytesMut};

use crate::upload::UploadPart;

/// Accumulates media bytes and cuts them into fixed-size upload parts
///
/// After every `push` the buffered remainder is strictly smaller than the
/// part size. Part numbers start at 1 and increase by one per cut part.
#[derive(Debug)]
pub struct PartBuffer {
    part_size: usize,
    buffer: BytesMut,
    parts_cut: u32,
    total_bytes: u64,
}

impl PartBuffer {
    pub fn new(part_size: usize) -> Self {
        Self {
            part_size: part_size.max(1),
            buffer: BytesMut::new(),
            parts_cut: 0,
            total_bytes: 0,
        }
    }

    /// Append a chunk and return every full part it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<UploadPart> {
        self.total_bytes += chunk.len() as u64;
        self.buffer.extend_from_slice(chunk);

        let mut parts = Vec::new();
        while self.buffer.len() >= self.part_size {
            let data = self.buffer.split_to(self.part_size).freeze();
            parts.push(self.cut(data));
        }

        parts
    }

    /// Cut the remainder as a final, possibly undersized, part
    pub fn finish(&mut self) -> Option<UploadPart> {
        if self.buffer.is_empty() {
            return None;
        }

        let data = self.buffer.split().freeze();
        Some(self.cut(data))
    }

    /// Take the remainder without numbering it
    pub fn take_remainder(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }

    fn cut(&mut self, data: Bytes) -> UploadPart {
        self.parts_cut += 1;
        UploadPart::new(self.parts_cut, data)
    }

    pub fn part_size(&self) -> usize {
        self.part_size
    }

    /// Bytes waiting for the next cut
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn parts_cut(&self) -> u32 {
        self.parts_cut
    }

    /// Every byte ever pushed
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_chunks_stay_buffered() {
        let mut buffer = PartBuffer::new(10);

        assert!(buffer.push(&[1, 2, 3]).is_empty());
        assert!(buffer.push(&[4, 5, 6]).is_empty());

        assert_eq!(buffer.buffered(), 6);
        assert_eq!(buffer.parts_cut(), 0);
        assert_eq!(buffer.total_bytes(), 6);
    }

    #[test]
    fn test_exact_part_size_cuts_one_part() {
        let mut buffer = PartBuffer::new(4);

        let parts = buffer.push(&[1, 2, 3, 4]);

        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].number, 1);
        assert_eq!(parts[0].data.as_ref(), &[1, 2, 3, 4]);
        assert_eq!(buffer.buffered(), 0);
    }

    #[test]
    fn test_large_chunk_cuts_several_parts() {
        let mut buffer = PartBuffer::new(4);
        let chunk: Vec<u8> = (0..11).collect();

        let parts = buffer.push(&chunk);

        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].data.as_ref(), &[0, 1, 2, 3]);
        assert_eq!(parts[1].data.as_ref(), &[4, 5, 6, 7]);
        assert_eq!(parts[1].number, 2);
        assert_eq!(buffer.buffered(), 3);
    }

    #[test]
    fn test_remainder_is_below_part_size_after_every_push() {
        let mut buffer = PartBuffer::new(7);

        for len in [1usize, 6, 13, 0, 7, 20, 2, 3] {
            let chunk = vec![0xAB; len];
            for part in buffer.push(&chunk) {
                assert_eq!(part.len(), 7);
            }
            assert!(buffer.buffered() < 7);
        }
    }

    #[test]
    fn test_finish_numbers_the_undersized_tail() {
        let mut buffer = PartBuffer::new(4);
        buffer.push(&[1, 2, 3, 4, 5, 6]);

        let tail = buffer.finish().unwrap();

        assert_eq!(tail.number, 2);
        assert_eq!(tail.data.as_ref(), &[5, 6]);
        assert!(buffer.finish().is_none());
        assert_eq!(buffer.parts_cut(), 2);
    }

    #[test]
    fn test_take_remainder_leaves_counter_alone() {
        let mut buffer = PartBuffer::new(8);
        buffer.push(&[9, 9, 9]);

        let rest = buffer.take_remainder();

        assert_eq!(rest.as_ref(), &[9, 9, 9]);
        assert_eq!(buffer.parts_cut(), 0);
        assert_eq!(buffer.total_bytes(), 3);
    }

    #[test]
    fn test_four_mib_chunks_against_ten_mib_parts() {
        const MIB: usize = 1024 * 1024;
        let mut buffer = PartBuffer::new(10 * MIB);
        let chunk = vec![0u8; 4 * MIB];

        assert!(buffer.push(&chunk).is_empty());
        assert!(buffer.push(&chunk).is_empty());
        let parts = buffer.push(&chunk);

        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].len(), 10 * MIB);
        assert_eq!(buffer.buffered(), 2 * MIB);
    }
}
