//! Run-length encoding of voxel channel buffers
//!
//! Channels are compressed independently (structure-of-arrays storage exists
//! for exactly this reason). A stream is a sequence of runs; each run starts
//! with a variable-length count whose first byte also carries the run kind.
//!
//! Count encoding: `(count << 1) | kind` is emitted little-endian in up to
//! four 7-bit groups. Bit 7 of every group byte is the "more groups follow"
//! flag; bit 0 of the first group is the kind flag (heterogeneous = 1).
//! Unused trailing groups are truncated.

use crate::error::VoxelError;

const GROUP_BITS: u32 = 7;
const GROUP_MASK: u32 = 0x7F;
const FLAG_MORE: u8 = 0x80;
const FLAG_HETEROGENEOUS: u32 = 0x01;

/// Largest encodable run length: four 7-bit groups minus the kind bit.
const MAX_RUN: usize = (1 << (4 * GROUP_BITS - 1)) - 1;

/// Minimum span of equal bytes worth a homogeneous run.
const MIN_HOMOGENEOUS: usize = 3;

/// One compressed channel of bytes.
#[derive(Debug, Clone, Default)]
pub struct RleChannel {
    buffer: Vec<u8>,
}

impl RleChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopts an already-compressed stream (deserialization path).
    pub fn from_compressed(buffer: Vec<u8>) -> Self {
        Self { buffer }
    }

    /// Byte size of the compressed representation.
    #[inline]
    pub fn compressed_size(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn compressed_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Replaces the stored stream with a compressed image of `src`.
    pub fn compress(&mut self, src: &[u8]) {
        self.buffer.clear();
        self.buffer.reserve(src.len() / 10);

        let mut pos = 0;
        while pos < src.len() {
            let run = equal_run_length(&src[pos..]);
            if run >= MIN_HOMOGENEOUS {
                let run = run.min(MAX_RUN);
                self.push_count(run, false);
                self.buffer.push(src[pos]);
                pos += run;
            } else {
                // Literal segment: extends until the next span of at least
                // three equal bytes or the end of input
                let mut end = pos + run;
                while end < src.len() {
                    let next = equal_run_length(&src[end..]);
                    if next >= MIN_HOMOGENEOUS {
                        break;
                    }
                    end += next;
                }
                let count = (end - pos).min(MAX_RUN);
                self.push_count(count, true);
                self.buffer.extend_from_slice(&src[pos..pos + count]);
                pos += count;
            }
        }
    }

    /// Fills `dst` from the stored stream.
    ///
    /// The destination must be exactly the decompressed size; a run that
    /// would overrun it reports [`VoxelError::BufferOverflow`] (corrupt
    /// stream), and a stream that ends mid-run reports a format error.
    pub fn decompress(&self, dst: &mut [u8]) -> Result<(), VoxelError> {
        let mut p = 0;
        let mut d = 0;

        while d < dst.len() {
            let (count, heterogeneous) = self.read_count(&mut p)?;
            if d + count > dst.len() {
                return Err(VoxelError::BufferOverflow { offset: d });
            }
            if heterogeneous {
                let payload = self
                    .buffer
                    .get(p..p + count)
                    .ok_or(VoxelError::Format("literal run past end of stream"))?;
                dst[d..d + count].copy_from_slice(payload);
                p += count;
            } else {
                let value = *self
                    .buffer
                    .get(p)
                    .ok_or(VoxelError::Format("repeat run past end of stream"))?;
                dst[d..d + count].fill(value);
                p += 1;
            }
            d += count;
        }
        Ok(())
    }

    fn push_count(&mut self, count: usize, heterogeneous: bool) {
        debug_assert!(count <= MAX_RUN);
        let mut v = ((count as u32) << 1) | if heterogeneous { FLAG_HETEROGENEOUS } else { 0 };
        loop {
            let group = (v & GROUP_MASK) as u8;
            v >>= GROUP_BITS;
            if v != 0 {
                self.buffer.push(group | FLAG_MORE);
            } else {
                self.buffer.push(group);
                break;
            }
        }
    }

    fn read_count(&self, p: &mut usize) -> Result<(usize, bool), VoxelError> {
        let mut v: u32 = 0;
        for group in 0..4 {
            let byte = *self
                .buffer
                .get(*p)
                .ok_or(VoxelError::Format("run count past end of stream"))?;
            *p += 1;
            v |= ((byte & !FLAG_MORE) as u32) << (GROUP_BITS * group);
            if byte & FLAG_MORE == 0 {
                break;
            }
        }
        let heterogeneous = v & FLAG_HETEROGENEOUS != 0;
        Ok(((v >> 1) as usize, heterogeneous))
    }
}

#[inline]
fn equal_run_length(src: &[u8]) -> usize {
    let first = src[0];
    src.iter().take_while(|&&b| b == first).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn roundtrip(src: &[u8]) -> Vec<u8> {
        let mut channel = RleChannel::new();
        channel.compress(src);
        let mut dst = vec![0u8; src.len()];
        channel.decompress(&mut dst).unwrap();
        dst
    }

    #[test]
    fn test_empty() {
        assert_eq!(roundtrip(&[]), Vec::<u8>::new());
    }

    #[test]
    fn test_all_same() {
        let src = vec![0x42u8; 4096];
        let mut channel = RleChannel::new();
        channel.compress(&src);
        // One count (2 groups) plus one payload byte
        assert_eq!(channel.compressed_size(), 3);
        let mut dst = vec![0u8; src.len()];
        channel.decompress(&mut dst).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn test_short_runs_stay_literal() {
        // Pairs never reach the homogeneous threshold of three
        let src = [1u8, 1, 2, 2, 3, 3, 4, 4];
        let mut channel = RleChannel::new();
        channel.compress(&src);
        assert_eq!(channel.compressed_size(), 1 + src.len());
        assert_eq!(roundtrip(&src), src);
    }

    #[test]
    fn test_structured_stream_layout() {
        // 500 equal bytes then 524 alternating: exactly one homogeneous run
        // followed by one heterogeneous run
        let mut src = vec![0x7Au8; 500];
        for n in 0..524 {
            src.push(if n % 2 == 0 { 0x01 } else { 0x02 });
        }
        let mut channel = RleChannel::new();
        channel.compress(&src);

        let bytes = channel.compressed_bytes();
        // Homogeneous count 500 -> (500 << 1) = 1000 -> two groups
        assert_eq!(bytes[0] & 0x80, 0x80);
        assert_eq!(bytes[0] & 0x01, 0); // homogeneous
        assert_eq!(bytes[1] & 0x80, 0);
        assert_eq!(bytes[2], 0x7A);
        // Heterogeneous count 524 -> two groups, kind bit set
        assert_eq!(bytes[3] & 0x01, 0x01);
        assert_eq!(bytes[3] & 0x80, 0x80);
        assert_eq!(bytes.len(), 3 + 2 + 524);

        assert_eq!(roundtrip(&src), src);
    }

    #[test]
    fn test_randomized_roundtrip() {
        let mut rng = StdRng::seed_from_u64(0x0715);
        for _ in 0..32 {
            let len = rng.random_range(0..8192);
            // Low-cardinality bytes so both run kinds appear
            let src: Vec<u8> = (0..len).map(|_| rng.random_range(0..4) as u8).collect();
            assert_eq!(roundtrip(&src), src);
        }
    }

    #[test]
    fn test_large_buffer_roundtrip() {
        let mut rng = StdRng::seed_from_u64(0x0716);
        let mut src = Vec::with_capacity(2 << 20);
        while src.len() < 2 << 20 {
            let value: u8 = rng.random();
            let run = rng.random_range(1..512usize);
            src.extend(std::iter::repeat_n(value, run));
        }
        src.truncate(2 << 20);
        assert_eq!(roundtrip(&src), src);
    }

    #[test]
    fn test_overflow_detected() {
        let src = vec![9u8; 64];
        let mut channel = RleChannel::new();
        channel.compress(&src);
        let mut small = vec![0u8; 32];
        match channel.decompress(&mut small) {
            Err(VoxelError::BufferOverflow { offset }) => assert_eq!(offset, 0),
            other => panic!("expected overflow, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_truncated_stream_detected() {
        let channel = RleChannel::from_compressed(vec![0x80]);
        let mut dst = vec![0u8; 16];
        assert!(matches!(
            channel.decompress(&mut dst),
            Err(VoxelError::Format(_))
        ));
    }
}
