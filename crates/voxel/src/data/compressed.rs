//! Compressed at-rest image of a cube's voxel channels

use std::io::{Read, Write};

use crate::descriptor::VoxelRegionFlags;
use crate::error::VoxelError;

use super::base::VoxelDataBase;
use super::rle::RleChannel;

/// Per-channel RLE images of a [`VoxelDataBase`], in the canonical channel
/// order {values, dx, dy, dz, r, g, b, a, u, v} with the optional groups
/// gated by the region flags.
#[derive(Debug)]
pub struct CompressedVoxelData {
    pub flags: VoxelRegionFlags,
    values: RleChannel,
    gradient: Option<[RleChannel; 3]>,
    colours: Option<[RleChannel; 4]>,
    texcoords: Option<[RleChannel; 2]>,
}

impl CompressedVoxelData {
    pub fn new(flags: VoxelRegionFlags) -> Self {
        Self {
            flags,
            values: RleChannel::new(),
            gradient: flags
                .contains(VoxelRegionFlags::GRADIENT)
                .then(Default::default),
            colours: flags
                .contains(VoxelRegionFlags::COLOURS)
                .then(Default::default),
            texcoords: flags
                .contains(VoxelRegionFlags::TEX_COORDS)
                .then(Default::default),
        }
    }

    /// Refreshes the compressed image from a decompressed data base.
    pub fn compress_from(&mut self, database: &VoxelDataBase) {
        self.values.compress(as_bytes_i8(&database.values));

        if let (Some(channels), Some(g)) = (&mut self.gradient, &database.gradient) {
            channels[0].compress(as_bytes_i8(&g.dx));
            channels[1].compress(as_bytes_i8(&g.dy));
            channels[2].compress(as_bytes_i8(&g.dz));
        }
        if let (Some(channels), Some(c)) = (&mut self.colours, &database.colours) {
            channels[0].compress(&c.r);
            channels[1].compress(&c.g);
            channels[2].compress(&c.b);
            channels[3].compress(&c.a);
        }
        if let (Some(channels), Some(t)) = (&mut self.texcoords, &database.texcoords) {
            channels[0].compress(&t.u);
            channels[1].compress(&t.v);
        }
    }

    /// Reconstitutes a data base from the compressed image.
    pub fn decompress_into(&self, database: &mut VoxelDataBase) -> Result<(), VoxelError> {
        self.values.decompress(as_bytes_i8_mut(&mut database.values))?;

        if let (Some(channels), Some(g)) = (&self.gradient, &mut database.gradient) {
            channels[0].decompress(as_bytes_i8_mut(&mut g.dx))?;
            channels[1].decompress(as_bytes_i8_mut(&mut g.dy))?;
            channels[2].decompress(as_bytes_i8_mut(&mut g.dz))?;
        }
        if let (Some(channels), Some(c)) = (&self.colours, &mut database.colours) {
            channels[0].decompress(&mut c.r)?;
            channels[1].decompress(&mut c.g)?;
            channels[2].decompress(&mut c.b)?;
            channels[3].decompress(&mut c.a)?;
        }
        if let (Some(channels), Some(t)) = (&self.texcoords, &mut database.texcoords) {
            channels[0].decompress(&mut t.u)?;
            channels[1].decompress(&mut t.v)?;
        }
        Ok(())
    }

    /// Total compressed byte size across channels.
    pub fn compressed_size(&self) -> usize {
        self.channels().map(RleChannel::compressed_size).sum()
    }

    /// Writes every present channel as a native-endian u64 length followed
    /// by the raw RLE stream, in canonical channel order.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<(), VoxelError> {
        for channel in self.channels() {
            let bytes = channel.compressed_bytes();
            out.write_all(&(bytes.len() as u64).to_ne_bytes())?;
            out.write_all(bytes)?;
        }
        Ok(())
    }

    /// Reads channels in canonical order; the channel set must be known
    /// out-of-band (scene descriptor flags).
    pub fn read_from<R: Read>(&mut self, input: &mut R) -> Result<(), VoxelError> {
        // Streams are bounded by the decompressed channel size times a small
        // factor; anything larger indicates a corrupt or foreign stream
        const SANE_CHANNEL_LIMIT: u64 = 64 << 20;

        let mut read_channel = |input: &mut R| -> Result<RleChannel, VoxelError> {
            let mut len = [0u8; 8];
            input.read_exact(&mut len)?;
            let len = u64::from_ne_bytes(len);
            if len > SANE_CHANNEL_LIMIT {
                return Err(VoxelError::Format("channel length implausibly large"));
            }
            let mut bytes = vec![0u8; len as usize];
            input.read_exact(&mut bytes)?;
            Ok(RleChannel::from_compressed(bytes))
        };

        self.values = read_channel(input)?;
        if let Some(channels) = &mut self.gradient {
            for channel in channels {
                *channel = read_channel(input)?;
            }
        }
        if let Some(channels) = &mut self.colours {
            for channel in channels {
                *channel = read_channel(input)?;
            }
        }
        if let Some(channels) = &mut self.texcoords {
            for channel in channels {
                *channel = read_channel(input)?;
            }
        }
        Ok(())
    }

    fn channels(&self) -> impl Iterator<Item = &RleChannel> {
        std::iter::once(&self.values)
            .chain(self.gradient.iter().flatten())
            .chain(self.colours.iter().flatten())
            .chain(self.texcoords.iter().flatten())
    }
}

#[inline]
fn as_bytes_i8(values: &[i8]) -> &[u8] {
    bytemuck::cast_slice(values)
}

#[inline]
fn as_bytes_i8_mut(values: &mut [i8]) -> &mut [u8] {
    bytemuck::cast_slice_mut(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_roundtrip_all_channels() {
        let flags = VoxelRegionFlags::GRADIENT
            .union(VoxelRegionFlags::COLOURS)
            .union(VoxelRegionFlags::TEX_COORDS);
        let mut db = VoxelDataBase::new(64, flags);
        for (i, v) in db.values.iter_mut().enumerate() {
            *v = if i < 32 { -4 } else { 4 };
        }
        db.gradient.as_mut().unwrap().dy.fill(-3);
        db.colours.as_mut().unwrap().g.fill(200);
        db.texcoords.as_mut().unwrap().u.fill(17);

        let mut compressed = CompressedVoxelData::new(flags);
        compressed.compress_from(&db);

        let mut restored = VoxelDataBase::new(64, flags);
        compressed.decompress_into(&mut restored).unwrap();
        assert_eq!(restored.values, db.values);
        assert_eq!(
            restored.gradient.as_ref().unwrap().dy,
            db.gradient.as_ref().unwrap().dy
        );
        assert_eq!(
            restored.colours.as_ref().unwrap().g,
            db.colours.as_ref().unwrap().g
        );
        assert_eq!(
            restored.texcoords.as_ref().unwrap().u,
            db.texcoords.as_ref().unwrap().u
        );
    }

    #[test]
    fn test_stream_roundtrip() {
        let flags = VoxelRegionFlags::GRADIENT;
        let mut db = VoxelDataBase::new(27, flags);
        db.values.fill(-8);
        db.gradient.as_mut().unwrap().dx.fill(5);

        let mut compressed = CompressedVoxelData::new(flags);
        compressed.compress_from(&db);

        let mut stream = Vec::new();
        compressed.write_to(&mut stream).unwrap();

        let mut reread = CompressedVoxelData::new(flags);
        reread.read_from(&mut stream.as_slice()).unwrap();

        let mut restored = VoxelDataBase::new(27, flags);
        reread.decompress_into(&mut restored).unwrap();
        assert_eq!(restored.values, db.values);
        assert_eq!(restored.gradient.as_ref().unwrap().dx[0], 5);
    }

    #[test]
    fn test_truncated_stream_rejected() {
        let mut compressed = CompressedVoxelData::new(VoxelRegionFlags::NONE);
        let mut short: &[u8] = &[1, 0, 0];
        assert!(compressed.read_from(&mut short).is_err());
    }
}
