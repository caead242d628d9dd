//! Cluster chain reader.
//!
//! Follows cluster chains through FAT #0 and copies bytes out of the data
//! region. A position in a chain is a [`ChainCursor`]: a cluster number and a
//! byte offset inside that cluster. The offset may be equal to the cluster size,
//! in which case the next read first moves to the following cluster. This keeps
//! the FAT untouched until more bytes are actually needed.

use log::{debug, trace};
use std::io;

use super::fat_error::FATError;
use super::geometry::VolumeGeometry;
use crate::utils::read_at;

/// A position inside a cluster chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainCursor {
    pub cluster: u32,
    pub offset: u32,
}

impl ChainCursor {
    /// Start of the chain beginning at `cluster`.
    pub fn start(cluster: u32) -> Self {
        ChainCursor { cluster, offset: 0 }
    }
}

/// Outcome of [`ClusterReader::read_range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRead {
    /// Number of bytes copied into the buffer
    pub read: usize,
    /// Where to continue, `None` once the chain has ended
    pub next: Option<ChainCursor>,
}

/// Reads cluster chains of a volume.
pub struct ClusterReader<'a, T: io::Read + io::Seek> {
    reader: &'a mut T,
    geometry: &'a VolumeGeometry,
}

impl<'a, T: io::Read + io::Seek> ClusterReader<'a, T> {
    pub fn new(reader: &'a mut T, geometry: &'a VolumeGeometry) -> Self {
        ClusterReader { reader, geometry }
    }

    /// Reads the masked FAT #0 entry of `cluster`.
    ///
    /// # Errors
    /// - `FATError::IOError` if the entry cannot be read
    pub fn fat_entry(&mut self, cluster: u32) -> Result<u32, FATError> {
        let fat_type = self.geometry.fat_type();
        let offset = self.geometry.fat_start_byte() + fat_type.entry_offset(cluster);
        let mut raw = [0u8; 4];
        let raw = &mut raw[..fat_type.entry_read_sz()];
        read_at(self.reader, offset, raw)?;

        Ok(fat_type.decode_entry(cluster, raw))
    }

    /// Returns the cluster following `cluster` in its chain, `None` at the end.
    ///
    /// End-of-chain markers end the chain. So do free, reserved and
    /// out-of-range values, which cannot be followed.
    ///
    /// # Errors
    /// - `FATError::IOError` if the FAT cannot be read
    pub fn next_cluster(&mut self, cluster: u32) -> Result<Option<u32>, FATError> {
        let value = self.fat_entry(cluster)?;

        if value >= self.geometry.eoc() {
            return Ok(None);
        }
        if !self.geometry.is_data_cluster(value) {
            debug!("Cluster {cluster} links to {value:#X}, ending its chain there");
            return Ok(None);
        }

        trace!("Cluster {cluster} -> {value}");
        Ok(Some(value))
    }

    /// Copies bytes from the chain position `cursor` into `buffer`.
    ///
    /// Reading stops when the buffer is full or when the chain ends. The
    /// returned cursor points right after the last byte copied.
    ///
    /// # Errors
    /// - `FATError::IOError` if the FAT or a cluster cannot be read
    pub fn read_range(
        &mut self,
        cursor: ChainCursor,
        buffer: &mut [u8],
    ) -> Result<RangeRead, FATError> {
        let cluster_size = self.geometry.bytes_per_clus();
        let mut cursor = cursor;
        let mut read = 0;

        loop {
            if !self.geometry.is_data_cluster(cursor.cluster) {
                debug!("Cluster {} is not a data cluster", cursor.cluster);
                return Ok(RangeRead { read, next: None });
            }

            if read == buffer.len() {
                return Ok(RangeRead {
                    read,
                    next: Some(cursor),
                });
            }

            while cursor.offset >= cluster_size {
                match self.next_cluster(cursor.cluster)? {
                    Some(next) => {
                        cursor = ChainCursor {
                            cluster: next,
                            offset: cursor.offset - cluster_size,
                        }
                    }
                    None => return Ok(RangeRead { read, next: None }),
                }
            }

            let len = ((cluster_size - cursor.offset) as usize).min(buffer.len() - read);
            let offset = self.geometry.cluster_start_byte(cursor.cluster) + cursor.offset as u64;
            read_at(self.reader, offset, &mut buffer[read..read + len])?;

            read += len;
            cursor.offset += len as u32;
        }
    }

    /// Copies bytes at an absolute offset of the volume into `buffer`.
    ///
    /// # Errors
    /// - `FATError::IOError` if the bytes cannot be read
    pub fn read_at(&mut self, offset: u64, buffer: &mut [u8]) -> Result<(), FATError> {
        read_at(self.reader, offset, buffer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::fat_type::FATType;
    use crate::filesystem::test_image::TestImage;

    fn geometry_of(image: &TestImage) -> VolumeGeometry {
        VolumeGeometry::from_reader(&mut io::Cursor::new(image.bytes.clone()), true).unwrap()
    }

    #[test]
    fn fat12_next_cluster_of_packed_entries() {
        let mut image = TestImage::new(FATType::FAT12, 100);
        image.set_fat(2, 9);
        image.set_fat(3, 5);
        let geometry = geometry_of(&image);
        let mut cursor = image.cursor();
        let mut reader = ClusterReader::new(&mut cursor, &geometry);

        assert_eq!(reader.fat_entry(2).unwrap(), 9);
        assert_eq!(reader.fat_entry(3).unwrap(), 5);
        assert_eq!(reader.next_cluster(3).unwrap(), Some(5));
        assert_eq!(reader.next_cluster(2).unwrap(), Some(9));
    }

    #[test]
    fn end_of_chain_markers() {
        for fat_type in [FATType::FAT12, FATType::FAT16] {
            let cluster_count = if fat_type == FATType::FAT12 { 100 } else { 5000 };
            let mut image = TestImage::new(fat_type, cluster_count);
            image.set_fat(2, fat_type.eoc());
            image.set_fat(3, image.eoc_value());
            image.set_fat(4, fat_type.eoc() - 1);
            let geometry = geometry_of(&image);
            let mut cursor = image.cursor();
            let mut reader = ClusterReader::new(&mut cursor, &geometry);

            assert_eq!(reader.next_cluster(2).unwrap(), None);
            assert_eq!(reader.next_cluster(3).unwrap(), None);
            // Bad-cluster marker, beyond the data region.
            assert_eq!(reader.next_cluster(4).unwrap(), None);
        }
    }

    #[test]
    fn free_and_reserved_links_end_the_chain() {
        let mut image = TestImage::new(FATType::FAT16, 5000);
        image.set_fat(5, 1);
        let geometry = geometry_of(&image);
        let mut cursor = image.cursor();
        let mut reader = ClusterReader::new(&mut cursor, &geometry);

        assert_eq!(reader.next_cluster(4).unwrap(), None);
        assert_eq!(reader.next_cluster(5).unwrap(), None);
    }

    #[test]
    fn fat32_ignores_the_high_nibble() {
        let mut image = TestImage::new(FATType::FAT32, 65525);
        image.set_fat(7, 0xA000_0008);
        let geometry = geometry_of(&image);
        let mut cursor = image.cursor();
        let mut reader = ClusterReader::new(&mut cursor, &geometry);

        assert_eq!(reader.next_cluster(7).unwrap(), Some(8));
    }

    #[test]
    fn read_range_crosses_clusters() {
        let mut image = TestImage::new(FATType::FAT16, 5000);
        let data: Vec<u8> = (0..1200u32).map(|i| (i % 251) as u8).collect();
        image.write_chain(&[10, 4, 7], &data);
        let geometry = geometry_of(&image);
        let mut cursor = image.cursor();
        let mut reader = ClusterReader::new(&mut cursor, &geometry);

        let mut buf = vec![0; 1000];
        let result = reader.read_range(ChainCursor::start(10), &mut buf).unwrap();
        assert_eq!(result.read, 1000);
        assert_eq!(buf[..], data[..1000]);
        assert_eq!(
            result.next,
            Some(ChainCursor {
                cluster: 4,
                offset: 488
            })
        );

        let mut rest = vec![0; 1000];
        let result = reader.read_range(result.next.unwrap(), &mut rest).unwrap();
        // The chain is 3 clusters long: 1536 bytes.
        assert_eq!(result.read, 536);
        assert_eq!(rest[..200], data[1000..]);
        assert_eq!(result.next, None);
    }

    #[test]
    fn cursor_at_cluster_end_advances_lazily() {
        let mut image = TestImage::new(FATType::FAT12, 100);
        image.write_chain(&[2, 3], &[0xAB; 1024]);
        let geometry = geometry_of(&image);
        let mut cursor = image.cursor();
        let mut reader = ClusterReader::new(&mut cursor, &geometry);

        let mut buf = vec![0; 512];
        let first = reader.read_range(ChainCursor::start(2), &mut buf).unwrap();
        assert_eq!(
            first.next,
            Some(ChainCursor {
                cluster: 2,
                offset: 512
            })
        );

        let second = reader.read_range(first.next.unwrap(), &mut buf).unwrap();
        assert_eq!(second.read, 512);
        assert_eq!(
            second.next,
            Some(ChainCursor {
                cluster: 3,
                offset: 512
            })
        );

        let third = reader.read_range(second.next.unwrap(), &mut buf).unwrap();
        assert_eq!(third, RangeRead { read: 0, next: None });
    }

    #[test]
    fn multi_sector_clusters() {
        let mut image = TestImage::with_sec_per_clus(FATType::FAT16, 5000, 4);
        let data: Vec<u8> = (0..3000u32).map(|i| (i % 199) as u8).collect();
        image.write_chain(&[2, 3], &data);
        let geometry = geometry_of(&image);
        assert_eq!(geometry.bytes_per_clus(), 2048);
        let mut cursor = image.cursor();
        let mut reader = ClusterReader::new(&mut cursor, &geometry);

        let mut buf = vec![0; 4096];
        let result = reader.read_range(ChainCursor::start(2), &mut buf).unwrap();
        assert_eq!(result.read, 4096);
        assert_eq!(buf[..3000], data[..]);
        assert_eq!(
            result.next,
            Some(ChainCursor {
                cluster: 3,
                offset: 2048
            })
        );
    }

    #[test]
    fn reserved_start_cluster_reads_nothing() {
        let image = TestImage::new(FATType::FAT12, 100);
        let geometry = geometry_of(&image);
        let mut cursor = image.cursor();
        let mut reader = ClusterReader::new(&mut cursor, &geometry);

        let mut buf = vec![0; 16];
        for cluster in [0, 1, 500] {
            let result = reader.read_range(ChainCursor::start(cluster), &mut buf).unwrap();
            assert_eq!(result, RangeRead { read: 0, next: None });
        }
    }
}
