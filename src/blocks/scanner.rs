//! Block-boundary scanner
//!
//! A container file is a sequence of records, each introduced by the
//! network's 4-byte magic and a little-endian `u32` payload length. Nodes
//! pre-allocate these files, so zero padding (and occasionally garbage) sits
//! between and after records. The scanner walks the bytes looking for the
//! magic and hands out each payload untouched.

use crate::{Error, Result};
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Record delimiter of Bitcoin mainnet
pub const MAINNET_MAGIC: [u8; 4] = [0xf9, 0xbe, 0xb4, 0xd9];

const HEADER_LEN: usize = 8;

/// A memory-mapped container file
pub struct BlockFile {
    path: PathBuf,
    mmap: Option<Mmap>,
}

impl BlockFile {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        let mmap = if file.metadata()?.len() == 0 {
            None
        } else {
            // The node only appends to block files; mapped bytes are never rewritten.
            Some(unsafe { MmapOptions::new().map(&file)? })
        };
        Ok(Self { path, mmap })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }

    fn bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    /// Iterate the raw block records of this file
    pub fn blocks(&self, magic: [u8; 4]) -> BlockScanner<'_> {
        BlockScanner::new(&self.path, self.bytes(), magic)
    }
}

/// Lazy iterator over the record payloads of one container file
///
/// Yields at most one error (an overrunning length field) and then stops.
pub struct BlockScanner<'a> {
    file: &'a Path,
    data: &'a [u8],
    offset: usize,
    magic: [u8; 4],
    done: bool,
}

impl<'a> BlockScanner<'a> {
    pub fn new(file: &'a Path, data: &'a [u8], magic: [u8; 4]) -> Self {
        Self {
            file,
            data,
            offset: 0,
            magic,
            done: false,
        }
    }

    /// Current cursor position
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Position of the next magic whose header fits in the remaining bytes
    fn find_marker(&self) -> Option<usize> {
        let window = self.data.get(self.offset..)?;
        if window.len() < HEADER_LEN {
            return None;
        }
        // A marker is only usable if its length field is present too.
        let searchable = &window[..window.len() - HEADER_LEN + 4];
        searchable
            .windows(4)
            .position(|w| w == self.magic)
            .map(|p| self.offset + p)
    }
}

impl<'a> Iterator for BlockScanner<'a> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let Some(marker) = self.find_marker() else {
            self.done = true;
            self.offset = self.data.len();
            return None;
        };

        let h = &self.data[marker + 4..marker + HEADER_LEN];
        let declared = u32::from_le_bytes([h[0], h[1], h[2], h[3]]);
        let start = marker + HEADER_LEN;
        let remaining = self.data.len() - start;

        if declared as usize > remaining {
            self.done = true;
            return Some(Err(Error::MalformedFile {
                file: self.file.to_path_buf(),
                offset: marker,
                declared,
                remaining,
            }));
        }

        let end = start + declared as usize;
        self.offset = end;
        Some(Ok(&self.data[start..end]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(payload: &[u8]) -> Vec<u8> {
        let mut out = MAINNET_MAGIC.to_vec();
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn scan(data: &[u8]) -> Vec<Result<&[u8]>> {
        BlockScanner::new(Path::new("test.dat"), data, MAINNET_MAGIC).collect()
    }

    #[test]
    fn test_consecutive_records() {
        let mut data = record(b"first");
        data.extend(record(b"second block"));

        let blocks: Vec<&[u8]> = scan(&data).into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(blocks, vec![&b"first"[..], &b"second block"[..]]);
    }

    #[test]
    fn test_skips_padding_and_garbage() {
        let mut data = vec![0u8; 13];
        data.extend(record(b"one"));
        data.extend([0xf9, 0xbe, 0x00, 0x17, 0x42]);
        data.extend(record(b"two"));
        data.extend(vec![0u8; 64]);

        let blocks: Vec<&[u8]> = scan(&data).into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(blocks, vec![&b"one"[..], &b"two"[..]]);
    }

    #[test]
    fn test_empty_payload() {
        let data = record(b"");
        let blocks = scan(&data);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_length_overrun_is_malformed() {
        let mut data = record(b"ok");
        data.extend(MAINNET_MAGIC);
        data.extend(100u32.to_le_bytes());
        data.extend(b"short");

        let results = scan(&data);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), &b"ok");
        match &results[1] {
            Err(Error::MalformedFile {
                offset,
                declared,
                remaining,
                ..
            }) => {
                assert_eq!(*offset, 10);
                assert_eq!(*declared, 100);
                assert_eq!(*remaining, 5);
            }
            other => panic!("expected malformed file, got {:?}", other),
        }
    }

    #[test]
    fn test_trailing_marker_without_length() {
        let mut data = record(b"ok");
        data.extend(MAINNET_MAGIC);
        data.extend([0x01, 0x00]);

        let results = scan(&data);
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }

    #[test]
    fn test_short_input() {
        assert!(scan(&[]).is_empty());
        assert!(scan(&MAINNET_MAGIC).is_empty());
    }

    #[test]
    fn test_other_network_magic() {
        let testnet = [0x0b, 0x11, 0x09, 0x07];
        let mut data = record(b"mainnet");
        data.extend(testnet);
        data.extend(4u32.to_le_bytes());
        data.extend(b"test");

        let blocks: Vec<&[u8]> = BlockScanner::new(Path::new("t"), &data, testnet)
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(blocks, vec![&b"test"[..]]);
    }

    #[test]
    fn test_block_file_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blk00000.dat");
        let mut data = record(b"abc");
        data.extend(vec![0u8; 32]);
        std::fs::write(&path, &data).unwrap();

        let file = BlockFile::open(&path).unwrap();
        assert_eq!(file.len(), data.len());
        let blocks: Vec<&[u8]> = file.blocks(MAINNET_MAGIC).map(|r| r.unwrap()).collect();
        assert_eq!(blocks, vec![&b"abc"[..]]);

        let empty = dir.path().join("blk00001.dat");
        std::fs::write(&empty, b"").unwrap();
        let file = BlockFile::open(&empty).unwrap();
        assert!(file.is_empty());
        assert_eq!(file.blocks(MAINNET_MAGIC).count(), 0);
    }
}
