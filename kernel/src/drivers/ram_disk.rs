use crate::block::{BlockError, BlockOp, BlockSector, BLOCK_SECTOR_SIZE};
use alloc::{sync::Arc, vec, vec::Vec};
use core::sync::atomic::{AtomicBool, Ordering};

/// A block device backed by kernel memory.
///
/// Used as the swap device when no disk is attached, and by the tests. Reads and writes can be
/// made to fail on demand to exercise the fatal I/O paths.
pub struct RamDisk {
    data: Vec<u8>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl RamDisk {
    pub fn new(sectors: BlockSector) -> Self {
        Self {
            data: vec![0; sectors as usize * BLOCK_SECTOR_SIZE],
            fail_reads: Arc::default(),
            fail_writes: Arc::default(),
        }
    }

    /// Switch that makes every subsequent read fail while set.
    pub fn read_fault_switch(&self) -> Arc<AtomicBool> {
        self.fail_reads.clone()
    }

    /// Switch that makes every subsequent write fail while set.
    pub fn write_fault_switch(&self) -> Arc<AtomicBool> {
        self.fail_writes.clone()
    }

    fn span(&self, sector: BlockSector) -> Result<core::ops::Range<usize>, BlockError> {
        let start = sector as usize * BLOCK_SECTOR_SIZE;
        let end = start + BLOCK_SECTOR_SIZE;
        if end > self.data.len() {
            return Err(BlockError::SectorOutOfBounds);
        }
        Ok(start..end)
    }
}

impl BlockOp for RamDisk {
    fn read(&mut self, sector: BlockSector, buf: &mut [u8]) -> Result<(), BlockError> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(BlockError::ReadError);
        }
        let span = self.span(sector)?;
        buf.copy_from_slice(&self.data[span]);
        Ok(())
    }

    fn write(&mut self, sector: BlockSector, buf: &[u8]) -> Result<(), BlockError> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(BlockError::WriteError);
        }
        let span = self.span(sector)?;
        self.data[span].copy_from_slice(buf);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_switches() {
        let mut disk = RamDisk::new(2);
        let writes = disk.write_fault_switch();
        let reads = disk.read_fault_switch();
        let mut buf = [1u8; BLOCK_SECTOR_SIZE];

        writes.store(true, Ordering::Relaxed);
        assert_eq!(disk.write(0, &buf), Err(BlockError::WriteError));
        writes.store(false, Ordering::Relaxed);
        assert_eq!(disk.write(1, &buf), Ok(()));

        reads.store(true, Ordering::Relaxed);
        assert_eq!(disk.read(1, &mut buf), Err(BlockError::ReadError));
        reads.store(false, Ordering::Relaxed);
        buf.fill(0);
        assert_eq!(disk.read(1, &mut buf), Ok(()));
        assert!(buf.iter().all(|&b| b == 1));
    }
}
