use super::{Error, File, Result};
use crate::sync::Mutex;
use alloc::vec::Vec;
use core::cmp::min;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// An in-memory regular file.
///
/// Backs lazily loaded segments and memory mappings when there is no disk
/// filesystem, and in tests.
#[derive(Default)]
pub struct TempFile {
    data: Mutex<Vec<u8>>,
    deny_write: AtomicBool,
    fail_io: AtomicBool,
    /// Most bytes a single write stores; zero for no limit.
    write_cap: AtomicUsize,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl TempFile {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data: Mutex::new(data),
            ..Default::default()
        }
    }

    /// Refuse writes, as done for the executable of a running process.
    pub fn deny_write(&self) {
        self.deny_write.store(true, Ordering::Relaxed);
    }

    pub fn allow_write(&self) {
        self.deny_write.store(false, Ordering::Relaxed);
    }

    /// Make every read and write fail while set.
    pub fn set_failing(&self, failing: bool) {
        self.fail_io.store(failing, Ordering::Relaxed);
    }

    /// Store at most `max` bytes per `write_at`, reporting the short count like a device that
    /// accepts partial writes.
    pub fn cap_writes(&self, max: usize) {
        self.write_cap.store(max, Ordering::Relaxed);
    }

    /// Number of `read_at` calls served.
    pub fn read_calls(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of `write_at` calls served.
    pub fn write_calls(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Copy of the current contents.
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().clone()
    }
}

impl File for TempFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if self.fail_io.load(Ordering::Relaxed) {
            return Err(Error::Io);
        }
        self.reads.fetch_add(1, Ordering::Relaxed);
        let data = self.data.lock();
        if offset >= data.len() as u64 {
            // can't read any data
            return Ok(0);
        }
        let offset = offset as usize; // fits into usize by check above
        let read_len = min(buf.len(), data.len() - offset);
        buf[..read_len].copy_from_slice(&data[offset..offset + read_len]);
        Ok(read_len)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<usize> {
        if self.fail_io.load(Ordering::Relaxed) {
            return Err(Error::Io);
        }
        if self.deny_write.load(Ordering::Relaxed) {
            return Err(Error::ReadOnly);
        }
        if offset > (isize::MAX as u64).saturating_sub(buf.len() as u64) {
            // file data would exceed isize::MAX bytes
            return Err(Error::NoSpace);
        }
        self.writes.fetch_add(1, Ordering::Relaxed);
        let buf = match self.write_cap.load(Ordering::Relaxed) {
            0 => buf,
            cap => &buf[..min(cap, buf.len())],
        };
        let offset = offset as usize;
        let mut data = self.data.lock();
        let end = offset + buf.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn length(&self) -> u64 {
        self.data.lock().len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn read_past_end_is_short() {
        let file = TempFile::new(vec![1, 2, 3, 4]);
        let mut buf = [0u8; 8];
        assert_eq!(file.read_at(2, &mut buf), Ok(2));
        assert_eq!(&buf[..2], &[3, 4]);
        assert_eq!(file.read_at(9, &mut buf), Ok(0));
    }

    #[test]
    fn write_grows_and_respects_deny() {
        let file = TempFile::new(vec![0; 2]);
        assert_eq!(file.write_at(1, &[9, 9, 9]), Ok(3));
        assert_eq!(file.contents(), vec![0, 9, 9, 9]);
        file.deny_write();
        assert_eq!(file.write_at(0, &[1]), Err(Error::ReadOnly));
        file.allow_write();
        assert_eq!(file.write_at(0, &[1]), Ok(1));
        assert_eq!(file.write_calls(), 2);
    }

    #[test]
    fn capped_writes_are_short() {
        let file = TempFile::new(vec![0; 8]);
        file.cap_writes(3);
        assert_eq!(file.write_at(0, &[5; 6]), Ok(3));
        assert_eq!(file.contents(), vec![5, 5, 5, 0, 0, 0, 0, 0]);
        file.cap_writes(0);
        assert_eq!(file.write_at(0, &[6; 6]), Ok(6));
    }

    #[test]
    fn failing_io() {
        let file = TempFile::new(vec![0; 16]);
        file.set_failing(true);
        assert_eq!(file.read_at(0, &mut [0u8; 4]), Err(Error::Io));
        assert_eq!(file.write_at(0, &[0u8; 4]), Err(Error::Io));
    }
}
