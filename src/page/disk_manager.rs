//! Disk manager interface and the default file-backed implementation.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{QuarryError, Result};
use crate::page::{PageData, PageId, PAGE_SIZE};

/// Page-level I/O consumed by the buffer pool.
///
/// All operations are synchronous and may fail; failures propagate to the
/// pool's caller unchanged. Implementations are driven exclusively from
/// within the pool's critical section, so they need no internal locking.
pub trait DiskManager: Send {
    /// Reads the page's bytes into `buf`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn read_page(&mut self, page_id: PageId, buf: &mut PageData) -> Result<()>;

    /// Writes the page's bytes to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write_page(&mut self, page_id: PageId, data: &PageData) -> Result<()>;

    /// Releases the page's storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the deallocation fails.
    fn deallocate_page(&mut self, page_id: PageId) -> Result<()>;
}

/// File-backed disk manager storing pages at `page_id * PAGE_SIZE` offsets.
pub struct FileDiskManager {
    /// Path to the database file.
    path: PathBuf,
    /// File handle for the database file.
    file: File,
}

impl FileDiskManager {
    /// Opens or creates a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| QuarryError::StorageError(format!("Failed to open database file: {e}")))?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Returns the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes all buffered writes to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&mut self) -> Result<()> {
        self.file
            .sync_all()
            .map_err(|e| QuarryError::StorageError(format!("Failed to sync file: {e}")))
    }

    /// Returns the size of the database file in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata cannot be read.
    pub fn file_size(&self) -> Result<u64> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| QuarryError::StorageError(format!("Failed to get file size: {e}")))
    }
}

impl DiskManager for FileDiskManager {
    /// Reads a page from disk.
    ///
    /// A read past the current end of file yields a zeroed page: pages are
    /// materialized lazily, so an id the pool allocated but never flushed has
    /// no bytes yet.
    fn read_page(&mut self, page_id: PageId, buf: &mut PageData) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(page_id.offset()))
            .map_err(|e| QuarryError::StorageError(format!("Failed to seek to page: {e}")))?;

        match self.file.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                buf.fill(0);
                Ok(())
            }
            Err(e) => Err(QuarryError::StorageError(format!(
                "Failed to read page {page_id}: {e}"
            ))),
        }
    }

    fn write_page(&mut self, page_id: PageId, data: &PageData) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(page_id.offset()))
            .map_err(|e| QuarryError::StorageError(format!("Failed to seek to page: {e}")))?;

        self.file
            .write_all(data)
            .map_err(|e| QuarryError::StorageError(format!("Failed to write page {page_id}: {e}")))
    }

    /// Zeroes the page's region if it lies within the file.
    ///
    /// The file manager keeps no allocation bitmap; reuse of deallocated ids
    /// is the embedding engine's concern.
    fn deallocate_page(&mut self, page_id: PageId) -> Result<()> {
        let file_len = self.file_size()?;
        if page_id.offset() >= file_len {
            return Ok(());
        }
        self.write_page(page_id, &[0u8; PAGE_SIZE])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_dm() -> (FileDiskManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let dm = FileDiskManager::new(&db_path).unwrap();
        (dm, temp_dir)
    }

    #[test]
    fn test_create_disk_manager() {
        let (dm, _temp) = create_test_dm();
        assert_eq!(dm.file_size().unwrap(), 0);
    }

    #[test]
    fn test_read_write_page() {
        let (mut dm, _temp) = create_test_dm();

        let page_id = PageId::new(0);
        let mut data = [0u8; PAGE_SIZE];
        data[0] = 42;
        data[100] = 0xFF;
        dm.write_page(page_id, &data).unwrap();

        let mut read_back = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut read_back).unwrap();
        assert_eq!(read_back[0], 42);
        assert_eq!(read_back[100], 0xFF);
    }

    #[test]
    fn test_read_nonexistent_page_is_zeroed() {
        let (mut dm, _temp) = create_test_dm();

        let mut buf = [0xABu8; PAGE_SIZE];
        dm.read_page(PageId::new(100), &mut buf).unwrap();

        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_at_offset() {
        let (mut dm, _temp) = create_test_dm();

        let mut data = [0u8; PAGE_SIZE];
        data[0..4].copy_from_slice(&[1, 2, 3, 4]);
        dm.write_page(PageId::new(3), &data).unwrap();

        assert_eq!(dm.file_size().unwrap(), 4 * PAGE_SIZE as u64);

        // Pages before the written one read back as zeroes.
        let mut buf = [0xEEu8; PAGE_SIZE];
        dm.read_page(PageId::new(1), &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_deallocate_zeroes_region() {
        let (mut dm, _temp) = create_test_dm();

        let page_id = PageId::new(0);
        dm.write_page(page_id, &[0x7Fu8; PAGE_SIZE]).unwrap();
        dm.deallocate_page(page_id).unwrap();

        let mut buf = [0xABu8; PAGE_SIZE];
        dm.read_page(page_id, &mut buf).unwrap();
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_deallocate_beyond_eof_is_noop() {
        let (mut dm, _temp) = create_test_dm();

        dm.deallocate_page(PageId::new(50)).unwrap();
        assert_eq!(dm.file_size().unwrap(), 0);
    }

    #[test]
    fn test_persistence() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        {
            let mut dm = FileDiskManager::new(&db_path).unwrap();
            let mut data = [0u8; PAGE_SIZE];
            data[0..4].copy_from_slice(&[1, 2, 3, 4]);
            dm.write_page(PageId::new(0), &data).unwrap();
            dm.sync().unwrap();
        }

        {
            let mut dm = FileDiskManager::new(&db_path).unwrap();
            let mut buf = [0u8; PAGE_SIZE];
            dm.read_page(PageId::new(0), &mut buf).unwrap();
            assert_eq!(&buf[0..4], &[1, 2, 3, 4]);
        }
    }
}
