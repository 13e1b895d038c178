use crate::storage::error::{StorageError, StorageResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Default number of bytes per page.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Page-granular I/O over a single extent: a flat file of fixed-size pages
/// with no header. Page `n` lives at byte offset `n * page_size`.
#[derive(Debug)]
pub struct PageManager {
    file: File,
    page_size: usize,
}

impl PageManager {
    /// Creates an empty extent, truncating any existing file.
    pub fn create(path: &Path, page_size: usize) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self { file, page_size })
    }

    /// Opens an existing extent. Fails if its length is not a whole number
    /// of pages.
    pub fn open(path: &Path, page_size: usize) -> StorageResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::aligned(file, page_size)
    }

    /// Opens the extent at `path`, creating it empty if it does not exist.
    /// An existing extent must hold a whole number of pages.
    pub fn open_or_create(path: &Path, page_size: usize) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Self::aligned(file, page_size)
    }

    // A torn last page could never be read back.
    fn aligned(file: File, page_size: usize) -> StorageResult<Self> {
        let pm = Self { file, page_size };
        let len = pm.len()?;
        if len % page_size as u64 != 0 {
            return Err(StorageError::invalid(format!(
                "extent length {} is not a multiple of the page size {}",
                len, page_size
            )));
        }
        Ok(pm)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Reads exactly one page into `buf`.
    pub fn read_page(&mut self, page_number: u32, buf: &mut [u8]) -> StorageResult<()> {
        self.check_len(buf.len())?;

        let offset = self.page_offset(page_number);
        if offset >= self.len()? {
            return Err(StorageError::invalid(format!(
                "page {} is beyond the end of the extent",
                page_number
            )));
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Writes exactly one page, extending the extent when `page_number` is
    /// the first page past its end.
    pub fn write_page(&mut self, page_number: u32, data: &[u8]) -> StorageResult<()> {
        self.check_len(data.len())?;

        let offset = self.page_offset(page_number);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)?;
        self.file.sync_data()?;
        Ok(())
    }

    /// `ceil(extent length / page size)`.
    pub fn num_pages(&self) -> StorageResult<u32> {
        Ok(self.len()?.div_ceil(self.page_size as u64) as u32)
    }

    /// Appends one zero-filled page and returns its number.
    pub fn allocate_page(&mut self) -> StorageResult<u32> {
        let page_number = self.num_pages()?;
        let zeros = vec![0u8; self.page_size];
        self.write_page(page_number, &zeros)?;
        Ok(page_number)
    }

    pub fn len(&self) -> StorageResult<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn check_len(&self, len: usize) -> StorageResult<()> {
        if len != self.page_size {
            return Err(StorageError::invalid(format!(
                "buffer size must be the page size ({}), got {}",
                self.page_size, len
            )));
        }
        Ok(())
    }

    fn page_offset(&self, page_number: u32) -> u64 {
        page_number as u64 * self.page_size as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    const PAGE: usize = 256;

    #[test]
    fn test_create_and_open() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.dat");

        {
            let pm = PageManager::create(&file_path, PAGE)?;
            assert_eq!(pm.num_pages()?, 0);
        }
        {
            let pm = PageManager::open(&file_path, PAGE)?;
            assert_eq!(pm.num_pages()?, 0);
        }
        Ok(())
    }

    #[test]
    fn test_open_nonexistent_file() -> Result<()> {
        let dir = tempdir()?;
        let result = PageManager::open(&dir.path().join("missing.dat"), PAGE);
        assert!(matches!(result, Err(StorageError::Io(_))));

        let pm = PageManager::open_or_create(&dir.path().join("missing.dat"), PAGE)?;
        assert_eq!(pm.num_pages()?, 0);
        Ok(())
    }

    #[test]
    fn test_write_and_read_page() -> Result<()> {
        let dir = tempdir()?;
        let mut pm = PageManager::create(&dir.path().join("test.dat"), PAGE)?;

        let mut write_buf = vec![0u8; PAGE];
        write_buf[0] = 42;
        write_buf[PAGE - 1] = 24;
        pm.write_page(0, &write_buf)?;

        let mut read_buf = vec![0u8; PAGE];
        pm.read_page(0, &mut read_buf)?;
        assert_eq!(read_buf, write_buf);
        Ok(())
    }

    #[test]
    fn test_page_boundary() -> Result<()> {
        let dir = tempdir()?;
        let mut pm = PageManager::create(&dir.path().join("test.dat"), PAGE)?;

        pm.write_page(0, &vec![1u8; PAGE])?;
        pm.write_page(1, &vec![2u8; PAGE])?;
        assert_eq!(pm.len()?, 2 * PAGE as u64);

        let mut read_buf = vec![0u8; PAGE];
        pm.read_page(0, &mut read_buf)?;
        assert!(read_buf.iter().all(|&b| b == 1));
        pm.read_page(1, &mut read_buf)?;
        assert!(read_buf.iter().all(|&b| b == 2));
        Ok(())
    }

    #[test]
    fn test_open_rejects_partial_page() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("test.dat");
        std::fs::write(&path, vec![0u8; PAGE + 1])?;

        assert!(matches!(
            PageManager::open(&path, PAGE),
            Err(StorageError::InvalidRequest(_))
        ));
        assert!(matches!(
            PageManager::open_or_create(&path, PAGE),
            Err(StorageError::InvalidRequest(_))
        ));

        std::fs::write(&path, vec![0u8; 2 * PAGE])?;
        let mut pm = PageManager::open(&path, PAGE)?;
        assert_eq!(pm.num_pages()?, 2);
        assert_eq!(pm.allocate_page()?, 2);
        let mut buf = vec![0u8; PAGE];
        pm.read_page(1, &mut buf)?;
        Ok(())
    }

    #[test]
    fn test_read_beyond_end() -> Result<()> {
        let dir = tempdir()?;
        let mut pm = PageManager::create(&dir.path().join("test.dat"), PAGE)?;

        let mut buf = vec![0u8; PAGE];
        assert!(matches!(
            pm.read_page(3, &mut buf),
            Err(StorageError::InvalidRequest(_))
        ));
        Ok(())
    }

    #[test]
    fn test_invalid_buffer_size() -> Result<()> {
        let dir = tempdir()?;
        let mut pm = PageManager::create(&dir.path().join("test.dat"), PAGE)?;

        let mut small_buf = vec![0u8; 100];
        assert!(pm.read_page(0, &mut small_buf).is_err());
        assert!(pm.write_page(0, &small_buf).is_err());
        // Nothing was written.
        assert_eq!(pm.len()?, 0);
        Ok(())
    }

    #[test]
    fn test_allocate_page() -> Result<()> {
        let dir = tempdir()?;
        let mut pm = PageManager::create(&dir.path().join("test.dat"), PAGE)?;

        assert_eq!(pm.allocate_page()?, 0);
        assert_eq!(pm.allocate_page()?, 1);
        assert_eq!(pm.num_pages()?, 2);
        assert_eq!(pm.len()?, 2 * PAGE as u64);

        let mut buf = vec![9u8; PAGE];
        pm.read_page(1, &mut buf)?;
        assert!(buf.iter().all(|&b| b == 0));
        Ok(())
    }

    #[test]
    fn test_persistence() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.dat");

        {
            let mut pm = PageManager::create(&file_path, PAGE)?;
            pm.write_page(0, &vec![99u8; PAGE])?;
        }
        {
            let mut pm = PageManager::open(&file_path, PAGE)?;
            let mut buf = vec![0u8; PAGE];
            pm.read_page(0, &mut buf)?;
            assert_eq!(buf[0], 99);
        }
        Ok(())
    }
}
