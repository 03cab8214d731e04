//! Uniform random-access byte source over a regular file or a raw device.
//!
//! The regular-file path uses unbuffered `pread`/seek+read, the same way
//! `RawFileSource` elsewhere in this codebase does. The raw-device path
//! is grounded on `original_source/rawio.py`'s `RawDevice`, ported from
//! its `ctypes` kernel32 bindings to direct `extern "system"` FFI rather
//! than adding a Windows-API crate to the dependency set.

use std::fs::File;
use std::sync::Mutex;

use thiserror::Error;

const SECTOR_SIZE: u64 = 4096;
const BACKOFF_LADDER: [usize; 4] = [1024 * 1024, 256 * 1024, 64 * 1024, 4096];

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported evidence source: {0}")]
    Unsupported(String),
}

/// The engine's view of a source: a fixed-length byte stream readable at
/// arbitrary offsets. `read_at` may return fewer bytes than requested
/// (short read); it only returns `Err` when the position is genuinely
/// unreadable, never merely truncated at end-of-source.
pub trait RawReader: Send + Sync {
    fn length(&self) -> u64;
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, EvidenceError>;
}

/// Regular file or POSIX block device. `pread` (or seek+read on non-unix)
/// works unmodified against block-device file descriptors on Linux, so no
/// separate code path is needed there; only the length probe differs,
/// since `stat` reports zero for block devices.
pub struct FileSource {
    file: File,
    len: u64,
    #[cfg(not(unix))]
    lock: Mutex<()>,
}

impl FileSource {
    pub fn open(path: &std::path::Path) -> Result<Self, EvidenceError> {
        let file = File::open(path)?;
        let len = probe_length(&file)?;
        Ok(Self {
            file,
            len,
            #[cfg(not(unix))]
            lock: Mutex::new(()),
        })
    }
}

fn probe_length(file: &File) -> Result<u64, EvidenceError> {
    let meta_len = file.metadata()?.len();
    if meta_len > 0 {
        return Ok(meta_len);
    }
    use std::io::{Seek, SeekFrom};
    let mut f = file;
    let end = f.seek(SeekFrom::End(0))?;
    f.seek(SeekFrom::Start(0))?;
    Ok(end)
}

impl RawReader for FileSource {
    fn length(&self) -> u64 {
        self.len
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, EvidenceError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            Ok(self.file.read_at(buf, offset)?)
        }
        #[cfg(not(unix))]
        {
            use std::io::{Read, Seek, SeekFrom};
            let _guard = self.lock.lock().unwrap();
            let mut f = &self.file;
            f.seek(SeekFrom::Start(offset))?;
            Ok(f.read(buf)?)
        }
    }
}

/// Read `buf.len()` bytes starting at `offset`, aligned down to the sector
/// boundary, backing off through `BACKOFF_LADDER` on failure and returning
/// whatever the smallest size could recover. Shared by every raw-device
/// backend so the resilience behaviour is identical across platforms.
fn resilient_read_at(
    read_raw: impl Fn(u64, &mut [u8]) -> std::io::Result<usize>,
    offset: u64,
    buf: &mut [u8],
) -> Result<usize, EvidenceError> {
    let aligned_offset = offset - (offset % SECTOR_SIZE);
    let front_pad = (offset - aligned_offset) as usize;
    let wanted = front_pad + buf.len();

    let mut last_err = None;
    for &block in &BACKOFF_LADDER {
        let aligned_len = ((wanted + block - 1) / block) * block;
        let mut scratch = vec![0u8; aligned_len.max(block)];
        match read_raw(aligned_offset, &mut scratch) {
            Ok(n) if n > front_pad => {
                let usable = (n - front_pad).min(buf.len());
                buf[..usable].copy_from_slice(&scratch[front_pad..front_pad + usable]);
                return Ok(usable);
            }
            Ok(_) => return Ok(0),
            Err(e) => last_err = Some(e),
        }
    }
    Err(EvidenceError::Io(last_err.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::Other, "raw device read exhausted backoff ladder")
    })))
}

/// Rewrite a Windows drive designator (`E:`, `E:\`, `E:\subdir`) to its raw
/// device form (`\\.\E:`). Pure string transform, independent of host OS,
/// so it is unit-testable everywhere; only `open_source` decides whether
/// the rewritten path is actually opened as a raw device.
pub fn rewrite_drive_path(path: &str) -> String {
    let trimmed = path.trim();
    let bytes = trimmed.as_bytes();
    if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        let drive = bytes[0].to_ascii_uppercase() as char;
        return format!(r"\\.\{}:", drive);
    }
    path.to_string()
}

#[cfg(windows)]
mod windows_raw {
    use super::{resilient_read_at, EvidenceError, RawReader};
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;

    type Handle = *mut std::ffi::c_void;

    const GENERIC_READ: u32 = 0x8000_0000;
    const OPEN_EXISTING: u32 = 3;
    const FILE_SHARE_READ: u32 = 0x0000_0001;
    const FILE_SHARE_WRITE: u32 = 0x0000_0002;
    const FILE_ATTRIBUTE_NORMAL: u32 = 0x0000_0080;
    const IOCTL_DISK_GET_LENGTH_INFO: u32 = 0x0007_405c;

    #[link(name = "kernel32")]
    extern "system" {
        fn CreateFileW(
            lpfilename: *const u16,
            dwdesiredaccess: u32,
            dwsharemode: u32,
            lpsecurityattributes: *mut std::ffi::c_void,
            dwcreationdisposition: u32,
            dwflagsandattributes: u32,
            htemplatefile: Handle,
        ) -> Handle;
        fn DeviceIoControl(
            hdevice: Handle,
            dwiocontrolcode: u32,
            lpinbuffer: *mut std::ffi::c_void,
            ninbuffersize: u32,
            lpoutbuffer: *mut std::ffi::c_void,
            noutbuffersize: u32,
            lpbytesreturned: *mut u32,
            lpoverlapped: *mut std::ffi::c_void,
        ) -> i32;
        fn SetFilePointerEx(
            hfile: Handle,
            lidistancetomove: i64,
            lpnewfilepointer: *mut i64,
            dwmovemethod: u32,
        ) -> i32;
        fn ReadFile(
            hfile: Handle,
            lpbuffer: *mut u8,
            nnumberofbytestoread: u32,
            lpnumberofbytesread: *mut u32,
            lpoverlapped: *mut std::ffi::c_void,
        ) -> i32;
        fn CloseHandle(hobject: Handle) -> i32;
    }

    pub struct RawDeviceSource {
        handle: Handle,
        len: u64,
    }

    unsafe impl Send for RawDeviceSource {}
    unsafe impl Sync for RawDeviceSource {}

    impl RawDeviceSource {
        pub fn open(path: &str) -> Result<Self, EvidenceError> {
            let wide: Vec<u16> = OsStr::new(path)
                .encode_wide()
                .chain(std::iter::once(0))
                .collect();
            let handle = unsafe {
                CreateFileW(
                    wide.as_ptr(),
                    GENERIC_READ,
                    FILE_SHARE_READ | FILE_SHARE_WRITE,
                    std::ptr::null_mut(),
                    OPEN_EXISTING,
                    FILE_ATTRIBUTE_NORMAL,
                    std::ptr::null_mut(),
                )
            };
            if handle.is_null() || handle as isize == -1 {
                return Err(EvidenceError::Io(std::io::Error::last_os_error()));
            }
            let len = unsafe { query_length(handle) }
                .ok_or_else(|| EvidenceError::Unsupported(format!("cannot size {path}")))?;
            Ok(Self { handle, len })
        }

        fn read_raw(&self, offset: u64, buf: &mut [u8]) -> std::io::Result<usize> {
            unsafe {
                let mut ok = SetFilePointerEx(self.handle, offset as i64, std::ptr::null_mut(), 0);
                if ok == 0 {
                    return Err(std::io::Error::last_os_error());
                }
                let mut read: u32 = 0;
                ok = ReadFile(
                    self.handle,
                    buf.as_mut_ptr(),
                    buf.len() as u32,
                    &mut read,
                    std::ptr::null_mut(),
                );
                if ok == 0 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(read as usize)
            }
        }
    }

    unsafe fn query_length(handle: Handle) -> Option<u64> {
        let mut out: i64 = 0;
        let mut returned: u32 = 0;
        let ok = DeviceIoControl(
            handle,
            IOCTL_DISK_GET_LENGTH_INFO,
            std::ptr::null_mut(),
            0,
            &mut out as *mut i64 as *mut std::ffi::c_void,
            std::mem::size_of::<i64>() as u32,
            &mut returned,
            std::ptr::null_mut(),
        );
        if ok == 0 {
            None
        } else {
            Some(out as u64)
        }
    }

    impl RawReader for RawDeviceSource {
        fn length(&self) -> u64 {
            self.len
        }

        fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize, EvidenceError> {
            resilient_read_at(|o, b| self.read_raw(o, b), offset, buf)
        }
    }

    impl Drop for RawDeviceSource {
        fn drop(&mut self) {
            unsafe {
                CloseHandle(self.handle);
            }
        }
    }
}

#[cfg(windows)]
pub use windows_raw::RawDeviceSource;

/// Open a source address: rewrites a Windows drive designator to its raw
/// form, then opens either the platform raw-device backend (if the
/// resulting path is a raw device on this host) or a plain file.
pub fn open_source(addr: &str) -> Result<Box<dyn RawReader>, EvidenceError> {
    let rewritten = rewrite_drive_path(addr);

    #[cfg(windows)]
    {
        if rewritten.starts_with(r"\\.\") {
            return Ok(Box::new(RawDeviceSource::open(&rewritten)?));
        }
    }

    Ok(Box::new(FileSource::open(std::path::Path::new(&rewritten))?))
}
