//! Thin wrappers over the host calls backing guest syscalls.
//!
//! Every wrapper reports failure as the host `errno`, which is handed to the
//! guest unchanged.

use std::{
    ffi::CString,
    fs::{File, Metadata},
    io,
    mem::ManuallyDrop,
    os::unix::{
        ffi::OsStrExt,
        fs::DirBuilderExt,
        io::{FromRawFd, RawFd},
    },
    path::Path,
};

/// Host call outcome: a guest-visible value or an `errno`.
pub type HostResult<T = u32> = Result<T, i32>;

fn errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)
}

fn io_errno(err: io::Error) -> i32 {
    err.raw_os_error().unwrap_or(libc::EIO)
}

fn check(ret: libc::c_int) -> HostResult {
    if ret == -1 {
        Err(errno())
    } else {
        Ok(ret as u32)
    }
}

fn c_path(path: &Path) -> HostResult<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| libc::EINVAL)
}

pub fn read(fd: RawFd, size: usize) -> HostResult<Vec<u8>> {
    let mut buf = vec![0u8; size];
    let ret = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), size) };
    if ret < 0 {
        return Err(errno());
    }
    buf.truncate(ret as usize);
    Ok(buf)
}

pub fn write(fd: RawFd, data: &[u8]) -> HostResult {
    let ret = unsafe { libc::write(fd, data.as_ptr().cast(), data.len()) };
    if ret < 0 {
        return Err(errno());
    }
    Ok(ret as u32)
}

pub fn open(path: &Path, flags: i32, mode: u32) -> HostResult {
    let path = c_path(path)?;
    check(unsafe { libc::open(path.as_ptr(), flags, mode as libc::c_uint) })
}

pub fn close(fd: RawFd) -> HostResult {
    check(unsafe { libc::close(fd) })
}

pub fn lseek(fd: RawFd, offset: i64, whence: i32) -> HostResult<i64> {
    let ret = unsafe { libc::lseek(fd, offset as libc::off_t, whence) };
    if ret < 0 {
        return Err(errno());
    }
    Ok(ret as i64)
}

pub fn ftruncate(fd: RawFd, length: i64) -> HostResult {
    check(unsafe { libc::ftruncate(fd, length as libc::off_t) })
}

pub fn fcntl(fd: RawFd, cmd: i32, arg: i32) -> HostResult {
    check(unsafe { libc::fcntl(fd, cmd, arg) })
}

pub fn access(path: &Path, mode: i32) -> HostResult {
    let path = c_path(path)?;
    check(unsafe { libc::access(path.as_ptr(), mode) })
}

pub fn unlink(path: &Path) -> HostResult {
    std::fs::remove_file(path).map(|_| 0).map_err(io_errno)
}

pub fn rename(from: &Path, to: &Path) -> HostResult {
    std::fs::rename(from, to).map(|_| 0).map_err(io_errno)
}

pub fn mkdir(path: &Path, mode: u32) -> HostResult {
    std::fs::DirBuilder::new()
        .mode(mode)
        .create(path)
        .map(|_| 0)
        .map_err(io_errno)
}

pub fn readlink(path: &Path) -> HostResult<Vec<u8>> {
    std::fs::read_link(path)
        .map(|target| target.as_os_str().as_bytes().to_vec())
        .map_err(io_errno)
}

pub fn stat(path: &Path) -> HostResult<Metadata> {
    std::fs::metadata(path).map_err(io_errno)
}

pub fn lstat(path: &Path) -> HostResult<Metadata> {
    std::fs::symlink_metadata(path).map_err(io_errno)
}

pub fn fstat(fd: RawFd) -> HostResult<Metadata> {
    // Borrow the descriptor without taking ownership of it
    let file = ManuallyDrop::new(unsafe { File::from_raw_fd(fd) });
    file.metadata().map_err(io_errno)
}

/// Seconds since the epoch, truncated to the guest word.
pub fn time() -> u32 {
    unsafe { libc::time(std::ptr::null_mut()) as u32 }
}

pub fn getuid() -> u32 {
    unsafe { libc::getuid() }
}

pub fn geteuid() -> u32 {
    unsafe { libc::geteuid() }
}

pub fn getgid() -> u32 {
    unsafe { libc::getgid() }
}

pub fn getegid() -> u32 {
    unsafe { libc::getegid() }
}

/// Process times and the elapsed clock ticks.
pub fn times() -> HostResult<(libc::tms, u32)> {
    let mut tms: libc::tms = unsafe { std::mem::zeroed() };
    let ticks = unsafe { libc::times(&mut tms) };
    if ticks == (-1i64) as libc::clock_t {
        return Err(errno());
    }
    Ok((tms, ticks as u32))
}

/// Resource usage of the emulator process itself.
pub fn getrusage() -> HostResult<libc::rusage> {
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    check(unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) })?;
    Ok(usage)
}

pub fn tcgetattr(fd: RawFd) -> HostResult<libc::termios> {
    let mut termios: libc::termios = unsafe { std::mem::zeroed() };
    check(unsafe { libc::tcgetattr(fd, &mut termios) })?;
    Ok(termios)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::io::AsRawFd;

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");

        let fd = open(&path, libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC, 0o644).unwrap() as i32;
        assert_eq!(write(fd, b"hello world"), Ok(11));
        close(fd).unwrap();

        let fd = open(&path, libc::O_RDONLY, 0).unwrap() as i32;
        assert_eq!(lseek(fd, 6, libc::SEEK_SET), Ok(6));
        assert_eq!(read(fd, 64).unwrap(), b"world");
        assert_eq!(fstat(fd).unwrap().len(), 11);
        close(fd).unwrap();

        assert_eq!(stat(&path).unwrap().len(), 11);
        assert_eq!(access(&path, libc::R_OK), Ok(0));
    }

    #[test]
    fn test_errors_are_errno() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");

        assert_eq!(open(&missing, libc::O_RDONLY, 0), Err(libc::ENOENT));
        assert_eq!(stat(&missing).unwrap_err(), libc::ENOENT);
        assert_eq!(unlink(&missing), Err(libc::ENOENT));
        assert_eq!(close(-1), Err(libc::EBADF));
    }

    #[test]
    fn test_directory_calls() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        assert_eq!(mkdir(&sub, 0o755), Ok(0));
        assert_eq!(mkdir(&sub, 0o755), Err(libc::EEXIST));

        let target = dir.path().join("renamed");
        assert_eq!(rename(&sub, &target), Ok(0));
        assert!(target.is_dir());

        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        assert_eq!(readlink(&link).unwrap(), target.as_os_str().as_bytes());
        assert!(lstat(&link).unwrap().file_type().is_symlink());
    }

    #[test]
    fn test_fstat_keeps_descriptor_open() {
        let file = tempfile::tempfile().unwrap();
        let fd = file.as_raw_fd();
        fstat(fd).unwrap();
        assert!(fstat(fd).is_ok());
    }
}
