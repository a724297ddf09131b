// Permission bits and inode flags captured alongside the rest of the metadata.

use std::fs::Metadata;
use std::path::Path;

#[cfg(unix)]
pub(crate) fn raw_mode(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    metadata.mode()
}

#[cfg(not(unix))]
pub(crate) fn raw_mode(_metadata: &Metadata) -> u32 {
    0
}

/// setuid / setgid / sticky
pub(crate) const SPECIAL_BITS: u32 = 0o7000;

/// Block/char devices, FIFOs and sockets.
#[cfg(unix)]
pub(crate) fn is_special_file_type(mode: u32) -> bool {
    let kind = mode & libc::S_IFMT as u32;
    kind == libc::S_IFIFO as u32
        || kind == libc::S_IFSOCK as u32
        || kind == libc::S_IFCHR as u32
        || kind == libc::S_IFBLK as u32
}

#[cfg(not(unix))]
pub(crate) fn is_special_file_type(_mode: u32) -> bool {
    false
}

#[cfg(target_os = "macos")]
pub(crate) fn is_immutable(_path: &Path, metadata: &Metadata) -> bool {
    use std::os::macos::fs::MetadataExt;

    const UF_IMMUTABLE: u32 = 0x0000_0002;
    const UF_APPEND: u32 = 0x0000_0004;
    const SF_IMMUTABLE: u32 = 0x0002_0000;
    const SF_APPEND: u32 = 0x0004_0000;

    metadata.st_flags() & (UF_IMMUTABLE | UF_APPEND | SF_IMMUTABLE | SF_APPEND) != 0
}

#[cfg(all(
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "riscv64")
))]
pub(crate) fn is_immutable(path: &Path, metadata: &Metadata) -> bool {
    use std::fs::OpenOptions;
    use std::os::unix::fs::OpenOptionsExt;
    use std::os::unix::io::AsRawFd;

    // _IOR('f', 1, long)
    const FS_IOC_GETFLAGS: u64 = 0x8008_6601;
    const FS_IMMUTABLE_FL: libc::c_long = 0x0000_0010;
    const FS_APPEND_FL: libc::c_long = 0x0000_0020;

    if !(metadata.is_file() || metadata.is_dir()) {
        return false;
    }

    let file = match OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK | libc::O_NOFOLLOW)
        .open(path)
    {
        Ok(file) => file,
        Err(_) => return false,
    };

    let mut flags: libc::c_long = 0;
    // SAFETY: the fd is open for the duration of the call and `flags` outlives it.
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), FS_IOC_GETFLAGS as _, &mut flags) };
    rc == 0 && flags & (FS_IMMUTABLE_FL | FS_APPEND_FL) != 0
}

#[cfg(not(any(
    target_os = "macos",
    all(
        target_os = "linux",
        any(target_arch = "x86_64", target_arch = "aarch64", target_arch = "riscv64")
    )
)))]
pub(crate) fn is_immutable(_path: &Path, _metadata: &Metadata) -> bool {
    false
}
