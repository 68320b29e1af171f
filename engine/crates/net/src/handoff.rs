//! Raw descriptor plumbing for hot restart.
//!
//! The outgoing process clears close-on-exec on the descriptors it wants the
//! replacement image to inherit; the successor validates each recorded
//! descriptor and wraps it back into a tokio socket.

use std::io;
use std::os::fd::{FromRawFd, RawFd};

fn get_fd_flags(fd: RawFd) -> io::Result<libc::c_int> {
    // SAFETY: F_GETFD only inspects the descriptor table.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(flags)
}

fn set_fd_flags(fd: RawFd, flags: libc::c_int) -> io::Result<()> {
    // SAFETY: F_SETFD only changes descriptor flags, not ownership.
    if unsafe { libc::fcntl(fd, libc::F_SETFD, flags) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Let `fd` survive an exec.
pub fn clear_cloexec(fd: RawFd) -> io::Result<()> {
    let flags = get_fd_flags(fd)?;
    set_fd_flags(fd, flags & !libc::FD_CLOEXEC)
}

/// Mark `fd` close-on-exec again once it has been adopted.
pub fn set_cloexec(fd: RawFd) -> io::Result<()> {
    let flags = get_fd_flags(fd)?;
    set_fd_flags(fd, flags | libc::FD_CLOEXEC)
}

pub fn is_cloexec(fd: RawFd) -> io::Result<bool> {
    Ok(get_fd_flags(fd)? & libc::FD_CLOEXEC != 0)
}

/// Check that `fd` is open and refers to a socket.
pub fn validate_socket(fd: RawFd) -> io::Result<()> {
    // SAFETY: `stat` is plain old data; fstat fills it or fails.
    let mut stat: libc::stat = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstat(fd, &mut stat) } != 0 {
        return Err(io::Error::last_os_error());
    }
    if stat.st_mode & libc::S_IFMT != libc::S_IFSOCK {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("descriptor {fd} is not a socket"),
        ));
    }
    Ok(())
}

/// Take ownership of an inherited connected socket.
///
/// Must be called from within a tokio runtime.
pub fn stream_from_fd(fd: RawFd) -> io::Result<tokio::net::TcpStream> {
    validate_socket(fd)?;
    // SAFETY: the descriptor is a socket we inherited and nobody else owns.
    let std_stream = unsafe { std::net::TcpStream::from_raw_fd(fd) };
    std_stream.set_nonblocking(true)?;
    set_cloexec(fd)?;
    tokio::net::TcpStream::from_std(std_stream)
}

/// Take ownership of the inherited listening socket.
///
/// Must be called from within a tokio runtime.
pub fn listener_from_fd(fd: RawFd) -> io::Result<tokio::net::TcpListener> {
    validate_socket(fd)?;
    // SAFETY: as above; the listener descriptor is recorded once per restart.
    let std_listener = unsafe { std::net::TcpListener::from_raw_fd(fd) };
    std_listener.set_nonblocking(true)?;
    set_cloexec(fd)?;
    tokio::net::TcpListener::from_std(std_listener)
}
