use std::ffi::OsString;
use std::io;
use std::os::fd::RawFd;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Command;

/// Replaces the running process image while keeping chosen descriptors open.
///
/// Kept behind a trait so the control loop does not care whether this is
/// an in-place exec or a hand-off to a pre-forked successor.
pub trait ProcessReplacer: Send {
    /// Only returns on failure.
    fn replace(&self, inherited: &[RawFd]) -> io::Error;
}

/// In-place `exec` of a program, by default the running executable with the
/// running arguments.
#[derive(Debug, Clone)]
pub struct ExecReplacer {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ExecReplacer {
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// The current executable and arguments.
    pub fn current() -> io::Result<Self> {
        let mut program = std::env::current_exe()?;
        // Linux reports a binary that was replaced on disk as "path (deleted)";
        // the successor should be the new file at the same path.
        if let Some(live) = program
            .to_str()
            .and_then(|p| p.strip_suffix(" (deleted)"))
        {
            program = PathBuf::from(live);
        }
        Ok(Self::new(program, std::env::args_os().skip(1).collect()))
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

impl ProcessReplacer for ExecReplacer {
    fn replace(&self, inherited: &[RawFd]) -> io::Error {
        for (n, &fd) in inherited.iter().enumerate() {
            if let Err(e) = net::handoff::clear_cloexec(fd) {
                tracing::error!(fd, error = %e, "cannot keep descriptor across exec");
                restore_cloexec(&inherited[..n]);
                return e;
            }
        }
        tracing::info!(program = %self.program.display(), fds = inherited.len(), "replacing process image");
        let error = Command::new(&self.program).args(&self.args).exec();
        // Still running: the descriptors must not leak into later children.
        restore_cloexec(inherited);
        error
    }
}

fn restore_cloexec(fds: &[RawFd]) {
    for &fd in fds {
        if let Err(e) = net::handoff::set_cloexec(fd) {
            tracing::warn!(fd, error = %e, "cannot restore close-on-exec");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_program_fails_without_replacing() {
        let replacer = ExecReplacer::new("/nonexistent/mud_server", Vec::new());
        let err = replacer.replace(&[]);
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn bad_descriptor_aborts_before_exec() {
        let replacer = ExecReplacer::new("/bin/true", Vec::new());
        let err = replacer.replace(&[-1]);
        assert_eq!(err.raw_os_error(), Some(libc::EBADF));
    }

    #[test]
    fn failed_exec_restores_close_on_exec() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let fd = std::os::fd::AsRawFd::as_raw_fd(&listener);
        assert!(net::handoff::is_cloexec(fd).unwrap());

        let replacer = ExecReplacer::new("/nonexistent/mud_server", Vec::new());
        replacer.replace(&[fd]);
        assert!(net::handoff::is_cloexec(fd).unwrap());
    }

    #[test]
    fn current_points_at_this_binary() {
        let replacer = ExecReplacer::current().unwrap();
        assert!(replacer.program().exists());
    }
}
