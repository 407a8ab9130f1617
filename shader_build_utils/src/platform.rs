use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
    process::Command,
};

/// A process the build step wants to run.
#[derive(Debug, Clone)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<OsString>,
    pub working_directory: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// The operating system facilities the build step depends on.
pub trait Platform: Send + Sync {
    fn run_command(&self, command: &CommandLine) -> io::Result<CommandOutput>;

    /// Moves `from` to `to`, replacing `to` if it exists.
    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPlatform;

impl Platform for SystemPlatform {
    fn run_command(&self, command: &CommandLine) -> io::Result<CommandOutput> {
        let output = Command::new(&command.program)
            .args(&command.args)
            .current_dir(&command.working_directory)
            .output()?;

        Ok(CommandOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        sys::replace_file(from, to)
    }
}

#[cfg(unix)]
mod sys {
    use std::{fs, io, path::Path};

    // EXDEV: the scratch directory lives on another mount than the output
    // TODO: match io::ErrorKind::CrossesDevices once rust-version is 1.85
    const CROSS_DEVICE_LINK: i32 = 18;

    pub fn replace_file(from: &Path, to: &Path) -> io::Result<()> {
        match fs::rename(from, to) {
            Err(e) if e.raw_os_error() == Some(CROSS_DEVICE_LINK) => {
                super::copy_and_remove(from, to)
            }
            other => other,
        }
    }
}

#[cfg(windows)]
mod sys {
    use std::{fs, io, path::Path};

    // ERROR_NOT_SAME_DEVICE
    // TODO: match io::ErrorKind::CrossesDevices once rust-version is 1.85
    const NOT_SAME_DEVICE: i32 = 17;

    pub fn replace_file(from: &Path, to: &Path) -> io::Result<()> {
        match fs::rename(from, to) {
            Err(e) if e.raw_os_error() == Some(NOT_SAME_DEVICE) => {
                super::copy_and_remove(from, to)
            }
            other => other,
        }
    }
}

fn copy_and_remove(from: &Path, to: &Path) -> io::Result<()> {
    fs::copy(from, to)?;
    fs::remove_file(from)
}
