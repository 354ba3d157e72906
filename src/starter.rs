use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::path::PathBuf;

use log::info;
use thiserror::Error;

use crate::config::StarterConfig;
use crate::process;
use crate::sentinel::ReadyFile;

#[derive(Debug, Error)]
pub enum StarterError {
    #[error("{} does not exist in the current folder.", .0.display())]
    MissingExecutable(PathBuf),

    #[error("failed to resolve the dll path {}: {source}", .path.display())]
    MissingLibrary {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to start {}: {source}", .path.display())]
    CreateProcess {
        path: PathBuf,
        source: windows::core::Error,
    },

    #[error("failed to get a handle for kernel32.dll: {0}")]
    LoaderModule(#[source] windows::core::Error),

    #[error("failed to get the address of LoadLibraryW.")]
    LoaderSymbol,

    #[error("failed to allocate memory for the dll path in the game's process: {0}")]
    AllocateArg(#[source] windows::core::Error),

    #[error("failed to write the dll path into the game's process: {0}")]
    WriteArg(#[source] windows::core::Error),

    #[error("failed to create a thread for the Plugin Manager: {0}")]
    StartThread(#[source] windows::core::Error),

    #[error("the Plugin Manager failed to load in the given time.")]
    LoadTimeout,

    #[error("failed to resume the game's main thread: {0}")]
    Resume(#[source] windows::core::Error),
}

impl StarterError {
    /// Stable exit code for each failure site. Success is 0.
    pub fn exit_code(&self) -> i32 {
        match self {
            StarterError::MissingExecutable(_) => 1,
            StarterError::MissingLibrary { .. } => 2,
            StarterError::CreateProcess { .. } => 3,
            StarterError::LoaderModule(_) => 4,
            StarterError::LoaderSymbol => 5,
            StarterError::AllocateArg(_) => 6,
            StarterError::WriteArg(_) => 7,
            StarterError::StartThread(_) => 8,
            StarterError::LoadTimeout => 9,
            StarterError::Resume(_) => 10,
        }
    }
}

/// Start the game suspended, load the plugin manager into it through a
/// remote LoadLibraryW thread, and resume it once the ready file shows up.
///
/// A failure anywhere after process creation tears the process down again
/// (see [`process::SuspendedProcess`]); the caller is left to report the
/// error and exit.
pub fn launch(config: &StarterConfig) -> Result<(), StarterError> {
    let ready = ReadyFile::new(
        &config.ready_file,
        config.max_wait_attempts(),
        config.try_time,
    );

    // Cleanup of a previous run
    ready.clear();

    if !config.executable.exists() {
        return Err(StarterError::MissingExecutable(config.executable.clone()));
    }

    // The path is handed to LoadLibraryW inside the game, where the working
    // directory is no longer under our control, so pin it down to an
    // absolute one up front.
    let library = config
        .library
        .canonicalize()
        .map_err(|source| StarterError::MissingLibrary {
            path: config.library.clone(),
            source,
        })?;

    info!("starting {} suspended", config.executable.display());
    let mut game = process::spawn_suspended(&config.executable).map_err(|source| {
        StarterError::CreateProcess {
            path: config.executable.clone(),
            source,
        }
    })?;

    let kernel32 = process::module_handle("kernel32.dll").map_err(StarterError::LoaderModule)?;
    let entry = process::load_library_entry(kernel32).ok_or(StarterError::LoaderSymbol)?;

    let argument = wide_bytes(library.as_os_str());
    let remote = game
        .alloc(argument.len())
        .map_err(StarterError::AllocateArg)?;
    game.write(remote, &argument)
        .map_err(StarterError::WriteArg)?;

    // The allocation is never freed; the game owns it for the rest of its
    // lifetime and the loader thread is never joined.
    info!("injecting {}", library.display());
    game.spawn_thread(entry, remote)
        .map_err(StarterError::StartThread)?;

    info!("waiting for the Plugin Manager to signal readiness");
    if !ready.wait() {
        return Err(StarterError::LoadTimeout);
    }

    game.resume().map_err(StarterError::Resume)?;
    info!("{} resumed with the Plugin Manager loaded", config.executable.display());

    Ok(())
}

/// NUL-terminated UTF-16 encoding of `path`, as the raw bytes LoadLibraryW
/// will read out of the remote allocation.
fn wide_bytes(path: &OsStr) -> Vec<u8> {
    path.encode_wide()
        .chain(std::iter::once(0))
        .flat_map(u16::to_ne_bytes)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    fn win32_error() -> windows::core::Error {
        windows::Win32::Foundation::E_FAIL.ok().unwrap_err()
    }

    #[test]
    fn every_failure_site_has_a_distinct_nonzero_exit_code() {
        let errors = [
            StarterError::MissingExecutable(PathBuf::from("YuGiOh.exe")),
            StarterError::MissingLibrary {
                path: PathBuf::from("x.dll"),
                source: io::Error::new(io::ErrorKind::NotFound, "missing"),
            },
            StarterError::CreateProcess {
                path: PathBuf::from("YuGiOh.exe"),
                source: win32_error(),
            },
            StarterError::LoaderModule(win32_error()),
            StarterError::LoaderSymbol,
            StarterError::AllocateArg(win32_error()),
            StarterError::WriteArg(win32_error()),
            StarterError::StartThread(win32_error()),
            StarterError::LoadTimeout,
            StarterError::Resume(win32_error()),
        ];

        let codes: HashSet<i32> = errors.iter().map(StarterError::exit_code).collect();

        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn wide_bytes_are_nul_terminated_utf16() {
        let bytes = wide_bytes(OsStr::new("a.dll"));

        // 5 characters plus the terminator, two bytes each
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes[..2], u16::to_ne_bytes('a' as u16));
        assert_eq!(bytes[10..], [0, 0]);
    }
}
