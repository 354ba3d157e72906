// Whenever an unsafe function does not have any requirements, we leave 'SAFETY: !' to make it clear that
// we didn't forget to write a SAFETY block, but rather that the function is a safe function that was marked as unsafe

use std::ffi::c_void;
use std::path::Path;

use windows::core::{s, HSTRING, PCWSTR, PWSTR};
use windows::Win32::Foundation::{CloseHandle, HANDLE, HMODULE};
use windows::Win32::System::Diagnostics::Debug::WriteProcessMemory;
use windows::Win32::System::LibraryLoader::{GetModuleHandleW, GetProcAddress};
use windows::Win32::System::Memory::{VirtualAllocEx, MEM_COMMIT, MEM_RESERVE, PAGE_READWRITE};
use windows::Win32::System::Threading::{
    CreateProcessW, CreateRemoteThread, ResumeThread, TerminateProcess, CREATE_SUSPENDED,
    PROCESS_INFORMATION, STARTUPINFOW,
};

/// Entry point signature expected by CreateRemoteThread.
pub type RemoteEntry = unsafe extern "system" fn(*mut c_void) -> u32;

/// A process created with CREATE_SUSPENDED, owned for the duration of the
/// launch sequence.
///
/// Dropping it closes both handles exactly once; if [`resume`] was never
/// reached the process is terminated first, so no suspended process is left
/// behind on a failed launch.
///
/// [`resume`]: SuspendedProcess::resume
pub struct SuspendedProcess {
    process: HANDLE,
    thread: HANDLE,
    resumed: bool,
}

/// Create the process at `path` with every thread suspended.
pub fn spawn_suspended(path: &Path) -> windows::core::Result<SuspendedProcess> {
    let application = HSTRING::from(path.as_os_str());

    let startup = STARTUPINFOW {
        cb: std::mem::size_of::<STARTUPINFOW>() as u32,
        ..Default::default()
    };
    let mut information = PROCESS_INFORMATION::default();

    // SAFETY: startup carries its correct 'cb' and information is a plain out parameter
    unsafe {
        CreateProcessW(
            &application,
            PWSTR::null(),
            None,
            None,
            false,
            CREATE_SUSPENDED,
            None,
            PCWSTR::null(),
            &startup,
            &mut information,
        )
    }?;

    Ok(SuspendedProcess {
        process: information.hProcess,
        thread: information.hThread,
        resumed: false,
    })
}

/// Handle to a module already mapped into this process.
pub fn module_handle(name: &str) -> windows::core::Result<HMODULE> {
    // SAFETY: !
    unsafe { GetModuleHandleW(&HSTRING::from(name)) }
}

/// Address of LoadLibraryW, usable as a remote thread entry point.
///
/// kernel32.dll is mapped at the same base in every process, so an address
/// resolved here is valid inside the target as well.
pub fn load_library_entry(kernel32: HMODULE) -> Option<RemoteEntry> {
    // SAFETY: kernel32 stays mapped for the lifetime of this process
    let address = unsafe { GetProcAddress(kernel32, s!("LoadLibraryW")) }?;

    // SAFETY: LoadLibraryW takes a single pointer argument and returns a
    // module handle, which fits the thread entry ABI
    Some(unsafe { std::mem::transmute::<unsafe extern "system" fn() -> isize, RemoteEntry>(address) })
}

impl SuspendedProcess {
    /// Allocate a readable/writable block of `size` bytes inside the target.
    pub fn alloc(&self, size: usize) -> windows::core::Result<*mut c_void> {
        // SAFETY: !
        let remote = unsafe {
            VirtualAllocEx(self.process, None, size, MEM_RESERVE | MEM_COMMIT, PAGE_READWRITE)
        };

        if remote.is_null() {
            return Err(windows::core::Error::from_win32());
        }

        Ok(remote)
    }

    /// Copy `bytes` into target memory previously returned by [`alloc`].
    ///
    /// [`alloc`]: SuspendedProcess::alloc
    pub fn write(&self, remote: *mut c_void, bytes: &[u8]) -> windows::core::Result<()> {
        // SAFETY: remote points at an allocation of at least bytes.len() bytes
        unsafe {
            WriteProcessMemory(
                self.process,
                remote,
                bytes.as_ptr() as *const c_void,
                bytes.len(),
                None,
            )
        }
    }

    /// Start a thread inside the target at `entry` with `argument`.
    ///
    /// The thread handle is closed right away; completion is signalled
    /// through the ready file, never by joining the thread.
    pub fn spawn_thread(
        &self,
        entry: RemoteEntry,
        argument: *const c_void,
    ) -> windows::core::Result<()> {
        // SAFETY: entry is a function mapped into the target and argument
        // points into memory the target owns
        let thread = unsafe {
            CreateRemoteThread(self.process, None, 0, Some(entry), Some(argument), 0, None)
        }?;

        // SAFETY: !
        let _ = unsafe { CloseHandle(thread) };

        Ok(())
    }

    /// Resume the primary thread, letting the target run.
    pub fn resume(&mut self) -> windows::core::Result<()> {
        // SAFETY: !
        if unsafe { ResumeThread(self.thread) } == u32::MAX {
            return Err(windows::core::Error::from_win32());
        }

        self.resumed = true;
        Ok(())
    }
}

impl Drop for SuspendedProcess {
    fn drop(&mut self) {
        if !self.resumed {
            // SAFETY: !
            let _ = unsafe { TerminateProcess(self.process, 0) };
        }

        // SAFETY: !
        let _ = unsafe { CloseHandle(self.process) };
        // SAFETY: !
        let _ = unsafe { CloseHandle(self.thread) };
    }
}
