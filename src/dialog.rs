/// Title shared by every dialog either tool shows.
pub const DIALOG_TITLE: &str = "YGO Mod Starter";

/// Show a blocking, single-button error dialog.
///
/// Both tools call this at most once, right before exiting with a non-zero
/// code.
#[cfg(windows)]
pub fn show_error(message: &str) {
    use windows::core::HSTRING;
    use windows::Win32::UI::WindowsAndMessaging::{MessageBoxW, MB_ICONERROR, MB_OK};

    // SAFETY: !
    unsafe {
        MessageBoxW(
            None,
            &HSTRING::from(message),
            &HSTRING::from(DIALOG_TITLE),
            MB_ICONERROR | MB_OK,
        );
    }
}

#[cfg(not(windows))]
pub fn show_error(message: &str) {
    eprintln!("{DIALOG_TITLE}: {message}");
}
