pub mod config;
pub mod dialog;
pub mod logging;
pub mod patch;
#[cfg(windows)]
pub mod process;
pub mod sentinel;
#[cfg(windows)]
pub mod starter;
