use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

/// The game executable started in a suspended state.
pub const EXECUTABLE: &str = "YuGiOh.exe";

/// The dll loaded into the game by the remote thread.
pub const PLUGIN_MANAGER_DLL: &str = "YGO Plugin Manager.dll";

// Inter-process communication
pub const READY_FILE: &str = "YGO API Loaded.IPC";
pub const MAX_PLUGINS: u32 = 100;
pub const MAX_TRIES: u32 = 50;
pub const TRY_TIME: Duration = Duration::from_millis(100);

#[derive(Parser)]
pub struct StarterArgs {
    /// The game executable to start
    ///
    /// the path is resolved from the current folder, which also
    /// becomes the working directory of the started game.
    #[clap(long, short, default_value = EXECUTABLE)]
    pub exe: PathBuf,

    /// The dll to be injected
    #[clap(long, short, default_value = PLUGIN_MANAGER_DLL)]
    pub dll: PathBuf,
}

impl StarterArgs {
    pub fn into_config(self) -> StarterConfig {
        StarterConfig {
            executable: self.exe,
            library: self.dll,
            ..StarterConfig::default()
        }
    }
}

#[derive(Parser)]
pub struct FixerArgs {
    /// The dll whose aligned vector moves should be rewritten
    #[clap(long, short, default_value = PLUGIN_MANAGER_DLL)]
    pub file: PathBuf,
}

/// Everything the launch sequence depends on, bundled so tests can
/// substitute their own paths and a much smaller poll budget.
#[derive(Debug, Clone)]
pub struct StarterConfig {
    pub executable: PathBuf,
    pub library: PathBuf,
    pub ready_file: PathBuf,
    pub max_plugins: u32,
    pub max_tries: u32,
    pub try_time: Duration,
}

impl Default for StarterConfig {
    fn default() -> Self {
        Self {
            executable: EXECUTABLE.into(),
            library: PLUGIN_MANAGER_DLL.into(),
            ready_file: READY_FILE.into(),
            max_plugins: MAX_PLUGINS,
            max_tries: MAX_TRIES,
            try_time: TRY_TIME,
        }
    }
}

impl StarterConfig {
    /// Ceiling on readiness polls: a worst-case plugin count, each taking
    /// the full per-plugin try budget.
    pub fn max_wait_attempts(&self) -> u32 {
        self.max_plugins * self.max_tries
    }
}
