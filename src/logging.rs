use env_logger::{Builder, Env, Target};

/// Route log output to stdout, defaulting to info when RUST_LOG is unset.
pub fn init() {
    Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Stdout)
        .try_init()
        .ok();
}
