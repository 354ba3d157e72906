#[cfg(windows)]
fn main() {
    use clap::Parser;
    use log::error;
    use ygo_mod_tools::config::StarterArgs;
    use ygo_mod_tools::{dialog, logging, starter};

    logging::init();

    let config = StarterArgs::parse().into_config();

    if let Err(err) = starter::launch(&config) {
        error!("{err}");
        dialog::show_error(&err.to_string());
        std::process::exit(err.exit_code());
    }
}

#[cfg(not(windows))]
fn main() {
    eprintln!("the mod starter only runs on Windows");
    std::process::exit(1);
}
