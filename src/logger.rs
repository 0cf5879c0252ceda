use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

/// Diagnostics go to stderr so they never mix with the session on stdout.
pub fn init(verbose: bool) {
    let level = if verbose { LevelFilter::Info } else { LevelFilter::Warn };
    let _ = TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto);
}
