// Logging setup
//
// Level comes from config.toml, RUST_LOG overrides it. With
// `debug.log_to_file` set, output goes to the log file instead of stderr.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::Write;

use crate::config::Config;

/// Parse a config level name; unknown names fall back to Info
pub fn level_filter(name: &str) -> log::LevelFilter {
    match name.parse() {
        Ok(level) => level,
        Err(_) => {
            eprintln!("Unknown log level {:?}, using info", name);
            log::LevelFilter::Info
        }
    }
}

/// Install the global logger. Call once, before anything logs.
pub fn init_logging(config: &Config) -> Result<()> {
    use env_logger::{Builder, Env, Target};

    let env = Env::default().default_filter_or(level_filter(&config.debug.log_level).as_str());
    let mut builder = Builder::from_env(env);

    // Create/clear log file if enabled
    if config.debug.log_to_file {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
            .with_context(|| format!("Failed to open log file {:?}", config.debug.log_file))?;
        writeln!(file, "=== Vulkan Demo Log ===")?;
        writeln!(file, "Started: {:?}", std::time::SystemTime::now())?;
        writeln!(file)?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.try_init().context("Logger already initialized")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::LevelFilter;

    #[test]
    fn config_level_names() {
        assert_eq!(level_filter("debug"), LevelFilter::Debug);
        assert_eq!(level_filter("WARN"), LevelFilter::Warn);
        assert_eq!(level_filter("off"), LevelFilter::Off);
        assert_eq!(level_filter("loud"), LevelFilter::Info);
    }
}
