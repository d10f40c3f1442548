use std::path::Path;

use crate::{config::LoggingConfig, error::Error};

/// Install the global logger, writing to stdout and, if configured, to daily log files.
pub fn setup_logger(config: &LoggingConfig) -> Result<(), Error> {
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}]{}[{}] {}",
                record.level(),
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S]"),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .level_for("booru_server", config.level)
        .chain(std::io::stdout());

    if let Some(ref log_dir) = config.log_dir {
        // fern does not create the directory itself
        if !Path::new(log_dir).exists() {
            std::fs::create_dir_all(log_dir).map_err(|e| {
                Error::LoggingSetupError(format!("Failed to create {log_dir}: {e}"))
            })?;
        }
        let mut prefix = log_dir.clone();
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        dispatch = dispatch.chain(fern::DateBased::new(prefix, "logs_%Y-%m-%d.log"));
    }

    dispatch
        .apply()
        .map_err(|e| Error::LoggingSetupError(e.to_string()))
}
