use std::path::PathBuf;

use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;

/// Initializes the global logger. Verbosity follows the CLI's repeated
/// `-v` flag (0 => warn, 1 => info, 2 => debug, 3+ => trace); `--log-filepath`
/// additionally tees logs to a file appender so a region-driver run leaves a
/// durable record behind.
pub fn init_logging(verbosity: u8, log_filepath: Option<&PathBuf>) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let stderr = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} {l:<5} [{t}] {m}{n}",
        )))
        .target(log4rs::append::console::Target::Stderr)
        .build();

    let mut config_builder =
        Config::builder().appender(Appender::builder().build("stderr", Box::new(stderr)));
    let mut root_builder = Root::builder().appender("stderr");

    if let Some(path) = log_filepath {
        if let Ok(file) = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(
                "{d(%Y-%m-%d %H:%M:%S)} {l:<5} [{t}] {m}{n}",
            )))
            .build(path)
        {
            config_builder =
                config_builder.appender(Appender::builder().build("file", Box::new(file)));
            root_builder = root_builder.appender("file");
        }
    }

    let config = config_builder
        .logger(Logger::builder().build("rust_htslib", LevelFilter::Warn))
        .build(root_builder.build(level));

    if let Ok(config) = config {
        // A second call (e.g. in tests that invoke the CLI entry point more
        // than once) would error on re-init; ignore, first logger wins.
        let _ = log4rs::init_config(config);
    }
}
