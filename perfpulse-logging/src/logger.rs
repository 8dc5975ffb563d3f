use crate::{Error, Result};
use log::{info, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::{Config, Handle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

const LOG_FORMAT_CONSOLE: &str = "\x1B[37m{d(%Y-%m-%d %H:%M:%S%.3f)}\x1B[0m {h({l:>5.5})} \x1B[37m---\x1B[0m \x1B[37m[{T:>15.15}]\x1B[0m \x1B[36m{t:<50.50}\x1B[0m \x1B[37m:\x1B[0m {m}{n}";
const LOG_FORMAT_FILE: &str =
    "{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l:>5.5})} --- [{T:>15.15}] {t:<50.50} : {m}{n}";
const CONSOLE_APPENDER: &str = "stdout";
const FILE_APPENDER: &str = "file";
const LOG_FILE_SIZE: u64 = 20 * 1024 * 1024;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// The log4rs based logger of the sampling engine host process.
/// It installs a console appender and an optional size-rolled file appender.
#[derive(Debug)]
pub struct PulseLogger {
    handle: Handle,
}

impl PulseLogger {
    /// Returns a builder instance for the logger.
    pub fn builder() -> PulseLoggerBuilder {
        PulseLoggerBuilder::default()
    }

    /// Create a new logging instance.
    pub fn new(
        root_level: LevelFilter,
        log_path: Option<impl AsRef<Path>>,
        loggers: Vec<(String, LevelFilter)>,
    ) -> Result<Self> {
        if INITIALIZED.load(Ordering::Relaxed) {
            return Err(Error::AlreadyInitialized);
        }

        INITIALIZED.store(true, Ordering::Relaxed);
        let config = Self::create_config(root_level, log_path, loggers)?;
        let handle =
            log4rs::init_config(config).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        info!("Perfpulse logger has been initialized");
        Ok(Self { handle })
    }

    /// Returns the root logging level of the logger.
    pub fn root_log_level(&self) -> LevelFilter {
        self.handle.max_log_level()
    }

    fn create_config(
        root_level: LevelFilter,
        log_path: Option<impl AsRef<Path>>,
        loggers: Vec<(String, LevelFilter)>,
    ) -> Result<Config> {
        let mut root = Root::builder().appender(CONSOLE_APPENDER);
        let mut config_builder = Config::builder().appender(
            Appender::builder().build(
                CONSOLE_APPENDER,
                Box::new(
                    ConsoleAppender::builder()
                        .encoder(Box::new(PatternEncoder::new(LOG_FORMAT_CONSOLE)))
                        .build(),
                ),
            ),
        );

        // append the file logger, if one is given
        if let Some(path) = log_path {
            config_builder = config_builder.appender(Self::create_file_appender(path)?);
            root = root.appender(FILE_APPENDER);
        }

        // configure the package log levels
        for (logger, level) in loggers.into_iter() {
            config_builder = config_builder.logger(Logger::builder().build(logger, level));
        }

        config_builder
            .build(root.build(root_level))
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    fn create_file_appender(path: impl AsRef<Path>) -> Result<Appender> {
        if let Err(e) = path
            .as_ref()
            .parent()
            .map(std::fs::create_dir_all)
            .transpose()
        {
            if e.kind() != std::io::ErrorKind::AlreadyExists {
                return Err(Error::from(e));
            }
        }

        let policy = CompoundPolicy::new(
            Box::new(SizeTrigger::new(LOG_FILE_SIZE)),
            Box::new(
                FixedWindowRoller::builder()
                    .base(1)
                    .build("perfpulse.{}.log", 3)
                    .expect("expected the window roller to be valid"),
            ),
        );

        Ok(Appender::builder().build(
            FILE_APPENDER,
            Box::new(
                RollingFileAppender::builder()
                    .encoder(Box::new(PatternEncoder::new(LOG_FORMAT_FILE)))
                    .append(false)
                    .build(path, Box::new(policy))
                    .map_err(|e| Error::InvalidConfig(e.to_string()))?,
            ),
        ))
    }
}

#[derive(Debug, Default)]
pub struct PulseLoggerBuilder {
    root_level: Option<LevelFilter>,
    log_path: Option<PathBuf>,
    loggers: HashMap<String, LevelFilter>,
}

impl PulseLoggerBuilder {
    /// Set the root level of the logger.
    pub fn root_level(&mut self, level: LevelFilter) -> &mut Self {
        self.root_level = Some(level);
        self
    }

    /// Set the log file path of the logger.
    pub fn log_path(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.log_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Add a log level filter for the given package.
    pub fn logger<S: AsRef<str>>(&mut self, package: S, level: LevelFilter) -> &mut Self {
        self.loggers.insert(package.as_ref().to_string(), level);
        self
    }

    /// Consumes the [PulseLoggerBuilder] and creates a new logging instance.
    pub fn build(&mut self) -> Result<PulseLogger> {
        let root_level = self.root_level.take().unwrap_or(LevelFilter::Info);
        let log_path = self.log_path.take();
        let loggers = self.loggers.drain().collect::<Vec<_>>();

        PulseLogger::new(root_level, log_path, loggers)
    }
}
