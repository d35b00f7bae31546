use anyhow::{Context, Result};
use chrono::Local;
use log::{Level, LevelFilter};
use std::cell::RefCell;
use std::fs::File;
use std::io::{LineWriter, Write};
use std::path::Path;

/// Log handle shared by every component of a run.
///
/// Messages go to two sinks: the screen (stderr) and the run log file, each
/// with its own verbosity threshold. The handle is created once at process
/// start, handed to the components that need it, and closed at process end.
pub struct Logger {
    screen_threshold: LevelFilter,
    file_threshold: LevelFilter,
    file: RefCell<LineWriter<File>>,
}

impl Logger {
    pub fn create(
        path: &Path,
        screen_threshold: LevelFilter,
        file_threshold: LevelFilter,
    ) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;

        Ok(Self {
            screen_threshold,
            file_threshold,
            file: RefCell::new(LineWriter::new(file)),
        })
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(Level::Error, message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.log(Level::Warn, message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(Level::Info, message.as_ref());
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(Level::Debug, message.as_ref());
    }

    fn log(&self, level: Level, message: &str) {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");

        if level <= self.screen_threshold {
            eprintln!("{} {} {}", timestamp, level, message);
        }
        if level <= self.file_threshold {
            // A log file write failure must not abort the build.
            let _ = writeln!(self.file.borrow_mut(), "{} {} {}", timestamp, level, message);
        }
    }

    pub fn close(self) -> Result<()> {
        self.file
            .into_inner()
            .flush()
            .with_context(|| "Failed to flush log file")
    }
}

#[cfg(test)]
mod tests {
    use super::Logger;
    use log::LevelFilter;
    use std::fs;

    #[test]
    fn test_messages_below_file_threshold_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let log_file = dir.path().join("test.log");

        let logger = Logger::create(&log_file, LevelFilter::Off, LevelFilter::Info).unwrap();
        logger.info("recorded");
        logger.debug("dropped");
        logger.close().unwrap();

        let contents = fs::read_to_string(&log_file).unwrap();
        assert!(contents.contains("recorded"));
        assert!(!contents.contains("dropped"));
    }

    #[test]
    fn test_messages_are_written_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log_file = dir.path().join("test.log");

        let logger = Logger::create(&log_file, LevelFilter::Off, LevelFilter::Debug).unwrap();
        logger.info("first");
        logger.warn("second");
        logger.debug("third");
        logger.close().unwrap();

        let contents = fs::read_to_string(&log_file).unwrap();
        let first = contents.find("first").unwrap();
        let second = contents.find("second").unwrap();
        let third = contents.find("third").unwrap();
        assert!(first < second && second < third);
    }
}
