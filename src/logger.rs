use malooer::Logger;
use std::io::{self, Write};

use std::fs;

/// Wire trace: everything sent and received, prefixed `C: ` / `S: ` whenever
/// the direction changes.
pub(crate) struct FileLogger {
    pub(crate) enabled: bool,
    pub(crate) file: Option<fs::File>,
    pub(crate) is_client: bool,
    pub(crate) is_server: bool,
}

impl FileLogger {
    fn open(path: &str) -> io::Result<fs::File> {
        fs::OpenOptions::new().append(true).create(true).open(path)
    }
    pub(crate) fn file(path: &str) -> io::Result<FileLogger> {
        Ok(FileLogger {
            enabled: true,
            file: Some(FileLogger::open(path)?),
            is_client: false,
            is_server: false,
        })
    }
    pub(crate) fn none() -> FileLogger {
        FileLogger {
            enabled: false,
            file: None,
            is_client: false,
            is_server: false,
        }
    }
    pub(crate) fn new(path: Option<&str>) -> io::Result<FileLogger> {
        match path {
            Some(logfile) => FileLogger::file(logfile),
            None => Ok(FileLogger::none()),
        }
    }
}

impl Logger for FileLogger {
    fn client(&mut self, data: &[u8]) {
        let file = if let Some(f) = self.file.as_mut() {
            f
        } else {
            return;
        };

        if self.enabled {
            if !self.is_client {
                self.is_client = true;
                self.is_server = false;
                let _ = file.write_all("C: ".as_bytes());
            }
            let _ = file.write_all(data);
        }
    }

    fn server(&mut self, data: &[u8]) {
        let file = if let Some(f) = self.file.as_mut() {
            f
        } else {
            return;
        };

        if self.enabled {
            if !self.is_server {
                self.is_server = true;
                self.is_client = false;
                let _ = file.write_all("S: ".as_bytes());
            }
            let _ = file.write_all(data);
        }
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn enable(&mut self) {
        self.enabled = self.file.is_some();
    }
}

impl Drop for FileLogger {
    fn drop(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
    }
}
