use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::events::LogRecord;

/// Appends log records as JSON lines to a daily file (`app-YYYY-MM-DD.log`).
pub struct JsonLog {
    dir: PathBuf,
}

impl JsonLog {
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn current_file(&self) -> PathBuf {
        let date = chrono::Local::now().format("%Y-%m-%d");
        self.dir.join(format!("app-{}.log", date))
    }

    pub fn append(&self, record: &LogRecord) -> Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_file())?;
        writeln!(file, "{}", serde_json::to_string(record)?)?;
        Ok(())
    }
}
