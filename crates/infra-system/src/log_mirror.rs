// Per-execution log file mirror (verbose jobs)
// One append-only text file per execution: {dir}/{executionId}.log

use async_trait::async_trait;
use scrapeflow_core::domain::LogEntry;
use scrapeflow_core::error::Result;
use scrapeflow_core::port::LogMirror;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

pub struct FileLogMirror {
    dir: PathBuf,
}

impl FileLogMirror {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, execution_id: &str) -> PathBuf {
        self.dir.join(format!("{}.log", execution_id))
    }
}

#[async_trait]
impl LogMirror for FileLogMirror {
    async fn append(&self, entry: &LogEntry) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(&entry.execution_id))
            .await?;
        let mut line = entry.to_line();
        line.push('\n');
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
