use super::{OutputHandler, slug};
use crate::error::Result;
use crate::table::Table;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// CSV export. A lone dataset goes to `path`; several go to `<stem>_<dataset>.<ext>`.
pub struct CsvOutput {
    path: PathBuf,
    pending: Vec<(String, Table)>,
}

impl CsvOutput {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            pending: Vec::new(),
        }
    }

    fn target(&self, name: &str) -> PathBuf {
        if self.pending.len() <= 1 {
            return self.path.clone();
        }
        let stem = self.path.file_stem().and_then(|s| s.to_str()).unwrap_or("export");
        let ext = self.path.extension().and_then(|s| s.to_str()).unwrap_or("csv");
        self.path.with_file_name(format!("{}_{}.{}", stem, slug(name), ext))
    }
}

fn write_table(path: &Path, table: &Table) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(table.headers())?;
    for row in table.rows() {
        writer.write_record(
            row.iter()
                .map(|cell| cell.as_ref().map(|c| c.to_string()).unwrap_or_default()),
        )?;
    }
    writer.flush()?;
    Ok(())
}

#[async_trait]
impl OutputHandler for CsvOutput {
    async fn write(&mut self, name: &str, table: &Table) -> Result<()> {
        self.pending.push((name.to_string(), table.clone()));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        for (name, table) in &self.pending {
            let path = self.target(name);
            write_table(&path, table)?;
            log::info!("Wrote {} rows of '{}' to {}", table.len(), name, path.display());
        }
        self.pending.clear();
        Ok(())
    }
}
