use super::OutputHandler;
use crate::error::{Error, Result};
use crate::table::Table;
use async_trait::async_trait;
use indicatif::MultiProgress;
use std::sync::Arc;

/// Prints tables as tab-separated lines, above any live progress bars.
pub struct ConsoleOutput {
    multi: Option<Arc<MultiProgress>>,
}

impl ConsoleOutput {
    pub fn new(multi: Option<Arc<MultiProgress>>) -> Self {
        Self { multi }
    }

    fn emit(&self, line: &str) -> Result<()> {
        match &self.multi {
            Some(multi) => multi.println(line).map_err(|e| Error::Internal(e.to_string())),
            None => {
                println!("{}", line);
                Ok(())
            }
        }
    }
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self::new(None)
    }
}

pub(crate) fn render_lines(name: &str, table: &Table) -> Vec<String> {
    let mut lines = Vec::with_capacity(table.len() + 2);
    lines.push(format!("== {} ({} rows)", name, table.len()));
    lines.push(table.headers().join("\t"));
    for row in table.rows() {
        let cells: Vec<String> = row
            .iter()
            .map(|cell| cell.as_ref().map(|c| c.to_string()).unwrap_or_default())
            .collect();
        lines.push(cells.join("\t"));
    }
    lines
}

#[async_trait]
impl OutputHandler for ConsoleOutput {
    async fn write(&mut self, name: &str, table: &Table) -> Result<()> {
        for line in render_lines(name, table) {
            self.emit(&line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cells_render_blank() {
        let table = Table::from_csv_reader("Track,URL\na,\n".as_bytes()).unwrap();
        let lines = render_lines("spotify", &table);
        assert_eq!(lines, vec!["== spotify (1 rows)", "Track\tURL", "a\t"]);
    }
}
