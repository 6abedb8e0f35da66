use super::OutputHandler;
use crate::error::Result;
use crate::table::Table;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// One JSON document: `{ "<dataset>": [ {row}, ... ], ... }`, written on close.
pub struct JsonOutput {
    path: PathBuf,
    datasets: Map<String, Value>,
}

impl JsonOutput {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            datasets: Map::new(),
        }
    }
}

#[async_trait]
impl OutputHandler for JsonOutput {
    async fn write(&mut self, name: &str, table: &Table) -> Result<()> {
        let rows = table.records().into_iter().map(Value::Object).collect();
        self.datasets.insert(name.to_string(), Value::Array(rows));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        let body = serde_json::to_vec_pretty(&self.datasets)?;
        tokio::fs::write(&self.path, body).await?;
        log::info!("Wrote {}", self.path.display());
        Ok(())
    }
}
