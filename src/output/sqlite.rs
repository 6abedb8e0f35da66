use super::{OutputHandler, slug};
use crate::error::Result;
use crate::normalize::MetricValue;
use crate::table::{Cell, Table};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use std::path::PathBuf;

/// One table per dataset, `<prefix>_<dataset>`, replaced on every export.
pub struct SqliteOutput {
    pool: SqlitePool,
    table_prefix: String,
}

impl SqliteOutput {
    pub async fn new(path: PathBuf, table_prefix: String) -> Result<Self> {
        let conn_str = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&conn_str).await?;
        Ok(Self { pool, table_prefix })
    }

    pub fn table_name(&self, dataset: &str) -> String {
        format!("{}_{}", slug(&self.table_prefix), slug(dataset))
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
impl OutputHandler for SqliteOutput {
    async fn write(&mut self, name: &str, table: &Table) -> Result<()> {
        let table_name = quote_ident(&self.table_name(name));
        let columns: Vec<String> = table.headers().iter().map(|h| quote_ident(h)).collect();
        if columns.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table_name))
            .execute(&mut *tx)
            .await?;

        // Untyped columns keep each value's storage class as bound.
        let mut defs = vec!["\"_row\" INTEGER PRIMARY KEY".to_string()];
        defs.extend(columns.iter().cloned());
        sqlx::query(&format!("CREATE TABLE {} ({})", table_name, defs.join(", ")))
            .execute(&mut *tx)
            .await?;

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table_name,
            columns.join(", "),
            placeholders.join(", ")
        );

        for row in table.rows() {
            let mut q = sqlx::query(&insert);
            for cell in row {
                q = match cell {
                    None => q.bind(Option::<String>::None),
                    Some(Cell::Text(s)) => q.bind(s.clone()),
                    Some(Cell::Metric(MetricValue::Count(n))) => q.bind(*n as i64),
                    Some(Cell::Metric(MetricValue::Millions(m))) => q.bind(*m),
                };
            }
            q.execute(&mut *tx).await?;
        }

        tx.commit().await?;
        log::info!("Wrote {} rows of '{}' to table {}", table.len(), name, table_name);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
