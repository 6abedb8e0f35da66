use crate::error::Result;
use crate::session::Session;
use crate::table::Table;
use async_trait::async_trait;

pub mod console;
pub mod csv;
pub mod json;
pub mod sqlite;

/// Destination for enriched tables.
#[async_trait]
pub trait OutputHandler: Send + Sync {
    async fn write(&mut self, name: &str, table: &Table) -> Result<()>;
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes every dataset in `session`, then closes the handler. Returns how many were written.
pub async fn export_session(session: &Session, handler: &mut dyn OutputHandler) -> Result<usize> {
    let mut written = 0;
    for (name, table) in session.datasets() {
        handler.write(name, table).await?;
        written += 1;
    }
    handler.close().await?;
    log::info!("Exported {} dataset(s)", written);
    Ok(written)
}

/// Reduces a dataset name to something safe inside a file or table name.
pub(crate) fn slug(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect()
}
