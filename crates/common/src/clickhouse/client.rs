use anyhow::{Context, Result};
use clickhouse::Client;

/// Shared handle to one ClickHouse database over HTTP
#[derive(Clone)]
pub struct ClickHouseClient {
    client: Client,
    database: String,
}

impl ClickHouseClient {
    pub fn new(url: &str, database: &str, username: &str, password: &str) -> Self {
        let client = Client::default()
            .with_url(url)
            .with_database(database)
            .with_user(username)
            .with_password(password)
            .with_compression(clickhouse::Compression::Lz4);

        Self {
            client,
            database: database.to_string(),
        }
    }

    pub async fn ping(&self) -> Result<()> {
        self.client
            .query("SELECT 1")
            .fetch_one::<u8>()
            .await
            .with_context(|| format!("ClickHouse database '{}' unreachable", self.database))?;
        Ok(())
    }

    /// Run a statement that returns no rows (DDL)
    pub async fn execute(&self, sql: &str) -> Result<()> {
        self.client
            .query(sql)
            .execute()
            .await
            .context("ClickHouse statement failed")?;
        Ok(())
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn get_client(&self) -> &Client {
        &self.client
    }
}
