use clickhouse::Client;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to reach ClickHouse at {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: clickhouse::error::Error,
    },
}

#[derive(Clone)]
pub struct ClickHouseClient {
    client: Client,
    url: String,
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
            url: url.to_string(),
        }
    }

    /// Build a client for `host:port` over HTTP and verify it answers.
    pub async fn connect(
        host: &str,
        port: u16,
        database: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, ConnectionError> {
        let url = format!("http://{host}:{port}");
        info!(url = %url, database = %database, "Connecting to ClickHouse");

        let client = Self::new(&url, database, username, password);
        client
            .ping()
            .await
            .map_err(|source| ConnectionError::Unreachable { url, source })?;

        info!("Successfully connected to ClickHouse");
        Ok(client)
    }

    pub async fn ping(&self) -> Result<(), clickhouse::error::Error> {
        self.client.query("SELECT 1").fetch_one::<u8>().await?;
        Ok(())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn get_client(&self) -> &Client {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_keeps_url() {
        let client = ClickHouseClient::new("http://localhost:8123", "senml", "default", "");
        assert_eq!(client.url(), "http://localhost:8123");
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        // Port 1 is never a ClickHouse server
        let result = ClickHouseClient::connect("127.0.0.1", 1, "senml", "default", "").await;

        match result {
            Err(ConnectionError::Unreachable { url, .. }) => {
                assert_eq!(url, "http://127.0.0.1:1");
            }
            Ok(_) => panic!("Expected connection failure"),
        }
    }
}
