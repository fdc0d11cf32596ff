use anyhow::Result;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool,
};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Wrapper around the Postgres pool that remembers enough to rebuild itself
/// after a lost connection.
#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
    url: String,
    max_connections: u32,
}

impl Db {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let use_prepared = crate::util::env::env_flag("USE_PREPARED", false);
        let mut connect_options = PgConnectOptions::from_str(database_url)?;

        // Be explicit about TLS when the DSN demands it.
        if database_url.contains("sslmode=require") && !database_url.contains("sslmode=disable") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }

        if !use_prepared {
            // PgBouncer txn mode safe
            connect_options = connect_options.statement_cache_capacity(0);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await?;
        info!("connected to db");
        Ok(Self {
            pool,
            url: database_url.to_string(),
            max_connections,
        })
    }

    /// Cheap liveness check used after a per-file failure to distinguish a
    /// data/constraint error from a lost connection.
    pub async fn probe(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .persistent(false)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Close the current pool and open a fresh one against the same DSN.
    /// Callers treat a failure here as fatal: no further work is possible
    /// without a connection.
    #[instrument(skip(self))]
    pub async fn reconnect(&mut self) -> Result<()> {
        warn!("reopening database connection");
        self.pool.close().await;
        let fresh = Self::connect(&self.url, self.max_connections).await?;
        self.pool = fresh.pool;
        Ok(())
    }
}
