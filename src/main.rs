use anyhow::Result;
use tracing::info;

use shuk_ingest::promo::PromoRunner;
use shuk_ingest::util::{db::Db, env};
use shuk_ingest::{ChainMap, IngestConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env first so RUST_LOG is picked up
    env::init_env();
    shuk_ingest::tracing::init_tracing("info")?;

    let cfg = IngestConfig::from_env();
    let db_url = env::db_url()?;
    let db = Db::connect(&db_url, cfg.max_connections).await?;

    let runner = PromoRunner::new(db, cfg, ChainMap::default());
    let summary = runner.run().await?;

    info!(
        promotions = summary.promotions,
        items = summary.items,
        files_ok = summary.files_ok,
        files_failed = summary.files_failed,
        files_skipped = summary.files_skipped,
        row_skips = summary.skips.total(),
        "promo ingestion finished"
    );
    // Machine-readable one-liner for the cron wrapper.
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}
