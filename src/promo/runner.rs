//! The run loop: discover promo files, process each inside its own
//! transaction, roll back and continue on failure, reconnect once if the
//! connection itself is gone.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use tracing::{error, info, warn};

use crate::config::{ChainMap, IngestConfig};
use crate::util::db::Db;

use super::format::PromoFormat;
use super::mapper::{self, SkipCounters};
use super::reconcile::{self, UpsertTotals};
use super::resolve::{BarcodeMap, StoreDirectory};

/// Aggregate result of one run over all discovered files.
#[derive(Debug, Default, serde::Serialize)]
pub struct RunSummary {
    pub promotions: u64,
    pub items: u64,
    pub files_ok: u32,
    pub files_failed: u32,
    pub files_skipped: u32,
    pub skips: SkipCounters,
}

enum FileOutcome {
    Ingested(UpsertTotals, SkipCounters),
    Skipped(&'static str),
}

pub struct PromoRunner {
    db: Db,
    cfg: IngestConfig,
    chains: ChainMap,
}

impl PromoRunner {
    pub fn new(db: Db, cfg: IngestConfig, chains: ChainMap) -> Self {
        Self { db, cfg, chains }
    }

    /// Process every discovered file sequentially in filename order. The only
    /// fatal error is a connection loss that survives one reconnect attempt;
    /// everything else is isolated to its file.
    pub async fn run(mut self) -> Result<RunSummary> {
        let files = discover_files(&self.cfg.data_dir)?;
        let mut summary = RunSummary::default();
        if files.is_empty() {
            warn!(dir = %self.cfg.data_dir.display(), "no promo files found");
            return Ok(summary);
        }
        info!(files = files.len(), "starting promo ingestion");

        // One load for the whole run; the catalog is shared across chains.
        let barcodes = BarcodeMap::load(&self.db.pool).await?;
        info!(barcodes = barcodes.len(), "loaded barcode map");

        for path in files {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            let Some(chain) = self.chains.chain_for_stem(stem) else {
                warn!(file = %path.display(), "no chain mapping; skipping");
                summary.files_skipped += 1;
                continue;
            };

            info!(file = %path.display(), chain, "processing promo file");
            match self.process_file(&path, chain, &barcodes).await {
                Ok(FileOutcome::Ingested(totals, skips)) => {
                    info!(
                        promotions = totals.promotions,
                        items = totals.items,
                        row_skips = skips.total(),
                        "file committed"
                    );
                    summary.promotions += totals.promotions;
                    summary.items += totals.items;
                    summary.skips.absorb(&skips);
                    summary.files_ok += 1;
                }
                Ok(FileOutcome::Skipped(reason)) => {
                    warn!(file = %path.display(), reason, "file skipped");
                    summary.files_skipped += 1;
                }
                Err(e) => {
                    // The file's transaction was dropped unfinished, which
                    // rolls it back; earlier files stay committed.
                    error!(file = %path.display(), error = %e, "file failed; rolled back");
                    summary.files_failed += 1;
                    if self.db.probe().await.is_err() {
                        warn!("connection lost; attempting reconnect");
                        self.db
                            .reconnect()
                            .await
                            .context("reconnect after connection loss failed")?;
                    }
                }
            }
        }

        info!(
            promotions = summary.promotions,
            items = summary.items,
            files_ok = summary.files_ok,
            files_failed = summary.files_failed,
            files_skipped = summary.files_skipped,
            "run complete"
        );
        Ok(summary)
    }

    async fn process_file(
        &self,
        path: &Path,
        chain: &str,
        barcodes: &BarcodeMap,
    ) -> Result<FileOutcome> {
        let Some(format) = detect_format(path)? else {
            return Ok(FileOutcome::Skipped("unrecognized header set"));
        };
        let stores = StoreDirectory::load(&self.db.pool, chain).await?;
        if stores.is_empty() {
            return Ok(FileOutcome::Skipped("no stores for chain"));
        }

        let min_len = self
            .cfg
            .min_barcode_len
            .unwrap_or_else(|| format.default_min_barcode_len());
        info!(format = format.label(), min_barcode_len = min_len, "detected format");

        let batch = mapper::map_file(path, format, &stores, min_len)?;
        if batch.headers.is_empty() {
            return Ok(FileOutcome::Ingested(UpsertTotals::default(), batch.skips));
        }

        // One transaction per file: all-or-nothing.
        let mut tx = self.db.pool.begin().await?;
        let totals = reconcile::upsert_batch(
            &mut tx,
            &batch,
            barcodes,
            self.cfg.promo_page_size,
            self.cfg.item_page_size,
        )
        .await?;
        tx.commit().await?;
        Ok(FileOutcome::Ingested(totals, batch.skips))
    }
}

/// Classify a file from its header row alone.
fn detect_format(path: &Path) -> Result<Option<PromoFormat>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .from_reader(BufReader::new(file));
    let headers: Vec<String> = rdr
        .byte_headers()
        .context("read csv headers")?
        .iter()
        .map(|h| {
            String::from_utf8_lossy(h)
                .trim_start_matches('\u{feff}')
                .trim()
                .to_ascii_lowercase()
        })
        .collect();
    Ok(PromoFormat::detect(&headers))
}

/// Find promo snapshot files in lexicographic order: full snapshots first
/// choice, plain `promo_file_` as the fallback generation. `_temp` working
/// files and empty files are excluded.
fn discover_files(data_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut full = Vec::new();
    let mut plain = Vec::new();
    let entries = std::fs::read_dir(data_dir)
        .with_context(|| format!("read promo data dir {}", data_dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if !name.ends_with(".csv") || name.contains("_temp") {
            continue;
        }
        if path.metadata().map(|m| m.len()).unwrap_or(0) == 0 {
            continue;
        }
        if name.starts_with("promo_full_file_") {
            full.push(path);
        } else if name.starts_with("promo_file_") {
            plain.push(path);
        }
    }
    let mut files = if full.is_empty() { plain } else { full };
    files.sort();
    Ok(files)
}
