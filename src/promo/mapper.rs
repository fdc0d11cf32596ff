//! Streams one promo CSV into a complete in-memory record set: provisional
//! promotion headers keyed by (store, chain promotion id) plus
//! (header index, barcode) pairs. Nothing touches the database here, which
//! is what makes exact deduplication possible before the transactional phase.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use csv::ReaderBuilder;
use tracing::debug;

use super::fields;
use super::format::PromoFormat;
use super::items::{self, ItemDecode};
use super::resolve::StoreDirectory;

/// One promotion header as read from the file, pre-upsert. The position in
/// `FileBatch::headers` is its provisional index.
#[derive(Debug, Clone)]
pub struct HeaderDraft {
    pub store_id: i64,
    pub chain_promotion_id: String,
    pub description: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub discounted_price: Option<BigDecimal>,
    pub min_qty: Option<i32>,
    pub is_club_only: bool,
}

/// Per-file counts of locally recovered errors. Every skip is an explicit
/// outcome, not a swallowed exception.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SkipCounters {
    pub unknown_store_rows: u64,
    pub missing_promo_id_rows: u64,
    pub short_barcodes: u64,
    pub undecodable_cells: u64,
    pub malformed_rows: u64,
}

impl SkipCounters {
    pub fn absorb(&mut self, other: &SkipCounters) {
        self.unknown_store_rows += other.unknown_store_rows;
        self.missing_promo_id_rows += other.missing_promo_id_rows;
        self.short_barcodes += other.short_barcodes;
        self.undecodable_cells += other.undecodable_cells;
        self.malformed_rows += other.malformed_rows;
    }

    pub fn total(&self) -> u64 {
        self.unknown_store_rows
            + self.missing_promo_id_rows
            + self.short_barcodes
            + self.undecodable_cells
            + self.malformed_rows
    }
}

/// The complete record set for one file, ready for reconciliation.
#[derive(Debug, Default)]
pub struct FileBatch {
    pub headers: Vec<HeaderDraft>,
    /// (provisional header index, raw barcode) pairs in file order.
    pub items: Vec<(usize, String)>,
    pub skips: SkipCounters,
}

pub fn map_file(
    path: &Path,
    format: PromoFormat,
    stores: &StoreDirectory,
    min_barcode_len: usize,
) -> Result<FileBatch> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    map_reader(BufReader::new(file), format, stores, min_barcode_len)
}

pub fn map_reader<R: Read>(
    reader: R,
    format: PromoFormat,
    stores: &StoreDirectory,
    min_barcode_len: usize,
) -> Result<FileBatch> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(reader);

    // Column lookup by normalized name; first occurrence wins.
    let mut cols: HashMap<String, usize> = HashMap::new();
    for (i, h) in rdr.byte_headers().context("read csv headers")?.iter().enumerate() {
        let name = String::from_utf8_lossy(h)
            .trim_start_matches('\u{feff}')
            .trim()
            .to_ascii_lowercase();
        cols.entry(name).or_insert(i);
    }
    let field = |rec: &csv::ByteRecord, name: &str| -> String {
        cols.get(name)
            .and_then(|&i| rec.get(i))
            .map(|b| String::from_utf8_lossy(b).trim().to_string())
            .unwrap_or_default()
    };

    let item_col = match format {
        PromoFormat::ItemsAsDocument => "promotionitems",
        PromoFormat::ItemsAsGroups => "groups",
        PromoFormat::ItemsAsRows => "itemcode",
    };

    let mut batch = FileBatch::default();
    let mut key_to_idx: HashMap<(i64, String), usize> = HashMap::new();
    // Carry-forward state: blank cells inherit the last non-blank value.
    let mut current_store: Option<i64> = None;
    let mut current_promo: Option<String> = None;

    for rec in rdr.byte_records() {
        let rec = match rec {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "skipping malformed csv record");
                batch.skips.malformed_rows += 1;
                continue;
            }
        };

        let raw_store = field(&rec, "storeid");
        if !fields::blank(&raw_store) {
            // A non-blank cell always overwrites the current store, even when
            // it fails to resolve; later blank rows inherit the miss too.
            current_store = stores.resolve(&raw_store);
        }
        let Some(store_id) = current_store else {
            batch.skips.unknown_store_rows += 1;
            continue;
        };

        let raw_promo = field(&rec, "promotionid");
        if !fields::blank(&raw_promo) {
            current_promo = Some(raw_promo);
        } else if format != PromoFormat::ItemsAsRows {
            // Only the one-row-per-item dialect repeats headers implicitly.
            current_promo = None;
        }
        let Some(promo_id) = current_promo.clone() else {
            batch.skips.missing_promo_id_rows += 1;
            continue;
        };

        let key = (store_id, promo_id.clone());
        let idx = match key_to_idx.get(&key) {
            Some(&i) => i,
            None => {
                let i = batch.headers.len();
                batch.headers.push(HeaderDraft {
                    store_id,
                    chain_promotion_id: promo_id,
                    description: field(&rec, "promotiondescription"),
                    start_date: fields::parse_date(&field(&rec, "promotionstartdate")),
                    end_date: fields::parse_date(&field(&rec, "promotionenddate")),
                    discounted_price: fields::parse_decimal(&field(&rec, "discountedprice")),
                    min_qty: fields::parse_int(&field(&rec, "minqty")),
                    is_club_only: items::club_only(&field(&rec, "clubs")),
                });
                key_to_idx.insert(key, i);
                i
            }
        };

        match items::decode_items(format, &field(&rec, item_col)) {
            ItemDecode::Decoded(codes) => {
                for code in codes {
                    if code.len() < min_barcode_len {
                        batch.skips.short_barcodes += 1;
                        continue;
                    }
                    batch.items.push((idx, code));
                }
            }
            ItemDecode::Undecodable => batch.skips.undecodable_cells += 1,
        }
    }

    Ok(batch)
}
