//! Batch reconciliation: one idempotent multi-row upsert for promotion
//! headers (RETURNING the durable ids), then one multi-row insert for the
//! (promotion, product) associations. Both run inside the caller's
//! transaction and are paged to bound statement size.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use sqlx::{Postgres, QueryBuilder, Row, Transaction};
use tracing::debug;

use super::mapper::{FileBatch, HeaderDraft};
use super::resolve::BarcodeMap;

#[derive(Debug, Default, Clone, Copy)]
pub struct UpsertTotals {
    pub promotions: u64,
    pub items: u64,
}

pub async fn upsert_batch(
    tx: &mut Transaction<'_, Postgres>,
    batch: &FileBatch,
    barcodes: &BarcodeMap,
    promo_page_size: usize,
    item_page_size: usize,
) -> Result<UpsertTotals> {
    if batch.headers.is_empty() {
        return Ok(UpsertTotals::default());
    }

    // Header upsert, last-file-wins: snapshots are full current state, so the
    // newest file's values overwrite the mutable fields on conflict.
    let mut durable: HashMap<(i64, String), i64> = HashMap::with_capacity(batch.headers.len());
    for chunk in batch.headers.chunks(promo_page_size.max(1)) {
        let mut qb = header_upsert_query(chunk);
        let rows = qb
            .build()
            .persistent(false)
            .fetch_all(&mut **tx)
            .await
            .context("upsert promotion headers")?;
        for row in rows {
            let id: i64 = row.try_get("id")?;
            let store_id: i64 = row.try_get("store_id")?;
            let chain_promotion_id: String = row.try_get("chain_promotion_id")?;
            durable.insert((store_id, chain_promotion_id), id);
        }
    }

    // Provisional index -> durable id, in header order.
    let promo_ids: Vec<Option<i64>> = batch
        .headers
        .iter()
        .map(|h| {
            durable
                .get(&(h.store_id, h.chain_promotion_id.clone()))
                .copied()
        })
        .collect();

    let pairs = translate_item_pairs(&batch.items, &promo_ids, barcodes);
    debug!(
        headers = batch.headers.len(),
        raw_items = batch.items.len(),
        unique_items = pairs.len(),
        "reconciled batch"
    );

    for chunk in pairs.chunks(item_page_size.max(1)) {
        let mut qb = item_insert_query(chunk);
        qb.build()
            .persistent(false)
            .execute(&mut **tx)
            .await
            .context("insert promotion items")?;
    }

    Ok(UpsertTotals {
        promotions: batch.headers.len() as u64,
        items: pairs.len() as u64,
    })
}

/// Multi-row header upsert for one page. The conflict target is the natural
/// key (store_id, chain_promotion_id); on conflict every mutable field takes
/// the incoming value, so re-running the same file is a no-op and a newer
/// snapshot overwrites an older one. RETURNING hands back the durable ids.
fn header_upsert_query(chunk: &[HeaderDraft]) -> QueryBuilder<'_, Postgres> {
    let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(
        "INSERT INTO promotion (store_id, chain_promotion_id, description, start_date, end_date, discounted_price, min_qty, is_club_only) ",
    );
    qb.push_values(chunk, |mut b, h| {
        b.push_bind(h.store_id)
            .push_bind(&h.chain_promotion_id)
            .push_bind(&h.description)
            .push_bind(h.start_date)
            .push_bind(h.end_date)
            .push_bind(&h.discounted_price)
            .push_bind(h.min_qty)
            .push_bind(h.is_club_only);
    });
    qb.push(
        " ON CONFLICT (store_id, chain_promotion_id)
          DO UPDATE SET description = EXCLUDED.description,
                        start_date = EXCLUDED.start_date,
                        end_date = EXCLUDED.end_date,
                        discounted_price = EXCLUDED.discounted_price,
                        min_qty = EXCLUDED.min_qty,
                        is_club_only = EXCLUDED.is_club_only
          RETURNING id, store_id, chain_promotion_id",
    );
    qb
}

/// Multi-row association insert for one page. The pairs are already unique;
/// ON CONFLICT DO NOTHING covers rows that survive from an earlier run.
fn item_insert_query(chunk: &[(i64, i64)]) -> QueryBuilder<'_, Postgres> {
    let mut qb: QueryBuilder<'_, Postgres> =
        QueryBuilder::new("INSERT INTO promotion_item (promotion_id, product_id) ");
    qb.push_values(chunk, |mut b, (promotion_id, product_id)| {
        b.push_bind(promotion_id).push_bind(product_id);
    });
    qb.push(" ON CONFLICT DO NOTHING");
    qb
}

/// Translate (provisional index, barcode) pairs into unique
/// (promotion id, product id) pairs. Unknown barcodes and unreturned
/// headers drop silently; the result is sorted for deterministic statements.
fn translate_item_pairs(
    items: &[(usize, String)],
    promo_ids: &[Option<i64>],
    barcodes: &BarcodeMap,
) -> Vec<(i64, i64)> {
    let mut seen: HashSet<(i64, i64)> = HashSet::with_capacity(items.len());
    for (idx, barcode) in items {
        let Some(promotion_id) = promo_ids.get(*idx).copied().flatten() else {
            continue;
        };
        let Some(product_id) = barcodes.resolve(barcode) else {
            continue;
        };
        seen.insert((promotion_id, product_id));
    }
    let mut pairs: Vec<(i64, i64)> = seen.into_iter().collect();
    pairs.sort_unstable();
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(store_id: i64, chain_promotion_id: &str) -> HeaderDraft {
        HeaderDraft {
            store_id,
            chain_promotion_id: chain_promotion_id.to_string(),
            description: "test promo".to_string(),
            start_date: None,
            end_date: None,
            discounted_price: None,
            min_qty: None,
            is_club_only: false,
        }
    }

    #[test]
    fn header_upsert_targets_natural_key_and_overwrites_on_conflict() {
        let chunk = vec![draft(1, "p-1"), draft(2, "p-2")];
        let mut qb = header_upsert_query(&chunk);
        let sql = qb.sql();
        assert!(sql.contains("ON CONFLICT (store_id, chain_promotion_id)"));
        assert!(sql.contains("DO UPDATE SET description = EXCLUDED.description"));
        assert!(sql.contains("discounted_price = EXCLUDED.discounted_price"));
        assert!(sql.contains("is_club_only = EXCLUDED.is_club_only"));
        assert!(sql.contains("RETURNING id, store_id, chain_promotion_id"));
    }

    #[test]
    fn item_insert_ignores_existing_pairs() {
        let chunk = vec![(100_i64, 1_i64), (100, 2)];
        let mut qb = item_insert_query(&chunk);
        let sql = qb.sql();
        assert!(sql.starts_with("INSERT INTO promotion_item (promotion_id, product_id)"));
        assert!(sql.ends_with("ON CONFLICT DO NOTHING"));
    }

    #[test]
    fn duplicate_pairs_collapse() {
        let items = vec![
            (0, "7290000000001".to_string()),
            (0, "7290000000001".to_string()),
            (0, "7290000000002".to_string()),
        ];
        let promo_ids = vec![Some(100)];
        let barcodes = BarcodeMap::from_pairs([
            ("7290000000001".to_string(), 1),
            ("7290000000002".to_string(), 2),
        ]);
        assert_eq!(
            translate_item_pairs(&items, &promo_ids, &barcodes),
            vec![(100, 1), (100, 2)]
        );
    }

    #[test]
    fn unknown_barcode_drops_only_that_pair() {
        let items = vec![
            (0, "7290000000001".to_string()),
            (0, "0000000000000".to_string()),
        ];
        let promo_ids = vec![Some(100)];
        let barcodes = BarcodeMap::from_pairs([("7290000000001".to_string(), 1)]);
        assert_eq!(
            translate_item_pairs(&items, &promo_ids, &barcodes),
            vec![(100, 1)]
        );
    }

    #[test]
    fn missing_durable_id_drops_the_pair() {
        let items = vec![(0, "7290000000001".to_string())];
        let promo_ids = vec![None];
        let barcodes = BarcodeMap::from_pairs([("7290000000001".to_string(), 1)]);
        assert!(translate_item_pairs(&items, &promo_ids, &barcodes).is_empty());
    }

    #[test]
    fn same_barcode_under_two_promotions_is_kept() {
        let items = vec![
            (0, "7290000000001".to_string()),
            (1, "7290000000001".to_string()),
        ];
        let promo_ids = vec![Some(100), Some(101)];
        let barcodes = BarcodeMap::from_pairs([("7290000000001".to_string(), 1)]);
        assert_eq!(
            translate_item_pairs(&items, &promo_ids, &barcodes),
            vec![(100, 1), (101, 1)]
        );
    }
}
