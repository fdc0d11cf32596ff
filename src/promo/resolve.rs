//! Identity resolution: chain-local store codes -> internal store ids and
//! barcodes -> internal product ids. Both tables are loaded up front and
//! treated as read-only for the rest of their scope (store maps per file,
//! the barcode map per run).

use std::collections::HashMap;

use anyhow::{Context, Result};
use sqlx::PgPool;

/// Store-code lookup for one retailer chain.
///
/// Chains disagree on zero-padding, so every numeric code is indexed under
/// both its raw spelling and its leading-zero-stripped form: `"007"` resolves
/// against a directory that only knows `"7"`, and vice versa.
#[derive(Debug, Default)]
pub struct StoreDirectory {
    codes: HashMap<String, i64>,
}

impl StoreDirectory {
    pub async fn load(pool: &PgPool, chain: &str) -> Result<Self> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT s.store_code, s.id
             FROM store s
             JOIN retailer_chain rc ON rc.id = s.chain_id
             WHERE rc.name = $1",
        )
        .bind(chain)
        .fetch_all(pool)
        .await
        .with_context(|| format!("load store directory for chain {chain}"))?;
        Ok(Self::from_pairs(rows))
    }

    pub fn from_pairs<I: IntoIterator<Item = (String, i64)>>(pairs: I) -> Self {
        let mut codes = HashMap::new();
        for (code, id) in pairs {
            if let Some(stripped) = strip_zeros(&code) {
                codes.entry(stripped).or_insert(id);
            }
            codes.insert(code, id);
        }
        Self { codes }
    }

    pub fn resolve(&self, code: &str) -> Option<i64> {
        if let Some(&id) = self.codes.get(code) {
            return Some(id);
        }
        strip_zeros(code).and_then(|c| self.codes.get(&c).copied())
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Barcode -> product id for the whole catalog, shared across all chains'
/// files in one run. Promotion files reference already-known products;
/// misses are dropped, never created.
#[derive(Debug, Default)]
pub struct BarcodeMap {
    barcodes: HashMap<String, i64>,
}

impl BarcodeMap {
    pub async fn load(pool: &PgPool) -> Result<Self> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT barcode, id FROM product WHERE barcode IS NOT NULL")
                .fetch_all(pool)
                .await
                .context("load barcode map")?;
        Ok(Self {
            barcodes: rows.into_iter().collect(),
        })
    }

    pub fn from_pairs<I: IntoIterator<Item = (String, i64)>>(pairs: I) -> Self {
        Self {
            barcodes: pairs.into_iter().collect(),
        }
    }

    pub fn resolve(&self, barcode: &str) -> Option<i64> {
        self.barcodes.get(barcode).copied()
    }

    pub fn len(&self) -> usize {
        self.barcodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.barcodes.is_empty()
    }
}

/// Integer-normalized form of a purely numeric code ("007" -> "7").
/// Non-numeric codes have no alternate spelling.
fn strip_zeros(code: &str) -> Option<String> {
    if code.is_empty() || !code.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let stripped = code.trim_start_matches('0');
    Some(if stripped.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dir(pairs: &[(&str, i64)]) -> StoreDirectory {
        StoreDirectory::from_pairs(pairs.iter().map(|(c, id)| (c.to_string(), *id)))
    }

    #[test]
    fn exact_code_wins() {
        let d = dir(&[("007", 1), ("7", 2)]);
        assert_eq!(d.resolve("007"), Some(1));
        assert_eq!(d.resolve("7"), Some(2));
    }

    #[test]
    fn padded_code_resolves_against_unpadded_directory() {
        let d = dir(&[("7", 2)]);
        assert_eq!(d.resolve("007"), Some(2));
    }

    #[test]
    fn unpadded_code_resolves_against_padded_directory() {
        let d = dir(&[("007", 1)]);
        assert_eq!(d.resolve("7"), Some(1));
    }

    #[test]
    fn non_numeric_codes_only_match_exactly() {
        let d = dir(&[("A-12", 3)]);
        assert_eq!(d.resolve("A-12"), Some(3));
        assert_eq!(d.resolve("A-012"), None);
    }

    #[test]
    fn all_zero_code_normalizes_to_zero() {
        let d = dir(&[("0", 4)]);
        assert_eq!(d.resolve("000"), Some(4));
    }

    #[test]
    fn barcode_lookup_is_exact() {
        let m = BarcodeMap::from_pairs([("7290000000001".to_string(), 10)]);
        assert_eq!(m.resolve("7290000000001"), Some(10));
        assert_eq!(m.resolve("07290000000001"), None);
    }
}
