//! Run configuration and the chain-name mapping.
//!
//! Everything the pipeline needs is built here once and passed in by value;
//! there is no module-level mutable state.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::util::env;

/// Tunables for one ingestion run, loaded from the environment.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Directory holding the downloaded promo CSV snapshots.
    pub data_dir: PathBuf,
    /// When set, overrides every format's default minimum barcode length.
    pub min_barcode_len: Option<usize>,
    /// Header rows per multi-row upsert statement.
    pub promo_page_size: usize,
    /// Item rows per multi-row insert statement.
    pub item_page_size: usize,
    pub max_connections: u32,
}

impl IngestConfig {
    pub fn from_env() -> Self {
        env::init_env();
        Self {
            data_dir: PathBuf::from(
                env::env_opt("DATA_DIR").unwrap_or_else(|| "kaggle_data".into()),
            ),
            min_barcode_len: env::env_parse_opt("MIN_BARCODE_LEN"),
            promo_page_size: env::env_parse("PROMO_PAGE_SIZE", 500),
            item_page_size: env::env_parse("ITEM_PAGE_SIZE", 1000),
            max_connections: env::env_parse("MAX_CONNECTIONS", 5),
        }
    }
}

/// Filename key -> canonical retailer chain name, as stored in
/// `retailer_chain.name`. Promo files are named `promo_full_file_<key>.csv`.
#[derive(Debug, Clone)]
pub struct ChainMap {
    names: HashMap<&'static str, &'static str>,
}

const CHAIN_TABLE: &[(&str, &str)] = &[
    ("shufersal", "Shufersal"),
    ("rami_levy", "Rami Levy"),
    ("rami-levy", "Rami Levy"),
    ("yochananof", "Yochananof"),
    ("victory", "Victory"),
    ("osher_ad", "Osher Ad"),
    ("mega", "Mega"),
    ("tiv_taam", "Tiv Taam"),
    ("hazi_hinam", "Hazi Hinam"),
    ("keshet_taamim", "Keshet Taamim"),
    ("keshet", "Keshet Taamim"),
    ("freshmarket", "Freshmarket"),
    ("fresh_market_and_super_dosh", "Freshmarket"),
    ("bareket", "Bareket"),
    ("city_market", "City Market"),
    ("city_market_shops", "City Market"),
    ("dor_alon", "Dor Alon"),
    ("good_pharm", "Good Pharm"),
    ("het_cohen", "Het Cohen"),
    ("king_store", "King Store"),
    ("maayan_2000", "Maayan 2000"),
    ("mahsani_ashuk", "Mahsani Ashuk"),
    ("mahsani_shuk", "Mahsani Ashuk"),
    ("meshmat_yosef", "Meshmat Yosef"),
    ("meshmat_yosef_2", "Meshmat Yosef"),
    ("netiv_hased", "Netiv Hased"),
    ("polizer", "Polizer"),
    ("salach_dabach", "Salach Dabach"),
    ("shefa_barcart_ashem", "Shefa Barcart Ashem"),
    ("shuk_ahir", "Shuk Ahir"),
    ("stop_market", "Stop Market"),
    ("super_sapir", "Super Sapir"),
    ("super_yuda", "Super Yuda"),
    ("super_dosh", "Super Dosh"),
    ("zol_vebegadol", "Zol Vebegadol"),
    ("yayno_bitan_and_carrefour", "Carrefour"),
];

impl Default for ChainMap {
    fn default() -> Self {
        Self {
            names: CHAIN_TABLE.iter().copied().collect(),
        }
    }
}

impl ChainMap {
    /// Resolve a promo file stem (e.g. `promo_full_file_rami_levy`) to its
    /// canonical chain name. Exact key match after prefix stripping first,
    /// then a substring scan to absorb suffix variants. The fallback walks
    /// the declaration-ordered table, not the map, so a stem containing two
    /// keys always resolves to the first-declared one.
    pub fn chain_for_stem(&self, stem: &str) -> Option<&'static str> {
        let stem = stem.to_ascii_lowercase();
        let key = stem
            .trim_start_matches("promo_full_file_")
            .trim_start_matches("promo_file_");
        if let Some(&name) = self.names.get(key) {
            return Some(name);
        }
        CHAIN_TABLE
            .iter()
            .find(|(k, _)| key.contains(*k))
            .map(|&(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_exact_key() {
        let chains = ChainMap::default();
        assert_eq!(
            chains.chain_for_stem("promo_full_file_rami_levy"),
            Some("Rami Levy")
        );
        assert_eq!(
            chains.chain_for_stem("promo_file_good_pharm"),
            Some("Good Pharm")
        );
    }

    #[test]
    fn falls_back_to_substring_match() {
        let chains = ChainMap::default();
        assert_eq!(
            chains.chain_for_stem("promo_full_file_shufersal_2024"),
            Some("Shufersal")
        );
    }

    #[test]
    fn unknown_chain_is_none() {
        let chains = ChainMap::default();
        assert_eq!(chains.chain_for_stem("promo_full_file_acme_mart"), None);
    }

    #[test]
    fn ambiguous_stem_resolves_to_first_declared_key() {
        // The stem contains both "fresh_market_and_super_dosh" and
        // "super_dosh"; the earlier table entry must win on every run.
        for _ in 0..64 {
            let chains = ChainMap::default();
            assert_eq!(
                chains.chain_for_stem("promo_full_file_fresh_market_and_super_dosh_v2"),
                Some("Freshmarket")
            );
        }
    }
}
