pub mod config;
pub mod promo;
pub mod tracing;

pub mod util {
    pub mod db;
    pub mod env;
}

pub use config::{ChainMap, IngestConfig};
pub use util::db::Db;
