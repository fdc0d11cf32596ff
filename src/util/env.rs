//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Call `init_env()` once early in each binary (or rely on lazy Once).
use std::str::FromStr;
use std::sync::Once;

static INIT: Once = Once::new();

/// Load .env exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        let _ = dotenv::dotenv();
    });
}

/// Get required env var; error if missing.
pub fn env_req(key: &str) -> anyhow::Result<String> {
    init_env();
    std::env::var(key).map_err(|_| anyhow::anyhow!("missing env var {key}"))
}

/// Get optional env var (None if unset or empty).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Clone,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Optional parsed value.
pub fn env_parse_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    init_env();
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Boolean flag; accepts 1/true/on/yes (case-insensitive) as true.
pub fn env_flag(key: &str, default: bool) -> bool {
    init_env();
    match std::env::var(key) {
        Ok(raw) => {
            let v = raw.trim().to_ascii_lowercase();
            matches!(v.as_str(), "1" | "true" | "on" | "yes")
        }
        Err(_) => default,
    }
}

/// Database DSN: explicit URL vars first, then a DSN composed from discrete
/// PG_* components. Returns the first that yields a usable value.
pub fn db_url() -> anyhow::Result<String> {
    init_env();
    for k in ["DATABASE_URL", "DB_URL"] {
        if let Some(v) = env_opt(k) {
            return Ok(v);
        }
    }
    if let Some(dsn) = build_dsn_from_components() {
        return Ok(dsn);
    }
    Err(anyhow::anyhow!("no database URL env vars set"))
}

/// Build a DSN from PG_HOST / PG_USER / PG_PASSWORD / PG_DATABASE / PG_PORT.
///
/// The password may contain reserved URL characters; build via `url::Url`
/// so username/password are percent-encoded safely.
fn build_dsn_from_components() -> Option<String> {
    let host = env_opt("PG_HOST")?;
    let user = env_opt("PG_USER")?;
    let password = env_opt("PG_PASSWORD");
    let database = env_opt("PG_DATABASE").unwrap_or_else(|| "postgres".into());
    let port: u16 = env_opt("PG_PORT")
        .and_then(|p| p.parse().ok())
        .unwrap_or(5432);
    let ssl_mode = env_opt("PG_SSLMODE").unwrap_or_else(|| "prefer".into());

    let mut out = url::Url::parse("postgresql://localhost").ok()?;
    out.set_username(&user).ok()?;
    if let Some(pass) = password {
        out.set_password(Some(&pass)).ok()?;
    }
    out.set_host(Some(host.trim())).ok()?;
    out.set_port(Some(port)).ok()?;
    out.set_path(&format!("/{database}"));
    if ssl_mode != "disable" {
        out.query_pairs_mut().append_pair("sslmode", &ssl_mode);
    }

    Some(out.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_accepts_truthy_spellings() {
        std::env::set_var("SHUK_TEST_FLAG", "On");
        assert!(env_flag("SHUK_TEST_FLAG", false));
        std::env::remove_var("SHUK_TEST_FLAG");
        assert!(!env_flag("SHUK_TEST_FLAG", false));
        assert!(env_flag("SHUK_TEST_FLAG", true));
    }

    #[test]
    fn empty_var_is_none() {
        std::env::set_var("SHUK_TEST_EMPTY", "   ");
        assert_eq!(env_opt("SHUK_TEST_EMPTY"), None);
    }
}
