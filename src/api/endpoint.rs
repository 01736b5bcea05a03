//! Purpose: Pick the database endpoint for callers that do not pass one explicitly.
//! Exports: `resolve_endpoint`, `DEFAULT_ENDPOINT`, `ENDPOINT_ENV`.
//! Role: Caller-side convenience; the loader itself only ever sees an explicit endpoint.
//! Invariants: Order is explicit argument, then `MONGODB_URI`, then the local default.
//! Invariants: Empty values count as unset.

pub const DEFAULT_ENDPOINT: &str = "mongodb://localhost:27017";
pub const ENDPOINT_ENV: &str = "MONGODB_URI";

pub fn resolve_endpoint(explicit: Option<&str>) -> String {
    let from_env = std::env::var(ENDPOINT_ENV).ok();
    resolve_from(explicit, from_env.as_deref())
}

fn resolve_from(explicit: Option<&str>, from_env: Option<&str>) -> String {
    explicit
        .filter(|value| !value.trim().is_empty())
        .or_else(|| from_env.filter(|value| !value.trim().is_empty()))
        .unwrap_or(DEFAULT_ENDPOINT)
        .to_string()
}
