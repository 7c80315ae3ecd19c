use xxhash_rust::xxh3::xxh3_64;

/// Stable article id derived from its canonical URL.
///
/// The hash is unseeded, so the same URL maps to the same id in every
/// process. Collisions only cause a display-level clash.
pub fn article_id(url: &str) -> String {
    format!("{:016x}", xxh3_64(url.as_bytes()))
}
