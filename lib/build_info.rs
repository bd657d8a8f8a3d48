//! Build identity reported by `--version`, the logging bootstrap event and `/metrics`.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_COMMIT_HASH: &str = env!("HN_RELAY_GIT_COMMIT_HASH");
pub const VERSION_WITH_COMMIT: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "+",
    env!("HN_RELAY_GIT_COMMIT_HASH")
);

/// Short git hash for log context and metric labels, or `"unknown"` outside a git checkout.
pub fn short_commit_hash() -> &'static str {
    if GIT_COMMIT_HASH == "unknown" {
        return GIT_COMMIT_HASH;
    }

    &GIT_COMMIT_HASH[..GIT_COMMIT_HASH.len().min(12)]
}
