use git2::Repository;
use std::path::Path;

/// URL of the `origin` remote of the repository containing `start`, if any.
///
/// Walks up from `start` the way `git` itself does, so a binary built inside a
/// checkout (`target/release/diskclone`) still finds the checkout's remote.
pub fn origin_url(start: &Path) -> Option<String> {
    let repo = Repository::discover(start).ok()?;
    let remote = repo.find_remote("origin").ok()?;
    remote.url().map(|u| u.to_string())
}
