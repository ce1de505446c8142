//! On-disk page cache
//!
//! Raw page bodies keyed by a deterministic URL slug. The cache backs two
//! behaviors: reusing a body after a 304 conditional response, and serving
//! stale content when a host is unreachable or a source is cooling down.

use crate::url::cache_slug;
use crate::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

pub struct PageCache {
    dir: PathBuf,
}

impl PageCache {
    /// Opens (creating if needed) a cache directory
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(PageCache {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, url: &Url) -> PathBuf {
        self.dir.join(cache_slug(url))
    }

    pub fn contains(&self, url: &Url) -> bool {
        self.path_for(url).exists()
    }

    /// Stores a page body, overwriting any previous copy
    pub fn store(&self, url: &Url, body: &str) -> Result<()> {
        let path = self.path_for(url);
        let tmp = path.with_extension("html.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Loads a cached body, `None` when the URL was never cached
    pub fn load(&self, url: &Url) -> Option<String> {
        let path = self.path_for(url);
        match fs::read_to_string(&path) {
            Ok(body) => Some(body),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                debug!("Failed to read cached page {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_and_load() {
        let dir = TempDir::new().unwrap();
        let cache = PageCache::open(dir.path()).unwrap();
        let url = Url::parse("https://example.com/news/").unwrap();

        assert!(!cache.contains(&url));
        assert!(cache.load(&url).is_none());

        cache.store(&url, "<html>body</html>").unwrap();
        assert!(cache.contains(&url));
        assert_eq!(cache.load(&url).unwrap(), "<html>body</html>");
    }

    #[test]
    fn test_store_overwrites_previous_copy() {
        let dir = TempDir::new().unwrap();
        let cache = PageCache::open(dir.path()).unwrap();
        let url = Url::parse("https://example.com/news/").unwrap();

        cache.store(&url, "old").unwrap();
        cache.store(&url, "new").unwrap();
        assert_eq!(cache.load(&url).unwrap(), "new");
    }

    #[test]
    fn test_query_variants_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let cache = PageCache::open(dir.path()).unwrap();
        let page1 = Url::parse("https://example.com/list?page=1").unwrap();
        let page2 = Url::parse("https://example.com/list?page=2").unwrap();

        cache.store(&page1, "one").unwrap();
        cache.store(&page2, "two").unwrap();

        assert_eq!(cache.load(&page1).unwrap(), "one");
        assert_eq!(cache.load(&page2).unwrap(), "two");
    }
}
