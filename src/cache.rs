//! Element position caches
//!
//! Two tiers behind one read-through interface. The in-process tier is a TTL
//! memo keyed by (query signature, viewport) and exists to skip redundant
//! tree dumps within a session. The persisted tier remembers elements whose
//! position is stable across invocations (first-run dialog buttons, the
//! search box) in one JSON file per physical device, so later sessions skip
//! the dump entirely; dumping the tree is the dominant cost of a step.
//!
//! The tiers stay separate because their invalidation rules differ: time for
//! the first, viewport/browser identity for the second. Queries that confirm
//! a page transition are constructed non-cacheable: a stale hit there would
//! report that an element "still exists" after the page already changed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::geometry::{Region, Viewport};
use crate::tree::Query;

/// Default lifetime of in-process entries
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Identity of a query for caching purposes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuerySignature {
    key: String,
    cacheable: bool,
}

impl QuerySignature {
    /// Signature for a positionally stable query
    pub fn stable(query: &Query) -> Self {
        Self {
            key: query.signature(),
            cacheable: true,
        }
    }

    /// Signature for a transition/navigation check, never served from cache
    pub fn transition(query: &Query) -> Self {
        Self {
            key: query.signature(),
            cacheable: false,
        }
    }

    pub fn is_cacheable(&self) -> bool {
        self.cacheable
    }
}

/// In-process TTL tier
pub struct TtlCache {
    ttl: Duration,
    entries: HashMap<(String, Viewport), (Region, Instant)>,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Live entry for a signature, expiring stale ones on the way
    ///
    /// Always `None` for non-cacheable signatures.
    pub fn get(&mut self, signature: &QuerySignature, viewport: Viewport) -> Option<Region> {
        if !signature.cacheable {
            return None;
        }
        let key = (signature.key.clone(), viewport);
        if let Some((region, created)) = self.entries.get(&key) {
            if created.elapsed() < self.ttl {
                tracing::debug!(key = %signature.key, "ttl cache hit");
                return Some(*region);
            }
            self.entries.remove(&key);
        }
        None
    }

    /// Record a freshly computed region; no-op for non-cacheable signatures
    pub fn store(&mut self, signature: &QuerySignature, viewport: Viewport, region: Region) {
        if signature.cacheable {
            self.entries
                .insert((signature.key.clone(), viewport), (region, Instant::now()));
        }
    }

    /// Serve from cache or invoke `compute`, storing a hit
    ///
    /// Non-cacheable signatures always compute and never store. A compute
    /// miss (`Ok(None)`) is not stored either: absence is not a position.
    pub fn get_or_compute<F>(
        &mut self,
        signature: &QuerySignature,
        viewport: Viewport,
        compute: F,
    ) -> Result<Option<Region>>
    where
        F: FnOnce() -> Result<Option<Region>>,
    {
        if let Some(region) = self.get(signature, viewport) {
            return Ok(Some(region));
        }
        let computed = compute()?;
        if let Some(region) = computed {
            self.store(signature, viewport, region);
        }
        Ok(computed)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

/// Stored region in the persisted file
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct StoredRegion {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

impl From<Region> for StoredRegion {
    fn from(r: Region) -> Self {
        Self {
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
        }
    }
}

impl From<StoredRegion> for Region {
    fn from(s: StoredRegion) -> Self {
        Region::new(s.x, s.y, s.width, s.height)
    }
}

/// Persisted per-device tier
///
/// One JSON document per device, mapping
/// `"{kind}|{browser}|{label}|{width}x{height}"` to a region. The file is
/// the sole source of truth across restarts; deleting it is the supported
/// invalidation mechanism. A single session owns the file: `&mut self` on
/// every write keeps concurrent writers unrepresentable within a session,
/// and sessions never share a device.
pub struct DeviceCache {
    path: PathBuf,
    entries: HashMap<String, StoredRegion>,
}

impl DeviceCache {
    /// Open (or start empty for) the cache file of one device
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), entries = entries.len(), "device cache opened");
        Ok(Self { path, entries })
    }

    fn key(kind: &str, browser: &str, label: &str, viewport: Viewport) -> String {
        format!("{}|{}|{}|{}", kind, browser, label, viewport.key())
    }

    /// Stored region for the exact (kind, browser, label, viewport) identity
    ///
    /// Any component mismatch (notably viewport or browser) is a plain
    /// miss, which forces the caller into a fresh lookup.
    pub fn get(&self, kind: &str, browser: &str, label: &str, viewport: Viewport) -> Option<Region> {
        self.entries
            .get(&Self::key(kind, browser, label, viewport))
            .map(|s| Region::from(*s))
    }

    /// Record a rediscovered region and write the file through
    pub fn insert(
        &mut self,
        kind: &str,
        browser: &str,
        label: &str,
        viewport: Viewport,
        region: Region,
    ) -> Result<()> {
        self.entries
            .insert(Self::key(kind, browser, label, viewport), region.into());
        self.save()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Query;

    fn vp() -> Viewport {
        Viewport::new(720, 1440)
    }

    #[test]
    fn test_ttl_hit_skips_compute() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        let sig = QuerySignature::stable(&Query::by_id("query"));
        let r = Region::new(10, 20, 30, 40);

        let first = cache
            .get_or_compute(&sig, vp(), || Ok(Some(r)))
            .unwrap();
        assert_eq!(first, Some(r));

        let second = cache
            .get_or_compute(&sig, vp(), || panic!("must not recompute"))
            .unwrap();
        assert_eq!(second, Some(r));
    }

    #[test]
    fn test_ttl_expiry_recomputes() {
        let mut cache = TtlCache::new(Duration::ZERO);
        let sig = QuerySignature::stable(&Query::by_id("query"));
        let r1 = Region::new(0, 0, 10, 10);
        let r2 = Region::new(5, 5, 10, 10);

        cache.get_or_compute(&sig, vp(), || Ok(Some(r1))).unwrap();
        let second = cache.get_or_compute(&sig, vp(), || Ok(Some(r2))).unwrap();
        assert_eq!(second, Some(r2));
    }

    #[test]
    fn test_viewport_isolation() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        let sig = QuerySignature::stable(&Query::by_id("query"));
        let r1 = Region::new(0, 0, 10, 10);
        let r2 = Region::new(99, 99, 10, 10);

        cache
            .get_or_compute(&sig, Viewport::new(720, 1440), || Ok(Some(r1)))
            .unwrap();
        // Different viewport must not see the V1 entry
        let other = cache
            .get_or_compute(&sig, Viewport::new(1080, 2400), || Ok(Some(r2)))
            .unwrap();
        assert_eq!(other, Some(r2));
    }

    #[test]
    fn test_transition_signature_never_caches() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        let sig = QuerySignature::transition(&Query::by_id("nx_query"));
        let r1 = Region::new(0, 0, 10, 10);

        cache.get_or_compute(&sig, vp(), || Ok(Some(r1))).unwrap();
        // Underlying state changed: the element is gone. A false hit here
        // would misreport the old page as still present.
        let second = cache.get_or_compute(&sig, vp(), || Ok(None)).unwrap();
        assert_eq!(second, None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_miss_is_not_stored() {
        let mut cache = TtlCache::new(Duration::from_secs(60));
        let sig = QuerySignature::stable(&Query::by_id("query"));

        cache.get_or_compute(&sig, vp(), || Ok(None)).unwrap();
        assert!(cache.is_empty());
        let second = cache
            .get_or_compute(&sig, vp(), || Ok(Some(Region::new(1, 1, 2, 2))))
            .unwrap();
        assert!(second.is_some());
    }

    #[test]
    fn test_device_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device-1.json");
        let r = Region::new(143, 295, 460, 98);

        {
            let mut cache = DeviceCache::open(&path).unwrap();
            assert!(cache.is_empty());
            cache
                .insert("first_run", "chrome", "동의 및 계속", vp(), r)
                .unwrap();
        }

        let cache = DeviceCache::open(&path).unwrap();
        assert_eq!(cache.get("first_run", "chrome", "동의 및 계속", vp()), Some(r));
        // Browser and viewport are part of the identity
        assert_eq!(cache.get("first_run", "samsung", "동의 및 계속", vp()), None);
        assert_eq!(
            cache.get("first_run", "chrome", "동의 및 계속", Viewport::new(1080, 2400)),
            None
        );
    }

    #[test]
    fn test_device_cache_key_format() {
        assert_eq!(
            DeviceCache::key("first_run", "chrome", "Skip", vp()),
            "first_run|chrome|Skip|720x1440"
        );
    }

    #[test]
    fn test_deleted_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device-2.json");

        let mut cache = DeviceCache::open(&path).unwrap();
        cache
            .insert("search_box", "chrome", "query", vp(), Region::new(1, 2, 3, 4))
            .unwrap();
        drop(cache);

        std::fs::remove_file(&path).unwrap();
        let cache = DeviceCache::open(&path).unwrap();
        assert!(cache.is_empty());
    }
}
