//! Dual-strategy element lookup
//!
//! One read-through front door over the two location strategies and the two
//! cache tiers. A lookup tries, in order: in-process TTL cache, structured
//! tree query, pixel template match. Browsers whose tree does not expose web
//! content skip the tree path entirely and run template-only, with the
//! persisted tier disabled; a pixel match is not a stable identity worth
//! persisting.
//!
//! The tree is dumped at most once per lookup and queried in memory; dumping
//! is the dominant cost of a step, which is what both cache tiers exist to
//! avoid.

use image::GrayImage;

use crate::cache::{DeviceCache, QuerySignature, TtlCache};
use crate::device::Device;
use crate::element::Element;
use crate::error::Result;
use crate::geometry::Viewport;
use crate::matcher;
use crate::profile::BrowserProfile;
use crate::tree::{Query, TreeSnapshot};

/// Read-through element locator for one device session
pub struct Locator<'d> {
    device: &'d dyn Device,
    profile: BrowserProfile,
    ttl: TtlCache,
    persisted: Option<DeviceCache>,
    threshold: f32,
}

impl<'d> Locator<'d> {
    pub fn new(device: &'d dyn Device, profile: BrowserProfile) -> Self {
        Self {
            device,
            profile,
            ttl: TtlCache::default(),
            persisted: None,
            threshold: matcher::DEFAULT_THRESHOLD,
        }
    }

    /// Attach the per-device persisted cache
    ///
    /// Ignored for coordinate-only browsers: template-match regions are not
    /// stable identities, and serving a persisted region there would replay
    /// positions from a tree this browser never produced.
    pub fn with_persisted(mut self, cache: DeviceCache) -> Self {
        if self.profile.coordinate_only {
            tracing::debug!(
                browser = %self.profile.name,
                "persisted cache not applicable, dropping"
            );
        } else {
            self.persisted = Some(cache);
        }
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn profile(&self) -> &BrowserProfile {
        &self.profile
    }

    /// Mutable handle on the persisted tier, for sharing with a detector
    pub fn persisted_mut(&mut self) -> Option<&mut DeviceCache> {
        self.persisted.as_mut()
    }

    fn viewport(&self) -> Viewport {
        self.device.viewport()
    }

    /// Dump and parse the current tree
    pub async fn snapshot(&self) -> Result<TreeSnapshot> {
        let raw = self.device.dump_ui_tree().await?;
        TreeSnapshot::parse(&raw)
    }

    /// Locate an element by query, falling back to a template
    ///
    /// `Ok(None)` means nothing matched by either strategy; retry belongs to
    /// the caller. For coordinate-only browsers the query is ignored and the
    /// template is the only strategy.
    pub async fn find_element(
        &mut self,
        query: &Query,
        template: Option<&GrayImage>,
        signature: &QuerySignature,
    ) -> Result<Option<Element>> {
        if self.profile.coordinate_only {
            return self.find_by_template(template, signature).await;
        }

        if let Some(region) = self.ttl.get(signature, self.viewport()) {
            return Ok(Some(Element::from_tree(region, None)));
        }

        let found = match self.snapshot().await {
            Ok(tree) => tree.find(query).into_iter().next(),
            // A truncated mid-transition dump is a miss, not a dead session;
            // the template fallback below still gets its chance.
            Err(e) => {
                tracing::debug!(error = %e, "unusable tree dump, trying template");
                None
            }
        };

        let element = match found {
            Some(e) => Some(e),
            None => {
                tracing::debug!(query = %query.signature(), "tree miss");
                self.find_by_template(template, signature).await?
            }
        };

        if let Some(e) = &element {
            self.ttl.store(signature, self.viewport(), e.region);
        }
        Ok(element)
    }

    async fn find_by_template(
        &mut self,
        template: Option<&GrayImage>,
        signature: &QuerySignature,
    ) -> Result<Option<Element>> {
        let Some(template) = template else {
            return Ok(None);
        };
        if let Some(region) = self.ttl.get(signature, self.viewport()) {
            return Ok(Some(Element::from_tree(region, None)));
        }

        let png = self.device.capture_screen().await?;
        let screen = matcher::decode_screenshot(&png)?;
        let hit = matcher::find_template(&screen, template, self.threshold)?;

        if let Some(m) = hit {
            self.ttl.store(signature, self.viewport(), m.region);
            return Ok(Some(m.into_element()));
        }
        Ok(None)
    }

    /// Locate an element whose position survives across sessions
    ///
    /// Checks the persisted tier first under `(kind, browser, label,
    /// viewport)`; a miss runs the full dual-strategy lookup and writes a
    /// tree hit back through. Template hits are never persisted.
    pub async fn find_stable(
        &mut self,
        kind: &str,
        label: &str,
        query: &Query,
        template: Option<&GrayImage>,
    ) -> Result<Option<Element>> {
        let vp = self.viewport();
        if let Some(cache) = &self.persisted {
            if let Some(region) = cache.get(kind, &self.profile.name, label, vp) {
                tracing::info!(kind, label, "persisted cache hit");
                return Ok(Some(Element::from_tree(region, None)));
            }
        }

        let signature = QuerySignature::stable(query);
        let element = self.find_element(query, template, &signature).await?;

        if let Some(e) = &element {
            if e.source == crate::element::ElementSource::Tree {
                if let Some(cache) = &mut self.persisted {
                    cache.insert(kind, &self.profile.name, label, vp, e.region)?;
                }
            }
        }
        Ok(element)
    }

    /// All on-screen anchors naming exactly `domain`
    ///
    /// Never cached: the result set is only meaningful for the page as it is
    /// right now, mid-scroll.
    pub async fn find_domain_anchors(&self, domain: &str) -> Result<Vec<Element>> {
        Ok(self.snapshot().await?.find_domain_anchors(domain))
    }
}
