//! Search-and-visit workflow
//!
//! The high-level sequence: open the search portal, get past first-run
//! dialogs, enter a query, scroll until the target domain's result is on
//! screen, classify its clickable parts, click one like a person would, and
//! confirm the page actually changed.
//!
//! Each step owns its retry policy. App launch retries without bound because
//! a slow first launch is normal and has no meaningful failure signal; every
//! post-action wait is bounded so a dead page ends the session with a step
//! error instead of hanging it.

use image::GrayImage;

use crate::adb::keycodes;
use crate::cache::QuerySignature;
use crate::classify::{self, ClassifierConfig, LinkKind};
use crate::device::Device;
use crate::element::Element;
use crate::error::{Error, Result};
use crate::human;
use crate::locator::Locator;
use crate::profile::SearchDirection;
use crate::scroll::{ScrollHint, Scroller};
use crate::state::{PageState, RetryPolicy, StateDetector, StepSignature};
use crate::tree::Query;

/// Everything configurable about one portal visit
pub struct WorkflowConfig {
    /// Portal URL opened to start the session
    pub portal_url: String,
    /// Tree query locating the portal's search box
    pub search_box_query: Query,
    /// Search-box template for browsers without tree access
    pub search_box_template: Option<GrayImage>,
    /// Optional search-submit button; enter key is used when absent
    pub search_button_query: Option<Query>,
    /// Pixel template of the target result block, for browsers whose tree
    /// hides web content; those probe and verify with this instead of
    /// domain-anchor queries
    pub target_template: Option<GrayImage>,
    /// Label of the button opening the full results pages, followed when the
    /// target is not among the integrated results; `None` disables the flow
    pub more_results_label: Option<String>,
    /// Template for that button on browsers without tree access
    pub more_results_template: Option<GrayImage>,
    /// Tree query proving the full results page rendered (its search box)
    pub more_page_query: Option<Query>,
    /// Page-number pagination bound on the full results pages
    pub max_pages: u32,
    /// Raw-snapshot substrings proving the results page rendered
    pub results_markers: Vec<String>,
    /// Raw-snapshot substrings proving a hard failure (error page)
    pub error_markers: Vec<String>,
    pub classifier: ClassifierConfig,
    /// Incremental search-and-scroll bound
    pub max_search_scrolls: u32,
    /// Click attempts before giving up on verification
    pub click_verify_attempts: u32,
    /// Dwell range on the landing page, ms
    pub dwell_ms: (u64, u64),
    /// App launch / first-run handling
    pub launch_policy: RetryPolicy,
    /// Post-action waits
    pub wait_policy: RetryPolicy,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            portal_url: "https://m.naver.com".into(),
            search_box_query: Query::by_id("MM_SEARCH_FAKE"),
            search_box_template: None,
            search_button_query: None,
            target_template: None,
            more_results_label: Some("검색결과 더보기".into()),
            more_results_template: None,
            more_page_query: Some(Query::by_id("nx_query")),
            max_pages: 10,
            results_markers: Vec::new(),
            error_markers: Vec::new(),
            classifier: ClassifierConfig::default(),
            max_search_scrolls: 30,
            click_verify_attempts: 3,
            dwell_ms: (10_000, 20_000),
            launch_policy: RetryPolicy::unbounded(),
            wait_policy: RetryPolicy::bounded(20),
        }
    }
}

/// What a completed visit looked like
#[derive(Debug, Clone)]
pub struct VisitOutcome {
    /// Kind of link clicked
    pub clicked: LinkKind,
    /// Absolute click point
    pub click_point: (i32, i32),
    /// Click attempts needed until the transition was observed
    pub click_attempts: u32,
    /// Swipes spent reaching the result
    pub scrolls: u32,
}

/// Orchestrates one search-and-visit session on one device
pub struct SearchWorkflow<'d> {
    device: &'d dyn Device,
    locator: Locator<'d>,
    config: WorkflowConfig,
    hint: Option<&'d dyn ScrollHint>,
}

impl<'d> SearchWorkflow<'d> {
    pub fn new(device: &'d dyn Device, locator: Locator<'d>, config: WorkflowConfig) -> Self {
        Self {
            device,
            locator,
            config,
            hint: None,
        }
    }

    /// Attach the external scroll-distance service
    pub fn with_scroll_hint(mut self, hint: &'d dyn ScrollHint) -> Self {
        self.hint = hint_if_applicable(self.locator.profile(), hint);
        self
    }

    /// Run the full sequence for one (query, target domain) pair
    pub async fn run(&mut self, query: &str, target_domain: &str) -> Result<VisitOutcome> {
        tracing::info!(query, target_domain, browser = %self.locator.profile().name, "session start");

        self.launch().await?;
        self.enter_query(query).await?;
        self.wait_for_results().await?;

        let (anchor, scrolls) = self.scroll_to_target(query, target_domain).await?;
        let outcome = self.click_result(&anchor, target_domain, scrolls).await?;

        self.dwell_and_return().await?;
        tracing::info!(clicked = %outcome.clicked, "session complete");
        Ok(outcome)
    }

    /// Open the portal and get past any first-run dialogs
    async fn launch(&mut self) -> Result<()> {
        let profile = self.locator.profile().clone();
        self.device
            .open_url(&self.config.portal_url, &profile.package)
            .await?;

        let mut signature = StepSignature::named("launch");
        signature.prompt_labels = profile.first_run_labels.clone();
        signature.error_markers = self.config.error_markers.clone();
        if profile.coordinate_only {
            signature.ready_template = self.config.search_box_template.clone();
        } else {
            signature.ready_query = Some(self.config.search_box_query.clone());
        }

        let mut detector =
            StateDetector::new(self.device).template_mode(profile.coordinate_only);
        if let Some(cache) = self.locator.persisted_mut() {
            detector = detector.with_persisted(cache, profile.name.clone());
        }
        let state = detector
            .wait_ready(&signature, self.config.launch_policy)
            .await?;
        fail_on_error_page("launch", state)
    }

    /// Find the search box, focus it, type the query, submit
    async fn enter_query(&mut self, query: &str) -> Result<()> {
        let profile_name = self.locator.profile().name.clone();
        let template = self.config.search_box_template.clone();
        let search_box = self
            .locator
            .find_stable(
                "search_box",
                &profile_name,
                &self.config.search_box_query.clone(),
                template.as_ref(),
            )
            .await?
            .ok_or_else(|| Error::step_failed("search_box", 1, "not found"))?;

        human::tap_region(self.device, &search_box.region).await?;
        human::delay_ms(500, 1000).await;
        human::type_text(self.device, query).await?;
        human::delay_ms(300, 800).await;

        // Submit the way people do: usually the keyboard, sometimes the
        // magnifier button when the portal shows one
        let use_button = self.config.search_button_query.is_some() && human::random_bool(0.3);
        if use_button {
            let button_query = self.config.search_button_query.clone().unwrap();
            let sig = QuerySignature::transition(&button_query);
            if let Some(button) = self.locator.find_element(&button_query, None, &sig).await? {
                human::tap_region(self.device, &button.region).await?;
                return Ok(());
            }
        }
        self.device.key_event(keycodes::ENTER).await?;
        Ok(())
    }

    async fn wait_for_results(&mut self) -> Result<()> {
        let mut signature = StepSignature::named("results");
        signature.error_markers = self.config.error_markers.clone();
        // Web content never reaches the tree on coordinate-only browsers, so
        // a tree marker there would wait on text that can never appear
        if !self.locator.profile().coordinate_only {
            signature.ready_markers = self.config.results_markers.clone();
        }

        let mut detector = StateDetector::new(self.device);
        let state = detector
            .wait_ready(&signature, self.config.wait_policy)
            .await?;
        fail_on_error_page("results", state)
    }

    /// Bring the target domain's result block on screen
    ///
    /// An external distance hint, when available, covers the first stretch;
    /// incremental search-and-scroll in the profile's direction does the
    /// rest. A target absent from the integrated results is chased onto the
    /// full results pages: the "more results" button first, then page-number
    /// pagination up to `max_pages`.
    async fn scroll_to_target(
        &mut self,
        query: &str,
        target_domain: &str,
    ) -> Result<(Element, u32)> {
        let profile = self.locator.profile().clone();
        let mut scroller = Scroller::new(self.device);
        let mut scrolls: u32 = 0;

        if let Some(hint) = self.hint {
            match hint
                .suggested_scroll(query, target_domain, self.device.viewport())
                .await
            {
                Ok(Some(px)) => {
                    scrolls += scroller.apply_hint(px, &profile).await?;
                }
                Ok(None) => {}
                // A dead hint service degrades to plain incremental search
                Err(e) => tracing::warn!(error = %e, "scroll hint unavailable"),
            }
        }

        if let Some(anchor) = self
            .search_page(target_domain, &profile, &mut scroller, &mut scrolls)
            .await?
        {
            return Ok((anchor, scrolls));
        }

        if self.open_more_results(&mut scroller, &mut scrolls).await? {
            for page in 1..=self.config.max_pages {
                if let Some(anchor) = self
                    .search_page(target_domain, &profile, &mut scroller, &mut scrolls)
                    .await?
                {
                    return Ok((anchor, scrolls));
                }
                // Page numbers are web content, invisible to a template
                if profile.coordinate_only || page == self.config.max_pages {
                    break;
                }
                if !self.goto_page(page + 1, &mut scroller, &mut scrolls).await? {
                    break;
                }
            }
        }

        Err(Error::step_failed(
            "find_target",
            scrolls.max(1),
            format!("'{}' not on screen", target_domain),
        ))
    }

    /// One incremental search-and-scroll pass over the current page
    async fn search_page(
        &mut self,
        target_domain: &str,
        profile: &crate::profile::BrowserProfile,
        scroller: &mut Scroller<'_>,
        scrolls: &mut u32,
    ) -> Result<Option<Element>> {
        for _ in 0..self.config.max_search_scrolls {
            let anchors = self.probe_target(target_domain).await?;
            if let Some(anchor) = anchors.into_iter().next() {
                tracing::info!(region = ?anchor.region, scrolls = *scrolls, "target result on screen");
                return Ok(Some(anchor));
            }

            match profile.search_direction {
                SearchDirection::Down => {
                    scroller.scroll_down_compensated().await?;
                }
                SearchDirection::Up => {
                    scroller.scroll_up(400).await?;
                }
            }
            *scrolls += 1;
            human::maybe_reading_pause().await;
        }
        Ok(None)
    }

    /// Find and follow the "more results" button onto the full results pages
    ///
    /// `Ok(false)` means the flow is not configured for this browser or the
    /// button never confirmed; the caller then reports the plain miss.
    async fn open_more_results(
        &mut self,
        scroller: &mut Scroller<'_>,
        scrolls: &mut u32,
    ) -> Result<bool> {
        let Some(label) = self.config.more_results_label.clone() else {
            return Ok(false);
        };
        if self.locator.profile().coordinate_only && self.config.more_results_template.is_none() {
            return Ok(false);
        }

        let probe = Query::exact_text(&label);
        let template = self.config.more_results_template.clone();
        for _ in 0..self.config.max_search_scrolls {
            let sig = QuerySignature::transition(&probe);
            let found = self
                .locator
                .find_element(&probe, template.as_ref(), &sig)
                .await?;
            if let Some(button) = found {
                for attempt in 1..=self.config.click_verify_attempts {
                    human::tap_region(self.device, &button.region).await?;
                    match self.wait_for_more_page().await {
                        Ok(()) => {
                            tracing::info!(attempt, "full results page open");
                            return Ok(true);
                        }
                        Err(Error::StepFailed { .. }) if attempt < self.config.click_verify_attempts => {
                            tracing::warn!(attempt, "more-results tap did not land");
                        }
                        Err(e) => return Err(e),
                    }
                }
                return Ok(false);
            }
            scroller.scroll_down_compensated().await?;
            *scrolls += 1;
            human::maybe_reading_pause().await;
        }
        Ok(false)
    }

    async fn wait_for_more_page(&mut self) -> Result<()> {
        let mut signature = StepSignature::named("more_results");
        signature.error_markers = self.config.error_markers.clone();
        if !self.locator.profile().coordinate_only {
            signature.ready_query = self.config.more_page_query.clone();
        }
        let mut detector = StateDetector::new(self.device);
        let state = detector
            .wait_ready(&signature, self.config.wait_policy)
            .await?;
        fail_on_error_page("more_results", state)
    }

    /// Navigate to results page `page` through the page-number bar
    async fn goto_page(
        &mut self,
        page: u32,
        scroller: &mut Scroller<'_>,
        scrolls: &mut u32,
    ) -> Result<bool> {
        let probe = Query::exact_text(page.to_string());
        for _ in 0..self.config.max_search_scrolls {
            let sig = QuerySignature::transition(&probe);
            if let Some(number) = self.locator.find_element(&probe, None, &sig).await? {
                human::tap_region(self.device, &number.region).await?;
                self.wait_for_more_page().await?;
                human::delay_ms(1000, 2000).await;
                tracing::info!(page, "moved to results page");
                return Ok(true);
            }
            scroller.scroll_down_compensated().await?;
            *scrolls += 1;
            human::maybe_reading_pause().await;
        }
        tracing::warn!(page, "page number never came on screen");
        Ok(false)
    }

    /// Current on-screen sightings of the target result
    ///
    /// Tree browsers query domain anchors; coordinate-only browsers probe
    /// with the target template. Always a fresh lookup, never cached.
    async fn probe_target(&mut self, target_domain: &str) -> Result<Vec<Element>> {
        if self.locator.profile().coordinate_only {
            let Some(template) = self.config.target_template.clone() else {
                return Err(Error::step_failed(
                    "find_target",
                    1,
                    "browser exposes no tree and no target template was given",
                ));
            };
            let probe = Query::text(target_domain);
            let signature = QuerySignature::transition(&probe);
            let hit = self
                .locator
                .find_element(&probe, Some(&template), &signature)
                .await?;
            return Ok(hit.into_iter().collect());
        }
        self.locator.find_domain_anchors(target_domain).await
    }

    /// Classify the result block, pick a part, click it, verify the transition
    async fn click_result(
        &mut self,
        anchor: &Element,
        target_domain: &str,
        scrolls: u32,
    ) -> Result<VisitOutcome> {
        let nearby = if self.locator.profile().coordinate_only {
            // No tree, no neighborhood; the block itself is the only target
            Vec::new()
        } else {
            self.locator.snapshot().await?.find(&Query::Below {
                anchor: anchor.region,
                max_distance: self.config.classifier.max_distance,
            })
        };
        let candidates = classify::classify(anchor, &nearby, &self.config.classifier);

        for attempt in 1..=self.config.click_verify_attempts {
            let (kind, point) = {
                let picked =
                    human::with_rng(|rng| {
                        classify::select(&candidates, &self.config.classifier, rng)
                            .map(|(c, p)| (c.kind, p))
                    });
                picked.ok_or_else(|| Error::step_failed("classify", 1, "no candidates"))?
            };

            tracing::info!(kind = %kind, x = point.0, y = point.1, attempt, "clicking result");
            human::tap_jittered(self.device, point.0, point.1).await?;
            human::delay_ms(2000, 3500).await;

            if self.verify_departure(anchor, target_domain).await? {
                return Ok(VisitOutcome {
                    clicked: kind,
                    click_point: point,
                    click_attempts: attempt,
                    scrolls,
                });
            }
            tracing::warn!(attempt, "result still on screen after click");
        }

        Err(Error::ClickVerification {
            attempts: self.config.click_verify_attempts,
        })
    }

    /// The click landed iff the anchor left the screen
    async fn verify_departure(&mut self, anchor: &Element, target_domain: &str) -> Result<bool> {
        if self.locator.profile().coordinate_only && self.config.target_template.is_none() {
            // Nothing to re-probe with; the post-click delay is the only signal
            return Ok(true);
        }
        let sightings = self.probe_target(target_domain).await?;
        if self.locator.profile().coordinate_only {
            // Template placement jitters a pixel or two between captures;
            // any sighting at all means the result page is still up
            return Ok(sightings.is_empty());
        }
        Ok(!sightings.iter().any(|a| a.region == anchor.region))
    }

    /// Stay on the landing page like a reader, then navigate back
    async fn dwell_and_return(&mut self) -> Result<()> {
        human::delay_ms(self.config.dwell_ms.0, self.config.dwell_ms.1).await;
        self.device.key_event(keycodes::BACK).await?;
        Ok(())
    }
}

/// A `Failed` verdict is terminal for the step that observed it
///
/// Without this the workflow would march on and tap into a dead page, only
/// to fail later on a step that had nothing to do with the real cause.
fn fail_on_error_page(step: &str, state: PageState) -> Result<()> {
    if state == PageState::Failed {
        return Err(Error::step_failed(step, 1, state.to_string()));
    }
    Ok(())
}

fn hint_if_applicable<'d>(
    profile: &crate::profile::BrowserProfile,
    hint: &'d dyn ScrollHint,
) -> Option<&'d dyn ScrollHint> {
    if profile.accepts_scroll_hints() {
        Some(hint)
    } else {
        tracing::debug!(browser = %profile.name, "scroll hints not applicable");
        None
    }
}
