//! Search-result link classification and click-target selection
//!
//! Takes the flat set of elements found near a matched domain anchor and
//! turns it into typed click candidates (domain / title / description),
//! excluding sublinks and unrelated blocks. Selection is kind-first: pick a
//! kind uniformly among those present, then an element within the kind, then
//! a point inside the element. Element-first selection would let pages with
//! many description nodes dominate the click distribution, which is exactly
//! the observable bias this exists to avoid.

use rand::Rng;

use crate::element::Element;
use crate::geometry::Region;

/// Candidate kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    Domain,
    Title,
    Description,
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LinkKind::Domain => "domain",
            LinkKind::Title => "title",
            LinkKind::Description => "description",
        };
        write!(f, "{}", s)
    }
}

/// A typed click candidate
#[derive(Debug, Clone, PartialEq)]
pub struct LinkCandidate {
    pub element: Element,
    pub kind: LinkKind,
}

/// Classifier thresholds and keyword lists
///
/// All tunable configuration data; the keyword lists are per-domain and come
/// from the caller's configuration surface.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Max text length for the sublink rule (rule order matters: without
    /// this bound, sublink keywords inside long titles/descriptions would
    /// wrongly exclude them)
    pub sublink_max_len: usize,
    /// Sublink navigation texts ("lessons", "about", "리뷰", ...)
    pub sublink_keywords: Vec<String>,
    /// Max vertical distance from the anchor before an element is treated
    /// as belonging to an unrelated result block
    pub max_distance: u32,
    /// Title window below the anchor
    pub title_distance: u32,
    /// Keywords bridging a registered domain to its localized display title
    pub title_keywords: Vec<String>,
    /// Min text length for the description rule
    pub desc_min_len: usize,
    /// Per-side inset when picking the click point
    pub click_margin: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            sublink_max_len: 10,
            sublink_keywords: Vec::new(),
            max_distance: 300,
            title_distance: 100,
            title_keywords: Vec::new(),
            desc_min_len: 50,
            click_margin: 0.15,
        }
    }
}

impl ClassifierConfig {
    fn is_sublink(&self, text: &str) -> bool {
        text.chars().count() <= self.sublink_max_len
            && self
                .sublink_keywords
                .iter()
                .any(|k| text.contains(k.as_str()))
    }

    fn is_title(&self, text: &str) -> bool {
        self.title_keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

/// Classify the elements near an anchor into click candidates
///
/// Rules apply in order: sublink exclusion, out-of-region exclusion, title,
/// description. The anchor itself is always a domain candidate. No candidate
/// overlaps a region identified as a sublink.
pub fn classify(
    anchor: &Element,
    nearby: &[Element],
    config: &ClassifierConfig,
) -> Vec<LinkCandidate> {
    let anchor_y = anchor.region.y;
    let mut sublink_regions: Vec<Region> = Vec::new();
    let mut candidates = vec![LinkCandidate {
        element: anchor.clone(),
        kind: LinkKind::Domain,
    }];

    // First pass: collect sublink regions so nothing overlapping them can
    // become a candidate of another kind.
    for element in nearby {
        if config.is_sublink(element.text_or_empty()) {
            tracing::debug!(text = element.text_or_empty(), "excluded: sublink");
            sublink_regions.push(element.region);
        }
    }

    for element in nearby {
        let text = element.text_or_empty();
        if config.is_sublink(text) {
            continue;
        }
        if sublink_regions.iter().any(|s| element.region.intersects(s)) {
            tracing::debug!(text, "excluded: overlaps sublink");
            continue;
        }

        let element_y = element.region.y;
        if element_y < anchor_y {
            tracing::debug!(text, "excluded: above anchor");
            continue;
        }
        let distance = (element_y - anchor_y) as u32;
        if distance > config.max_distance {
            tracing::debug!(text, distance, "excluded: out of result block");
            continue;
        }

        if distance <= config.title_distance && config.is_title(text) {
            candidates.push(LinkCandidate {
                element: element.clone(),
                kind: LinkKind::Title,
            });
            continue;
        }

        if text.chars().count() >= config.desc_min_len {
            candidates.push(LinkCandidate {
                element: element.clone(),
                kind: LinkKind::Description,
            });
        }
    }

    candidates
}

/// Pick one candidate and a click point inside it
///
/// Kind chosen uniformly among kinds with members, element uniformly within
/// the kind, point uniformly within the region inset by `click_margin`.
pub fn select<'a, R: Rng>(
    candidates: &'a [LinkCandidate],
    config: &ClassifierConfig,
    rng: &mut R,
) -> Option<(&'a LinkCandidate, (i32, i32))> {
    const KINDS: [LinkKind; 3] = [LinkKind::Domain, LinkKind::Title, LinkKind::Description];

    let present: Vec<LinkKind> = KINDS
        .iter()
        .copied()
        .filter(|k| candidates.iter().any(|c| c.kind == *k))
        .collect();
    if present.is_empty() {
        return None;
    }

    let kind = present[rng.gen_range(0..present.len())];
    let of_kind: Vec<&LinkCandidate> = candidates.iter().filter(|c| c.kind == kind).collect();
    let chosen = of_kind[rng.gen_range(0..of_kind.len())];
    let point = chosen.element.region.random_point_inset(config.click_margin, rng);

    tracing::debug!(kind = %kind, x = point.0, y = point.1, "click target selected");
    Some((chosen, point))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn text_element(x: i32, y: i32, w: u32, h: u32, text: &str) -> Element {
        Element::from_tree(Region::new(x, y, w, h), Some(text.to_string()))
    }

    fn config() -> ClassifierConfig {
        ClassifierConfig {
            sublink_keywords: vec!["lessons".into(), "about".into(), "리뷰".into()],
            title_keywords: vec!["사이드컷".into(), "sidecut".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_synthetic_set_classifies_per_rule() {
        let anchor = text_element(100, 500, 400, 40, "sidecut.co.kr");
        let nearby = vec![
            // 8-char sublink keyword text: excluded
            text_element(100, 550, 120, 25, "lessons."),
            // 120-char text: description
            text_element(100, 620, 520, 40, &"설명 ".repeat(40)),
            // 80px below anchor, contains title keyword: title
            text_element(100, 580, 400, 40, "사이드컷 헤어샵 - 강남점"),
        ];

        let candidates = classify(&anchor, &nearby, &config());

        let mut counts: HashMap<LinkKind, usize> = HashMap::new();
        for c in &candidates {
            *counts.entry(c.kind).or_default() += 1;
        }
        assert_eq!(counts.get(&LinkKind::Domain), Some(&1));
        assert_eq!(counts.get(&LinkKind::Title), Some(&1));
        assert_eq!(counts.get(&LinkKind::Description), Some(&1));
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn test_sublink_keyword_in_long_text_not_excluded() {
        let anchor = text_element(100, 500, 400, 40, "sidecut.co.kr");
        let long = format!("all about the lessons we offer {}", "x".repeat(40));
        let nearby = vec![text_element(100, 560, 520, 40, &long)];

        let candidates = classify(&anchor, &nearby, &config());
        // Length bound keeps the keyword match from firing on a description
        assert!(candidates.iter().any(|c| c.kind == LinkKind::Description));
    }

    #[test]
    fn test_above_anchor_and_distant_excluded() {
        let anchor = text_element(100, 500, 400, 40, "sidecut.co.kr");
        let nearby = vec![
            // Decorative block stacked above the result
            text_element(100, 300, 520, 40, &"위 ".repeat(40)),
            // Unrelated result block far below
            text_element(100, 900, 520, 40, &"아래 ".repeat(40)),
        ];

        let candidates = classify(&anchor, &nearby, &config());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind, LinkKind::Domain);
    }

    #[test]
    fn test_candidate_overlapping_sublink_region_excluded() {
        let anchor = text_element(100, 500, 400, 40, "sidecut.co.kr");
        let nearby = vec![
            text_element(100, 560, 120, 30, "lessons."),
            // Long text sharing pixels with the sublink row
            text_element(110, 570, 520, 40, &"겹침 ".repeat(30)),
        ];

        let candidates = classify(&anchor, &nearby, &config());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind, LinkKind::Domain);
    }

    #[test]
    fn test_title_keyword_outside_window_is_not_title() {
        let anchor = text_element(100, 500, 400, 40, "sidecut.co.kr");
        // Keyword present but 150px below: outside the 100px title window,
        // and too short for a description
        let nearby = vec![text_element(100, 650, 400, 40, "사이드컷 지점 안내")];

        let candidates = classify(&anchor, &nearby, &config());
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_selection_fairness_across_kinds() {
        let anchor = text_element(100, 500, 400, 40, "sidecut.co.kr");
        let nearby = vec![
            text_element(100, 580, 400, 40, "사이드컷 헤어샵"),
            // Several descriptions: must not skew kind frequency
            text_element(100, 620, 520, 40, &"a".repeat(60)),
            text_element(100, 670, 520, 40, &"b".repeat(60)),
            text_element(100, 720, 520, 40, &"c".repeat(60)),
        ];
        let cfg = config();
        let candidates = classify(&anchor, &nearby, &cfg);

        let mut rng = rand::thread_rng();
        let mut counts: HashMap<LinkKind, u32> = HashMap::new();
        const N: u32 = 3000;
        for _ in 0..N {
            let (chosen, _) = select(&candidates, &cfg, &mut rng).unwrap();
            *counts.entry(chosen.kind).or_default() += 1;
        }

        for kind in [LinkKind::Domain, LinkKind::Title, LinkKind::Description] {
            let freq = *counts.get(&kind).unwrap_or(&0) as f64 / N as f64;
            assert!(
                (freq - 1.0 / 3.0).abs() < 0.03,
                "{} frequency {} outside 1/3 ± 3%",
                kind,
                freq
            );
        }
    }

    #[test]
    fn test_selection_point_respects_margin() {
        let anchor = text_element(100, 500, 400, 40, "sidecut.co.kr");
        let cfg = config();
        let candidates = classify(&anchor, &[], &cfg);
        let mut rng = rand::thread_rng();

        for _ in 0..200 {
            let (_, (x, y)) = select(&candidates, &cfg, &mut rng).unwrap();
            assert!((160..440).contains(&x), "x {} outside 15% inset", x);
            assert!((506..534).contains(&y), "y {} outside 15% inset", y);
        }
    }

    #[test]
    fn test_empty_candidates_select_none() {
        let cfg = config();
        let mut rng = rand::thread_rng();
        assert!(select(&[], &cfg, &mut rng).is_none());
    }
}
