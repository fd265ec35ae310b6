//! UI-tree snapshot parsing and structural queries
//!
//! The device serializes every rendered node as a `<node ... />` element with
//! descriptive attributes. Attribute order varies across platform versions,
//! so each node is parsed into a key-value map first and all queries run
//! against the map: order independence by construction, not by duplicating
//! patterns per ordering.
//!
//! Queries return an empty vec when nothing matches; only a structurally
//! broken snapshot is an error.

use aho_corasick::AhoCorasick;
use std::collections::HashMap;

use crate::element::Element;
use crate::error::{Error, Result};
use crate::geometry::Region;

/// One rendered UI node
#[derive(Debug, Clone)]
pub struct TreeNode {
    attrs: HashMap<String, String>,
    /// Decoded bounds; `None` when absent or degenerate (`[0,0][0,0]`)
    pub bounds: Option<Region>,
}

impl TreeNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(|s| s.as_str())
    }

    /// Visible text: the `text` attribute, falling back to `content-desc`
    pub fn text(&self) -> Option<&str> {
        self.attr("text")
            .filter(|s| !s.is_empty())
            .or_else(|| self.attr("content-desc").filter(|s| !s.is_empty()))
    }

    fn to_element(&self) -> Option<Element> {
        let region = self.bounds?;
        Some(Element::from_tree(region, self.text().map(str::to_owned)))
    }
}

/// Structural query over a snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Substring match on `resource-id`
    ById(String),
    /// Match on visible text; `exact` requires full equality
    Text { needle: String, exact: bool },
    /// Elements strictly below the anchor's bottom edge, within `max_distance` px
    Below { anchor: Region, max_distance: u32 },
    /// Elements strictly above the anchor's top edge, within `max_distance` px
    Above { anchor: Region, max_distance: u32 },
}

impl Query {
    pub fn by_id(id: impl Into<String>) -> Self {
        Query::ById(id.into())
    }

    pub fn text(needle: impl Into<String>) -> Self {
        Query::Text {
            needle: needle.into(),
            exact: false,
        }
    }

    pub fn exact_text(needle: impl Into<String>) -> Self {
        Query::Text {
            needle: needle.into(),
            exact: true,
        }
    }

    /// Stable string form used as a cache key component
    pub fn signature(&self) -> String {
        match self {
            Query::ById(id) => format!("id:{}", id),
            Query::Text { needle, exact } => {
                format!("text:{}:{}", needle, if *exact { "exact" } else { "sub" })
            }
            Query::Below {
                anchor,
                max_distance,
            } => format!("below:{},{}:{}", anchor.x, anchor.bottom(), max_distance),
            Query::Above {
                anchor,
                max_distance,
            } => format!("above:{},{}:{}", anchor.x, anchor.y, max_distance),
        }
    }
}

/// Parsed UI-tree snapshot
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    nodes: Vec<TreeNode>,
    raw: String,
}

impl TreeSnapshot {
    /// Parse a serialized dump
    ///
    /// Tolerates leading shell noise before the XML (transport artifacts) but
    /// rejects snapshots with no node structure or broken attribute syntax.
    pub fn parse(raw: &str) -> Result<TreeSnapshot> {
        let mut nodes = Vec::new();
        let mut rest = raw;

        while let Some(start) = rest.find("<node") {
            let tag = &rest[start..];
            // Tag ends at the first unquoted '>'
            let end = find_tag_end(tag)
                .ok_or_else(|| Error::TreeParse("unterminated <node> tag".into()))?;
            let body = &tag[5..end];
            let attrs = parse_attrs(body)?;
            let bounds = attrs
                .get("bounds")
                .and_then(|b| parse_bounds(b))
                .filter(|r| !r.is_empty());
            nodes.push(TreeNode { attrs, bounds });
            rest = &tag[end..];
        }

        if nodes.is_empty() {
            return Err(Error::TreeParse("no UI nodes in snapshot".into()));
        }

        Ok(TreeSnapshot {
            nodes,
            raw: raw.to_string(),
        })
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Run a structural query; empty vec means not found, never an error
    pub fn find(&self, query: &Query) -> Vec<Element> {
        match query {
            Query::ById(id) => self
                .nodes
                .iter()
                .filter(|n| n.attr("resource-id").is_some_and(|v| v.contains(id.as_str())))
                .filter_map(TreeNode::to_element)
                .collect(),
            Query::Text { needle, exact } => self
                .nodes
                .iter()
                .filter(|n| match n.text() {
                    // Substring hits still carry the node's full text, never
                    // just the needle; classification downstream needs it.
                    Some(t) if *exact => t == needle,
                    Some(t) => t.contains(needle.as_str()),
                    None => false,
                })
                .filter_map(TreeNode::to_element)
                .collect(),
            Query::Below {
                anchor,
                max_distance,
            } => self
                .elements()
                .filter(|e| {
                    e.region.y >= anchor.bottom()
                        && (e.region.y - anchor.bottom()) as u32 <= *max_distance
                })
                .collect(),
            Query::Above {
                anchor,
                max_distance,
            } => self
                .elements()
                .filter(|e| {
                    e.region.bottom() <= anchor.y
                        && (anchor.y - e.region.bottom()) as u32 <= *max_distance
                })
                .collect(),
        }
    }

    fn elements(&self) -> impl Iterator<Item = Element> + '_ {
        self.nodes.iter().filter_map(TreeNode::to_element)
    }

    /// Cheap multi-label presence scan over the raw snapshot
    pub fn contains_any(&self, labels: &[impl AsRef<str>]) -> bool {
        if labels.is_empty() {
            return false;
        }
        let ac = AhoCorasick::new(labels.iter().map(|l| l.as_ref()))
            .expect("label set builds a valid automaton");
        ac.is_match(&self.raw)
    }

    /// First matching button for an ordered label list
    ///
    /// Exact text matches win over substring matches across the whole list,
    /// mirroring how first-run dialogs are probed: a dialog showing both
    /// "계속" and "계속하지 않음" must dismiss via the exact label.
    pub fn find_button(&self, labels: &[impl AsRef<str>]) -> Option<(usize, Element)> {
        for (i, label) in labels.iter().enumerate() {
            let hits = self.find(&Query::exact_text(label.as_ref()));
            if let Some(e) = hits.into_iter().next() {
                return Some((i, e));
            }
        }
        for (i, label) in labels.iter().enumerate() {
            let hits = self.find(&Query::text(label.as_ref()));
            if let Some(e) = hits.into_iter().next() {
                return Some((i, e));
            }
        }
        None
    }

    /// All elements whose text names exactly `domain` (no subpage suffix)
    ///
    /// Matches `example.co.kr` but rejects `example.co.kr/lessons` and
    /// `example.co.kr › lessons` unless the query itself carries the path.
    /// Favicon/image URLs that merely embed the domain are filtered out.
    pub fn find_domain_anchors(&self, domain: &str) -> Vec<Element> {
        let has_path = domain.contains('/') && !domain.ends_with('/');
        let base = domain.split('/').next().unwrap_or(domain);

        self.nodes
            .iter()
            .filter_map(|n| {
                let text = n.text()?;
                if !text.to_lowercase().contains(&base.to_lowercase()) {
                    return None;
                }
                // URL-encoded artifacts (favicon proxies etc.)
                if text.contains("%2F") || text.contains("%3A") {
                    return None;
                }
                let lower = text.to_lowercase();
                if lower.starts_with("http://") || lower.starts_with("https://") {
                    return None;
                }
                if has_path {
                    if !text.contains(domain) {
                        return None;
                    }
                } else {
                    // Reject subpage renderings: "example.com/x", "example.com › x"
                    let after = text.split(domain).last().unwrap_or("").trim_start();
                    if !text.contains(domain) || after.starts_with(['/', '›', '>']) {
                        return None;
                    }
                }
                n.to_element()
            })
            .collect()
    }
}

/// Find the byte offset of the '>' closing the current tag, skipping quoted values
fn find_tag_end(tag: &str) -> Option<usize> {
    let mut in_quotes = false;
    for (i, b) in tag.bytes().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'>' if !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

/// Parse `name="value"` pairs from a tag body
fn parse_attrs(body: &str) -> Result<HashMap<String, String>> {
    let mut attrs = HashMap::new();
    let mut rest = body.trim_start();

    while !rest.is_empty() && rest != "/" {
        let eq = match rest.find('=') {
            Some(i) => i,
            None => break, // trailing "/" or whitespace
        };
        let name = rest[..eq].trim();
        let after = &rest[eq + 1..];
        if !after.starts_with('"') {
            return Err(Error::TreeParse(format!(
                "attribute '{}' missing quoted value",
                name
            )));
        }
        let value_body = &after[1..];
        let close = value_body
            .find('"')
            .ok_or_else(|| Error::TreeParse(format!("unterminated value for '{}'", name)))?;
        attrs.insert(name.to_string(), unescape(&value_body[..close]));
        rest = value_body[close + 1..].trim_start();
    }

    Ok(attrs)
}

/// Parse `[x1,y1][x2,y2]`
fn parse_bounds(s: &str) -> Option<Region> {
    let s = s.strip_prefix('[')?;
    let (first, second) = s.split_once("][")?;
    let second = second.strip_suffix(']')?;
    let (x1, y1) = first.split_once(',')?;
    let (x2, y2) = second.split_once(',')?;
    Some(Region::from_corners(
        x1.trim().parse().ok()?,
        y1.trim().parse().ok()?,
        x2.trim().parse().ok()?,
        y2.trim().parse().ok()?,
    ))
}

/// Decode the XML entities the dump emits
fn unescape(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<hierarchy rotation="0">
  <node index="0" text="" resource-id="android:id/content" class="android.widget.FrameLayout" bounds="[0,0][720,1440]">
    <node index="1" text="검색결과 더보기" resource-id="" class="android.widget.TextView" bounds="[80,900][640,960]" />
    <node index="2" resource-id="com.nhn.android:id/MM_SEARCH_FAKE" text="" bounds="[143,295][603,393]" class="android.widget.EditText" />
    <node index="3" bounds="[100,500][620,540]" text="sidecut.co.kr" class="android.widget.TextView" />
    <node index="4" text="sidecut.co.kr › lessons" bounds="[100,560][620,595]" class="android.widget.TextView" />
    <node index="5" text="" content-desc="계속" bounds="[200,1200][520,1280]" class="android.widget.Button" />
    <node index="6" text="ghost" bounds="[0,0][0,0]" class="android.widget.TextView" />
  </node>
</hierarchy>"#;

    #[test]
    fn test_parse_counts_nodes_and_drops_zero_bounds() {
        let tree = TreeSnapshot::parse(SAMPLE).unwrap();
        assert_eq!(tree.nodes().len(), 7);
        // ghost node parses but has no usable bounds
        let ghost = tree.find(&Query::exact_text("ghost"));
        assert!(ghost.is_empty());
    }

    #[test]
    fn test_by_id_tolerates_attribute_order() {
        let tree = TreeSnapshot::parse(SAMPLE).unwrap();
        // node 2 serializes resource-id before bounds; node 3 the reverse
        let fake = tree.find(&Query::by_id("MM_SEARCH_FAKE"));
        assert_eq!(fake.len(), 1);
        assert_eq!(fake[0].region, Region::from_corners(143, 295, 603, 393));
        assert_eq!(fake[0].confidence, 1.0);
    }

    #[test]
    fn test_substring_match_returns_full_text() {
        let tree = TreeSnapshot::parse(SAMPLE).unwrap();
        let hits = tree.find(&Query::text("더보기"));
        assert_eq!(hits.len(), 1);
        // The whole node text must come back, not the needle or ""
        assert_eq!(hits[0].text.as_deref(), Some("검색결과 더보기"));
    }

    #[test]
    fn test_exact_vs_substring() {
        let tree = TreeSnapshot::parse(SAMPLE).unwrap();
        assert!(tree.find(&Query::exact_text("더보기")).is_empty());
        assert_eq!(tree.find(&Query::exact_text("검색결과 더보기")).len(), 1);
    }

    #[test]
    fn test_content_desc_fallback() {
        let tree = TreeSnapshot::parse(SAMPLE).unwrap();
        let hits = tree.find(&Query::exact_text("계속"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].region.center(), (360, 1240));
    }

    #[test]
    fn test_relative_queries() {
        let tree = TreeSnapshot::parse(SAMPLE).unwrap();
        let anchor = Region::from_corners(100, 500, 620, 540);

        let below = tree.find(&Query::Below {
            anchor,
            max_distance: 100,
        });
        assert!(below
            .iter()
            .any(|e| e.text.as_deref() == Some("sidecut.co.kr › lessons")));

        let above = tree.find(&Query::Above {
            anchor,
            max_distance: 200,
        });
        assert!(above
            .iter()
            .any(|e| e.region == Region::from_corners(143, 295, 603, 393)));
    }

    #[test]
    fn test_domain_anchor_excludes_subpages() {
        let tree = TreeSnapshot::parse(SAMPLE).unwrap();
        let anchors = tree.find_domain_anchors("sidecut.co.kr");
        assert_eq!(anchors.len(), 1);
        assert_eq!(anchors[0].text.as_deref(), Some("sidecut.co.kr"));

        // Path query flips the selection
        let with_path = tree.find_domain_anchors("sidecut.co.kr › lessons");
        assert_eq!(with_path.len(), 1);
    }

    #[test]
    fn test_find_button_prefers_exact() {
        let raw = r#"<node text="계속하지 않음" bounds="[0,0][100,40]" /><node text="계속" bounds="[0,50][100,90]" />"#;
        let tree = TreeSnapshot::parse(raw).unwrap();
        let (idx, e) = tree.find_button(&["계속"]).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(e.text.as_deref(), Some("계속"));
    }

    #[test]
    fn test_contains_any() {
        let tree = TreeSnapshot::parse(SAMPLE).unwrap();
        assert!(tree.contains_any(&["naver", "MM_SEARCH"]));
        assert!(!tree.contains_any(&["zzz-not-here"]));
    }

    #[test]
    fn test_malformed_tree_is_error() {
        assert!(matches!(
            TreeSnapshot::parse("plain text, no nodes"),
            Err(Error::TreeParse(_))
        ));
        assert!(matches!(
            TreeSnapshot::parse(r#"<node text="unterminated"#),
            Err(Error::TreeParse(_))
        ));
    }

    #[test]
    fn test_entity_unescape() {
        let raw = r#"<node text="A &amp; B &gt; C" bounds="[0,0][10,10]" />"#;
        let tree = TreeSnapshot::parse(raw).unwrap();
        let hits = tree.find(&Query::text("A & B"));
        assert_eq!(hits[0].text.as_deref(), Some("A & B > C"));
    }
}
