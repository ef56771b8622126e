//! In-place annotation of a rendered chapter.
//!
//! Text nodes are split around every vocabulary match and the match is
//! replaced by a marker `<span>`. Links, scripts, styles and markers from a
//! previous pass are never descended into, so repeated passes do not nest or
//! duplicate markers.

use crate::dom::{ATTR_KEY, ATTR_LINK, ATTR_WORD, Element, MARKER_CLASS, Node};
use crate::models::AnnotationStats;
use crate::pattern::CompiledPattern;
use crate::vocabulary::{LinkMap, normalize_key};

const SKIPPED_ELEMENTS: &[&str] = &["a", "script", "style", "head", "title"];

pub const LINK_STYLE: &str = "cursor: pointer; text-decoration: underline; color: green;";
pub const LOOKUP_STYLE: &str = "cursor: pointer; text-decoration: underline; color: blue;";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Link,
    Lookup,
}

pub fn marker_kind(marker: &Element) -> MarkerKind {
    if marker.attr(ATTR_LINK).is_some() {
        MarkerKind::Link
    } else {
        MarkerKind::Lookup
    }
}

/// Annotate `root` in place. Runs in time linear in the text under `root`.
pub fn annotate(root: &mut Element, pattern: &CompiledPattern, links: &LinkMap) -> AnnotationStats {
    let mut stats = AnnotationStats::default();
    if root.is_marker() {
        refresh_marker(root, links, &mut stats);
    } else if !is_skipped(root) {
        visit(root, pattern, links, &mut stats);
    }
    stats
}

fn is_skipped(element: &Element) -> bool {
    SKIPPED_ELEMENTS.contains(&element.name.as_str())
}

fn visit(element: &mut Element, pattern: &CompiledPattern, links: &LinkMap, stats: &mut AnnotationStats) {
    let children = std::mem::take(&mut element.children);
    let mut rebuilt = Vec::with_capacity(children.len());

    for child in children {
        match child {
            Node::Text(text) => {
                stats.text_nodes_scanned += 1;
                split_text(text, pattern, links, &mut rebuilt, stats);
            }
            Node::Element(mut inner) => {
                if inner.is_marker() {
                    refresh_marker(&mut inner, links, stats);
                } else if !is_skipped(&inner) {
                    visit(&mut inner, pattern, links, stats);
                }
                rebuilt.push(Node::Element(inner));
            }
            other => rebuilt.push(other),
        }
    }

    element.children = rebuilt;
}

fn split_text(
    text: String,
    pattern: &CompiledPattern,
    links: &LinkMap,
    out: &mut Vec<Node>,
    stats: &mut AnnotationStats,
) {
    let ranges: Vec<(usize, usize)> = pattern.find_iter(&text).map(|m| (m.start(), m.end())).collect();
    if ranges.is_empty() {
        out.push(Node::Text(text));
        return;
    }

    let mut last = 0;
    for (start, end) in ranges {
        if start > last {
            out.push(Node::Text(text[last..start].to_string()));
        }
        let marker = create_marker(&text[start..end], links);
        stats.markers_created += 1;
        if marker_kind(&marker) == MarkerKind::Link {
            stats.linked_markers += 1;
        }
        out.push(Node::Element(marker));
        last = end;
    }
    if last < text.len() {
        out.push(Node::Text(text[last..].to_string()));
    }
}

/// Build a marker for the literal `word` as it appeared in the text.
pub fn create_marker(word: &str, links: &LinkMap) -> Element {
    let key = normalize_key(word);
    let mut span = Element::new("span")
        .with_attr("class", MARKER_CLASS)
        .with_attr(ATTR_WORD, word)
        .with_attr(ATTR_KEY, key.as_str());
    apply_link(&mut span, links.get(&key).map(String::as_str));
    span.children.push(Node::text(word));
    span
}

// Link and style always trail the identity attributes, so a refreshed marker
// is attribute-for-attribute equal to a freshly created one.
fn apply_link(span: &mut Element, link: Option<&str>) {
    span.remove_attr(ATTR_LINK);
    span.remove_attr("style");
    match link {
        Some(url) => {
            span.set_attr(ATTR_LINK, url);
            span.set_attr("style", LINK_STYLE);
        }
        None => span.set_attr("style", LOOKUP_STYLE),
    }
}

// A marker from an earlier pass keeps its text; only its link follows the
// current link map.
fn refresh_marker(marker: &mut Element, links: &LinkMap, stats: &mut AnnotationStats) {
    let key = marker
        .attr(ATTR_KEY)
        .map(str::to_string)
        .unwrap_or_else(|| normalize_key(&marker.text_content()));
    let wanted = links.get(&key).map(String::as_str);
    if marker.attr(ATTR_LINK) != wanted {
        apply_link(marker, wanted);
        stats.markers_refreshed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::NodePath;
    use crate::parser::parse_fragment;
    use crate::pattern::compile;
    use proptest::prelude::*;

    fn links(pairs: &[(&str, &str)]) -> LinkMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn markers(root: &Element) -> Vec<&Element> {
        root.marker_paths()
            .iter()
            .filter_map(|p| root.node_at(p).and_then(Node::as_element))
            .collect()
    }

    #[test]
    fn test_scenario_two_lookup_markers() {
        let mut root = parse_fragment("<p>It was an esoteric conundrum.</p>");
        let pattern = compile(["esoteric", "conundrum"], 1);
        let stats = annotate(&mut root, &pattern, &LinkMap::new());

        assert_eq!(stats.markers_created, 2);
        assert_eq!(stats.linked_markers, 0);
        let found = markers(&root);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|m| marker_kind(m) == MarkerKind::Lookup));
        assert!(found.iter().all(|m| m.attr("style") == Some(LOOKUP_STYLE)));
        assert_eq!(root.text_content(), "It was an esoteric conundrum.");

        let p = root.children[0].as_element().unwrap();
        assert_eq!(p.children.len(), 5);
        assert_eq!(p.children[0], Node::text("It was an "));
        assert_eq!(p.children[2], Node::text(" "));
        assert_eq!(p.children[4], Node::text("."));
    }

    #[test]
    fn test_scenario_linked_marker() {
        let mut root = parse_fragment("<p>Buy the widget today.</p>");
        let pattern = compile(["widget"], 1);
        let map = links(&[("widget", "https://shop.example/widget")]);
        let stats = annotate(&mut root, &pattern, &map);

        assert_eq!(stats.markers_created, 1);
        assert_eq!(stats.linked_markers, 1);
        let found = markers(&root);
        assert_eq!(found[0].attr(ATTR_LINK), Some("https://shop.example/widget"));
        assert_eq!(found[0].attr("style"), Some(LINK_STYLE));
        assert_eq!(marker_kind(found[0]), MarkerKind::Link);
    }

    #[test]
    fn test_marker_keeps_source_casing() {
        let mut root = parse_fragment("ARCANE lore");
        annotate(&mut root, &compile(["arcane"], 1), &LinkMap::new());
        let marker = markers(&root)[0];
        assert_eq!(marker.attr(ATTR_WORD), Some("ARCANE"));
        assert_eq!(marker.attr(ATTR_KEY), Some("arcane"));
        assert_eq!(marker.text_content(), "ARCANE");
    }

    #[test]
    fn test_links_are_not_wrapped() {
        let mut root =
            parse_fragment(r#"<p>arcane <a href="x">an <b>arcane</b> link</a> arcane</p>"#);
        let stats = annotate(&mut root, &compile(["arcane"], 1), &LinkMap::new());
        assert_eq!(stats.markers_created, 2);
        let anchor = root.node_at(&NodePath(vec![0, 2])).and_then(Node::as_element).unwrap();
        assert_eq!(anchor.name, "a");
        assert_eq!(anchor.inner_html(), "an <b>arcane</b> link");
    }

    #[test]
    fn test_scripts_and_comments_untouched() {
        let html = "<script>var arcane = 1;</script><!-- arcane --><p>arcane</p>";
        let mut root = parse_fragment(html);
        let stats = annotate(&mut root, &compile(["arcane"], 1), &LinkMap::new());
        assert_eq!(stats.markers_created, 1);
        assert!(root.inner_html().starts_with("<script>var arcane = 1;</script><!-- arcane -->"));
    }

    #[test]
    fn test_nested_elements_keep_order() {
        let html = "<div>x <em>arcane</em> y <img src=\"a.png\"> arcane z</div>";
        let mut root = parse_fragment(html);
        annotate(&mut root, &compile(["arcane"], 1), &LinkMap::new());
        let div = root.children[0].as_element().unwrap();
        let names: Vec<String> = div
            .children
            .iter()
            .map(|c| match c {
                Node::Text(t) => format!("#{t}"),
                Node::Element(e) => e.name.clone(),
                Node::Comment(_) => "!".to_string(),
            })
            .collect();
        assert_eq!(names, vec!["#x ", "em", "# y ", "img", "# ", "span", "# z"]);
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let mut root = parse_fragment("<p>It was an esoteric conundrum, truly esoteric.</p>");
        let pattern = compile(["esoteric", "conundrum"], 1);
        annotate(&mut root, &pattern, &LinkMap::new());
        let once = root.clone();
        let text_nodes = root.count_text_nodes();
        let stats = annotate(&mut root, &pattern, &LinkMap::new());
        assert_eq!(stats.markers_created, 0);
        assert_eq!(stats.markers_refreshed, 0);
        assert_eq!(root, once);
        assert_eq!(root.count_text_nodes(), text_nodes);
    }

    #[test]
    fn test_reannotation_refreshes_links() {
        let mut root = parse_fragment("<p>the widget</p>");
        let pattern = compile(["widget"], 1);
        annotate(&mut root, &pattern, &LinkMap::new());
        let stats = annotate(&mut root, &pattern, &links(&[("widget", "https://w")]));
        assert_eq!(stats.markers_created, 0);
        assert_eq!(stats.markers_refreshed, 1);
        assert_eq!(markers(&root)[0].attr(ATTR_LINK), Some("https://w"));
    }

    #[test]
    fn test_empty_pattern_changes_nothing() {
        let html = "<p>It was an <i>esoteric</i> conundrum.</p>";
        let mut root = parse_fragment(html);
        let before = root.clone();
        let stats = annotate(&mut root, &CompiledPattern::empty(), &LinkMap::new());
        assert_eq!(stats.markers_created, 0);
        assert_eq!(root, before);
    }

    #[test]
    fn test_link_root_is_skipped() {
        let mut anchor = Element::new("a").with_child(Node::text("arcane"));
        let stats = annotate(&mut anchor, &compile(["arcane"], 1), &LinkMap::new());
        assert_eq!(stats.markers_created, 0);
    }

    fn has_marker_under_link(element: &Element, inside_link: bool) -> bool {
        element.children.iter().any(|child| match child {
            Node::Element(inner) => {
                (inner.is_marker() && inside_link)
                    || has_marker_under_link(inner, inside_link || inner.is_link())
            }
            _ => false,
        })
    }

    fn has_nested_marker(element: &Element, inside_marker: bool) -> bool {
        element.children.iter().any(|child| match child {
            Node::Element(inner) => {
                (inner.is_marker() && inside_marker)
                    || has_nested_marker(inner, inside_marker || inner.is_marker())
            }
            _ => false,
        })
    }

    const WORDS: &[&str] = &["arcane", "esoteric", "cat", "category", "good", "will", "the", "widget"];

    fn document_strategy() -> impl Strategy<Value = String> {
        let token = prop_oneof![
            proptest::sample::select(WORDS).prop_map(|w| w.to_string()),
            proptest::sample::select(WORDS).prop_map(|w| format!("<a href=\"#\">{w}</a>")),
            proptest::sample::select(WORDS).prop_map(|w| format!("<em>{w}</em>")),
            Just(",".to_string()),
        ];
        proptest::collection::vec(token, 0..24).prop_map(|tokens| format!("<p>{}</p>", tokens.join(" ")))
    }

    proptest! {
        #[test]
        fn prop_annotation_is_idempotent(html in document_strategy()) {
            let pattern = compile(["arcane", "cat", "good will", "widget"], 1);
            let map = links(&[("widget", "https://w")]);
            let mut root = parse_fragment(&html);
            annotate(&mut root, &pattern, &map);
            let once = root.clone();
            let stats = annotate(&mut root, &pattern, &map);
            prop_assert_eq!(stats.markers_created, 0);
            prop_assert_eq!(root, once);
        }

        #[test]
        fn prop_no_marker_inside_links(html in document_strategy()) {
            let pattern = compile(WORDS.iter().copied(), 1);
            let mut root = parse_fragment(&html);
            let text_before = root.text_content();
            annotate(&mut root, &pattern, &LinkMap::new());
            annotate(&mut root, &pattern, &LinkMap::new());
            prop_assert!(!has_marker_under_link(&root, false));
            prop_assert!(!has_nested_marker(&root, false));
            prop_assert_eq!(root.text_content(), text_before);
        }

        #[test]
        fn prop_monotonic_convergence(
            html in document_strategy(),
            extra in proptest::sample::subsequence(vec!["esoteric", "the", "category"], 0..=3),
        ) {
            let small = vec!["arcane", "widget"];
            let mut large = small.clone();
            large.extend(extra);
            let map = links(&[("widget", "https://w"), ("the", "https://t")]);

            let mut incremental = parse_fragment(&html);
            annotate(&mut incremental, &compile(small.iter().copied(), 1), &LinkMap::new());
            annotate(&mut incremental, &compile(large.iter().copied(), 2), &map);

            let mut direct = parse_fragment(&html);
            annotate(&mut direct, &compile(large.iter().copied(), 2), &map);

            prop_assert_eq!(incremental, direct);
        }
    }
}
