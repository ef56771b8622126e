use crate::dom::{Element, Node};
use eyre::Result;
use html2text::config;
use scraper::{ElementRef, Html, Selector, node::Node as HtmlNode};

/// Parse a full chapter document and return its `<body>` as an owned tree.
/// Documents without a body (rare in practice) fall back to the root element.
pub fn parse_chapter(html_src: &str) -> Element {
    let document = Html::parse_document(html_src);
    let body_selector = Selector::parse("body").unwrap();
    match document.select(&body_selector).next() {
        Some(body) => convert_element(body),
        None => convert_element(document.root_element()),
    }
}

/// Parse an HTML fragment into a synthetic `<body>` root.
pub fn parse_fragment(html_src: &str) -> Element {
    let fragment = Html::parse_fragment(html_src);
    let mut root = convert_element(fragment.root_element());
    root.name = "body".to_string();
    root
}

fn convert_element(element: ElementRef<'_>) -> Element {
    let value = element.value();
    let mut out = Element::new(value.name());
    out.attrs = value
        .attrs()
        .map(|(name, val)| (name.to_string(), val.to_string()))
        .collect();

    for child in element.children() {
        match child.value() {
            HtmlNode::Text(text) => push_text(&mut out.children, &text.text),
            HtmlNode::Comment(comment) => out.children.push(Node::Comment(comment.comment.to_string())),
            HtmlNode::Element(_) => {
                if let Some(child_ref) = ElementRef::wrap(child) {
                    out.children.push(Node::Element(convert_element(child_ref)));
                }
            }
            _ => {}
        }
    }
    out
}

// html5ever already coalesces text, but keep adjacent runs merged regardless.
fn push_text(children: &mut Vec<Node>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Node::Text(previous)) = children.last_mut() {
        previous.push_str(text);
    } else {
        children.push(Node::Text(text.to_string()));
    }
}

/// Convert HTML to wrapped plain text lines using html2text.
pub fn html_to_plain_text(html: &str, width: usize) -> Result<Vec<String>> {
    let text = config::plain()
        .link_footnotes(false)
        .string_from_read(html.as_bytes(), width.max(1))?;
    let lines: Vec<String> = text.lines().map(|s| s.to_string()).collect();
    Ok(lines)
}

/// Column width of the reading text. Wide enough that only block boundaries
/// break lines; pages are wrapped to the terminal after slicing.
const READING_WIDTH: usize = 10_000;

const MARK_OPEN: char = '\u{E000}';
const MARK_CLOSE: char = '\u{E001}';
const MARK_CLOSE_LINKED: char = '\u{E002}';

/// Readable text of a chapter body: html2text output, one line per block.
/// Locations and page offsets count characters of this text.
pub fn reading_text(root: &Element) -> Result<String> {
    let lines = html_to_plain_text(&root.outer_html(), READING_WIDTH)?;
    Ok(lines.join("\n"))
}

/// Character count of a chapter's reading text, used to size location units.
pub fn plain_text_len(html: &str) -> Result<usize> {
    Ok(reading_text(&parse_chapter(html))?.chars().count())
}

/// Characters `start..start + len` of the chapter's reading text. Markers
/// inside the window are shown as `[word]`, linked ones as `[word]*`; a marker
/// cut by either edge is bracketed on its visible part.
pub fn render_page(root: &Element, start: usize, len: usize) -> Result<String> {
    let mut flattened = root.clone();
    flatten_markers(&mut flattened);
    let text = reading_text(&flattened)?;

    let end = start.saturating_add(len);
    let mut page = String::new();
    let mut offset = 0;
    let mut in_marker = false;
    let mut bracket_open = false;
    for ch in text.chars() {
        match ch {
            MARK_OPEN => {
                in_marker = true;
                if offset >= start && offset < end {
                    page.push('[');
                    bracket_open = true;
                }
            }
            MARK_CLOSE | MARK_CLOSE_LINKED => {
                in_marker = false;
                if bracket_open {
                    page.push(']');
                    if ch == MARK_CLOSE_LINKED {
                        page.push('*');
                    }
                    bracket_open = false;
                }
            }
            _ => {
                if offset >= end {
                    break;
                }
                if offset >= start {
                    if in_marker && !bracket_open {
                        page.push('[');
                        bracket_open = true;
                    }
                    page.push(ch);
                }
                offset += 1;
            }
        }
    }
    if bracket_open {
        page.push(']');
    }
    Ok(page)
}

fn flatten_markers(element: &mut Element) {
    for child in element.children.iter_mut() {
        let replacement = match child {
            Node::Element(inner) if inner.is_marker() => {
                let close = if inner.attr(crate::dom::ATTR_LINK).is_some() {
                    MARK_CLOSE_LINKED
                } else {
                    MARK_CLOSE
                };
                Some(Node::Text(format!("{MARK_OPEN}{}{close}", inner.text_content())))
            }
            Node::Element(inner) => {
                flatten_markers(inner);
                None
            }
            _ => None,
        };
        if let Some(node) = replacement {
            *child = node;
        }
    }
}
