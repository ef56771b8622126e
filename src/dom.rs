//! A small owned document model for rendered chapter content.
//!
//! Chapters arrive from the rendering engine as HTML. The annotator and the
//! interaction layer work on this tree instead of a host DOM: every node is
//! either text, an element with ordered children, or a comment that is
//! carried through untouched.

use std::fmt::Write as _;

pub const MARKER_CLASS: &str = "special-word";
pub const ATTR_WORD: &str = "data-word";
pub const ATTR_KEY: &str = "data-key";
pub const ATTR_LINK: &str = "data-link";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Element(Element),
    Comment(String),
}

impl Node {
    pub fn text(value: impl Into<String>) -> Self {
        Node::Text(value.into())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

/// Child indices leading from a root element to a node.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct NodePath(pub Vec<usize>);

impl NodePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, index: usize) -> Self {
        let mut steps = self.0.clone();
        steps.push(index);
        Self(steps)
    }
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some(slot) => slot.1 = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let index = self.attrs.iter().position(|(key, _)| key == name)?;
        Some(self.attrs.remove(index).1)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|value| value.split_whitespace().any(|c| c == class))
    }

    pub fn is_link(&self) -> bool {
        self.name == "a"
    }

    pub fn is_marker(&self) -> bool {
        self.has_class(MARKER_CLASS)
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    pub fn node_at(&self, path: &NodePath) -> Option<&Node> {
        let (last, parents) = path.0.split_last()?;
        let mut current = self;
        for index in parents {
            current = current.children.get(*index)?.as_element()?;
        }
        current.children.get(*last)
    }

    /// Elements from `self` down to the deepest element on `path`, root first.
    /// A path that ends on a text node yields that node's parent chain.
    pub fn element_chain(&self, path: &NodePath) -> Vec<&Element> {
        let mut chain = vec![self];
        let mut current = self;
        for index in &path.0 {
            match current.children.get(*index) {
                Some(Node::Element(child)) => {
                    chain.push(child);
                    current = child;
                }
                _ => break,
            }
        }
        chain
    }

    /// Paths of every marker element, in document order.
    pub fn marker_paths(&self) -> Vec<NodePath> {
        let mut paths = Vec::new();
        collect_markers(self, &NodePath::root(), &mut paths);
        paths
    }

    pub fn count_text_nodes(&self) -> usize {
        self.children
            .iter()
            .map(|child| match child {
                Node::Text(_) => 1,
                Node::Element(element) => element.count_text_nodes(),
                Node::Comment(_) => 0,
            })
            .sum()
    }

    /// Serialize the children only.
    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        let raw = RAW_TEXT_ELEMENTS.contains(&self.name.as_str());
        for child in &self.children {
            write_node(child, raw, &mut out);
        }
        out
    }

    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        write_element(self, &mut out);
        out
    }
}

fn collect_text(element: &Element, out: &mut String) {
    for child in &element.children {
        match child {
            Node::Text(text) => out.push_str(text),
            Node::Element(inner) => collect_text(inner, out),
            Node::Comment(_) => {}
        }
    }
}

fn collect_markers(element: &Element, path: &NodePath, out: &mut Vec<NodePath>) {
    for (index, child) in element.children.iter().enumerate() {
        if let Node::Element(inner) = child {
            let child_path = path.child(index);
            if inner.is_marker() {
                out.push(child_path);
            } else {
                collect_markers(inner, &child_path, out);
            }
        }
    }
}

fn write_node(node: &Node, raw_text: bool, out: &mut String) {
    match node {
        Node::Text(text) if raw_text => out.push_str(text),
        Node::Text(text) => escape_text(text, out),
        Node::Comment(comment) => {
            let _ = write!(out, "<!--{comment}-->");
        }
        Node::Element(element) => write_element(element, out),
    }
}

fn write_element(element: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&element.name);
    for (name, value) in &element.attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_attr(value, out);
        out.push('"');
    }
    out.push('>');
    if VOID_ELEMENTS.contains(&element.name.as_str()) {
        return;
    }
    out.push_str(&element.inner_html());
    out.push_str("</");
    out.push_str(&element.name);
    out.push('>');
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}
