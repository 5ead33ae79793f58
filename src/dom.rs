//! Owned, pre-order DOM arena.
//!
//! The classifier and segmenter only see `DomIndex`/`NodeRef`, never the
//! parser's own node types. Node ids are pre-order indices, so an id is also
//! the node's document position and a subtree is the contiguous id range
//! `id..=end`.

use ego_tree::iter::Edge;
use scraper::{Html, Node as HtmlNode};

pub type NodeId = usize;

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];
const RAW_TEXT_TAGS: &[&str] = &["script", "style"];
pub const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

#[derive(Debug, Clone)]
enum NodeKind {
    Document,
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    end: NodeId,
}

#[derive(Debug, Clone)]
pub struct DomIndex {
    nodes: Vec<Node>,
}

impl DomIndex {
    /// Parse a full document. Comments, doctypes and processing instructions are dropped.
    pub fn parse(html: &str) -> Self {
        let doc = Html::parse_document(html);
        let mut nodes: Vec<Node> = Vec::new();
        // `None` marks a skipped node so Open/Close stay balanced.
        let mut stack: Vec<Option<NodeId>> = Vec::new();

        for edge in doc.tree.root().traverse() {
            match edge {
                Edge::Open(node) => {
                    let kind = match node.value() {
                        HtmlNode::Document | HtmlNode::Fragment => Some(NodeKind::Document),
                        HtmlNode::Element(el) => {
                            let mut attrs: Vec<(String, String)> = el
                                .attrs()
                                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                                .collect();
                            // parser attribute order is not guaranteed; serialization must be stable
                            attrs.sort();
                            Some(NodeKind::Element {
                                tag: el.name().to_ascii_lowercase(),
                                attrs,
                            })
                        }
                        HtmlNode::Text(t) => Some(NodeKind::Text(String::from(&**t))),
                        _ => None,
                    };
                    let Some(kind) = kind else {
                        stack.push(None);
                        continue;
                    };
                    let id = nodes.len();
                    let parent = stack.iter().rev().find_map(|p| *p);
                    if let Some(p) = parent {
                        nodes[p].children.push(id);
                    }
                    nodes.push(Node {
                        kind,
                        parent,
                        children: Vec::new(),
                        end: id,
                    });
                    stack.push(Some(id));
                }
                Edge::Close(_) => {
                    if let Some(Some(id)) = stack.pop() {
                        nodes[id].end = nodes.len() - 1;
                    }
                }
            }
        }

        if nodes.is_empty() {
            nodes.push(Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
                end: 0,
            });
        }

        DomIndex { nodes }
    }

    pub fn root(&self) -> NodeRef<'_> {
        self.node(0)
    }

    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef { dom: self, id }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// All elements with one of `tags`, in document order.
    pub fn find_all(&self, tags: &[&str]) -> Vec<NodeRef<'_>> {
        self.root().find_all(tags)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    dom: &'a DomIndex,
    id: NodeId,
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && std::ptr::eq(self.dom, other.dom)
    }
}

impl<'a> NodeRef<'a> {
    fn raw(&self) -> &'a Node {
        &self.dom.nodes[self.id]
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tag(&self) -> Option<&'a str> {
        match &self.raw().kind {
            NodeKind::Element { tag, .. } => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        self.tag().is_some()
    }

    pub fn is_tag(&self, tags: &[&str]) -> bool {
        self.tag().is_some_and(|t| tags.contains(&t))
    }

    pub fn attr(&self, name: &str) -> Option<&'a str> {
        match &self.raw().kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Whitespace-separated tokens of `class` plus the `id`, lower-cased.
    pub fn class_tokens(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self
            .attr("class")
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();
        if let Some(id) = self.attr("id") {
            tokens.push(id.to_lowercase());
        }
        tokens
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.raw().parent.map(|p| self.dom.node(p))
    }

    /// Element ancestors, nearest first.
    pub fn ancestors(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let dom = self.dom;
        let mut cur = self.raw().parent;
        std::iter::from_fn(move || {
            let id = cur?;
            cur = dom.nodes[id].parent;
            Some(dom.node(id))
        })
        .filter(|n| n.is_element())
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let dom = self.dom;
        self.raw().children.iter().map(move |&c| dom.node(c))
    }

    pub fn element_children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        self.children().filter(|c| c.is_element())
    }

    /// Element siblings after this node, in document order.
    pub fn next_element_siblings(&self) -> Vec<NodeRef<'a>> {
        let Some(parent) = self.parent() else {
            return Vec::new();
        };
        parent
            .element_children()
            .skip_while(|c| c.id <= self.id)
            .collect()
    }

    /// Element siblings before this node, nearest first.
    pub fn prev_element_siblings(&self) -> Vec<NodeRef<'a>> {
        let Some(parent) = self.parent() else {
            return Vec::new();
        };
        let mut before: Vec<_> = parent
            .element_children()
            .take_while(|c| c.id < self.id)
            .collect();
        before.reverse();
        before
    }

    /// Every node strictly inside this subtree, in document order.
    pub fn descendants(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let dom = self.dom;
        (self.id + 1..=self.raw().end).map(move |i| dom.node(i))
    }

    pub fn find_all(&self, tags: &[&str]) -> Vec<NodeRef<'a>> {
        self.descendants().filter(|n| n.is_tag(tags)).collect()
    }

    /// True when `self` is `tags` or has a descendant that is.
    pub fn has_tag(&self, tags: &[&str]) -> bool {
        self.is_tag(tags) || self.descendants().any(|n| n.is_tag(tags))
    }

    pub fn end(&self) -> NodeId {
        self.raw().end
    }

    /// Text content with whitespace collapsed. Script and style bodies are ignored.
    pub fn text(&self) -> String {
        if let NodeKind::Text(t) = &self.raw().kind {
            return collapse_ws(t);
        }
        let mut parts = Vec::new();
        let mut skip_until: Option<NodeId> = None;
        for n in self.descendants() {
            if skip_until.is_some_and(|end| n.id <= end) {
                continue;
            }
            if n.is_tag(RAW_TEXT_TAGS) {
                skip_until = Some(n.end());
                continue;
            }
            if let NodeKind::Text(t) = &n.raw().kind {
                parts.push(t.as_str());
            }
        }
        collapse_ws(&parts.join(" "))
    }

    /// Serialize this subtree, dropping every element for which `skip` is true.
    pub fn outer_html_filtered(&self, skip: &dyn Fn(NodeRef<'_>) -> bool) -> String {
        let mut out = String::new();
        self.write_html(&mut out, skip, false);
        out
    }

    fn write_html(&self, out: &mut String, skip: &dyn Fn(NodeRef<'_>) -> bool, raw_text: bool) {
        match &self.raw().kind {
            NodeKind::Document => {
                for c in self.children() {
                    c.write_html(out, skip, false);
                }
            }
            NodeKind::Text(t) => {
                if raw_text {
                    out.push_str(t);
                } else {
                    out.push_str(&escape_text(t));
                }
            }
            NodeKind::Element { tag, attrs } => {
                if skip(*self) {
                    return;
                }
                out.push('<');
                out.push_str(tag);
                for (k, v) in attrs {
                    out.push(' ');
                    out.push_str(k);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(v));
                    out.push('"');
                }
                out.push('>');
                if VOID_TAGS.contains(&tag.as_str()) {
                    return;
                }
                let raw = RAW_TEXT_TAGS.contains(&tag.as_str());
                for c in self.children() {
                    c.write_html(out, skip, raw);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

pub fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;")
}
