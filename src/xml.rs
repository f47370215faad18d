//! Mutable XML tree stored as an index arena.
//!
//! Nodes never move once allocated. Detaching a node only unlinks it from its
//! parent, so a `NodeId` stays valid for the lifetime of the tree and can be
//! re-inserted elsewhere.

use std::borrow::Cow;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// Qualified name (`w:p`) and attributes in document order, namespace
    /// declarations included as `xmlns`/`xmlns:*` attributes.
    Element {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Clone, Debug)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    kind: NodeKind,
}

#[derive(Clone, Debug)]
pub struct XmlTree {
    nodes: Vec<Node>,
    root: NodeId,
}

/// Local part of a qualified name (`w:p` → `p`).
pub fn local_name(qname: &str) -> &str {
    qname.rsplit_once(':').map(|(_, l)| l).unwrap_or(qname)
}

fn prefix_of(qname: &str) -> Option<&str> {
    qname.split_once(':').map(|(p, _)| p)
}

impl XmlTree {
    pub fn parse(text: &str) -> Result<Self, roxmltree::Error> {
        let doc = roxmltree::Document::parse(text)?;
        let mut tree = XmlTree {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        tree.root = tree.import_ro(doc.root_element(), None);
        Ok(tree)
    }

    /// New tree with a single empty root element.
    pub fn with_root(name: &str, attrs: &[(&str, &str)]) -> Self {
        let mut tree = XmlTree {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        tree.root = tree.new_element(name, attrs);
        tree
    }

    fn import_ro(&mut self, node: roxmltree::Node, parent_scope: Option<roxmltree::Node>) -> NodeId {
        let mut attrs = Vec::new();
        for ns in node.namespaces() {
            if ns.uri() == XML_NS {
                continue;
            }
            let inherited = parent_scope.is_some_and(|p| {
                p.namespaces()
                    .any(|pns| pns.name() == ns.name() && pns.uri() == ns.uri())
            });
            if inherited {
                continue;
            }
            let key = match ns.name() {
                Some(prefix) => format!("xmlns:{prefix}"),
                None => "xmlns".to_string(),
            };
            attrs.push((key, ns.uri().to_string()));
        }
        for attr in node.attributes() {
            let key = match attr.namespace() {
                Some(XML_NS) => format!("xml:{}", attr.name()),
                Some(uri) => match node.lookup_prefix(uri) {
                    Some(prefix) if !prefix.is_empty() => format!("{prefix}:{}", attr.name()),
                    _ => attr.name().to_string(),
                },
                None => attr.name().to_string(),
            };
            attrs.push((key, attr.value().to_string()));
        }

        let tag = node.tag_name();
        let name = match tag.namespace().and_then(|uri| node.lookup_prefix(uri)) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}:{}", tag.name()),
            _ => tag.name().to_string(),
        };

        let id = self.alloc(NodeKind::Element { name, attrs });
        for child in node.children() {
            let child_id = if child.is_element() {
                self.import_ro(child, Some(node))
            } else if child.is_text() {
                self.alloc(NodeKind::Text(child.text().unwrap_or("").to_string()))
            } else if child.is_comment() {
                self.alloc(NodeKind::Comment(child.text().unwrap_or("").to_string()))
            } else {
                continue;
            };
            self.append(id, child_id);
        }
        id
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            kind,
        });
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    /// True if `id` is an element with the given local name.
    pub fn is(&self, id: NodeId, local: &str) -> bool {
        self.name(id).is_some_and(|n| local_name(n) == local)
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Element { .. })
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn attrs(&self, id: NodeId) -> &[(String, String)] {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attrs, .. } => attrs,
            _ => &[],
        }
    }

    pub fn set_attr(&mut self, id: NodeId, key: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[id.0].kind {
            match attrs.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => slot.1 = value.to_string(),
                None => attrs.push((key.to_string(), value.to_string())),
            }
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(|&c| self.is_element(c))
    }

    pub fn children_named<'a>(&'a self, id: NodeId, local: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(move |&c| self.is(c, local))
    }

    pub fn child(&self, id: NodeId, local: &str) -> Option<NodeId> {
        self.children_named(id, local).next()
    }

    /// Pre-order traversal of `id` and everything below it.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            out.push(n);
            stack.extend(self.nodes[n.0].children.iter().rev().copied());
        }
        out
    }

    /// Nearest ancestor (excluding `id` itself) with the given local name.
    pub fn ancestor(&self, id: NodeId, local: &str) -> Option<NodeId> {
        let mut cur = self.parent(id);
        while let Some(n) = cur {
            if self.is(n, local) {
                return Some(n);
            }
            cur = self.parent(n);
        }
        None
    }

    pub fn new_element(&mut self, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        self.alloc(NodeKind::Element {
            name: name.to_string(),
            attrs: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }

    pub fn new_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeKind::Text(text.to_string()))
    }

    /// Create an element and append it to `parent`.
    pub fn add(&mut self, parent: NodeId, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        let id = self.new_element(name, attrs);
        self.append(parent, id);
        id
    }

    /// Create an element holding a single text node and append it to `parent`.
    pub fn add_text_element(&mut self, parent: NodeId, name: &str, attrs: &[(&str, &str)], text: &str) -> NodeId {
        let id = self.add(parent, name, attrs);
        let t = self.new_text(text);
        self.append(id, t);
        id
    }

    pub fn append(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn insert(&mut self, parent: NodeId, index: usize, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        let children = &mut self.nodes[parent.0].children;
        let index = index.min(children.len());
        children.insert(index, child);
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.nodes[parent.0].children.iter().position(|&c| c == id)
    }

    pub fn insert_before(&mut self, sibling: NodeId, node: NodeId) {
        if let (Some(parent), Some(idx)) = (self.parent(sibling), self.index_in_parent(sibling)) {
            self.insert(parent, idx, node);
        }
    }

    pub fn insert_after(&mut self, sibling: NodeId, node: NodeId) {
        if let (Some(parent), Some(idx)) = (self.parent(sibling), self.index_in_parent(sibling)) {
            self.insert(parent, idx + 1, node);
        }
    }

    /// Unlink `id` from its parent. The node and its subtree stay allocated.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|&c| c != id);
        }
    }

    pub fn clear_children(&mut self, id: NodeId) {
        let children = std::mem::take(&mut self.nodes[id.0].children);
        for c in children {
            self.nodes[c.0].parent = None;
        }
    }

    /// Detached deep copy of `id` inside this tree.
    pub fn deep_clone(&mut self, id: NodeId) -> NodeId {
        let kind = self.nodes[id.0].kind.clone();
        let copy = self.alloc(kind);
        let children = self.nodes[id.0].children.clone();
        for c in children {
            let cc = self.deep_clone(c);
            self.append(copy, cc);
        }
        copy
    }

    /// Detached deep copy of `id` from another tree into this one.
    pub fn import(&mut self, other: &XmlTree, id: NodeId) -> NodeId {
        let copy = self.alloc(other.nodes[id.0].kind.clone());
        for &c in &other.nodes[id.0].children {
            let cc = self.import(other, c);
            self.append(copy, cc);
        }
        copy
    }

    /// Structural equality of the attached trees.
    pub fn same_structure(&self, other: &XmlTree) -> bool {
        self.subtree_eq(self.root, other, other.root)
    }

    fn subtree_eq(&self, a: NodeId, other: &XmlTree, b: NodeId) -> bool {
        let (na, nb) = (&self.nodes[a.0], &other.nodes[b.0]);
        na.kind == nb.kind
            && na.children.len() == nb.children.len()
            && na
                .children
                .iter()
                .zip(&nb.children)
                .all(|(&ca, &cb)| self.subtree_eq(ca, other, cb))
    }

    /// Prefixes bound to `uri` by any namespace declaration in the tree.
    pub fn prefixes_for(&self, uri: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for n in self.descendants(self.root) {
            for (k, v) in self.attrs(n) {
                if v == uri
                    && let Some(p) = k.strip_prefix("xmlns:")
                    && !out.iter().any(|o| o == p)
                {
                    out.push(p.to_string());
                }
            }
        }
        out
    }

    /// Attributes of `id` whose prefix is one of `prefixes`.
    pub fn attrs_with_prefix(&self, id: NodeId, prefixes: &[String]) -> Vec<(String, String)> {
        self.attrs(id)
            .iter()
            .filter(|(k, _)| prefix_of(k).is_some_and(|p| p != "xmlns" && prefixes.iter().any(|x| x == p)))
            .cloned()
            .collect()
    }

    pub fn to_xml(&self) -> String {
        let mut out =
            String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n");
        self.write_node(self.root, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id.0];
        match &node.kind {
            NodeKind::Element { name, attrs } => {
                out.push('<');
                out.push_str(name);
                for (k, v) in attrs {
                    out.push(' ');
                    out.push_str(k);
                    out.push_str("=\"");
                    out.push_str(&escape_attr(v));
                    out.push('"');
                }
                if node.children.is_empty() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for &c in &node.children {
                    self.write_node(c, out);
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            NodeKind::Text(t) => out.push_str(&escape_text(t)),
            NodeKind::Comment(c) => {
                out.push_str("<!--");
                out.push_str(c);
                out.push_str("-->");
            }
        }
    }
}

fn escape_text(s: &str) -> Cow<'_, str> {
    let escaped = quick_xml::escape::escape(s);
    if escaped.contains('\r') {
        Cow::Owned(escaped.replace('\r', "&#xD;"))
    } else {
        escaped
    }
}

/// Whitespace other than the space is written as a character reference, since
/// attribute-value normalization on reload would turn it into spaces.
fn escape_attr(s: &str) -> Cow<'_, str> {
    let escaped = quick_xml::escape::escape(s);
    if !escaped.contains(['\n', '\r', '\t']) {
        return escaped;
    }
    let mut out = String::with_capacity(escaped.len() + 8);
    for c in escaped.chars() {
        match c {
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            '\t' => out.push_str("&#x9;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}
