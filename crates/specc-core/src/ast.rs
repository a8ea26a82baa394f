//! Normalized, addressable view of a spec document.
//!
//! Every node carries a canonical JSON pointer and a lineage id derived
//! only from that pointer and the node kind, so identical documents always
//! produce bit-identical trees.

use crate::digest::{canonical_string, digest_str};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Pointer helpers
// ---------------------------------------------------------------------------

pub fn escape_segment(seg: &str) -> String {
    seg.replace('~', "~0").replace('/', "~1")
}

pub fn unescape_segment(seg: &str) -> String {
    seg.replace("~1", "/").replace("~0", "~")
}

pub fn join_pointer(parent: &str, seg: &str) -> String {
    format!("{parent}/{}", escape_segment(seg))
}

/// Split a pointer into unescaped segments. The root pointer `""` has none.
pub fn split_pointer(pointer: &str) -> Vec<String> {
    if pointer.is_empty() {
        return Vec::new();
    }
    pointer
        .trim_start_matches('/')
        .split('/')
        .map(unescape_segment)
        .collect()
}

/// The first segment of a pointer, e.g. `architecture` for
/// `/architecture/modules/0`.
pub fn top_section(pointer: &str) -> Option<String> {
    split_pointer(pointer).into_iter().next()
}

/// True if `pointer` equals `prefix` or lies beneath it.
pub fn is_within(pointer: &str, prefix: &str) -> bool {
    pointer == prefix
        || (pointer.starts_with(prefix) && pointer.as_bytes().get(prefix.len()) == Some(&b'/'))
}

/// Match a pointer against a pattern where a `*` segment matches any one
/// segment.
pub fn matches_pattern(pointer: &str, pattern: &str) -> bool {
    let p = split_pointer(pointer);
    let pat = split_pointer(pattern);
    p.len() == pat.len() && p.iter().zip(pat.iter()).all(|(a, b)| b == "*" || a == b)
}

// ---------------------------------------------------------------------------
// NodeKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Map,
    Seq,
    Str,
    Num,
    Bool,
    Null,
}

impl NodeKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Object(_) => NodeKind::Map,
            Value::Array(_) => NodeKind::Seq,
            Value::String(_) => NodeKind::Str,
            Value::Number(_) => NodeKind::Num,
            Value::Bool(_) => NodeKind::Bool,
            Value::Null => NodeKind::Null,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Map => "map",
            NodeKind::Seq => "seq",
            NodeKind::Str => "str",
            NodeKind::Num => "num",
            NodeKind::Bool => "bool",
            NodeKind::Null => "null",
        }
    }

    pub fn is_container(self) -> bool {
        matches!(self, NodeKind::Map | NodeKind::Seq)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ClauseType
// ---------------------------------------------------------------------------

/// Which part of the spec a node belongs to, decided by its top-level key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseType {
    Document,
    Metadata,
    Model,
    Instructions,
    Section,
    Architecture,
    Agent,
    Api,
    Invariant,
    Requirement,
    Flow,
    Bootstrap,
    Other,
}

impl ClauseType {
    pub fn for_pointer(pointer: &str) -> Self {
        match top_section(pointer).as_deref() {
            None => ClauseType::Document,
            Some("metadata") => ClauseType::Metadata,
            Some("model") => ClauseType::Model,
            Some("instructions") => ClauseType::Instructions,
            Some("sections") => ClauseType::Section,
            Some("architecture") => ClauseType::Architecture,
            Some("agents") => ClauseType::Agent,
            Some("api") => ClauseType::Api,
            Some("invariants") => ClauseType::Invariant,
            Some("requirements") => ClauseType::Requirement,
            Some("flows") => ClauseType::Flow,
            Some("bootstrap") => ClauseType::Bootstrap,
            Some(_) => ClauseType::Other,
        }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub path: String,
    /// Last pointer segment (map key or sequence index), unescaped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub kind: NodeKind,
    /// Scalar value; `Null` for containers.
    pub value: Value,
    pub children: Vec<Node>,
    pub lineage_id: String,
    pub clause_type: ClauseType,
    /// Non-owning back-reference to the parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_path: Option<String>,
}

impl Node {
    fn build(value: &Value, path: String, key: Option<String>, parent: Option<String>) -> Self {
        let kind = NodeKind::of(value);
        let lineage_id = lineage_id(&path, kind);
        let clause_type = ClauseType::for_pointer(&path);

        let children = match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                keys.into_iter()
                    .map(|k| {
                        Node::build(
                            &map[k],
                            join_pointer(&path, k),
                            Some(k.clone()),
                            Some(path.clone()),
                        )
                    })
                    .collect()
            }
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    Node::build(
                        v,
                        join_pointer(&path, &i.to_string()),
                        Some(i.to_string()),
                        Some(path.clone()),
                    )
                })
                .collect(),
            _ => Vec::new(),
        };

        let scalar = if kind.is_container() {
            Value::Null
        } else {
            value.clone()
        };

        Node {
            path,
            key,
            kind,
            value: scalar,
            children,
            lineage_id,
            clause_type,
            parent_path: parent,
        }
    }

    pub fn child(&self, key: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.key.as_deref() == Some(key))
    }

    pub fn child_str(&self, key: &str) -> Option<&str> {
        self.child(key).and_then(|c| c.value.as_str())
    }

    /// Human label for a map node: its `name`, `id` or `title`.
    pub fn label(&self) -> Option<&str> {
        ["name", "id", "title"]
            .iter()
            .find_map(|k| self.child_str(k))
            .filter(|s| !s.trim().is_empty())
    }

    /// Canonical string form of the node's own value, used for dedupe and
    /// sorting. Containers render as `map:<n>` / `seq:<n>`.
    pub fn value_string(&self) -> String {
        match self.kind {
            NodeKind::Map => format!("map:{}", self.children.len()),
            NodeKind::Seq => format!("seq:{}", self.children.len()),
            _ => canonical_string(&self.value),
        }
    }

    /// Strings of a sequence child, e.g. `depends_on: [a, b]`. A single
    /// string is accepted as a one-element list.
    pub fn string_list(&self, key: &str) -> Vec<String> {
        match self.child(key) {
            Some(c) if c.kind == NodeKind::Seq => c
                .children
                .iter()
                .filter_map(|n| n.value.as_str().map(str::to_string))
                .collect(),
            Some(c) => c.value.as_str().map(|s| vec![s.to_string()]).unwrap_or_default(),
            None => Vec::new(),
        }
    }

    pub fn is_empty_value(&self) -> bool {
        match self.kind {
            NodeKind::Map | NodeKind::Seq => self.children.is_empty(),
            NodeKind::Str => self.value.as_str().map(|s| s.trim().is_empty()).unwrap_or(true),
            NodeKind::Null => true,
            NodeKind::Num | NodeKind::Bool => false,
        }
    }
}

pub fn lineage_id(path: &str, kind: NodeKind) -> String {
    digest_str(&format!("{path}:{}", kind.as_str()))
}

// ---------------------------------------------------------------------------
// Ast
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    root: Node,
    /// pointer → child-index route from the root.
    index: BTreeMap<String, Vec<usize>>,
}

impl Ast {
    pub fn build(value: &Value) -> Self {
        let root = Node::build(value, String::new(), None, None);
        let mut index = BTreeMap::new();
        let mut stack: Vec<(&Node, Vec<usize>)> = vec![(&root, Vec::new())];
        while let Some((node, route)) = stack.pop() {
            for (i, child) in node.children.iter().enumerate() {
                let mut r = route.clone();
                r.push(i);
                stack.push((child, r));
            }
            index.insert(node.path.clone(), route);
        }
        Ast { root, index }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    pub fn contains(&self, pointer: &str) -> bool {
        self.index.contains_key(pointer)
    }

    pub fn get(&self, pointer: &str) -> Option<&Node> {
        let route = self.index.get(pointer)?;
        let mut node = &self.root;
        for &i in route {
            node = node.children.get(i)?;
        }
        Some(node)
    }

    /// Preorder walk; parents before children, siblings in tree order.
    pub fn preorder(&self) -> Vec<&Node> {
        let mut out = Vec::with_capacity(self.index.len());
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            out.push(node);
            for child in node.children.iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// All nodes whose pointer matches a `*` pattern, in tree order, so
    /// `/x/2` comes before `/x/10`.
    pub fn matching(&self, pattern: &str) -> Vec<&Node> {
        if !pattern.contains('*') {
            return self.get(pattern).into_iter().collect();
        }
        self.preorder()
            .into_iter()
            .filter(|n| matches_pattern(&n.path, pattern))
            .collect()
    }

    /// Resolve a reference string (`#/a/b` or `/a/b`) to a node.
    pub fn resolve(&self, reference: &str) -> Option<&Node> {
        let pointer = reference.strip_prefix('#').unwrap_or(reference);
        self.get(pointer)
    }

    /// Digest over every node's lineage id and scalar value in preorder.
    pub fn fingerprint(&self) -> String {
        let mut buf = String::new();
        for node in self.preorder() {
            buf.push_str(&node.lineage_id);
            buf.push('=');
            buf.push_str(&node.value_string());
            buf.push('\n');
        }
        digest_str(&buf)
    }

    pub fn entities(&self) -> EntityIndex {
        EntityIndex::build(self)
    }
}

// ---------------------------------------------------------------------------
// EntityIndex
// ---------------------------------------------------------------------------

/// Named entities a spec can refer to by name (`depends_on`, flow steps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Module,
    Agent,
    Bootstrap,
    Section,
    Requirement,
}

impl EntityKind {
    /// Collection pattern and the key holding the entity's name.
    fn source(self) -> (&'static str, &'static str) {
        match self {
            EntityKind::Module => ("/architecture/modules/*", "name"),
            EntityKind::Agent => ("/agents/*", "name"),
            EntityKind::Bootstrap => ("/bootstrap/*", "name"),
            EntityKind::Section => ("/sections/*", "id"),
            EntityKind::Requirement => ("/requirements/*", "id"),
        }
    }

    pub fn all() -> &'static [EntityKind] {
        &[
            EntityKind::Module,
            EntityKind::Agent,
            EntityKind::Bootstrap,
            EntityKind::Section,
            EntityKind::Requirement,
        ]
    }

    pub fn for_pointer(pointer: &str) -> Option<EntityKind> {
        EntityKind::all()
            .iter()
            .copied()
            .find(|k| matches_pattern(pointer, k.source().0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub name: String,
    pub pointer: String,
}

#[derive(Debug, Clone, Default)]
pub struct EntityIndex {
    by_name: BTreeMap<String, Entity>,
    duplicates: Vec<Entity>,
}

impl EntityIndex {
    pub fn build(ast: &Ast) -> Self {
        let mut idx = EntityIndex::default();
        for &kind in EntityKind::all() {
            let (pattern, key) = kind.source();
            for node in ast.matching(pattern) {
                let Some(name) = node.child_str(key) else {
                    continue;
                };
                let entity = Entity {
                    kind,
                    name: name.to_string(),
                    pointer: node.path.clone(),
                };
                // First declaration wins; later ones are reported.
                if idx.by_name.contains_key(name) {
                    idx.duplicates.push(entity);
                } else {
                    idx.by_name.insert(name.to_string(), entity);
                }
            }
        }
        idx
    }

    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.by_name.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.by_name.values()
    }

    pub fn of_kind(&self, kind: EntityKind) -> Vec<&Entity> {
        self.by_name.values().filter(|e| e.kind == kind).collect()
    }

    pub fn duplicates(&self) -> &[Entity] {
        &self.duplicates
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
