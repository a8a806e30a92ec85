// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # Structural merging of plain values into drafts
//!
//! Assigning a freshly built value to a draft key replaces the whole subtree, even where the new
//! value equals what was there. The functions in this module instead walk the delta alongside
//! the draft and write only the leaves that differ, so untouched subtrees stay shared with the
//! base.
//!
//! Merging works on the session's descriptors directly and only creates child descriptors for
//! compounds it actually recurses into.
//!
//! ```rust
//! use cowdraft::{merge_at, produce, value, DraftError};
//!
//! let base = value!({ "a" => { "keep" => { "deep" => true } } });
//! let next = produce(&base, |draft| {
//!     merge_at(draft, "a.b.c", &value!({ "x" => 1 }))?;
//!     Ok::<_, DraftError>(())
//! })
//! .unwrap();
//!
//! let a = next.get("a").unwrap();
//! assert_eq!(a.get("keep"), base.get("a").unwrap().get("keep"));
//! assert!(a.get("b").unwrap().get("c").unwrap().deep_eq(&value!({ "x" => 1 })));
//! ```
use crate::{
    Draft, DraftError, Key, Kind, Path, Value,
    graph::{Graph, NodeId},
};

/// One step of a [`MergePath`]: a key, optionally with the kind of container expected (or to be
/// created) under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub key: Key,
    pub kind: Option<Kind>,
}

impl Segment {
    pub fn new(key: impl Into<Key>) -> Self {
        Self {
            key: key.into(),
            kind: None,
        }
    }

    /// A segment whose value must be (or is created as) a `kind` container.
    pub fn typed(kind: Kind, key: impl Into<Key>) -> Self {
        Self {
            key: key.into(),
            kind: Some(kind),
        }
    }
}

impl From<&str> for Segment {
    fn from(key: &str) -> Self {
        Segment::new(parse_key(key))
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::new(index)
    }
}

impl From<Key> for Segment {
    fn from(key: Key) -> Self {
        Segment::new(key)
    }
}

impl<K: Into<Key>> From<(Kind, K)> for Segment {
    fn from((kind, key): (Kind, K)) -> Self {
        Segment::typed(kind, key)
    }
}

fn parse_key(key: &str) -> Key {
    key.parse::<usize>().map_or_else(|_| Key::from(key), Key::Index)
}

/// A path for [`merge_at`]. Parsing `"a.b.0"` yields fields `a` and `b` and index `0`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergePath(Vec<Segment>);

impl MergePath {
    pub fn segments(&self) -> &[Segment] {
        &self.0
    }
}

impl From<&str> for MergePath {
    fn from(path: &str) -> Self {
        if path.is_empty() {
            return Self::default();
        }
        path.split('.').map(Segment::from).collect()
    }
}

impl From<Vec<Segment>> for MergePath {
    fn from(segments: Vec<Segment>) -> Self {
        Self(segments)
    }
}

impl<S: Into<Segment>, const N: usize> From<[S; N]> for MergePath {
    fn from(segments: [S; N]) -> Self {
        segments.into_iter().map(Into::into).collect()
    }
}

impl FromIterator<Segment> for MergePath {
    fn from_iter<I: IntoIterator<Item = Segment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// How deeply a merge compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    deep: bool,
    shallow_kinds: Vec<Kind>,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self::deep()
    }
}

impl MergeOptions {
    /// Recurse into every compound whose kind matches on both sides.
    pub fn deep() -> Self {
        Self {
            deep: true,
            shallow_kinds: Vec::new(),
        }
    }

    /// Compare the delta's top-level entries by identity and write them as they are.
    pub fn shallow() -> Self {
        Self {
            deep: false,
            shallow_kinds: Vec::new(),
        }
    }

    /// Never recurse into containers of `kind`; replace them whenever they differ.
    pub fn with_shallow_kind(mut self, kind: Kind) -> Self {
        self.shallow_kinds.push(kind);
        self
    }

    fn recurses_into(&self, kind: Kind) -> bool {
        self.deep && !self.shallow_kinds.contains(&kind)
    }
}

/// Merges each delta into `draft` in turn, recursing into matching compounds.
///
/// A delta of another kind than the draft replaces the draft's value; this fails with
/// [`DraftError::Protocol`] for the session root.
pub fn merge_into<'a>(
    draft: &Draft,
    deltas: impl IntoIterator<Item = &'a Value>,
) -> Result<Draft, DraftError> {
    merge_into_with(draft, deltas, &MergeOptions::deep())
}

/// Merges each delta into `draft` in turn, comparing only top-level entries.
pub fn merge_into_shallow<'a>(
    draft: &Draft,
    deltas: impl IntoIterator<Item = &'a Value>,
) -> Result<Draft, DraftError> {
    merge_into_with(draft, deltas, &MergeOptions::shallow())
}

pub fn merge_into_with<'a>(
    draft: &Draft,
    deltas: impl IntoIterator<Item = &'a Value>,
    options: &MergeOptions,
) -> Result<Draft, DraftError> {
    draft.with_graph(|g, id| {
        for delta in deltas {
            merge_node(g, id, delta, options)?;
        }
        Ok(())
    })?;
    Ok(draft.clone())
}

/// Merges `delta` at `path` below `draft`, creating missing containers along the way.
///
/// Existing structure is followed as long as it holds compounds (of the hinted kind, where a
/// segment carries one). The remainder of the path is built as new containers around `delta`
/// and installed with a single write, so siblings of the new branch stay untouched.
pub fn merge_at(
    draft: &Draft,
    path: impl Into<MergePath>,
    delta: &Value,
) -> Result<Draft, DraftError> {
    merge_at_with(draft, path, delta, &MergeOptions::deep())
}

/// Like [`merge_at`], but compares only the top-level entries at the end of the path.
pub fn merge_at_shallow(
    draft: &Draft,
    path: impl Into<MergePath>,
    delta: &Value,
) -> Result<Draft, DraftError> {
    merge_at_with(draft, path, delta, &MergeOptions::shallow())
}

pub fn merge_at_with(
    draft: &Draft,
    path: impl Into<MergePath>,
    delta: &Value,
    options: &MergeOptions,
) -> Result<Draft, DraftError> {
    let path = path.into();
    draft.with_graph(|g, id| {
        let (id, rest) = walk(g, id, path.segments())?;
        let Some((first, _)) = rest.split_first() else {
            return merge_node(g, id, delta, options);
        };
        let chain = build_chain(g, id, rest, delta)?;
        let d = g.node(id);
        let Some(key) = first.key.normalize(d.kind) else {
            return Err(DraftError::protocol(&d.path, "merge_at", d.kind));
        };
        if d.kind == Kind::Set {
            g.insert_member(id, chain).map(drop)
        } else {
            g.write(id, key, chain)
        }
    })?;
    Ok(draft.clone())
}

/// Follows existing compounds along `segments`, returning the last one and what is left.
fn walk<'s>(
    g: &mut Graph,
    mut id: NodeId,
    mut segments: &'s [Segment],
) -> Result<(NodeId, &'s [Segment]), DraftError> {
    while let Some((segment, rest)) = segments.split_first() {
        let Some(key) = segment.key.normalize(g.node(id).kind) else {
            break;
        };
        let fits = g.lookup(id, &key).is_some_and(|value| {
            value.is_compound() && segment.kind.is_none_or(|kind| kind == value.kind())
        });
        if !fits {
            break;
        }
        id = g
            .child(id, &key)
            .ok_or_else(|| DraftError::inconsistent(&g.node(id).path, "missing child descriptor"))?;
        segments = rest;
    }
    Ok((id, segments))
}

/// Wraps `delta` in new containers for every segment after the first, innermost first.
///
/// A new sequence starts out empty, so its only valid index is 0.
fn build_chain(
    g: &Graph,
    id: NodeId,
    segments: &[Segment],
    delta: &Value,
) -> Result<Value, DraftError> {
    let path = &g.node(id).path;
    let mut value = delta.clone();
    for (depth, pair) in segments.windows(2).enumerate().rev() {
        let (holder, inner) = (&pair[0], &pair[1]);
        let kind = holder.kind.unwrap_or(match inner.key {
            Key::Index(_) => Kind::Sequence,
            _ => Kind::Object,
        });
        let Some(key) = inner.key.normalize(kind) else {
            return Err(DraftError::protocol(path, "merge_at", kind));
        };
        value = match (kind, key) {
            (Kind::Object, Key::Field(name)) => Value::object([(name, value)]),
            (Kind::Sequence, Key::Index(0)) => Value::array([value]),
            (Kind::Sequence, Key::Index(index)) => {
                let at: Path = path
                    .iter()
                    .cloned()
                    .chain(segments[..=depth].iter().map(|s| s.key.clone()))
                    .collect();
                return Err(DraftError::out_of_bounds(&at, index, 0));
            }
            (Kind::Map, key) => Value::map([(key.to_value(), value)]),
            (Kind::Set, _) => Value::set([value]),
            (kind, _) => return Err(DraftError::protocol(path, "merge_at", kind)),
        };
    }
    Ok(value)
}

/// Merges `delta` into the value of `id`.
fn merge_node(
    g: &mut Graph,
    id: NodeId,
    delta: &Value,
    options: &MergeOptions,
) -> Result<(), DraftError> {
    let kind = g.node(id).kind;
    let Some(entries) = delta
        .as_compound()
        .filter(|_| delta.kind() == kind)
        .map(|c| c.entries())
    else {
        return replace(g, id, delta);
    };
    match kind {
        Kind::Set => {
            for (key, element) in entries {
                if g.lookup(id, &key).is_none() {
                    g.insert_member(id, element)?;
                }
            }
        }
        _ => {
            for (key, value) in entries {
                merge_entry(g, id, key, &value, options)?;
            }
        }
    }
    Ok(())
}

fn merge_entry(
    g: &mut Graph,
    id: NodeId,
    key: Key,
    value: &Value,
    options: &MergeOptions,
) -> Result<(), DraftError> {
    let recurse = g.lookup(id, &key).is_some_and(|current| {
        current != *value
            && current.is_compound()
            && current.kind() == value.kind()
            && options.recurses_into(current.kind())
    });
    if !recurse {
        return g.write(id, key, value.clone());
    }
    let child = g
        .child(id, &key)
        .ok_or_else(|| DraftError::inconsistent(&g.node(id).path, "missing child descriptor"))?;
    merge_node(g, child, value, options)
}

/// Replaces the value of `id` in its parent.
fn replace(g: &mut Graph, id: NodeId, value: &Value) -> Result<(), DraftError> {
    let d = g.node(id);
    let Some(key) = d.key.clone().filter(|_| id != NodeId::ROOT) else {
        return Err(DraftError::protocol(&d.path, "replace", d.kind));
    };
    if g.value(id) == *value {
        return Ok(());
    }
    let parent = d.parent;
    if g.node(parent).kind == Kind::Set {
        g.change(parent, key, Some(value.clone()))
    } else {
        g.write(parent, key, value.clone())
    }
}

impl Draft {
    /// See [`merge_into`].
    pub fn merge<'a>(&self, deltas: impl IntoIterator<Item = &'a Value>) -> Result<Draft, DraftError> {
        merge_into(self, deltas)
    }

    /// See [`merge_into_shallow`].
    pub fn merge_shallow<'a>(
        &self,
        deltas: impl IntoIterator<Item = &'a Value>,
    ) -> Result<Draft, DraftError> {
        merge_into_shallow(self, deltas)
    }

    /// See [`merge_at`].
    pub fn merge_at(&self, path: impl Into<MergePath>, delta: &Value) -> Result<Draft, DraftError> {
        merge_at(self, path, delta)
    }

    /// See [`merge_at_shallow`].
    pub fn merge_at_shallow(
        &self,
        path: impl Into<MergePath>,
        delta: &Value,
    ) -> Result<Draft, DraftError> {
        merge_at_shallow(self, path, delta)
    }
}
