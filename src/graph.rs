// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! # The descriptor graph
//!
//! Every node a session touches is tracked by a [`Descriptor`]. Descriptors live in an arena
//! owned by the session and refer to each other by [`NodeId`], so parent links and child maps
//! never form reference cycles.
//!
//! A descriptor starts out wrapping its *base*, the value found at its key when it was created.
//! Once something at or below it is written, it holds a *copy*: a shallow, unfrozen duplicate of
//! the base that absorbs the writes. The algorithm that creates and discards copies lives in
//! [`propagation`].
use crate::{Key, Kind, Path, RandomState, Value, create_map, create_set, value::Compound};
use dependents::Dependents;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

pub(crate) mod dependents;
pub(crate) mod propagation;

/*
 * YADR: arena-indexed descriptors instead of shared parent pointers
 *
 * In the context of tracking per-node drafting state with parent links in both directions, we
 * faced the question of whether descriptors should point at each other through `Rc<RefCell<_>>`
 * with `Weak` back-references, or live in one arena addressed by index.
 *
 * We decided for the arena, and neglected the pointer graph.
 *
 * We did this to keep propagation a plain `&mut self` recursion over one borrow, accepting that
 * handles outside the session (drafts) must carry a session reference next to their index and
 * check liveness on every access.
 */

/// Index of a descriptor in its session's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(usize);

impl NodeId {
    pub(crate) const ROOT: NodeId = NodeId(0);
}

/// Ordered record of every path written during a session and the value it now holds.
///
/// `None` marks a removal. Paths appear in the order they were first written; cascading copies
/// of ancestors are recorded before the write that caused them.
pub type Changes = IndexMap<Path, Option<Value>, ahash::RandomState>;

#[derive(Debug)]
pub(crate) struct Descriptor {
    /// The value this node wraps. Never mutated by the engine.
    pub(crate) base: Value,
    /// Shadow copy holding this node's pending writes.
    pub(crate) copy: Option<Compound>,
    /// The root is its own parent.
    pub(crate) parent: NodeId,
    pub(crate) key: Option<Key>,
    pub(crate) path: Path,
    pub(crate) children: HashMap<Key, NodeId, RandomState>,
    pub(crate) kind: Kind,
    /// Set by structural sequence operations; indices no longer line up with `base`.
    pub(crate) reshaped: bool,
    /// Superseded by a write to an ancestor key.
    pub(crate) detached: bool,
}

impl Descriptor {
    /// Looks up a normalized key in the base.
    pub(crate) fn base_entry(&self, key: &Key) -> Option<Value> {
        self.base.as_compound()?.data().get(key)
    }
}

#[derive(Debug)]
pub(crate) struct Graph {
    nodes: Vec<Descriptor>,
    /// Descriptors currently holding a copy.
    modified: HashSet<NodeId, RandomState>,
    changed: Changes,
    changed_by: Dependents,
}

impl Graph {
    pub(crate) fn new(base: Value) -> Self {
        let root = Descriptor {
            kind: base.kind(),
            base,
            copy: None,
            parent: NodeId::ROOT,
            key: None,
            path: Path::root(),
            children: create_map(),
            reshaped: false,
            detached: false,
        };
        Self {
            nodes: vec![root],
            modified: create_set(),
            changed: Changes::default(),
            changed_by: Dependents::default(),
        }
    }

    pub(crate) fn node(&self, id: NodeId) -> &Descriptor {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Descriptor {
        &mut self.nodes[id.0]
    }

    /// Returns false once the graph was cleared or the node superseded.
    pub(crate) fn is_live(&self, id: NodeId) -> bool {
        self.nodes.get(id.0).is_some_and(|d| !d.detached)
    }

    /// The copy if present, else the base.
    pub(crate) fn value(&self, id: NodeId) -> Value {
        let d = self.node(id);
        match &d.copy {
            Some(copy) => Value::Compound(copy.clone()),
            None => d.base.clone(),
        }
    }

    /// The compound reads should go to, if the node is one.
    pub(crate) fn effective(&self, id: NodeId) -> Option<Compound> {
        let d = self.node(id);
        d.copy.clone().or_else(|| d.base.as_compound().cloned())
    }

    /// Looks up a normalized key in the effective value.
    pub(crate) fn lookup(&self, id: NodeId, key: &Key) -> Option<Value> {
        self.effective(id)?.data().get(key)
    }

    pub(crate) fn changes(&self) -> &Changes {
        &self.changed
    }

    pub(crate) fn create_child(&mut self, parent: NodeId, key: Key, base: Value) -> NodeId {
        let id = NodeId(self.nodes.len());
        let path = self.node(parent).path.child(key.clone());
        self.nodes.push(Descriptor {
            kind: base.kind(),
            base,
            copy: None,
            parent,
            key: Some(key.clone()),
            path,
            children: create_map(),
            reshaped: false,
            detached: false,
        });
        self.node_mut(parent).children.insert(key, id);
        id
    }

    /// Returns the descriptor for a normalized key, creating it from the effective value.
    ///
    /// Returns `None` if the key holds nothing.
    pub(crate) fn child(&mut self, parent: NodeId, key: &Key) -> Option<NodeId> {
        if self.node(parent).kind == Kind::Set {
            let element = self.lookup(parent, key)?;
            return self.set_member_child(parent, &element);
        }
        let value = self.lookup(parent, key)?;
        if let Some(&id) = self.node(parent).children.get(key) {
            return Some(id);
        }
        Some(self.create_child(parent, key.clone(), value))
    }

    /// Returns true if `id`, a child of a set, currently stands for `element`.
    fn wraps(&self, id: NodeId, element: &Value) -> bool {
        let d = self.node(id);
        match self.changed.get(&d.path) {
            Some(None) => false,
            Some(Some(_)) => self.value(id) == *element,
            // untouched children, and placeholders left by removals, wrap what they are keyed by
            None => matches!(&d.key, Some(Key::Entry(keyed)) if keyed == element),
        }
    }

    /// Returns the descriptor currently wrapping `element` of a set.
    ///
    /// Set children stay keyed by the element they were created for, even after a write below
    /// them replaced that element with a copy, so lookup goes by the wrapped value.
    pub(crate) fn set_member_child(&mut self, parent: NodeId, element: &Value) -> Option<NodeId> {
        let d = self.node(parent);
        if let Some(&id) = d.children.values().find(|&&id| self.wraps(id, element)) {
            return Some(id);
        }
        let key = Key::Entry(element.clone());
        if d.children.contains_key(&key) {
            // the key belongs to a different occupant by now
            return None;
        }
        Some(self.create_child(parent, key, element.clone()))
    }

    /// Returns the key under which a member of a set is tracked.
    pub(crate) fn set_member_key(&self, parent: NodeId, element: &Value) -> Key {
        self.node(parent)
            .children
            .iter()
            .find(|&(_, &id)| self.wraps(id, element))
            .map_or_else(|| Key::Entry(element.clone()), |(key, _)| key.clone())
    }

    /// Returns true if `key` of a set tracks a member that a write below it replaced.
    pub(crate) fn tracks_replaced_member(&self, parent: NodeId, key: &Key) -> bool {
        self.node(parent)
            .children
            .get(key)
            .is_some_and(|&id| matches!(self.changed.get(&self.node(id).path), Some(Some(_))))
    }

    /// Clones `value`, replacing every session-owned copy reachable from it with a fresh one so
    /// that later writes in the session cannot show through.
    pub(crate) fn snapshot(&self, value: &Value) -> Value {
        let owned: HashSet<usize, RandomState> = self
            .modified
            .iter()
            .filter_map(|&id| self.node(id).copy.as_ref().map(Compound::addr))
            .collect();
        snapshot_with(value, &owned)
    }

    /// Returns the value the session produces, without freezing it.
    pub(crate) fn finalize(&self) -> Option<Compound> {
        self.node(NodeId::ROOT).copy.clone()
    }

    pub(crate) fn reset(&mut self) {
        self.nodes.clear();
        self.modified.clear();
        self.changed.clear();
        self.changed_by.clear();
    }
}

fn snapshot_with(value: &Value, owned: &HashSet<usize, RandomState>) -> Value {
    match value {
        Value::Compound(c) if owned.contains(&c.addr()) => {
            let data = c.data().map_values(|v| snapshot_with(v, owned));
            Value::Compound(Compound::new(data))
        }
        other => other.clone(),
    }
}
