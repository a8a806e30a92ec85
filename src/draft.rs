// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use crate::{
    DraftError, Key, Kind, Path, Value,
    graph::{Graph, NodeId},
    session::Session,
};
use std::{fmt, rc::Rc};

/// A tracked view of one node inside a session.
///
/// Reads see the node's effective value (its copy if written to, its base otherwise). Writes are
/// routed through the session's descriptor graph, which copies exactly the nodes on the path to
/// the root and undoes those copies again when values are written back.
///
/// Drafts are cheap to clone; clones refer to the same node. Every method fails with
/// [`DraftError::Revoked`] once the outermost session has finished, and with
/// [`DraftError::Stale`] if a later write replaced or removed the node (or one of its ancestors).
#[derive(Clone)]
pub struct Draft {
    pub(crate) session: Rc<Session>,
    pub(crate) id: NodeId,
}

/// What a draft read returns: a child draft for compounds and callables, the value otherwise.
#[derive(Debug, Clone)]
pub enum DraftValue {
    Draft(Draft),
    Value(Value),
}

impl DraftValue {
    /// The child draft, if the read hit a compound or callable.
    pub fn as_draft(&self) -> Option<&Draft> {
        match self {
            DraftValue::Draft(draft) => Some(draft),
            DraftValue::Value(_) => None,
        }
    }

    /// Like [`DraftValue::as_draft`], but by value.
    pub fn into_draft(self) -> Option<Draft> {
        match self {
            DraftValue::Draft(draft) => Some(draft),
            DraftValue::Value(_) => None,
        }
    }

    /// The plain value, if the read hit a leaf.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            DraftValue::Value(value) => Some(value),
            DraftValue::Draft(_) => None,
        }
    }

    /// Like [`DraftValue::as_value`], but by value.
    pub fn into_value(self) -> Option<Value> {
        match self {
            DraftValue::Value(value) => Some(value),
            DraftValue::Draft(_) => None,
        }
    }

    /// Returns true for child drafts.
    pub fn is_draft(&self) -> bool {
        matches!(self, DraftValue::Draft(_))
    }

    /// Resolves to a plain value, snapshotting drafts with [`Draft::current`].
    pub fn resolve(&self) -> Result<Value, DraftError> {
        match self {
            DraftValue::Draft(draft) => draft.current(),
            DraftValue::Value(value) => Ok(value.clone()),
        }
    }
}

impl Draft {
    pub(crate) fn new(session: Rc<Session>, id: NodeId) -> Self {
        Self { session, id }
    }

    fn at(&self, id: NodeId) -> Draft {
        Draft::new(Rc::clone(&self.session), id)
    }

    /// Runs `f` on the session graph after checking that this draft may still be used.
    pub(crate) fn with_graph<R>(
        &self,
        f: impl FnOnce(&mut Graph, NodeId) -> Result<R, DraftError>,
    ) -> Result<R, DraftError> {
        if self.session.is_revoked() {
            return Err(DraftError::Revoked);
        }
        let mut graph = self
            .session
            .graph
            .try_borrow_mut()
            .map_err(|_| DraftError::inconsistent(&Path::root(), "re-entrant draft access"))?;
        if !graph.is_live(self.id) {
            return Err(DraftError::Stale {
                path: graph.node(self.id).path.clone(),
            });
        }
        f(&mut graph, self.id)
    }

    /// Normalizes `key` for this node. Leaves and callables have no keys at all.
    fn normalize(
        g: &Graph,
        id: NodeId,
        key: Key,
        op: &'static str,
    ) -> Result<Option<Key>, DraftError> {
        let d = g.node(id);
        if !d.kind.is_container() {
            return Err(DraftError::protocol(&d.path, op, d.kind));
        }
        Ok(key.normalize(d.kind))
    }

    fn require(g: &Graph, id: NodeId, kind: Kind, op: &'static str) -> Result<(), DraftError> {
        let d = g.node(id);
        if d.kind != kind {
            return Err(DraftError::protocol(&d.path, op, d.kind));
        }
        Ok(())
    }

    fn len_of(g: &Graph, id: NodeId) -> usize {
        g.effective(id).map_or(0, |c| c.len())
    }

    /// Hands out compounds and callables as child drafts.
    fn wrap(&self, g: &mut Graph, id: NodeId, key: &Key, value: Value) -> DraftValue {
        if !matches!(value, Value::Compound(_) | Value::Function(_)) {
            return DraftValue::Value(value);
        }
        let child = if g.node(id).kind == Kind::Set {
            g.set_member_child(id, &value)
        } else {
            g.child(id, key)
        };
        match child {
            Some(child) => DraftValue::Draft(self.at(child)),
            None => DraftValue::Value(value),
        }
    }

    /// The kind of value this draft currently holds.
    ///
    /// Writing a different kind over a tracked node changes its kind in place.
    pub fn kind(&self) -> Result<Kind, DraftError> {
        self.with_graph(|g, id| Ok(g.node(id).kind))
    }

    /// Where this draft sits, relative to the session root.
    pub fn path(&self) -> Result<Path, DraftError> {
        self.with_graph(|g, id| Ok(g.node(id).path.clone()))
    }

    /// Reads `key`. Compounds come back as child drafts, so writes through them are tracked.
    pub fn get(&self, key: impl Into<Key>) -> Result<Option<DraftValue>, DraftError> {
        self.with_graph(|g, id| {
            let Some(key) = Self::normalize(g, id, key.into(), "get")? else {
                return Ok(None);
            };
            Ok(g.lookup(id, &key)
                .map(|value| self.wrap(g, id, &key, value)))
        })
    }

    /// Returns the child draft at `key`, which must hold an object, sequence, map or set.
    pub fn child(&self, key: impl Into<Key>) -> Result<Draft, DraftError> {
        let key = key.into();
        self.with_graph(|g, id| {
            let path = g.node(id).path.child(key.clone());
            let Some(key) = Self::normalize(g, id, key, "child")? else {
                return Err(DraftError::not_compound(path));
            };
            match g.lookup(id, &key) {
                Some(value @ Value::Compound(_)) => match self.wrap(g, id, &key, value) {
                    DraftValue::Draft(draft) => Ok(draft),
                    DraftValue::Value(_) => Err(DraftError::not_compound(path)),
                },
                _ => Err(DraftError::not_compound(path)),
            }
        })
    }

    /// Returns true if `key` holds something. Keys that do not fit the container's kind are
    /// never present.
    pub fn has(&self, key: impl Into<Key>) -> Result<bool, DraftError> {
        self.with_graph(|g, id| {
            let key = Self::normalize(g, id, key.into(), "has")?;
            Ok(key.is_some_and(|key| g.lookup(id, &key).is_some()))
        })
    }

    /// Returns the keys in order; for sets, the elements as [`Key::Entry`].
    pub fn keys(&self) -> Result<Vec<Key>, DraftError> {
        self.with_graph(|g, id| {
            Self::normalize(g, id, Key::Index(0), "keys")?;
            Ok(g.effective(id).map(|c| c.keys()).unwrap_or_default())
        })
    }

    /// Number of entries, elements or fields.
    pub fn len(&self) -> Result<usize, DraftError> {
        self.with_graph(|g, id| {
            Self::normalize(g, id, Key::Index(0), "len")?;
            Ok(Self::len_of(g, id))
        })
    }

    /// Returns true if [`Draft::len`] is zero.
    pub fn is_empty(&self) -> Result<bool, DraftError> {
        Ok(self.len()? == 0)
    }

    /// Returns every entry, with compound values handed out as child drafts.
    pub fn entries(&self) -> Result<Vec<(Key, DraftValue)>, DraftError> {
        self.with_graph(|g, id| {
            Self::normalize(g, id, Key::Index(0), "entries")?;
            let entries = g.effective(id).map(|c| c.entries()).unwrap_or_default();
            Ok(entries
                .into_iter()
                .map(|(key, value)| {
                    let wrapped = self.wrap(g, id, &key, value);
                    (key, wrapped)
                })
                .collect())
        })
    }

    /// The values of [`Draft::entries`], in order.
    pub fn values(&self) -> Result<Vec<DraftValue>, DraftError> {
        Ok(self.entries()?.into_iter().map(|(_, v)| v).collect())
    }

    /// The members of a set, with compound members handed out as drafts.
    pub fn elements(&self) -> Result<Vec<DraftValue>, DraftError> {
        self.with_graph(|g, id| Self::require(g, id, Kind::Set, "elements"))?;
        self.values()
    }

    /// Writes `value` under `key`. Writing at a sequence's length appends.
    ///
    /// Writing the value already there does nothing; writing back the base value undoes the
    /// earlier change.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<(), DraftError> {
        let value = value.into();
        self.with_graph(|g, id| {
            let d = g.node(id);
            let Some(key) = Self::normalize(g, id, key.into(), "set")? else {
                return Err(DraftError::protocol(&d.path, "set", d.kind));
            };
            g.write(id, key, value)
        })
    }

    /// Removes `key`, returning false if there was nothing to remove.
    ///
    /// On sequences the later elements move down, which invalidates drafts handed out for them.
    pub fn remove(&self, key: impl Into<Key>) -> Result<bool, DraftError> {
        self.with_graph(|g, id| match Self::normalize(g, id, key.into(), "remove")? {
            Some(key) => g.delete(id, key),
            None => Ok(false),
        })
    }

    /// Removes everything. On sequences this is structural.
    pub fn clear(&self) -> Result<(), DraftError> {
        self.with_graph(|g, id| {
            Self::normalize(g, id, Key::Index(0), "clear")?;
            g.clear(id)
        })
    }

    /// Appends to a sequence.
    pub fn push(&self, value: impl Into<Value>) -> Result<(), DraftError> {
        let value = value.into();
        self.with_graph(|g, id| {
            Self::require(g, id, Kind::Sequence, "push")?;
            g.reshape(id, |items| {
                items.push(value);
                ((), None)
            })
        })
    }

    /// Removes the last element and returns a snapshot of it.
    pub fn pop(&self) -> Result<Option<Value>, DraftError> {
        self.with_graph(|g, id| {
            Self::require(g, id, Kind::Sequence, "pop")?;
            let Some(last) = Self::len_of(g, id).checked_sub(1) else {
                return Ok(None);
            };
            let popped = g.lookup(id, &Key::Index(last)).map(|v| g.snapshot(&v));
            g.reshape(id, |items| {
                items.pop();
                ((), Some(last))
            })?;
            Ok(popped)
        })
    }

    /// Inserts `value` at `index`, moving later elements up.
    pub fn insert_at(&self, index: usize, value: impl Into<Value>) -> Result<(), DraftError> {
        let value = value.into();
        self.with_graph(|g, id| {
            Self::require(g, id, Kind::Sequence, "insert_at")?;
            let len = Self::len_of(g, id);
            if index > len {
                return Err(DraftError::out_of_bounds(&g.node(id).path, index, len));
            }
            g.reshape(id, |items| {
                items.insert(index, value);
                ((), Some(index))
            })
        })
    }

    /// Shortens a sequence to `len` elements; longer lengths leave it untouched.
    pub fn truncate(&self, len: usize) -> Result<(), DraftError> {
        self.with_graph(|g, id| {
            Self::require(g, id, Kind::Sequence, "truncate")?;
            if len >= Self::len_of(g, id) {
                return Ok(());
            }
            g.reshape(id, |items| {
                items.truncate(len);
                ((), Some(len))
            })
        })
    }

    /// Adds an element to a set, returning false if it was already present.
    pub fn insert(&self, element: impl Into<Value>) -> Result<bool, DraftError> {
        let element = element.into();
        self.with_graph(|g, id| g.insert_member(id, element))
    }

    /// Returns true if a set holds `element`.
    pub fn contains(&self, element: impl Into<Value>) -> Result<bool, DraftError> {
        let element = element.into();
        self.with_graph(|g, id| {
            Self::require(g, id, Kind::Set, "contains")?;
            Ok(g.lookup(id, &Key::Entry(element)).is_some())
        })
    }

    /// Calls the function this draft refers to.
    pub fn call(&self, args: &[Value]) -> Result<Value, DraftError> {
        let callable = self.with_graph(|g, id| match g.value(id) {
            Value::Function(callable) => Ok(callable),
            _ => {
                let d = g.node(id);
                Err(DraftError::protocol(&d.path, "call", d.kind))
            }
        })?;
        // the graph is released; the function may use drafts itself
        Ok(callable.call(args))
    }

    /// Returns an owned snapshot of this node's current value.
    ///
    /// Later writes in the session do not show through the snapshot.
    pub fn current(&self) -> Result<Value, DraftError> {
        self.with_graph(|g, id| Ok(g.snapshot(&g.value(id))))
    }
}

impl PartialEq for Draft {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.session, &other.session) && self.id == other.id
    }
}

impl fmt::Debug for Draft {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.path() {
            Ok(path) => write!(f, "Draft({path})"),
            Err(DraftError::Revoked) => f.write_str("Draft(<revoked>)"),
            Err(_) => f.write_str("Draft(<stale>)"),
        }
    }
}
