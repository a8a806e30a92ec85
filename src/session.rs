// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Sessions: the entry points that create a draft over a base value and turn the recorded
//! writes into the next value.
use crate::{
    Draft, DraftError, DraftValue, Value, auto_freeze,
    graph::{Graph, NodeId},
};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};
use tracing::debug;

pub use crate::graph::Changes;

/// State shared by every draft of one session.
pub(crate) struct Session {
    pub(crate) graph: RefCell<Graph>,
    depth: Cell<usize>,
    revoked: Cell<bool>,
}

impl Session {
    fn new(base: Value) -> Rc<Self> {
        Rc::new(Self {
            graph: RefCell::new(Graph::new(base)),
            depth: Cell::new(0),
            revoked: Cell::new(false),
        })
    }

    pub(crate) fn is_revoked(&self) -> bool {
        self.revoked.get()
    }
}

/// Keeps a session entered; leaving the outermost scope revokes every draft of the session.
///
/// Runs on early returns and unwinding alike.
struct Scope {
    session: Rc<Session>,
}

impl Scope {
    fn enter(session: &Rc<Session>) -> Self {
        session.depth.set(session.depth.get() + 1);
        Self {
            session: Rc::clone(session),
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        let depth = self.session.depth.get().saturating_sub(1);
        self.session.depth.set(depth);
        if depth == 0 {
            self.session.revoked.set(true);
            if let Ok(mut graph) = self.session.graph.try_borrow_mut() {
                graph.reset();
            }
            debug!("session revoked");
        }
    }
}

/// Handed to change callbacks; calling [`Rollback::rollback`] makes the session return its base.
#[derive(Debug, Default)]
pub struct Rollback {
    requested: Cell<bool>,
}

impl Rollback {
    pub fn rollback(&self) {
        self.requested.set(true);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.get()
    }
}

/// Runs `mutate` on a draft of `base` and returns the resulting value.
///
/// If nothing ended up changing, the result is `base` itself; otherwise it is a new value that
/// shares every untouched subtree with `base`. Unless disabled with [`crate::set_auto_freeze`],
/// the result is deeply frozen.
///
/// ```rust
/// use cowdraft::{produce, value, DraftError};
///
/// let base = value!({ "n" => 1 });
/// let same = produce(&base, |draft| {
///     draft.set("n", 2)?;
///     draft.set("n", 1)?;
///     Ok::<_, DraftError>(())
/// })
/// .unwrap();
/// assert_eq!(same, base);
/// ```
///
/// # Errors
///
/// Fails with [`DraftError::InvalidArgument`] if `base` is not an object, sequence, map or set,
/// and with whatever `mutate` returns.
pub fn produce<F, E>(base: &Value, mutate: F) -> Result<Value, E>
where
    F: FnOnce(&Draft) -> Result<(), E>,
    E: From<DraftError>,
{
    produce_with(base, mutate, |_, _, _| {})
}

/// Like [`produce`], but calls `on_change` with the result, every changed path and a
/// [`Rollback`] handle if anything changed.
///
/// ```rust
/// use cowdraft::{produce_with, value, DraftError};
///
/// let base = value!({ "n" => 1 });
/// let next = produce_with(
///     &base,
///     |draft| draft.set("n", -1),
///     |next, changes, rollback| {
///         assert_eq!(changes.len(), 1);
///         if next.get("n").and_then(|n| n.as_i64()) < Some(0) {
///             rollback.rollback();
///         }
///     },
/// )
/// .unwrap();
/// assert_eq!(next, base);
/// ```
pub fn produce_with<F, C, E>(base: &Value, mutate: F, on_change: C) -> Result<Value, E>
where
    F: FnOnce(&Draft) -> Result<(), E>,
    C: FnOnce(&Value, &Changes, &Rollback),
    E: From<DraftError>,
{
    if !base.is_compound() {
        return Err(DraftError::InvalidArgument { found: base.kind() }.into());
    }
    let session = Session::new(base.clone());
    let _scope = Scope::enter(&session);
    debug!(kind = %base.kind(), "session started");

    mutate(&Draft::new(Rc::clone(&session), NodeId::ROOT))?;

    let (next, changes) = {
        let graph = session
            .graph
            .try_borrow()
            .map_err(|_| DraftError::Revoked)?;
        (finish(base, graph.finalize()), graph.changes().clone())
    };
    if changes.is_empty() {
        debug!("session finished without changes");
        return Ok(next);
    }
    let rollback = Rollback::default();
    on_change(&next, &changes, &rollback);
    if rollback.is_requested() {
        debug!(changed = changes.len(), "session rolled back");
        return Ok(finish(base, None));
    }
    debug!(changed = changes.len(), "session finished");
    Ok(next)
}

/// Picks the value a session returns and freezes it if configured to.
fn finish(base: &Value, copy: Option<crate::Compound>) -> Value {
    let freeze = auto_freeze();
    match copy {
        None => {
            if freeze {
                base.deep_freeze();
            }
            base.clone()
        }
        Some(copy) => {
            if freeze {
                copy.deep_freeze();
            }
            Value::Compound(copy)
        }
    }
}

impl Draft {
    /// Runs a nested session on this draft.
    ///
    /// Writes go to the enclosing session's graph; the returned draft is this one. Cleanup is
    /// left to the outermost session.
    pub fn produce<F, E>(&self, mutate: F) -> Result<Draft, E>
    where
        F: FnOnce(&Draft) -> Result<(), E>,
        E: From<DraftError>,
    {
        self.with_graph(|_, _| Ok(()))?;
        let _scope = Scope::enter(&self.session);
        debug!(depth = self.session.depth.get(), "nested session started");
        mutate(self)?;
        Ok(self.clone())
    }

    /// Runs a nested session on this draft with a change callback.
    ///
    /// The callback sees every change recorded in the enclosing session so far. Rolling back
    /// returns this node's base value instead of the draft; writes already applied to the
    /// enclosing session stay in place.
    pub fn produce_with<F, C, E>(&self, mutate: F, on_change: C) -> Result<DraftValue, E>
    where
        F: FnOnce(&Draft) -> Result<(), E>,
        C: FnOnce(&Draft, &Changes, &Rollback),
        E: From<DraftError>,
    {
        let base = self.with_graph(|g, id| Ok(g.node(id).base.clone()))?;
        let _scope = Scope::enter(&self.session);
        debug!(depth = self.session.depth.get(), "nested session started");
        mutate(self)?;

        let changes = self.with_graph(|g, _| Ok(g.changes().clone()))?;
        if changes.is_empty() {
            return Ok(DraftValue::Draft(self.clone()));
        }
        let rollback = Rollback::default();
        on_change(self, &changes, &rollback);
        if rollback.is_requested() {
            debug!(changed = changes.len(), "nested session rolled back");
            return Ok(DraftValue::Value(base));
        }
        Ok(DraftValue::Draft(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Key, Path,
        test_util::{Tree, leaf_paths},
        value,
    };
    use std::cell::RefCell;

    #[test]
    fn rejects_non_compound_bases() {
        let err = produce(&Value::from(1), |_| Ok::<_, DraftError>(())).unwrap_err();
        assert_eq!(
            err,
            DraftError::InvalidArgument {
                found: crate::Kind::Leaf
            }
        );
        assert!(produce(&Value::Null, |_| Ok::<_, DraftError>(())).is_err());
    }

    #[test]
    fn unchanged_base_is_returned_frozen() {
        let base = value!({ "a" => { "b" => 1 } });
        let next = produce(&base, |draft| {
            draft.child("a")?.get("b")?;
            Ok::<_, DraftError>(())
        })
        .unwrap();
        assert_eq!(next, base);
        assert!(base.is_frozen());
        assert!(base.get("a").unwrap().is_frozen());
    }

    #[test]
    fn drafts_are_revoked_afterwards() {
        let base = value!({ "a" => {} });
        let escaped = RefCell::new(None);
        produce(&base, |draft| {
            *escaped.borrow_mut() = Some(draft.child("a")?);
            Ok::<_, DraftError>(())
        })
        .unwrap();
        let escaped = escaped.into_inner().unwrap();
        assert_eq!(escaped.set("x", 1), Err(DraftError::Revoked));
        assert_eq!(format!("{escaped:?}"), "Draft(<revoked>)");
    }

    #[test]
    fn errors_from_mutate_still_revoke() {
        #[derive(Debug, PartialEq)]
        enum AppError {
            Draft(DraftError),
            Refused,
        }
        impl From<DraftError> for AppError {
            fn from(e: DraftError) -> Self {
                AppError::Draft(e)
            }
        }

        let base = value!({});
        let escaped = RefCell::new(None);
        let err = produce(&base, |draft| {
            draft.set("x", 1)?;
            *escaped.borrow_mut() = Some(draft.clone());
            Err(AppError::Refused)
        })
        .unwrap_err();
        assert_eq!(err, AppError::Refused);
        assert_eq!(
            escaped.into_inner().unwrap().len(),
            Err(DraftError::Revoked)
        );
        assert!(base.get("x").is_none());
    }

    #[test]
    fn change_callback_sees_changes_in_order() {
        let base = value!({ "a" => { "bar" => 1 } });
        let seen = RefCell::new(Vec::new());
        produce_with(
            &base,
            |draft| draft.child("a")?.set("bar", 2),
            |next, changes, _| {
                assert!(next.is_frozen());
                seen.borrow_mut()
                    .extend(changes.keys().map(Path::to_string));
            },
        )
        .unwrap();
        assert_eq!(seen.into_inner(), ["a", "a.bar"]);
    }

    #[test]
    fn callback_is_skipped_without_changes() {
        let base = value!({ "a" => 1 });
        let mut called = false;
        produce_with(
            &base,
            |draft| {
                draft.set("a", 2)?;
                draft.set("a", 1)
            },
            |_, _, _| called = true,
        )
        .unwrap();
        assert!(!called);
    }

    #[test]
    fn removals_are_recorded_as_none() {
        let base = value!({ "a" => 1, "b" => 2 });
        produce_with(
            &base,
            |draft| draft.remove("a").map(|_| ()),
            |next, changes, _| {
                assert_eq!(changes.get(&Path::root().child(Key::from("a"))), Some(&None));
                assert!(next.get("a").is_none());
            },
        )
        .unwrap();
    }

    #[test]
    fn nested_sessions_defer_cleanup() {
        let base = value!({ "a" => { "n" => 1 } });
        let next = produce(&base, |draft| {
            let a = draft.child("a")?;
            let inner = a.produce(|a| a.set("n", 2))?;
            // still usable: the outer session is running
            assert_eq!(inner, a);
            inner.set("n", 3)?;
            Ok::<_, DraftError>(())
        })
        .unwrap();
        assert_eq!(next.get("a").unwrap().get("n"), Some(Value::from(3)));
    }

    #[test]
    fn nested_rollback_returns_the_sub_base() {
        let base = value!({ "a" => { "n" => 1 } });
        produce(&base, |draft| {
            let a = draft.child("a")?;
            let outcome = a.produce_with(|a| a.set("n", 2), |_, _, rollback| rollback.rollback())?;
            assert_eq!(outcome.into_value(), base.get("a"));
            Ok::<_, DraftError>(())
        })
        .unwrap();
    }

    #[test]
    fn panics_in_mutate_revoke_the_session() {
        let base = value!({});
        let escaped: RefCell<Option<Draft>> = RefCell::new(None);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            produce(&base, |draft| -> Result<(), DraftError> {
                *escaped.borrow_mut() = Some(draft.clone());
                panic!("boom")
            })
        }));
        assert!(outcome.is_err());
        assert_eq!(
            escaped.into_inner().unwrap().kind(),
            Err(DraftError::Revoked)
        );
    }

    #[quickcheck]
    fn rollback_always_returns_the_base(tree: Tree, n: i64) -> bool {
        let base = tree.0;
        let next = produce_with(
            &base,
            |draft| draft.set("fresh", n),
            |_, _, rollback| rollback.rollback(),
        )
        .unwrap();
        next == base
    }

    #[quickcheck]
    fn reading_everything_changes_nothing(tree: Tree) -> bool {
        let base = tree.0;
        fn visit(draft: &Draft) -> Result<(), DraftError> {
            for (_, value) in draft.entries()? {
                if let DraftValue::Draft(child) = value {
                    if child.kind()?.is_container() {
                        visit(&child)?;
                    }
                }
            }
            Ok(())
        }
        let next = produce(&base, visit).unwrap();
        next == base
    }

    fn descend(draft: &Draft, keys: &[Key]) -> Result<Draft, DraftError> {
        keys.iter()
            .try_fold(draft.clone(), |node, key| node.child(key.clone()))
    }

    #[quickcheck]
    fn writing_a_leaf_back_is_a_no_op(tree: Tree) -> bool {
        let base = tree.0;
        leaf_paths(&base).iter().all(|path| {
            let Some((last, parents)) = path.split_last() else {
                return true;
            };
            let next = produce(&base, |draft| {
                let node = descend(draft, parents)?;
                let original = node
                    .get(last.clone())?
                    .and_then(DraftValue::into_value)
                    .unwrap_or_default();
                node.set(last.clone(), "fresh")?;
                node.set(last.clone(), original)
            })
            .unwrap();
            next == base
        })
    }

    /// Writes a fresh leaf at `path` and checks that only the nodes along it were copied.
    fn copies_only_along(base: &Value, path: &[Key]) -> bool {
        let Some((last, parents)) = path.split_last() else {
            return true;
        };
        let next = produce(base, |draft| descend(draft, parents)?.set(last.clone(), "fresh"))
            .unwrap();

        let (mut before, mut after) = (base.clone(), next);
        for key in path {
            let (Some(b), Some(a)) = (before.as_compound(), after.as_compound()) else {
                return false;
            };
            if b == a {
                return false;
            }
            let siblings_shared = b
                .keys()
                .iter()
                .filter(|k| *k != key)
                .all(|k| b.get(k) == a.get(k));
            if !siblings_shared {
                return false;
            }
            let (b, a) = (b.get(key).unwrap_or_default(), a.get(key).unwrap_or_default());
            before = b;
            after = a;
        }
        after == Value::from("fresh")
    }

    #[quickcheck]
    fn writes_copy_exactly_the_written_path(tree: Tree) -> bool {
        let base = tree.0;
        leaf_paths(&base)
            .iter()
            .all(|path| copies_only_along(&base, path))
    }

    #[quickcheck]
    fn changed_results_are_frozen(tree: Tree) -> bool {
        let base = tree.0;
        let next = produce(&base, |draft| draft.set("fresh", true)).unwrap();
        let root = next.as_compound().unwrap();
        root.set("other", 1).is_err() && root.remove("fresh").is_err()
    }
}
