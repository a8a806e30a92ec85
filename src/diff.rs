// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Structural differences between two values, for debugging sessions.
//!
//! Subtrees that are identical (the same node) are skipped without being visited, so diffing a
//! session result against its base only walks the copied paths.
use crate::{Key, Path, Value, value::Data};
use std::fmt;

/// One difference between two values.
#[derive(Debug, Clone, PartialEq)]
pub enum Difference {
    Created { path: Path, value: Value },
    Removed { path: Path, value: Value },
    Changed { path: Path, before: Value, after: Value },
}

impl Difference {
    pub fn path(&self) -> &Path {
        match self {
            Difference::Created { path, .. }
            | Difference::Removed { path, .. }
            | Difference::Changed { path, .. } => path,
        }
    }
}

struct Location<'a>(&'a Path);

impl fmt::Display for Location<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("$")
        } else {
            write!(f, "$.{}", self.0)
        }
    }
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difference::Created { path, value } => write!(f, "+ {}: {value:?}", Location(path)),
            Difference::Removed { path, value } => write!(f, "- {}: {value:?}", Location(path)),
            Difference::Changed {
                path,
                before,
                after,
            } => write!(f, "~ {}: {before:?} -> {after:?}", Location(path)),
        }
    }
}

/// Lists the differences between `before` and `after`, parents before children.
///
/// Compounds of the same kind are compared entry by entry (sets by membership); anything else
/// that is not identical is reported as a change.
pub fn difference(before: &Value, after: &Value) -> Vec<Difference> {
    let mut out = Vec::new();
    walk(&Path::root(), before, after, &mut out);
    out
}

fn walk(path: &Path, before: &Value, after: &Value, out: &mut Vec<Difference>) {
    if before == after {
        return;
    }
    let (Value::Compound(b), Value::Compound(a)) = (before, after) else {
        return changed(path, before, after, out);
    };
    let (b, a) = (b.data(), a.data());
    match (&*b, &*a) {
        (Data::Set(b), Data::Set(a)) => {
            for element in b.iter().filter(|e| !a.contains(*e)) {
                out.push(Difference::Removed {
                    path: path.child(Key::Entry(element.clone())),
                    value: element.clone(),
                });
            }
            for element in a.iter().filter(|e| !b.contains(*e)) {
                out.push(Difference::Created {
                    path: path.child(Key::Entry(element.clone())),
                    value: element.clone(),
                });
            }
        }
        (b, a) if b.kind() == a.kind() => {
            for (key, value) in b.entries() {
                let child = path.child(key.clone());
                match a.get(&key) {
                    Some(other) => walk(&child, &value, &other, out),
                    None => out.push(Difference::Removed { path: child, value }),
                }
            }
            for (key, value) in a.entries() {
                if !b.contains(&key) {
                    out.push(Difference::Created {
                        path: path.child(key),
                        value,
                    });
                }
            }
        }
        _ => changed(path, before, after, out),
    }
}

fn changed(path: &Path, before: &Value, after: &Value, out: &mut Vec<Difference>) {
    out.push(Difference::Changed {
        path: path.clone(),
        before: before.clone(),
        after: after.clone(),
    });
}

/// Logs the differences between `before` and `after` at info level, one event per difference.
pub fn print_difference(before: &Value, after: &Value) {
    if before == after {
        tracing::info!("state: equal");
        return;
    }
    for difference in difference(before, after) {
        tracing::info!(path = %difference.path(), "{difference}");
    }
}
