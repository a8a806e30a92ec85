// (c) Copyright 2025 Helsing GmbH. All rights reserved.
use crate::{Kind, Value};
use smallvec::SmallVec;
use std::{fmt, rc::Rc};

/// Addresses a child of a compound.
///
/// Keys are loosely typed on the way in (`"3"` and `3` address the same sequence slot) and are
/// normalized against the container kind before use; see [`Key::normalize`].
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// A field name of an object.
    Field(Rc<str>),
    /// A position in a sequence.
    Index(usize),
    /// A map key or a set element.
    Entry(Value),
}

impl Key {
    /// Converts this key into the form used by containers of `kind`.
    ///
    /// Returns `None` if the key cannot address anything in such a container, e.g. a non-numeric
    /// field name on a sequence, or any key on a leaf.
    pub fn normalize(&self, kind: Kind) -> Option<Key> {
        match (kind, self) {
            (Kind::Object, Key::Field(_)) => Some(self.clone()),
            (Kind::Object, Key::Index(i)) => Some(Key::Field(i.to_string().into())),
            (Kind::Object, Key::Entry(Value::String(s))) => Some(Key::Field(Rc::clone(s))),
            (Kind::Object, Key::Entry(Value::Int(i))) => Some(Key::Field(i.to_string().into())),
            (Kind::Sequence, Key::Index(_)) => Some(self.clone()),
            (Kind::Sequence, Key::Field(name)) => name.parse().ok().map(Key::Index),
            (Kind::Sequence, Key::Entry(Value::Int(i))) => {
                usize::try_from(*i).ok().map(Key::Index)
            }
            (Kind::Map | Kind::Set, Key::Entry(_)) => Some(self.clone()),
            (Kind::Map | Kind::Set, Key::Field(name)) => {
                Some(Key::Entry(Value::String(Rc::clone(name))))
            }
            (Kind::Map | Kind::Set, Key::Index(i)) => {
                i64::try_from(*i).ok().map(|i| Key::Entry(Value::Int(i)))
            }
            _ => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            Key::Index(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the key as a value, as it would be handed to a map or set.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Field(name) => Value::String(Rc::clone(name)),
            Key::Index(i) => i64::try_from(*i).map_or(Value::Null, Value::Int),
            Key::Entry(v) => v.clone(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => f.write_str(name),
            Key::Index(i) => write!(f, "{i}"),
            Key::Entry(Value::String(s)) => f.write_str(s),
            Key::Entry(v) => write!(f, "{v:?}"),
        }
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Field(name) => write!(f, "{name:?}"),
            Key::Index(i) => write!(f, "{i}"),
            Key::Entry(v) => write!(f, "<{v:?}>"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Field(s.into())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Field(s.into())
    }
}

impl From<Rc<str>> for Key {
    fn from(s: Rc<str>) -> Self {
        Key::Field(s)
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Index(i)
    }
}

impl From<i32> for Key {
    fn from(i: i32) -> Self {
        usize::try_from(i).map_or(Key::Entry(Value::Int(i64::from(i))), Key::Index)
    }
}

impl From<Value> for Key {
    fn from(v: Value) -> Self {
        Key::Entry(v)
    }
}

impl From<&Key> for Key {
    fn from(k: &Key) -> Self {
        k.clone()
    }
}

/// The keys leading from a session's root to a node. The root itself has the empty path.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Path(SmallVec<[Key; 4]>);

impl Path {
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns this path extended by `key`.
    pub fn child(&self, key: Key) -> Self {
        let mut path = self.clone();
        path.0.push(key);
        path
    }

    pub fn push(&mut self, key: Key) {
        self.0.push(key);
    }

    pub fn last(&self) -> Option<&Key> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Key> {
        self.0.iter()
    }

    /// Returns true if `self` equals `other` or lies below it.
    pub fn starts_with(&self, other: &Path) -> bool {
        self.0.starts_with(&other.0)
    }
}

impl FromIterator<Key> for Path {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a Key;
    type IntoIter = std::slice::Iter<'a, Key>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, key) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{key}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({self})")
    }
}
