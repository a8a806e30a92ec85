// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Dynamic values with identity-carrying compound nodes.
//!
//! Primitives compare by value. Compounds and callables compare by identity, which is what lets a
//! session tell "the same subtree as in the base" apart from "an equal-looking fresh copy".

use crate::{Key, RandomState, ValueError};
use indexmap::{IndexMap, IndexSet};
use std::{
    cell::{Cell, Ref, RefCell, RefMut},
    fmt,
    hash::{Hash, Hasher},
    rc::{Rc, Weak},
};

pub(crate) type Fields = IndexMap<Rc<str>, Value, RandomState>;
pub(crate) type Entries = IndexMap<Value, Value, RandomState>;
pub(crate) type Elements = IndexSet<Value, RandomState>;

/// The shape of a value, fixed when a descriptor is created for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// String-keyed fields.
    Object,
    /// Index-addressed elements.
    Sequence,
    /// Key-value container with arbitrary keys.
    Map,
    /// Unique-element container.
    Set,
    /// A function value.
    Callable,
    /// Anything else (null, booleans, numbers, strings).
    Leaf,
}

impl Kind {
    /// Returns the lowercase name of this kind.
    pub fn name(self) -> &'static str {
        match self {
            Kind::Object => "object",
            Kind::Sequence => "sequence",
            Kind::Map => "map",
            Kind::Set => "set",
            Kind::Callable => "callable",
            Kind::Leaf => "leaf",
        }
    }

    /// Returns true for kinds a draft can hold children for.
    pub fn is_container(self) -> bool {
        matches!(self, Kind::Object | Kind::Sequence | Kind::Map | Kind::Set)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The payload of a compound node.
#[derive(Clone)]
pub(crate) enum Data {
    Object(Fields),
    Sequence(Vec<Value>),
    Map(Entries),
    Set(Elements),
}

impl Data {
    pub(crate) fn kind(&self) -> Kind {
        match self {
            Data::Object(_) => Kind::Object,
            Data::Sequence(_) => Kind::Sequence,
            Data::Map(_) => Kind::Map,
            Data::Set(_) => Kind::Set,
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Data::Object(fields) => fields.len(),
            Data::Sequence(items) => items.len(),
            Data::Map(entries) => entries.len(),
            Data::Set(elements) => elements.len(),
        }
    }

    /// Looks up an already normalized key.
    ///
    /// For sets the stored element itself is returned when `key` names a member.
    pub(crate) fn get(&self, key: &Key) -> Option<Value> {
        match (self, key) {
            (Data::Object(fields), Key::Field(name)) => fields.get(name).cloned(),
            (Data::Sequence(items), Key::Index(i)) => items.get(*i).cloned(),
            (Data::Map(entries), Key::Entry(k)) => entries.get(k).cloned(),
            (Data::Set(elements), Key::Entry(e)) => elements.get(e).cloned(),
            _ => None,
        }
    }

    /// Position of an already normalized key in iteration order.
    pub(crate) fn index_of(&self, key: &Key) -> Option<usize> {
        match (self, key) {
            (Data::Object(fields), Key::Field(name)) => fields.get_index_of(name),
            (Data::Sequence(items), Key::Index(i)) => (*i < items.len()).then_some(*i),
            (Data::Map(entries), Key::Entry(k)) => entries.get_index_of(k),
            (Data::Set(elements), Key::Entry(e)) => elements.get_index_of(e),
            _ => None,
        }
    }

    pub(crate) fn contains(&self, key: &Key) -> bool {
        match (self, key) {
            (Data::Object(fields), Key::Field(name)) => fields.contains_key(name),
            (Data::Sequence(items), Key::Index(i)) => *i < items.len(),
            (Data::Map(entries), Key::Entry(k)) => entries.contains_key(k),
            (Data::Set(elements), Key::Entry(e)) => elements.contains(e),
            _ => false,
        }
    }

    pub(crate) fn entries(&self) -> Vec<(Key, Value)> {
        match self {
            Data::Object(fields) => fields
                .iter()
                .map(|(k, v)| (Key::Field(Rc::clone(k)), v.clone()))
                .collect(),
            Data::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (Key::Index(i), v.clone()))
                .collect(),
            Data::Map(entries) => entries
                .iter()
                .map(|(k, v)| (Key::Entry(k.clone()), v.clone()))
                .collect(),
            Data::Set(elements) => elements
                .iter()
                .map(|e| (Key::Entry(e.clone()), e.clone()))
                .collect(),
        }
    }

    /// Returns the same shape with every value (or set element) passed through `f`.
    pub(crate) fn map_values(&self, mut f: impl FnMut(&Value) -> Value) -> Data {
        match self {
            Data::Object(fields) => {
                Data::Object(fields.iter().map(|(k, v)| (Rc::clone(k), f(v))).collect())
            }
            Data::Sequence(items) => Data::Sequence(items.iter().map(f).collect()),
            Data::Map(entries) => {
                Data::Map(entries.iter().map(|(k, v)| (k.clone(), f(v))).collect())
            }
            Data::Set(elements) => Data::Set(elements.iter().map(f).collect()),
        }
    }

    /// Writes `value` under an already normalized key.
    pub(crate) fn write(&mut self, key: &Key, value: Value) -> Result<(), ValueError> {
        match (self, key) {
            (Data::Object(fields), Key::Field(name)) => {
                fields.insert(Rc::clone(name), value);
            }
            (Data::Sequence(items), Key::Index(i)) => {
                let len = items.len();
                match *i {
                    i if i < len => items[i] = value,
                    i if i == len => items.push(value),
                    index => return Err(ValueError::OutOfBounds { index, len }),
                }
            }
            (Data::Map(entries), Key::Entry(k)) => {
                entries.insert(k.clone(), value);
            }
            (data, _) => {
                return Err(ValueError::KindMismatch {
                    op: "set",
                    kind: data.kind(),
                });
            }
        }
        Ok(())
    }

    /// Removes an already normalized key, keeping the order of the remaining entries.
    pub(crate) fn delete(&mut self, key: &Key) -> Option<Value> {
        match (self, key) {
            (Data::Object(fields), Key::Field(name)) => fields.shift_remove(name),
            (Data::Sequence(items), Key::Index(i)) if *i < items.len() => Some(items.remove(*i)),
            (Data::Map(entries), Key::Entry(k)) => entries.shift_remove(k),
            (Data::Set(elements), Key::Entry(e)) => elements.shift_take(e),
            _ => None,
        }
    }
}

struct Node {
    frozen: Cell<bool>,
    data: RefCell<Data>,
}

/// A shared, identity-carrying container node: an object, sequence, map or set.
///
/// Cloning a `Compound` clones the handle, not the contents.
#[derive(Clone)]
pub struct Compound(Rc<Node>);

impl Compound {
    pub(crate) fn new(data: Data) -> Self {
        Self(Rc::new(Node {
            frozen: Cell::new(false),
            data: RefCell::new(data),
        }))
    }

    /// Creates an empty, unfrozen compound of the given container kind.
    ///
    /// Returns `None` for [`Kind::Callable`] and [`Kind::Leaf`].
    pub fn empty(kind: Kind) -> Option<Self> {
        let data = match kind {
            Kind::Object => Data::Object(Fields::default()),
            Kind::Sequence => Data::Sequence(Vec::new()),
            Kind::Map => Data::Map(Entries::default()),
            Kind::Set => Data::Set(Elements::default()),
            Kind::Callable | Kind::Leaf => return None,
        };
        Some(Self::new(data))
    }

    pub(crate) fn data(&self) -> Ref<'_, Data> {
        self.0.data.borrow()
    }

    /// Mutable access that bypasses the freeze flag; only the drafting engine uses this, and only
    /// on copies it created itself.
    pub(crate) fn data_mut(&self) -> RefMut<'_, Data> {
        self.0.data.borrow_mut()
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Returns true if both handles point at the same node.
    pub fn ptr_eq(&self, other: &Compound) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Creates a weak handle to this node.
    pub fn downgrade(&self) -> WeakCompound {
        WeakCompound(Rc::downgrade(&self.0))
    }

    pub fn kind(&self) -> Kind {
        self.data().kind()
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    /// Freezes this node only; children keep their own flag.
    pub fn freeze(&self) {
        self.0.frozen.set(true);
    }

    /// Freezes this node and everything reachable from it.
    ///
    /// Already-frozen nodes are not descended into.
    pub fn deep_freeze(&self) {
        if self.is_frozen() {
            return;
        }
        self.freeze();
        let children: Vec<Value> = self.data().entries().into_iter().map(|(_, v)| v).collect();
        for child in children {
            child.deep_freeze();
        }
    }

    /// Returns a new unfrozen node holding the same entries (the entries themselves are shared).
    pub fn shallow_copy(&self) -> Compound {
        Compound::new(self.data().clone())
    }

    /// Looks up `key`, interpreting it according to this node's kind.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        let data = self.data();
        let key = key.into().normalize(data.kind())?;
        data.get(&key)
    }

    pub fn contains(&self, key: impl Into<Key>) -> bool {
        let data = self.data();
        key.into()
            .normalize(data.kind())
            .is_some_and(|key| data.contains(&key))
    }

    pub fn keys(&self) -> Vec<Key> {
        self.data().entries().into_iter().map(|(k, _)| k).collect()
    }

    /// Returns the values in order; for sets, the elements.
    pub fn values(&self) -> Vec<Value> {
        self.data().entries().into_iter().map(|(_, v)| v).collect()
    }

    pub fn entries(&self) -> Vec<(Key, Value)> {
        self.data().entries()
    }

    fn check_writable(&self) -> Result<(), ValueError> {
        if self.is_frozen() {
            return Err(ValueError::Frozen { kind: self.kind() });
        }
        Ok(())
    }

    fn normalized(&self, key: Key, op: &'static str) -> Result<Key, ValueError> {
        let kind = self.kind();
        key.normalize(kind)
            .ok_or(ValueError::KindMismatch { op, kind })
    }

    /// Writes a field, slot or map entry. Writing at a sequence's length appends.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) -> Result<(), ValueError> {
        self.check_writable()?;
        let key = self.normalized(key.into(), "set")?;
        self.data_mut().write(&key, value.into())
    }

    /// Removes a field, map entry, set element or sequence slot (shifting later slots).
    pub fn remove(&self, key: impl Into<Key>) -> Result<Option<Value>, ValueError> {
        self.check_writable()?;
        let key = self.normalized(key.into(), "remove")?;
        Ok(self.data_mut().delete(&key))
    }

    /// Appends to a sequence.
    pub fn push(&self, value: impl Into<Value>) -> Result<(), ValueError> {
        self.check_writable()?;
        match &mut *self.data_mut() {
            Data::Sequence(items) => {
                items.push(value.into());
                Ok(())
            }
            data => Err(ValueError::KindMismatch {
                op: "push",
                kind: data.kind(),
            }),
        }
    }

    /// Adds an element to a set, returning false if it was already present.
    pub fn insert(&self, element: impl Into<Value>) -> Result<bool, ValueError> {
        self.check_writable()?;
        match &mut *self.data_mut() {
            Data::Set(elements) => Ok(elements.insert(element.into())),
            data => Err(ValueError::KindMismatch {
                op: "insert",
                kind: data.kind(),
            }),
        }
    }
}

impl PartialEq for Compound {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Compound {}

impl Hash for Compound {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(data) = self.0.data.try_borrow() else {
            return f.write_str("<borrowed>");
        };
        match &*data {
            Data::Object(fields) => f.debug_map().entries(fields.iter()).finish(),
            Data::Sequence(items) => f.debug_list().entries(items.iter()).finish(),
            Data::Map(entries) => {
                f.write_str("Map ")?;
                f.debug_map().entries(entries.iter()).finish()
            }
            Data::Set(elements) => {
                f.write_str("Set ")?;
                f.debug_set().entries(elements.iter()).finish()
            }
        }
    }
}

/// A weak handle to a [`Compound`] that does not keep it alive.
#[derive(Clone)]
pub struct WeakCompound(Weak<Node>);

impl WeakCompound {
    pub fn upgrade(&self) -> Option<Compound> {
        self.0.upgrade().map(Compound)
    }

    /// Returns true if this handle was created from `compound`.
    pub fn points_to(&self, compound: &Compound) -> bool {
        std::ptr::eq(self.0.as_ptr(), Rc::as_ptr(&compound.0))
    }

    pub(crate) fn addr(&self) -> usize {
        self.0.as_ptr() as usize
    }
}

impl fmt::Debug for WeakCompound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakCompound({:#x})", self.addr())
    }
}

/// A shared function value. Compared by identity.
#[derive(Clone)]
pub struct Callable(Rc<dyn Fn(&[Value]) -> Value>);

impl Callable {
    pub fn new(f: impl Fn(&[Value]) -> Value + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.0)(args)
    }

    fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for Callable {}

impl Hash for Callable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<function>")
    }
}

/// A dynamic value.
///
/// Equality is identity for [`Value::Compound`] and [`Value::Function`], and value equality for
/// primitives (floats compare by bit pattern). Use [`Value::deep_eq`] for structural comparison.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<str>),
    Compound(Compound),
    Function(Callable),
}

impl Value {
    /// Builds an object from `(field, value)` pairs.
    pub fn object<I, K>(fields: I) -> Value
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<Rc<str>>,
    {
        let fields = fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Value::Compound(Compound::new(Data::Object(fields)))
    }

    pub fn array(items: impl IntoIterator<Item = Value>) -> Value {
        Value::Compound(Compound::new(Data::Sequence(items.into_iter().collect())))
    }

    pub fn map(entries: impl IntoIterator<Item = (Value, Value)>) -> Value {
        Value::Compound(Compound::new(Data::Map(entries.into_iter().collect())))
    }

    pub fn set(elements: impl IntoIterator<Item = Value>) -> Value {
        Value::Compound(Compound::new(Data::Set(elements.into_iter().collect())))
    }

    pub fn function(f: impl Fn(&[Value]) -> Value + 'static) -> Value {
        Value::Function(Callable::new(f))
    }

    pub fn kind(&self) -> Kind {
        match self {
            Value::Compound(c) => c.kind(),
            Value::Function(_) => Kind::Callable,
            _ => Kind::Leaf,
        }
    }

    /// Returns true for objects, sequences, maps and sets.
    pub fn is_compound(&self) -> bool {
        matches!(self, Value::Compound(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_compound(&self) -> Option<&Compound> {
        match self {
            Value::Compound(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Looks up `key` on a compound value; `None` for primitives and missing keys.
    pub fn get(&self, key: impl Into<Key>) -> Option<Value> {
        self.as_compound()?.get(key)
    }

    /// Primitives and callables are always considered frozen.
    pub fn is_frozen(&self) -> bool {
        match self {
            Value::Compound(c) => c.is_frozen(),
            _ => true,
        }
    }

    pub fn deep_freeze(&self) {
        if let Value::Compound(c) = self {
            c.deep_freeze();
        }
    }

    /// Structural equality: compounds are equal if they have the same kind and deeply equal
    /// contents, regardless of identity.
    pub fn deep_eq(&self, other: &Value) -> bool {
        let (Value::Compound(a), Value::Compound(b)) = (self, other) else {
            return self == other;
        };
        if a.ptr_eq(b) {
            return true;
        }
        let (a, b) = (a.data(), b.data());
        match (&*a, &*b) {
            (Data::Object(x), Data::Object(y)) => {
                x.len() == y.len()
                    && x.iter()
                        .all(|(k, v)| y.get(k).is_some_and(|w| v.deep_eq(w)))
            }
            (Data::Sequence(x), Data::Sequence(y)) => {
                x.len() == y.len() && x.iter().zip(y).all(|(v, w)| v.deep_eq(w))
            }
            (Data::Map(x), Data::Map(y)) => {
                x.len() == y.len()
                    && x.iter()
                        .all(|(k, v)| y.get(k).is_some_and(|w| v.deep_eq(w)))
            }
            (Data::Set(x), Data::Set(y)) => {
                x.len() == y.len()
                    && x.iter()
                        .all(|e| y.contains(e) || y.iter().any(|f| e.deep_eq(f)))
            }
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Compound(a), Value::Compound(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Compound(c) => c.hash(state),
            Value::Function(f) => f.hash(state),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Compound(c) => c.fmt(f),
            Value::Function(c) => c.fmt(f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::String(s)
    }
}

impl From<Compound> for Value {
    fn from(c: Compound) -> Self {
        Value::Compound(c)
    }
}

impl From<Callable> for Value {
    fn from(c: Callable) -> Self {
        Value::Function(c)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value;

    #[test]
    fn primitives_compare_by_value() {
        assert_eq!(Value::from(1), Value::Int(1));
        assert_eq!(Value::from("a"), Value::from(String::from("a")));
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
    }

    #[test]
    fn compounds_compare_by_identity() {
        let a = value!({ "x" => 1 });
        let b = value!({ "x" => 1 });
        assert_ne!(a, b);
        assert!(a.deep_eq(&b));
        assert_eq!(a, a.clone());
    }

    #[test]
    fn functions_compare_by_identity() {
        let f = Value::function(|_| Value::Null);
        let g = Value::function(|_| Value::Null);
        assert_eq!(f, f.clone());
        assert_ne!(f, g);
        assert_eq!(f.kind(), Kind::Callable);
    }

    #[test]
    fn kinds() {
        assert_eq!(value!({}).kind(), Kind::Object);
        assert_eq!(value!([1, 2]).kind(), Kind::Sequence);
        assert_eq!(Value::map([]).kind(), Kind::Map);
        assert_eq!(Value::set([]).kind(), Kind::Set);
        assert_eq!(Value::from(3).kind(), Kind::Leaf);
        assert!(Kind::Set.is_container());
        assert!(!Kind::Callable.is_container());
    }

    #[test]
    fn get_normalizes_keys_per_kind() {
        let seq = value!([10, 20, 30]);
        assert_eq!(seq.get(1), Some(Value::from(20)));
        assert_eq!(seq.get("2"), Some(Value::from(30)));
        assert_eq!(seq.get("x"), None);

        let map = Value::map([(Value::from("k"), Value::from(1))]);
        assert_eq!(map.get("k"), Some(Value::from(1)));

        let obj = value!({ "0" => true });
        assert_eq!(obj.get(0), Some(Value::from(true)));
    }

    #[test]
    fn frozen_compounds_reject_mutation() {
        let v = value!({ "a" => { "b" => 1 } });
        v.deep_freeze();
        let outer = v.as_compound().unwrap();
        let inner = v.get("a").unwrap();
        assert_eq!(
            outer.set("c", 1),
            Err(ValueError::Frozen { kind: Kind::Object })
        );
        assert_eq!(
            outer.remove("a"),
            Err(ValueError::Frozen { kind: Kind::Object })
        );
        assert!(inner.as_compound().unwrap().set("b", 2).is_err());
    }

    #[test]
    fn deep_freeze_skips_frozen_subtrees() {
        let inner = value!({ "deep" => { "x" => 1 } });
        inner.as_compound().unwrap().freeze();
        let outer = Value::object([("inner", inner.clone())]);
        outer.deep_freeze();
        assert!(outer.is_frozen());
        // the already-frozen node was not descended into
        assert!(!inner.get("deep").unwrap().is_frozen());
    }

    #[test]
    fn deep_freeze_terminates_on_cycles() {
        let v = value!({});
        v.as_compound().unwrap().set("me", v.clone()).unwrap();
        v.deep_freeze();
        assert!(v.is_frozen());
    }

    #[test]
    fn shallow_copy_shares_children() {
        let v = value!({ "a" => { "b" => 1 }, "n" => 2 });
        v.deep_freeze();
        let copy = v.as_compound().unwrap().shallow_copy();
        assert!(!copy.is_frozen());
        assert_ne!(Value::from(copy.clone()), v);
        assert_eq!(copy.get("a"), v.get("a"));
        copy.set("n", 3).unwrap();
        assert_eq!(v.get("n"), Some(Value::from(2)));
    }

    #[test]
    fn sequence_writes_append_at_len_only() {
        let v = value!([1]);
        let seq = v.as_compound().unwrap();
        seq.set(1, 2).unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(
            seq.set(5, 2),
            Err(ValueError::OutOfBounds { index: 5, len: 2 })
        );
        seq.push(3).unwrap();
        assert!(value!([1, 2, 3]).deep_eq(&v));
    }

    #[test]
    fn kind_mismatched_operations_fail() {
        let v = value!({});
        let obj = v.as_compound().unwrap();
        assert_eq!(
            obj.push(1),
            Err(ValueError::KindMismatch {
                op: "push",
                kind: Kind::Object
            })
        );
        let s = Value::set([Value::from(1)]);
        let set = s.as_compound().unwrap();
        assert!(set.set("a", 1).is_err());
        assert_eq!(set.insert(1), Ok(false));
        assert_eq!(set.insert(2), Ok(true));
        assert_eq!(set.remove(1), Ok(Some(Value::from(1))));
    }

    #[test]
    fn deep_eq_compares_structure() {
        let a = value!({ "list" => [1, 2, { "x" => null }] });
        let b = value!({ "list" => [1, 2, { "x" => null }] });
        let c = value!({ "list" => [1, 2, { "x" => 1 }] });
        assert!(a.deep_eq(&b));
        assert!(!a.deep_eq(&c));
        assert!(Value::set([value!({ "a" => 1 })]).deep_eq(&Value::set([value!({ "a" => 1 })])));
    }

    #[test]
    fn weak_handles_do_not_keep_nodes_alive() {
        let v = value!({});
        let weak = v.as_compound().unwrap().downgrade();
        assert!(weak.points_to(v.as_compound().unwrap()));
        assert!(weak.upgrade().is_some());
        drop(v);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn debug_renders_nested_values() {
        let v = value!({ "a" => [1, "two", null], "b" => true });
        insta::assert_snapshot!(format!("{v:?}"), @r#"{"a": [1, "two", null], "b": true}"#);
    }
}
