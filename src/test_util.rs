// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Implementation of the quickcheck::Arbitrary trait for values.
use crate::{Key, Kind, Value};
use quickcheck::{Arbitrary, Gen};

/// How deep generated compounds nest.
const MAX_DEPTH: usize = 3;

fn primitive(g: &mut Gen) -> Value {
    match u8::arbitrary(g) % 5 {
        0 => Value::Null,
        1 => Value::Bool(bool::arbitrary(g)),
        2 => Value::Int(i64::from(i8::arbitrary(g))),
        // Finite and exactly representable, so conversions stay lossless.
        3 => Value::Float(f64::from(i16::arbitrary(g)) / 4.0),
        _ => Value::from(format!("s{}", u8::arbitrary(g) % 8)),
    }
}

fn width(g: &mut Gen) -> usize {
    usize::arbitrary(g) % 4
}

fn compound(g: &mut Gen, kind: Kind, depth: usize) -> Value {
    let n = width(g);
    match kind {
        Kind::Object => {
            Value::object((0..n).map(|i| (format!("k{i}"), arbitrary_value(g, depth + 1))))
        }
        Kind::Sequence => Value::array((0..n).map(|_| arbitrary_value(g, depth + 1))),
        Kind::Map => Value::map(
            (0..n).map(|i| (Value::from(format!("m{i}")), arbitrary_value(g, depth + 1))),
        ),
        // Set members are primitives; compound members would only ever match by identity.
        Kind::Set => Value::set((0..n).map(|_| primitive(g))),
        _ => primitive(g),
    }
}

fn arbitrary_value(g: &mut Gen, depth: usize) -> Value {
    if depth >= MAX_DEPTH || u8::arbitrary(g) % 3 == 0 {
        return primitive(g);
    }
    let kind = *g
        .choose(&[Kind::Object, Kind::Sequence, Kind::Map, Kind::Set])
        .unwrap_or(&Kind::Object);
    compound(g, kind, depth)
}

impl Arbitrary for Value {
    fn arbitrary(g: &mut Gen) -> Self {
        arbitrary_value(g, 0)
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        let Some(compound) = self.as_compound() else {
            return quickcheck::empty_shrinker();
        };
        // Shrink towards each direct member.
        Box::new(compound.values().into_iter())
    }
}

/// A value whose root is always an object, so it can be drafted.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "arbitrary", allow(dead_code))]
pub(crate) struct Tree(pub Value);

impl Arbitrary for Tree {
    fn arbitrary(g: &mut Gen) -> Self {
        Tree(compound(g, Kind::Object, 0))
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        let Some(compound) = self.0.as_compound() else {
            return quickcheck::empty_shrinker();
        };
        let keys = compound.keys();
        let base = self.0.clone();
        Box::new((0..keys.len()).map(move |skip| {
            Tree(Value::object(
                keys.iter()
                    .enumerate()
                    .filter(|&(i, _)| i != skip)
                    .filter_map(|(_, key)| Some((key.to_string(), base.get(key.clone())?))),
            ))
        }))
    }
}

/// Paths from the root to every primitive outside of sets.
#[cfg_attr(feature = "arbitrary", allow(dead_code))]
pub(crate) fn leaf_paths(value: &Value) -> Vec<Vec<Key>> {
    fn collect(value: &Value, prefix: &mut Vec<Key>, out: &mut Vec<Vec<Key>>) {
        let Some(compound) = value.as_compound() else {
            if !prefix.is_empty() {
                out.push(prefix.clone());
            }
            return;
        };
        if compound.kind() == Kind::Set {
            return;
        }
        for (key, child) in compound.entries() {
            prefix.push(key);
            collect(&child, prefix, out);
            prefix.pop();
        }
    }
    let mut out = Vec::new();
    collect(value, &mut Vec::new(), &mut out);
    out
}
