//! Tests for grafting plain deltas into drafts.

use cowdraft::{
    DraftError, Kind, MergeOptions, Segment, Value, merge_at, merge_at_with, merge_into,
    merge_into_shallow, merge_into_with, produce, value,
};

fn merged(base: &Value, delta: &Value) -> Value {
    produce(base, |draft| merge_into(draft, [delta]).map(drop)).unwrap()
}

#[test]
fn merge_at_builds_the_missing_branch() {
    let base = value!({
        "a" => { "keep" => { "n" => 1 } },
        "other" => { "n" => 2 }
    });
    let delta = value!({ "x" => 1 });

    let next = produce(&base, |draft| merge_at(draft, "a.b.c", &delta).map(drop)).unwrap();

    let a = next.get("a").unwrap();
    assert_eq!(a.get("keep"), base.get("a").unwrap().get("keep"));
    assert_eq!(next.get("other"), base.get("other"));
    let c = a.get("b").unwrap().get("c").unwrap();
    assert_eq!(c.kind(), Kind::Object);
    assert_eq!(c.get("x"), Some(Value::from(1)));
}

#[test]
fn merge_at_infers_sequences_from_numeric_segments() {
    let base = value!({ "a" => {} });

    let next = produce(&base, |draft| {
        merge_at(draft, "a.list.0", &Value::from("first")).map(drop)
    })
    .unwrap();

    let list = next.get("a").unwrap().get("list").unwrap();
    assert!(list.deep_eq(&value!(["first"])));

    let err = produce(&base, |draft| {
        merge_at(draft, "a.list.2", &Value::from("third")).map(drop)
    })
    .unwrap_err();
    assert!(matches!(err, DraftError::OutOfBounds { index: 2, len: 0, .. }));
}

#[test]
fn merge_at_honours_kind_hints() {
    let base = value!({});

    let next = produce(&base, |draft| {
        merge_at(
            draft,
            [Segment::typed(Kind::Map, "m"), Segment::new("k")],
            &Value::from(true),
        )
        .map(drop)
    })
    .unwrap();

    let m = next.get("m").unwrap();
    assert_eq!(m.kind(), Kind::Map);
    assert_eq!(m.get(Value::from("k")), Some(Value::from(true)));
}

#[test]
fn merge_at_into_existing_structure_merges() {
    let base = value!({ "a" => { "b" => { "x" => 1, "y" => { "n" => 1 } } } });

    let next = produce(&base, |draft| {
        merge_at(draft, "a.b", &value!({ "x" => 2 })).map(drop)
    })
    .unwrap();

    let (before, after) = (
        base.get("a").unwrap().get("b").unwrap(),
        next.get("a").unwrap().get("b").unwrap(),
    );
    assert_eq!(after.get("x"), Some(Value::from(2)));
    assert_eq!(after.get("y"), before.get("y"));
}

#[test]
fn deep_merge_keeps_untouched_subtrees_shared() {
    let base = value!({
        "a" => { "x" => 1, "y" => { "n" => 1 } },
        "b" => { "z" => 3 }
    });

    let next = merged(&base, &value!({ "a" => { "x" => 2, "new" => "yes" } }));

    let a = next.get("a").unwrap();
    assert_eq!(a.get("x"), Some(Value::from(2)));
    assert_eq!(a.get("new"), Some(Value::from("yes")));
    assert_eq!(a.get("y"), base.get("a").unwrap().get("y"));
    assert_eq!(next.get("b"), base.get("b"));
}

#[test]
fn merging_equal_values_returns_the_base() {
    let base = value!({ "a" => { "x" => 1, "l" => [1, 2] } });

    let next = merged(&base, &value!({ "a" => { "x" => 1, "l" => [1, 2] } }));

    assert_eq!(next, base);
}

#[test]
fn sequences_merge_by_index_and_append() {
    let base = value!({ "l" => [1, { "n" => 1 }] });

    let next = merged(&base, &value!({ "l" => [1, { "n" => 2 }, 3] }));

    assert!(
        next.get("l")
            .unwrap()
            .deep_eq(&value!([1, { "n" => 2 }, 3]))
    );
}

#[test]
fn sets_only_gain_new_elements() {
    let base = value!({ "s" => (Value::set([Value::from(1), Value::from(2)])) });

    let next = merged(
        &base,
        &value!({ "s" => (Value::set([Value::from(2), Value::from(3)])) }),
    );

    let s = next.get("s").unwrap();
    assert_eq!(
        s.as_compound().unwrap().values(),
        [Value::from(1), Value::from(2), Value::from(3)]
    );
}

#[test]
fn kind_mismatch_replaces() {
    let base = value!({ "a" => [1] });
    let delta = value!({ "a" => { "x" => 1 } });

    let next = merged(&base, &delta);

    assert_eq!(next.get("a"), delta.get("a"));
}

#[test]
fn shallow_merge_replaces_top_level_entries() {
    let base = value!({ "a" => { "x" => 1, "y" => 2 }, "b" => 1 });
    let delta = value!({ "a" => { "x" => 2 } });

    let next = produce(&base, |draft| merge_into_shallow(draft, [&delta]).map(drop)).unwrap();

    assert_eq!(next.get("a"), delta.get("a"));
    assert_eq!(next.get("b"), Some(Value::from(1)));
}

#[test]
fn shallow_kinds_are_replaced_whole() {
    let base = value!({
        "m" => (Value::map([(Value::from("k"), value!({ "x" => 1, "y" => 1 }))])),
        "o" => { "x" => 1, "y" => 1 }
    });
    let delta = value!({
        "m" => (Value::map([(Value::from("k"), value!({ "x" => 2 }))])),
        "o" => { "x" => 2 }
    });
    let options = MergeOptions::deep().with_shallow_kind(Kind::Map);

    let next = produce(&base, |draft| {
        merge_into_with(draft, [&delta], &options).map(drop)
    })
    .unwrap();

    assert_eq!(next.get("m"), delta.get("m"));
    let o = next.get("o").unwrap();
    assert_eq!(o.get("x"), Some(Value::from(2)));
    assert_eq!(o.get("y"), Some(Value::from(1)));
}

#[test]
fn several_deltas_apply_in_order() {
    let base = value!({ "n" => 0 });
    let (first, second) = (value!({ "n" => 1, "a" => 1 }), value!({ "n" => 2 }));

    let next = produce(&base, |draft| merge_into(draft, [&first, &second]).map(drop)).unwrap();

    assert_eq!(next.get("n"), Some(Value::from(2)));
    assert_eq!(next.get("a"), Some(Value::from(1)));
}

#[test]
fn replacing_the_root_is_refused() {
    let base = value!({});

    let err = produce(&base, |draft| merge_into(draft, [&value!([1])]).map(drop)).unwrap_err();

    assert!(matches!(err, DraftError::Protocol { .. }));
}

#[test]
fn merge_at_with_options_at_an_existing_leaf_replaces() {
    let base = value!({ "a" => { "b" => 1 } });

    let next = produce(&base, |draft| {
        merge_at_with(draft, "a.b", &Value::from(5), &MergeOptions::shallow()).map(drop)
    })
    .unwrap();

    assert_eq!(next.get("a").unwrap().get("b"), Some(Value::from(5)));
}
