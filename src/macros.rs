// (c) Copyright 2025 Helsing GmbH. All rights reserved.
/// Convenience macro for building [`Value`](crate::Value) literals.
///
/// Objects use `{ "key" => value }`, sequences `[a, b]`. Nested values must be a single token
/// tree, so wrap anything longer than a literal (negative numbers, constructor calls) in
/// parentheses.
///
/// ```rust
/// # use cowdraft::{value, Kind, Value};
/// let v = value!({
///     "name" => "draft",
///     "tags" => ["a", "b"],
///     "nested" => { "n" => (-1), "nothing" => null },
///     "set" => (Value::set([Value::from(1)]))
/// });
/// assert_eq!(v.kind(), Kind::Object);
/// assert_eq!(v.get("nested").unwrap().get("n"), Some(Value::Int(-1)));
/// ```
#[macro_export]
macro_rules! value {
    ({ $($k:literal => $v:tt),* $(,)? }) => {{
        let fields: ::std::vec::Vec<(&str, $crate::Value)> = ::std::vec![$(($k, $crate::value!($v))),*];
        $crate::Value::object(fields)
    }};
    ([ $($v:tt),* $(,)? ]) => {
        $crate::Value::array(::std::vec![$($crate::value!($v)),*])
    };
    (null) => {
        $crate::Value::Null
    };
    ($e:expr) => {
        $crate::Value::from($e)
    };
}
