//! The dynamic argument-value model shared by the expression compiler, the
//! bytecode VM, and the deterministic constraint validator.
//!
//! Tool-call arguments arrive as `serde_json::Value`; internally everything
//! downstream of the loader works against [`Value`], a small closed
//! enumeration that mirrors the glossary's `{Null, Bool, Number, String,
//! Array, Object}` variants and carries the `truthy`/`toNum` coercion rules
//! verbatim.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value as JsonValue;

/// A dynamic value flowing through rule evaluation: a tool-call argument,
/// an intermediate expression result, or a constant-pool literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// JSON `null`, or the result of an unresolved argument path.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Numeric literal. Integers and floats are not distinguished.
    Number(f64),
    /// UTF-8 string literal.
    String(String),
    /// Ordered list of values.
    Array(Vec<Value>),
    /// String-keyed map, ordered for deterministic iteration.
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// `truthy(x)`: number != 0, boolean true, or any non-null value that
    /// is not the number zero. Strings and objects are truthy unless they
    /// are `Null`; the empty string is truthy (the specification defines
    /// truthiness only in terms of number/boolean/null, not string length).
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::String(_) | Self::Array(_) | Self::Object(_) => true,
        }
    }

    /// `toNum(x)`: coerces strings through base-10 parsing; anything that
    /// does not parse (including non-numeric types) becomes `0`.
    #[must_use]
    pub fn to_num(&self) -> f64 {
        match self {
            Self::Number(n) => *n,
            Self::Bool(true) => 1.0,
            Self::Bool(false) => 0.0,
            Self::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
            Self::Null | Self::Array(_) | Self::Object(_) => 0.0,
        }
    }

    /// Borrow as a string slice, if this is a `String` value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Borrow as a slice of array elements, if this is an `Array` value.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(a) => Some(a.as_slice()),
            _ => None,
        }
    }

    /// Whether this value is `Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Array(_) | Self::Object(_) => {
                write!(f, "{}", JsonValue::from(self.clone()))
            }
        }
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        match v {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => Self::Number(n.as_f64().unwrap_or(0.0)),
            JsonValue::String(s) => Self::String(s),
            JsonValue::Array(a) => Self::Array(a.into_iter().map(Value::from).collect()),
            JsonValue::Object(o) => {
                Self::Object(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for JsonValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => serde_json::Number::from_f64(n).map_or(Self::Null, Self::Number),
            Value::String(s) => Self::String(s),
            Value::Array(a) => Self::Array(a.into_iter().map(JsonValue::from).collect()),
            Value::Object(o) => {
                Self::Object(o.into_iter().map(|(k, v)| (k, JsonValue::from(v))).collect())
            }
        }
    }
}

/// Equality used by `CMP_EQ`/`CMP_NEQ` and the `in`/`not_in` operators.
/// Numbers compare by value; everything else compares structurally.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => (x - y).abs() < f64::EPSILON,
        _ => a == b,
    }
}

pub mod path {
    //! Argument-path parsing and resolution.
    //!
    //! Two path flavors are recognized: a plain dotted path such as
    //! `arguments.user.name` (used by legacy condition triples and as the
    //! dedup key in [`CompiledPolicy::arg_keys`](../../veto_bytecode/struct.CompiledPolicy.html)),
    //! and the richer expression-language path grammar that additionally
    //! allows `[INT]` and `[*]` segments.

    use super::Value;
    use std::fmt;

    /// One segment of a parsed argument path.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Segment {
        /// A named field, reached via `.field` or as the path's first token.
        Field(String),
        /// A fixed array index, `[n]`.
        Index(usize),
        /// Every element of an array, `[*]`.
        Wildcard,
    }

    /// A parsed, resolvable argument path.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ArgPath {
        segments: Vec<Segment>,
    }

    /// A malformed path string.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct PathError(pub String);

    impl fmt::Display for PathError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "invalid argument path: {}", self.0)
        }
    }

    impl std::error::Error for PathError {}

    const ARGUMENTS_PREFIX: &str = "arguments.";

    impl ArgPath {
        /// Strip the literal `arguments.` prefix, if present.
        #[must_use]
        pub fn strip_arguments_prefix(raw: &str) -> &str {
            raw.strip_prefix(ARGUMENTS_PREFIX).unwrap_or(raw)
        }

        /// Parse a dotted/bracketed path (after any `arguments.` prefix has
        /// already been stripped by the caller, or not — this also accepts
        /// the prefix and strips it itself for convenience).
        pub fn parse(raw: &str) -> Result<Self, PathError> {
            let raw = Self::strip_arguments_prefix(raw);
            if raw.is_empty() {
                return Err(PathError("empty path".to_string()));
            }
            let mut segments = Vec::new();
            let mut chars = raw.chars().peekable();
            let mut current = String::new();

            fn flush(current: &mut String, segments: &mut Vec<Segment>) {
                if !current.is_empty() {
                    segments.push(Segment::Field(std::mem::take(current)));
                }
            }

            while let Some(c) = chars.next() {
                match c {
                    '.' => flush(&mut current, &mut segments),
                    '[' => {
                        flush(&mut current, &mut segments);
                        let mut index_str = String::new();
                        for ic in chars.by_ref() {
                            if ic == ']' {
                                break;
                            }
                            index_str.push(ic);
                        }
                        if index_str == "*" {
                            segments.push(Segment::Wildcard);
                        } else {
                            let idx = index_str
                                .parse::<usize>()
                                .map_err(|_| PathError(raw.to_string()))?;
                            segments.push(Segment::Index(idx));
                        }
                    }
                    _ => current.push(c),
                }
            }
            flush(&mut current, &mut segments);
            if segments.is_empty() {
                return Err(PathError(raw.to_string()));
            }
            Ok(Self { segments })
        }

        /// The parsed segments, in order.
        #[must_use]
        pub fn segments(&self) -> &[Segment] {
            &self.segments
        }

        /// Re-render the canonical dotted/bracketed form (no `arguments.`
        /// prefix), used as the dedup key for a compiled policy's argument
        /// table.
        #[must_use]
        pub fn canonical(&self) -> String {
            let mut out = String::new();
            for (i, seg) in self.segments.iter().enumerate() {
                match seg {
                    Segment::Field(f) => {
                        if i > 0 {
                            out.push('.');
                        }
                        out.push_str(f);
                    }
                    Segment::Index(n) => out.push_str(&format!("[{n}]")),
                    Segment::Wildcard => out.push_str("[*]"),
                }
            }
            out
        }
    }

    /// Resolve a path against an arguments map, per the single-value
    /// semantics used by `LOAD_ARG`: a missing intermediate yields `None`
    /// (the VM treats this as `Value::Null`). A `Wildcard` segment is not
    /// valid in this resolution mode; use [`resolve_multi`] instead.
    #[must_use]
    pub fn resolve<'a>(root: &'a Value, path: &ArgPath) -> Option<&'a Value> {
        let mut current = root;
        for seg in path.segments() {
            current = match (seg, current) {
                (Segment::Field(name), Value::Object(map)) => map.get(name)?,
                (Segment::Index(idx), Value::Array(items)) => items.get(*idx)?,
                (Segment::Wildcard, _) => return None,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Resolve a path allowing `Wildcard` segments, returning every value
    /// that matches (possibly multiple, via array expansion). An empty
    /// result means the path does not resolve to anything.
    #[must_use]
    pub fn resolve_multi<'a>(root: &'a Value, path: &ArgPath) -> Vec<&'a Value> {
        let mut frontier = vec![root];
        for seg in path.segments() {
            let mut next = Vec::new();
            for value in frontier {
                match (seg, value) {
                    (Segment::Field(name), Value::Object(map)) => {
                        if let Some(v) = map.get(name) {
                            next.push(v);
                        }
                    }
                    (Segment::Index(idx), Value::Array(items)) => {
                        if let Some(v) = items.get(*idx) {
                            next.push(v);
                        }
                    }
                    (Segment::Wildcard, Value::Array(items)) => next.extend(items.iter()),
                    _ => {}
                }
            }
            frontier = next;
        }
        frontier
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::collections::BTreeMap;

        fn obj(pairs: Vec<(&str, Value)>) -> Value {
            Value::Object(pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
        }

        #[test]
        fn resolves_nested_field() {
            let root = obj(vec![("user", obj(vec![("name", Value::String("a".into()))]))]);
            let path = ArgPath::parse("arguments.user.name").unwrap();
            assert_eq!(resolve(&root, &path), Some(&Value::String("a".into())));
        }

        #[test]
        fn missing_intermediate_is_none() {
            let root = obj(vec![("user", Value::Null)]);
            let path = ArgPath::parse("user.name").unwrap();
            assert_eq!(resolve(&root, &path), None);
        }

        #[test]
        fn index_and_wildcard() {
            let root = obj(vec![(
                "items",
                Value::Array(vec![
                    obj(vec![("id", Value::Number(1.0))]),
                    obj(vec![("id", Value::Number(2.0))]),
                ]),
            )]);
            let idx_path = ArgPath::parse("items[0].id").unwrap();
            assert_eq!(resolve(&root, &idx_path), Some(&Value::Number(1.0)));

            let wc_path = ArgPath::parse("items[*].id").unwrap();
            let mut map = BTreeMap::new();
            map.insert("items".to_string(), Value::Null);
            let _ = map;
            assert_eq!(
                resolve_multi(&root, &wc_path),
                vec![&Value::Number(1.0), &Value::Number(2.0)]
            );
        }

        #[test]
        fn canonical_round_trips_dotted_form() {
            let path = ArgPath::parse("arguments.user.name").unwrap();
            assert_eq!(path.canonical(), "user.name");
        }
    }
}
