//! Wrapped JavaScript values and their coercions.
//!
//! Every evaluation step of the traverser yields a [`JsWrapper`]. Objects and
//! arrays live in an [`ObjectHeap`] arena and are referenced by handle, so user
//! code may build cycles without the analyzer recursing forever.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use std::cell::Cell;

use super::entities::EntityId;
use crate::bundle::Uid;

/// Hard cap on index-driven array growth.
pub const MAX_ARRAY_LEN: usize = 100_000;

lazy_static! {
    static ref DECIMAL: Regex = Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").unwrap();
}

/// A concrete JavaScript primitive.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Literal {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

/// Handle into the object heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(usize);

/// What a wrapper holds.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    Literal(Literal),
    Object(ObjectId),
    /// Content could not be determined statically.
    #[default]
    Dirty,
}

/// The universal container passed between traversal steps.
#[derive(Debug, Clone, Default)]
pub struct JsWrapper {
    pub value: Value,
    pub is_const: bool,
    pub dirty: bool,
    pub callable: bool,
    /// Registry entity this value came from, if any.
    pub hooks: Option<EntityId>,
    /// Entity whose set hook runs when this value is assigned over.
    pub setter: Option<EntityId>,
    /// Placeholder created by reading an undeclared name.
    pub inferred: bool,
    /// Cross-privilege object reached through `wrappedJSObject`.
    pub unwrapped: bool,
    /// Speculative finding raised while producing this value; dropped when a
    /// later step proves it harmless.
    pub provisional: Option<Uid>,
}

impl JsWrapper {
    pub fn literal(lit: Literal) -> Self {
        Self {
            value: Value::Literal(lit),
            ..Default::default()
        }
    }

    pub fn undefined() -> Self {
        Self::literal(Literal::Undefined)
    }

    pub fn null() -> Self {
        Self::literal(Literal::Null)
    }

    pub fn boolean(b: bool) -> Self {
        Self::literal(Literal::Bool(b))
    }

    pub fn number(n: f64) -> Self {
        Self::literal(Literal::Number(n))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self::literal(Literal::String(s.into()))
    }

    pub fn dirty() -> Self {
        Self {
            value: Value::Dirty,
            dirty: true,
            ..Default::default()
        }
    }

    pub fn object(id: ObjectId) -> Self {
        Self {
            value: Value::Object(id),
            ..Default::default()
        }
    }

    pub fn function(id: ObjectId) -> Self {
        Self {
            value: Value::Object(id),
            callable: true,
            ..Default::default()
        }
    }

    /// A value standing for a registry entity.
    pub fn entity(id: EntityId) -> Self {
        Self {
            hooks: Some(id),
            ..Self::dirty()
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty || matches!(self.value, Value::Dirty)
    }

    /// The literal, if the value is known.
    pub fn as_literal(&self) -> Option<&Literal> {
        match &self.value {
            Value::Literal(lit) if !self.dirty => Some(lit),
            _ => None,
        }
    }

    /// The string content, if this is a known string.
    pub fn as_literal_str(&self) -> Option<&str> {
        match self.as_literal() {
            Some(Literal::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        match self.value {
            Value::Object(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self.value, Value::Literal(Literal::String(_)))
    }

    pub fn as_bool(&self) -> bool {
        match &self.value {
            Value::Literal(lit) => literal_bool(lit),
            Value::Object(_) | Value::Dirty => true,
        }
    }

    pub fn as_float(&self, heap: &ObjectHeap) -> f64 {
        match &self.value {
            Value::Literal(lit) => literal_float(lit),
            Value::Object(_) => str_to_float(&self.as_str(heap)),
            Value::Dirty => f64::NAN,
        }
    }

    /// `as_float` truncated toward zero; non-finite values become 0.
    pub fn as_int(&self, heap: &ObjectHeap) -> i64 {
        float_to_int(self.as_float(heap))
    }

    pub fn as_str(&self, heap: &ObjectHeap) -> String {
        match &self.value {
            Value::Literal(lit) => literal_str(lit),
            Value::Object(id) => heap.to_js_string(*id),
            Value::Dirty => "[object Object]".to_string(),
        }
    }

    pub fn type_of(&self) -> &'static str {
        if self.callable {
            return "function";
        }
        match &self.value {
            Value::Literal(Literal::Number(_)) => "number",
            Value::Literal(Literal::String(_)) => "string",
            Value::Literal(Literal::Bool(_)) => "boolean",
            Value::Literal(Literal::Undefined) => "undefined",
            _ => "object",
        }
    }
}

pub fn literal_bool(lit: &Literal) -> bool {
    match lit {
        Literal::Undefined | Literal::Null => false,
        Literal::Bool(b) => *b,
        Literal::Number(n) => !(*n == 0.0 || n.is_nan()),
        Literal::String(s) => !s.is_empty(),
    }
}

pub fn literal_float(lit: &Literal) -> f64 {
    match lit {
        Literal::Undefined => f64::NAN,
        Literal::Null => 0.0,
        Literal::Bool(b) => f64::from(u8::from(*b)),
        Literal::Number(n) => *n,
        Literal::String(s) => str_to_float(s),
    }
}

pub fn literal_str(lit: &Literal) -> String {
    match lit {
        Literal::Undefined => "undefined".to_string(),
        Literal::Null => "null".to_string(),
        Literal::Bool(b) => b.to_string(),
        Literal::Number(n) => number_to_string(*n),
        Literal::String(s) => s.clone(),
    }
}

pub fn float_to_int(f: f64) -> i64 {
    if f.is_finite() {
        f.trunc() as i64
    } else {
        0
    }
}

/// Parse a string the way `Number(s)` does. Never fails; bad input is NaN.
pub fn str_to_float(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    let (negative, body) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let parsed = if let Some(hex) = strip_radix(body, "0x", "0X") {
        parse_radix(hex, 16)
    } else if let Some(oct) = strip_radix(body, "0o", "0O") {
        parse_radix(oct, 8)
    } else if let Some(bin) = strip_radix(body, "0b", "0B") {
        parse_radix(bin, 2)
    } else {
        None
    };
    if let Some(v) = parsed {
        return if negative { -v } else { v };
    }
    match s {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    if DECIMAL.is_match(s) {
        s.parse().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

fn strip_radix<'s>(s: &'s str, lower: &str, upper: &str) -> Option<&'s str> {
    s.strip_prefix(lower).or_else(|| s.strip_prefix(upper))
}

fn parse_radix(digits: &str, radix: u32) -> Option<f64> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u64::from_str_radix(digits, radix).ok().map(|v| v as f64)
}

/// Render a number the way `String(n)` does.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    let abs = n.abs();
    if !(1e-6..1e21).contains(&abs) {
        let formatted = format!("{:e}", n);
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => formatted,
        };
    }
    if n.fract() == 0.0 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

#[derive(Debug)]
enum ObjectKind {
    Plain,
    Array(Vec<JsWrapper>),
}

#[derive(Debug)]
struct ObjectRecord {
    kind: ObjectKind,
    props: IndexMap<String, JsWrapper>,
    recursing: Cell<bool>,
}

/// Arena holding every object and array created during one traversal.
#[derive(Debug, Default)]
pub struct ObjectHeap {
    records: Vec<ObjectRecord>,
}

impl ObjectHeap {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc(&mut self, kind: ObjectKind) -> ObjectId {
        self.records.push(ObjectRecord {
            kind,
            props: IndexMap::new(),
            recursing: Cell::new(false),
        });
        ObjectId(self.records.len() - 1)
    }

    pub fn new_object(&mut self) -> ObjectId {
        self.alloc(ObjectKind::Plain)
    }

    pub fn new_array(&mut self, mut elements: Vec<JsWrapper>) -> ObjectId {
        elements.truncate(MAX_ARRAY_LEN);
        self.alloc(ObjectKind::Array(elements))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_array(&self, id: ObjectId) -> bool {
        matches!(self.records[id.0].kind, ObjectKind::Array(_))
    }

    pub fn get(&self, id: ObjectId, name: &str) -> Option<JsWrapper> {
        let record = &self.records[id.0];
        if let ObjectKind::Array(elements) = &record.kind {
            if name == "length" {
                return Some(JsWrapper::number(elements.len() as f64));
            }
            if let Ok(index) = name.parse::<usize>() {
                return Some(elements.get(index).cloned().unwrap_or_default());
            }
        }
        record.props.get(name).cloned()
    }

    pub fn has(&self, id: ObjectId, name: &str) -> bool {
        self.get(id, name).is_some()
    }

    pub fn set(&mut self, id: ObjectId, name: &str, value: JsWrapper) {
        let record = &mut self.records[id.0];
        if let ObjectKind::Array(elements) = &mut record.kind {
            if name == "length" {
                let len = match &value.value {
                    Value::Literal(lit) => float_to_int(literal_float(lit)),
                    _ => return,
                };
                elements.resize(len.clamp(0, MAX_ARRAY_LEN as i64) as usize, JsWrapper::undefined());
                return;
            }
            if let Ok(index) = name.parse::<usize>() {
                if index >= MAX_ARRAY_LEN {
                    return;
                }
                if index >= elements.len() {
                    elements.resize(index + 1, JsWrapper::undefined());
                }
                elements[index] = value;
                return;
            }
        }
        record.props.insert(name.to_string(), value);
    }

    pub fn keys(&self, id: ObjectId) -> Vec<String> {
        let record = &self.records[id.0];
        let mut keys = Vec::new();
        if let ObjectKind::Array(elements) = &record.kind {
            keys.extend((0..elements.len()).map(|i| i.to_string()));
        }
        keys.extend(record.props.keys().cloned());
        keys
    }

    /// `String(obj)`: arrays join their elements, objects are opaque.
    pub fn to_js_string(&self, id: ObjectId) -> String {
        let record = &self.records[id.0];
        match &record.kind {
            ObjectKind::Plain => "[object Object]".to_string(),
            ObjectKind::Array(elements) => {
                if record.recursing.get() {
                    return String::new();
                }
                record.recursing.set(true);
                let joined = elements
                    .iter()
                    .map(|e| match &e.value {
                        Value::Literal(Literal::Undefined) | Value::Literal(Literal::Null) => {
                            String::new()
                        }
                        _ => e.as_str(self),
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                record.recursing.set(false);
                joined
            }
        }
    }

    /// Debug rendering that survives cycles.
    pub fn repr(&self, value: &JsWrapper) -> String {
        match &value.value {
            Value::Dirty => "<dirty>".to_string(),
            Value::Literal(Literal::String(s)) => format!("{:?}", s),
            Value::Literal(lit) => literal_str(lit),
            Value::Object(id) => {
                let record = &self.records[id.0];
                if record.recursing.get() {
                    return "<recursion>".to_string();
                }
                record.recursing.set(true);
                let props = record
                    .props
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, self.repr(v)));
                let out = match &record.kind {
                    ObjectKind::Plain => format!("{{{}}}", props.collect::<Vec<_>>().join(", ")),
                    ObjectKind::Array(elements) => {
                        let items = elements.iter().map(|e| self.repr(e));
                        format!("[{}]", items.chain(props).collect::<Vec<_>>().join(", "))
                    }
                };
                record.recursing.set(false);
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_falsy_values() {
        for lit in [
            Literal::Number(0.0),
            Literal::Number(-0.0),
            Literal::Number(f64::NAN),
            Literal::String(String::new()),
            Literal::Bool(false),
            Literal::Null,
            Literal::Undefined,
        ] {
            assert!(!JsWrapper::literal(lit.clone()).as_bool(), "{:?}", lit);
        }
        assert!(JsWrapper::string("0").as_bool());
        assert!(JsWrapper::dirty().as_bool());
    }

    #[test]
    fn test_string_to_float() {
        assert_eq!(str_to_float("0xff"), 255.0);
        assert_eq!(str_to_float("-0x10"), -16.0);
        assert_eq!(str_to_float("0o70"), 56.0);
        assert_eq!(str_to_float("  1.5  "), 1.5);
        assert_eq!(str_to_float(""), 0.0);
        assert_eq!(str_to_float("-Infinity"), f64::NEG_INFINITY);
        assert_eq!(str_to_float("1e3"), 1000.0);
        for bad in ["abc", "1.2.3", "0xzz", "inf", "nan", "12px", "--1", "0o9"] {
            assert!(str_to_float(bad).is_nan(), "{}", bad);
        }
    }

    #[test]
    fn test_trimmed_float_round_trips_to_string() {
        let heap = ObjectHeap::new();
        let n = JsWrapper::string("  1.5  ").as_float(&heap);
        assert_eq!(JsWrapper::number(n).as_str(&heap), "1.5");
    }

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(-0.0), "0");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert_eq!(number_to_string(f64::INFINITY), "Infinity");
        assert_eq!(number_to_string(1e21), "1e+21");
        assert_eq!(number_to_string(1e-7), "1e-7");
        assert_eq!(number_to_string(123456789.0), "123456789");
    }

    #[test]
    fn test_as_int_truncates() {
        let heap = ObjectHeap::new();
        assert_eq!(JsWrapper::number(-2.7).as_int(&heap), -2);
        assert_eq!(JsWrapper::number(f64::NAN).as_int(&heap), 0);
        assert_eq!(JsWrapper::number(f64::INFINITY).as_int(&heap), 0);
    }

    #[test]
    fn test_type_of() {
        let mut heap = ObjectHeap::new();
        let f = heap.new_object();
        assert_eq!(JsWrapper::function(f).type_of(), "function");
        assert_eq!(JsWrapper::null().type_of(), "object");
        assert_eq!(JsWrapper::undefined().type_of(), "undefined");
        assert_eq!(JsWrapper::string("").type_of(), "string");
    }

    #[test]
    fn test_array_string_and_cap() {
        let mut heap = ObjectHeap::new();
        let arr = heap.new_array(vec![JsWrapper::number(1.0), JsWrapper::null(), JsWrapper::string("x")]);
        assert_eq!(JsWrapper::object(arr).as_str(&heap), "1,,x");
        heap.set(arr, "5", JsWrapper::number(2.0));
        assert_eq!(heap.get(arr, "length").unwrap().as_int(&heap), 6);
        heap.set(arr, &MAX_ARRAY_LEN.to_string(), JsWrapper::number(1.0));
        assert_eq!(heap.get(arr, "length").unwrap().as_int(&heap), 6);
    }

    #[test]
    fn test_cycles_are_printable() {
        let mut heap = ObjectHeap::new();
        let a = heap.new_object();
        let arr = heap.new_array(vec![]);
        heap.set(a, "self", JsWrapper::object(a));
        heap.set(arr, "0", JsWrapper::object(arr));
        assert_eq!(heap.repr(&JsWrapper::object(a)), "{self: <recursion>}");
        assert_eq!(JsWrapper::object(arr).as_str(&heap), "");
    }

    #[test]
    fn test_object_coercion() {
        let mut heap = ObjectHeap::new();
        let o = heap.new_object();
        let w = JsWrapper::object(o);
        assert_eq!(w.as_str(&heap), "[object Object]");
        assert!(w.as_float(&heap).is_nan());
        let single = heap.new_array(vec![JsWrapper::string("7")]);
        assert_eq!(JsWrapper::object(single).as_float(&heap), 7.0);
    }
}
