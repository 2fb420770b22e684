//! Binary and unary operators over wrapped values.
//!
//! Operands are coerced with the value model's rules. Any dirty operand makes
//! the result dirty, except for the operators whose result type is fixed.

use super::value::{
    float_to_int, literal_float, literal_str, JsWrapper, Literal, ObjectHeap, Value,
};

/// Evaluate `left <op> right`. Unknown operators yield a dirty value.
pub fn binary(op: &str, left: &JsWrapper, right: &JsWrapper, heap: &ObjectHeap) -> JsWrapper {
    match op {
        "&&" => {
            if left.is_dirty() {
                return JsWrapper::dirty();
            }
            return if left.as_bool() { right.clone() } else { left.clone() };
        }
        "||" => {
            if left.is_dirty() {
                return JsWrapper::dirty();
            }
            return if left.as_bool() { left.clone() } else { right.clone() };
        }
        "??" => {
            if left.is_dirty() {
                return JsWrapper::dirty();
            }
            return match left.value {
                Value::Literal(Literal::Null) | Value::Literal(Literal::Undefined) => right.clone(),
                _ => left.clone(),
            };
        }
        _ => {}
    }

    if left.is_dirty() || right.is_dirty() {
        // the content is unknown but a string operand still fixes the type
        if op == "+" && (left.is_string() || right.is_string()) {
            return JsWrapper {
                value: Value::Literal(Literal::String(String::new())),
                dirty: true,
                ..Default::default()
            };
        }
        return JsWrapper::dirty();
    }

    match op {
        "+" => add(left, right, heap),
        "-" => JsWrapper::number(left.as_float(heap) - right.as_float(heap)),
        "*" => JsWrapper::number(left.as_float(heap) * right.as_float(heap)),
        "**" => JsWrapper::number(left.as_float(heap).powf(right.as_float(heap))),
        "/" => {
            let divisor = right.as_float(heap);
            if divisor == 0.0 {
                return JsWrapper::number(0.0);
            }
            JsWrapper::number(left.as_float(heap) / divisor)
        }
        "%" => {
            let divisor = right.as_float(heap);
            if divisor == 0.0 {
                return JsWrapper::number(0.0);
            }
            JsWrapper::number(left.as_float(heap) % divisor)
        }
        "<<" => JsWrapper::number(f64::from(
            to_int32(left, heap).wrapping_shl(shift_count(right, heap)),
        )),
        ">>" => JsWrapper::number(f64::from(
            to_int32(left, heap).wrapping_shr(shift_count(right, heap)),
        )),
        ">>>" => JsWrapper::number(f64::from(
            (to_int32(left, heap) as u32).wrapping_shr(shift_count(right, heap)),
        )),
        "&" => JsWrapper::number(f64::from(to_int32(left, heap) & to_int32(right, heap))),
        "|" => JsWrapper::number(f64::from(to_int32(left, heap) | to_int32(right, heap))),
        "^" => JsWrapper::number(f64::from(to_int32(left, heap) ^ to_int32(right, heap))),
        "==" => JsWrapper::boolean(loose_equals(left, right, heap)),
        "!=" => JsWrapper::boolean(!loose_equals(left, right, heap)),
        "===" => JsWrapper::boolean(strict_equals(left, right)),
        "!==" => JsWrapper::boolean(!strict_equals(left, right)),
        "<" | ">" | "<=" | ">=" => JsWrapper::boolean(compare(op, left, right, heap)),
        _ => JsWrapper::dirty(),
    }
}

/// Evaluate a prefix unary operator.
pub fn unary(op: &str, operand: &JsWrapper, heap: &ObjectHeap) -> JsWrapper {
    match op {
        "typeof" => {
            if operand.is_dirty() && operand.hooks.is_none() && !operand.callable {
                return JsWrapper::dirty();
            }
            JsWrapper::string(operand.type_of())
        }
        "void" => JsWrapper::undefined(),
        "delete" => JsWrapper::boolean(true),
        _ if operand.is_dirty() => JsWrapper::dirty(),
        "!" => JsWrapper::boolean(!operand.as_bool()),
        "-" => JsWrapper::number(-operand.as_float(heap)),
        "+" => JsWrapper::number(operand.as_float(heap)),
        "~" => JsWrapper::number(f64::from(!to_int32(operand, heap))),
        _ => JsWrapper::dirty(),
    }
}

/// The binary operator behind an augmented assignment (`+=` → `+`).
pub fn augmented_operator(op: &str) -> &str {
    match op {
        "&&=" | "||=" | "??=" => &op[..op.len() - 1],
        _ => op.strip_suffix('=').unwrap_or(op),
    }
}

fn add(left: &JsWrapper, right: &JsWrapper, heap: &ObjectHeap) -> JsWrapper {
    let stringish = |w: &JsWrapper| w.is_string() || w.object_id().is_some();
    if stringish(left) || stringish(right) {
        let as_text = |w: &JsWrapper| match &w.value {
            Value::Literal(Literal::Null) | Value::Literal(Literal::Undefined) => String::new(),
            _ => w.as_str(heap),
        };
        return JsWrapper::string(as_text(left) + &as_text(right));
    }
    JsWrapper::number(left.as_float(heap) + right.as_float(heap))
}

fn to_int32(w: &JsWrapper, heap: &ObjectHeap) -> i32 {
    let f = w.as_float(heap);
    if !f.is_finite() {
        return 0;
    }
    f.trunc().rem_euclid(4_294_967_296.0) as u32 as i32
}

fn shift_count(w: &JsWrapper, heap: &ObjectHeap) -> u32 {
    (float_to_int(w.as_float(heap)) & 0x1f) as u32
}

fn strict_equals(left: &JsWrapper, right: &JsWrapper) -> bool {
    match (&left.value, &right.value) {
        (Value::Literal(a), Value::Literal(b)) => match (a, b) {
            (Literal::Number(x), Literal::Number(y)) => x == y,
            _ => a == b,
        },
        (Value::Object(a), Value::Object(b)) => a == b,
        _ => false,
    }
}

fn loose_equals(left: &JsWrapper, right: &JsWrapper, heap: &ObjectHeap) -> bool {
    if strict_equals(left, right) {
        return true;
    }
    match (&left.value, &right.value) {
        (Value::Literal(a), Value::Literal(b)) => match (a, b) {
            (Literal::Null | Literal::Undefined, Literal::Null | Literal::Undefined) => true,
            (Literal::Null | Literal::Undefined, _) | (_, Literal::Null | Literal::Undefined) => {
                false
            }
            (Literal::String(x), Literal::String(y)) => x == y,
            _ => literal_float(a) == literal_float(b),
        },
        (Value::Object(_), Value::Object(_)) => false,
        (Value::Object(_), Value::Literal(lit)) | (Value::Literal(lit), Value::Object(_)) => {
            let object = if matches!(left.value, Value::Object(_)) { left } else { right };
            match lit {
                Literal::Null | Literal::Undefined => false,
                Literal::String(s) => object.as_str(heap) == *s,
                _ => object.as_float(heap) == literal_float(lit),
            }
        }
        _ => false,
    }
}

fn compare(op: &str, left: &JsWrapper, right: &JsWrapper, heap: &ObjectHeap) -> bool {
    if let (Value::Literal(Literal::String(a)), Value::Literal(Literal::String(b))) =
        (&left.value, &right.value)
    {
        return match op {
            "<" => a < b,
            ">" => a > b,
            "<=" => a <= b,
            _ => a >= b,
        };
    }
    let (a, b) = (left.as_float(heap), right.as_float(heap));
    match op {
        "<" => a < b,
        ">" => a > b,
        "<=" => a <= b,
        _ => a >= b,
    }
}

/// Render a literal for messages.
pub fn describe(w: &JsWrapper, heap: &ObjectHeap) -> String {
    match &w.value {
        Value::Literal(lit) if !w.dirty => literal_str(lit),
        Value::Object(_) => w.as_str(heap),
        _ => "<unknown>".to_string(),
    }
}
