//! Balance extraction over loosely-shaped broker payloads.
//!
//! Fund endpoints differ across account generations and none of them is
//! documented reliably, so resolution is a pure function over decoded JSON:
//! scan a priority-ordered list of known field names at the top level, then
//! one level into nested objects and arrays, and accept the first strictly
//! positive finite number. A non-positive or missing value is never a
//! balance; it would read as a total loss downstream.

use serde_json::Value;

/// Field names that can carry the available balance, most trusted first.
///
/// "availabelBalance" is not a typo on our side: the upstream fund-limit
/// payload really ships that spelling.
const BALANCE_FIELDS: &[&str] = &[
    "availabelBalance",
    "availableBalance",
    "availabelMargin",
    "availableMargin",
    "netAvailableMargin",
    "withdrawableBalance",
    "netBalance",
    "equity",
    "cash",
    "balance",
    "openingBalance",
];

/// Scan `body` for a usable balance. Returns the amount and the field name
/// that carried it, or `None` when nothing in the document qualifies.
pub fn resolve_balance(body: &Value) -> Option<(f64, &'static str)> {
    scan_fields(body).or_else(|| children(body).into_iter().find_map(scan_fields))
}

/// Try every known field name against one scope. Objects are checked
/// directly; arrays are transparent, checking each element in turn. Field
/// priority outranks element order.
fn scan_fields(scope: &Value) -> Option<(f64, &'static str)> {
    for field in BALANCE_FIELDS {
        let hit = match scope {
            Value::Object(map) => map.get(*field).and_then(positive_number),
            Value::Array(items) => items
                .iter()
                .find_map(|item| item.get(*field).and_then(positive_number)),
            _ => None,
        };
        if let Some(amount) = hit {
            return Some((amount, field));
        }
    }
    None
}

/// The scopes one nesting level down: an object's values, an array's
/// elements, nothing for scalars.
fn children(v: &Value) -> Vec<&Value> {
    match v {
        Value::Object(map) => map.values().collect(),
        Value::Array(items) => items.iter().collect(),
        _ => Vec::new(),
    }
}

/// A number usable as a balance: strictly positive and finite. Some
/// endpoints quote figures as strings, so those parse too.
fn positive_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (n.is_finite() && n > 0.0).then_some(n)
}
