//! Document helpers: dotted field paths and value ordering.
//!
//! Implements MongoDB-style comparison semantics over `bson::Bson`.

use std::cmp::Ordering;

use bson::{Bson, Document};

// ============================================================================
// Field Path Resolution
// ============================================================================

/// Get a nested value from a document using a dot-separated path.
/// Returns `None` if any path segment is missing or the parent is not a document.
pub fn get_path<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Set a nested value, creating intermediate documents as needed.
/// A non-document value on the way is replaced by a document.
pub fn set_path(doc: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, Document::new());
            }
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                set_path(inner, rest, value);
            }
        }
    }
}

/// Remove a nested value. Returns the removed value, if any.
pub fn remove_path(doc: &mut Document, path: &str) -> Option<Bson> {
    match path.split_once('.') {
        None => doc.remove(path),
        Some((head, rest)) => match doc.get_mut(head) {
            Some(Bson::Document(inner)) => remove_path(inner, rest),
            _ => None,
        },
    }
}

// ============================================================================
// Value Comparison
// ============================================================================

/// Canonical type bracket used for ordering values of different types.
///
/// Numbers of any width share one bracket, as do the two string-like types.
pub fn type_rank(v: &Bson) -> u8 {
    match v {
        Bson::MinKey => 0,
        Bson::Null | Bson::Undefined => 1,
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => 2,
        Bson::String(_) | Bson::Symbol(_) => 3,
        Bson::Document(_) => 4,
        Bson::Array(_) => 5,
        Bson::Binary(_) => 6,
        Bson::ObjectId(_) => 7,
        Bson::Boolean(_) => 8,
        Bson::DateTime(_) => 9,
        Bson::Timestamp(_) => 10,
        Bson::RegularExpression(_) => 11,
        Bson::MaxKey => 13,
        _ => 12,
    }
}

/// Numeric view of a value, if it is a number. Lossy for large `Int64`s;
/// use [`compare_values`] to compare.
pub fn as_f64(v: &Bson) -> Option<f64> {
    match number(v)? {
        Number::Int(i) => Some(i as f64),
        Number::Float(f) => Some(f),
    }
}

/// A number in the widest exact representation available.
#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

fn number(v: &Bson) -> Option<Number> {
    match v {
        Bson::Int32(i) => Some(Number::Int(i64::from(*i))),
        Bson::Int64(i) => Some(Number::Int(*i)),
        Bson::Double(d) => Some(Number::Float(*d)),
        Bson::Decimal128(d) => Some(Number::Float(d.to_string().parse().unwrap_or(f64::NAN))),
        _ => None,
    }
}

/// True for a floating-point NaN, including a NaN `Decimal128`.
pub fn is_nan(v: &Bson) -> bool {
    matches!(number(v), Some(Number::Float(f)) if f.is_nan())
}

/// Floats ordered with NaN below every other number, `-0.0 == 0.0`.
fn compare_floats(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Exact comparison of an integer with a float.
fn compare_int_float(i: i64, f: f64) -> Ordering {
    // i64::MIN and 2^63 are exact in f64
    const TWO_63: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() {
        return Ordering::Greater;
    }
    if f >= TWO_63 {
        return Ordering::Less;
    }
    if f < -TWO_63 {
        return Ordering::Greater;
    }
    let whole = f.trunc();
    match i.cmp(&(whole as i64)) {
        Ordering::Equal => compare_floats(0.0, f - whole),
        other => other,
    }
}

fn compare_numbers(a: Number, b: Number) -> Ordering {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => x.cmp(&y),
        (Number::Float(x), Number::Float(y)) => compare_floats(x, y),
        (Number::Int(x), Number::Float(y)) => compare_int_float(x, y),
        (Number::Float(x), Number::Int(y)) => compare_int_float(y, x).reverse(),
    }
}

fn as_str(v: &Bson) -> Option<&str> {
    match v {
        Bson::String(s) => Some(s),
        Bson::Symbol(s) => Some(s),
        _ => None,
    }
}

/// Total order over BSON values.
///
/// - Different type brackets order by [`type_rank`].
/// - Numbers compare by value regardless of width; integers compare exactly
///   and NaN sorts below every other number.
/// - Strings compare by codepoint; booleans `false < true`.
/// - Documents and arrays compare element-wise, then by length.
pub fn compare_values(a: &Bson, b: &Bson) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        _ if number(a).is_some() => match (number(a), number(b)) {
            (Some(x), Some(y)) => compare_numbers(x, y),
            _ => Ordering::Equal,
        },
        _ if as_str(a).is_some() => as_str(a).cmp(&as_str(b)),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => x.cmp(y),
        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            (x.time, x.increment).cmp(&(y.time, y.increment))
        }
        (Bson::Array(x), Bson::Array(y)) => compare_seq(x.iter(), y.iter()),
        (Bson::Document(x), Bson::Document(y)) => compare_seq(x.values(), y.values()),
        _ => Ordering::Equal,
    }
}

fn compare_seq<'a>(
    mut xs: impl Iterator<Item = &'a Bson>,
    mut ys: impl Iterator<Item = &'a Bson>,
) -> Ordering {
    loop {
        match (xs.next(), ys.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match compare_values(x, y) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}

/// Equality with numeric widening (`Int32(5) == Double(5.0)`).
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (number(a), number(b)) {
        (Some(x), Some(y)) => compare_numbers(x, y) == Ordering::Equal,
        _ => match (a, b) {
            (Bson::Array(x), Bson::Array(y)) => {
                x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
            }
            (Bson::Document(x), Bson::Document(y)) => {
                x.len() == y.len()
                    && x.iter()
                        .zip(y.iter())
                        .all(|((kl, vl), (kr, vr))| kl == kr && values_equal(vl, vr))
            }
            (Bson::Null | Bson::Undefined, Bson::Null | Bson::Undefined) => true,
            _ => a == b,
        },
    }
}

/// Human-readable name of a value's type, used in error messages.
pub fn type_name(v: &Bson) -> &'static str {
    match v {
        Bson::Double(_) => "double",
        Bson::String(_) => "string",
        Bson::Array(_) => "array",
        Bson::Document(_) => "document",
        Bson::Boolean(_) => "bool",
        Bson::Null => "null",
        Bson::RegularExpression(_) => "regex",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Timestamp(_) => "timestamp",
        Bson::Binary(_) => "binData",
        Bson::ObjectId(_) => "objectId",
        Bson::DateTime(_) => "date",
        Bson::Decimal128(_) => "decimal",
        _ => "other",
    }
}

// ============================================================================
// Tests
// ============================================================================
