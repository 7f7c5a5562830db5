//! Path-expression evaluation over `serde_json::Value`.

use super::Segment;
use serde_json::Value;

/// Walk the segments, collecting matches, then shape the result: no match
/// is `None`, a single match is the value itself, several matches become an
/// array flattened one level.
pub(super) fn evaluate(segments: &[Segment], context: &Value) -> Option<Value> {
    let mut current: Vec<&Value> = vec![context];

    for segment in segments {
        let mut next: Vec<&Value> = Vec::new();
        for value in current {
            step(segment, value, &mut next);
        }
        if next.is_empty() {
            return None;
        }
        current = next;
    }

    match current.len() {
        0 => None,
        1 => Some(current[0].clone()),
        _ => {
            let mut items = Vec::new();
            for value in current {
                match value {
                    Value::Array(elems) => items.extend(elems.iter().cloned()),
                    other => items.push(other.clone()),
                }
            }
            Some(Value::Array(items))
        }
    }
}

fn step<'a>(segment: &Segment, value: &'a Value, out: &mut Vec<&'a Value>) {
    match segment {
        Segment::Field(name) => field(name, value, out),
        Segment::Recursive(name) => recursive(name, value, out),
        Segment::Index(index) => {
            if let Value::Array(items) = value {
                let resolved = if *index < 0 {
                    items.len().checked_sub(index.unsigned_abs() as usize)
                } else {
                    Some(*index as usize)
                };
                if let Some(item) = resolved.and_then(|i| items.get(i)) {
                    out.push(item);
                }
            }
        }
        Segment::Wildcard => match value {
            Value::Array(items) => out.extend(items.iter()),
            Value::Object(map) => out.extend(map.values()),
            _ => {}
        },
    }
}

/// Member access; arrays map over their elements.
fn field<'a>(name: &str, value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get(name) {
                out.push(found);
            }
        }
        Value::Array(items) => {
            for item in items {
                if let Value::Object(map) = item {
                    if let Some(found) = map.get(name) {
                        out.push(found);
                    }
                }
            }
        }
        _ => {}
    }
}

/// Depth-first descent: every occurrence of `name` anywhere below `value`,
/// in document order.
fn recursive<'a>(name: &str, value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get(name) {
                out.push(found);
            }
            for child in map.values() {
                recursive(name, child, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                recursive(name, item, out);
            }
        }
        _ => {}
    }
}
