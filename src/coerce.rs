use serde_json::Value;

/// Best-effort integer for counter-style fields. Numbers pass through
/// (floats truncate), numeric strings parse, everything else collapses
/// to zero. Provider payloads mix `7`, `"7"` and `null` freely, so the
/// rest of the pipeline must never branch on a parse failure.
pub fn int_or_zero(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse::<i64>().unwrap_or(0),
        _ => 0,
    }
}

/// Best-effort float for measurement-style fields ("55%", 55.0, null).
/// A trailing percent sign is stripped before parsing; anything
/// unparseable becomes None.
pub fn float_or_none(value: Option<&Value>) -> Option<f64> {
    match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn str_or_empty(value: Option<&Value>) -> String {
    opt_str(value).unwrap_or_default()
}

pub fn opt_str(value: Option<&Value>) -> Option<String> {
    let s = value?.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Integer from a number or a numeric string, None otherwise.
pub fn i64_any(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<i64>().ok()
}

pub fn opt_i64(value: Option<&Value>) -> Option<i64> {
    value.and_then(i64_any)
}

pub fn bool_or(value: Option<&Value>, default: bool) -> bool {
    value.and_then(Value::as_bool).unwrap_or(default)
}
