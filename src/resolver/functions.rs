//! The fixed helper-function library available to template expressions.
//!
//! This is the whole callable surface of the sandbox: key/value projection,
//! object subset extraction, templated repetition, random generation, date
//! formatting, and base64 codecs. Misused helpers log a warning and fall
//! back to returning their input (or a neutral value) instead of failing the
//! property — matching how template authors expect them to degrade.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::Rng;
use serde_json::{Map, Value};

use super::eval::{EvalError, num_value, stringify};

const DEFAULT_NOW_FORMAT: &str = "DD/MM/YYYY HH:mm:ss";
const RANDOM_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Dispatch a call to one of the library functions.
pub(crate) fn call(name: &str, args: &[Value]) -> Result<Value, EvalError> {
    match name {
        "_keys" => Ok(keys(args)),
        "_keysReplace" => Ok(keys_replace(args)),
        "_values" => Ok(values(args)),
        "_extract" => Ok(extract(args)),
        "_extractValues" => Ok(extract_values(args)),
        "_repeat" => Ok(repeat(args)),
        "_length" => Ok(length(args)),
        "_randomInt" => Ok(random_int(args)),
        "_randomFloat" => Ok(random_float(args)),
        "_randomString" => Ok(random_string(args)),
        "_now" => Ok(now(args)),
        "btoa" => Ok(encode_base64(args)),
        "atob" => Ok(decode_base64(args)),
        other => Err(EvalError::UnknownFunction(other.to_string())),
    }
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Null)
}

fn warn(function: &str, message: &str) {
    tracing::warn!(target: "weftrun::resolver", function, "{message}");
}

fn as_object(value: &Value) -> Option<&Map<String, Value>> {
    value.as_object()
}

/// Keys of an object, optionally joined into one string.
fn keys(args: &[Value]) -> Value {
    let value = arg(args, 0);
    let Some(map) = as_object(&value) else {
        warn("_keys", "value is not an object");
        return value;
    };
    match args.get(1).and_then(Value::as_str) {
        Some(join) => Value::String(map.keys().cloned().collect::<Vec<_>>().join(join)),
        None => Value::Array(map.keys().cloned().map(Value::String).collect()),
    }
}

/// Keys suffixed with `join`, with `replace` substituted by the 1-based
/// position of each key.
fn keys_replace(args: &[Value]) -> Value {
    let value = arg(args, 0);
    let Some(map) = as_object(&value) else {
        warn("_keysReplace", "value is not an object");
        return value;
    };
    let (Some(join), Some(replace)) = (
        args.get(1).and_then(Value::as_str),
        args.get(2).and_then(Value::as_str),
    ) else {
        warn("_keysReplace", "missing join/replace parameters");
        return value;
    };
    let out = map
        .keys()
        .enumerate()
        .map(|(index, key)| {
            let counter = (index + 1).to_string();
            Value::String(format!("{key}{join}").replace(replace, &counter))
        })
        .collect();
    Value::Array(out)
}

/// Values of an object, optionally joined into one string.
fn values(args: &[Value]) -> Value {
    let value = arg(args, 0);
    let Some(map) = as_object(&value) else {
        warn("_values", "value is not an object");
        return value;
    };
    match args.get(1).and_then(Value::as_str) {
        Some(join) => Value::String(
            map.values()
                .map(stringify)
                .collect::<Vec<_>>()
                .join(join),
        ),
        None => Value::Array(map.values().cloned().collect()),
    }
}

/// Subset of an object restricted to the listed keys.
fn extract(args: &[Value]) -> Value {
    let value = arg(args, 0);
    let list = arg(args, 1);
    let (Some(map), Some(list)) = (as_object(&value), list.as_array()) else {
        warn("_extract", "expected an object and a key list");
        return Value::Object(Map::new());
    };
    let mut out = Map::new();
    for key in list.iter().filter_map(Value::as_str) {
        if let Some(found) = map.get(key) {
            out.insert(key.to_string(), found.clone());
        }
    }
    Value::Object(out)
}

/// Values of the listed keys, absent keys yielding null.
fn extract_values(args: &[Value]) -> Value {
    let value = arg(args, 0);
    let list = arg(args, 1);
    let (Some(map), Some(list)) = (as_object(&value), list.as_array()) else {
        warn("_extractValues", "expected an object and a key list");
        return Value::Array(Vec::new());
    };
    Value::Array(
        list.iter()
            .filter_map(Value::as_str)
            .map(|key| map.get(key).cloned().unwrap_or(Value::Null))
            .collect(),
    )
}

/// `count` copies of `value`; for strings, the first occurrence of
/// `replace` becomes the 1-based copy number.
fn repeat(args: &[Value]) -> Value {
    let value = arg(args, 0);
    let count = args.get(1).and_then(Value::as_f64).unwrap_or(0.0).max(0.0) as usize;
    let replace = args.get(2).and_then(Value::as_str);

    match &value {
        Value::String(text) => Value::Array(
            (0..count)
                .map(|i| match replace {
                    Some(replace) => {
                        Value::String(text.replacen(replace, &(i + 1).to_string(), 1))
                    }
                    None => Value::String(text.clone()),
                })
                .collect(),
        ),
        Value::Number(_) => {
            if replace.is_some() {
                warn("_repeat", "replacement does not apply to a number");
                return value;
            }
            Value::Array(std::iter::repeat_n(value.clone(), count).collect())
        }
        _ => {
            warn("_repeat", "value is not a string or a number");
            value
        }
    }
}

/// Length of a string, array, or object key set.
fn length(args: &[Value]) -> Value {
    let value = arg(args, 0);
    match &value {
        Value::String(s) => num_value(s.chars().count() as f64),
        Value::Array(items) => num_value(items.len() as f64),
        Value::Object(map) => num_value(map.len() as f64),
        Value::Number(_) => {
            warn("_length", "length does not apply to a number");
            value
        }
        _ => {
            warn("_length", "value has no length");
            value
        }
    }
}

/// Random integer in `[min, max)`; degenerate ranges return `min`.
fn random_int(args: &[Value]) -> Value {
    let (Some(min), Some(max)) = (
        args.first().and_then(Value::as_f64),
        args.get(1).and_then(Value::as_f64),
    ) else {
        warn("_randomInt", "parameters must be numbers");
        return num_value(0.0);
    };
    if max <= min {
        return num_value(min.floor());
    }
    let sample: f64 = rand::rng().random::<f64>();
    num_value((sample * (max - min)).floor() + min)
}

/// Random float in `[min, max)` rendered with a fixed number of decimals.
fn random_float(args: &[Value]) -> Value {
    let (Some(min), Some(max)) = (
        args.first().and_then(Value::as_f64),
        args.get(1).and_then(Value::as_f64),
    ) else {
        warn("_randomFloat", "parameters must be numbers");
        return num_value(0.0);
    };
    let decimals = args.get(2).and_then(Value::as_u64).unwrap_or(2) as usize;
    let sample: f64 = rand::rng().random::<f64>();
    let value = sample * (max - min) + min;
    Value::String(format!("{value:.decimals$}"))
}

/// Random alphanumeric string of the requested length.
fn random_string(args: &[Value]) -> Value {
    let Some(length) = args.first().and_then(Value::as_u64) else {
        warn("_randomString", "length must be a number");
        return Value::String(String::new());
    };
    let mut rng = rand::rng();
    let out: String = (0..length)
        .map(|_| {
            let index = rng.random_range(0..RANDOM_CHARSET.len());
            RANDOM_CHARSET[index] as char
        })
        .collect();
    Value::String(out)
}

/// Current local time rendered with day.js-style format tokens.
fn now(args: &[Value]) -> Value {
    let format = args
        .first()
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_NOW_FORMAT);
    let converted = convert_format_tokens(format);
    Value::String(chrono::Local::now().format(&converted).to_string())
}

/// Translate day.js format tokens into chrono's strftime directives.
fn convert_format_tokens(format: &str) -> String {
    // Longest tokens first so YYYY wins over YY.
    const TOKENS: [(&str, &str); 8] = [
        ("YYYY", "%Y"),
        ("SSS", "%3f"),
        ("YY", "%y"),
        ("MM", "%m"),
        ("DD", "%d"),
        ("HH", "%H"),
        ("mm", "%M"),
        ("ss", "%S"),
    ];
    let mut out = String::with_capacity(format.len());
    let mut rest = format;
    'outer: while !rest.is_empty() {
        if rest.starts_with('%') {
            out.push_str("%%");
            rest = &rest[1..];
            continue;
        }
        for (token, directive) in TOKENS {
            if let Some(stripped) = rest.strip_prefix(token) {
                out.push_str(directive);
                rest = stripped;
                continue 'outer;
            }
        }
        let ch = rest.chars().next().expect("rest is non-empty");
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }
    out
}

fn encode_base64(args: &[Value]) -> Value {
    let Some(text) = args.first().and_then(Value::as_str) else {
        warn("btoa", "value is not a string");
        return Value::String(String::new());
    };
    Value::String(BASE64.encode(text.as_bytes()))
}

fn decode_base64(args: &[Value]) -> Value {
    let Some(text) = args.first().and_then(Value::as_str) else {
        warn("atob", "value is not a string");
        return Value::String(String::new());
    };
    match BASE64.decode(text.as_bytes()) {
        Ok(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        Err(_) => {
            warn("atob", "value is not valid base64");
            Value::String(String::new())
        }
    }
}
