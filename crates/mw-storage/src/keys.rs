//! Key sanitizing
//!
//! Cache operations accept a single key, a list of keys, an optional key, or
//! a raw JSON value coming from the host. All of them reduce to a list of
//! non-empty string keys; `null`, `""` and nested lists are dropped.

use serde_json::Value;

/// Anything that can be turned into a list of cache keys.
pub trait IntoKeys {
    fn into_keys(self) -> Vec<String>;
}

/// Normalize `keys` into a list of valid string keys.
pub fn sanitize_keys<K: IntoKeys>(keys: K) -> Vec<String> {
    keys.into_keys()
}

#[inline]
fn single(key: &str) -> Vec<String> {
    if key.is_empty() {
        Vec::new()
    } else {
        vec![key.to_string()]
    }
}

fn list<T: AsRef<str>>(keys: &[T]) -> Vec<String> {
    keys.iter()
        .filter_map(|key| {
            let key: &str = key.as_ref();
            (!key.is_empty()).then(|| key.to_string())
        })
        .collect()
}

impl IntoKeys for &str {
    fn into_keys(self) -> Vec<String> {
        single(self)
    }
}

impl IntoKeys for String {
    fn into_keys(self) -> Vec<String> {
        single(&self)
    }
}

impl IntoKeys for &String {
    fn into_keys(self) -> Vec<String> {
        single(self)
    }
}

impl<K: IntoKeys> IntoKeys for Option<K> {
    fn into_keys(self) -> Vec<String> {
        self.map(IntoKeys::into_keys).unwrap_or_default()
    }
}

impl<T: AsRef<str>> IntoKeys for &[T] {
    fn into_keys(self) -> Vec<String> {
        list(self)
    }
}

impl<T: AsRef<str>> IntoKeys for Vec<T> {
    fn into_keys(self) -> Vec<String> {
        list(&self)
    }
}

impl<T: AsRef<str>> IntoKeys for &Vec<T> {
    fn into_keys(self) -> Vec<String> {
        list(self)
    }
}

impl<T: AsRef<str>, const N: usize> IntoKeys for [T; N] {
    fn into_keys(self) -> Vec<String> {
        list(&self)
    }
}

/// Host-provided keys: a string, a list, or `null`. Non-string list items
/// (`null`, nested lists, numbers, objects) are dropped.
impl IntoKeys for &Value {
    fn into_keys(self) -> Vec<String> {
        match self {
            Value::String(key) => single(key),
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .filter(|key| !key.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}
