//! WebAssembly bindings for MaxWin
//!
//! Exposes the pattern store and matcher to the extension's JavaScript glue.
//! Storage stays on the JavaScript side: the list is handed over as the JSON
//! text persisted under `url-exclusion-list` and handed back the same way.

use mw_core::{url_to_pattern, Matcher, Pattern, PatternStore};
use wasm_bindgen::prelude::*;

fn js_error(context: &str, e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{}: {}", context, e))
}

#[wasm_bindgen]
#[derive(Debug, Default, Clone)]
pub struct ExclusionList {
    store: PatternStore,
}

#[wasm_bindgen]
impl ExclusionList {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a persisted `[[scheme, domainName, port, path], ...]` list.
    /// Entries are re-inserted so the result is sorted and deduplicated.
    #[wasm_bindgen(js_name = fromJson)]
    pub fn from_json(json: &str) -> Result<ExclusionList, JsValue> {
        let patterns: Vec<Pattern> =
            serde_json::from_str(json).map_err(|e| js_error("Failed to parse exclusion list", e))?;
        let store = PatternStore::from_patterns(patterns).map_err(|e| js_error("Invalid exclusion list", e))?;
        Ok(Self { store })
    }

    #[wasm_bindgen(js_name = toJson)]
    pub fn to_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(self.store.as_slice()).map_err(|e| js_error("Failed to serialize exclusion list", e))
    }

    /// Insert a pattern. `scheme`, `port` and `path` default to `*`.
    pub fn add(
        &mut self,
        domain_name: &str,
        scheme: Option<String>,
        port: Option<String>,
        path: Option<String>,
    ) -> Result<bool, JsValue> {
        let mut pattern = Pattern::new(domain_name);
        if let Some(scheme) = scheme {
            pattern = pattern.with_scheme(scheme);
        }
        if let Some(port) = port {
            pattern = pattern.with_port(port);
        }
        if let Some(path) = path {
            pattern = pattern.with_path(path);
        }
        self.store.add(pattern).map_err(|e| js_error("Failed to add pattern", e))
    }

    /// Insert the pattern matching exactly `url`.
    #[wasm_bindgen(js_name = addUrl)]
    pub fn add_url(&mut self, url: &str) -> Result<bool, JsValue> {
        let pattern = url_to_pattern(url).map_err(|e| js_error("Invalid URL", e))?;
        self.store.add(pattern).map_err(|e| js_error("Failed to add pattern", e))
    }

    /// Remove the entry at `index`; negative counts from the end. Returns
    /// whether anything was removed.
    #[wasm_bindgen(js_name = removeIndex)]
    pub fn remove_index(&mut self, index: i32) -> bool {
        self.store.remove_index(index as isize).is_some()
    }

    /// The entry at `index` as `[scheme, domainName, port, path]`, or
    /// `undefined`.
    pub fn at(&self, index: i32) -> Option<js_sys::Array> {
        let pattern = self.store.at(index as isize)?;
        let entry = js_sys::Array::new_with_length(4);
        for (i, field) in [&pattern.scheme, &pattern.domain_name, &pattern.port, &pattern.path]
            .into_iter()
            .enumerate()
        {
            entry.set(i as u32, JsValue::from_str(field));
        }
        Some(entry)
    }

    #[wasm_bindgen(js_name = includesUrl)]
    pub fn includes_url(&self, url: &str) -> bool {
        Matcher::new(&self.store).includes_url(url)
    }

    #[wasm_bindgen(getter)]
    pub fn length(&self) -> u32 {
        self.store.len() as u32
    }

    #[wasm_bindgen(js_name = isEmpty)]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_json() {
        let list = ExclusionList::from_json(
            r#"[["*", "b.com", "*", "*"], ["https", "a.com", "", "docs"], ["*", "b.com", "*", "*"]]"#,
        )
        .unwrap();
        assert_eq!(list.length(), 2);
        assert_eq!(
            list.to_json().unwrap(),
            r#"[["https","a.com","","/docs"],["*","b.com","*","*"]]"#
        );
    }

    #[test]
    fn test_edit_and_match() {
        let mut list = ExclusionList::new();
        assert!(list.is_empty());
        assert!(!list.includes_url("https://example.com/"));

        assert!(list.add("example.com", None, None, Some("foo".into())).unwrap());
        assert!(list.add_url("chrome://extensions/").unwrap());
        assert!(!list.add_url("chrome://extensions/").unwrap());

        assert!(list.includes_url("https://example.com/foo"));
        assert!(!list.includes_url("https://example.com/bar"));
        assert!(list.includes_url("chrome://extensions/"));

        assert!(list.remove_index(0));
        assert!(!list.remove_index(5));
        assert!(!list.includes_url("https://example.com/foo"));
        assert_eq!(list.length(), 1);
    }
}

#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[wasm_bindgen_test]
    fn test_at_returns_fields() {
        let list = ExclusionList::from_json(r#"[["http", "a.com", "8080", "/x"]]"#).unwrap();
        let entry = list.at(0).unwrap();
        assert_eq!(entry.length(), 4);
        assert_eq!(entry.get(2).as_string().as_deref(), Some("8080"));
        assert!(list.at(1).is_none());
        assert!(ExclusionList::from_json("{}").is_err());
    }
}
