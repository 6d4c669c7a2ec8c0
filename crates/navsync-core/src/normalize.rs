#![forbid(unsafe_code)]

//! Canonical forms for location strings and their sub-fields.
//!
//! Every function here is pure. The canonical form of an entry is
//! `path + query + fragment` where `query` is empty or starts with a single
//! `?`, `fragment` is empty or starts with a single `#`, and neither is the
//! bare prefix character on its own.

use navsync_backend::Entry;
use serde_json::Value;

use crate::error::LocationError;

/// Prefix of the query component.
pub const QUERY_PREFIX: char = '?';
/// Prefix of the fragment component.
pub const FRAGMENT_PREFIX: char = '#';

/// Trim `raw` and give it exactly one leading `prefix`.
///
/// Empty input and the bare prefix both normalize to `""`.
#[must_use]
pub fn normalize_affixed(raw: &str, prefix: char) -> String {
    let trimmed = raw.trim();
    let body = trimmed.strip_prefix(prefix).unwrap_or(trimmed);
    if body.is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(body.len() + prefix.len_utf8());
    out.push(prefix);
    out.push_str(body);
    out
}

/// Strip the leading `?` from a query, if present.
#[must_use]
pub fn query_body(query: &str) -> &str {
    query.strip_prefix(QUERY_PREFIX).unwrap_or(query)
}

/// Join path, query, and fragment into the canonical location string.
#[must_use]
pub fn compose(path: &str, query: &str, fragment: &str) -> String {
    let query = normalize_affixed(query, QUERY_PREFIX);
    let fragment = normalize_affixed(fragment, FRAGMENT_PREFIX);
    let path = path.trim();
    let mut out = String::with_capacity(path.len() + query.len() + fragment.len());
    out.push_str(path);
    out.push_str(&query);
    out.push_str(&fragment);
    out
}

/// Canonical location string of an entry.
#[must_use]
pub fn compose_entry(entry: &Entry) -> String {
    compose(&entry.path, &entry.query, &entry.fragment)
}

/// A partial location. `None` means "not specified".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationParts {
    pub path: Option<String>,
    pub query: Option<String>,
    pub fragment: Option<String>,
    pub state: Option<Value>,
}

impl LocationParts {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    #[must_use]
    pub fn fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = Some(fragment.into());
        self
    }

    #[must_use]
    pub fn state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }

    /// Complete these parts over `base`.
    ///
    /// [`Resolve::Merge`] treats empty strings and `null` state like absent
    /// fields and keeps the base value. [`Resolve::Assign`] keeps only the
    /// base path when none is given; every other absent field is cleared.
    #[must_use]
    pub fn resolve(&self, base: &Entry, mode: Resolve) -> Entry {
        match mode {
            Resolve::Merge => {
                let pick = |part: &Option<String>, fallback: &str| match part {
                    Some(value) if !value.is_empty() => value.clone(),
                    _ => fallback.to_owned(),
                };
                Entry {
                    path: pick(&self.path, &base.path),
                    query: pick(&self.query, &base.query),
                    fragment: pick(&self.fragment, &base.fragment),
                    state: match &self.state {
                        Some(state) if !state.is_null() => state.clone(),
                        _ => base.state.clone(),
                    },
                }
            }
            Resolve::Assign => Entry {
                path: match &self.path {
                    Some(path) if !path.is_empty() => path.clone(),
                    _ => base.path.clone(),
                },
                query: self.query.clone().unwrap_or_default(),
                fragment: self.fragment.clone().unwrap_or_default(),
                state: self.state.clone().unwrap_or(Value::Null),
            },
        }
    }
}

/// How [`LocationParts::resolve`] fills in missing fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolve {
    /// Missing or empty fields keep the base value.
    Merge,
    /// The parts replace the base wholesale.
    Assign,
}

/// Anything that can describe a location.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationInput {
    /// `/path?query#fragment`, any component optional.
    Href(String),
    /// Field-by-field partial.
    Parts(LocationParts),
    /// A complete entry.
    Entry(Entry),
}

impl From<&str> for LocationInput {
    fn from(value: &str) -> Self {
        Self::Href(value.to_owned())
    }
}

impl From<String> for LocationInput {
    fn from(value: String) -> Self {
        Self::Href(value)
    }
}

impl From<&String> for LocationInput {
    fn from(value: &String) -> Self {
        Self::Href(value.clone())
    }
}

impl From<LocationParts> for LocationInput {
    fn from(value: LocationParts) -> Self {
        Self::Parts(value)
    }
}

impl From<Entry> for LocationInput {
    fn from(value: Entry) -> Self {
        Self::Entry(value)
    }
}

impl From<&Entry> for LocationInput {
    fn from(value: &Entry) -> Self {
        Self::Entry(value.clone())
    }
}

/// Parse and validate a location into canonical parts.
///
/// String input is split into path, query, and fragment; components that
/// come out empty are `None`, so a merge never overwrites existing values
/// with blanks. Structured input keeps its `Some("")` fields as given.
pub fn canonical_path(input: impl Into<LocationInput>) -> Result<LocationParts, LocationError> {
    match input.into() {
        LocationInput::Href(raw) => parse_href(&raw),
        LocationInput::Parts(parts) => canonical_parts(parts),
        LocationInput::Entry(entry) => canonical_parts(LocationParts {
            path: Some(entry.path),
            query: Some(entry.query),
            fragment: Some(entry.fragment),
            state: Some(entry.state),
        }),
    }
}

/// Validate an entry and return it in canonical form.
pub fn canonical_entry(entry: &Entry) -> Result<Entry, LocationError> {
    Ok(Entry {
        path: canonical_path_field(&entry.path)?,
        query: canonical_query(&entry.query)?,
        fragment: canonical_fragment(&entry.fragment)?,
        state: entry.state.clone(),
    })
}

/// Validate and trim a path field.
pub fn canonical_path_field(raw: &str) -> Result<String, LocationError> {
    check_control(raw)?;
    let path = raw.trim();
    if path.contains([QUERY_PREFIX, FRAGMENT_PREFIX]) {
        return Err(LocationError::PathDelimiter(path.to_owned()));
    }
    if is_absolute(path) {
        return Err(LocationError::AbsoluteUrl(path.to_owned()));
    }
    Ok(path.to_owned())
}

/// Validate and normalize a query field.
pub fn canonical_query(raw: &str) -> Result<String, LocationError> {
    check_control(raw)?;
    if raw.contains(FRAGMENT_PREFIX) {
        return Err(LocationError::QueryDelimiter(raw.trim().to_owned()));
    }
    Ok(normalize_affixed(raw, QUERY_PREFIX))
}

/// Validate and normalize a fragment field.
pub fn canonical_fragment(raw: &str) -> Result<String, LocationError> {
    check_control(raw)?;
    Ok(normalize_affixed(raw, FRAGMENT_PREFIX))
}

fn parse_href(raw: &str) -> Result<LocationParts, LocationError> {
    check_control(raw)?;
    let trimmed = raw.trim();
    if is_absolute(trimmed) {
        return Err(LocationError::AbsoluteUrl(trimmed.to_owned()));
    }
    let (rest, fragment) = match trimmed.split_once(FRAGMENT_PREFIX) {
        Some((rest, fragment)) => (rest, Some(fragment)),
        None => (trimmed, None),
    };
    let (path, query) = match rest.split_once(QUERY_PREFIX) {
        Some((path, query)) => (path, Some(query)),
        None => (rest, None),
    };
    let non_empty = |s: String| (!s.is_empty()).then_some(s);
    Ok(LocationParts {
        path: non_empty(path.trim().to_owned()),
        query: query.and_then(|q| non_empty(normalize_affixed(q, QUERY_PREFIX))),
        fragment: fragment.and_then(|f| non_empty(normalize_affixed(f, FRAGMENT_PREFIX))),
        state: None,
    })
}

fn canonical_parts(parts: LocationParts) -> Result<LocationParts, LocationError> {
    Ok(LocationParts {
        path: parts.path.as_deref().map(canonical_path_field).transpose()?,
        query: parts.query.as_deref().map(canonical_query).transpose()?,
        fragment: parts.fragment.as_deref().map(canonical_fragment).transpose()?,
        state: parts.state,
    })
}

fn check_control(raw: &str) -> Result<(), LocationError> {
    match raw.char_indices().find(|(_, c)| c.is_control()) {
        Some((position, _)) => Err(LocationError::ControlCharacter {
            input: raw.to_owned(),
            position,
        }),
        None => Ok(()),
    }
}

/// `scheme:` or `//authority` prefix.
fn is_absolute(raw: &str) -> bool {
    if raw.starts_with("//") {
        return true;
    }
    let Some((scheme, _)) = raw.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn affix_edge_cases() {
        assert_eq!(normalize_affixed("", '?'), "");
        assert_eq!(normalize_affixed("?", '?'), "");
        assert_eq!(normalize_affixed("#", '#'), "");
        assert_eq!(normalize_affixed("  ?  ", '?'), "");
        assert_eq!(normalize_affixed("test", '?'), "?test");
        assert_eq!(normalize_affixed("?test", '?'), "?test");
        assert_eq!(normalize_affixed(" top ", '#'), "#top");
    }

    #[test]
    fn affix_never_doubles() {
        assert_eq!(normalize_affixed("??x", '?'), "??x");
        let once = normalize_affixed("x=1", '?');
        assert_eq!(normalize_affixed(&once, '?'), once);
    }

    #[test]
    fn compose_orders_components() {
        assert_eq!(compose("/a", "x=1", "top"), "/a?x=1#top");
        assert_eq!(compose("/a", "?", "#"), "/a");
        let entry = Entry::new("/b").with_query("?q").with_fragment("f");
        assert_eq!(compose_entry(&entry), "/b?q#f");
    }

    #[test]
    fn href_parsing_marks_empty_components_absent() {
        let parts = canonical_path("/path?x=1").unwrap();
        assert_eq!(parts.path.as_deref(), Some("/path"));
        assert_eq!(parts.query.as_deref(), Some("?x=1"));
        assert_eq!(parts.fragment, None);

        let parts = canonical_path("?#").unwrap();
        assert_eq!(parts, LocationParts::default());

        let parts = canonical_path("#frag?not-a-query").unwrap();
        assert_eq!(parts.path, None);
        assert_eq!(parts.fragment.as_deref(), Some("#frag?not-a-query"));
    }

    #[test]
    fn structured_input_keeps_explicit_clears() {
        let parts = canonical_path(LocationParts::new().query("").fragment("x")).unwrap();
        assert_eq!(parts.query.as_deref(), Some(""));
        assert_eq!(parts.fragment.as_deref(), Some("#x"));
        assert_eq!(parts.path, None);
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        assert!(matches!(
            canonical_path("/a\u{0}b"),
            Err(LocationError::ControlCharacter { position: 2, .. })
        ));
        assert!(matches!(canonical_path("https://x.test/a"), Err(LocationError::AbsoluteUrl(_))));
        assert!(matches!(canonical_path("//x.test/a"), Err(LocationError::AbsoluteUrl(_))));
        assert!(matches!(
            canonical_path(LocationParts::new().path("/a?b")),
            Err(LocationError::PathDelimiter(_))
        ));
        assert!(matches!(
            canonical_path(LocationParts::new().query("a#b")),
            Err(LocationError::QueryDelimiter(_))
        ));
        assert!(matches!(canonical_path("mailto:x"), Err(LocationError::AbsoluteUrl(_))));
        assert!(canonical_path("/a/b:c").is_ok());
    }

    #[test]
    fn resolve_merge_keeps_base_for_blank_fields() {
        let base = Entry::new("/base").with_query("?x=1").with_state(json!(1));
        let merged = LocationParts::new().path("").fragment("#f").resolve(&base, Resolve::Merge);
        assert_eq!(merged.path, "/base");
        assert_eq!(merged.query, "?x=1");
        assert_eq!(merged.fragment, "#f");
        assert_eq!(merged.state, json!(1));
    }

    #[test]
    fn resolve_assign_clears_unspecified_fields() {
        let base = Entry::new("/base").with_query("?x=1").with_state(json!(1));
        let assigned = LocationParts::new().fragment("#f").resolve(&base, Resolve::Assign);
        assert_eq!(assigned, Entry::new("/base").with_fragment("#f"));
    }

    #[test]
    fn canonical_entry_normalizes_affixes() {
        let entry = Entry::new(" /a ").with_query("x=1").with_fragment("#");
        assert_eq!(canonical_entry(&entry).unwrap(), Entry::new("/a").with_query("?x=1"));
    }
}
