use serde_json::{Map, Value};

use crate::api::types::{RuleFailure, ValidationError, ValidationSeverity};

/// Failure while reading a parameter. Carries the full dotted/bracketed path
/// of the offending value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamError {
    /// Full path, e.g. `rules[3].params.limits.controller`.
    pub path: String,
    /// What went wrong at that path.
    pub message: String,
}

impl ParamError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ParamError { path: path.into(), message: message.into() }
    }

    /// Surface as a validation diagnostic.
    pub fn into_validation(self, severity: ValidationSeverity) -> ValidationError {
        ValidationError { path: self.path, message: self.message, severity }
    }
}

impl std::fmt::Display for ParamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl From<ParamError> for RuleFailure {
    fn from(e: ParamError) -> Self {
        RuleFailure::new(e.to_string())
    }
}

/// Typed, path-tracked view over a free-form parameter map.
///
/// Accessors coerce where safe (a finite double with zero fractional part is
/// a valid integer), reject overflow, and report failures with the full path.
pub struct ParamReader<'a> {
    value: &'a Value,
    path: String,
}

impl<'a> ParamReader<'a> {
    /// Wrap a value rooted at `path`.
    pub fn new(value: &'a Value, path: impl Into<String>) -> Self {
        ParamReader { value, path: path.into() }
    }

    /// The path of the wrapped value.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The raw wrapped value.
    pub fn value(&self) -> &'a Value {
        self.value
    }

    fn key_path(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        }
    }

    fn as_map(&self) -> Result<&'a Map<String, Value>, ParamError> {
        match self.value {
            Value::Object(map) => Ok(map),
            Value::Null => Err(ParamError::new(&self.path, "expected a map, found nothing")),
            other => Err(ParamError::new(&self.path, format!("expected a map, found {}", kind_of(other)))),
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        match self.value {
            Value::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Keys present in the map but not in `allowed`, sorted.
    pub fn unknown_keys(&self, allowed: &[&str]) -> Vec<String> {
        let mut unknown: Vec<String> = match self.value {
            Value::Object(map) => map
                .keys()
                .filter(|k| !allowed.contains(&k.as_str()))
                .cloned()
                .collect(),
            _ => vec![],
        };
        unknown.sort();
        unknown
    }

    /// Nested reader for a map-valued key.
    pub fn require_map(&self, key: &str) -> Result<ParamReader<'a>, ParamError> {
        let path = self.key_path(key);
        match self.get(key) {
            Some(v @ Value::Object(_)) => Ok(ParamReader::new(v, path)),
            Some(other) => Err(ParamError::new(path, format!("expected a map, found {}", kind_of(other)))),
            None => Err(ParamError::new(path, "required parameter is missing")),
        }
    }

    /// Nested reader for an optional map-valued key.
    pub fn optional_map(&self, key: &str) -> Result<Option<ParamReader<'a>>, ParamError> {
        match self.get(key) {
            Some(Value::Null) | None => Ok(None),
            Some(_) => self.require_map(key).map(Some),
        }
    }

    /// Readers over an array-valued key, one per element.
    pub fn require_list(&self, key: &str) -> Result<Vec<ParamReader<'a>>, ParamError> {
        let path = self.key_path(key);
        match self.get(key) {
            Some(Value::Array(items)) => Ok(items
                .iter()
                .enumerate()
                .map(|(i, v)| ParamReader::new(v, format!("{}[{}]", path, i)))
                .collect()),
            Some(other) => Err(ParamError::new(path, format!("expected a list, found {}", kind_of(other)))),
            None => Err(ParamError::new(path, "required parameter is missing")),
        }
    }

    /// Like `require_list`, absent key yields `None`.
    pub fn optional_list(&self, key: &str) -> Result<Option<Vec<ParamReader<'a>>>, ParamError> {
        match self.get(key) {
            Some(Value::Null) | None => Ok(None),
            Some(_) => self.require_list(key).map(Some),
        }
    }

    /// Required integer, with double→integer coercion when exact.
    pub fn require_int(&self, key: &str) -> Result<i64, ParamError> {
        match self.optional_int(key)? {
            Some(v) => Ok(v),
            None => Err(ParamError::new(self.key_path(key), "required parameter is missing")),
        }
    }

    /// Optional integer, with double→integer coercion when exact.
    pub fn optional_int(&self, key: &str) -> Result<Option<i64>, ParamError> {
        let path = self.key_path(key);
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    return Ok(Some(i));
                }
                if let Some(f) = n.as_f64() {
                    if f.is_finite() && f.fract() == 0.0 {
                        if f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                            return Ok(Some(f as i64));
                        }
                        return Err(ParamError::new(path, format!("integer overflow: {}", f)));
                    }
                    return Err(ParamError::new(path, format!("expected an integer, found {}", f)));
                }
                Err(ParamError::new(path, "expected an integer, found an out-of-range number"))
            }
            Some(other) => Err(ParamError::new(path, format!("expected an integer, found {}", kind_of(other)))),
        }
    }

    /// Required non-negative integer.
    pub fn require_non_negative_int(&self, key: &str) -> Result<u64, ParamError> {
        let v = self.require_int(key)?;
        if v < 0 {
            return Err(ParamError::new(self.key_path(key), format!("must be non-negative, found {}", v)));
        }
        Ok(v as u64)
    }

    /// Optional non-negative integer.
    pub fn optional_non_negative_int(&self, key: &str) -> Result<Option<u64>, ParamError> {
        match self.optional_int(key)? {
            None => Ok(None),
            Some(v) if v < 0 => Err(ParamError::new(self.key_path(key), format!("must be non-negative, found {}", v))),
            Some(v) => Ok(Some(v as u64)),
        }
    }

    /// Required finite double.
    pub fn require_f64(&self, key: &str) -> Result<f64, ParamError> {
        match self.optional_f64(key)? {
            Some(v) => Ok(v),
            None => Err(ParamError::new(self.key_path(key), "required parameter is missing")),
        }
    }

    /// Optional finite double.
    pub fn optional_f64(&self, key: &str) -> Result<Option<f64>, ParamError> {
        let path = self.key_path(key);
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => match n.as_f64() {
                Some(f) if f.is_finite() => Ok(Some(f)),
                _ => Err(ParamError::new(path, "expected a finite number")),
            },
            Some(other) => Err(ParamError::new(path, format!("expected a number, found {}", kind_of(other)))),
        }
    }

    /// Required string.
    pub fn require_string(&self, key: &str) -> Result<String, ParamError> {
        match self.optional_string(key)? {
            Some(v) => Ok(v),
            None => Err(ParamError::new(self.key_path(key), "required parameter is missing")),
        }
    }

    /// Optional string.
    pub fn optional_string(&self, key: &str) -> Result<Option<String>, ParamError> {
        let path = self.key_path(key);
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(ParamError::new(path, format!("expected a string, found {}", kind_of(other)))),
        }
    }

    /// Required list of strings; rejects empty lists when `non_empty`.
    pub fn require_string_list(&self, key: &str, non_empty: bool) -> Result<Vec<String>, ParamError> {
        let path = self.key_path(key);
        match self.optional_string_list(key)? {
            Some(list) => {
                if non_empty && list.is_empty() {
                    return Err(ParamError::new(path, "list must not be empty"));
                }
                Ok(list)
            }
            None => Err(ParamError::new(path, "required parameter is missing")),
        }
    }

    /// Optional list of strings.
    pub fn optional_string_list(&self, key: &str) -> Result<Option<Vec<String>>, ParamError> {
        let path = self.key_path(key);
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    match item {
                        Value::String(s) => out.push(s.clone()),
                        other => {
                            return Err(ParamError::new(
                                format!("{}[{}]", path, i),
                                format!("expected a string, found {}", kind_of(other)),
                            ));
                        }
                    }
                }
                Ok(Some(out))
            }
            Some(other) => Err(ParamError::new(path, format!("expected a list, found {}", kind_of(other)))),
        }
    }

    /// Required boolean.
    pub fn require_bool(&self, key: &str) -> Result<bool, ParamError> {
        match self.optional_bool(key)? {
            Some(v) => Ok(v),
            None => Err(ParamError::new(self.key_path(key), "required parameter is missing")),
        }
    }

    /// Optional boolean.
    pub fn optional_bool(&self, key: &str) -> Result<Option<bool>, ParamError> {
        let path = self.key_path(key);
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(ParamError::new(path, format!("expected a boolean, found {}", kind_of(other)))),
        }
    }

    /// Required case-tolerant enumeration, parsed by `parse`.
    pub fn require_enum<T>(
        &self,
        key: &str,
        parse: impl Fn(&str) -> Option<T>,
        expected: &str,
    ) -> Result<T, ParamError> {
        let s = self.require_string(key)?;
        parse(&s).ok_or_else(|| {
            ParamError::new(self.key_path(key), format!("expected one of {}, found '{}'", expected, s))
        })
    }

    /// Optional case-tolerant enumeration.
    pub fn optional_enum<T>(
        &self,
        key: &str,
        parse: impl Fn(&str) -> Option<T>,
        expected: &str,
    ) -> Result<Option<T>, ParamError> {
        match self.optional_string(key)? {
            None => Ok(None),
            Some(s) => parse(&s)
                .map(Some)
                .ok_or_else(|| {
                    ParamError::new(self.key_path(key), format!("expected one of {}, found '{}'", expected, s))
                }),
        }
    }

    /// Entries of a map-valued reader as `(key, child reader)` pairs, in
    /// document order.
    pub fn entries(&self) -> Result<Vec<(String, ParamReader<'a>)>, ParamError> {
        let map = self.as_map()?;
        Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), ParamReader::new(v, self.key_path(k))))
            .collect())
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "nothing",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a map",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reader(v: &Value) -> ParamReader<'_> {
        ParamReader::new(v, "rules[0].params")
    }

    #[test]
    fn test_require_int_plain() {
        let v = json!({"max": 10});
        assert_eq!(reader(&v).require_int("max").unwrap(), 10);
    }

    #[test]
    fn test_int_coercion_from_exact_double() {
        let v = json!({"max": 10.0});
        assert_eq!(reader(&v).require_int("max").unwrap(), 10);
    }

    #[test]
    fn test_int_rejects_fractional_double() {
        let v = json!({"max": 10.5});
        let err = reader(&v).require_int("max").unwrap_err();
        assert_eq!(err.path, "rules[0].params.max");
        assert!(err.message.contains("expected an integer"));
    }

    #[test]
    fn test_int_rejects_overflow() {
        let v = json!({"max": 1.0e300});
        let err = reader(&v).require_int("max").unwrap_err();
        assert!(err.message.contains("overflow"));
    }

    #[test]
    fn test_non_negative_rejects_negative() {
        let v = json!({"max": -1});
        let err = reader(&v).require_non_negative_int("max").unwrap_err();
        assert!(err.message.contains("non-negative"));
    }

    #[test]
    fn test_missing_required_carries_path() {
        let v = json!({});
        let err = reader(&v).require_string("pattern").unwrap_err();
        assert_eq!(err.path, "rules[0].params.pattern");
    }

    #[test]
    fn test_string_list_non_empty() {
        let v = json!({"banned": []});
        let err = reader(&v).require_string_list("banned", true).unwrap_err();
        assert!(err.message.contains("must not be empty"));
    }

    #[test]
    fn test_string_list_element_path() {
        let v = json!({"banned": ["Impl", 3]});
        let err = reader(&v).require_string_list("banned", true).unwrap_err();
        assert_eq!(err.path, "rules[0].params.banned[1]");
    }

    #[test]
    fn test_unknown_keys_sorted() {
        let v = json!({"zeta": 1, "max": 2, "alpha": 3});
        let unknown = reader(&v).unknown_keys(&["max"]);
        assert_eq!(unknown, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_nested_map_path() {
        let v = json!({"limits": {"controller": "ten"}});
        let limits = reader(&v).require_map("limits").unwrap();
        let err = limits.require_int("controller").unwrap_err();
        assert_eq!(err.path, "rules[0].params.limits.controller");
    }

    #[test]
    fn test_require_enum() {
        let v = json!({"applyTo": "classes"});
        let got = reader(&v)
            .require_enum("applyTo", |s| match s {
                "classes" | "methods" => Some(s.to_string()),
                _ => None,
            }, "classes|methods")
            .unwrap();
        assert_eq!(got, "classes");
    }

    #[test]
    fn test_list_readers_indexed_paths() {
        let v = json!({"forbidden": [{"from": "a"}, {"from": "b"}]});
        let items = reader(&v).require_list("forbidden").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].path(), "rules[0].params.forbidden[1]");
        assert_eq!(items[1].require_string("from").unwrap(), "b");
    }
}
