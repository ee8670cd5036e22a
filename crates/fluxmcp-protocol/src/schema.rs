//! JSON Schema subset validation for tool-call arguments.
//!
//! [`validate`] is a pure function over `(data, schema)` producing a
//! [`Validation`] with one [`SchemaViolation`] per failed rule. The subset
//! covers the keywords tool authors actually use: `type`, `properties`,
//! `required`, `additionalProperties`, `items`, numeric and length bounds,
//! `pattern`, `enum`, array bounds, the combinators `anyOf` / `oneOf` /
//! `allOf` / `not`, and `if`/`then`/`else`.
//!
//! [`SchemaCache`] memoizes results keyed on content hashes of the data
//! and schema. The cache is bounded and purely an optimization; disabling
//! it changes nothing observable.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

/// Outcome of validating one value against one schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    /// All rules passed.
    pub valid: bool,
    /// One entry per violated rule; empty iff `valid`.
    pub errors: Vec<SchemaViolation>,
}

impl Validation {
    fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    fn from_errors(errors: Vec<SchemaViolation>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Render the violations as the `data.errors` array of an
    /// `InvalidParams` reply.
    pub fn to_error_data(&self) -> Value {
        Value::Array(
            self.errors
                .iter()
                .map(|v| {
                    serde_json::json!({
                        "path": v.path,
                        "rule": v.rule,
                        "message": v.message,
                    })
                })
                .collect(),
        )
    }
}

/// One violated rule, addressed by JSON-pointer-style path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// Where in the instance, e.g. `/a` or `/items/3`.
    pub path: String,
    /// Which keyword failed, e.g. `type` or `required`.
    pub rule: String,
    /// Human-readable detail.
    pub message: String,
}

/// Validate `data` against `schema`.
pub fn validate(data: &Value, schema: &Value) -> Validation {
    let mut errors = Vec::new();
    check(data, schema, "", &mut errors);
    Validation::from_errors(errors)
}

fn violation(errors: &mut Vec<SchemaViolation>, path: &str, rule: &str, message: String) {
    errors.push(SchemaViolation {
        path: if path.is_empty() { "/".into() } else { path.into() },
        rule: rule.into(),
        message,
    });
}

fn check(data: &Value, schema: &Value, path: &str, errors: &mut Vec<SchemaViolation>) {
    let Some(schema_obj) = schema.as_object() else {
        // `true` accepts anything, `false` rejects everything; anything
        // else is not a schema we understand and accepts by default.
        if schema == &Value::Bool(false) {
            violation(errors, path, "schema", "value not permitted here".into());
        }
        return;
    };

    if let Some(type_spec) = schema_obj.get("type") {
        check_type(data, type_spec, path, errors);
    }

    check_combinators(data, schema_obj, path, errors);

    if let Some(condition) = schema_obj.get("if") {
        let branch = if validate(data, condition).valid {
            schema_obj.get("then")
        } else {
            schema_obj.get("else")
        };
        if let Some(branch) = branch {
            check(data, branch, path, errors);
        }
    }

    if let Some(allowed) = schema_obj.get("enum").and_then(Value::as_array)
        && !allowed.contains(data)
    {
        violation(
            errors,
            path,
            "enum",
            format!("value is not one of the {} permitted values", allowed.len()),
        );
    }

    match data {
        Value::Object(map) => check_object(map, schema_obj, path, errors),
        Value::Array(items) => check_array(items, schema_obj, path, errors),
        Value::String(s) => check_string(s, schema_obj, path, errors),
        Value::Number(_) => check_number(data, schema_obj, path, errors),
        Value::Bool(_) | Value::Null => {}
    }
}

fn type_matches(data: &Value, name: &str) -> bool {
    match name {
        "object" => data.is_object(),
        "array" => data.is_array(),
        "string" => data.is_string(),
        "boolean" => data.is_boolean(),
        "null" => data.is_null(),
        "number" => data.is_number(),
        "integer" => match data.as_f64() {
            Some(f) => data.is_i64() || data.is_u64() || f.fract() == 0.0,
            None => false,
        },
        _ => false,
    }
}

fn check_type(data: &Value, type_spec: &Value, path: &str, errors: &mut Vec<SchemaViolation>) {
    let matched = match type_spec {
        Value::String(name) => type_matches(data, name),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| type_matches(data, name)),
        _ => true,
    };
    if !matched {
        violation(
            errors,
            path,
            "type",
            format!("expected {type_spec}, got {}", type_name(data)),
        );
    }
}

fn type_name(data: &Value) -> &'static str {
    match data {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_combinators(
    data: &Value,
    schema: &serde_json::Map<String, Value>,
    path: &str,
    errors: &mut Vec<SchemaViolation>,
) {
    if let Some(schemas) = schema.get("allOf").and_then(Value::as_array) {
        for sub in schemas {
            check(data, sub, path, errors);
        }
    }

    if let Some(schemas) = schema.get("anyOf").and_then(Value::as_array) {
        let passed = schemas.iter().any(|sub| validate(data, sub).valid);
        if !passed {
            violation(
                errors,
                path,
                "anyOf",
                format!("value matches none of the {} alternatives", schemas.len()),
            );
        }
    }

    if let Some(schemas) = schema.get("oneOf").and_then(Value::as_array) {
        let matches = schemas
            .iter()
            .filter(|sub| validate(data, sub).valid)
            .count();
        if matches != 1 {
            violation(
                errors,
                path,
                "oneOf",
                format!("value matches {matches} alternatives, expected exactly 1"),
            );
        }
    }

    if let Some(sub) = schema.get("not")
        && validate(data, sub).valid
    {
        violation(errors, path, "not", "value matches the forbidden schema".into());
    }
}

fn check_object(
    map: &serde_json::Map<String, Value>,
    schema: &serde_json::Map<String, Value>,
    path: &str,
    errors: &mut Vec<SchemaViolation>,
) {
    let properties = schema.get("properties").and_then(Value::as_object);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !map.contains_key(name) {
                violation(
                    errors,
                    &format!("{path}/{name}"),
                    "required",
                    format!("missing required property `{name}`"),
                );
            }
        }
    }

    if let Some(properties) = properties {
        for (name, sub) in properties {
            if let Some(value) = map.get(name) {
                check(value, sub, &format!("{path}/{name}"), errors);
            }
        }
    }

    match schema.get("additionalProperties") {
        Some(Value::Bool(false)) => {
            for name in map.keys() {
                let declared = properties.is_some_and(|p| p.contains_key(name));
                if !declared {
                    violation(
                        errors,
                        &format!("{path}/{name}"),
                        "additionalProperties",
                        format!("property `{name}` is not permitted"),
                    );
                }
            }
        }
        Some(extra_schema) if extra_schema.is_object() => {
            for (name, value) in map {
                let declared = properties.is_some_and(|p| p.contains_key(name));
                if !declared {
                    check(value, extra_schema, &format!("{path}/{name}"), errors);
                }
            }
        }
        _ => {}
    }
}

fn check_array(
    items: &[Value],
    schema: &serde_json::Map<String, Value>,
    path: &str,
    errors: &mut Vec<SchemaViolation>,
) {
    if let Some(min) = schema.get("minItems").and_then(Value::as_u64)
        && (items.len() as u64) < min
    {
        violation(
            errors,
            path,
            "minItems",
            format!("array has {} items, minimum is {min}", items.len()),
        );
    }

    if let Some(max) = schema.get("maxItems").and_then(Value::as_u64)
        && (items.len() as u64) > max
    {
        violation(
            errors,
            path,
            "maxItems",
            format!("array has {} items, maximum is {max}", items.len()),
        );
    }

    if let Some(item_schema) = schema.get("items") {
        for (index, item) in items.iter().enumerate() {
            check(item, item_schema, &format!("{path}/{index}"), errors);
        }
    }
}

fn check_string(s: &str, schema: &serde_json::Map<String, Value>, path: &str, errors: &mut Vec<SchemaViolation>) {
    let length = s.chars().count() as u64;

    if let Some(min) = schema.get("minLength").and_then(Value::as_u64)
        && length < min
    {
        violation(
            errors,
            path,
            "minLength",
            format!("string has {length} characters, minimum is {min}"),
        );
    }

    if let Some(max) = schema.get("maxLength").and_then(Value::as_u64)
        && length > max
    {
        violation(
            errors,
            path,
            "maxLength",
            format!("string has {length} characters, maximum is {max}"),
        );
    }

    if let Some(pattern) = schema.get("pattern").and_then(Value::as_str) {
        match Regex::new(pattern) {
            Ok(re) => {
                if !re.is_match(s) {
                    violation(
                        errors,
                        path,
                        "pattern",
                        format!("string does not match pattern {pattern:?}"),
                    );
                }
            }
            Err(_) => {
                violation(
                    errors,
                    path,
                    "pattern",
                    format!("schema pattern {pattern:?} is not a valid regex"),
                );
            }
        }
    }
}

fn check_number(
    data: &Value,
    schema: &serde_json::Map<String, Value>,
    path: &str,
    errors: &mut Vec<SchemaViolation>,
) {
    let Some(n) = data.as_f64() else {
        return;
    };

    if let Some(min) = schema.get("minimum").and_then(Value::as_f64)
        && n < min
    {
        violation(errors, path, "minimum", format!("{n} is below minimum {min}"));
    }

    if let Some(max) = schema.get("maximum").and_then(Value::as_f64)
        && n > max
    {
        violation(errors, path, "maximum", format!("{n} is above maximum {max}"));
    }
}

/// Order-insensitive structural hash of a JSON value.
///
/// Object keys are hashed in sorted order so logically equal values hash
/// equal regardless of how the parser ordered them.
fn hash_value<H: Hasher>(value: &Value, state: &mut H) {
    match value {
        Value::Null => 0u8.hash(state),
        Value::Bool(b) => {
            1u8.hash(state);
            b.hash(state);
        }
        Value::Number(n) => {
            2u8.hash(state);
            n.to_string().hash(state);
        }
        Value::String(s) => {
            3u8.hash(state);
            s.hash(state);
        }
        Value::Array(items) => {
            4u8.hash(state);
            items.len().hash(state);
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Object(map) => {
            5u8.hash(state);
            map.len().hash(state);
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                key.hash(state);
                hash_value(&map[key], state);
            }
        }
    }
}

fn content_hash(value: &Value) -> u64 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    hash_value(value, &mut hasher);
    hasher.finish()
}

/// Default bound on cached validation results.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Bounded memo of validation results, keyed on `(hash(data), hash(schema))`.
///
/// When the map reaches capacity it is cleared wholesale before the next
/// insert; validation itself is cheap enough that a cold cache is only a
/// throughput dip. Hash collisions would alias results, so the capacity
/// exists mainly to bound memory, not to chase hit rate.
#[derive(Debug)]
pub struct SchemaCache {
    enabled: bool,
    capacity: usize,
    entries: Mutex<HashMap<(u64, u64), Validation>>,
}

impl SchemaCache {
    /// Enabled cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Enabled cache with an explicit capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            enabled: true,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// A cache that always misses; every call validates fresh.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            capacity: 0,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Validate through the cache.
    pub fn validate(&self, data: &Value, schema: &Value) -> Validation {
        if !self.enabled {
            return validate(data, schema);
        }

        let key = (content_hash(data), content_hash(schema));
        {
            let entries = self.entries.lock().expect("schema cache poisoned");
            if let Some(hit) = entries.get(&key) {
                return hit.clone();
            }
        }

        let result = validate(data, schema);
        let mut entries = self.entries.lock().expect("schema cache poisoned");
        if entries.len() >= self.capacity {
            entries.clear();
        }
        entries.insert(key, result.clone());
        result
    }

    /// Number of memoized results.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("schema cache poisoned").len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn add_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "a": {"type": "integer"},
                "b": {"type": "integer"},
            },
            "required": ["a", "b"],
            "additionalProperties": false,
        })
    }

    #[test]
    fn accepts_valid_arguments() {
        let result = validate(&json!({"a": 1, "b": 2}), &add_schema());
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn one_entry_per_failed_rule() {
        // "a" has the wrong type; everything else is fine.
        let result = validate(&json!({"a": "x", "b": 2}), &add_schema());
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].rule, "type");
        assert_eq!(result.errors[0].path, "/a");

        // Wrong type AND a missing required property.
        let result = validate(&json!({"a": "x"}), &add_schema());
        let rules: Vec<&str> = result.errors.iter().map(|e| e.rule.as_str()).collect();
        assert_eq!(rules, vec!["required", "type"]);
    }

    #[test]
    fn integer_accepts_whole_floats() {
        let schema = json!({"type": "integer"});
        assert!(validate(&json!(3), &schema).valid);
        assert!(validate(&json!(3.0), &schema).valid);
        assert!(!validate(&json!(3.5), &schema).valid);
        assert!(!validate(&json!("3"), &schema).valid);
    }

    #[test]
    fn type_arrays_accept_any_listed_type() {
        let schema = json!({"type": ["string", "null"]});
        assert!(validate(&json!("x"), &schema).valid);
        assert!(validate(&Value::Null, &schema).valid);
        assert!(!validate(&json!(1), &schema).valid);
    }

    #[test]
    fn string_bounds_and_pattern() {
        let schema = json!({"type": "string", "minLength": 2, "maxLength": 4, "pattern": "^[a-z]+$"});
        assert!(validate(&json!("abc"), &schema).valid);
        assert!(!validate(&json!("a"), &schema).valid);
        assert!(!validate(&json!("abcde"), &schema).valid);
        assert!(!validate(&json!("ABC"), &schema).valid);
    }

    #[test]
    fn numeric_bounds() {
        let schema = json!({"type": "number", "minimum": 0, "maximum": 10});
        assert!(validate(&json!(0), &schema).valid);
        assert!(validate(&json!(10), &schema).valid);
        assert!(!validate(&json!(-1), &schema).valid);
        assert!(!validate(&json!(10.5), &schema).valid);
    }

    #[test]
    fn array_items_and_bounds() {
        let schema = json!({
            "type": "array",
            "items": {"type": "integer"},
            "minItems": 1,
            "maxItems": 3,
        });
        assert!(validate(&json!([1, 2]), &schema).valid);
        assert!(!validate(&json!([]), &schema).valid);
        assert!(!validate(&json!([1, 2, 3, 4]), &schema).valid);

        let result = validate(&json!([1, "x", 3]), &schema);
        assert_eq!(result.errors[0].path, "/1");
    }

    #[test]
    fn additional_properties_schema_form() {
        let schema = json!({
            "type": "object",
            "properties": {"known": {"type": "string"}},
            "additionalProperties": {"type": "integer"},
        });
        assert!(validate(&json!({"known": "x", "extra": 3}), &schema).valid);
        assert!(!validate(&json!({"known": "x", "extra": "nope"}), &schema).valid);
    }

    #[test]
    fn enum_membership() {
        let schema = json!({"enum": ["red", "green", 3]});
        assert!(validate(&json!("red"), &schema).valid);
        assert!(validate(&json!(3), &schema).valid);
        assert!(!validate(&json!("blue"), &schema).valid);
    }

    #[test]
    fn combinators() {
        let any_of = json!({"anyOf": [{"type": "string"}, {"type": "integer"}]});
        assert!(validate(&json!("x"), &any_of).valid);
        assert!(validate(&json!(1), &any_of).valid);
        assert!(!validate(&json!(1.5), &any_of).valid);

        let one_of = json!({"oneOf": [{"type": "number"}, {"type": "integer"}]});
        // An integer matches both arms, so oneOf fails.
        assert!(!validate(&json!(1), &one_of).valid);
        assert!(validate(&json!(1.5), &one_of).valid);

        let all_of = json!({"allOf": [{"type": "string"}, {"minLength": 2}]});
        assert!(validate(&json!("ab"), &all_of).valid);
        assert!(!validate(&json!("a"), &all_of).valid);

        let not = json!({"not": {"type": "string"}});
        assert!(validate(&json!(1), &not).valid);
        assert!(!validate(&json!("x"), &not).valid);
    }

    #[test]
    fn conditional_schema() {
        let schema = json!({
            "if": {"properties": {"kind": {"enum": ["file"]}}, "required": ["kind"]},
            "then": {"required": ["path"]},
            "else": {"required": ["url"]},
        });
        assert!(validate(&json!({"kind": "file", "path": "/x"}), &schema).valid);
        assert!(!validate(&json!({"kind": "file"}), &schema).valid);
        assert!(validate(&json!({"kind": "http", "url": "u"}), &schema).valid);
        assert!(!validate(&json!({"kind": "http"}), &schema).valid);
    }

    #[test]
    fn boolean_schemas() {
        assert!(validate(&json!({"anything": true}), &json!(true)).valid);
        assert!(!validate(&json!(1), &json!(false)).valid);
    }

    #[test]
    fn error_data_shape() {
        let result = validate(&json!({"a": "x", "b": 2}), &add_schema());
        let data = result.to_error_data();
        assert_eq!(data[0]["rule"], "type");
        assert_eq!(data[0]["path"], "/a");
    }

    #[test]
    fn cache_hits_return_identical_results() {
        let cache = SchemaCache::new();
        let schema = add_schema();
        let data = json!({"a": 1, "b": 2});

        let first = cache.validate(&data, &schema);
        assert_eq!(cache.len(), 1);
        let second = cache.validate(&data, &schema);
        assert_eq!(cache.len(), 1);
        assert_eq!(first, second);
    }

    #[test]
    fn cache_is_key_order_insensitive() {
        let cache = SchemaCache::new();
        let schema = add_schema();
        cache.validate(&serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap(), &schema);
        cache.validate(&serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap(), &schema);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_evicts_wholesale_at_capacity() {
        let cache = SchemaCache::with_capacity(3);
        let schema = json!({"type": "integer"});
        for i in 0..3 {
            cache.validate(&json!(i), &schema);
        }
        assert_eq!(cache.len(), 3);
        cache.validate(&json!(99), &schema);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn disabled_cache_matches_enabled_results() {
        let enabled = SchemaCache::new();
        let disabled = SchemaCache::disabled();
        let schema = add_schema();
        for data in [json!({"a": 1, "b": 2}), json!({"a": "x"}), json!([])] {
            assert_eq!(enabled.validate(&data, &schema), disabled.validate(&data, &schema));
        }
        assert!(disabled.is_empty());
    }
}
