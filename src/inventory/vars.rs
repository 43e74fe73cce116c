//! Variable containers and the merge primitive.
//!
//! Variables are stored as `serde_json` values: string keys and a closed set
//! of shapes (null, bool, number, string, list, mapping). YAML input is
//! converted and validated here, before it reaches the merge engine.

use super::error::{InventoryError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Ordered variable mapping.
pub type VarMap = Map<String, Value>;

/// How same-key mappings combine across overlays (`hash_behaviour`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashBehaviour {
    /// Later value replaces the earlier one wholesale.
    #[default]
    Replace,
    /// Nested mappings are merged recursively; other values are replaced.
    Merge,
}

impl HashBehaviour {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "replace" => Some(Self::Replace),
            "merge" => Some(Self::Merge),
            _ => None,
        }
    }
}

/// Apply `overlay` on top of `target`.
pub fn combine_into(target: &mut VarMap, overlay: &VarMap, behaviour: HashBehaviour) {
    for (key, value) in overlay {
        match (behaviour, target.get_mut(key), value) {
            (HashBehaviour::Merge, Some(Value::Object(existing)), Value::Object(incoming)) => {
                combine_into(existing, incoming, behaviour);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Convert a YAML value, rejecting shapes outside the permitted set.
pub fn from_yaml(value: serde_yaml::Value, origin: &str) -> Result<Value> {
    use serde_yaml::Value as Y;
    Ok(match value {
        Y::Null => Value::Null,
        Y::Bool(b) => Value::Bool(b),
        Y::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                let f = n.as_f64().unwrap_or(f64::NAN);
                Number::from_f64(f)
                    .map(Value::Number)
                    .ok_or_else(|| invalid(origin, format!("non-finite number {}", f)))?
            }
        }
        Y::String(s) => Value::String(s),
        Y::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(|v| from_yaml(v, origin))
                .collect::<Result<_>>()?,
        ),
        Y::Mapping(mapping) => {
            let mut map = VarMap::new();
            for (k, v) in mapping {
                map.insert(yaml_key(k, origin)?, from_yaml(v, origin)?);
            }
            Value::Object(map)
        }
        Y::Tagged(tagged) => {
            if tagged.tag == "!unsafe" {
                from_yaml(tagged.value, origin)?
            } else if tagged.tag == "!vault" {
                // Kept as the ciphertext; nothing here holds the vault password.
                match tagged.value {
                    Y::String(ciphertext) => Value::String(ciphertext),
                    other => {
                        return Err(invalid(
                            origin,
                            format!("!vault value must be a string, found {:?}", other),
                        ));
                    }
                }
            } else {
                return Err(invalid(
                    origin,
                    format!("unsupported YAML tag {}", tagged.tag),
                ));
            }
        }
    })
}

/// Convert a YAML document that must be a mapping (or empty) into variables.
pub fn mapping_from_yaml(value: serde_yaml::Value, origin: &str) -> Result<VarMap> {
    match from_yaml(value, origin)? {
        Value::Null => Ok(VarMap::new()),
        Value::Object(map) => Ok(map),
        other => Err(invalid(
            origin,
            format!("expected a mapping of variables, found {}", shape(&other)),
        )),
    }
}

/// Parse a variables file body (YAML or JSON).
pub fn parse_vars_document(text: &str, origin: &str) -> Result<VarMap> {
    let doc: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| {
        InventoryError::parse(
            origin,
            e.location().map(|l| l.line()),
            e.to_string(),
        )
    })?;
    mapping_from_yaml(doc, origin)
}

fn yaml_key(key: serde_yaml::Value, origin: &str) -> Result<String> {
    use serde_yaml::Value as Y;
    match key {
        Y::String(s) => Ok(s),
        Y::Bool(b) => Ok(b.to_string()),
        Y::Number(n) => Ok(n.to_string()),
        Y::Null => Ok("null".to_string()),
        other => Err(invalid(
            origin,
            format!("mapping keys must be scalars, found {:?}", other),
        )),
    }
}

fn invalid(origin: &str, message: String) -> InventoryError {
    InventoryError::InvalidValue {
        path: origin.to_string(),
        message,
    }
}

fn shape(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

/// Interpret an INI value the way the inventory format does: integers,
/// floats, `True`/`False`/`None`, quoted strings, JSON-style lists and
/// mappings; anything else stays a string. Only the capitalised spellings
/// are booleans, so `a=true` keeps the string `"true"`.
pub fn parse_literal(raw: &str) -> Value {
    let raw = raw.trim();
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    if raw.contains(['.', 'e', 'E'])
        && let Ok(f) = raw.parse::<f64>()
        && let Some(n) = Number::from_f64(f)
    {
        return Value::Number(n);
    }
    match raw {
        "True" => return Value::Bool(true),
        "False" => return Value::Bool(false),
        "None" => return Value::Null,
        _ => {}
    }
    if raw.len() >= 2 {
        let bytes = raw.as_bytes();
        let (first, last) = (bytes[0], bytes[raw.len() - 1]);
        if (first == b'"' || first == b'\'') && first == last {
            return Value::String(raw[1..raw.len() - 1].to_string());
        }
    }
    if (raw.starts_with('[') || raw.starts_with('{'))
        && let Ok(v) = serde_json::from_str::<Value>(raw)
    {
        return v;
    }
    Value::String(raw.to_string())
}

/// Split a host line into shell-style words. Quotes group words and are
/// removed; an unquoted `#` starts a comment.
pub fn split_words(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some('"') if c == '\\' => match chars.next() {
                Some(next) => current.push(next),
                None => return Err("trailing backslash".to_string()),
            },
            Some(_) => current.push(c),
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    in_word = true;
                }
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                        in_word = true;
                    }
                }
                '#' if !in_word => break,
                c if c.is_whitespace() => {
                    if in_word {
                        words.push(std::mem::take(&mut current));
                        in_word = false;
                    }
                }
                c => {
                    current.push(c);
                    in_word = true;
                }
            },
        }
    }
    if let Some(q) = quote {
        return Err(format!("unterminated {} quote", q));
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

/// Render a value for human-readable output: strings bare, everything else
/// as compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn literals_follow_inventory_rules() {
        assert_eq!(parse_literal("22"), json!(22));
        assert_eq!(parse_literal("1.5"), json!(1.5));
        assert_eq!(parse_literal("True"), json!(true));
        assert_eq!(parse_literal("False"), json!(false));
        assert_eq!(parse_literal("None"), json!(null));
        assert_eq!(parse_literal("true"), json!("true"));
        assert_eq!(parse_literal("FALSE"), json!("FALSE"));
        assert_eq!(parse_literal("yes"), json!("yes"));
        assert_eq!(parse_literal("'quoted value'"), json!("quoted value"));
        assert_eq!(parse_literal("frontend"), json!("frontend"));
        assert_eq!(parse_literal("[1, 2]"), json!([1, 2]));
        assert_eq!(parse_literal("10.0.0.1"), json!("10.0.0.1"));
    }

    #[test]
    fn split_words_handles_quotes_and_comments() {
        let words = split_words(r#"web1 ansible_host=10.0.0.1 motd="hello world" # trailing"#).unwrap();
        assert_eq!(words, vec!["web1", "ansible_host=10.0.0.1", "motd=hello world"]);
        assert!(split_words("host x='open").is_err());
    }

    #[test]
    fn replace_overwrites_nested_mappings() {
        let mut base = json!({"app": {"port": 80, "name": "web"}}).as_object().unwrap().clone();
        let overlay = json!({"app": {"port": 8080}}).as_object().unwrap().clone();
        combine_into(&mut base, &overlay, HashBehaviour::Replace);
        assert_eq!(Value::Object(base), json!({"app": {"port": 8080}}));
    }

    #[test]
    fn merge_combines_nested_mappings() {
        let mut base = json!({"app": {"port": 80, "name": "web"}, "tags": [1]})
            .as_object()
            .unwrap()
            .clone();
        let overlay = json!({"app": {"port": 8080}, "tags": [2]}).as_object().unwrap().clone();
        combine_into(&mut base, &overlay, HashBehaviour::Merge);
        assert_eq!(
            Value::Object(base),
            json!({"app": {"port": 8080, "name": "web"}, "tags": [2]})
        );
    }

    #[test]
    fn yaml_keys_are_stringified_and_unknown_tags_rejected() {
        let doc: serde_yaml::Value = serde_yaml::from_str("1: one\ntrue: yes\n").unwrap();
        let vars = mapping_from_yaml(doc, "vars.yml").unwrap();
        assert_eq!(vars.get("1"), Some(&json!("one")));
        assert_eq!(vars.get("true"), Some(&json!("yes")));

        let err = parse_vars_document("odd: !custom value\n", "s.yml").unwrap_err();
        assert_eq!(err.kind(), "parse_error");
    }

    #[test]
    fn vaulted_values_keep_their_ciphertext() {
        let text = "\
db_user: app
db_password: !vault |
  $ANSIBLE_VAULT;1.1;AES256
  62313365396662343061393464336163383764373764613633653634306231386433626436623361
";
        let vars = parse_vars_document(text, "group_vars/db.yml").unwrap();
        assert_eq!(vars.get("db_user"), Some(&json!("app")));
        let secret = vars.get("db_password").and_then(Value::as_str).unwrap();
        assert!(secret.starts_with("$ANSIBLE_VAULT;1.1;AES256\n"), "{}", secret);

        let err = parse_vars_document("bad: !vault [1, 2]\n", "s.yml").unwrap_err();
        assert_eq!(err.kind(), "parse_error");
    }

    #[test]
    fn non_mapping_documents_are_rejected() {
        let err = parse_vars_document("- a\n- b\n", "list.yml").unwrap_err();
        assert!(err.to_string().contains("expected a mapping"));
        assert!(parse_vars_document("", "empty.yml").unwrap().is_empty());
    }
}
