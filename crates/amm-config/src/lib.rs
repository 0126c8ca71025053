//! amm-config
//!
//! Layered YAML configuration for the dealer.
//!
//! Documents are deep-merged in order (later layers override earlier ones),
//! converted to JSON, screened for literal secrets, canonicalised with sorted
//! keys and hashed. The hash identifies exactly which configuration a process
//! ran under; [`DealerConfig`] is the typed view of the same JSON.

mod dealer;

pub use dealer::{
    load_dealer_config, CurveSection, DealerConfig, ExecutionSection, ReconcileSection,
    RiskSection,
};

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;

/// If any leaf string value in the effective config starts with one of
/// these, loading aborts with CONFIG_SECRET_DETECTED. Connection strings and
/// keys belong in the environment, not in YAML.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",
    "sk_live",
    "sk_test",
    "AKIA",
    "-----BEGIN",
    "ghp_",
    "gho_",
    "glpat-",
    "xoxb-",
    "xoxp-",
    "postgres://",
    "postgresql://",
];

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }

    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for raw in yaml_docs {
        let v_yaml: serde_yaml::Value = serde_yaml::from_str(raw).context("invalid yaml")?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        merged = deep_merge(merged, v_json);
    }

    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Object(mut a_map), Value::Object(b_map)) => {
            for (k, b_val) in b_map {
                let a_val = a_map.remove(&k).unwrap_or(Value::Null);
                a_map.insert(k, deep_merge(a_val, b_val));
            }
            Value::Object(a_map)
        }
        (_, b_other) => b_other,
    }
}

/// Compact JSON with object keys sorted at every depth.
fn canonicalize_json(v: &Value) -> Result<String> {
    serde_json::to_string(&sorted(v)).context("canonical json serialize failed")
}

fn sorted(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for k in keys {
                out.insert(k.clone(), sorted(&map[k]));
            }
            Value::Object(out)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    collect_leaf_pointers(v, "", &mut leaves);

    for ptr in leaves {
        if let Some(s) = v.pointer(&ptr).and_then(Value::as_str) {
            if looks_like_secret(s) {
                bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
            }
        }
    }
    Ok(())
}

fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map.iter() {
                let next = format!("{}/{}", prefix, escape_pointer_token(k));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                let next = format!("{}/{}", prefix, i);
                collect_leaf_pointers(vv, &next, out);
            }
        }
        _ => out.push(prefix.to_string()),
    }
}

fn escape_pointer_token(s: &str) -> String {
    s.replace('~', "~0").replace('/', "~1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_layer_overrides_leaf_and_keeps_siblings() {
        let a = serde_json::json!({"curve": {"k": 0.0, "unit_granularity": 1.0}});
        let b = serde_json::json!({"curve": {"k": 1e-7}});
        let m = deep_merge(a, b);
        assert_eq!(m["curve"]["k"], 1e-7);
        assert_eq!(m["curve"]["unit_granularity"], 1.0);
    }

    #[test]
    fn canonical_form_sorts_nested_keys() {
        let v = serde_json::json!({"b": {"z": 1, "a": 2}, "a": [ {"y": 1, "x": 0} ]});
        assert_eq!(
            canonicalize_json(&v).unwrap(),
            r#"{"a":[{"x":0,"y":1}],"b":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn short_strings_never_flagged() {
        assert!(!looks_like_secret("sk-"));
        assert!(looks_like_secret("postgres://amm:pw@localhost/amm"));
    }
}
