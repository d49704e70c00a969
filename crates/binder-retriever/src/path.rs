//! Dotted-path lookup inside a custom resource section
//!
//! `a.b.c` is resolved by splitting at the first dot, looking up the head in
//! the current mapping and recursing with the rest. A path without a dot is
//! looked up as a single key. Recursion depth is bounded by the number of
//! segments in the path.

use serde_json::Value;

/// Why a path could not be resolved
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathError {
    /// The named segment is absent from its mapping
    Missing {
        /// The segment that could not be found
        segment: String,
    },
    /// The value reached before the named segment is not a mapping
    NotAMapping {
        /// The segment that was to be looked up
        segment: String,
    },
}

/// Resolve `path` against `tree`, returning the value found
pub fn resolve<'a>(path: &str, tree: &'a Value) -> Result<&'a Value, PathError> {
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };

    let map = tree.as_object().ok_or_else(|| PathError::NotAMapping {
        segment: head.to_string(),
    })?;
    let value = map.get(head).ok_or_else(|| PathError::Missing {
        segment: head.to_string(),
    })?;

    match rest {
        Some(rest) => resolve(rest, value),
        None => Ok(value),
    }
}

/// Resolve `path` against `tree` and render the value as text
pub fn resolve_string(path: &str, tree: &Value) -> Result<String, PathError> {
    resolve(path, tree).map(render)
}

/// Render a value the way it is stored in the aggregate
///
/// Strings are taken verbatim, null becomes empty, everything else is its
/// compact JSON text.
pub fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> Value {
        json!({
            "host": "db.local",
            "port": 5432,
            "tls": true,
            "credentials": {
                "secretName": "db-creds",
                "nested": { "deep": "value" }
            },
            "replicas": [1, 2],
            "empty": null
        })
    }

    #[test]
    fn single_segment_resolves_leaf() {
        assert_eq!(resolve_string("host", &tree()).unwrap(), "db.local");
    }

    #[test]
    fn nested_segments_follow_each_mapping() {
        let t = tree();
        assert_eq!(
            resolve_string("credentials.secretName", &t).unwrap(),
            "db-creds"
        );
        assert_eq!(
            resolve_string("credentials.nested.deep", &t).unwrap(),
            "value"
        );
    }

    #[test]
    fn scalars_render_as_text() {
        let t = tree();
        assert_eq!(resolve_string("port", &t).unwrap(), "5432");
        assert_eq!(resolve_string("tls", &t).unwrap(), "true");
        assert_eq!(resolve_string("empty", &t).unwrap(), "");
        assert_eq!(resolve_string("replicas", &t).unwrap(), "[1,2]");
    }

    #[test]
    fn missing_leaf_names_the_leaf() {
        assert_eq!(
            resolve("missingField", &tree()),
            Err(PathError::Missing {
                segment: "missingField".to_string()
            })
        );
    }

    #[test]
    fn missing_intermediate_names_first_missing_segment() {
        assert_eq!(
            resolve("database.host", &tree()),
            Err(PathError::Missing {
                segment: "database".to_string()
            })
        );
        assert_eq!(
            resolve("credentials.other.deep", &tree()),
            Err(PathError::Missing {
                segment: "other".to_string()
            })
        );
    }

    #[test]
    fn scalar_intermediate_is_a_type_error() {
        assert_eq!(
            resolve("host.name", &tree()),
            Err(PathError::NotAMapping {
                segment: "name".to_string()
            })
        );
    }

    #[test]
    fn non_mapping_root_is_a_type_error() {
        assert_eq!(
            resolve("host", &json!("scalar")),
            Err(PathError::NotAMapping {
                segment: "host".to_string()
            })
        );
    }
}
