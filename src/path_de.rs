use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::LoadError;

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, LoadError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| syntax(None, err))
}

/// Same, for an already-parsed value. `prefix` names where `value` sits in
/// the enclosing document.
pub fn from_value_with_path<T: DeserializeOwned>(value: &Value, prefix: &str) -> Result<T, LoadError> {
    serde_path_to_error::deserialize::<_, T>(value).map_err(|err| syntax(Some(prefix), err))
}

fn syntax<E: std::fmt::Display>(prefix: Option<&str>, err: serde_path_to_error::Error<E>) -> LoadError {
    let inner = err.path().to_string();
    let path = match prefix {
        None => inner,
        Some(prefix) if inner == "." => prefix.to_string(),
        Some(prefix) => format!("{prefix}/{}", inner.replace('.', "/")),
    };
    LoadError::Syntax { path, message: err.into_inner().to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Probe {
        outer: Inner,
    }

    #[derive(Debug, Deserialize)]
    #[allow(dead_code)]
    struct Inner {
        count: u32,
    }

    #[test]
    fn errors_name_the_offending_path() {
        let err = from_str_with_path::<Probe>(r#"{"outer": {"count": "x"}}"#).unwrap_err();
        match err {
            LoadError::Syntax { path, .. } => assert_eq!(path, "outer.count"),
            other => panic!("unexpected {other:?}"),
        }

        let value = serde_json::json!({"outer": {"count": -1}});
        let err = from_value_with_path::<Probe>(&value, "User/properties/a").unwrap_err();
        match err {
            LoadError::Syntax { path, .. } => assert_eq!(path, "User/properties/a/outer/count"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
