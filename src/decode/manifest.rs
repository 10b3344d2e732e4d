//! Extraction of the image manifest from decoded script text.
//!
//! The decoded script looks like `SMH.imgData({...}).preInit();`. Only the
//! first balanced JSON object matters; of its fields only the path prefix,
//! the ordered file list and the `sl` access tokens are kept.

use serde_json::{Map, Value};

use super::error::ManifestError;

/// Access tokens appended to every image URL as `?e=..&m=..`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityTokens {
    pub e: String,
    pub m: String,
}

/// Ordered image list of one volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageManifest {
    /// URL path prefix shared by all pages, always starting with `/`.
    pub path: String,
    /// One file name per page, in reading order. Never empty.
    pub files: Vec<String>,
    pub security: SecurityTokens,
}

impl ImageManifest {
    /// Validate a parsed JSON object into a manifest.
    pub fn from_value(value: &Value) -> Result<Self, ManifestError> {
        let object = value
            .as_object()
            .ok_or(ManifestError::InvalidType("manifest"))?;

        let path = match object.get("path") {
            None => return Err(ManifestError::Missing("path")),
            Some(Value::String(path)) => path.clone(),
            Some(_) => return Err(ManifestError::InvalidType("path")),
        };
        if !path.starts_with('/') {
            return Err(ManifestError::InvalidPath(path));
        }

        let files = match object.get("files") {
            None => return Err(ManifestError::Missing("files")),
            Some(Value::Array(files)) => files
                .iter()
                .map(|file| {
                    file.as_str()
                        .map(str::to_owned)
                        .ok_or(ManifestError::InvalidType("files"))
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(ManifestError::InvalidType("files")),
        };
        if files.is_empty() {
            return Err(ManifestError::EmptyFiles);
        }

        let sl = match object.get("sl") {
            None => return Err(ManifestError::Missing("sl")),
            Some(Value::Object(sl)) => sl,
            Some(_) => return Err(ManifestError::InvalidType("sl")),
        };

        Ok(Self {
            path,
            files,
            security: SecurityTokens {
                e: token(sl, "e", "sl.e")?,
                m: token(sl, "m", "sl.m")?,
            },
        })
    }

    pub fn page_count(&self) -> usize {
        self.files.len()
    }
}

/// Tokens are text, but the site ships `e` as an integer. Integers are
/// taken as their decimal text.
fn token(sl: &Map<String, Value>, key: &str, field: &'static str) -> Result<String, ManifestError> {
    match sl.get(key) {
        None => Err(ManifestError::Missing(field)),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(Value::Number(value)) if value.is_u64() || value.is_i64() => Ok(value.to_string()),
        Some(_) => Err(ManifestError::InvalidType(field)),
    }
}

/// Parse the manifest embedded in decoded script text.
///
/// # Errors
///
/// [`ManifestError::NotFound`] when there is no balanced object, otherwise
/// whatever [`ImageManifest::from_value`] rejects.
pub fn parse(decoded: &str) -> Result<ImageManifest, ManifestError> {
    let object = find_object(decoded).ok_or(ManifestError::NotFound)?;

    let value = match serde_json::from_str::<Value>(object) {
        Ok(value) => value,
        // The packer may leave the object's quotes escaped; retry once
        // with them restored.
        Err(err) if object.contains("\\\"") || object.contains("\\'") => {
            serde_json::from_str::<Value>(&unescape_quotes(object)).map_err(|_| err)?
        }
        Err(err) => return Err(err.into()),
    };

    ImageManifest::from_value(&value)
}

/// Locate the first `{` and its matching `}`, skipping string contents and
/// escaped characters.
fn find_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn unescape_quotes(text: &str) -> String {
    text.replace("\\\"", "\"").replace("\\'", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ImageManifest {
        ImageManifest {
            path: "/x/".to_string(),
            files: vec!["1.jpg".to_string(), "2.jpg".to_string()],
            security: SecurityTokens {
                e: "T1".to_string(),
                m: "T2".to_string(),
            },
        }
    }

    #[test]
    fn test_parse_ignores_surrounding_noise() {
        let text = r#"... text ... {"path":"/x/","files":["1.jpg","2.jpg"],"sl":{"e":"T1","m":"T2"}} ... trailing ..."#;
        assert_eq!(parse(text).unwrap(), sample());
    }

    #[test]
    fn test_parse_site_script() {
        let text = r#"SMH.imgData({"bid":1639,"cname":"第01话 {特别篇}","files":["1.jpg","2.jpg"],"finished":false,"len":2,"path":"/x/","sl":{"e":"T1","m":"T2"}}).preInit();"#;
        assert_eq!(parse(text).unwrap(), sample());
    }

    #[test]
    fn test_integer_token() {
        let text = r#"{"path":"/p/","files":["a"],"sl":{"e":1700000000,"m":"k"}}"#;
        assert_eq!(parse(text).unwrap().security.e, "1700000000");
    }

    #[test]
    fn test_escaped_quotes() {
        let text = r#"f({\"path\":\"/x/\",\"files\":[\"1.jpg\",\"2.jpg\"],\"sl\":{\"e\":\"T1\",\"m\":\"T2\"}})"#;
        assert_eq!(parse(text).unwrap(), sample());
    }

    #[test]
    fn test_empty_files_rejected() {
        let text = r#"{"path":"/x/","files":[],"sl":{"e":"T1","m":"T2"}}"#;
        assert!(matches!(parse(text), Err(ManifestError::EmptyFiles)));
    }

    #[test]
    fn test_missing_and_ill_typed_fields() {
        let cases = [
            (r#"{"files":["a"],"sl":{"e":"1","m":"2"}}"#, "path"),
            (r#"{"path":"/x/","sl":{"e":"1","m":"2"}}"#, "files"),
            (r#"{"path":"/x/","files":["a"]}"#, "sl"),
            (r#"{"path":"/x/","files":["a"],"sl":{"m":"2"}}"#, "sl.e"),
            (r#"{"path":"/x/","files":["a"],"sl":{"e":"1"}}"#, "sl.m"),
        ];
        for (text, field) in cases {
            match parse(text) {
                Err(ManifestError::Missing(missing)) => assert_eq!(missing, field),
                other => panic!("expected missing {field}, got {other:?}"),
            }
        }

        let cases = [
            (r#"{"path":1,"files":["a"],"sl":{"e":"1","m":"2"}}"#, "path"),
            (r#"{"path":"/x/","files":"a","sl":{"e":"1","m":"2"}}"#, "files"),
            (r#"{"path":"/x/","files":["a",2],"sl":{"e":"1","m":"2"}}"#, "files"),
            (r#"{"path":"/x/","files":["a"],"sl":{"e":true,"m":"2"}}"#, "sl.e"),
            (r#"{"path":"/x/","files":["a"],"sl":{"e":"1","m":1.5}}"#, "sl.m"),
        ];
        for (text, field) in cases {
            match parse(text) {
                Err(ManifestError::InvalidType(invalid)) => assert_eq!(invalid, field),
                other => panic!("expected invalid {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_relative_path_rejected() {
        let text = r#"{"path":"x/","files":["a"],"sl":{"e":"1","m":"2"}}"#;
        assert!(matches!(parse(text), Err(ManifestError::InvalidPath(_))));
    }

    #[test]
    fn test_no_object() {
        assert!(matches!(parse("preInit();"), Err(ManifestError::NotFound)));
        assert!(matches!(parse(r#"f({"path":"/x/""#), Err(ManifestError::NotFound)));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(parse("{path:'/x/'}"), Err(ManifestError::Syntax(_))));
    }
}
