//! Whole-registry application manifest
//!
//! Builds an `elm.json` that depends directly on every indexed package at its
//! latest version, starting from an application template. Handy for feeding
//! the complete registry to tools that operate on one project.

use serde_json::{Map, Value};

use crate::error::{OperationError, Result};
use crate::registry::PackageSummary;

/// Merge every package into the template's `dependencies.direct`
///
/// Existing direct dependencies are kept unless a package overrides them,
/// `dependencies.indirect` is cleared, and packages without a known version
/// are skipped.
pub fn aggregate(mut template: Value, packages: &[PackageSummary]) -> Result<Value> {
    let dependencies = template
        .get_mut("dependencies")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| OperationError::InvalidManifest {
            detail: "template has no \"dependencies\" object".to_string(),
        })?;

    let mut direct = match dependencies.remove("direct") {
        Some(Value::Object(existing)) => existing,
        Some(_) => {
            return Err(OperationError::InvalidManifest {
                detail: "\"dependencies.direct\" is not an object".to_string(),
            })
        }
        None => Map::new(),
    };

    for package in packages {
        if let Some(version) = &package.version {
            direct.insert(package.name.clone(), Value::String(version.clone()));
        }
    }

    dependencies.insert("direct".to_string(), Value::Object(direct));
    dependencies.insert("indirect".to_string(), Value::Object(Map::new()));

    Ok(template)
}

/// Pretty-print with the four-space indentation the Elm tooling writes
pub fn to_elm_json(value: &Value) -> Result<String> {
    use serde::Serialize;

    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|source| OperationError::Parse {
            what: "aggregated manifest".to_string(),
            source,
        })?;

    // serde_json only ever emits UTF-8
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
