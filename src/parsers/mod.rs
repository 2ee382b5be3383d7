//! Document normalizer: turns either supported dialect into one [`Document`].

pub mod model;
pub mod openapi_parser;
pub mod schema;
pub mod swagger_parser;

use crate::error::{GenerateError, Result};
use crate::issues::IssueLog;
use crate::naming::to_pascal_case;
use openapiv3::OpenAPI;
use serde_json::Value;

pub use model::*;
pub use swagger_parser::SwaggerDocument;

/// A parsed but not yet normalized API description.
#[derive(Debug, Clone)]
pub enum SourceDocument {
    OpenApi3(Box<OpenAPI>),
    Swagger2(Box<SwaggerDocument>),
}

impl SourceDocument {
    /// Parse YAML or JSON text. `hint` forces a dialect (`openapi3` or
    /// `swagger2`); otherwise the `openapi` / `swagger` version field decides.
    pub fn parse(text: &str, hint: Option<Dialect>) -> Result<Self> {
        // YAML is a superset of JSON, one decoder covers both
        let value: Value = serde_yaml::from_str(text)
            .map_err(|e| GenerateError::UnsupportedDialect(format!("unreadable document: {e}")))?;
        Self::from_value(value, hint)
    }

    pub fn from_value(value: Value, hint: Option<Dialect>) -> Result<Self> {
        let dialect = match hint {
            Some(dialect) => dialect,
            None => detect_dialect(&value)?,
        };

        if value.get("paths").is_none() {
            return Err(GenerateError::MissingPaths);
        }

        match dialect {
            Dialect::OpenApi3 => {
                let spec: OpenAPI = serde_json::from_value(value).map_err(|source| {
                    GenerateError::Decode {
                        dialect: "openapi3",
                        source,
                    }
                })?;
                Ok(SourceDocument::OpenApi3(Box::new(spec)))
            }
            Dialect::Swagger2 => {
                let spec: SwaggerDocument = serde_json::from_value(value).map_err(|source| {
                    GenerateError::Decode {
                        dialect: "swagger2",
                        source,
                    }
                })?;
                Ok(SourceDocument::Swagger2(Box::new(spec)))
            }
        }
    }

    pub fn dialect(&self) -> Dialect {
        match self {
            SourceDocument::OpenApi3(_) => Dialect::OpenApi3,
            SourceDocument::Swagger2(_) => Dialect::Swagger2,
        }
    }
}

fn detect_dialect(value: &Value) -> Result<Dialect> {
    if let Some(version) = value.get("openapi").and_then(Value::as_str) {
        if version.starts_with("3.") {
            return Ok(Dialect::OpenApi3);
        }
        return Err(GenerateError::UnsupportedDialect(format!("openapi {version}")));
    }
    if let Some(version) = value.get("swagger").and_then(Value::as_str) {
        if version.starts_with("2.") {
            return Ok(Dialect::Swagger2);
        }
        return Err(GenerateError::UnsupportedDialect(format!("swagger {version}")));
    }
    Err(GenerateError::UnsupportedDialect(
        "missing 'openapi' or 'swagger' version field".to_string(),
    ))
}

/// Normalize a parsed document. Fails only on structurally unrecoverable
/// input; everything else is recorded in `issues`.
pub fn normalize(source: &SourceDocument, issues: &mut IssueLog) -> Result<Document> {
    let document = match source {
        SourceDocument::OpenApi3(spec) => openapi_parser::normalize(spec, issues)?,
        SourceDocument::Swagger2(spec) => swagger_parser::normalize(spec, issues)?,
    };
    tracing::debug!(
        dialect = document.dialect.label(),
        operations = document.operations.len(),
        schemas = document.schemas.len(),
        schemes = document.security_schemes.len(),
        "normalized document"
    );
    Ok(document)
}

/// Derive an operation identifier from method and path: literal segments are
/// title-cased in order, template parameters are appended as a `By...` suffix.
///
/// `GET /pets/{id}` -> `GetPetsById`
pub fn synthesize_operation_id(method: HttpMethod, path: &str) -> String {
    let mut literal = String::new();
    let mut params = Vec::new();

    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if segment.starts_with('{') && segment.ends_with('}') {
            params.push(to_pascal_case(&segment[1..segment.len() - 1]));
        } else {
            literal.push_str(&to_pascal_case(segment));
        }
    }

    if literal.is_empty() && params.is_empty() {
        literal.push_str("Root");
    }

    let mut id = format!("{}{}", method.title(), literal);
    if !params.is_empty() {
        id.push_str("By");
        id.push_str(&params.join("And"));
    }
    id
}

/// Pick the media type to read a schema from: JSON first, then any `+json`
/// type, then whatever comes first.
pub fn preferred_media_type<'a, I>(types: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a String>,
{
    let types: Vec<&'a str> = types.into_iter().map(String::as_str).collect();
    types
        .iter()
        .find(|t| **t == "application/json")
        .or_else(|| types.iter().find(|t| t.ends_with("+json")))
        .or_else(|| types.first())
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_synthesize_operation_id() {
        assert_eq!(synthesize_operation_id(HttpMethod::Get, "/pets/{id}"), "GetPetsById");
        assert_eq!(synthesize_operation_id(HttpMethod::Get, "/pets"), "GetPets");
        assert_eq!(
            synthesize_operation_id(HttpMethod::Delete, "/owners/{owner_id}/pets/{petId}"),
            "DeleteOwnersPetsByOwnerIdAndPetId"
        );
        assert_eq!(synthesize_operation_id(HttpMethod::Get, "/"), "GetRoot");
        assert_eq!(
            synthesize_operation_id(HttpMethod::Post, "/store/order-items"),
            "PostStoreOrderItems"
        );
    }

    #[test]
    fn test_synthesized_id_is_stable() {
        let first = synthesize_operation_id(HttpMethod::Put, "/users/{name}");
        let second = synthesize_operation_id(HttpMethod::Put, "/users/{name}");
        assert_eq!(first, second);
    }

    #[test]
    fn test_detect_dialects() {
        let oas = json!({ "openapi": "3.0.3", "info": { "title": "t", "version": "1" }, "paths": {} });
        let doc = SourceDocument::from_value(oas, None).unwrap();
        assert_eq!(doc.dialect(), Dialect::OpenApi3);

        let swagger = json!({ "swagger": "2.0", "info": { "title": "t", "version": "1" }, "paths": {} });
        let doc = SourceDocument::from_value(swagger, None).unwrap();
        assert_eq!(doc.dialect(), Dialect::Swagger2);
    }

    #[test]
    fn test_missing_paths_is_fatal() {
        let oas = json!({ "openapi": "3.0.3", "info": { "title": "t", "version": "1" } });
        let err = SourceDocument::from_value(oas, None).unwrap_err();
        assert!(matches!(err, GenerateError::MissingPaths));
    }

    #[test]
    fn test_unknown_dialect_rejected() {
        let err = SourceDocument::from_value(json!({ "paths": {} }), None).unwrap_err();
        assert!(matches!(err, GenerateError::UnsupportedDialect(_)));
    }

    #[test]
    fn test_preferred_media_type() {
        let types = vec!["text/plain".to_string(), "application/problem+json".to_string()];
        assert_eq!(preferred_media_type(&types), Some("application/problem+json"));

        let types = vec!["application/xml".to_string(), "application/json".to_string()];
        assert_eq!(preferred_media_type(&types), Some("application/json"));
    }
}
