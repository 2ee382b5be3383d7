//! Swagger 2.0 decoding and normalization.
//!
//! Only the parts of the 2.0 object model that feed the normalized
//! [`Document`] are modelled; schema objects reuse the `openapiv3` types.

use super::model::{
    Dialect, Document, HttpMethod, ObjectShape, Operation, Parameter, ParameterLocation, Property,
    RequestBody, Response, ResponseKey, SchemaKind, SchemaNode, SecurityRequirement,
    SecurityScheme,
};
use super::openapi_parser::scheme_from_value;
use super::schema::{convert, convert_ref, reference_name};
use super::synthesize_operation_id;
use crate::error::{GenerateError, Result};
use crate::issues::{Issue, IssueLog};
use indexmap::IndexMap;
use openapiv3::{ReferenceOr, Schema};
use serde::Deserialize;
use serde_json::{json, Map, Value};

const DEFAULT_CONTENT_TYPE: &str = "application/json";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const MULTIPART_CONTENT_TYPE: &str = "multipart/form-data";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwaggerDocument {
    pub swagger: String,
    pub info: SwaggerInfo,
    pub host: Option<String>,
    pub base_path: Option<String>,
    #[serde(default)]
    pub schemes: Vec<String>,
    #[serde(default)]
    pub consumes: Vec<String>,
    #[serde(default)]
    pub produces: Vec<String>,
    pub paths: Option<IndexMap<String, SwaggerPathItem>>,
    #[serde(default)]
    pub definitions: IndexMap<String, ReferenceOr<Schema>>,
    #[serde(default)]
    pub parameters: IndexMap<String, SwaggerParameter>,
    #[serde(default)]
    pub responses: IndexMap<String, SwaggerResponse>,
    #[serde(default)]
    pub security_definitions: IndexMap<String, SwaggerSecurityScheme>,
    #[serde(default)]
    pub security: Vec<SecurityRequirement>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwaggerInfo {
    pub title: String,
    pub version: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SwaggerPathItem {
    pub get: Option<SwaggerOperation>,
    pub put: Option<SwaggerOperation>,
    pub post: Option<SwaggerOperation>,
    pub delete: Option<SwaggerOperation>,
    pub options: Option<SwaggerOperation>,
    pub head: Option<SwaggerOperation>,
    pub patch: Option<SwaggerOperation>,
    #[serde(default)]
    pub parameters: Vec<ReferenceOr<SwaggerParameter>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwaggerOperation {
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub consumes: Vec<String>,
    #[serde(default)]
    pub produces: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<ReferenceOr<SwaggerParameter>>,
    #[serde(default)]
    pub responses: IndexMap<String, ReferenceOr<SwaggerResponse>>,
    #[serde(default)]
    pub deprecated: bool,
    pub security: Option<Vec<SecurityRequirement>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwaggerParameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: String,
    #[serde(default)]
    pub required: bool,
    pub description: Option<String>,
    /// Only for `in: body`
    pub schema: Option<ReferenceOr<Schema>>,
    #[serde(rename = "type")]
    pub param_type: Option<String>,
    pub format: Option<String>,
    pub items: Option<Value>,
    #[serde(rename = "enum")]
    pub enumeration: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SwaggerResponse {
    #[serde(default)]
    pub description: String,
    pub schema: Option<ReferenceOr<Schema>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwaggerSecurityScheme {
    #[serde(rename = "type")]
    pub scheme_type: String,
    pub description: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "in")]
    pub location: Option<String>,
    pub flow: Option<String>,
    pub authorization_url: Option<String>,
    pub token_url: Option<String>,
    #[serde(default)]
    pub scopes: IndexMap<String, String>,
}

pub fn normalize(swagger: &SwaggerDocument, issues: &mut IssueLog) -> Result<Document> {
    let paths = swagger.paths.as_ref().ok_or(GenerateError::MissingPaths)?;

    let schemas = swagger
        .definitions
        .iter()
        .map(|(name, schema)| (name.clone(), convert_ref(schema)))
        .collect();

    let mut operations = Vec::new();
    for (path, item) in paths {
        let shared: Vec<SwaggerParameter> = item
            .parameters
            .iter()
            .filter_map(|p| resolve_parameter(swagger, p, path, issues))
            .collect();

        let methods = [
            (&item.get, HttpMethod::Get),
            (&item.post, HttpMethod::Post),
            (&item.put, HttpMethod::Put),
            (&item.delete, HttpMethod::Delete),
            (&item.patch, HttpMethod::Patch),
            (&item.head, HttpMethod::Head),
            (&item.options, HttpMethod::Options),
        ];
        for (op, method) in methods {
            if let Some(op) = op {
                operations.push(convert_operation(swagger, path, method, op, &shared, issues));
            }
        }
    }

    let mut security_schemes = IndexMap::new();
    for (name, definition) in &swagger.security_definitions {
        let location = format!("#/securityDefinitions/{name}");
        if let Some(scheme) = convert_security_scheme(definition, &location, issues) {
            security_schemes.insert(name.clone(), scheme);
        }
    }

    Ok(Document {
        dialect: Dialect::Swagger2,
        title: swagger.info.title.clone(),
        version: swagger.info.version.clone(),
        description: swagger.info.description.clone(),
        base_url: base_url(swagger),
        operations,
        schemas,
        security_schemes,
        security: swagger.security.clone(),
    })
}

fn base_url(swagger: &SwaggerDocument) -> Option<String> {
    let host = swagger.host.as_ref()?;
    let scheme = swagger.schemes.first().map(String::as_str).unwrap_or("https");
    let base_path = swagger.base_path.as_deref().unwrap_or("");
    Some(format!("{scheme}://{host}{base_path}"))
}

fn resolve_parameter(
    swagger: &SwaggerDocument,
    param: &ReferenceOr<SwaggerParameter>,
    location: &str,
    issues: &mut IssueLog,
) -> Option<SwaggerParameter> {
    match param {
        ReferenceOr::Item(param) => Some(param.clone()),
        ReferenceOr::Reference { reference } => {
            let resolved = swagger.parameters.get(reference_name(reference)).cloned();
            if resolved.is_none() {
                issues.push(
                    Issue::warning(format!("unresolved parameter reference '{reference}'"))
                        .at(location.to_string()),
                );
            }
            resolved
        }
    }
}

fn convert_operation(
    swagger: &SwaggerDocument,
    path: &str,
    method: HttpMethod,
    op: &SwaggerOperation,
    shared: &[SwaggerParameter],
    issues: &mut IssueLog,
) -> Operation {
    let location = format!("{method} {path}");

    let (id, synthesized_id) = match &op.operation_id {
        Some(id) if !id.trim().is_empty() => (id.clone(), false),
        _ => {
            let id = synthesize_operation_id(method, path);
            issues.push(
                Issue::info(format!("missing operationId, synthesized '{id}'")).at(location.clone()),
            );
            (id, true)
        }
    };

    let mut raw_params: Vec<SwaggerParameter> = shared.to_vec();
    for param in &op.parameters {
        if let Some(param) = resolve_parameter(swagger, param, &location, issues) {
            raw_params.retain(|p| !(p.name == param.name && p.location == param.location));
            raw_params.push(param);
        }
    }

    let consumes = if op.consumes.is_empty() {
        &swagger.consumes
    } else {
        &op.consumes
    };

    let mut parameters = Vec::new();
    let mut body: Option<RequestBody> = None;
    let mut form = ObjectShape::default();
    let mut form_required = false;

    for param in &raw_params {
        match param.location.as_str() {
            "body" => {
                let schema = param
                    .schema
                    .as_ref()
                    .map(convert_ref)
                    .unwrap_or_else(SchemaNode::any);
                let content_type = super::preferred_media_type(consumes)
                    .unwrap_or(DEFAULT_CONTENT_TYPE)
                    .to_string();
                body = Some(RequestBody {
                    required: param.required,
                    content_type,
                    schema,
                    description: param.description.clone(),
                });
            }
            "formData" => {
                form_required |= param.required;
                form.properties.push(Property {
                    name: param.name.clone(),
                    required: param.required,
                    schema: simple_schema(param, &location, issues),
                });
            }
            other => {
                let param_location = match other {
                    "query" => ParameterLocation::Query,
                    "path" => ParameterLocation::Path,
                    "header" => ParameterLocation::Header,
                    _ => {
                        issues.push(
                            Issue::warning(format!(
                                "parameter '{}' has unknown location '{other}', skipped",
                                param.name
                            ))
                            .at(location.clone()),
                        );
                        continue;
                    }
                };
                let mut required = param.required;
                if param_location == ParameterLocation::Path && !required {
                    issues.push(
                        Issue::warning(format!(
                            "path parameter '{}' marked optional, treating as required",
                            param.name
                        ))
                        .at(location.clone()),
                    );
                    required = true;
                }
                parameters.push(Parameter {
                    name: param.name.clone(),
                    location: param_location,
                    required,
                    schema: simple_schema(param, &location, issues),
                    description: param.description.clone(),
                });
            }
        }
    }

    if body.is_none() && !form.properties.is_empty() {
        let content_type = if consumes.iter().any(|c| c == MULTIPART_CONTENT_TYPE) {
            MULTIPART_CONTENT_TYPE
        } else {
            FORM_CONTENT_TYPE
        };
        body = Some(RequestBody {
            required: form_required,
            content_type: content_type.to_string(),
            schema: SchemaNode::new(SchemaKind::Object(form)),
            description: None,
        });
    }

    let produces = if op.produces.is_empty() {
        &swagger.produces
    } else {
        &op.produces
    };

    let mut responses = IndexMap::new();
    for (status, response) in &op.responses {
        let Some(key) = ResponseKey::parse(status) else {
            issues.push(
                Issue::warning(format!("unrecognised response status '{status}'")).at(location.clone()),
            );
            continue;
        };
        let response = match response {
            ReferenceOr::Item(response) => response.clone(),
            ReferenceOr::Reference { reference } => {
                match swagger.responses.get(reference_name(reference)) {
                    Some(response) => response.clone(),
                    None => {
                        issues.push(
                            Issue::warning(format!("unresolved response reference '{reference}'"))
                                .at(location.clone()),
                        );
                        continue;
                    }
                }
            }
        };
        let schema = response.schema.as_ref().map(convert_ref);
        let content_type = schema.as_ref().map(|_| {
            super::preferred_media_type(produces)
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string()
        });
        responses.insert(
            key,
            Response {
                description: response.description,
                content_type,
                schema,
            },
        );
    }
    responses.sort_keys();

    if op.deprecated {
        issues.push(Issue::info("operation is deprecated").at(location.clone()));
    }

    Operation {
        id,
        synthesized_id,
        method,
        path: path.to_string(),
        parameters,
        request_body: body,
        responses,
        security: op.security.clone(),
        deprecated: op.deprecated,
        summary: op.summary.clone(),
        description: op.description.clone(),
        tags: op.tags.clone(),
    }
}

/// Non-body parameters carry their type inline; rebuild it as a schema object.
fn simple_schema(param: &SwaggerParameter, location: &str, issues: &mut IssueLog) -> SchemaNode {
    let mut object = Map::new();
    if let Some(param_type) = &param.param_type {
        object.insert("type".to_string(), json!(param_type));
    }
    if let Some(format) = &param.format {
        object.insert("format".to_string(), json!(format));
    }
    if let Some(items) = &param.items {
        object.insert("items".to_string(), items.clone());
    }
    if let Some(values) = &param.enumeration {
        object.insert("enum".to_string(), json!(values));
    }

    if param.param_type.as_deref() == Some("file") {
        return SchemaNode::new(SchemaKind::String).with_format("binary");
    }

    match serde_json::from_value::<Schema>(Value::Object(object)) {
        Ok(schema) => convert(&schema),
        Err(e) => {
            issues.push(
                Issue::warning(format!("parameter '{}' has unreadable type: {e}", param.name))
                    .at(location.to_string()),
            );
            SchemaNode::any()
        }
    }
}

/// Rewrite a 2.0 security definition into its 3.x shape and read it through
/// the shared scheme decoder.
fn convert_security_scheme(
    definition: &SwaggerSecurityScheme,
    location: &str,
    issues: &mut IssueLog,
) -> Option<SecurityScheme> {
    let mut value = json!({ "type": definition.scheme_type });
    if let Some(description) = &definition.description {
        value["description"] = json!(description);
    }

    match definition.scheme_type.as_str() {
        "basic" => {
            value["type"] = json!("http");
            value["scheme"] = json!("basic");
        }
        "apiKey" => {
            if let Some(name) = &definition.name {
                value["name"] = json!(name);
            }
            if let Some(in_) = &definition.location {
                value["in"] = json!(in_);
            }
        }
        "oauth2" => {
            let flow_key = match definition.flow.as_deref() {
                Some("implicit") => Some("implicit"),
                Some("password") => Some("password"),
                Some("application") => Some("clientCredentials"),
                Some("accessCode") => Some("authorizationCode"),
                _ => None,
            };
            if let Some(flow_key) = flow_key {
                let mut flow = json!({ "scopes": definition.scopes });
                if let Some(url) = &definition.authorization_url {
                    flow["authorizationUrl"] = json!(url);
                }
                if let Some(url) = &definition.token_url {
                    flow["tokenUrl"] = json!(url);
                }
                value["flows"] = json!({});
                value["flows"][flow_key] = flow;
            }
        }
        _ => {}
    }

    scheme_from_value(&value, location, issues)
}
