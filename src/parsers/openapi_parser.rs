use super::model::{
    ApiKeyLocation, Dialect, Document, FlowKind, HttpMethod, OAuthFlow, Operation, Parameter,
    ParameterLocation, RequestBody, Response, ResponseKey, SchemaNode, SecurityScheme,
    SecuritySchemeKind,
};
use super::schema::{convert_ref, reference_name};
use super::{preferred_media_type, synthesize_operation_id};
use crate::error::Result;
use crate::issues::{Issue, IssueLog};
use indexmap::IndexMap;
use openapiv3::{
    Components, MediaType, OpenAPI, ParameterSchemaOrContent, PathItem, ReferenceOr, StatusCode,
};
use serde_json::Value;

/// Bound on `$ref` chains through `components`.
const MAX_REF_DEPTH: usize = 8;

pub fn normalize(openapi: &OpenAPI, issues: &mut IssueLog) -> Result<Document> {
    let components = openapi.components.as_ref();

    let mut schemas = IndexMap::new();
    if let Some(components) = components {
        for (name, schema_ref) in &components.schemas {
            schemas.insert(name.clone(), convert_ref(schema_ref));
        }
    }

    let mut operations = Vec::new();
    for (path, path_item_ref) in &openapi.paths.paths {
        match path_item_ref {
            ReferenceOr::Item(path_item) => {
                extract_operations_from_path(path, path_item, components, &mut operations, issues)
            }
            ReferenceOr::Reference { reference } => issues.push(
                Issue::warning(format!("path item reference '{reference}' is not followed"))
                    .at(path.clone()),
            ),
        }
    }

    Ok(Document {
        dialect: Dialect::OpenApi3,
        title: openapi.info.title.clone(),
        version: openapi.info.version.clone(),
        description: openapi.info.description.clone(),
        base_url: openapi.servers.first().map(|s| s.url.clone()),
        operations,
        schemas,
        security_schemes: extract_security_schemes(components, issues),
        security: openapi.security.clone().unwrap_or_default(),
    })
}

fn extract_operations_from_path(
    path: &str,
    path_item: &PathItem,
    components: Option<&Components>,
    operations: &mut Vec<Operation>,
    issues: &mut IssueLog,
) {
    let ops = [
        (&path_item.get, HttpMethod::Get),
        (&path_item.post, HttpMethod::Post),
        (&path_item.put, HttpMethod::Put),
        (&path_item.delete, HttpMethod::Delete),
        (&path_item.patch, HttpMethod::Patch),
        (&path_item.head, HttpMethod::Head),
        (&path_item.options, HttpMethod::Options),
        (&path_item.trace, HttpMethod::Trace),
    ];

    let shared_params: Vec<Parameter> = path_item
        .parameters
        .iter()
        .filter_map(|p| resolve_parameter(p, components, path, issues))
        .collect();

    for (op_option, method) in ops {
        if let Some(operation) = op_option {
            operations.push(extract_operation(
                path,
                method,
                operation,
                &shared_params,
                components,
                issues,
            ));
        }
    }
}

fn extract_operation(
    path: &str,
    method: HttpMethod,
    operation: &openapiv3::Operation,
    shared_params: &[Parameter],
    components: Option<&Components>,
    issues: &mut IssueLog,
) -> Operation {
    let location = format!("{method} {path}");

    let (id, synthesized_id) = match &operation.operation_id {
        Some(id) if !id.trim().is_empty() => (id.clone(), false),
        _ => {
            let id = synthesize_operation_id(method, path);
            issues.push(
                Issue::info(format!("missing operationId, synthesized '{id}'")).at(location.clone()),
            );
            (id, true)
        }
    };

    let mut parameters = shared_params.to_vec();
    for param_ref in &operation.parameters {
        if let Some(param) = resolve_parameter(param_ref, components, &location, issues) {
            // operation-level parameters override path-level ones
            parameters.retain(|p| !(p.name == param.name && p.location == param.location));
            parameters.push(param);
        }
    }

    let request_body = operation
        .request_body
        .as_ref()
        .and_then(|body| resolve_request_body(body, components, &location, issues));

    let mut responses = IndexMap::new();
    if let Some(default) = &operation.responses.default {
        if let Some(response) = resolve_response(default, components, &location, issues) {
            responses.insert(ResponseKey::Default, response);
        }
    }
    for (status, response_ref) in &operation.responses.responses {
        let key = match status {
            StatusCode::Code(code) => ResponseKey::Status(*code),
            StatusCode::Range(class) => ResponseKey::Range(*class),
        };
        if let Some(response) = resolve_response(response_ref, components, &location, issues) {
            responses.insert(key, response);
        }
    }
    responses.sort_keys();

    if operation.deprecated {
        issues.push(Issue::info("operation is deprecated").at(location.clone()));
    }

    Operation {
        id,
        synthesized_id,
        method,
        path: path.to_string(),
        parameters,
        request_body,
        responses,
        security: operation.security.clone(),
        deprecated: operation.deprecated,
        summary: operation.summary.clone(),
        description: operation.description.clone(),
        tags: operation.tags.clone(),
    }
}

fn resolve_parameter(
    param_ref: &ReferenceOr<openapiv3::Parameter>,
    components: Option<&Components>,
    location: &str,
    issues: &mut IssueLog,
) -> Option<Parameter> {
    let mut current = param_ref;
    for _ in 0..MAX_REF_DEPTH {
        match current {
            ReferenceOr::Item(param) => return Some(convert_parameter(param, location, issues)),
            ReferenceOr::Reference { reference } => {
                let name = reference_name(reference);
                match components.and_then(|c| c.parameters.get(name)) {
                    Some(next) => current = next,
                    None => {
                        issues.push(
                            Issue::warning(format!("unresolved parameter reference '{reference}'"))
                                .at(location.to_string()),
                        );
                        return None;
                    }
                }
            }
        }
    }
    issues.push(Issue::warning("parameter reference chain too deep").at(location.to_string()));
    None
}

fn convert_parameter(
    param: &openapiv3::Parameter,
    location: &str,
    issues: &mut IssueLog,
) -> Parameter {
    let data = param.parameter_data_ref();
    let param_location = match param {
        openapiv3::Parameter::Query { .. } => ParameterLocation::Query,
        openapiv3::Parameter::Header { .. } => ParameterLocation::Header,
        openapiv3::Parameter::Path { .. } => ParameterLocation::Path,
        openapiv3::Parameter::Cookie { .. } => ParameterLocation::Cookie,
    };

    let schema = match &data.format {
        ParameterSchemaOrContent::Schema(schema_ref) => convert_ref(schema_ref),
        ParameterSchemaOrContent::Content(content) => media_schema(content).unwrap_or_else(SchemaNode::any),
    };

    let mut required = data.required;
    if param_location == ParameterLocation::Path && !required {
        issues.push(
            Issue::warning(format!("path parameter '{}' marked optional, treating as required", data.name))
                .at(location.to_string()),
        );
        required = true;
    }

    Parameter {
        name: data.name.clone(),
        location: param_location,
        required,
        schema,
        description: data.description.clone(),
    }
}

fn media_schema(content: &IndexMap<String, MediaType>) -> Option<SchemaNode> {
    let media_type = preferred_media_type(content.keys())?;
    content
        .get(media_type)
        .and_then(|m| m.schema.as_ref())
        .map(convert_ref)
}

fn resolve_request_body(
    body_ref: &ReferenceOr<openapiv3::RequestBody>,
    components: Option<&Components>,
    location: &str,
    issues: &mut IssueLog,
) -> Option<RequestBody> {
    let mut current = body_ref;
    for _ in 0..MAX_REF_DEPTH {
        match current {
            ReferenceOr::Item(body) => {
                let content_type = preferred_media_type(body.content.keys())?.to_string();
                let schema = media_schema(&body.content).unwrap_or_else(SchemaNode::any);
                return Some(RequestBody {
                    required: body.required,
                    content_type,
                    schema,
                    description: body.description.clone(),
                });
            }
            ReferenceOr::Reference { reference } => {
                let name = reference_name(reference);
                match components.and_then(|c| c.request_bodies.get(name)) {
                    Some(next) => current = next,
                    None => {
                        issues.push(
                            Issue::warning(format!("unresolved request body reference '{reference}'"))
                                .at(location.to_string()),
                        );
                        return None;
                    }
                }
            }
        }
    }
    None
}

fn resolve_response(
    response_ref: &ReferenceOr<openapiv3::Response>,
    components: Option<&Components>,
    location: &str,
    issues: &mut IssueLog,
) -> Option<Response> {
    let mut current = response_ref;
    for _ in 0..MAX_REF_DEPTH {
        match current {
            ReferenceOr::Item(response) => {
                return Some(Response {
                    description: response.description.clone(),
                    content_type: preferred_media_type(response.content.keys()).map(str::to_string),
                    schema: media_schema(&response.content),
                });
            }
            ReferenceOr::Reference { reference } => {
                let name = reference_name(reference);
                match components.and_then(|c| c.responses.get(name)) {
                    Some(next) => current = next,
                    None => {
                        issues.push(
                            Issue::warning(format!("unresolved response reference '{reference}'"))
                                .at(location.to_string()),
                        );
                        return None;
                    }
                }
            }
        }
    }
    None
}

fn extract_security_schemes(
    components: Option<&Components>,
    issues: &mut IssueLog,
) -> IndexMap<String, SecurityScheme> {
    let mut schemes = IndexMap::new();
    let Some(components) = components else {
        return schemes;
    };

    for (name, scheme_ref) in &components.security_schemes {
        let location = format!("#/components/securitySchemes/{name}");
        let ReferenceOr::Item(scheme) = scheme_ref else {
            issues.push(Issue::warning("security scheme references are not followed").at(location));
            continue;
        };
        // Read the scheme through its wire form so flow shapes stay uniform
        match serde_json::to_value(scheme) {
            Ok(value) => {
                if let Some(scheme) = scheme_from_value(&value, &location, issues) {
                    schemes.insert(name.clone(), scheme);
                }
            }
            Err(e) => issues.push(Issue::warning(format!("unreadable security scheme: {e}")).at(location)),
        }
    }
    schemes
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

fn scopes_field(value: &Value) -> IndexMap<String, String> {
    value
        .get("scopes")
        .and_then(Value::as_object)
        .map(|scopes| {
            scopes
                .iter()
                .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn scheme_from_value(
    value: &Value,
    location: &str,
    issues: &mut IssueLog,
) -> Option<SecurityScheme> {
    let description = str_field(value, "description");
    let kind = match value.get("type").and_then(Value::as_str) {
        Some("apiKey") => {
            let api_location = match value.get("in").and_then(Value::as_str) {
                Some("query") => ApiKeyLocation::Query,
                Some("cookie") => ApiKeyLocation::Cookie,
                Some("header") => ApiKeyLocation::Header,
                _ => {
                    issues.push(
                        Issue::warning("apiKey scheme without a location, defaulting to header")
                            .at(location.to_string()),
                    );
                    ApiKeyLocation::Header
                }
            };
            SecuritySchemeKind::ApiKey {
                name: str_field(value, "name").unwrap_or_else(|| "X-API-Key".to_string()),
                location: api_location,
            }
        }
        Some("http") => {
            let scheme = str_field(value, "scheme").unwrap_or_default().to_lowercase();
            match scheme.as_str() {
                "basic" => SecuritySchemeKind::HttpBasic,
                "bearer" => SecuritySchemeKind::HttpBearer {
                    bearer_format: str_field(value, "bearerFormat"),
                },
                other => {
                    issues.push(
                        Issue::warning(format!(
                            "http scheme '{other}' has no dedicated helper, treating as bearer"
                        ))
                        .at(location.to_string()),
                    );
                    SecuritySchemeKind::HttpBearer {
                        bearer_format: str_field(value, "bearerFormat"),
                    }
                }
            }
        }
        Some("oauth2") => {
            let flows_value = value.get("flows").cloned().unwrap_or(Value::Null);
            let mut flows = Vec::new();
            for (key, kind) in [
                ("authorizationCode", FlowKind::AuthorizationCode),
                ("clientCredentials", FlowKind::ClientCredentials),
                ("password", FlowKind::Password),
                ("implicit", FlowKind::Implicit),
            ] {
                if let Some(flow) = flows_value.get(key).filter(|f| f.is_object()) {
                    flows.push(OAuthFlow {
                        kind,
                        authorization_url: str_field(flow, "authorizationUrl"),
                        token_url: str_field(flow, "tokenUrl"),
                        refresh_url: str_field(flow, "refreshUrl"),
                        scopes: scopes_field(flow),
                    });
                }
            }
            if flows.is_empty() {
                issues.push(
                    Issue::warning("oauth2 scheme declares no flows, assuming clientCredentials")
                        .at(location.to_string()),
                );
                flows.push(OAuthFlow {
                    kind: FlowKind::ClientCredentials,
                    authorization_url: None,
                    token_url: None,
                    refresh_url: None,
                    scopes: IndexMap::new(),
                });
            }
            SecuritySchemeKind::OAuth2 { flows }
        }
        Some("openIdConnect") => SecuritySchemeKind::OpenIdConnect {
            url: str_field(value, "openIdConnectUrl")
                .or_else(|| str_field(value, "openIDConnectUrl"))
                .unwrap_or_default(),
        },
        other => {
            issues.push(
                Issue::warning(format!("unsupported security scheme type {other:?}"))
                    .at(location.to_string()),
            );
            return None;
        }
    };

    Some(SecurityScheme { kind, description })
}
