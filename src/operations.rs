//! Declarative operation table.
//!
//! Each normalized operation is resolved once into an [`OperationSpec`]: final
//! name, typed parameters, body and responses, effective security. Every
//! synthesizer downstream reads this table instead of the raw document.

use crate::issues::{Issue, IssueLog};
use crate::naming::{to_pascal_case, NameKind, NamingRegistry};
use crate::parsers::{
    Document, HttpMethod, Operation, ParameterLocation, ResponseKey, SecurityRequirement,
};
use crate::types::{Doc, TypeDescriptor, TypeRegistry};
use serde::Serialize;

/// Grouping keys of the operation a declaration belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct OperationRef {
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    /// Name on the wire
    pub name: String,
    /// Member name in the request type
    pub field: String,
    /// Local variable name in handlers
    pub var: String,
    pub location: ParameterLocation,
    pub required: bool,
    /// Declared type after the optionality policy
    pub ty: TypeDescriptor,
    /// Declared type before the optionality policy
    pub base: TypeDescriptor,
    pub doc: Doc,
}

impl ParamSpec {
    /// Must go through a fallible string conversion when read from a URL.
    pub fn needs_parse(&self) -> bool {
        self.base.as_primitive().is_some_and(|p| p.needs_parse())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BodySpec {
    pub content_type: String,
    pub required: bool,
    pub ty: TypeDescriptor,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseSpec {
    pub key: ResponseKey,
    /// `Status200`, `Status2XX` or `Default`
    pub member: String,
    pub ty: Option<TypeDescriptor>,
    pub content_type: Option<String>,
    pub doc: Doc,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationSpec {
    pub name: String,
    pub source_id: String,
    pub method: HttpMethod,
    pub path: String,
    pub params: Vec<ParamSpec>,
    pub body: Option<BodySpec>,
    pub responses: Vec<ResponseSpec>,
    /// Effective requirements: the operation's own, or the document's
    pub security: Vec<SecurityRequirement>,
    pub origin: OperationRef,
    pub doc: Doc,
    pub deprecated: bool,
}

impl OperationSpec {
    pub fn location(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    pub fn params_in(&self, location: ParameterLocation) -> impl Iterator<Item = &ParamSpec> {
        self.params.iter().filter(move |p| p.location == location)
    }

    /// Lowest explicit 2xx status, used for default placeholder behavior.
    pub fn success_status(&self) -> Option<u16> {
        self.responses
            .iter()
            .filter_map(|r| match r.key {
                ResponseKey::Status(code) if (200..300).contains(&code) => Some(code),
                _ => None,
            })
            .min()
    }
}

pub fn response_member(key: &ResponseKey) -> String {
    match key {
        ResponseKey::Default => "Default".to_string(),
        other => format!("Status{}", other.label()),
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OperationTable {
    operations: Vec<OperationSpec>,
}

impl OperationTable {
    pub fn build(
        document: &Document,
        types: &mut TypeRegistry,
        names: &mut NamingRegistry,
        issues: &mut IssueLog,
    ) -> Self {
        check_requirements(&document.security, document, "document security", issues);

        let operations = document
            .operations
            .iter()
            .map(|op| build_operation(op, document, types, names, issues))
            .collect();
        Self { operations }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OperationSpec> {
        self.operations.iter()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&OperationSpec> {
        self.operations.iter().find(|op| op.name == name)
    }
}

impl<'a> IntoIterator for &'a OperationTable {
    type Item = &'a OperationSpec;
    type IntoIter = std::slice::Iter<'a, OperationSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.operations.iter()
    }
}

fn build_operation(
    op: &Operation,
    document: &Document,
    types: &mut TypeRegistry,
    names: &mut NamingRegistry,
    issues: &mut IssueLog,
) -> OperationSpec {
    let location = op.location();
    let name = names.assign_for(&location, &op.id, NameKind::Operation);
    if name != crate::naming::normalize(&op.id, NameKind::Operation) {
        issues.push(
            Issue::warning(format!("operation id '{}' collides, renamed to '{name}'", op.id))
                .at(location.clone()),
        );
    }

    let mut fields = NamingRegistry::new();
    let mut locals = NamingRegistry::new();
    let mut params = Vec::with_capacity(op.parameters.len());
    for param in &op.parameters {
        let owner = format!("{}:{}", param.location.as_str(), param.name);
        let hint = format!("{name}{}", to_pascal_case(&param.name));
        let base = types.map_schema(&param.schema, &hint, Some(&name), names);
        let ty = if param.location == ParameterLocation::Path {
            base.clone()
        } else {
            types.field_type(base.clone(), param.required)
        };

        let mut doc = param
            .description
            .as_deref()
            .map(Doc::from_text)
            .unwrap_or_default();
        if !param.schema.enum_values.is_empty() {
            doc.push(&format!("Allowed values: {}", param.schema.enum_values.join(", ")));
        }

        params.push(ParamSpec {
            name: param.name.clone(),
            field: fields.assign_for(&owner, &param.name, NameKind::Field),
            var: locals.assign_for(&owner, &param.name, NameKind::Local),
            location: param.location,
            required: param.required || param.location == ParameterLocation::Path,
            ty,
            base,
            doc,
        });
    }

    let body = op.request_body.as_ref().map(|body| {
        let base = types.map_schema(&body.schema, &format!("{name}Body"), Some(&name), names);
        BodySpec {
            content_type: body.content_type.clone(),
            required: body.required,
            ty: types.field_type(base, body.required),
        }
    });

    let responses = op
        .responses
        .iter()
        .map(|(key, response)| {
            let hint = format!("{name}{}Response", key.label());
            ResponseSpec {
                key: *key,
                member: response_member(key),
                ty: response
                    .schema
                    .as_ref()
                    .map(|schema| types.map_schema(schema, &hint, Some(&name), names)),
                content_type: response.content_type.clone(),
                doc: Doc::from_text(&response.description),
            }
        })
        .collect();

    let security = match &op.security {
        Some(own) => {
            check_requirements(own, document, &location, issues);
            own.clone()
        }
        None => document.security.clone(),
    };

    let mut doc = op.documentation().map(|d| Doc::from_text(&d)).unwrap_or_default();
    if op.deprecated {
        doc.paragraph();
        doc.push("Deprecated: this operation is marked deprecated in the API description.");
    }

    OperationSpec {
        source_id: op.id.clone(),
        method: op.method,
        path: op.path.clone(),
        params,
        body,
        responses,
        security,
        origin: OperationRef {
            operation: name.clone(),
            tag: op.tags.first().cloned(),
            path_prefix: op.path_prefix(),
        },
        doc,
        deprecated: op.deprecated,
        name,
    }
}

fn check_requirements(
    requirements: &[SecurityRequirement],
    document: &Document,
    location: &str,
    issues: &mut IssueLog,
) {
    for requirement in requirements {
        for scheme in requirement.keys() {
            if !document.security_schemes.contains_key(scheme) {
                issues.push(
                    Issue::warning(format!("security requirement names undeclared scheme '{scheme}'"))
                        .at(location.to_string()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OptionalStyle;
    use crate::parsers::{normalize, SourceDocument};
    use serde_json::json;

    fn table(value: serde_json::Value) -> (OperationTable, IssueLog) {
        let source = SourceDocument::from_value(value, None).unwrap();
        let mut issues = IssueLog::new();
        let document = normalize(&source, &mut issues).unwrap();
        let mut names = NamingRegistry::new();
        let mut types = TypeRegistry::new(OptionalStyle::Pointer);
        types.register_components(&document.schemas, &mut names);
        let table = OperationTable::build(&document, &mut types, &mut names, &mut issues);
        (table, issues)
    }

    fn pets() -> serde_json::Value {
        json!({
            "openapi": "3.0.3",
            "info": { "title": "Pets", "version": "1" },
            "security": [{ "key": [] }],
            "paths": {
                "/pets": {
                    "get": {
                        "operationId": "GetPets",
                        "tags": ["pets"],
                        "parameters": [
                            { "name": "limit", "in": "query", "schema": { "type": "integer", "format": "int32" } },
                            { "name": "type", "in": "query", "required": true, "schema": { "type": "string" } }
                        ],
                        "responses": { "200": { "description": "ok" } }
                    }
                },
                "/pets/{id}": {
                    "get": {
                        "summary": "Find a pet",
                        "description": "Looks up one pet.\nBy id.",
                        "deprecated": true,
                        "security": [],
                        "parameters": [{ "name": "id", "in": "path", "required": true, "schema": { "type": "integer" } }],
                        "responses": {
                            "200": { "description": "ok" },
                            "2XX": { "description": "other success" },
                            "default": { "description": "error" }
                        }
                    }
                }
            },
            "components": {
                "securitySchemes": { "key": { "type": "apiKey", "name": "X-Key", "in": "header" } }
            }
        })
    }

    #[test]
    fn test_synthesized_name_does_not_collide_with_existing() {
        let (table, _) = table(pets());
        let names: Vec<&str> = table.iter().map(|op| op.name.as_str()).collect();
        assert_eq!(names, vec!["GetPets", "GetPetsById"]);
    }

    #[test]
    fn test_path_params_never_wrapped() {
        let (table, _) = table(pets());
        let by_id = table.get("GetPetsById").unwrap();
        assert_eq!(by_id.params[0].ty.optional_depth(), 0);
        assert!(by_id.params[0].needs_parse());

        let list = table.get("GetPets").unwrap();
        assert_eq!(list.params[0].ty.to_string(), "*int32");
        assert_eq!(list.params[1].ty.to_string(), "string");
        // `type` is reserved as a local
        assert_eq!(list.params[1].var, "type_");
    }

    #[test]
    fn test_response_members_and_ranges() {
        let (table, _) = table(pets());
        let by_id = table.get("GetPetsById").unwrap();
        let members: Vec<&str> = by_id.responses.iter().map(|r| r.member.as_str()).collect();
        assert_eq!(members, vec!["Status200", "Status2XX", "Default"]);
        assert_eq!(by_id.success_status(), Some(200));
    }

    #[test]
    fn test_effective_security_and_deprecation_doc() {
        let (table, _) = table(pets());
        assert_eq!(table.get("GetPets").unwrap().security.len(), 1);

        let by_id = table.get("GetPetsById").unwrap();
        assert!(by_id.security.is_empty());
        let lines = by_id.doc.lines();
        assert_eq!(lines[0], "Find a pet");
        assert!(lines.iter().any(|l| l.starts_with("Deprecated:")));
        assert!(lines.iter().all(|l| !l.contains('\n')));
    }

    #[test]
    fn test_duplicate_operation_ids_get_suffix() {
        let (table, issues) = table(json!({
            "openapi": "3.0.3",
            "info": { "title": "t", "version": "1" },
            "paths": {
                "/a": { "get": { "operationId": "fetch", "responses": { "200": { "description": "ok" } } } },
                "/b": { "get": { "operationId": "fetch", "responses": { "200": { "description": "ok" } } } }
            }
        }));
        let names: Vec<&str> = table.iter().map(|op| op.name.as_str()).collect();
        assert_eq!(names, vec!["Fetch", "Fetch2"]);
        assert!(issues.iter().any(|i| i.message.contains("collides")));
    }

    #[test]
    fn test_undeclared_scheme_warns() {
        let (_, issues) = table(json!({
            "openapi": "3.0.3",
            "info": { "title": "t", "version": "1" },
            "paths": {
                "/a": { "get": { "operationId": "a", "security": [{ "ghost": [] }], "responses": { "200": { "description": "ok" } } } }
            }
        }));
        assert!(issues.iter().any(|i| i.message.contains("undeclared scheme 'ghost'")));
    }
}
