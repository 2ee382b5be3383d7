//! Generation engine for OpenAPI 3 and Swagger 2 documents.
//!
//! [`generate`] normalizes a parsed document, names and maps every type,
//! synthesizes security and server declarations and plans how they are split
//! into files. It performs no I/O; the host hands the resulting
//! [`GenerationOutput`] to a renderer.

pub mod buffer_pool;
pub mod config;
pub mod declarations;
pub mod error;
pub mod issues;
pub mod naming;
pub mod operations;
pub mod parsers;
pub mod render;
pub mod security;
pub mod server;
pub mod split;
pub mod types;

use crate::declarations::{DeclBody, Field, GeneratedDeclaration, Origin, Section};
use crate::issues::IssueLog;
use crate::naming::NamingRegistry;
use crate::operations::OperationTable;
use crate::server::ExtensionRegistry;
use crate::types::{NamedBody, NamedType, TypeRegistry};
use serde::Serialize;
use std::time::{Duration, Instant};

pub use crate::config::GenerationOptions;
pub use crate::error::{ExtensionError, GenerateError, Result};
pub use crate::issues::{Issue, Severity};
pub use crate::parsers::{Dialect, SourceDocument};
pub use crate::split::{Bucket, SplitPlan};

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GenerationStats {
    pub files: usize,
    pub types: usize,
    pub operations: usize,
    pub declarations: usize,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl GenerationStats {
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed.as_millis()).unwrap_or(u64::MAX)
    }
}

fn as_millis<S: serde::Serializer>(elapsed: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

/// Everything one run produces.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutput {
    pub plan: SplitPlan,
    pub issues: Vec<Issue>,
    pub stats: GenerationStats,
}

impl GenerationOutput {
    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
    }
}

/// Run the whole pipeline for one document.
///
/// Each call owns its naming table and plan; concurrent calls share nothing
/// but the [`buffer_pool`].
pub fn generate(source: &SourceDocument, options: &GenerationOptions) -> Result<GenerationOutput> {
    let started = Instant::now();

    // an unknown router name must fail before anything is produced
    let extensions = ExtensionRegistry::from_options(&options.server)?;

    let mut issues = IssueLog::new();
    let mut names = NamingRegistry::new();
    let document = parsers::normalize(source, &mut issues)?;

    let mut types = TypeRegistry::new(options.optional_style);
    types.register_components(&document.schemas, &mut names);
    let operations = OperationTable::build(&document, &mut types, &mut names, &mut issues);
    issues.extend(types.take_issues());

    let mut declarations: Vec<GeneratedDeclaration> = types
        .types()
        .map(|named| type_declaration(named, &operations))
        .collect();
    declarations.extend(security::synthesize(&document, &operations, &options.security, &mut names));
    declarations.extend(extensions.run(&operations, &mut names, options.strict, &mut issues)?);

    let plan = split::plan(declarations, &options.split, &mut names);
    let stats = GenerationStats {
        files: plan.buckets.len(),
        types: plan.type_count(),
        operations: operations.len(),
        declarations: plan.declaration_count(),
        elapsed: started.elapsed(),
    };
    tracing::info!(
        files = stats.files,
        types = stats.types,
        operations = stats.operations,
        issues = issues.len(),
        "generation finished"
    );

    Ok(GenerationOutput {
        plan,
        issues: issues.into_vec(),
        stats,
    })
}

fn type_declaration(named: &NamedType, operations: &OperationTable) -> GeneratedDeclaration {
    let origin = named
        .single_owner()
        .and_then(|owner| operations.get(owner))
        .map(server::origin)
        .unwrap_or(Origin::Shared);

    let body = match &named.body {
        NamedBody::Struct { fields } => DeclBody::Struct {
            fields: fields
                .iter()
                .map(|f| Field::wire(&f.name, &f.wire_name, f.ty.clone()).with_doc(f.doc.clone()))
                .collect(),
            methods: Vec::new(),
        },
        NamedBody::Alias { target } => DeclBody::Alias {
            target: target.clone(),
        },
    };

    GeneratedDeclaration::new(named.name.clone(), Section::Types, origin, body).with_doc(named.doc.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declarations::DeclKind;
    use serde_json::json;

    fn source(value: serde_json::Value) -> SourceDocument {
        SourceDocument::from_value(value, None).unwrap()
    }

    #[test]
    fn test_inline_body_type_follows_its_operation() {
        let doc = source(json!({
            "openapi": "3.0.3",
            "info": { "title": "t", "version": "1" },
            "paths": {
                "/orders": {
                    "post": {
                        "operationId": "placeOrder",
                        "tags": ["store"],
                        "requestBody": {
                            "required": true,
                            "content": { "application/json": { "schema": {
                                "type": "object",
                                "properties": { "sku": { "type": "string" } }
                            } } }
                        },
                        "responses": { "204": { "description": "placed" } }
                    }
                }
            }
        }));
        let output = generate(&doc, &GenerationOptions::default()).unwrap();
        let store = output.plan.buckets.iter().find(|b| b.key == "store").unwrap();
        assert!(store
            .declarations
            .iter()
            .any(|d| d.section == Section::Types && d.kind == DeclKind::Type));
        assert_eq!(output.stats.operations, 1);
        assert_eq!(output.stats.files, output.plan.buckets.len());
    }

    #[test]
    fn test_invalid_router_fails_before_normalizing() {
        let doc = source(json!({
            "openapi": "3.0.3",
            "info": { "title": "t", "version": "1" },
            "paths": {}
        }));
        let mut options = GenerationOptions::default();
        options.server.router = Some("koa".to_string());
        let err = generate(&doc, &options).unwrap_err();
        assert!(matches!(err, GenerateError::InvalidRouterStrategy(name) if name == "koa"));
    }
}
