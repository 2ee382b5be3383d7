//! Request binders: inbound HTTP request to a typed request value.
//!
//! Binding failures surface as a structured `BindingError` whose kind tells
//! malformed input apart from input that failed validation.

use super::{origin, ExtensionContext, ServerExtension};
use crate::declarations::{
    Condition, DeclBody, Expr, Field, FunctionDecl, GeneratedDeclaration, Literal, MethodSig,
    Param, Section, Stmt,
};
use crate::error::ExtensionError;
use crate::naming::NameKind;
use crate::operations::{BodySpec, OperationSpec, ParamSpec};
use crate::parsers::ParameterLocation;
use crate::types::{runtime, Doc, Primitive, TypeDescriptor};

pub struct BinderExtension;

struct Shared {
    kind: String,
    malformed: String,
    validation: String,
    error: String,
    validator: String,
    binder: String,
    new_binder: String,
    cookie: String,
}

impl ServerExtension for BinderExtension {
    fn name(&self) -> &'static str {
        "binder"
    }

    fn section(&self) -> Section {
        Section::Binder
    }

    fn synthesize(
        &self,
        ctx: &mut ExtensionContext<'_>,
    ) -> Result<Vec<GeneratedDeclaration>, ExtensionError> {
        let shared = Shared {
            kind: ctx.shared_name("BindingErrorKind", NameKind::Type),
            malformed: ctx.shared_name("BindingMalformed", NameKind::Constant),
            validation: ctx.shared_name("BindingValidation", NameKind::Constant),
            error: ctx.shared_name("BindingError", NameKind::Type),
            validator: ctx.shared_name("Validator", NameKind::Type),
            binder: ctx.shared_name("Binder", NameKind::Type),
            new_binder: ctx.shared_name("NewBinder", NameKind::Function),
            cookie: ctx.shared_name("cookieValue", NameKind::Function),
        };

        let mut decls = shared_declarations(&shared);
        for op in ctx.operations {
            check_bindable(op)?;
            let request = ctx.operation_name(op, "request", format!("{}Request", op.name), NameKind::Type);
            let bind = ctx.operation_name(op, "bind", format!("Bind{}", op.name), NameKind::Function);
            decls.push(request_type(op, &request));
            decls.push(bind_method(op, &request, &bind, &shared));
        }
        Ok(decls)
    }
}

/// Header and cookie values are flat strings; anything structured there has
/// no binding.
fn check_bindable(op: &OperationSpec) -> Result<(), ExtensionError> {
    for param in &op.params {
        if param.location == ParameterLocation::Query && scalar_sequence(&param.base).is_some() {
            continue;
        }
        if matches!(
            param.base,
            TypeDescriptor::Named(_) | TypeDescriptor::Map(_) | TypeDescriptor::Sequence(_)
        ) {
            return Err(ExtensionError::UnbindableParameter {
                operation: op.name.clone(),
                parameter: param.name.clone(),
                reason: format!(
                    "{} parameters must be scalar, found {}",
                    param.location.as_str(),
                    param.base
                ),
            });
        }
    }
    Ok(())
}

fn scalar_sequence(ty: &TypeDescriptor) -> Option<Primitive> {
    match ty {
        TypeDescriptor::Sequence(item) => match item.as_ref() {
            TypeDescriptor::Primitive(p) => Some(*p),
            _ => None,
        },
        _ => None,
    }
}

fn binding_error(shared: &Shared, kind: &str, parameter: &str, err: Expr) -> Expr {
    Expr::Composite {
        ty: TypeDescriptor::named(&shared.error),
        fields: vec![
            ("Kind".to_string(), Expr::ident(kind)),
            ("Parameter".to_string(), Expr::str(parameter)),
            ("Err".to_string(), err),
        ],
    }
    .address_of()
}

fn fail(shared: &Shared, kind: &str, parameter: &str, err: Expr) -> Vec<Stmt> {
    vec![Stmt::ret(vec![Expr::Nil, binding_error(shared, kind, parameter, err)])]
}

fn shared_declarations(shared: &Shared) -> Vec<GeneratedDeclaration> {
    let mut decls = vec![
        GeneratedDeclaration::shared(
            shared.kind.clone(),
            Section::Binder,
            DeclBody::Alias {
                target: runtime::string(),
            },
        )
        .documented("BindingErrorKind separates malformed input from failed validation."),
        GeneratedDeclaration::shared(
            shared.malformed.clone(),
            Section::Binder,
            DeclBody::Constant {
                value: Literal::Str("malformed".into()),
            },
        ),
        GeneratedDeclaration::shared(
            shared.validation.clone(),
            Section::Binder,
            DeclBody::Constant {
                value: Literal::Str("validation".into()),
            },
        ),
    ];

    let error_method = FunctionDecl::method("Error", "e", &shared.error)
        .returns(runtime::string())
        .body(vec![
            Stmt::when(
                Condition::is_empty(Expr::ident("e.Parameter")),
                vec![Stmt::ret(vec![Expr::Concat {
                    parts: vec![
                        Expr::call("string", vec![Expr::ident("e.Kind")]),
                        Expr::str(": "),
                        Expr::call("e.Err.Error", vec![]),
                    ],
                }])],
            ),
            Stmt::ret(vec![Expr::Concat {
                parts: vec![
                    Expr::call("string", vec![Expr::ident("e.Kind")]),
                    Expr::str(" parameter "),
                    Expr::ident("e.Parameter"),
                    Expr::str(": "),
                    Expr::call("e.Err.Error", vec![]),
                ],
            }]),
        ]);
    let unwrap = FunctionDecl::method("Unwrap", "e", &shared.error)
        .returns(runtime::error())
        .body(vec![Stmt::ret(vec![Expr::ident("e.Err")])]);
    decls.push(
        GeneratedDeclaration::shared(
            shared.error.clone(),
            Section::Binder,
            DeclBody::Struct {
                fields: vec![
                    Field::internal("Kind", TypeDescriptor::named(&shared.kind)),
                    Field::internal("Parameter", runtime::string()),
                    Field::internal("Err", runtime::error()),
                ],
                methods: vec![error_method, unwrap],
            },
        )
        .documented("BindingError reports why a request could not be bound."),
    );

    decls.push(
        GeneratedDeclaration::shared(
            shared.validator.clone(),
            Section::Binder,
            DeclBody::Interface {
                methods: vec![MethodSig {
                    name: "Validate".to_string(),
                    params: vec![Param::new("value", TypeDescriptor::Any)],
                    returns: vec![runtime::error()],
                    doc: Doc::new(),
                }],
            },
        )
        .documented("Validator checks a bound request beyond what its types enforce."),
    );

    decls.push(
        GeneratedDeclaration::shared(
            shared.binder.clone(),
            Section::Binder,
            DeclBody::Struct {
                fields: vec![
                    Field::internal("Validator", TypeDescriptor::named(&shared.validator)),
                    Field::internal(
                        "PathParam",
                        TypeDescriptor::func(
                            vec![runtime::request(), runtime::string()],
                            vec![runtime::string()],
                        ),
                    )
                    .with_doc(Doc::from_text("PathParam reads a path parameter; the router decides how.")),
                ],
                methods: vec![],
            },
        )
        .documented("Binder extracts typed request values from inbound requests."),
    );

    decls.push(GeneratedDeclaration::shared(
        shared.new_binder.clone(),
        Section::Binder,
        DeclBody::Function(
            FunctionDecl::new(shared.new_binder.clone())
                .param("validator", TypeDescriptor::named(&shared.validator))
                .returns(TypeDescriptor::named(&shared.binder).pointer())
                .body(vec![Stmt::ret(vec![Expr::Composite {
                    ty: TypeDescriptor::named(&shared.binder),
                    fields: vec![
                        ("Validator".to_string(), Expr::ident("validator")),
                        ("PathParam".to_string(), Expr::ident("(*http.Request).PathValue")),
                    ],
                }
                .address_of()])]),
        ),
    ));

    decls.push(GeneratedDeclaration::shared(
        shared.cookie.clone(),
        Section::Binder,
        DeclBody::Function(
            FunctionDecl::new(shared.cookie.clone())
                .param("r", runtime::request())
                .param("name", runtime::string())
                .returns(runtime::string())
                .body(vec![
                    Stmt::declare(&["cookie", "err"], Expr::call("r.Cookie", vec![Expr::ident("name")])),
                    Stmt::return_on_error("err", vec![Expr::str("")]),
                    Stmt::ret(vec![Expr::ident("cookie.Value")]),
                ]),
        ),
    ));

    decls
}

fn request_type(op: &OperationSpec, name: &str) -> GeneratedDeclaration {
    let mut fields: Vec<Field> = op
        .params
        .iter()
        .map(|p| Field::wire(&p.field, &p.name, p.ty.clone()).with_doc(p.doc.clone()))
        .collect();
    if let Some(body) = &op.body {
        fields.push(match body_mode(body) {
            BodyMode::Json => Field::internal("Body", body.ty.clone()),
            BodyMode::Form => Field::internal("Form", runtime::url_values()),
            BodyMode::Raw => Field::internal("RawBody", runtime::bytes()),
        });
    }

    GeneratedDeclaration::new(
        name,
        Section::Binder,
        origin(op),
        DeclBody::Struct {
            fields,
            methods: vec![],
        },
    )
    .documented(&format!("{name} holds the bound inputs of {}.", op.name))
}

enum BodyMode {
    Json,
    Form,
    Raw,
}

fn body_mode(body: &BodySpec) -> BodyMode {
    let ct = body.content_type.to_ascii_lowercase();
    if ct.contains("json") {
        BodyMode::Json
    } else if ct.starts_with("application/x-www-form-urlencoded") || ct.starts_with("multipart/form-data") {
        BodyMode::Form
    } else {
        BodyMode::Raw
    }
}

fn source(param: &ParamSpec, shared: &Shared) -> Expr {
    match param.location {
        ParameterLocation::Path => Expr::call("b.PathParam", vec![Expr::ident("r"), Expr::str(&param.name)]),
        ParameterLocation::Query => Expr::call("r.URL.Query().Get", vec![Expr::str(&param.name)]),
        ParameterLocation::Header => Expr::call("r.Header.Get", vec![Expr::str(&param.name)]),
        ParameterLocation::Cookie => {
            Expr::call(shared.cookie.clone(), vec![Expr::ident("r"), Expr::str(&param.name)])
        }
    }
}

/// Store `value` into the request field, taking its address when the field
/// is an optional wrapper.
fn store(param: &ParamSpec, value: &str) -> Stmt {
    let value = if param.ty.is_optional() {
        Expr::ident(value).address_of()
    } else {
        Expr::ident(value)
    };
    Stmt::assign(&format!("req.{}", param.field), value)
}

fn bind_param(param: &ParamSpec, shared: &Shared) -> Vec<Stmt> {
    let raw = format!("{}Raw", param.var);

    if let Some(item) = scalar_sequence(&param.base) {
        let values = Expr::index(Expr::ident("r.URL.Query()"), Expr::str(&param.name));
        if !item.needs_parse() {
            return vec![Stmt::assign(&format!("req.{}", param.field), values)];
        }
        return vec![Stmt::ForEach {
            item: raw.clone(),
            over: values,
            body: vec![
                Stmt::Parse {
                    param: param.name.clone(),
                    source: Expr::ident(&raw),
                    ty: TypeDescriptor::Primitive(item),
                    bind: param.var.clone(),
                    on_error: fail(shared, &shared.malformed, &param.name, Expr::ident("err")),
                },
                Stmt::assign(
                    &format!("req.{}", param.field),
                    Expr::call(
                        "append",
                        vec![Expr::ident(format!("req.{}", param.field)), Expr::ident(&param.var)],
                    ),
                ),
            ],
        }];
    }

    let mut present = Vec::new();
    if param.needs_parse() {
        present.push(Stmt::Parse {
            param: param.name.clone(),
            source: Expr::ident(&raw),
            ty: param.base.clone(),
            bind: param.var.clone(),
            on_error: fail(shared, &shared.malformed, &param.name, Expr::ident("err")),
        });
        present.push(store(param, &param.var));
    } else {
        present.push(store(param, &raw));
    }

    let missing = if param.required {
        fail(
            shared,
            &shared.validation,
            &param.name,
            Expr::call("errors.New", vec![Expr::str("required parameter is missing")]),
        )
    } else {
        Vec::new()
    };

    vec![
        Stmt::declare(&[raw.as_str()], source(param, shared)),
        Stmt::If {
            cond: Condition::is_empty(Expr::ident(&raw)),
            then: missing,
            otherwise: present,
        },
    ]
}

fn bind_body(body: &BodySpec, shared: &Shared) -> Vec<Stmt> {
    match body_mode(body) {
        BodyMode::Json => {
            let decode = Stmt::declare(
                &["err"],
                Expr::call(
                    "json.NewDecoder(r.Body).Decode",
                    vec![Expr::ident("req.Body").address_of()],
                ),
            );
            let malformed = fail(shared, &shared.malformed, "", Expr::ident("err"));
            let on_error = if body.required {
                malformed
            } else {
                // an absent optional body decodes to io.EOF
                vec![Stmt::when(
                    Condition::truthy(Expr::call(
                        "errors.Is",
                        vec![Expr::ident("err"), Expr::ident("io.EOF")],
                    ))
                    .negate(),
                    malformed,
                )]
            };
            vec![decode, Stmt::when(Condition::error_set("err"), on_error)]
        }
        BodyMode::Form => vec![
            Stmt::declare(&["err"], Expr::call("r.ParseForm", vec![])),
            Stmt::when(
                Condition::error_set("err"),
                fail(shared, &shared.malformed, "", Expr::ident("err")),
            ),
            Stmt::assign("req.Form", Expr::ident("r.Form")),
        ],
        BodyMode::Raw => vec![
            Stmt::declare(&["raw", "err"], Expr::call("io.ReadAll", vec![Expr::ident("r.Body")])),
            Stmt::when(
                Condition::error_set("err"),
                fail(shared, &shared.malformed, "", Expr::ident("err")),
            ),
            Stmt::assign("req.RawBody", Expr::ident("raw")),
        ],
    }
}

fn bind_method(op: &OperationSpec, request: &str, name: &str, shared: &Shared) -> GeneratedDeclaration {
    let mut body = vec![Stmt::declare(
        &["req"],
        Expr::Composite {
            ty: TypeDescriptor::named(request),
            fields: vec![],
        }
        .address_of(),
    )];
    for location in [
        ParameterLocation::Path,
        ParameterLocation::Query,
        ParameterLocation::Header,
        ParameterLocation::Cookie,
    ] {
        for param in op.params_in(location) {
            body.extend(bind_param(param, shared));
        }
    }
    if let Some(spec) = &op.body {
        body.extend(bind_body(spec, shared));
    }
    body.push(Stmt::when(
        Condition::is_nil(Expr::ident("b.Validator")).negate(),
        vec![
            Stmt::declare(&["err"], Expr::call("b.Validator.Validate", vec![Expr::ident("req")])),
            Stmt::when(
                Condition::error_set("err"),
                fail(shared, &shared.validation, "", Expr::ident("err")),
            ),
        ],
    ));
    body.push(Stmt::ret(vec![Expr::ident("req"), Expr::Nil]));

    let func = FunctionDecl::method(name, "b", &shared.binder)
        .param("r", runtime::request())
        .returns(TypeDescriptor::named(request).pointer())
        .returns(runtime::error())
        .body(body)
        .documented(&format!("{name} binds and validates the inputs of {}.", op.name));

    GeneratedDeclaration::new(name, Section::Binder, origin(op), DeclBody::Function(func))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::tests::table;
    use serde_json::json;

    fn emit(value: serde_json::Value) -> Result<Vec<GeneratedDeclaration>, ExtensionError> {
        let (ops, mut names) = table(value);
        let mut ctx = ExtensionContext {
            operations: &ops,
            names: &mut names,
        };
        BinderExtension.synthesize(&mut ctx)
    }

    fn document() -> serde_json::Value {
        json!({
            "openapi": "3.0.3",
            "info": { "title": "t", "version": "1" },
            "paths": {
                "/pets/{id}": {
                    "put": {
                        "operationId": "updatePet",
                        "parameters": [
                            { "name": "id", "in": "path", "required": true, "schema": { "type": "integer", "format": "int64" } },
                            { "name": "dryRun", "in": "query", "schema": { "type": "boolean" } },
                            { "name": "tags", "in": "query", "schema": { "type": "array", "items": { "type": "string" } } },
                            { "name": "X-Trace", "in": "header", "schema": { "type": "string" } }
                        ],
                        "requestBody": {
                            "required": true,
                            "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Pet" } } }
                        },
                        "responses": { "204": { "description": "done" } }
                    }
                }
            },
            "components": { "schemas": { "Pet": { "type": "object", "properties": { "name": { "type": "string" } } } } }
        })
    }

    #[test]
    fn test_request_type_and_bind_method() {
        let decls = emit(document()).unwrap();
        let request = decls.iter().find(|d| d.name == "UpdatePetRequest").unwrap();
        let fields: Vec<&str> = request.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["Id", "DryRun", "Tags", "XTrace", "Body"]);
        assert_eq!(request.fields()[1].ty.to_string(), "*bool");

        let bind = decls.iter().find(|d| d.name == "BindUpdatePet").unwrap();
        let func = bind.function().unwrap();
        assert_eq!(func.receiver.as_ref().unwrap().ty.to_string(), "*Binder");
        assert_eq!(func.returns.len(), 2);
    }

    #[test]
    fn test_parse_failures_are_malformed_binding_errors() {
        let decls = emit(document()).unwrap();
        let func = decls
            .iter()
            .find(|d| d.name == "BindUpdatePet")
            .and_then(|d| d.function())
            .unwrap();

        let parses: Vec<&Stmt> = func
            .statements()
            .into_iter()
            .filter(|s| matches!(s, Stmt::Parse { .. }))
            .collect();
        assert_eq!(parses.len(), 2);
        for stmt in parses {
            let Stmt::Parse { on_error, .. } = stmt else { unreachable!() };
            let Some(Stmt::Return(values)) = on_error.first() else {
                panic!("parse failure must return");
            };
            let Expr::AddressOf { inner } = &values[1] else {
                panic!("expected &BindingError{{..}}");
            };
            let Expr::Composite { fields, .. } = inner.as_ref() else {
                panic!("expected composite");
            };
            assert_eq!(fields[0].1, Expr::ident("BindingMalformed"));
        }
    }

    #[test]
    fn test_validator_consulted_last() {
        let decls = emit(document()).unwrap();
        let func = decls
            .iter()
            .find(|d| d.name == "BindUpdatePet")
            .and_then(|d| d.function())
            .unwrap();
        let n = func.body.len();
        assert!(matches!(
            &func.body[n - 2],
            Stmt::If { cond: Condition::Not { .. }, .. }
        ));
    }

    #[test]
    fn test_structured_header_is_unbindable() {
        let err = emit(json!({
            "openapi": "3.0.3",
            "info": { "title": "t", "version": "1" },
            "paths": {
                "/a": {
                    "get": {
                        "operationId": "a",
                        "parameters": [{ "name": "X-Obj", "in": "header", "schema": { "type": "object", "properties": { "q": { "type": "string" } } } }],
                        "responses": { "200": { "description": "ok" } }
                    }
                }
            }
        }))
        .unwrap_err();
        assert!(matches!(
            err,
            ExtensionError::UnbindableParameter { ref parameter, .. } if parameter == "X-Obj"
        ));
    }
}
