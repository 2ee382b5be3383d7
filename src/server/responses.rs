use super::{origin, ExtensionContext, ServerExtension};
use crate::declarations::{
    Condition, DeclBody, Expr, Field, FunctionDecl, GeneratedDeclaration, Section, Stmt,
};
use crate::error::ExtensionError;
use crate::naming::NameKind;
use crate::operations::{OperationSpec, ResponseSpec};
use crate::parsers::ResponseKey;
use crate::types::{runtime, Doc, TypeDescriptor};

pub struct ResponsesExtension;

struct Helpers {
    write_json: String,
    write_error: String,
    write_no_content: String,
}

impl ServerExtension for ResponsesExtension {
    fn name(&self) -> &'static str {
        "responses"
    }

    fn section(&self) -> Section {
        Section::Responses
    }

    fn synthesize(
        &self,
        ctx: &mut ExtensionContext<'_>,
    ) -> Result<Vec<GeneratedDeclaration>, ExtensionError> {
        let helpers = Helpers {
            write_json: ctx.shared_name("WriteJSON", NameKind::Function),
            write_error: ctx.shared_name("WriteError", NameKind::Function),
            write_no_content: ctx.shared_name("WriteNoContent", NameKind::Function),
        };
        let mut decls = shared(&helpers);
        for op in ctx.operations {
            decls.push(response_type(ctx, op, &helpers));
        }
        Ok(decls)
    }
}

fn shared(helpers: &Helpers) -> Vec<GeneratedDeclaration> {
    let write_json = FunctionDecl::new(helpers.write_json.clone())
        .param("w", runtime::response_writer())
        .param("status", runtime::int())
        .param("body", TypeDescriptor::Any)
        .returns(runtime::error())
        .body(vec![
            Stmt::Eval(Expr::call(
                "w.Header().Set",
                vec![Expr::str("Content-Type"), Expr::str("application/json")],
            )),
            Stmt::Eval(Expr::call("w.WriteHeader", vec![Expr::ident("status")])),
            Stmt::ret(vec![Expr::call(
                "json.NewEncoder(w).Encode",
                vec![Expr::ident("body")],
            )]),
        ])
        .documented("Writes body as JSON with the given status.");

    let write_error = FunctionDecl::new(helpers.write_error.clone())
        .param("w", runtime::response_writer())
        .param("status", runtime::int())
        .param("err", runtime::error())
        .returns(runtime::error())
        .body(vec![Stmt::ret(vec![Expr::call(
            helpers.write_json.clone(),
            vec![
                Expr::ident("w"),
                Expr::ident("status"),
                Expr::MapLit {
                    ty: TypeDescriptor::map_of(runtime::string()),
                    entries: vec![("error".to_string(), Expr::call("err.Error", vec![]))],
                },
            ],
        )])])
        .documented("Writes `{\"error\": message}` with the given status.");

    let write_no_content = FunctionDecl::new(helpers.write_no_content.clone())
        .param("w", runtime::response_writer())
        .body(vec![Stmt::Respond {
            status: Expr::int(204),
            body: None,
        }]);

    [write_json, write_error, write_no_content]
        .into_iter()
        .map(|func| {
            GeneratedDeclaration::shared(func.name.clone(), Section::Responses, DeclBody::Function(func))
        })
        .collect()
}

/// Status argument of a constructor method: fixed for exact codes, caller
/// supplied for ranges and `default`.
fn status_expr(key: &ResponseKey) -> Option<Expr> {
    match key {
        ResponseKey::Status(code) => Some(Expr::int(i64::from(*code))),
        ResponseKey::Range(_) | ResponseKey::Default => None,
    }
}

fn constructor(type_name: &str, response: &ResponseSpec) -> FunctionDecl {
    let mut method = FunctionDecl::method(response.member.clone(), "r", type_name);
    let status = match status_expr(&response.key) {
        Some(fixed) => fixed,
        None => {
            method = method.param("status", runtime::int());
            Expr::ident("status")
        }
    };
    if let Some(ty) = &response.ty {
        method = method.param("body", ty.clone());
    }
    let body = match response.ty {
        Some(_) => Expr::ident("body"),
        None => Expr::Nil,
    };

    let mut func = method
        .returns(TypeDescriptor::named(type_name).pointer())
        .body(vec![
            Stmt::assign("r.StatusCode", status),
            Stmt::assign("r.Body", body),
            Stmt::ret(vec![Expr::ident("r")]),
        ]);
    func.doc = response.doc.clone();
    func
}

fn response_type(ctx: &mut ExtensionContext<'_>, op: &OperationSpec, helpers: &Helpers) -> GeneratedDeclaration {
    let name = ctx.operation_name(op, "response", format!("{}Response", op.name), NameKind::Type);

    let mut methods: Vec<FunctionDecl> = op.responses.iter().map(|r| constructor(&name, r)).collect();
    methods.push(
        FunctionDecl::method("Write", "r", &name)
            .param("w", runtime::response_writer())
            .returns(runtime::error())
            .body(vec![
                Stmt::when(
                    Condition::is_nil(Expr::ident("r.Body")),
                    vec![
                        Stmt::Respond {
                            status: Expr::ident("r.StatusCode"),
                            body: None,
                        },
                        Stmt::ret(vec![Expr::Nil]),
                    ],
                ),
                Stmt::ret(vec![Expr::call(
                    helpers.write_json.clone(),
                    vec![Expr::ident("w"), Expr::ident("r.StatusCode"), Expr::ident("r.Body")],
                )]),
            ])
            .documented("Write sends the response. A nil body writes the status only."),
    );

    let mut doc = Doc::new();
    doc.push(&format!("{name} is a response of {}.", op.name));
    GeneratedDeclaration::new(
        name,
        Section::Responses,
        origin(op),
        DeclBody::Struct {
            fields: vec![
                Field::internal("StatusCode", runtime::int()),
                Field::internal("Body", TypeDescriptor::Any),
            ],
            methods,
        },
    )
    .with_doc(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::tests::table;
    use serde_json::json;

    fn emit() -> Vec<GeneratedDeclaration> {
        let (ops, mut names) = table(json!({
            "openapi": "3.0.3",
            "info": { "title": "t", "version": "1" },
            "paths": {
                "/pets/{id}": {
                    "get": {
                        "operationId": "getPet",
                        "parameters": [{ "name": "id", "in": "path", "required": true, "schema": { "type": "integer" } }],
                        "responses": {
                            "200": { "description": "found", "content": { "application/json": { "schema": { "$ref": "#/components/schemas/Pet" } } } },
                            "4XX": { "description": "client error" },
                            "default": { "description": "unexpected" }
                        }
                    }
                }
            },
            "components": { "schemas": { "Pet": { "type": "object", "properties": { "name": { "type": "string" } } } } }
        }));
        let mut ctx = ExtensionContext {
            operations: &ops,
            names: &mut names,
        };
        ResponsesExtension.synthesize(&mut ctx).unwrap()
    }

    #[test]
    fn test_one_method_per_status() {
        let decls = emit();
        let response = decls.iter().find(|d| d.name == "GetPetResponse").unwrap();
        let names: Vec<&str> = response.methods().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Status200", "Status4XX", "Default", "Write"]);

        let ok = response.method("Status200").unwrap();
        assert_eq!(ok.params.len(), 1);
        assert_eq!(ok.params[0].ty, TypeDescriptor::named("Pet"));

        // ranges and default take the concrete status from the caller
        let range = response.method("Status4XX").unwrap();
        assert_eq!(range.params[0].name, "status");
        assert!(response.operation().is_some());
    }

    #[test]
    fn test_shared_writers() {
        let decls = emit();
        for name in ["WriteJSON", "WriteError", "WriteNoContent"] {
            let decl = decls.iter().find(|d| d.name == name).unwrap();
            assert!(decl.operation().is_none());
        }
    }
}
