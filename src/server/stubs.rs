use super::{handler_params, origin, ExtensionContext, ServerExtension};
use crate::declarations::{DeclBody, Expr, Field, FunctionDecl, GeneratedDeclaration, Section, Stmt};
use crate::error::ExtensionError;
use crate::naming::{NameKind, NamingRegistry};
use crate::operations::OperationSpec;
use crate::types::TypeDescriptor;

/// Status a stub answers with before it is overridden: the lowest declared
/// 2xx, or 501 when the operation declares none.
pub fn placeholder_status(op: &OperationSpec) -> u16 {
    op.success_status().unwrap_or(501)
}

pub struct StubsExtension;

impl ServerExtension for StubsExtension {
    fn name(&self) -> &'static str {
        "stubs"
    }

    fn section(&self) -> Section {
        Section::Stubs
    }

    fn synthesize(
        &self,
        ctx: &mut ExtensionContext<'_>,
    ) -> Result<Vec<GeneratedDeclaration>, ExtensionError> {
        let server = ctx.shared_name("StubServer", NameKind::Type);
        let constructor = ctx.shared_name("NewStubServer", NameKind::Function);

        let mut fields = Vec::new();
        let mut reset = Vec::new();
        let mut per_operation = Vec::new();

        // fields and methods share one namespace on the struct; operation
        // methods keep their interface names, so they are claimed first
        let mut members = NamingRegistry::new();
        for op in ctx.operations {
            members.assign_exact(&format!("method:{}", op.name), &op.name, NameKind::Field);
        }

        for op in ctx.operations {
            let field = members.assign_exact(&format!("field:{}", op.name), &format!("{}Func", op.name), NameKind::Field);
            let default = ctx.operation_name(op, "stub", format!("stub{}", op.name), NameKind::Function);
            let params = handler_params(op);
            let signature = TypeDescriptor::func(params.iter().map(|p| p.ty.clone()).collect(), vec![]);

            fields.push(Field::internal(&field, signature));
            reset.push(Stmt::assign(&format!("s.{field}"), Expr::ident(&default)));

            let mut stub = FunctionDecl::new(default.clone());
            let mut method = FunctionDecl::method(op.name.clone(), "s", &server);
            for param in &params {
                stub = stub.param(&param.name, param.ty.clone());
                method = method.param(&param.name, param.ty.clone());
            }
            let status = i64::from(placeholder_status(op));
            let stub = stub
                .body(vec![Stmt::Respond {
                    status: Expr::int(status),
                    body: None,
                }])
                .documented(&format!("Default behavior of {}: responds {status}.", op.name));
            per_operation.push(GeneratedDeclaration::new(
                default,
                Section::Stubs,
                origin(op),
                DeclBody::Function(stub),
            ));

            let args = params.iter().map(|p| Expr::ident(&p.name)).collect();
            let method = method.body(vec![Stmt::Eval(Expr::call(format!("s.{field}"), args))]);
            per_operation.push(GeneratedDeclaration::new(
                format!("{server}.{}", op.name),
                Section::Stubs,
                origin(op),
                DeclBody::Function(method),
            ));
        }

        let reset_name = members.assign_exact("reset", "Reset", NameKind::Field);
        let reset_method = FunctionDecl::method(reset_name.clone(), "s", &server)
            .body(reset)
            .documented(&format!("{reset_name} restores every operation to its default behavior."));

        let mut decls = vec![
            GeneratedDeclaration::shared(
                server.clone(),
                Section::Stubs,
                DeclBody::Struct {
                    fields,
                    methods: vec![reset_method],
                },
            )
            .documented(&format!(
                "{server} is a configurable stand-in. Assign a field to override one operation; set fields before serving."
            )),
            GeneratedDeclaration::shared(
                constructor.clone(),
                Section::Stubs,
                DeclBody::Function(
                    FunctionDecl::new(constructor)
                        .returns(TypeDescriptor::named(&server).pointer())
                        .body(vec![
                            Stmt::declare(
                                &["s"],
                                Expr::Composite {
                                    ty: TypeDescriptor::named(&server),
                                    fields: vec![],
                                }
                                .address_of(),
                            ),
                            Stmt::Eval(Expr::call(format!("s.{reset_name}"), vec![])),
                            Stmt::ret(vec![Expr::ident("s")]),
                        ]),
                ),
            ),
        ];
        decls.append(&mut per_operation);
        Ok(decls)
    }
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
                "/pets": {
                    "post": { "operationId": "createPet", "responses": { "201": { "description": "created" }, "202": { "description": "queued" } } },
                    "get": { "operationId": "listPets", "responses": { "default": { "description": "anything" } } }
                }
            }
        }));
        let mut ctx = ExtensionContext {
            operations: &ops,
            names: &mut names,
        };
        StubsExtension.synthesize(&mut ctx).unwrap()
    }

    fn status_of(decls: &[GeneratedDeclaration], name: &str) -> Expr {
        match &decls.iter().find(|d| d.name == name).unwrap().function().unwrap().body[0] {
            Stmt::Respond { status, .. } => status.clone(),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_field_per_operation_and_reset() {
        let decls = emit();
        let server = decls.iter().find(|d| d.name == "StubServer").unwrap();
        let fields: Vec<&str> = server.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(fields, vec!["ListPetsFunc", "CreatePetFunc"]);
        assert_eq!(server.method("Reset").unwrap().body.len(), 2);
        assert!(decls.iter().any(|d| d.name == "NewStubServer"));
    }

    #[test]
    fn test_operation_named_reset_keeps_members_distinct() {
        let (ops, mut names) = table(json!({
            "openapi": "3.0.3",
            "info": { "title": "t", "version": "1" },
            "paths": {
                "/state": {
                    "delete": { "operationId": "reset", "responses": { "204": { "description": "cleared" } } }
                }
            }
        }));
        let mut ctx = ExtensionContext {
            operations: &ops,
            names: &mut names,
        };
        let decls = StubsExtension.synthesize(&mut ctx).unwrap();
        let server = decls.iter().find(|d| d.name == "StubServer").unwrap();

        // the operation keeps its interface name; the restore method moves aside
        assert!(decls.iter().any(|d| d.name == "StubServer.Reset"));
        let restore: Vec<&str> = server.methods().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(restore, vec!["Reset2"]);
        assert_eq!(server.fields()[0].name, "ResetFunc");

        let constructor = decls.iter().find(|d| d.name == "NewStubServer").unwrap();
        assert_eq!(
            constructor.function().unwrap().body[1],
            Stmt::Eval(Expr::call("s.Reset2", vec![]))
        );
    }

    #[test]
    fn test_placeholder_statuses() {
        let decls = emit();
        assert_eq!(status_of(&decls, "stubCreatePet"), Expr::int(201));
        assert_eq!(status_of(&decls, "stubListPets"), Expr::int(501));
    }
}
