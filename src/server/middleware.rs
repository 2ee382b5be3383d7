use super::{ExtensionContext, ServerExtension};
use crate::declarations::{
    Condition, DeclBody, Expr, Field, FunctionDecl, GeneratedDeclaration, Section, Stmt,
};
use crate::error::ExtensionError;
use crate::naming::NameKind;
use crate::types::{runtime, Doc, TypeDescriptor};

pub struct MiddlewareExtension;

impl ServerExtension for MiddlewareExtension {
    fn name(&self) -> &'static str {
        "middleware"
    }

    fn section(&self) -> Section {
        Section::Middleware
    }

    fn synthesize(
        &self,
        ctx: &mut ExtensionContext<'_>,
    ) -> Result<Vec<GeneratedDeclaration>, ExtensionError> {
        let options = ctx.shared_name("ValidationOptions", NameKind::Type);
        let request_validator = ctx.shared_name("RequestValidatorFunc", NameKind::Type);
        let response_validator = ctx.shared_name("ResponseValidatorFunc", NameKind::Type);
        let capture = ctx.shared_name("responseCapture", NameKind::Type);
        let middleware = ctx.shared_name("ValidationMiddleware", NameKind::Function);
        let operations = ctx.shared_name("ValidatedOperations", NameKind::Variable);

        let error_handler = TypeDescriptor::func(
            vec![runtime::response_writer(), runtime::request(), runtime::error()],
            vec![],
        );
        let response_hook = TypeDescriptor::func(vec![runtime::request(), runtime::error()], vec![]);

        let mut decls = vec![
            GeneratedDeclaration::shared(
                options.clone(),
                Section::Middleware,
                DeclBody::Struct {
                    fields: vec![
                        Field::internal("RequestValidation", runtime::boolean()),
                        Field::internal("ResponseValidation", runtime::boolean()),
                        Field::internal("StrictMode", runtime::boolean()).with_doc(Doc::from_text(
                            "StrictMode replaces a response that fails validation with a 500. Otherwise the captured response is forwarded unchanged.",
                        )),
                        Field::internal("ErrorHandler", error_handler).with_doc(Doc::from_text(
                            "ErrorHandler answers a request that fails validation. Defaults to a 400.",
                        )),
                        Field::internal("OnResponseError", response_hook).with_doc(Doc::from_text(
                            "OnResponseError, when set, is told about a response that failed validation outside strict mode.",
                        )),
                    ],
                    methods: vec![],
                },
            )
            .documented("ValidationOptions configures ValidationMiddleware."),
            GeneratedDeclaration::shared(
                request_validator.clone(),
                Section::Middleware,
                DeclBody::Alias {
                    target: TypeDescriptor::func(vec![runtime::request()], vec![runtime::error()]),
                },
            ),
            GeneratedDeclaration::shared(
                response_validator.clone(),
                Section::Middleware,
                DeclBody::Alias {
                    target: TypeDescriptor::func(
                        vec![runtime::request(), runtime::int(), runtime::bytes()],
                        vec![runtime::error()],
                    ),
                },
            ),
        ];

        let entries = ctx
            .operations
            .iter()
            .map(|op| (op.name.clone(), Expr::str(format!("{} {}", op.method, op.path))))
            .collect();
        decls.push(
            GeneratedDeclaration::shared(
                operations,
                Section::Middleware,
                DeclBody::Variable {
                    ty: TypeDescriptor::map_of(runtime::string()),
                    value: Expr::MapLit {
                        ty: TypeDescriptor::map_of(runtime::string()),
                        entries,
                    },
                },
            )
            .documented("Operations covered by the validation middleware, keyed by name."),
        );

        let header = FunctionDecl::method("Header", "c", &capture)
            .returns(TypeDescriptor::external("http", "Header"))
            .body(vec![Stmt::ret(vec![Expr::call("c.w.Header", vec![])])]);
        let write_header = FunctionDecl::method("WriteHeader", "c", &capture)
            .param("status", runtime::int())
            .body(vec![Stmt::assign("c.status", Expr::ident("status"))]);
        let write = FunctionDecl::method("Write", "c", &capture)
            .param("p", runtime::bytes())
            .returns(runtime::int())
            .returns(runtime::error())
            .body(vec![Stmt::ret(vec![Expr::call("c.body.Write", vec![Expr::ident("p")])])]);
        decls.push(GeneratedDeclaration::shared(
            capture.clone(),
            Section::Middleware,
            DeclBody::Struct {
                fields: vec![
                    Field::internal("w", runtime::response_writer()),
                    Field::internal("status", runtime::int()),
                    Field::internal("body", TypeDescriptor::external("bytes", "Buffer")),
                ],
                methods: vec![header, write_header, write],
            },
        ));

        decls.push(GeneratedDeclaration::shared(
            middleware.clone(),
            Section::Middleware,
            DeclBody::Function(wrapper(&middleware, &options, &request_validator, &response_validator, &capture)),
        ));
        Ok(decls)
    }
}

fn report(err: Expr) -> Stmt {
    Stmt::Eval(Expr::call(
        "opts.ErrorHandler",
        vec![Expr::ident("w"), Expr::ident("r"), err],
    ))
}

fn wrapper(
    name: &str,
    options: &str,
    request_validator: &str,
    response_validator: &str,
    capture: &str,
) -> FunctionDecl {
    let validate_request = Stmt::when(
        Condition::truthy(Expr::ident("opts.RequestValidation")),
        vec![Stmt::when(
            Condition::is_nil(Expr::ident("validateRequest")).negate(),
            vec![
                Stmt::declare(&["err"], Expr::call("validateRequest", vec![Expr::ident("r")])),
                Stmt::when(
                    Condition::error_set("err"),
                    vec![report(Expr::ident("err")), Stmt::ret(vec![])],
                ),
            ],
        )],
    );

    let serve = FunctionDecl::new("")
        .param("w", runtime::response_writer())
        .param("r", runtime::request())
        .body(vec![
            validate_request,
            Stmt::when(
                Condition::truthy(Expr::ident("opts.ResponseValidation")),
                vec![Stmt::when(
                    Condition::is_nil(Expr::ident("validateResponse")).negate(),
                    forward_validated(capture),
                )],
            ),
            Stmt::Eval(Expr::call("next.ServeHTTP", vec![Expr::ident("w"), Expr::ident("r")])),
        ]);

    let wrap = FunctionDecl::new("")
        .param("next", runtime::handler())
        .returns(runtime::handler())
        .body(vec![Stmt::ret(vec![Expr::call(
            "http.HandlerFunc",
            vec![Expr::closure(serve)],
        )])]);

    FunctionDecl::new(name)
        .param("opts", TypeDescriptor::named(options))
        .param("validateRequest", TypeDescriptor::named(request_validator))
        .param("validateResponse", TypeDescriptor::named(response_validator))
        .returns(TypeDescriptor::func(vec![runtime::handler()], vec![runtime::handler()]))
        .body(vec![
            Stmt::when(
                Condition::is_nil(Expr::ident("opts.ErrorHandler")),
                vec![Stmt::assign(
                    "opts.ErrorHandler",
                    Expr::closure(
                        FunctionDecl::new("")
                            .param("w", runtime::response_writer())
                            .param("r", runtime::request())
                            .param("err", runtime::error())
                            .body(vec![Stmt::Respond {
                                status: Expr::ident("http.StatusBadRequest"),
                                body: Some(Expr::call("err.Error", vec![])),
                            }]),
                    ),
                )],
            ),
            Stmt::ret(vec![Expr::closure(wrap)]),
        ])
        .documented(&format!(
            "{name} validates each request before delegating and, when enabled, the response before it reaches the client."
        ))
}

/// Buffer the response, validate it, then write it exactly once: a 500 in
/// strict mode, otherwise the captured status and body.
fn forward_validated(capture: &str) -> Vec<Stmt> {
    vec![
        Stmt::declare(
            &["capture"],
            Expr::Composite {
                ty: TypeDescriptor::named(capture),
                fields: vec![
                    ("w".to_string(), Expr::ident("w")),
                    ("status".to_string(), Expr::ident("http.StatusOK")),
                ],
            }
            .address_of(),
        ),
        Stmt::Eval(Expr::call("next.ServeHTTP", vec![Expr::ident("capture"), Expr::ident("r")])),
        Stmt::declare(
            &["err"],
            Expr::call(
                "validateResponse",
                vec![
                    Expr::ident("r"),
                    Expr::ident("capture.status"),
                    Expr::call("capture.body.Bytes", vec![]),
                ],
            ),
        ),
        Stmt::when(
            Condition::error_set("err"),
            vec![
                Stmt::when(
                    Condition::truthy(Expr::ident("opts.StrictMode")),
                    vec![
                        Stmt::Respond {
                            status: Expr::ident("http.StatusInternalServerError"),
                            body: Some(Expr::call("err.Error", vec![])),
                        },
                        Stmt::ret(vec![]),
                    ],
                ),
                Stmt::when(
                    Condition::is_nil(Expr::ident("opts.OnResponseError")).negate(),
                    vec![Stmt::Eval(Expr::call(
                        "opts.OnResponseError",
                        vec![Expr::ident("r"), Expr::ident("err")],
                    ))],
                ),
            ],
        ),
        Stmt::Eval(Expr::call("w.WriteHeader", vec![Expr::ident("capture.status")])),
        Stmt::Eval(Expr::call("w.Write", vec![Expr::call("capture.body.Bytes", vec![])])),
        Stmt::ret(vec![]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::tests::table;
    use serde_json::json;

    #[test]
    fn test_options_and_wrapper() {
        let (ops, mut names) = table(json!({
            "openapi": "3.0.3",
            "info": { "title": "t", "version": "1" },
            "paths": { "/a": { "get": { "operationId": "a", "responses": { "200": { "description": "ok" } } } } }
        }));
        let mut ctx = ExtensionContext {
            operations: &ops,
            names: &mut names,
        };
        let decls = MiddlewareExtension.synthesize(&mut ctx).unwrap();

        let options = decls.iter().find(|d| d.name == "ValidationOptions").unwrap();
        let fields: Vec<&str> = options.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "RequestValidation",
                "ResponseValidation",
                "StrictMode",
                "ErrorHandler",
                "OnResponseError"
            ]
        );

        let wrapper = decls
            .iter()
            .find(|d| d.name == "ValidationMiddleware")
            .and_then(|d| d.function())
            .unwrap();
        assert_eq!(wrapper.signature().to_string().matches("http.Handler").count(), 2);
        assert!(decls.iter().all(|d| d.operation().is_none()));
    }

    fn writes(block: &[Stmt]) -> usize {
        block
            .iter()
            .map(|s| match s {
                Stmt::Respond { .. } => 1,
                Stmt::Eval(Expr::Call { target, .. }) if target == "w.WriteHeader" || target == "opts.ErrorHandler" => 1,
                Stmt::If { then, otherwise, .. } => writes(then) + writes(otherwise),
                _ => 0,
            })
            .sum()
    }

    #[test]
    fn test_failed_response_is_written_once() {
        let body = forward_validated("responseCapture");
        let Some(Stmt::If { then, .. }) = body.iter().find(|s| matches!(s, Stmt::If { .. })) else {
            panic!("expected the validation failure branch");
        };

        // strict: a 500 and nothing after it
        let Stmt::If { then: strict, .. } = &then[0] else {
            panic!("expected the strict branch first");
        };
        assert_eq!(
            strict[0],
            Stmt::Respond {
                status: Expr::ident("http.StatusInternalServerError"),
                body: Some(Expr::call("err.Error", vec![])),
            }
        );
        assert_eq!(strict[1], Stmt::ret(vec![]));

        // otherwise only the hook runs, and the captured response is the one write
        assert_eq!(writes(&then[1..]), 0);
        assert_eq!(writes(&body), 2);
    }
}
