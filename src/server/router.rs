//! HTTP routers.
//!
//! Operations are first reduced to a declarative [`RouteSpec`] table. One
//! [`DispatchBuilder`] per strategy turns that table into a router
//! constructor; per-operation handlers are shared by every strategy and read
//! path parameters through an accessor the strategy supplies.

use super::{handler_params, origin, ExtensionContext, ServerExtension};
use crate::declarations::{
    Condition, DeclBody, Expr, Field, FunctionDecl, GeneratedDeclaration, MethodSig, Section, Stmt,
};
use crate::error::{ExtensionError, GenerateError};
use crate::naming::NameKind;
use crate::operations::{OperationSpec, OperationTable, ParamSpec};
use crate::parsers::{HttpMethod, ParameterLocation};
use crate::types::{runtime, Doc, TypeDescriptor};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterLibrary {
    Chi,
    Gorilla,
    Echo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterStrategy {
    /// Method+path patterns on the standard library multiplexer
    StdLib,
    /// Registration against an external routing library
    Delegate(RouterLibrary),
}

impl FromStr for RouterStrategy {
    type Err = GenerateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdlib" | "std" | "net-http" => Ok(RouterStrategy::StdLib),
            "chi" => Ok(RouterStrategy::Delegate(RouterLibrary::Chi)),
            "gorilla" | "mux" => Ok(RouterStrategy::Delegate(RouterLibrary::Gorilla)),
            "echo" => Ok(RouterStrategy::Delegate(RouterLibrary::Echo)),
            _ => Err(GenerateError::InvalidRouterStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for RouterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RouterStrategy::StdLib => "stdlib",
            RouterStrategy::Delegate(RouterLibrary::Chi) => "chi",
            RouterStrategy::Delegate(RouterLibrary::Gorilla) => "gorilla",
            RouterStrategy::Delegate(RouterLibrary::Echo) => "echo",
        };
        f.write_str(name)
    }
}

/// One row of the dispatch table.
#[derive(Debug, Clone)]
pub struct RouteSpec {
    pub operation: String,
    pub method: HttpMethod,
    /// Path template as declared, `/pets/{id}`
    pub path: String,
    pub path_params: Vec<ParamSpec>,
    /// Per-operation handler constructor
    pub handler: String,
}

impl RouteSpec {
    pub fn table(operations: &OperationTable, handler_names: &[String]) -> Vec<RouteSpec> {
        operations
            .iter()
            .zip(handler_names)
            .map(|(op, handler)| RouteSpec {
                operation: op.name.clone(),
                method: op.method,
                path: op.path.clone(),
                path_params: op.params_in(ParameterLocation::Path).cloned().collect(),
                handler: handler.clone(),
            })
            .collect()
    }
}

/// Names of the shared router declarations.
pub struct RouterNames {
    pub server: String,
    pub middleware: String,
    pub error_handler: String,
    pub path_param: String,
    pub options: String,
    pub parameter_error: String,
    pub new_parameter_error: String,
    pub apply: String,
    pub default_error_handler: String,
    pub new_router: String,
}

/// Builds the router constructor for one strategy from the route table.
pub trait DispatchBuilder {
    /// Path as the library spells it.
    fn path_pattern(&self, route: &RouteSpec) -> String;

    /// Expression of type `func(*http.Request, string) string`.
    fn path_accessor(&self) -> Expr;

    fn constructor(&self, routes: &[RouteSpec], names: &RouterNames) -> FunctionDecl;
}

fn wrapped_handler(route: &RouteSpec, accessor: Expr, names: &RouterNames) -> Expr {
    Expr::call(
        names.apply.clone(),
        vec![
            Expr::call(
                route.handler.clone(),
                vec![Expr::ident("si"), Expr::ident("opts"), accessor],
            ),
            Expr::ident("opts.Middlewares"),
        ],
    )
}

fn constructor_shell(names: &RouterNames, returns: TypeDescriptor, mut body: Vec<Stmt>) -> FunctionDecl {
    let mut stmts = vec![Stmt::when(
        Condition::is_nil(Expr::ident("opts.ErrorHandler")),
        vec![Stmt::assign("opts.ErrorHandler", Expr::ident(&names.default_error_handler))],
    )];
    stmts.append(&mut body);
    FunctionDecl::new(names.new_router.clone())
        .param("si", TypeDescriptor::named(&names.server))
        .param("opts", TypeDescriptor::named(&names.options))
        .returns(returns)
        .body(stmts)
}

pub struct StdLibDispatch;

impl DispatchBuilder for StdLibDispatch {
    fn path_pattern(&self, route: &RouteSpec) -> String {
        format!("{} {}", route.method, route.path)
    }

    fn path_accessor(&self) -> Expr {
        Expr::ident("(*http.Request).PathValue")
    }

    fn constructor(&self, routes: &[RouteSpec], names: &RouterNames) -> FunctionDecl {
        let mut body = vec![Stmt::declare(&["mux"], Expr::call("http.NewServeMux", vec![]))];
        for route in routes {
            body.push(Stmt::Eval(Expr::call(
                "mux.Handle",
                vec![
                    Expr::str(self.path_pattern(route)),
                    wrapped_handler(route, self.path_accessor(), names),
                ],
            )));
        }
        body.push(Stmt::ret(vec![Expr::ident("mux")]));
        constructor_shell(names, runtime::handler(), body)
            .documented("Routes every operation on a standard library ServeMux.")
    }
}

pub struct DelegateDispatch {
    pub library: RouterLibrary,
}

impl DispatchBuilder for DelegateDispatch {
    fn path_pattern(&self, route: &RouteSpec) -> String {
        match self.library {
            RouterLibrary::Chi | RouterLibrary::Gorilla => route.path.clone(),
            RouterLibrary::Echo => route
                .path
                .split('/')
                .map(|segment| match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Some(name) => format!(":{name}"),
                    None => segment.to_string(),
                })
                .collect::<Vec<_>>()
                .join("/"),
        }
    }

    fn path_accessor(&self) -> Expr {
        match self.library {
            RouterLibrary::Chi => Expr::ident("chi.URLParam"),
            RouterLibrary::Gorilla => Expr::closure(
                FunctionDecl::new("")
                    .param("r", runtime::request())
                    .param("name", runtime::string())
                    .returns(runtime::string())
                    .body(vec![Stmt::ret(vec![Expr::index(
                        Expr::call("mux.Vars", vec![Expr::ident("r")]),
                        Expr::ident("name"),
                    )])]),
            ),
            // echo keeps path values on its own context, captured per request
            RouterLibrary::Echo => Expr::closure(
                FunctionDecl::new("")
                    .param("_", runtime::request())
                    .param("name", runtime::string())
                    .returns(runtime::string())
                    .body(vec![Stmt::ret(vec![Expr::call("c.Param", vec![Expr::ident("name")])])]),
            ),
        }
    }

    fn constructor(&self, routes: &[RouteSpec], names: &RouterNames) -> FunctionDecl {
        let (init, returns) = match self.library {
            RouterLibrary::Chi => (
                Stmt::declare(&["router"], Expr::call("chi.NewRouter", vec![])),
                TypeDescriptor::external("chi", "Router"),
            ),
            RouterLibrary::Gorilla => (
                Stmt::declare(&["router"], Expr::call("mux.NewRouter", vec![])),
                TypeDescriptor::external("mux", "Router").pointer(),
            ),
            RouterLibrary::Echo => (
                Stmt::declare(&["router"], Expr::call("echo.New", vec![])),
                TypeDescriptor::external("echo", "Echo").pointer(),
            ),
        };

        let mut body = vec![init];
        for route in routes {
            let method = Expr::str(route.method.as_str());
            let pattern = self.path_pattern(route);
            let handler = wrapped_handler(route, self.path_accessor(), names);
            body.push(match self.library {
                RouterLibrary::Chi => Stmt::Eval(Expr::call(
                    "router.Method",
                    vec![method, Expr::str(pattern), handler],
                )),
                RouterLibrary::Gorilla => Stmt::Eval(Expr::call(
                    format!("router.Methods(\"{}\").Path(\"{pattern}\").Handler", route.method),
                    vec![handler],
                )),
                RouterLibrary::Echo => {
                    let serve = FunctionDecl::new("")
                        .param("c", TypeDescriptor::external("echo", "Context"))
                        .returns(runtime::error())
                        .body(vec![
                            Stmt::declare(&["h"], handler),
                            Stmt::Eval(Expr::call(
                                "h.ServeHTTP",
                                vec![Expr::call("c.Response", vec![]), Expr::call("c.Request", vec![])],
                            )),
                            Stmt::ret(vec![Expr::Nil]),
                        ]);
                    Stmt::Eval(Expr::call(
                        "router.Add",
                        vec![method, Expr::str(pattern), Expr::closure(serve)],
                    ))
                }
            });
        }
        body.push(Stmt::ret(vec![Expr::ident("router")]));

        let library = match self.library {
            RouterLibrary::Chi => "chi",
            RouterLibrary::Gorilla => "gorilla/mux",
            RouterLibrary::Echo => "echo",
        };
        constructor_shell(names, returns, body)
            .documented(&format!("Registers every operation on a {library} router."))
    }
}

pub struct RouterExtension {
    strategy: RouterStrategy,
}

impl RouterExtension {
    pub fn new(strategy: RouterStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> RouterStrategy {
        self.strategy
    }

    fn builder(&self) -> Box<dyn DispatchBuilder> {
        match self.strategy {
            RouterStrategy::StdLib => Box::new(StdLibDispatch),
            RouterStrategy::Delegate(library) => Box::new(DelegateDispatch { library }),
        }
    }
}

impl ServerExtension for RouterExtension {
    fn name(&self) -> &'static str {
        "router"
    }

    fn section(&self) -> Section {
        Section::Router
    }

    fn synthesize(
        &self,
        ctx: &mut ExtensionContext<'_>,
    ) -> Result<Vec<GeneratedDeclaration>, ExtensionError> {
        let names = RouterNames {
            server: ctx.shared_name("ServerInterface", NameKind::Type),
            middleware: ctx.shared_name("MiddlewareFunc", NameKind::Type),
            error_handler: ctx.shared_name("ErrorHandlerFunc", NameKind::Type),
            path_param: ctx.shared_name("PathParamFunc", NameKind::Type),
            options: ctx.shared_name("RouterOptions", NameKind::Type),
            parameter_error: ctx.shared_name("ParameterError", NameKind::Type),
            new_parameter_error: ctx.shared_name("NewParameterError", NameKind::Function),
            apply: ctx.shared_name("applyMiddleware", NameKind::Function),
            default_error_handler: ctx.shared_name("defaultErrorHandler", NameKind::Function),
            new_router: ctx.shared_name("NewRouter", NameKind::Function),
        };

        let operations = ctx.operations;
        let handler_names: Vec<String> = operations
            .iter()
            .map(|op| ctx.operation_name(op, "handler", format!("handle{}", op.name), NameKind::Function))
            .collect();
        let routes = RouteSpec::table(operations, &handler_names);

        let mut decls = shared_declarations(operations, &names);
        for (op, route) in operations.iter().zip(&routes) {
            decls.push(handler(op, route, &names));
        }

        let constructor = self.builder().constructor(&routes, &names);
        decls.push(
            GeneratedDeclaration::shared(names.new_router.clone(), Section::Router, DeclBody::Function(constructor)),
        );
        Ok(decls)
    }
}

fn shared_declarations(operations: &OperationTable, names: &RouterNames) -> Vec<GeneratedDeclaration> {
    let methods = operations
        .iter()
        .map(|op| MethodSig {
            name: op.name.clone(),
            params: handler_params(op),
            returns: vec![],
            doc: op.doc.clone(),
        })
        .collect();

    let error_handler_ty = TypeDescriptor::func(
        vec![runtime::response_writer(), runtime::request(), runtime::error()],
        vec![],
    );

    let parameter_error_methods = vec![
        FunctionDecl::method("Error", "e", &names.parameter_error)
            .returns(runtime::string())
            .body(vec![Stmt::ret(vec![Expr::Concat {
                parts: vec![
                    Expr::str("invalid parameter "),
                    Expr::ident("e.Parameter"),
                    Expr::str(": "),
                    Expr::call("e.Err.Error", vec![]),
                ],
            }])]),
        FunctionDecl::method("Unwrap", "e", &names.parameter_error)
            .returns(runtime::error())
            .body(vec![Stmt::ret(vec![Expr::ident("e.Err")])]),
    ];

    vec![
        GeneratedDeclaration::shared(
            names.server.clone(),
            Section::Router,
            DeclBody::Interface { methods },
        )
        .documented("ServerInterface is implemented by the application, one method per operation."),
        GeneratedDeclaration::shared(
            names.middleware.clone(),
            Section::Router,
            DeclBody::Alias {
                target: TypeDescriptor::func(vec![runtime::handler()], vec![runtime::handler()]),
            },
        ),
        GeneratedDeclaration::shared(
            names.error_handler.clone(),
            Section::Router,
            DeclBody::Alias {
                target: error_handler_ty,
            },
        ),
        GeneratedDeclaration::shared(
            names.path_param.clone(),
            Section::Router,
            DeclBody::Alias {
                target: TypeDescriptor::func(
                    vec![runtime::request(), runtime::string()],
                    vec![runtime::string()],
                ),
            },
        ),
        GeneratedDeclaration::shared(
            names.options.clone(),
            Section::Router,
            DeclBody::Struct {
                fields: vec![
                    Field::internal(
                        "Middlewares",
                        TypeDescriptor::sequence(TypeDescriptor::named(&names.middleware)),
                    )
                    .with_doc(Doc::from_text("Applied in order; the last one runs outermost.")),
                    Field::internal("ErrorHandler", TypeDescriptor::named(&names.error_handler)),
                ],
                methods: vec![],
            },
        ),
        GeneratedDeclaration::shared(
            names.parameter_error.clone(),
            Section::Router,
            DeclBody::Struct {
                fields: vec![
                    Field::internal("Parameter", runtime::string()),
                    Field::internal("Err", runtime::error()),
                ],
                methods: parameter_error_methods,
            },
        )
        .documented("ParameterError names the path parameter that failed to parse."),
        GeneratedDeclaration::shared(
            names.new_parameter_error.clone(),
            Section::Router,
            DeclBody::Function(
                FunctionDecl::new(names.new_parameter_error.clone())
                    .param("name", runtime::string())
                    .param("err", runtime::error())
                    .returns(runtime::error())
                    .body(vec![Stmt::ret(vec![Expr::Composite {
                        ty: TypeDescriptor::named(&names.parameter_error),
                        fields: vec![
                            ("Parameter".to_string(), Expr::ident("name")),
                            ("Err".to_string(), Expr::ident("err")),
                        ],
                    }
                    .address_of()])]),
            ),
        ),
        GeneratedDeclaration::shared(
            names.apply.clone(),
            Section::Router,
            DeclBody::Function(
                FunctionDecl::new(names.apply.clone())
                    .param("h", runtime::handler())
                    .param(
                        "middlewares",
                        TypeDescriptor::sequence(TypeDescriptor::named(&names.middleware)),
                    )
                    .returns(runtime::handler())
                    .body(vec![
                        Stmt::ForEach {
                            item: "m".to_string(),
                            over: Expr::ident("middlewares"),
                            body: vec![Stmt::assign("h", Expr::call("m", vec![Expr::ident("h")]))],
                        },
                        Stmt::ret(vec![Expr::ident("h")]),
                    ]),
            ),
        ),
        GeneratedDeclaration::shared(
            names.default_error_handler.clone(),
            Section::Router,
            DeclBody::Function(
                FunctionDecl::new(names.default_error_handler.clone())
                    .param("w", runtime::response_writer())
                    .param("r", runtime::request())
                    .param("err", runtime::error())
                    .body(vec![Stmt::Respond {
                        status: Expr::ident("http.StatusBadRequest"),
                        body: Some(Expr::call("err.Error", vec![])),
                    }]),
            ),
        ),
    ]
}

/// Per-operation handler: reads and converts path parameters, then calls the
/// server interface. A conversion failure goes to the error handler with the
/// parameter name and never reaches the application.
fn handler(op: &OperationSpec, route: &RouteSpec, names: &RouterNames) -> GeneratedDeclaration {
    let mut body = Vec::new();
    let mut args = vec![Expr::ident("w"), Expr::ident("r")];

    for param in &route.path_params {
        let raw = Expr::call("pathParam", vec![Expr::ident("r"), Expr::str(&param.name)]);
        if param.needs_parse() {
            body.push(Stmt::Parse {
                param: param.name.clone(),
                source: raw,
                ty: param.base.clone(),
                bind: param.var.clone(),
                on_error: vec![
                    Stmt::Eval(Expr::call(
                        "opts.ErrorHandler",
                        vec![
                            Expr::ident("w"),
                            Expr::ident("r"),
                            Expr::call(
                                names.new_parameter_error.clone(),
                                vec![Expr::str(&param.name), Expr::ident("err")],
                            ),
                        ],
                    )),
                    Stmt::ret(vec![]),
                ],
            });
        } else {
            body.push(Stmt::declare(&[param.var.as_str()], raw));
        }
        args.push(Expr::ident(&param.var));
    }
    body.push(Stmt::Eval(Expr::call(format!("si.{}", op.name), args)));

    let serve = FunctionDecl::new("")
        .param("w", runtime::response_writer())
        .param("r", runtime::request())
        .body(body);

    let func = FunctionDecl::new(route.handler.clone())
        .param("si", TypeDescriptor::named(&names.server))
        .param("opts", TypeDescriptor::named(&names.options))
        .param("pathParam", TypeDescriptor::named(&names.path_param))
        .returns(runtime::handler())
        .body(vec![Stmt::ret(vec![Expr::call(
            "http.HandlerFunc",
            vec![Expr::closure(serve)],
        )])]);

    GeneratedDeclaration::new(route.handler.clone(), Section::Router, origin(op), DeclBody::Function(func))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::tests::table;
    use serde_json::json;

    fn document() -> serde_json::Value {
        json!({
            "openapi": "3.0.3",
            "info": { "title": "t", "version": "1" },
            "paths": {
                "/pets/{petId}/toys/{name}": {
                    "get": {
                        "operationId": "getToy",
                        "parameters": [
                            { "name": "petId", "in": "path", "required": true, "schema": { "type": "integer" } },
                            { "name": "name", "in": "path", "required": true, "schema": { "type": "string" } }
                        ],
                        "responses": { "200": { "description": "ok" } }
                    }
                }
            }
        })
    }

    fn emit(strategy: RouterStrategy) -> Vec<GeneratedDeclaration> {
        let (ops, mut names) = table(document());
        let mut ctx = ExtensionContext {
            operations: &ops,
            names: &mut names,
        };
        RouterExtension::new(strategy).synthesize(&mut ctx).unwrap()
    }

    #[test]
    fn test_strategy_names() {
        for (name, strategy) in [
            ("stdlib", RouterStrategy::StdLib),
            ("net-http", RouterStrategy::StdLib),
            ("CHI", RouterStrategy::Delegate(RouterLibrary::Chi)),
            ("mux", RouterStrategy::Delegate(RouterLibrary::Gorilla)),
            ("echo", RouterStrategy::Delegate(RouterLibrary::Echo)),
        ] {
            assert_eq!(name.parse::<RouterStrategy>().unwrap(), strategy);
        }
        assert!("fiber".parse::<RouterStrategy>().is_err());
    }

    #[test]
    fn test_integer_path_param_parse_is_guarded() {
        let decls = emit(RouterStrategy::StdLib);
        let handler = decls
            .iter()
            .find(|d| d.name == "handleGetToy")
            .and_then(|d| d.function())
            .unwrap();

        let parses: Vec<&Stmt> = handler
            .statements()
            .into_iter()
            .filter(|s| matches!(s, Stmt::Parse { .. }))
            .collect();
        assert_eq!(parses.len(), 1);

        let Stmt::Parse { param, on_error, .. } = parses[0] else { unreachable!() };
        assert_eq!(param, "petId");
        let Some(Stmt::Eval(Expr::Call { target, args })) = on_error.first() else {
            panic!("expected error handler call");
        };
        assert_eq!(target, "opts.ErrorHandler");
        assert!(matches!(
            &args[2],
            Expr::Call { target, args } if target == "NewParameterError" && args[0] == Expr::str("petId")
        ));
        assert!(matches!(on_error.last(), Some(Stmt::Return(_))));
    }

    #[test]
    fn test_dispatch_patterns_per_strategy() {
        let route = RouteSpec {
            operation: "GetToy".into(),
            method: HttpMethod::Get,
            path: "/pets/{petId}/toys/{name}".into(),
            path_params: vec![],
            handler: "handleGetToy".into(),
        };
        assert_eq!(StdLibDispatch.path_pattern(&route), "GET /pets/{petId}/toys/{name}");
        assert_eq!(
            DelegateDispatch { library: RouterLibrary::Chi }.path_pattern(&route),
            "/pets/{petId}/toys/{name}"
        );
        assert_eq!(
            DelegateDispatch { library: RouterLibrary::Echo }.path_pattern(&route),
            "/pets/:petId/toys/:name"
        );
    }

    #[test]
    fn test_every_strategy_registers_every_route() {
        for strategy in [
            RouterStrategy::StdLib,
            RouterStrategy::Delegate(RouterLibrary::Chi),
            RouterStrategy::Delegate(RouterLibrary::Gorilla),
            RouterStrategy::Delegate(RouterLibrary::Echo),
        ] {
            let decls = emit(strategy);
            let router = decls
                .iter()
                .find(|d| d.name == "NewRouter")
                .and_then(|d| d.function())
                .unwrap();
            let registrations = router
                .body
                .iter()
                .filter(|s| matches!(s, Stmt::Eval(_)))
                .count();
            assert_eq!(registrations, 1, "{strategy}");

            let server = decls.iter().find(|d| d.name == "ServerInterface").unwrap();
            let DeclBody::Interface { methods } = &server.body else {
                panic!("expected interface");
            };
            assert_eq!(methods[0].params.len(), 4);
        }
    }
}
