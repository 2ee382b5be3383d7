//! OpenID Connect discovery.

use super::oauth2::{flow_method, form, token_runtime, TokenRuntime};
use super::{double_checked, schemes, SecurityEmitter};
use crate::declarations::{
    DeclBody, Expr, Field, FunctionDecl, GeneratedDeclaration, Literal, Section, Stmt,
};
use crate::naming::NameKind;
use crate::parsers::FlowKind;
use crate::types::{runtime, TypeDescriptor};

/// Shared discovery document and endpoint pair, declared once.
fn discovery_types(em: &mut SecurityEmitter<'_>) -> (String, String) {
    let configuration = em.runtime("OIDCConfiguration", NameKind::Type);
    let endpoint = em.runtime("OAuth2Endpoint", NameKind::Type);

    let (c, e) = (configuration.clone(), endpoint.clone());
    em.once("oidc_types", move |em| {
        em.push(
            GeneratedDeclaration::shared(
                c,
                Section::Security,
                DeclBody::Struct {
                    fields: vec![
                        Field::wire("Issuer", "issuer", runtime::string()),
                        Field::wire("AuthorizationEndpoint", "authorization_endpoint", runtime::string()),
                        Field::wire("TokenEndpoint", "token_endpoint", runtime::string()),
                        Field::wire("UserinfoEndpoint", "userinfo_endpoint", runtime::string()),
                        Field::wire("JWKSURI", "jwks_uri", runtime::string()),
                        Field::wire("ScopesSupported", "scopes_supported", runtime::strings()),
                    ],
                    methods: vec![],
                },
            )
            .documented("OIDCConfiguration is the provider metadata served at the discovery URL."),
        );
        em.push(GeneratedDeclaration::shared(
            e,
            Section::Security,
            DeclBody::Struct {
                fields: vec![
                    Field::internal("AuthorizationURL", runtime::string()),
                    Field::internal("TokenURL", runtime::string()),
                ],
                methods: vec![],
            },
        ));
    });

    (configuration, endpoint)
}

/// `{F}OAuth2Client` for a discovered provider. Unlike a client for declared
/// flows it carries its endpoints, filled in by the discovery client.
fn flow_client(em: &mut SecurityEmitter<'_>, fragment: &str, endpoint: &str, rt: &TokenRuntime) -> String {
    let name = em.claim(
        &format!("scheme:{fragment}:client"),
        &format!("{fragment}OAuth2Client"),
        NameKind::Type,
    );
    let token_ptr = TypeDescriptor::named(&rt.token).pointer();
    let request = |entries: Vec<(&str, Expr)>| -> Vec<Stmt> {
        vec![
            Stmt::declare(&["form"], form(entries)),
            Stmt::ret(vec![Expr::call(
                rt.request_token.clone(),
                vec![
                    Expr::ident("ctx"),
                    Expr::ident("c.HTTPClient"),
                    Expr::ident("c.Endpoint.TokenURL"),
                    Expr::ident("form"),
                ],
            )]),
        ]
    };

    let exchange = FunctionDecl::method(flow_method(FlowKind::AuthorizationCode), "c", &name)
        .param("ctx", runtime::context())
        .param("code", runtime::string())
        .param("verifier", runtime::string())
        .returns(token_ptr.clone())
        .returns(runtime::error())
        .body(request(vec![
            ("grant_type", Expr::str(FlowKind::AuthorizationCode.grant_type())),
            ("code", Expr::ident("code")),
            ("redirect_uri", Expr::ident("c.RedirectURL")),
            ("client_id", Expr::ident("c.ClientID")),
            ("client_secret", Expr::ident("c.ClientSecret")),
            ("code_verifier", Expr::ident("verifier")),
        ]));
    let client_credentials = FunctionDecl::method(flow_method(FlowKind::ClientCredentials), "c", &name)
        .param("ctx", runtime::context())
        .param("scopes", runtime::strings())
        .returns(token_ptr.clone())
        .returns(runtime::error())
        .body(request(vec![
            ("grant_type", Expr::str(FlowKind::ClientCredentials.grant_type())),
            ("client_id", Expr::ident("c.ClientID")),
            ("client_secret", Expr::ident("c.ClientSecret")),
            (
                "scope",
                Expr::call("strings.Join", vec![Expr::ident("scopes"), Expr::str(" ")]),
            ),
        ]));
    let refresh = FunctionDecl::method("RefreshToken", "c", &name)
        .param("ctx", runtime::context())
        .param("refreshToken", runtime::string())
        .returns(token_ptr)
        .returns(runtime::error())
        .body(request(vec![
            ("grant_type", Expr::str("refresh_token")),
            ("refresh_token", Expr::ident("refreshToken")),
            ("client_id", Expr::ident("c.ClientID")),
            ("client_secret", Expr::ident("c.ClientSecret")),
        ]));

    em.push(
        GeneratedDeclaration::shared(
            name.clone(),
            Section::Security,
            DeclBody::Struct {
                fields: vec![
                    Field::internal("ClientID", runtime::string()),
                    Field::internal("ClientSecret", runtime::string()),
                    Field::internal("RedirectURL", runtime::string()),
                    Field::internal("HTTPClient", runtime::http_client()),
                    Field::internal("Endpoint", TypeDescriptor::named(endpoint).pointer()),
                ],
                methods: vec![exchange, client_credentials, refresh],
            },
        )
        .documented(&format!("{name} runs OAuth2 grants against a discovered provider.")),
    );
    name
}

pub fn synthesize(em: &mut SecurityEmitter<'_>, fragment: &str, url: &str) {
    let discovery_url = em.claim(
        &format!("scheme:{fragment}:discovery-url"),
        &format!("{fragment}DiscoveryURL"),
        NameKind::Constant,
    );
    em.push(GeneratedDeclaration::shared(
        discovery_url.clone(),
        Section::Security,
        DeclBody::Constant {
            value: Literal::Str(url.to_string()),
        },
    ));

    schemes::token(em, fragment);
    let rt = token_runtime(em);
    let (configuration, endpoint) = discovery_types(em);
    let config_ptr = TypeDescriptor::named(&configuration).pointer();
    let endpoint_ptr = TypeDescriptor::named(&endpoint).pointer();

    let client = em.claim(
        &format!("scheme:{fragment}:discovery"),
        &format!("{fragment}DiscoveryClient"),
        NameKind::Type,
    );

    let configuration_method = FunctionDecl::method("Configuration", "c", &client)
        .param("ctx", runtime::context())
        .returns(config_ptr.clone())
        .returns(runtime::error())
        .body(double_checked(
            "c.mu",
            "c.config",
            Expr::call("c.fetchConfiguration", vec![Expr::ident("ctx")]),
        ))
        .documented("Configuration returns the provider metadata, fetching it once.");

    let fetch = FunctionDecl::method("fetchConfiguration", "c", &client)
        .param("ctx", runtime::context())
        .returns(config_ptr.clone())
        .returns(runtime::error())
        .body(vec![
            Stmt::declare(
                &["req", "err"],
                Expr::call(
                    "http.NewRequestWithContext",
                    vec![
                        Expr::ident("ctx"),
                        Expr::str("GET"),
                        Expr::ident(&discovery_url),
                        Expr::Nil,
                    ],
                ),
            ),
            Stmt::return_on_error("err", vec![Expr::Nil, Expr::ident("err")]),
            Stmt::declare(&["resp", "err"], Expr::call("c.HTTPClient.Do", vec![Expr::ident("req")])),
            Stmt::return_on_error("err", vec![Expr::Nil, Expr::ident("err")]),
            Stmt::defer(Stmt::Eval(Expr::call("resp.Body.Close", vec![]))),
            Stmt::declare(
                &["config"],
                Expr::Composite {
                    ty: TypeDescriptor::named(&configuration),
                    fields: vec![],
                },
            ),
            Stmt::assign(
                "err",
                Expr::call(
                    "json.NewDecoder(resp.Body).Decode",
                    vec![Expr::ident("config").address_of()],
                ),
            ),
            Stmt::return_on_error("err", vec![Expr::Nil, Expr::ident("err")]),
            Stmt::ret(vec![Expr::ident("config").address_of(), Expr::Nil]),
        ]);

    let endpoint_method = FunctionDecl::method("Endpoint", "c", &client)
        .param("ctx", runtime::context())
        .returns(endpoint_ptr)
        .returns(runtime::error())
        .body(vec![
            Stmt::declare(&["config", "err"], Expr::call("c.Configuration", vec![Expr::ident("ctx")])),
            Stmt::return_on_error("err", vec![Expr::Nil, Expr::ident("err")]),
            Stmt::ret(vec![
                Expr::Composite {
                    ty: TypeDescriptor::named(&endpoint),
                    fields: vec![
                        ("AuthorizationURL".to_string(), Expr::ident("config.AuthorizationEndpoint")),
                        ("TokenURL".to_string(), Expr::ident("config.TokenEndpoint")),
                    ],
                }
                .address_of(),
                Expr::Nil,
            ]),
        ]);

    // Discovered endpoints feed a client-credentials token source
    let source = FunctionDecl::new("")
        .param("ctx", runtime::context())
        .returns(TypeDescriptor::named(&rt.token).pointer())
        .returns(runtime::error())
        .body(vec![
            Stmt::declare(&["endpoint", "err"], Expr::call("c.Endpoint", vec![Expr::ident("ctx")])),
            Stmt::return_on_error("err", vec![Expr::Nil, Expr::ident("err")]),
            Stmt::ret(vec![Expr::call(
                rt.request_token.clone(),
                vec![
                    Expr::ident("ctx"),
                    Expr::ident("c.HTTPClient"),
                    Expr::ident("endpoint.TokenURL"),
                    Expr::MapLit {
                        ty: runtime::url_values(),
                        entries: vec![
                            ("grant_type".to_string(), Expr::List {
                                ty: runtime::strings(),
                                items: vec![Expr::str("client_credentials")],
                            }),
                            ("client_id".to_string(), Expr::List {
                                ty: runtime::strings(),
                                items: vec![Expr::ident("clientID")],
                            }),
                            ("client_secret".to_string(), Expr::List {
                                ty: runtime::strings(),
                                items: vec![Expr::ident("clientSecret")],
                            }),
                        ],
                    },
                ],
            )]),
        ]);
    let flow_client = flow_client(em, fragment, &endpoint, &rt);
    let oauth2_method = FunctionDecl::method("OAuth2Client", "c", &client)
        .param("ctx", runtime::context())
        .param("clientID", runtime::string())
        .param("clientSecret", runtime::string())
        .returns(TypeDescriptor::named(&flow_client).pointer())
        .returns(runtime::error())
        .body(vec![
            Stmt::declare(&["endpoint", "err"], Expr::call("c.Endpoint", vec![Expr::ident("ctx")])),
            Stmt::return_on_error("err", vec![Expr::Nil, Expr::ident("err")]),
            Stmt::ret(vec![
                Expr::Composite {
                    ty: TypeDescriptor::named(&flow_client),
                    fields: vec![
                        ("ClientID".to_string(), Expr::ident("clientID")),
                        ("ClientSecret".to_string(), Expr::ident("clientSecret")),
                        ("HTTPClient".to_string(), Expr::ident("c.HTTPClient")),
                        ("Endpoint".to_string(), Expr::ident("endpoint")),
                    ],
                }
                .address_of(),
                Expr::Nil,
            ]),
        ])
        .documented(&format!("OAuth2Client returns a {flow_client} using the discovered endpoints."));

    let manager_method = FunctionDecl::method("TokenManager", "c", &client)
        .param("clientID", runtime::string())
        .param("clientSecret", runtime::string())
        .returns(TypeDescriptor::named(&rt.manager).pointer())
        .body(vec![Stmt::ret(vec![Expr::call(
            rt.new_manager.clone(),
            vec![Expr::closure(source)],
        )])])
        .documented("TokenManager obtains client-credentials tokens from the discovered token endpoint.");

    em.push(
        GeneratedDeclaration::shared(
            client.clone(),
            Section::Security,
            DeclBody::Struct {
                fields: vec![
                    Field::internal("mu", runtime::rw_mutex()),
                    Field::internal("config", config_ptr),
                    Field::internal("HTTPClient", runtime::http_client()),
                ],
                methods: vec![configuration_method, fetch, endpoint_method, oauth2_method, manager_method],
            },
        )
        .documented(&format!("{client} resolves provider metadata from {discovery_url}.")),
    );

    let constructor = em.claim(
        &format!("scheme:{fragment}:discovery-new"),
        &format!("New{client}"),
        NameKind::Function,
    );
    em.push(GeneratedDeclaration::shared(
        constructor.clone(),
        Section::Security,
        DeclBody::Function(
            FunctionDecl::new(constructor)
                .param("httpClient", runtime::http_client())
                .returns(TypeDescriptor::named(&client).pointer())
                .body(vec![Stmt::ret(vec![Expr::Composite {
                    ty: TypeDescriptor::named(&client),
                    fields: vec![("HTTPClient".to_string(), Expr::ident("httpClient"))],
                }
                .address_of()])]),
        ),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declarations::{is_double_checked, LockMode};
    use crate::naming::NamingRegistry;

    fn emit() -> Vec<GeneratedDeclaration> {
        let mut names = NamingRegistry::new();
        let mut em = SecurityEmitter::new(&mut names);
        synthesize(&mut em, "Corp", "https://id.example.com/.well-known/openid-configuration");
        em.finish()
    }

    #[test]
    fn test_discovery_client_shape() {
        let decls = emit();
        let client = decls.iter().find(|d| d.name == "CorpDiscoveryClient").unwrap();
        assert!(client.fields().iter().any(|f| f.ty == runtime::rw_mutex()));
        for method in ["Configuration", "Endpoint", "OAuth2Client", "TokenManager"] {
            assert!(client.method(method).is_some(), "missing {method}");
        }
        assert!(decls.iter().any(|d| d.name == "NewCorpDiscoveryClient"));
        assert!(decls.iter().any(|d| d.name == "CorpDiscoveryURL"));
        assert!(decls.iter().any(|d| d.name == "WithCorpToken"));
    }

    #[test]
    fn test_configuration_fetch_rechecks_under_exclusive_lock() {
        let decls = emit();
        let client = decls.iter().find(|d| d.name == "CorpDiscoveryClient").unwrap();
        let body = &client.method("Configuration").unwrap().body;
        assert!(is_double_checked(body));

        let shared = body
            .iter()
            .filter(|s| matches!(s, Stmt::Lock { mode: LockMode::Shared, .. }))
            .count();
        let exclusive = body
            .iter()
            .filter(|s| matches!(s, Stmt::Lock { mode: LockMode::Exclusive, .. }))
            .count();
        assert_eq!((shared, exclusive), (1, 1));
    }

    #[test]
    fn test_discovery_fills_flow_client_endpoints() {
        let decls = emit();
        let client = decls.iter().find(|d| d.name == "CorpDiscoveryClient").unwrap();
        let method = client.method("OAuth2Client").unwrap();
        assert_eq!(method.returns[0], TypeDescriptor::named("CorpOAuth2Client").pointer());
        assert_eq!(
            method.body[0],
            Stmt::declare(&["endpoint", "err"], Expr::call("c.Endpoint", vec![Expr::ident("ctx")]))
        );
        let Stmt::Return(values) = &method.body[2] else {
            panic!("expected the populated client");
        };
        let Expr::AddressOf { inner } = &values[0] else {
            panic!("expected a pointer to the client");
        };
        let Expr::Composite { fields, .. } = inner.as_ref() else {
            panic!("expected a composite literal");
        };
        assert!(fields.contains(&("Endpoint".to_string(), Expr::ident("endpoint"))));

        let flow_client = decls.iter().find(|d| d.name == "CorpOAuth2Client").unwrap();
        for name in ["ExchangeAuthorizationCode", "ClientCredentialsToken", "RefreshToken"] {
            let body = &flow_client.method(name).unwrap().body;
            let Stmt::Return(values) = &body[1] else {
                panic!("{name} does not request a token");
            };
            let Expr::Call { args, .. } = &values[0] else {
                panic!("{name} does not call the token endpoint");
            };
            assert_eq!(args[2], Expr::ident("c.Endpoint.TokenURL"));
        }
    }
}
