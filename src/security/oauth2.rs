//! OAuth2 clients, PKCE and token management.

use super::{double_checked, editor_closure, schemes, SecurityEmitter};
use crate::declarations::{
    Condition, DeclBody, Expr, Field, FunctionDecl, GeneratedDeclaration, Literal, Section, Stmt,
};
use crate::naming::NameKind;
use crate::parsers::{FlowKind, OAuthFlow};
use crate::types::{runtime, TypeDescriptor};

/// Client method implementing a flow. Exactly one per flow variant.
pub fn flow_method(kind: FlowKind) -> &'static str {
    match kind {
        FlowKind::AuthorizationCode => "ExchangeAuthorizationCode",
        FlowKind::ClientCredentials => "ClientCredentialsToken",
        FlowKind::Password => "PasswordToken",
        FlowKind::Implicit => "ImplicitAuthorizationURL",
    }
}

fn flow_label(kind: FlowKind) -> &'static str {
    match kind {
        FlowKind::AuthorizationCode => "AuthorizationCode",
        FlowKind::ClientCredentials => "ClientCredentials",
        FlowKind::Password => "Password",
        FlowKind::Implicit => "Implicit",
    }
}

/// Names of the shared token runtime.
pub(crate) struct TokenRuntime {
    pub token: String,
    pub manager: String,
    pub new_manager: String,
    pub request_token: String,
}

/// Declare `Token`, `TokenSource`, `TokenManager` and `RequestToken` once.
pub(crate) fn token_runtime(em: &mut SecurityEmitter<'_>) -> TokenRuntime {
    let names = TokenRuntime {
        token: em.runtime("Token", NameKind::Type),
        manager: em.runtime("TokenManager", NameKind::Type),
        new_manager: em.runtime("NewTokenManager", NameKind::Function),
        request_token: em.runtime("RequestToken", NameKind::Function),
    };
    let source = em.runtime("TokenSource", NameKind::Type);
    let delta = em.runtime("tokenExpiryDelta", NameKind::Constant);

    let token = names.token.clone();
    let manager = names.manager.clone();
    let new_manager = names.new_manager.clone();
    let request_token = names.request_token.clone();
    em.once("token_runtime", move |em| {
        let token_ptr = TypeDescriptor::named(&token).pointer();

        let valid = FunctionDecl::method("Valid", "t", &token)
            .returns(runtime::boolean())
            .body(vec![
                Stmt::when(
                    Condition::is_nil(Expr::ident("t")),
                    vec![Stmt::ret(vec![Expr::bool(false)])],
                ),
                Stmt::when(
                    Condition::is_empty(Expr::ident("t.AccessToken")),
                    vec![Stmt::ret(vec![Expr::bool(false)])],
                ),
                Stmt::when(
                    Condition::truthy(Expr::call("t.Expiry.IsZero", vec![])),
                    vec![Stmt::ret(vec![Expr::bool(true)])],
                ),
                Stmt::ret(vec![Expr::call(
                    format!("time.Now().Add({delta}).Before"),
                    vec![Expr::ident("t.Expiry")],
                )]),
            ])
            .documented("Valid reports whether the token is present and not about to expire.");

        em.push(
            GeneratedDeclaration::shared(
                token.clone(),
                Section::Security,
                DeclBody::Struct {
                    fields: vec![
                        Field::wire("AccessToken", "access_token", runtime::string()),
                        Field::wire("TokenType", "token_type", runtime::string()),
                        Field::wire("RefreshToken", "refresh_token", runtime::string()),
                        Field::wire("ExpiresIn", "expires_in", runtime::int64()),
                        Field::internal("Expiry", runtime::time()),
                    ],
                    methods: vec![valid],
                },
            )
            .documented("Token is an OAuth2 token response."),
        );

        em.push(GeneratedDeclaration::shared(
            delta,
            Section::Security,
            DeclBody::Constant {
                value: Literal::Seconds(10),
            },
        ));

        em.push(
            GeneratedDeclaration::shared(
                source.clone(),
                Section::Security,
                DeclBody::Alias {
                    target: TypeDescriptor::func(
                        vec![runtime::context()],
                        vec![token_ptr.clone(), runtime::error()],
                    ),
                },
            )
            .documented("TokenSource fetches a fresh token."),
        );

        let token_method = FunctionDecl::method("Token", "m", &manager)
            .param("ctx", runtime::context())
            .returns(token_ptr.clone())
            .returns(runtime::error())
            .body(double_checked(
                "m.mu",
                "m.token",
                Expr::call("m.source", vec![Expr::ident("ctx")]),
            ))
            .documented("Token returns the cached token, fetching a new one at most once concurrently.");

        let invalidate = FunctionDecl::method("Invalidate", "m", &manager).body(vec![
            Stmt::lock("m.mu", crate::declarations::LockMode::Exclusive),
            Stmt::defer(Stmt::unlock("m.mu", crate::declarations::LockMode::Exclusive)),
            Stmt::assign("m.token", Expr::Nil),
        ]);

        em.push(
            GeneratedDeclaration::shared(
                manager.clone(),
                Section::Security,
                DeclBody::Struct {
                    fields: vec![
                        Field::internal("mu", runtime::rw_mutex()),
                        Field::internal("token", token_ptr.clone()),
                        Field::internal("source", TypeDescriptor::named(&source)),
                    ],
                    methods: vec![token_method, invalidate],
                },
            )
            .documented("TokenManager caches a token and refreshes it through its source."),
        );

        em.push(GeneratedDeclaration::shared(
            new_manager.clone(),
            Section::Security,
            DeclBody::Function(
                FunctionDecl::new(new_manager)
                    .param("source", TypeDescriptor::named(&source))
                    .returns(TypeDescriptor::named(&manager).pointer())
                    .body(vec![Stmt::ret(vec![Expr::Composite {
                        ty: TypeDescriptor::named(&manager),
                        fields: vec![("source".to_string(), Expr::ident("source"))],
                    }
                    .address_of()])]),
            ),
        ));

        em.push(GeneratedDeclaration::shared(
            request_token.clone(),
            Section::Security,
            DeclBody::Function(
                FunctionDecl::new(request_token)
                    .param("ctx", runtime::context())
                    .param("client", runtime::http_client())
                    .param("endpoint", runtime::string())
                    .param("form", runtime::url_values())
                    .returns(token_ptr)
                    .returns(runtime::error())
                    .body(vec![
                        Stmt::declare(
                            &["req", "err"],
                            Expr::call(
                                "http.NewRequestWithContext",
                                vec![
                                    Expr::ident("ctx"),
                                    Expr::str("POST"),
                                    Expr::ident("endpoint"),
                                    Expr::call("strings.NewReader", vec![Expr::call("form.Encode", vec![])]),
                                ],
                            ),
                        ),
                        Stmt::return_on_error("err", vec![Expr::Nil, Expr::ident("err")]),
                        Stmt::Eval(Expr::call(
                            "req.Header.Set",
                            vec![
                                Expr::str("Content-Type"),
                                Expr::str("application/x-www-form-urlencoded"),
                            ],
                        )),
                        Stmt::declare(&["resp", "err"], Expr::call("client.Do", vec![Expr::ident("req")])),
                        Stmt::return_on_error("err", vec![Expr::Nil, Expr::ident("err")]),
                        Stmt::defer(Stmt::Eval(Expr::call("resp.Body.Close", vec![]))),
                        Stmt::declare(
                            &["token"],
                            Expr::Composite {
                                ty: TypeDescriptor::named(&token),
                                fields: vec![],
                            },
                        ),
                        Stmt::assign(
                            "err",
                            Expr::call(
                                "json.NewDecoder(resp.Body).Decode",
                                vec![Expr::ident("token").address_of()],
                            ),
                        ),
                        Stmt::return_on_error("err", vec![Expr::Nil, Expr::ident("err")]),
                        // a provider that omits expires_in leaves Expiry zero, which never expires
                        Stmt::when(
                            Condition::positive(Expr::ident("token.ExpiresIn")),
                            vec![Stmt::assign(
                                "token.Expiry",
                                Expr::call(
                                    "time.Now().Add",
                                    vec![Expr::ident("time.Duration(token.ExpiresIn) * time.Second")],
                                ),
                            )],
                        ),
                        Stmt::ret(vec![Expr::ident("token").address_of(), Expr::Nil]),
                    ])
                    .documented("RequestToken posts a form to a token endpoint and decodes the response."),
            ),
        ));
    });

    names
}

fn pkce_pair(em: &mut SecurityEmitter<'_>) -> String {
    let name = em.runtime("PKCEPair", NameKind::Type);
    let pair = name.clone();
    em.once("pkce_pair", move |em| {
        em.push(
            GeneratedDeclaration::shared(
                pair,
                Section::Security,
                DeclBody::Struct {
                    fields: vec![
                        Field::internal("Verifier", runtime::string()),
                        Field::internal("Challenge", runtime::string()),
                        Field::internal("Method", runtime::string()),
                    ],
                    methods: vec![],
                },
            )
            .documented("PKCEPair is a code verifier and its S256 challenge."),
        );
    });
    name
}

pub(super) fn form(entries: Vec<(&str, Expr)>) -> Expr {
    Expr::MapLit {
        ty: runtime::url_values(),
        entries: entries
            .into_iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    Expr::List {
                        ty: runtime::strings(),
                        items: vec![v],
                    },
                )
            })
            .collect(),
    }
}

fn endpoint_constant(
    em: &mut SecurityEmitter<'_>,
    fragment: &str,
    label: &str,
    what: &str,
    url: &str,
) -> String {
    let name = em.claim(
        &format!("scheme:{fragment}:{label}:{what}"),
        &format!("{fragment}{label}{what}"),
        NameKind::Constant,
    );
    em.push(GeneratedDeclaration::shared(
        name.clone(),
        Section::Security,
        DeclBody::Constant {
            value: Literal::Str(url.to_string()),
        },
    ));
    name
}

fn scope_value() -> Expr {
    Expr::call("strings.Join", vec![Expr::ident("scopes"), Expr::str(" ")])
}

pub fn synthesize(em: &mut SecurityEmitter<'_>, fragment: &str, flows: &[OAuthFlow]) {
    schemes::token(em, fragment);
    let rt = token_runtime(em);
    let token_ptr = TypeDescriptor::named(&rt.token).pointer();

    // endpoint constants, one per declared URL
    let mut token_urls: Vec<(FlowKind, String)> = Vec::new();
    let mut auth_urls: Vec<(FlowKind, String)> = Vec::new();
    let mut refresh_url: Option<String> = None;
    for flow in flows {
        let label = flow_label(flow.kind);
        if let Some(url) = &flow.authorization_url {
            let name = endpoint_constant(em, fragment, label, "AuthorizationURL", url);
            auth_urls.push((flow.kind, name));
        }
        if let Some(url) = &flow.token_url {
            let name = endpoint_constant(em, fragment, label, "TokenURL", url);
            token_urls.push((flow.kind, name));
        }
        if let Some(url) = &flow.refresh_url {
            let name = endpoint_constant(em, fragment, label, "RefreshURL", url);
            refresh_url.get_or_insert(name);
        }
    }

    let mut scopes: Vec<(String, Expr)> = Vec::new();
    for flow in flows {
        for (scope, description) in &flow.scopes {
            if !scopes.iter().any(|(s, _)| s == scope) {
                scopes.push((scope.clone(), Expr::str(description.clone())));
            }
        }
    }
    let scopes_name = em.claim(
        &format!("scheme:{fragment}:scopes"),
        &format!("{fragment}Scopes"),
        NameKind::Variable,
    );
    em.push(
        GeneratedDeclaration::shared(
            scopes_name.clone(),
            Section::Security,
            DeclBody::Variable {
                ty: TypeDescriptor::map_of(runtime::string()),
                value: Expr::MapLit {
                    ty: TypeDescriptor::map_of(runtime::string()),
                    entries: scopes,
                },
            },
        )
        .documented("Scopes declared by the scheme, with their descriptions."),
    );

    let client_name = em.claim(
        &format!("scheme:{fragment}:client"),
        &format!("{fragment}OAuth2Client"),
        NameKind::Type,
    );
    let token_url_for = |kind: FlowKind| -> Expr {
        token_urls
            .iter()
            .find(|(k, _)| *k == kind)
            .or_else(|| token_urls.first())
            .map(|(_, name)| Expr::ident(name))
            .unwrap_or_else(|| Expr::str(""))
    };
    let auth_url_for = |kind: FlowKind| -> Expr {
        auth_urls
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, name)| Expr::ident(name))
            .unwrap_or_else(|| Expr::str(""))
    };
    let request = |url: Expr, entries: Vec<(&str, Expr)>| -> Vec<Stmt> {
        vec![
            Stmt::declare(&["form"], form(entries)),
            Stmt::ret(vec![Expr::call(
                rt.request_token.clone(),
                vec![Expr::ident("ctx"), Expr::ident("c.HTTPClient"), url, Expr::ident("form")],
            )]),
        ]
    };

    let mut methods = Vec::new();
    for flow in flows {
        let method = FunctionDecl::method(flow_method(flow.kind), "c", &client_name);
        let method = match flow.kind {
            FlowKind::AuthorizationCode => method
                .param("ctx", runtime::context())
                .param("code", runtime::string())
                .param("verifier", runtime::string())
                .returns(token_ptr.clone())
                .returns(runtime::error())
                .body(request(
                    token_url_for(flow.kind),
                    vec![
                        ("grant_type", Expr::str(flow.kind.grant_type())),
                        ("code", Expr::ident("code")),
                        ("redirect_uri", Expr::ident("c.RedirectURL")),
                        ("client_id", Expr::ident("c.ClientID")),
                        ("client_secret", Expr::ident("c.ClientSecret")),
                        ("code_verifier", Expr::ident("verifier")),
                    ],
                ))
                .documented("Exchanges an authorization code (and its PKCE verifier) for a token."),
            FlowKind::ClientCredentials => method
                .param("ctx", runtime::context())
                .param("scopes", runtime::strings())
                .returns(token_ptr.clone())
                .returns(runtime::error())
                .body(request(
                    token_url_for(flow.kind),
                    vec![
                        ("grant_type", Expr::str(flow.kind.grant_type())),
                        ("client_id", Expr::ident("c.ClientID")),
                        ("client_secret", Expr::ident("c.ClientSecret")),
                        ("scope", scope_value()),
                    ],
                )),
            FlowKind::Password => method
                .param("ctx", runtime::context())
                .param("username", runtime::string())
                .param("password", runtime::string())
                .param("scopes", runtime::strings())
                .returns(token_ptr.clone())
                .returns(runtime::error())
                .body(request(
                    token_url_for(flow.kind),
                    vec![
                        ("grant_type", Expr::str(flow.kind.grant_type())),
                        ("username", Expr::ident("username")),
                        ("password", Expr::ident("password")),
                        ("client_id", Expr::ident("c.ClientID")),
                        ("scope", scope_value()),
                    ],
                )),
            FlowKind::Implicit => method
                .param("state", runtime::string())
                .param("scopes", runtime::strings())
                .returns(runtime::string())
                .body(vec![
                    Stmt::declare(
                        &["values"],
                        form(vec![
                            ("response_type", Expr::str("token")),
                            ("client_id", Expr::ident("c.ClientID")),
                            ("redirect_uri", Expr::ident("c.RedirectURL")),
                            ("state", Expr::ident("state")),
                            ("scope", scope_value()),
                        ]),
                    ),
                    Stmt::ret(vec![Expr::Concat {
                        parts: vec![
                            auth_url_for(flow.kind),
                            Expr::str("?"),
                            Expr::call("values.Encode", vec![]),
                        ],
                    }]),
                ])
                .documented("Builds the authorization URL for the implicit grant."),
        };
        methods.push(method);
    }

    let refresh_target = refresh_url
        .as_ref()
        .map(|name| Expr::ident(name))
        .or_else(|| token_urls.first().map(|(_, name)| Expr::ident(name)));
    let refresh_body = match refresh_target {
        Some(url) => request(
            url,
            vec![
                ("grant_type", Expr::str("refresh_token")),
                ("refresh_token", Expr::ident("refreshToken")),
                ("client_id", Expr::ident("c.ClientID")),
                ("client_secret", Expr::ident("c.ClientSecret")),
            ],
        ),
        None => vec![Stmt::ret(vec![
            Expr::Nil,
            Expr::call("errors.New", vec![Expr::str("no token endpoint declared")]),
        ])],
    };
    methods.push(
        FunctionDecl::method("RefreshToken", "c", &client_name)
            .param("ctx", runtime::context())
            .param("refreshToken", runtime::string())
            .returns(token_ptr.clone())
            .returns(runtime::error())
            .body(refresh_body),
    );

    em.push(
        GeneratedDeclaration::shared(
            client_name.clone(),
            Section::Security,
            DeclBody::Struct {
                fields: vec![
                    Field::internal("ClientID", runtime::string()),
                    Field::internal("ClientSecret", runtime::string()),
                    Field::internal("RedirectURL", runtime::string()),
                    Field::internal("HTTPClient", runtime::http_client()),
                ],
                methods,
            },
        )
        .documented(&format!("{client_name} implements the declared OAuth2 flows.")),
    );

    if flows.iter().any(|f| f.kind == FlowKind::AuthorizationCode) {
        let pair = pkce_pair(em);
        let pair_ptr = TypeDescriptor::named(&pair).pointer();

        let generate = em.claim(
            &format!("scheme:{fragment}:pkce"),
            &format!("Generate{fragment}PKCE"),
            NameKind::Function,
        );
        em.push(GeneratedDeclaration::shared(
            generate.clone(),
            Section::Security,
            DeclBody::Function(
                FunctionDecl::new(generate)
                    .returns(pair_ptr.clone())
                    .returns(runtime::error())
                    .body(vec![
                        Stmt::declare(&["buf"], Expr::call("make([]byte, 32)", vec![])),
                        Stmt::declare(&["_", "err"], Expr::call("rand.Read", vec![Expr::ident("buf")])),
                        Stmt::return_on_error("err", vec![Expr::Nil, Expr::ident("err")]),
                        Stmt::declare(
                            &["verifier"],
                            Expr::call("base64.RawURLEncoding.EncodeToString", vec![Expr::ident("buf")]),
                        ),
                        Stmt::declare(
                            &["sum"],
                            Expr::call("sha256.Sum256", vec![Expr::call("[]byte", vec![Expr::ident("verifier")])]),
                        ),
                        Stmt::ret(vec![
                            Expr::Composite {
                                ty: TypeDescriptor::named(&pair),
                                fields: vec![
                                    ("Verifier".to_string(), Expr::ident("verifier")),
                                    (
                                        "Challenge".to_string(),
                                        Expr::call(
                                            "base64.RawURLEncoding.EncodeToString",
                                            vec![Expr::ident("sum[:]")],
                                        ),
                                    ),
                                    ("Method".to_string(), Expr::str("S256")),
                                ],
                            }
                            .address_of(),
                            Expr::Nil,
                        ]),
                    ])
                    .documented("Creates a PKCE verifier and its S256 challenge."),
            ),
        ));

        let url_fn = em.claim(
            &format!("scheme:{fragment}:authorize"),
            &format!("{fragment}AuthorizationCodeURL"),
            NameKind::Function,
        );
        em.push(GeneratedDeclaration::shared(
            url_fn.clone(),
            Section::Security,
            DeclBody::Function(
                FunctionDecl::new(url_fn)
                    .param("clientID", runtime::string())
                    .param("redirectURL", runtime::string())
                    .param("state", runtime::string())
                    .param("pkce", pair_ptr)
                    .param("scopes", runtime::strings())
                    .returns(runtime::string())
                    .body(vec![
                        Stmt::declare(
                            &["values"],
                            form(vec![
                                ("response_type", Expr::str("code")),
                                ("client_id", Expr::ident("clientID")),
                                ("redirect_uri", Expr::ident("redirectURL")),
                                ("state", Expr::ident("state")),
                                ("scope", scope_value()),
                                ("code_challenge", Expr::ident("pkce.Challenge")),
                                ("code_challenge_method", Expr::ident("pkce.Method")),
                            ]),
                        ),
                        Stmt::ret(vec![Expr::Concat {
                            parts: vec![
                                auth_url_for(FlowKind::AuthorizationCode),
                                Expr::str("?"),
                                Expr::call("values.Encode", vec![]),
                            ],
                        }]),
                    ]),
            ),
        ));
    }

    auto_refresh(em, fragment, &rt);
}

/// `With{F}AutoRefresh(manager)`: fetches through the manager on every request.
fn auto_refresh(em: &mut SecurityEmitter<'_>, fragment: &str, rt: &TokenRuntime) {
    let editor = em.request_editor();
    let name = em.claim(
        &format!("scheme:{fragment}:auto-refresh"),
        &format!("With{fragment}AutoRefresh"),
        NameKind::Function,
    );
    let mut body = vec![
        Stmt::declare(&["token", "err"], Expr::call("manager.Token", vec![Expr::ident("ctx")])),
        Stmt::return_on_error("err", vec![Expr::ident("err")]),
    ];
    body.extend(schemes::bearer_header("token.AccessToken"));

    em.push(GeneratedDeclaration::shared(
        name.clone(),
        Section::Security,
        DeclBody::Function(
            FunctionDecl::new(name)
                .param("manager", TypeDescriptor::named(&rt.manager).pointer())
                .returns(editor)
                .body(vec![Stmt::ret(vec![editor_closure(body)])])
                .documented("Attaches a managed token, refreshing it when it expires."),
        ),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::NamingRegistry;
    use indexmap::IndexMap;

    fn flow(kind: FlowKind) -> OAuthFlow {
        OAuthFlow {
            kind,
            authorization_url: Some("https://auth.example.com/authorize".into()),
            token_url: Some("https://auth.example.com/token".into()),
            refresh_url: None,
            scopes: IndexMap::from([("read".to_string(), "read access".to_string())]),
        }
    }

    fn emit(flows: &[OAuthFlow]) -> Vec<GeneratedDeclaration> {
        let mut names = NamingRegistry::new();
        let mut em = SecurityEmitter::new(&mut names);
        synthesize(&mut em, "Auth", flows);
        em.finish()
    }

    fn flow_methods(decls: &[GeneratedDeclaration]) -> usize {
        let client = decls.iter().find(|d| d.name == "AuthOAuth2Client").unwrap();
        client
            .methods()
            .iter()
            .filter(|m| FlowKind::ALL.iter().any(|k| flow_method(*k) == m.name))
            .count()
    }

    fn pkce_generators(decls: &[GeneratedDeclaration]) -> usize {
        decls.iter().filter(|d| d.name.ends_with("PKCE") && d.name.starts_with("Generate")).count()
    }

    #[test]
    fn test_one_method_per_flow() {
        for n in 1..=FlowKind::ALL.len() {
            let flows: Vec<OAuthFlow> = FlowKind::ALL[..n].iter().map(|k| flow(*k)).collect();
            let decls = emit(&flows);
            assert_eq!(flow_methods(&decls), n);
        }

        let decls = emit(&[flow(FlowKind::Password)]);
        assert_eq!(flow_methods(&decls), 1);
        let client = decls.iter().find(|d| d.name == "AuthOAuth2Client").unwrap();
        assert!(client.method("PasswordToken").is_some());
        assert!(client.method("RefreshToken").is_some());
    }

    #[test]
    fn test_pkce_only_with_authorization_code() {
        let decls = emit(&[flow(FlowKind::ClientCredentials)]);
        assert_eq!(pkce_generators(&decls), 0);
        assert!(decls.iter().all(|d| d.name != "PKCEPair"));

        let decls = emit(&[flow(FlowKind::AuthorizationCode), flow(FlowKind::Implicit)]);
        assert_eq!(pkce_generators(&decls), 1);
        assert_eq!(decls.iter().filter(|d| d.name == "PKCEPair").count(), 1);
        assert!(decls.iter().any(|d| d.name == "AuthAuthorizationCodeURL"));
    }

    #[test]
    fn test_shared_runtime_emitted_once() {
        let mut names = NamingRegistry::new();
        let mut em = SecurityEmitter::new(&mut names);
        synthesize(&mut em, "First", &[flow(FlowKind::AuthorizationCode)]);
        synthesize(&mut em, "Second", &[flow(FlowKind::AuthorizationCode)]);
        let decls = em.finish();
        assert_eq!(decls.iter().filter(|d| d.name == "TokenManager").count(), 1);
        assert_eq!(decls.iter().filter(|d| d.name == "PKCEPair").count(), 1);
        assert_eq!(pkce_generators(&decls), 2);
    }

    #[test]
    fn test_auto_refresh_configurator() {
        let decls = emit(&[flow(FlowKind::ClientCredentials)]);
        assert!(decls.iter().any(|d| d.name == "WithAuthAutoRefresh"));
        assert!(decls.iter().any(|d| d.name == "AuthClientCredentialsTokenURL"));
        assert!(decls.iter().any(|d| d.name == "AuthScopes"));
    }

    #[test]
    fn test_expiry_delta_is_seconds() {
        let decls = emit(&[flow(FlowKind::ClientCredentials)]);
        let delta = decls.iter().find(|d| d.name == "tokenExpiryDelta").unwrap();
        assert!(matches!(
            delta.body,
            DeclBody::Constant {
                value: Literal::Seconds(10)
            }
        ));
    }

    #[test]
    fn test_expiry_only_set_when_provider_sends_lifetime() {
        let decls = emit(&[flow(FlowKind::ClientCredentials)]);
        let request = decls
            .iter()
            .find(|d| d.name == "RequestToken")
            .and_then(|d| d.function())
            .unwrap();
        let guarded = request.body.iter().find_map(|s| match s {
            Stmt::If { cond, then, .. } if *cond == Condition::positive(Expr::ident("token.ExpiresIn")) => Some(then),
            _ => None,
        });
        let then = guarded.expect("expiry assignment is guarded");
        assert!(matches!(&then[0], Stmt::Assign { targets, .. } if targets[0] == "token.Expiry"));
        assert!(!request
            .body
            .iter()
            .any(|s| matches!(s, Stmt::Assign { targets, .. } if targets[0] == "token.Expiry")));
    }
}
