//! Security Synthesizer.
//!
//! One pass over the declared schemes emits the per-scheme request
//! configurators, OAuth2 and OIDC clients, the credential-provider family and,
//! independently, the enforcement metadata. Shared runtime pieces (token type,
//! token manager, PKCE pair) are emitted at most once per run.

pub mod credentials;
pub mod enforcement;
pub mod oauth2;
pub mod oidc;
pub mod schemes;

use crate::config::SecurityOptions;
use crate::declarations::{
    Condition, DeclBody, Expr, GeneratedDeclaration, LockMode, Section, Stmt,
};
use crate::naming::{NameKind, NamingRegistry};
use crate::operations::OperationTable;
use crate::parsers::{Document, SecuritySchemeKind};
use crate::types::{runtime, TypeDescriptor};
use std::collections::HashSet;

/// Collects declarations for one run and tracks which shared pieces exist.
pub struct SecurityEmitter<'a> {
    pub(crate) names: &'a mut NamingRegistry,
    decls: Vec<GeneratedDeclaration>,
    emitted: HashSet<&'static str>,
}

impl<'a> SecurityEmitter<'a> {
    pub fn new(names: &'a mut NamingRegistry) -> Self {
        Self {
            names,
            decls: Vec::new(),
            emitted: HashSet::new(),
        }
    }

    pub(crate) fn push(&mut self, decl: GeneratedDeclaration) {
        self.decls.push(decl);
    }

    /// Run `build` the first time `key` is seen.
    pub(crate) fn once(&mut self, key: &'static str, build: impl FnOnce(&mut Self)) {
        if self.emitted.insert(key) {
            build(self);
        }
    }

    pub(crate) fn runtime(&mut self, name: &str, kind: NameKind) -> String {
        self.names.runtime(name, kind)
    }

    /// Name for a per-scheme declaration composed from the scheme fragment.
    pub(crate) fn claim(&mut self, owner: &str, name: &str, kind: NameKind) -> String {
        self.names.assign_exact(owner, name, kind)
    }

    /// Function-name fragment for a scheme, e.g. `petstore_auth` -> `PetstoreAuth`.
    pub(crate) fn fragment(&mut self, scheme: &str) -> String {
        self.names
            .assign_for(&format!("scheme:{scheme}"), scheme, NameKind::Function)
    }

    /// `RequestEditorFn`, declared on first use.
    pub(crate) fn request_editor(&mut self) -> TypeDescriptor {
        let name = self.runtime("RequestEditorFn", NameKind::Type);
        let alias = name.clone();
        self.once("request_editor", move |em| {
            em.push(
                GeneratedDeclaration::shared(
                    alias,
                    Section::Security,
                    DeclBody::Alias {
                        target: TypeDescriptor::func(
                            vec![runtime::context(), runtime::request()],
                            vec![runtime::error()],
                        ),
                    },
                )
                .documented("RequestEditorFn mutates an outgoing request before it is sent."),
            )
        });
        TypeDescriptor::named(name)
    }

    pub fn finish(self) -> Vec<GeneratedDeclaration> {
        self.decls
    }
}

/// Emit every security declaration the options ask for.
pub fn synthesize(
    document: &Document,
    operations: &OperationTable,
    options: &SecurityOptions,
    names: &mut NamingRegistry,
) -> Vec<GeneratedDeclaration> {
    let mut emitter = SecurityEmitter::new(names);

    if options.client && !document.security_schemes.is_empty() {
        for (scheme_name, scheme) in &document.security_schemes {
            let fragment = emitter.fragment(scheme_name);
            match &scheme.kind {
                SecuritySchemeKind::ApiKey { name, location } => {
                    schemes::api_key(&mut emitter, &fragment, name, *location)
                }
                SecuritySchemeKind::HttpBasic => schemes::basic(&mut emitter, &fragment),
                SecuritySchemeKind::HttpBearer { bearer_format } => {
                    schemes::bearer(&mut emitter, &fragment, bearer_format.as_deref())
                }
                SecuritySchemeKind::OAuth2 { flows } => {
                    oauth2::synthesize(&mut emitter, &fragment, flows)
                }
                SecuritySchemeKind::OpenIdConnect { url } => {
                    oidc::synthesize(&mut emitter, &fragment, url)
                }
            }
        }
        credentials::synthesize(&mut emitter);
    }

    if options.enforcement {
        enforcement::synthesize(&mut emitter, document, operations);
    }

    let decls = emitter.finish();
    tracing::debug!(declarations = decls.len(), "security synthesized");
    decls
}

/// Cache read under a shared lock, then on a miss an exclusive lock and a
/// second check before `fetch` runs. At most one fetch is in flight per
/// guard. A hit under the shared lock copies the cache into a local before
/// unlocking.
pub(crate) fn double_checked(guard: &str, cache: &str, fetch: Expr) -> Vec<Stmt> {
    vec![
        Stmt::lock(guard, LockMode::Shared),
        Stmt::when(
            Condition::cache_valid(cache),
            vec![
                Stmt::declare(&["cached"], Expr::ident(cache)),
                Stmt::unlock(guard, LockMode::Shared),
                Stmt::ret(vec![Expr::ident("cached"), Expr::Nil]),
            ],
        ),
        Stmt::unlock(guard, LockMode::Shared),
        Stmt::lock(guard, LockMode::Exclusive),
        Stmt::defer(Stmt::unlock(guard, LockMode::Exclusive)),
        Stmt::when(
            Condition::cache_valid(cache),
            vec![Stmt::ret(vec![Expr::ident(cache), Expr::Nil])],
        ),
        Stmt::declare(&["value", "err"], fetch),
        Stmt::return_on_error("err", vec![Expr::Nil, Expr::ident("err")]),
        Stmt::assign(cache, Expr::ident("value")),
        Stmt::ret(vec![Expr::ident("value"), Expr::Nil]),
    ]
}

/// Closure matching `RequestEditorFn`.
pub(crate) fn editor_closure(body: Vec<Stmt>) -> Expr {
    let mut stmts = body;
    stmts.push(Stmt::ret(vec![Expr::Nil]));
    Expr::closure(
        crate::declarations::FunctionDecl::new("")
            .param("ctx", runtime::context())
            .param("req", runtime::request())
            .returns(runtime::error())
            .body(stmts),
    )
}
