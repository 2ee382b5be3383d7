use super::{editor_closure, SecurityEmitter};
use crate::declarations::{
    CredentialSlot, DeclBody, Expr, FunctionDecl, GeneratedDeclaration, Section, Stmt,
};
use crate::naming::NameKind;
use crate::parsers::ApiKeyLocation;
use crate::types::runtime;

fn configurator(
    em: &mut SecurityEmitter<'_>,
    fragment: &str,
    suffix: &str,
    params: &[&str],
    body: Vec<Stmt>,
    doc: &str,
) -> String {
    let editor = em.request_editor();
    let name = em.claim(
        &format!("scheme:{fragment}:{suffix}"),
        &format!("With{fragment}{suffix}"),
        NameKind::Function,
    );

    let mut func = FunctionDecl::new(name.clone());
    for param in params {
        func = func.param(param, runtime::string());
    }
    let func = func
        .returns(editor)
        .body(vec![Stmt::ret(vec![editor_closure(body)])])
        .documented(doc);

    em.push(GeneratedDeclaration::shared(
        name.clone(),
        Section::Security,
        DeclBody::Function(func),
    ));
    name
}

pub fn api_key(em: &mut SecurityEmitter<'_>, fragment: &str, key_name: &str, location: ApiKeyLocation) {
    let slot = match location {
        ApiKeyLocation::Header => CredentialSlot::Header,
        ApiKeyLocation::Query => CredentialSlot::Query,
        ApiKeyLocation::Cookie => CredentialSlot::Cookie,
    };
    let where_ = match location {
        ApiKeyLocation::Header => "header",
        ApiKeyLocation::Query => "query parameter",
        ApiKeyLocation::Cookie => "cookie",
    };
    configurator(
        em,
        fragment,
        "ApiKey",
        &["key"],
        vec![Stmt::SetCredential {
            slot,
            name: Expr::str(key_name),
            value: Expr::ident("key"),
        }],
        &format!("Sends the API key in the `{key_name}` {where_}."),
    );
}

pub fn basic(em: &mut SecurityEmitter<'_>, fragment: &str) {
    configurator(
        em,
        fragment,
        "BasicAuth",
        &["username", "password"],
        vec![Stmt::SetCredential {
            slot: CredentialSlot::BasicAuth,
            name: Expr::ident("username"),
            value: Expr::ident("password"),
        }],
        "Encodes username and password as HTTP basic credentials.",
    );
}

pub fn bearer(em: &mut SecurityEmitter<'_>, fragment: &str, bearer_format: Option<&str>) {
    let doc = match bearer_format {
        Some(format) => format!("Sets a bearer authorization header. Token format: {format}."),
        None => "Sets a bearer authorization header.".to_string(),
    };
    configurator(em, fragment, "BearerToken", &["token"], bearer_header("token"), &doc);
}

/// Plain token configurator shared by the OAuth2 and OIDC schemes.
pub fn token(em: &mut SecurityEmitter<'_>, fragment: &str) -> String {
    configurator(
        em,
        fragment,
        "Token",
        &["token"],
        bearer_header("token"),
        "Sends an already obtained access token.",
    )
}

pub(crate) fn bearer_header(token: &str) -> Vec<Stmt> {
    vec![Stmt::SetCredential {
        slot: CredentialSlot::Header,
        name: Expr::str("Authorization"),
        value: Expr::Concat {
            parts: vec![Expr::str("Bearer "), Expr::ident(token)],
        },
    }]
}
