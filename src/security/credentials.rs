//! Credential-provider family: in-memory, environment and chained lookup.

use super::SecurityEmitter;
use crate::declarations::{
    Condition, DeclBody, Expr, Field, FunctionDecl, GeneratedDeclaration, LockMode, MethodSig,
    Param, Section, Stmt,
};
use crate::naming::NameKind;
use crate::types::{runtime, Doc, TypeDescriptor};

struct Names {
    provider: String,
    not_found: String,
    memory: String,
    new_memory: String,
    env: String,
    chain: String,
}

fn get_method(receiver: &str, owner: &str) -> FunctionDecl {
    FunctionDecl::method("Get", receiver, owner)
        .param("ctx", runtime::context())
        .param("scheme", runtime::string())
        .returns(runtime::string())
        .returns(runtime::error())
}

fn not_found(names: &Names) -> Stmt {
    Stmt::ret(vec![Expr::str(""), Expr::ident(&names.not_found)])
}

fn locked(body: Vec<Stmt>) -> Vec<Stmt> {
    let mut stmts = vec![
        Stmt::lock("p.mu", LockMode::Exclusive),
        Stmt::defer(Stmt::unlock("p.mu", LockMode::Exclusive)),
    ];
    stmts.extend(body);
    stmts
}

fn in_memory(em: &mut SecurityEmitter<'_>, names: &Names) {
    let get = get_method("p", &names.memory).body(locked(vec![
        Stmt::declare(
            &["value", "ok"],
            Expr::index(Expr::ident("p.values"), Expr::ident("scheme")),
        ),
        Stmt::when(
            Condition::truthy(Expr::ident("ok")),
            vec![Stmt::ret(vec![Expr::ident("value"), Expr::Nil])],
        ),
        not_found(names),
    ]));
    let set = FunctionDecl::method("Set", "p", &names.memory)
        .param("scheme", runtime::string())
        .param("value", runtime::string())
        .body(locked(vec![Stmt::assign("p.values[scheme]", Expr::ident("value"))]));
    let delete = FunctionDecl::method("Delete", "p", &names.memory)
        .param("scheme", runtime::string())
        .body(locked(vec![Stmt::Eval(Expr::call(
            "delete",
            vec![Expr::ident("p.values"), Expr::ident("scheme")],
        ))]));

    em.push(
        GeneratedDeclaration::shared(
            names.memory.clone(),
            Section::Security,
            DeclBody::Struct {
                fields: vec![
                    Field::internal("mu", runtime::mutex()),
                    Field::internal("values", TypeDescriptor::map_of(runtime::string())),
                ],
                methods: vec![get, set, delete],
            },
        )
        .documented(&format!(
            "{} holds credentials in memory and is safe for concurrent use.",
            names.memory
        )),
    );

    em.push(GeneratedDeclaration::shared(
        names.new_memory.clone(),
        Section::Security,
        DeclBody::Function(
            FunctionDecl::new(names.new_memory.clone())
                .returns(TypeDescriptor::named(&names.memory).pointer())
                .body(vec![Stmt::ret(vec![Expr::Composite {
                    ty: TypeDescriptor::named(&names.memory),
                    fields: vec![(
                        "values".to_string(),
                        Expr::MapLit {
                            ty: TypeDescriptor::map_of(runtime::string()),
                            entries: vec![],
                        },
                    )],
                }
                .address_of()])]),
        ),
    ));
}

fn environment(em: &mut SecurityEmitter<'_>, names: &Names) {
    let get = get_method("p", &names.env).body(vec![
        Stmt::declare(
            &["key"],
            Expr::Concat {
                parts: vec![
                    Expr::ident("p.Prefix"),
                    Expr::call(
                        "strings.ToUpper",
                        vec![Expr::call(
                            "strings.NewReplacer(\"-\", \"_\", \".\", \"_\").Replace",
                            vec![Expr::ident("scheme")],
                        )],
                    ),
                ],
            },
        ),
        Stmt::declare(
            &["value", "ok"],
            Expr::call("os.LookupEnv", vec![Expr::ident("key")]),
        ),
        Stmt::when(
            Condition::truthy(Expr::ident("ok")),
            vec![Stmt::ret(vec![Expr::ident("value"), Expr::Nil])],
        ),
        not_found(names),
    ]);

    em.push(
        GeneratedDeclaration::shared(
            names.env.clone(),
            Section::Security,
            DeclBody::Struct {
                fields: vec![Field::internal("Prefix", runtime::string())],
                methods: vec![get],
            },
        )
        .documented(&format!(
            "{} reads `<Prefix><SCHEME>` from the process environment.",
            names.env
        )),
    );
}

fn chain(em: &mut SecurityEmitter<'_>, names: &Names) {
    let get = get_method("p", &names.chain).body(vec![
        Stmt::ForEach {
            item: "provider".to_string(),
            over: Expr::ident("p.Providers"),
            body: vec![
                Stmt::declare(
                    &["value", "err"],
                    Expr::call(
                        "provider.Get",
                        vec![Expr::ident("ctx"), Expr::ident("scheme")],
                    ),
                ),
                Stmt::when(
                    Condition::error_set("err").negate(),
                    vec![Stmt::ret(vec![Expr::ident("value"), Expr::Nil])],
                ),
            ],
        },
        not_found(names),
    ]);

    em.push(
        GeneratedDeclaration::shared(
            names.chain.clone(),
            Section::Security,
            DeclBody::Struct {
                fields: vec![Field::internal(
                    "Providers",
                    TypeDescriptor::sequence(TypeDescriptor::named(&names.provider)),
                )],
                methods: vec![get],
            },
        )
        .documented("Returns the first credential any provider yields, in order."),
    );
}

pub fn synthesize(em: &mut SecurityEmitter<'_>) {
    let names = Names {
        provider: em.runtime("CredentialProvider", NameKind::Type),
        not_found: em.runtime("ErrCredentialNotFound", NameKind::Variable),
        memory: em.runtime("InMemoryCredentialProvider", NameKind::Type),
        new_memory: em.runtime("NewInMemoryCredentialProvider", NameKind::Function),
        env: em.runtime("EnvCredentialProvider", NameKind::Type),
        chain: em.runtime("ChainCredentialProvider", NameKind::Type),
    };

    em.once("credentials", move |em| {
        em.push(
            GeneratedDeclaration::shared(
                names.provider.clone(),
                Section::Security,
                DeclBody::Interface {
                    methods: vec![MethodSig {
                        name: "Get".to_string(),
                        params: vec![
                            Param::new("ctx", runtime::context()),
                            Param::new("scheme", runtime::string()),
                        ],
                        returns: vec![runtime::string(), runtime::error()],
                        doc: Doc::from_text("Get returns the credential stored for a security scheme."),
                    }],
                },
            )
            .documented("CredentialProvider looks up credentials by security scheme name."),
        );
        em.push(GeneratedDeclaration::shared(
            names.not_found.clone(),
            Section::Security,
            DeclBody::Variable {
                ty: runtime::error(),
                value: Expr::call("errors.New", vec![Expr::str("credential not found")]),
            },
        ));

        in_memory(em, &names);
        environment(em, &names);
        chain(em, &names);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::NamingRegistry;

    fn emit() -> Vec<GeneratedDeclaration> {
        let mut names = NamingRegistry::new();
        let mut em = SecurityEmitter::new(&mut names);
        synthesize(&mut em);
        synthesize(&mut em);
        em.finish()
    }

    #[test]
    fn test_family_emitted_once() {
        let decls = emit();
        for name in [
            "CredentialProvider",
            "ErrCredentialNotFound",
            "InMemoryCredentialProvider",
            "NewInMemoryCredentialProvider",
            "EnvCredentialProvider",
            "ChainCredentialProvider",
        ] {
            assert_eq!(decls.iter().filter(|d| d.name == name).count(), 1, "{name}");
        }
    }

    #[test]
    fn test_in_memory_provider_locks_every_access() {
        let decls = emit();
        let memory = decls
            .iter()
            .find(|d| d.name == "InMemoryCredentialProvider")
            .unwrap();
        for method in memory.methods() {
            assert!(
                matches!(
                    method.body.first(),
                    Some(Stmt::Lock {
                        mode: LockMode::Exclusive,
                        ..
                    })
                ),
                "{} is not locked",
                method.name
            );
        }
        assert_eq!(memory.methods().len(), 3);
    }
}
