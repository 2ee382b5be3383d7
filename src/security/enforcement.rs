//! Security-enforcement metadata: requirement tables and a validator.
//!
//! Independent of client generation. Emitted whenever the document declares
//! schemes or requirements, even with the client helpers switched off.

use super::SecurityEmitter;
use crate::declarations::{
    Condition, DeclBody, Expr, FunctionDecl, GeneratedDeclaration, Section, Stmt,
};
use crate::naming::NameKind;
use crate::operations::OperationTable;
use crate::parsers::{Document, SecurityRequirement};
use crate::types::{runtime, TypeDescriptor};

fn requirement_literal(ty: &TypeDescriptor, requirement: &SecurityRequirement) -> Expr {
    Expr::MapLit {
        ty: ty.clone(),
        entries: requirement
            .iter()
            .map(|(scheme, scopes)| {
                (
                    scheme.clone(),
                    Expr::List {
                        ty: runtime::strings(),
                        items: scopes.iter().map(|s| Expr::str(s.clone())).collect(),
                    },
                )
            })
            .collect(),
    }
}

fn requirement_list(ty: &TypeDescriptor, requirements: &[SecurityRequirement]) -> Expr {
    Expr::List {
        ty: TypeDescriptor::sequence(ty.clone()),
        items: requirements
            .iter()
            .map(|r| requirement_literal(ty, r))
            .collect(),
    }
}

pub fn synthesize(em: &mut SecurityEmitter<'_>, document: &Document, operations: &OperationTable) {
    let any_requirement =
        !document.security.is_empty() || operations.iter().any(|op| !op.security.is_empty());
    if document.security_schemes.is_empty() && !any_requirement {
        return;
    }

    let requirement = em.runtime("SecurityRequirement", NameKind::Type);
    let global = em.runtime("GlobalSecurity", NameKind::Variable);
    let table = em.runtime("OperationSecurity", NameKind::Variable);
    let unauthorized = em.runtime("ErrUnauthorized", NameKind::Variable);
    let validate = em.runtime("ValidateSecurity", NameKind::Function);
    let satisfied = em.runtime("requirementSatisfied", NameKind::Function);
    let contains = em.runtime("containsScope", NameKind::Function);

    let requirement_ty = TypeDescriptor::named(&requirement);
    let list_ty = TypeDescriptor::sequence(requirement_ty.clone());
    let granted_ty = TypeDescriptor::map_of(runtime::strings());

    em.push(
        GeneratedDeclaration::shared(
            requirement.clone(),
            Section::Enforcement,
            DeclBody::Alias {
                target: TypeDescriptor::map_of(runtime::strings()),
            },
        )
        .documented("SecurityRequirement maps scheme names to the scopes they must carry."),
    );

    em.push(
        GeneratedDeclaration::shared(
            global.clone(),
            Section::Enforcement,
            DeclBody::Variable {
                ty: list_ty.clone(),
                value: requirement_list(&requirement_ty, &document.security),
            },
        )
        .documented("Requirements applied to operations that declare none of their own."),
    );

    let entries = operations
        .iter()
        .map(|op| {
            (
                op.name.clone(),
                requirement_list(&requirement_ty, &op.security),
            )
        })
        .collect();
    em.push(
        GeneratedDeclaration::shared(
            table.clone(),
            Section::Enforcement,
            DeclBody::Variable {
                ty: TypeDescriptor::map_of(list_ty.clone()),
                value: Expr::MapLit {
                    ty: TypeDescriptor::map_of(list_ty.clone()),
                    entries,
                },
            },
        )
        .documented("Effective requirements per operation. An empty list means public."),
    );

    em.push(GeneratedDeclaration::shared(
        unauthorized.clone(),
        Section::Enforcement,
        DeclBody::Variable {
            ty: runtime::error(),
            value: Expr::call("errors.New", vec![Expr::str("unauthorized")]),
        },
    ));

    // Alternatives are OR-ed, schemes within one requirement AND-ed.
    let validate_fn = FunctionDecl::new(validate.clone())
        .param("operation", runtime::string())
        .param("granted", granted_ty.clone())
        .returns(runtime::error())
        .body(vec![
            Stmt::declare(
                &["requirements", "ok"],
                Expr::index(Expr::ident(&table), Expr::ident("operation")),
            ),
            Stmt::when(
                Condition::truthy(Expr::ident("ok")).negate(),
                vec![Stmt::assign("requirements", Expr::ident(&global))],
            ),
            Stmt::when(
                Condition::is_empty(Expr::ident("requirements")),
                vec![Stmt::ret(vec![Expr::Nil])],
            ),
            Stmt::ForEach {
                item: "requirement".to_string(),
                over: Expr::ident("requirements"),
                body: vec![Stmt::when(
                    Condition::truthy(Expr::call(
                        satisfied.clone(),
                        vec![Expr::ident("requirement"), Expr::ident("granted")],
                    )),
                    vec![Stmt::ret(vec![Expr::Nil])],
                )],
            },
            Stmt::ret(vec![Expr::ident(&unauthorized)]),
        ])
        .documented(&format!(
            "{validate} checks granted scheme scopes against an operation's requirements."
        ));
    em.push(GeneratedDeclaration::shared(
        validate,
        Section::Enforcement,
        DeclBody::Function(validate_fn),
    ));

    let satisfied_fn = FunctionDecl::new(satisfied.clone())
        .param("requirement", requirement_ty)
        .param("granted", granted_ty)
        .returns(runtime::boolean())
        .body(vec![
            Stmt::ForEach {
                item: "scheme, scopes".to_string(),
                over: Expr::ident("requirement"),
                body: vec![
                    Stmt::declare(
                        &["have", "ok"],
                        Expr::index(Expr::ident("granted"), Expr::ident("scheme")),
                    ),
                    Stmt::when(
                        Condition::truthy(Expr::ident("ok")).negate(),
                        vec![Stmt::ret(vec![Expr::bool(false)])],
                    ),
                    Stmt::ForEach {
                        item: "scope".to_string(),
                        over: Expr::ident("scopes"),
                        body: vec![Stmt::when(
                            Condition::truthy(Expr::call(
                                contains.clone(),
                                vec![Expr::ident("have"), Expr::ident("scope")],
                            ))
                            .negate(),
                            vec![Stmt::ret(vec![Expr::bool(false)])],
                        )],
                    },
                ],
            },
            Stmt::ret(vec![Expr::bool(true)]),
        ]);
    em.push(GeneratedDeclaration::shared(
        satisfied,
        Section::Enforcement,
        DeclBody::Function(satisfied_fn),
    ));

    let contains_fn = FunctionDecl::new(contains.clone())
        .param("scopes", runtime::strings())
        .param("scope", runtime::string())
        .returns(runtime::boolean())
        .body(vec![
            Stmt::ForEach {
                item: "s".to_string(),
                over: Expr::ident("scopes"),
                body: vec![Stmt::when(
                    Condition::equals(Expr::ident("s"), Expr::ident("scope")),
                    vec![Stmt::ret(vec![Expr::bool(true)])],
                )],
            },
            Stmt::ret(vec![Expr::bool(false)]),
        ]);
    em.push(GeneratedDeclaration::shared(
        contains,
        Section::Enforcement,
        DeclBody::Function(contains_fn),
    ));
}
