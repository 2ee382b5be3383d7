//! Typed declaration IR handed to renderers.
//!
//! Declarations describe *what* to emit: names, types, and the statement
//! structure of function bodies where that structure carries a correctness
//! contract (locking discipline, parse-failure handling). Literal source text
//! is left to the renderer.

use crate::operations::OperationRef;
use crate::types::{Doc, TypeDescriptor};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKind {
    Type,
    Function,
    Constant,
    Variable,
}

/// Synthesizer that produced a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Types,
    Security,
    Enforcement,
    Responses,
    Binder,
    Middleware,
    Router,
    Stubs,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Types => "types",
            Section::Security => "security",
            Section::Enforcement => "enforcement",
            Section::Responses => "responses",
            Section::Binder => "binder",
            Section::Middleware => "middleware",
            Section::Router => "router",
            Section::Stubs => "stubs",
        }
    }
}

/// File-group a declaration logically belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "group", rename_all = "snake_case")]
pub enum Origin {
    Shared,
    Operation(OperationRef),
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDeclaration {
    pub name: String,
    pub kind: DeclKind,
    pub section: Section,
    pub origin: Origin,
    #[serde(skip_serializing_if = "Doc::is_empty")]
    pub doc: Doc,
    pub body: DeclBody,
}

impl GeneratedDeclaration {
    pub fn new(name: impl Into<String>, section: Section, origin: Origin, body: DeclBody) -> Self {
        let kind = body.kind();
        Self {
            name: name.into(),
            kind,
            section,
            origin,
            doc: Doc::new(),
            body,
        }
    }

    pub fn shared(name: impl Into<String>, section: Section, body: DeclBody) -> Self {
        Self::new(name, section, Origin::Shared, body)
    }

    pub fn with_doc(mut self, doc: Doc) -> Self {
        self.doc = doc;
        self
    }

    pub fn documented(mut self, text: &str) -> Self {
        self.doc.push(text);
        self
    }

    pub fn operation(&self) -> Option<&OperationRef> {
        match &self.origin {
            Origin::Operation(op) => Some(op),
            Origin::Shared => None,
        }
    }

    /// Rough rendered size, used by the file-splitting planner.
    pub fn estimated_lines(&self) -> usize {
        self.doc.len() + self.body.estimated_lines() + 1
    }

    pub fn methods(&self) -> &[FunctionDecl] {
        match &self.body {
            DeclBody::Struct { methods, .. } => methods,
            _ => &[],
        }
    }

    pub fn method(&self, name: &str) -> Option<&FunctionDecl> {
        self.methods().iter().find(|m| m.name == name)
    }

    pub fn function(&self) -> Option<&FunctionDecl> {
        match &self.body {
            DeclBody::Function(func) => Some(func),
            _ => None,
        }
    }

    pub fn fields(&self) -> &[Field] {
        match &self.body {
            DeclBody::Struct { fields, .. } => fields,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeclBody {
    Struct {
        fields: Vec<Field>,
        methods: Vec<FunctionDecl>,
    },
    Interface {
        methods: Vec<MethodSig>,
    },
    Alias {
        target: TypeDescriptor,
    },
    Function(FunctionDecl),
    Constant {
        value: Literal,
    },
    Variable {
        ty: TypeDescriptor,
        value: Expr,
    },
}

impl DeclBody {
    pub fn kind(&self) -> DeclKind {
        match self {
            DeclBody::Struct { .. } | DeclBody::Interface { .. } | DeclBody::Alias { .. } => {
                DeclKind::Type
            }
            DeclBody::Function(_) => DeclKind::Function,
            DeclBody::Constant { .. } => DeclKind::Constant,
            DeclBody::Variable { .. } => DeclKind::Variable,
        }
    }

    pub fn empty_struct() -> Self {
        DeclBody::Struct {
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    fn estimated_lines(&self) -> usize {
        match self {
            DeclBody::Struct { fields, methods } => {
                let fields: usize = fields.iter().map(|f| f.doc.len() + 1).sum();
                let methods: usize = methods.iter().map(|m| m.estimated_lines() + 1).sum();
                fields + methods + 2
            }
            DeclBody::Interface { methods } => methods.iter().map(|m| m.doc.len() + 1).sum::<usize>() + 2,
            DeclBody::Alias { .. } | DeclBody::Constant { .. } => 1,
            DeclBody::Variable { value, .. } => value.estimated_lines(),
            DeclBody::Function(func) => func.estimated_lines(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub ty: TypeDescriptor,
    /// Wire name for the JSON struct tag; `None` for internal fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wire_name: Option<String>,
    #[serde(skip_serializing_if = "Doc::is_empty")]
    pub doc: Doc,
}

impl Field {
    pub fn internal(name: &str, ty: TypeDescriptor) -> Self {
        Self {
            name: name.to_string(),
            ty,
            wire_name: None,
            doc: Doc::new(),
        }
    }

    pub fn wire(name: &str, wire_name: &str, ty: TypeDescriptor) -> Self {
        Self {
            name: name.to_string(),
            ty,
            wire_name: Some(wire_name.to_string()),
            doc: Doc::new(),
        }
    }

    pub fn with_doc(mut self, doc: Doc) -> Self {
        self.doc = doc;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeDescriptor,
}

impl Param {
    pub fn new(name: &str, ty: TypeDescriptor) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodSig {
    pub name: String,
    pub params: Vec<Param>,
    pub returns: Vec<TypeDescriptor>,
    #[serde(skip_serializing_if = "Doc::is_empty")]
    pub doc: Doc,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionDecl {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<Param>,
    pub params: Vec<Param>,
    pub returns: Vec<TypeDescriptor>,
    pub body: Vec<Stmt>,
    #[serde(skip_serializing_if = "Doc::is_empty")]
    pub doc: Doc,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            receiver: None,
            params: Vec::new(),
            returns: Vec::new(),
            body: Vec::new(),
            doc: Doc::new(),
        }
    }

    /// Method on a pointer receiver.
    pub fn method(name: impl Into<String>, receiver: &str, receiver_type: &str) -> Self {
        let mut func = Self::new(name);
        func.receiver = Some(Param::new(receiver, TypeDescriptor::named(receiver_type).pointer()));
        func
    }

    pub fn param(mut self, name: &str, ty: TypeDescriptor) -> Self {
        self.params.push(Param::new(name, ty));
        self
    }

    pub fn returns(mut self, ty: TypeDescriptor) -> Self {
        self.returns.push(ty);
        self
    }

    pub fn body(mut self, body: Vec<Stmt>) -> Self {
        self.body = body;
        self
    }

    pub fn documented(mut self, text: &str) -> Self {
        self.doc.push(text);
        self
    }

    pub fn signature(&self) -> TypeDescriptor {
        TypeDescriptor::func(
            self.params.iter().map(|p| p.ty.clone()).collect(),
            self.returns.clone(),
        )
    }

    pub fn estimated_lines(&self) -> usize {
        self.doc.len() + stmt_lines(&self.body) + 2
    }

    /// Every statement in the body, nested blocks included, in source order.
    pub fn statements(&self) -> Vec<&Stmt> {
        let mut out = Vec::new();
        collect(&self.body, &mut out);
        out
    }
}

fn collect<'a>(stmts: &'a [Stmt], out: &mut Vec<&'a Stmt>) {
    for stmt in stmts {
        out.push(stmt);
        match stmt {
            Stmt::If { then, otherwise, .. } => {
                collect(then, out);
                collect(otherwise, out);
            }
            Stmt::ForEach { body, .. } | Stmt::Parse { on_error: body, .. } => collect(body, out),
            Stmt::Defer(inner) => collect(std::slice::from_ref(inner.as_ref()), out),
            _ => {}
        }
    }
}

fn stmt_lines(stmts: &[Stmt]) -> usize {
    stmts
        .iter()
        .map(|stmt| match stmt {
            Stmt::If { then, otherwise, .. } => {
                let otherwise = if otherwise.is_empty() {
                    0
                } else {
                    stmt_lines(otherwise) + 1
                };
                stmt_lines(then) + otherwise + 2
            }
            Stmt::ForEach { body, .. } => stmt_lines(body) + 2,
            Stmt::Parse { on_error, .. } => stmt_lines(on_error) + 3,
            Stmt::Assign { value, .. } => value.estimated_lines(),
            _ => 1,
        })
        .sum()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Str(String),
    Int(i64),
    Bool(bool),
    /// A `time.Duration` of whole seconds
    Seconds(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Ident { name: String },
    Lit { value: Literal },
    Nil,
    Call { target: String, args: Vec<Expr> },
    /// Composite literal `T{Field: value}`
    Composite {
        ty: TypeDescriptor,
        fields: Vec<(String, Expr)>,
    },
    /// Map literal keyed by strings
    MapLit {
        ty: TypeDescriptor,
        entries: Vec<(String, Expr)>,
    },
    List {
        ty: TypeDescriptor,
        items: Vec<Expr>,
    },
    AddressOf { inner: Box<Expr> },
    /// `base[key]`, optionally with the comma-ok form when assigned to two targets
    Index { base: Box<Expr>, key: Box<Expr> },
    Concat { parts: Vec<Expr> },
    Closure { func: Box<FunctionDecl> },
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Self {
        Expr::Ident { name: name.into() }
    }

    pub fn str(value: impl Into<String>) -> Self {
        Expr::Lit {
            value: Literal::Str(value.into()),
        }
    }

    pub fn int(value: i64) -> Self {
        Expr::Lit {
            value: Literal::Int(value),
        }
    }

    pub fn bool(value: bool) -> Self {
        Expr::Lit {
            value: Literal::Bool(value),
        }
    }

    pub fn call(target: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            target: target.into(),
            args,
        }
    }

    pub fn closure(func: FunctionDecl) -> Self {
        Expr::Closure {
            func: Box::new(func),
        }
    }

    pub fn index(base: Expr, key: Expr) -> Self {
        Expr::Index {
            base: Box::new(base),
            key: Box::new(key),
        }
    }

    pub fn address_of(self) -> Self {
        Expr::AddressOf {
            inner: Box::new(self),
        }
    }

    fn estimated_lines(&self) -> usize {
        match self {
            Expr::Closure { func } => func.estimated_lines(),
            Expr::Composite { fields, .. } if fields.len() > 2 => fields.len() + 2,
            Expr::MapLit { entries, .. } if !entries.is_empty() => entries.len() + 2,
            Expr::List { items, .. } if items.len() > 2 => items.len() + 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// Read lock on a reader/writer mutex
    Shared,
    Exclusive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// A cached value exists and has not expired
    CacheValid { cache: String },
    ErrorSet { var: String },
    IsNil { expr: Expr },
    Truthy { expr: Expr },
    /// Zero-length string, slice or map
    IsEmpty { expr: Expr },
    Equals { left: Expr, right: Expr },
    /// Number greater than zero
    Positive { expr: Expr },
    Not { inner: Box<Condition> },
}

impl Condition {
    pub fn cache_valid(cache: &str) -> Self {
        Condition::CacheValid {
            cache: cache.to_string(),
        }
    }

    pub fn error_set(var: &str) -> Self {
        Condition::ErrorSet {
            var: var.to_string(),
        }
    }

    pub fn is_nil(expr: Expr) -> Self {
        Condition::IsNil { expr }
    }

    pub fn truthy(expr: Expr) -> Self {
        Condition::Truthy { expr }
    }

    pub fn is_empty(expr: Expr) -> Self {
        Condition::IsEmpty { expr }
    }

    pub fn equals(left: Expr, right: Expr) -> Self {
        Condition::Equals { left, right }
    }

    pub fn positive(expr: Expr) -> Self {
        Condition::Positive { expr }
    }

    pub fn negate(self) -> Self {
        Condition::Not {
            inner: Box::new(self),
        }
    }
}

/// Where a credential is attached on an outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSlot {
    Header,
    Query,
    Cookie,
    BasicAuth,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stmt", content = "args", rename_all = "snake_case")]
pub enum Stmt {
    Lock {
        guard: String,
        mode: LockMode,
    },
    Unlock {
        guard: String,
        mode: LockMode,
    },
    Defer(Box<Stmt>),
    If {
        cond: Condition,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
    Assign {
        targets: Vec<String>,
        value: Expr,
        /// `:=` rather than `=`
        declare: bool,
    },
    /// Expression statement
    Eval(Expr),
    /// Fallible conversion of a raw string into `ty`, bound to `bind`
    Parse {
        param: String,
        source: Expr,
        ty: TypeDescriptor,
        bind: String,
        on_error: Vec<Stmt>,
    },
    Return(Vec<Expr>),
    ForEach {
        item: String,
        over: Expr,
        body: Vec<Stmt>,
    },
    /// Write a status and optional JSON body to the response writer
    Respond {
        status: Expr,
        body: Option<Expr>,
    },
    SetCredential {
        slot: CredentialSlot,
        name: Expr,
        value: Expr,
    },
}

impl Stmt {
    pub fn lock(guard: &str, mode: LockMode) -> Self {
        Stmt::Lock {
            guard: guard.to_string(),
            mode,
        }
    }

    pub fn unlock(guard: &str, mode: LockMode) -> Self {
        Stmt::Unlock {
            guard: guard.to_string(),
            mode,
        }
    }

    pub fn defer(stmt: Stmt) -> Self {
        Stmt::Defer(Box::new(stmt))
    }

    pub fn when(cond: Condition, then: Vec<Stmt>) -> Self {
        Stmt::If {
            cond,
            then,
            otherwise: Vec::new(),
        }
    }

    pub fn declare(targets: &[&str], value: Expr) -> Self {
        Stmt::Assign {
            targets: targets.iter().map(|t| t.to_string()).collect(),
            value,
            declare: true,
        }
    }

    pub fn assign(target: &str, value: Expr) -> Self {
        Stmt::Assign {
            targets: vec![target.to_string()],
            value,
            declare: false,
        }
    }

    pub fn ret(values: Vec<Expr>) -> Self {
        Stmt::Return(values)
    }

    /// `if err != nil { return <values> }`
    pub fn return_on_error(var: &str, values: Vec<Expr>) -> Self {
        Stmt::when(Condition::error_set(var), vec![Stmt::Return(values)])
    }
}

/// True when `body` reads `cache` under a shared lock, and on a miss takes the
/// exclusive lock on the same guard and checks `cache` again before doing
/// anything else. A hit that returns `cache` after the shared unlock does not
/// count.
pub fn is_double_checked(body: &[Stmt]) -> bool {
    let mut shared_guard: Option<(&str, &Condition)> = None;
    let mut exclusive_seen = false;

    for (i, stmt) in body.iter().enumerate() {
        match stmt {
            Stmt::Lock {
                guard,
                mode: LockMode::Shared,
            } => {
                if let Some(Stmt::If { cond, then, .. }) = body.get(i + 1) {
                    let returns = then.iter().any(|s| matches!(s, Stmt::Return(_)));
                    if let (true, Condition::CacheValid { cache }) = (returns, cond) {
                        if reads_after_unlock(then, cache) {
                            return false;
                        }
                        shared_guard = Some((guard.as_str(), cond));
                    }
                }
            }
            Stmt::Lock {
                guard,
                mode: LockMode::Exclusive,
            } => {
                if shared_guard.is_some_and(|(g, _)| g == guard) {
                    exclusive_seen = true;
                }
            }
            Stmt::If { cond, .. } if exclusive_seen => {
                return shared_guard.is_some_and(|(_, first)| first == cond);
            }
            _ => {}
        }
    }
    false
}

fn reads_after_unlock(block: &[Stmt], cache: &str) -> bool {
    let mut unlocked = false;
    for stmt in block {
        match stmt {
            Stmt::Unlock {
                mode: LockMode::Shared,
                ..
            } => unlocked = true,
            Stmt::Return(values) if unlocked => {
                return values
                    .iter()
                    .any(|v| matches!(v, Expr::Ident { name } if name == cache));
            }
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached_fetch() -> Vec<Stmt> {
        vec![
            Stmt::lock("c.mu", LockMode::Shared),
            Stmt::when(
                Condition::cache_valid("c.token"),
                vec![
                    Stmt::declare(&["cached"], Expr::ident("c.token")),
                    Stmt::unlock("c.mu", LockMode::Shared),
                    Stmt::ret(vec![Expr::ident("cached"), Expr::Nil]),
                ],
            ),
            Stmt::unlock("c.mu", LockMode::Shared),
            Stmt::lock("c.mu", LockMode::Exclusive),
            Stmt::defer(Stmt::unlock("c.mu", LockMode::Exclusive)),
            Stmt::when(
                Condition::cache_valid("c.token"),
                vec![Stmt::ret(vec![Expr::ident("c.token"), Expr::Nil])],
            ),
            Stmt::declare(&["token", "err"], Expr::call("c.fetch", vec![Expr::ident("ctx")])),
        ]
    }

    #[test]
    fn test_double_checked_detection() {
        assert!(is_double_checked(&cached_fetch()));
    }

    #[test]
    fn test_cache_read_after_shared_unlock_is_rejected() {
        let mut body = cached_fetch();
        body[1] = Stmt::when(
            Condition::cache_valid("c.token"),
            vec![
                Stmt::unlock("c.mu", LockMode::Shared),
                Stmt::ret(vec![Expr::ident("c.token"), Expr::Nil]),
            ],
        );
        assert!(!is_double_checked(&body));
    }

    #[test]
    fn test_missing_recheck_is_rejected() {
        let mut body = cached_fetch();
        body.remove(5);
        assert!(!is_double_checked(&body));
    }

    #[test]
    fn test_statements_walks_nested_blocks() {
        let func = FunctionDecl::new("Token").body(cached_fetch());
        let returns = func
            .statements()
            .into_iter()
            .filter(|s| matches!(s, Stmt::Return(_)))
            .count();
        assert_eq!(returns, 2);
        let unlocks = func
            .statements()
            .into_iter()
            .filter(|s| matches!(s, Stmt::Unlock { .. }))
            .count();
        assert_eq!(unlocks, 3);
    }

    #[test]
    fn test_kind_follows_body() {
        let decl = GeneratedDeclaration::shared(
            "TokenURL",
            Section::Security,
            DeclBody::Constant {
                value: Literal::Str("https://example.com/token".into()),
            },
        );
        assert_eq!(decl.kind, DeclKind::Constant);
        assert_eq!(decl.estimated_lines(), 2);
    }
}
