//! Server Extension Synthesizer.
//!
//! Five independently toggleable extensions, each a [`ServerExtension`]
//! scoped to the whole operation table. The [`ExtensionRegistry`] runs the
//! enabled ones in a fixed order.

pub mod binder;
pub mod middleware;
pub mod responses;
pub mod router;
pub mod stubs;

use crate::config::ServerOptions;
use crate::declarations::{GeneratedDeclaration, Origin, Param, Section};
use crate::error::{ExtensionError, GenerateError, Result};
use crate::issues::{Issue, IssueLog};
use crate::naming::{NameKind, NamingRegistry};
use crate::operations::{OperationSpec, OperationTable};
use crate::parsers::ParameterLocation;
use crate::types::runtime;

pub use binder::BinderExtension;
pub use middleware::MiddlewareExtension;
pub use responses::ResponsesExtension;
pub use router::{RouterExtension, RouterStrategy};
pub use stubs::StubsExtension;

/// Everything an extension reads or claims while synthesizing.
pub struct ExtensionContext<'a> {
    pub operations: &'a OperationTable,
    pub names: &'a mut NamingRegistry,
}

impl ExtensionContext<'_> {
    /// Name shared by every operation, e.g. `Binder`.
    pub fn shared_name(&mut self, name: &str, kind: NameKind) -> String {
        self.names.runtime(name, kind)
    }

    /// Name derived from an operation, e.g. `GetPetsResponse`.
    pub fn operation_name(&mut self, op: &OperationSpec, role: &str, name: String, kind: NameKind) -> String {
        self.names.assign_exact(&format!("{}:{role}", op.name), &name, kind)
    }
}

/// Server extension trait - turns the operation table into declarations
pub trait ServerExtension: Send + Sync {
    /// Unique name of the extension (e.g., "binder", "router")
    fn name(&self) -> &'static str;

    fn section(&self) -> Section;

    fn synthesize(
        &self,
        ctx: &mut ExtensionContext<'_>,
    ) -> std::result::Result<Vec<GeneratedDeclaration>, ExtensionError>;
}

/// Enabled extensions in emission order.
pub struct ExtensionRegistry {
    extensions: Vec<Box<dyn ServerExtension>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self {
            extensions: Vec::new(),
        }
    }

    /// Registry for the toggles in `options`. An unknown router name is fatal
    /// here, before anything is synthesized.
    pub fn from_options(options: &ServerOptions) -> Result<Self> {
        let mut registry = Self::new();
        if options.responses {
            registry.register(Box::new(ResponsesExtension));
        }
        if options.binder {
            registry.register(Box::new(BinderExtension));
        }
        if options.middleware {
            registry.register(Box::new(MiddlewareExtension));
        }
        if let Some(name) = &options.router {
            let strategy: RouterStrategy = name.parse()?;
            registry.register(Box::new(RouterExtension::new(strategy)));
        }
        if options.stubs {
            registry.register(Box::new(StubsExtension));
        }
        Ok(registry)
    }

    pub fn register(&mut self, extension: Box<dyn ServerExtension>) {
        self.extensions.push(extension);
    }

    pub fn available_extensions(&self) -> Vec<&'static str> {
        self.extensions.iter().map(|e| e.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Run every enabled extension. A failing extension is reported as a
    /// critical issue and contributes nothing; the others still run.
    pub fn run(
        &self,
        operations: &OperationTable,
        names: &mut NamingRegistry,
        strict: bool,
        issues: &mut IssueLog,
    ) -> Result<Vec<GeneratedDeclaration>> {
        if operations.is_empty() {
            if let Some(first) = self.extensions.first() {
                if strict {
                    return Err(GenerateError::NoOperations {
                        extension: first.name(),
                    });
                }
            }
            for extension in &self.extensions {
                issues.push(Issue::warning(format!(
                    "extension '{}' skipped: document has no operations",
                    extension.name()
                )));
            }
            return Ok(Vec::new());
        }

        let mut decls = Vec::new();
        for extension in &self.extensions {
            let mut ctx = ExtensionContext {
                operations,
                names: &mut *names,
            };
            match extension.synthesize(&mut ctx) {
                Ok(mut produced) => {
                    tracing::debug!(
                        extension = extension.name(),
                        section = extension.section().as_str(),
                        declarations = produced.len(),
                        "server extension synthesized"
                    );
                    decls.append(&mut produced);
                }
                Err(e) => issues.push(
                    Issue::critical(format!("extension '{}' dropped: {e}", extension.name())),
                ),
            }
        }
        Ok(decls)
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn origin(op: &OperationSpec) -> Origin {
    Origin::Operation(op.origin.clone())
}

/// `w http.ResponseWriter, r *http.Request` followed by the typed path
/// parameters. Shared by the router's server interface and the stubs.
pub(crate) fn handler_params(op: &OperationSpec) -> Vec<Param> {
    let mut params = vec![
        Param::new("w", runtime::response_writer()),
        Param::new("r", runtime::request()),
    ];
    params.extend(
        op.params_in(ParameterLocation::Path)
            .map(|p| Param::new(&p.var, p.base.clone())),
    );
    params
}
