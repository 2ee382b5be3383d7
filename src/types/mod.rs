//! Type Mapper: schema nodes to output-language type descriptors.

pub mod docs;
pub mod mapper;
pub mod runtime;

use serde::Serialize;
use std::fmt;

pub use docs::{comment_block, doc_lines, Doc};
pub use mapper::{FieldSpec, NamedBody, NamedType, TypeRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    /// Unadorned integer, platform width
    Int,
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    String,
    Bytes,
    DateTime,
    Date,
    Uuid,
    Duration,
    Error,
}

impl Primitive {
    pub fn go_name(&self) -> &'static str {
        match self {
            Primitive::Int => "int",
            Primitive::Int32 => "int32",
            Primitive::Int64 => "int64",
            Primitive::Float32 => "float32",
            Primitive::Float64 => "float64",
            Primitive::Bool => "bool",
            Primitive::String => "string",
            Primitive::Bytes => "[]byte",
            Primitive::DateTime => "time.Time",
            Primitive::Date => "openapi_types.Date",
            Primitive::Uuid => "openapi_types.UUID",
            Primitive::Duration => "time.Duration",
            Primitive::Error => "error",
        }
    }

    /// Types a path or query string can be parsed into with a fallible call.
    pub fn needs_parse(&self) -> bool {
        matches!(
            self,
            Primitive::Int
                | Primitive::Int32
                | Primitive::Int64
                | Primitive::Float32
                | Primitive::Float64
                | Primitive::Bool
        )
    }
}

/// A resolved type. `Display` renders the Go spelling.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "of", rename_all = "snake_case")]
pub enum TypeDescriptor {
    Primitive(Primitive),
    Sequence(Box<TypeDescriptor>),
    /// String-keyed map
    Map(Box<TypeDescriptor>),
    /// Reference to a declaration in the type registry
    Named(String),
    /// Nilable wrapper for absent values; never nested
    Optional(Box<TypeDescriptor>),
    /// Plain pointer, e.g. a method receiver
    Pointer(Box<TypeDescriptor>),
    /// Type from an imported package, `http.Request`
    External { package: String, name: String },
    Func {
        params: Vec<TypeDescriptor>,
        returns: Vec<TypeDescriptor>,
    },
    Any,
}

impl TypeDescriptor {
    pub fn named(name: impl Into<String>) -> Self {
        TypeDescriptor::Named(name.into())
    }

    pub fn external(package: &str, name: &str) -> Self {
        TypeDescriptor::External {
            package: package.to_string(),
            name: name.to_string(),
        }
    }

    pub fn string() -> Self {
        TypeDescriptor::Primitive(Primitive::String)
    }

    pub fn error() -> Self {
        TypeDescriptor::Primitive(Primitive::Error)
    }

    pub fn sequence(item: TypeDescriptor) -> Self {
        TypeDescriptor::Sequence(Box::new(item))
    }

    pub fn map_of(value: TypeDescriptor) -> Self {
        TypeDescriptor::Map(Box::new(value))
    }

    pub fn pointer(self) -> Self {
        TypeDescriptor::Pointer(Box::new(self))
    }

    pub fn func(params: Vec<TypeDescriptor>, returns: Vec<TypeDescriptor>) -> Self {
        TypeDescriptor::Func { params, returns }
    }

    /// Wrap in [`TypeDescriptor::Optional`] unless already wrapped.
    pub fn optional(self) -> Self {
        match self {
            TypeDescriptor::Optional(_) => self,
            other => TypeDescriptor::Optional(Box::new(other)),
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, TypeDescriptor::Optional(_))
    }

    /// Number of nested `Optional` layers; 0 or 1 for anything built here.
    pub fn optional_depth(&self) -> usize {
        match self {
            TypeDescriptor::Optional(inner) => 1 + inner.optional_depth(),
            _ => 0,
        }
    }

    pub fn unwrap_optional(&self) -> &TypeDescriptor {
        match self {
            TypeDescriptor::Optional(inner) => inner.unwrap_optional(),
            other => other,
        }
    }

    /// Append every registry type this descriptor refers to.
    pub fn collect_named(&self, out: &mut Vec<String>) {
        match self {
            TypeDescriptor::Named(name) => out.push(name.clone()),
            TypeDescriptor::Sequence(inner)
            | TypeDescriptor::Map(inner)
            | TypeDescriptor::Optional(inner)
            | TypeDescriptor::Pointer(inner) => inner.collect_named(out),
            TypeDescriptor::Func { params, returns } => {
                for ty in params.iter().chain(returns) {
                    ty.collect_named(out);
                }
            }
            TypeDescriptor::Primitive(_) | TypeDescriptor::External { .. } | TypeDescriptor::Any => {}
        }
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match self.unwrap_optional() {
            TypeDescriptor::Primitive(p) => Some(*p),
            _ => None,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Primitive(p) => f.write_str(p.go_name()),
            TypeDescriptor::Sequence(item) => write!(f, "[]{item}"),
            TypeDescriptor::Map(value) => write!(f, "map[string]{value}"),
            TypeDescriptor::Named(name) => f.write_str(name),
            TypeDescriptor::Optional(inner) | TypeDescriptor::Pointer(inner) => write!(f, "*{inner}"),
            TypeDescriptor::External { package, name } => write!(f, "{package}.{name}"),
            TypeDescriptor::Func { params, returns } => {
                let params: Vec<String> = params.iter().map(ToString::to_string).collect();
                write!(f, "func({})", params.join(", "))?;
                match returns.len() {
                    0 => Ok(()),
                    1 => write!(f, " {}", returns[0]),
                    _ => {
                        let returns: Vec<String> = returns.iter().map(ToString::to_string).collect();
                        write!(f, " ({})", returns.join(", "))
                    }
                }
            }
            TypeDescriptor::Any => f.write_str("interface{}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_never_double_wraps() {
        let ty = TypeDescriptor::string().optional().optional();
        assert_eq!(ty.optional_depth(), 1);
        assert_eq!(ty.to_string(), "*string");
    }

    #[test]
    fn test_go_rendering() {
        let ty = TypeDescriptor::map_of(TypeDescriptor::sequence(TypeDescriptor::named("Pet")));
        assert_eq!(ty.to_string(), "map[string][]Pet");

        let handler = TypeDescriptor::func(
            vec![
                TypeDescriptor::external("http", "ResponseWriter"),
                TypeDescriptor::external("http", "Request").pointer(),
            ],
            vec![],
        );
        assert_eq!(handler.to_string(), "func(http.ResponseWriter, *http.Request)");

        let fetch = TypeDescriptor::func(
            vec![],
            vec![TypeDescriptor::named("Token").pointer(), TypeDescriptor::error()],
        );
        assert_eq!(fetch.to_string(), "func() (*Token, error)");
        assert_eq!(TypeDescriptor::Any.to_string(), "interface{}");
    }
}
