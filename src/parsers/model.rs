use indexmap::IndexMap;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// Dialect-independent representation of an API description.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub dialect: Dialect,
    pub title: String,
    pub version: String,
    pub description: Option<String>,
    pub base_url: Option<String>,

    pub operations: Vec<Operation>,

    /// Named, reusable schemas (`components.schemas` / `definitions`)
    pub schemas: IndexMap<String, SchemaNode>,

    pub security_schemes: IndexMap<String, SecurityScheme>,

    /// Document-wide requirements applied to operations that declare none
    pub security: Vec<SecurityRequirement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Swagger2,
    OpenApi3,
}

impl Dialect {
    pub fn label(&self) -> &'static str {
        match self {
            Dialect::Swagger2 => "swagger2",
            Dialect::OpenApi3 => "openapi3",
        }
    }
}

impl std::str::FromStr for Dialect {
    type Err = crate::error::GenerateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "swagger2" | "swagger" | "2.0" => Ok(Dialect::Swagger2),
            "openapi3" | "openapi" | "3" => Ok(Dialect::OpenApi3),
            other => Err(crate::error::GenerateError::UnsupportedDialect(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Operation {
    pub id: String,
    /// True when the source omitted `operationId` and `id` was derived
    pub synthesized_id: bool,
    pub method: HttpMethod,
    pub path: String,
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBody>,
    pub responses: IndexMap<ResponseKey, Response>,
    /// `None` inherits document security, `Some(vec![])` opts out
    pub security: Option<Vec<SecurityRequirement>>,
    pub deprecated: bool,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

impl Operation {
    pub fn location(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// First literal path segment, e.g. `pets` for `/pets/{id}`.
    pub fn path_prefix(&self) -> Option<String> {
        self.path
            .split('/')
            .find(|s| !s.is_empty() && !s.starts_with('{'))
            .map(str::to_string)
    }

    pub fn documentation(&self) -> Option<String> {
        match (&self.summary, &self.description) {
            (Some(summary), Some(description)) if summary != description => {
                Some(format!("{summary}\n\n{description}"))
            }
            (_, Some(description)) => Some(description.clone()),
            (Some(summary), None) => Some(summary.clone()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
    Trace,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Trace => "TRACE",
        }
    }

    /// `Get`, `Post`, ...
    pub fn title(&self) -> &'static str {
        match self {
            HttpMethod::Get => "Get",
            HttpMethod::Post => "Post",
            HttpMethod::Put => "Put",
            HttpMethod::Delete => "Delete",
            HttpMethod::Patch => "Patch",
            HttpMethod::Head => "Head",
            HttpMethod::Options => "Options",
            HttpMethod::Trace => "Trace",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Parameter {
    pub name: String,
    pub location: ParameterLocation,
    /// Always true for path parameters
    pub required: bool,
    pub schema: SchemaNode,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Query,
    Path,
    Header,
    Cookie,
}

impl ParameterLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterLocation::Query => "query",
            ParameterLocation::Path => "path",
            ParameterLocation::Header => "header",
            ParameterLocation::Cookie => "cookie",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestBody {
    pub required: bool,
    pub content_type: String,
    pub schema: SchemaNode,
    pub description: Option<String>,
}

/// Key of the uniform response map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseKey {
    Status(u16),
    /// Wildcard range such as `2XX`, holding the leading digit
    Range(u16),
    Default,
}

impl ResponseKey {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("default") {
            return Some(ResponseKey::Default);
        }
        if let Ok(code) = raw.parse::<u16>() {
            return (100..=599).contains(&code).then_some(ResponseKey::Status(code));
        }
        let bytes = raw.as_bytes();
        if bytes.len() == 3 && bytes[1..].eq_ignore_ascii_case(b"xx") {
            let class = (bytes[0] as char).to_digit(10)?;
            if (1..=5).contains(&class) {
                return Some(ResponseKey::Range(class as u16));
            }
        }
        None
    }

    pub fn is_success(&self) -> bool {
        match self {
            ResponseKey::Status(code) => (200..300).contains(code),
            ResponseKey::Range(class) => *class == 2,
            ResponseKey::Default => false,
        }
    }

    /// Member-name fragment: `200`, `2XX`, `Default`.
    pub fn label(&self) -> String {
        match self {
            ResponseKey::Status(code) => code.to_string(),
            ResponseKey::Range(class) => format!("{class}XX"),
            ResponseKey::Default => "Default".to_string(),
        }
    }

    fn rank(&self) -> (u8, u16) {
        match self {
            ResponseKey::Status(code) => (0, *code),
            ResponseKey::Range(class) => (1, *class),
            ResponseKey::Default => (2, 0),
        }
    }
}

impl Ord for ResponseKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl Serialize for ResponseKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label())
    }
}

impl PartialOrd for ResponseKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub description: String,
    pub content_type: Option<String>,
    pub schema: Option<SchemaNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaNode {
    pub kind: SchemaKind,
    pub format: Option<String>,
    pub nullable: bool,
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
}

impl SchemaNode {
    pub fn new(kind: SchemaKind) -> Self {
        Self {
            kind,
            format: None,
            nullable: false,
            description: None,
            enum_values: Vec::new(),
        }
    }

    pub fn any() -> Self {
        Self::new(SchemaKind::Any)
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::new(SchemaKind::Reference(name.into()))
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Name of the reused schema this node points at, if any.
    pub fn reference_name(&self) -> Option<&str> {
        match &self.kind {
            SchemaKind::Reference(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "of", rename_all = "lowercase")]
pub enum SchemaKind {
    String,
    Integer,
    Number,
    Boolean,
    Array { items: Box<SchemaNode> },
    Object(ObjectShape),
    /// Named reference to a reusable schema, resolved lazily
    Reference(String),
    Any,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ObjectShape {
    pub properties: Vec<Property>,
    pub additional: Option<Box<SchemaNode>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Property {
    pub name: String,
    pub required: bool,
    pub schema: SchemaNode,
}

/// Scheme name -> required scopes.
pub type SecurityRequirement = IndexMap<String, Vec<String>>;

#[derive(Debug, Clone, Serialize)]
pub struct SecurityScheme {
    pub kind: SecuritySchemeKind,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SecuritySchemeKind {
    ApiKey {
        name: String,
        location: ApiKeyLocation,
    },
    HttpBasic,
    HttpBearer {
        bearer_format: Option<String>,
    },
    OAuth2 {
        flows: Vec<OAuthFlow>,
    },
    OpenIdConnect {
        url: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    Header,
    Query,
    Cookie,
}

#[derive(Debug, Clone, Serialize)]
pub struct OAuthFlow {
    pub kind: FlowKind,
    pub authorization_url: Option<String>,
    pub token_url: Option<String>,
    pub refresh_url: Option<String>,
    pub scopes: IndexMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FlowKind {
    AuthorizationCode,
    ClientCredentials,
    Password,
    Implicit,
}

impl FlowKind {
    pub const ALL: [FlowKind; 4] = [
        FlowKind::AuthorizationCode,
        FlowKind::ClientCredentials,
        FlowKind::Password,
        FlowKind::Implicit,
    ];

    pub fn grant_type(&self) -> &'static str {
        match self {
            FlowKind::AuthorizationCode => "authorization_code",
            FlowKind::ClientCredentials => "client_credentials",
            FlowKind::Password => "password",
            FlowKind::Implicit => "implicit",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialect_names() {
        assert_eq!("Swagger2".parse::<Dialect>().unwrap(), Dialect::Swagger2);
        assert_eq!("openapi".parse::<Dialect>().unwrap(), Dialect::OpenApi3);
        assert!("raml".parse::<Dialect>().is_err());
    }

    #[test]
    fn test_response_key_parse() {
        assert_eq!(ResponseKey::parse("200"), Some(ResponseKey::Status(200)));
        assert_eq!(ResponseKey::parse("default"), Some(ResponseKey::Default));
        assert_eq!(ResponseKey::parse("4XX"), Some(ResponseKey::Range(4)));
        assert_eq!(ResponseKey::parse("2xx"), Some(ResponseKey::Range(2)));
        assert_eq!(ResponseKey::parse("999"), None);
        assert_eq!(ResponseKey::parse("ok"), None);
    }

    #[test]
    fn test_response_key_ordering() {
        let mut keys = vec![
            ResponseKey::Default,
            ResponseKey::Range(2),
            ResponseKey::Status(404),
            ResponseKey::Status(200),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                ResponseKey::Status(200),
                ResponseKey::Status(404),
                ResponseKey::Range(2),
                ResponseKey::Default,
            ]
        );
    }

    #[test]
    fn test_path_prefix_skips_templates() {
        let op = Operation {
            id: "x".into(),
            synthesized_id: false,
            method: HttpMethod::Get,
            path: "/{tenant}/pets/{id}".into(),
            parameters: vec![],
            request_body: None,
            responses: IndexMap::new(),
            security: None,
            deprecated: false,
            summary: None,
            description: None,
            tags: vec![],
        };
        assert_eq!(op.path_prefix().as_deref(), Some("pets"));
    }
}
