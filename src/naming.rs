//! Naming engine: canonical, collision-free identifiers.
//!
//! Candidates are split into words on separators, digit boundaries, case
//! changes and acronym runs, re-cased for the requested [`NameKind`], and then
//! claimed in a per-kind registry. A second, different owner claiming the same
//! final name receives a numeric suffix in first-seen order.

use std::collections::{HashMap, HashSet};

/// Fallback for candidates that contain no usable characters.
pub const FALLBACK_IDENTIFIER: &str = "Default";

const RESERVED_LOCALS: &[&str] = &[
    "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough", "for",
    "func", "go", "goto", "if", "import", "interface", "map", "package", "range", "return",
    "select", "struct", "switch", "type", "var",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NameKind {
    Operation,
    Type,
    Function,
    Constant,
    Variable,
    /// Struct member, scoped to its owning type
    Field,
    /// Local variable or parameter
    Local,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaseStyle {
    Pascal,
    Camel,
    Snake,
}

impl NameKind {
    fn style(self) -> CaseStyle {
        match self {
            NameKind::Local => CaseStyle::Camel,
            NameKind::File => CaseStyle::Snake,
            _ => CaseStyle::Pascal,
        }
    }
}

/// Split an arbitrary string into words.
pub fn split_words(input: &str) -> Vec<String> {
    let chars: Vec<char> = input.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if let Some(prev) = current.chars().last() {
            let next = chars.get(i + 1).copied();
            let boundary = (prev.is_lowercase() && c.is_uppercase())
                || (prev.is_ascii_digit() != c.is_ascii_digit())
                // acronym run followed by a capitalised word: "HTTPServer" -> HTTP | Server
                || (prev.is_uppercase()
                    && c.is_uppercase()
                    && next.is_some_and(|n| n.is_lowercase()));
            if boundary {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }

    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => {
            let mut out: String = first.to_uppercase().collect();
            out.push_str(&chars.as_str().to_lowercase());
            out
        }
        None => String::new(),
    }
}

pub fn to_pascal_case(input: &str) -> String {
    split_words(input).iter().map(|w| capitalize(w)).collect()
}

pub fn to_camel_case(input: &str) -> String {
    let words = split_words(input);
    let mut out = String::new();
    for (i, word) in words.iter().enumerate() {
        if i == 0 {
            out.push_str(&word.to_lowercase());
        } else {
            out.push_str(&capitalize(word));
        }
    }
    out
}

pub fn to_snake_case(input: &str) -> String {
    split_words(input)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// Re-case a candidate for `kind` and make it a valid bare identifier.
/// Does not consult any registry.
///
/// A result that would start with a digit gets a letter prefix: `x` for
/// camel-case names, `x_` for snake-case file names, and an upper-case `X`
/// for Pascal-case names so that types, functions and fields stay exported.
pub fn normalize(candidate: &str, kind: NameKind) -> String {
    let style = kind.style();
    let cased = match style {
        CaseStyle::Pascal => to_pascal_case(candidate),
        CaseStyle::Camel => to_camel_case(candidate),
        CaseStyle::Snake => to_snake_case(candidate),
    };

    if cased.is_empty() {
        return match style {
            CaseStyle::Pascal => FALLBACK_IDENTIFIER.to_string(),
            CaseStyle::Camel | CaseStyle::Snake => FALLBACK_IDENTIFIER.to_lowercase(),
        };
    }

    let cased = if cased.starts_with(|c: char| c.is_ascii_digit()) {
        match style {
            CaseStyle::Pascal => format!("X{cased}"),
            CaseStyle::Camel => format!("x{cased}"),
            CaseStyle::Snake => format!("x_{cased}"),
        }
    } else {
        cased
    };

    if style == CaseStyle::Camel && RESERVED_LOCALS.contains(&cased.as_str()) {
        return format!("{cased}_");
    }
    cased
}

fn with_suffix(base: &str, n: usize, kind: NameKind) -> String {
    match kind.style() {
        CaseStyle::Snake => format!("{base}_{n}"),
        _ => format!("{base}{n}"),
    }
}

/// Per-run table of assigned identifiers.
#[derive(Debug, Default)]
pub struct NamingRegistry {
    claims: HashMap<(NameKind, String), String>,
    taken: HashMap<NameKind, HashSet<String>>,
}

impl NamingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a name for `candidate`. Repeated calls with the same candidate
    /// and kind return the same name.
    pub fn assign(&mut self, candidate: &str, kind: NameKind) -> String {
        self.assign_for(candidate, candidate, kind)
    }

    /// Assign a name on behalf of `owner`. The same owner always gets the same
    /// name back; a different owner whose candidate normalizes to an already
    /// taken name gets the next free numeric suffix.
    pub fn assign_for(&mut self, owner: &str, candidate: &str, kind: NameKind) -> String {
        let key = (kind, owner.to_string());
        if let Some(existing) = self.claims.get(&key) {
            return existing.clone();
        }

        let base = normalize(candidate, kind);
        self.claim(key, &base)
    }

    /// Like [`assign_for`](Self::assign_for) for a name composed from
    /// fragments that are already normalized (`WithPetstoreAuthToken`,
    /// `GenerateOAuthPKCE`): only a collision suffix is ever applied.
    pub fn assign_exact(&mut self, owner: &str, name: &str, kind: NameKind) -> String {
        let key = (kind, owner.to_string());
        if let Some(existing) = self.claims.get(&key) {
            return existing.clone();
        }
        if name.is_empty() {
            return self.claim(key, &normalize(name, kind));
        }
        self.claim(key, name)
    }

    fn claim(&mut self, key: (NameKind, String), base: &str) -> String {
        let kind = key.0;
        let taken = self.taken.entry(kind).or_default();
        let mut name = base.to_string();
        let mut n = 2;
        while taken.contains(&name) {
            name = with_suffix(base, n, kind);
            n += 1;
        }

        taken.insert(name.clone());
        self.claims.insert(key, name.clone());
        name
    }

    /// Name of a fixed runtime declaration (`Token`, `RequestEditorFn`).
    /// Resolved once per run; a schema that already took the name pushes the
    /// runtime declaration to a suffixed name instead.
    pub fn runtime(&mut self, name: &str, kind: NameKind) -> String {
        self.assign_exact(&format!("runtime:{name}"), name, kind)
    }

    /// Mark a fixed name as used without an owner claim, e.g. runtime
    /// identifiers emitted verbatim.
    pub fn reserve(&mut self, name: &str, kind: NameKind) {
        self.taken.entry(kind).or_default().insert(name.to_string());
    }

    pub fn is_taken(&self, name: &str, kind: NameKind) -> bool {
        self.taken.get(&kind).is_some_and(|set| set.contains(name))
    }

    pub fn lookup(&self, owner: &str, kind: NameKind) -> Option<&str> {
        self.claims.get(&(kind, owner.to_string())).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_words_boundaries() {
        assert_eq!(split_words("get_pets-byId"), vec!["get", "pets", "by", "Id"]);
        assert_eq!(split_words("HTTPServer"), vec!["HTTP", "Server"]);
        assert_eq!(split_words("v2api"), vec!["v", "2", "api"]);
        assert_eq!(split_words("petstore_auth"), vec!["petstore", "auth"]);
    }

    #[test]
    fn test_case_conversions() {
        assert_eq!(to_pascal_case("list_pets"), "ListPets");
        assert_eq!(to_pascal_case("getHTTPResponse"), "GetHttpResponse");
        assert_eq!(to_camel_case("Pet-ID"), "petId");
        assert_eq!(to_snake_case("PetStore"), "pet_store");
    }

    #[test]
    fn test_fallback_for_empty_and_symbols() {
        assert_eq!(normalize("", NameKind::Type), "Default");
        assert_eq!(normalize("$%^", NameKind::Function), "Default");
        assert_eq!(normalize("---", NameKind::File), "default");
    }

    #[test]
    fn test_leading_digit_gets_alphabetic_prefix() {
        assert_eq!(normalize("200 response", NameKind::Type), "X200Response");
        assert_eq!(normalize("3d-model", NameKind::Local), "x3DModel");
        assert_eq!(normalize("2fa", NameKind::File), "x_2_fa");
    }

    #[test]
    fn test_leading_digit_prefix_keeps_exported_names_exported() {
        for kind in [NameKind::Type, NameKind::Function, NameKind::Field, NameKind::Operation] {
            let name = normalize("2fa", kind);
            assert!(name.starts_with('X'), "{kind:?} gave {name}");
        }
        assert_eq!(normalize("2fa", NameKind::Local), "x2Fa");
    }

    #[test]
    fn test_reserved_locals_escaped() {
        assert_eq!(normalize("type", NameKind::Local), "type_");
        assert_eq!(normalize("type", NameKind::Field), "Type");
    }

    #[test]
    fn test_assign_is_idempotent() {
        let mut registry = NamingRegistry::new();
        let first = registry.assign("list_pets", NameKind::Operation);
        let second = registry.assign("list_pets", NameKind::Operation);
        assert_eq!(first, "ListPets");
        assert_eq!(first, second);
    }

    #[test]
    fn test_collisions_get_suffixes_in_first_seen_order() {
        let mut registry = NamingRegistry::new();
        assert_eq!(registry.assign("get_pets", NameKind::Operation), "GetPets");
        assert_eq!(registry.assign("getPets", NameKind::Operation), "GetPets2");
        assert_eq!(registry.assign("GET pets", NameKind::Operation), "GetPets3");
        // different kinds do not collide
        assert_eq!(registry.assign("get_pets", NameKind::Type), "GetPets");
    }

    #[test]
    fn test_owner_keyed_claims() {
        let mut registry = NamingRegistry::new();
        let a = registry.assign_for("GET /pets", "listPets", NameKind::Operation);
        let b = registry.assign_for("GET /v2/pets", "listPets", NameKind::Operation);
        assert_eq!(a, "ListPets");
        assert_eq!(b, "ListPets2");
        assert_eq!(
            registry.assign_for("GET /pets", "listPets", NameKind::Operation),
            "ListPets"
        );
        assert_eq!(registry.lookup("GET /v2/pets", NameKind::Operation), Some("ListPets2"));
    }

    #[test]
    fn test_file_suffix_uses_separator() {
        let mut registry = NamingRegistry::new();
        assert_eq!(registry.assign_for("a", "pets", NameKind::File), "pets");
        assert_eq!(registry.assign_for("b", "pets", NameKind::File), "pets_2");
    }

    #[test]
    fn test_assign_exact_keeps_casing() {
        let mut registry = NamingRegistry::new();
        assert_eq!(
            registry.assign_exact("pkce:auth", "GenerateAuthPKCE", NameKind::Function),
            "GenerateAuthPKCE"
        );
        assert_eq!(
            registry.assign_exact("pkce:other", "GenerateAuthPKCE", NameKind::Function),
            "GenerateAuthPKCE2"
        );
    }

    #[test]
    fn test_reserved_names_are_skipped() {
        let mut registry = NamingRegistry::new();
        registry.reserve("Token", NameKind::Type);
        assert_eq!(registry.assign("token", NameKind::Type), "Token2");
        assert!(registry.is_taken("Token", NameKind::Type));
    }
}
