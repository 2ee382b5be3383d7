use super::{Doc, Primitive, TypeDescriptor};
use crate::config::OptionalStyle;
use crate::issues::Issue;
use crate::naming::{to_pascal_case, NameKind, NamingRegistry};
use crate::parsers::{ObjectShape, SchemaKind, SchemaNode};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub name: String,
    /// Property name on the wire; `-` for the catch-all map of extra properties
    pub wire_name: String,
    pub ty: TypeDescriptor,
    pub required: bool,
    pub doc: Doc,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NamedBody {
    Struct { fields: Vec<FieldSpec> },
    Alias { target: TypeDescriptor },
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedType {
    pub name: String,
    pub body: NamedBody,
    pub doc: Doc,
    /// Declared under `components.schemas` / `definitions`
    pub component: bool,
    /// Operations whose signatures reach this type
    pub owners: BTreeSet<String>,
    /// Also reached from a component or another non-operation context
    pub shared_use: bool,
}

impl NamedType {
    /// Component types and types reachable from more than one place belong
    /// in the shared bucket; everything else follows its single owner.
    pub fn single_owner(&self) -> Option<&str> {
        if self.component || self.shared_use || self.owners.len() != 1 {
            return None;
        }
        self.owners.iter().next().map(String::as_str)
    }
}

/// Registry of named composite types for one generation run.
///
/// Component schemas are named up front so references between them, including
/// cycles, resolve to [`TypeDescriptor::Named`] without expanding the target.
/// Anonymous inline objects are de-duplicated by structural signature.
#[derive(Debug)]
pub struct TypeRegistry {
    style: OptionalStyle,
    types: IndexMap<String, NamedType>,
    components: HashMap<String, String>,
    shapes: HashMap<String, String>,
    issues: Vec<Issue>,
}

impl TypeRegistry {
    pub fn new(style: OptionalStyle) -> Self {
        Self {
            style,
            types: IndexMap::new(),
            components: HashMap::new(),
            shapes: HashMap::new(),
            issues: Vec::new(),
        }
    }

    pub fn style(&self) -> OptionalStyle {
        self.style
    }

    pub fn register_components(
        &mut self,
        schemas: &IndexMap<String, SchemaNode>,
        names: &mut NamingRegistry,
    ) {
        for schema_name in schemas.keys() {
            let type_name = names.assign_for(&component_owner(schema_name), schema_name, NameKind::Type);
            self.components.insert(schema_name.clone(), type_name);
        }

        for (schema_name, node) in schemas {
            let Some(type_name) = self.components.get(schema_name).cloned() else {
                continue;
            };
            let body = match &node.kind {
                SchemaKind::Object(shape) if !shape.properties.is_empty() => {
                    self.shapes
                        .entry(shape_signature(shape))
                        .or_insert_with(|| type_name.clone());
                    NamedBody::Struct {
                        fields: self.map_fields(&type_name, shape, None, names),
                    }
                }
                _ => NamedBody::Alias {
                    target: self.map_schema(node, &type_name, None, names),
                },
            };

            self.types.insert(
                type_name.clone(),
                NamedType {
                    name: type_name,
                    body,
                    doc: schema_doc(node),
                    component: true,
                    owners: BTreeSet::new(),
                    shared_use: true,
                },
            );
        }
    }

    /// Map a schema node. `hint` names an inline composite if one has to be
    /// created; `owner` is the operation the node is reached from.
    pub fn map_schema(
        &mut self,
        node: &SchemaNode,
        hint: &str,
        owner: Option<&str>,
        names: &mut NamingRegistry,
    ) -> TypeDescriptor {
        match &node.kind {
            SchemaKind::String | SchemaKind::Integer | SchemaKind::Number | SchemaKind::Boolean => {
                TypeDescriptor::Primitive(primitive_for(node))
            }
            SchemaKind::Array { items } => {
                let item_hint = format!("{hint}Item");
                TypeDescriptor::sequence(self.map_schema(items, &item_hint, owner, names))
            }
            SchemaKind::Object(shape) if shape.properties.is_empty() => match &shape.additional {
                Some(value) => {
                    let value_hint = format!("{hint}Value");
                    TypeDescriptor::map_of(self.map_schema(value, &value_hint, owner, names))
                }
                None => TypeDescriptor::map_of(TypeDescriptor::Any),
            },
            SchemaKind::Object(shape) => self.inline_struct(shape, node, hint, owner, names),
            SchemaKind::Reference(schema_name) => match self.components.get(schema_name) {
                Some(type_name) => TypeDescriptor::Named(type_name.clone()),
                None => {
                    self.issues.push(
                        Issue::warning(format!("unresolved schema reference '{schema_name}'"))
                            .at(hint.to_string()),
                    );
                    TypeDescriptor::Any
                }
            },
            SchemaKind::Any => TypeDescriptor::Any,
        }
    }

    /// Apply the optionality policy to a mapped field or parameter type.
    /// Required values are never wrapped, nullable or not.
    pub fn field_type(&self, ty: TypeDescriptor, required: bool) -> TypeDescriptor {
        if required {
            return ty;
        }
        match self.style {
            OptionalStyle::Pointer => ty.optional(),
            OptionalStyle::Value => ty,
        }
    }

    fn inline_struct(
        &mut self,
        shape: &ObjectShape,
        node: &SchemaNode,
        hint: &str,
        owner: Option<&str>,
        names: &mut NamingRegistry,
    ) -> TypeDescriptor {
        let signature = shape_signature(shape);
        if let Some(existing) = self.shapes.get(&signature).cloned() {
            self.add_owner(&existing, owner);
            return TypeDescriptor::Named(existing);
        }

        let type_name = names.assign_for(&format!("shape:{signature}"), hint, NameKind::Type);
        self.shapes.insert(signature, type_name.clone());
        let fields = self.map_fields(&type_name, shape, owner, names);

        self.types.insert(
            type_name.clone(),
            NamedType {
                name: type_name.clone(),
                body: NamedBody::Struct { fields },
                doc: schema_doc(node),
                component: false,
                owners: owner.map(str::to_string).into_iter().collect(),
                shared_use: owner.is_none(),
            },
        );
        TypeDescriptor::Named(type_name)
    }

    fn map_fields(
        &mut self,
        type_name: &str,
        shape: &ObjectShape,
        owner: Option<&str>,
        names: &mut NamingRegistry,
    ) -> Vec<FieldSpec> {
        let mut local = NamingRegistry::new();
        let mut fields = Vec::with_capacity(shape.properties.len());

        for property in &shape.properties {
            let hint = format!("{type_name}{}", to_pascal_case(&property.name));
            let base = self.map_schema(&property.schema, &hint, owner, names);
            fields.push(FieldSpec {
                name: local.assign_for(&property.name, &property.name, NameKind::Field),
                wire_name: property.name.clone(),
                ty: self.field_type(base, property.required),
                required: property.required,
                doc: schema_doc(&property.schema),
            });
        }

        if let Some(additional) = &shape.additional {
            let hint = format!("{type_name}Value");
            let value = self.map_schema(additional, &hint, owner, names);
            fields.push(FieldSpec {
                name: local.assign("AdditionalProperties", NameKind::Field),
                wire_name: "-".to_string(),
                ty: TypeDescriptor::map_of(value),
                required: true,
                doc: Doc::new(),
            });
        }
        fields
    }

    /// Record another use of a de-duplicated inline type. The use reaches
    /// every inline type nested in it as well; components are already shared.
    fn add_owner(&mut self, type_name: &str, owner: Option<&str>) {
        let mut pending = vec![type_name.to_string()];
        let mut visited = HashSet::new();
        while let Some(name) = pending.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            let Some(named) = self.types.get_mut(&name) else {
                continue;
            };
            if named.component {
                continue;
            }
            match owner {
                Some(owner) => {
                    named.owners.insert(owner.to_string());
                }
                None => named.shared_use = true,
            }
            match &named.body {
                NamedBody::Struct { fields } => {
                    for field in fields {
                        field.ty.collect_named(&mut pending);
                    }
                }
                NamedBody::Alias { target } => target.collect_named(&mut pending),
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&NamedType> {
        self.types.get(name)
    }

    pub fn component_type(&self, schema_name: &str) -> Option<&str> {
        self.components.get(schema_name).map(String::as_str)
    }

    pub fn types(&self) -> impl Iterator<Item = &NamedType> {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn take_issues(&mut self) -> Vec<Issue> {
        std::mem::take(&mut self.issues)
    }
}

fn component_owner(schema_name: &str) -> String {
    format!("#/components/schemas/{schema_name}")
}

pub fn primitive_for(node: &SchemaNode) -> Primitive {
    let format = node.format.as_deref();
    match node.kind {
        SchemaKind::Integer => match format {
            Some("int32") => Primitive::Int32,
            Some("int64") => Primitive::Int64,
            _ => Primitive::Int,
        },
        SchemaKind::Number => match format {
            Some("float") => Primitive::Float32,
            _ => Primitive::Float64,
        },
        SchemaKind::Boolean => Primitive::Bool,
        _ => match format {
            Some("date-time") => Primitive::DateTime,
            Some("date") => Primitive::Date,
            Some("uuid") => Primitive::Uuid,
            Some("byte") | Some("binary") => Primitive::Bytes,
            _ => Primitive::String,
        },
    }
}

/// Description plus the allowed values of an enumeration.
pub fn schema_doc(node: &SchemaNode) -> Doc {
    let mut doc = node
        .description
        .as_deref()
        .map(Doc::from_text)
        .unwrap_or_default();
    if !node.enum_values.is_empty() {
        doc.push(&format!("Allowed values: {}", node.enum_values.join(", ")));
    }
    doc
}

/// Canonical structural signature. Property order and documentation do not
/// participate.
pub fn shape_signature(shape: &ObjectShape) -> String {
    let mut properties: Vec<String> = shape
        .properties
        .iter()
        .map(|p| {
            format!(
                "{}{}:{}",
                p.name,
                if p.required { "!" } else { "" },
                node_signature(&p.schema)
            )
        })
        .collect();
    properties.sort();

    let mut signature = format!("{{{}}}", properties.join(","));
    if let Some(additional) = &shape.additional {
        signature.push('+');
        signature.push_str(&node_signature(additional));
    }
    signature
}

fn node_signature(node: &SchemaNode) -> String {
    let base = match &node.kind {
        SchemaKind::String => "string".to_string(),
        SchemaKind::Integer => "integer".to_string(),
        SchemaKind::Number => "number".to_string(),
        SchemaKind::Boolean => "boolean".to_string(),
        SchemaKind::Array { items } => format!("[{}]", node_signature(items)),
        SchemaKind::Object(shape) => shape_signature(shape),
        SchemaKind::Reference(name) => format!("${name}"),
        SchemaKind::Any => "any".to_string(),
    };

    let mut signature = base;
    if let Some(format) = &node.format {
        signature.push('/');
        signature.push_str(format);
    }
    if node.nullable {
        signature.push('?');
    }
    if !node.enum_values.is_empty() {
        signature.push_str(&format!("<{}>", node.enum_values.join("|")));
    }
    signature
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::Property;

    fn prop(name: &str, required: bool, schema: SchemaNode) -> Property {
        Property {
            name: name.to_string(),
            required,
            schema,
        }
    }

    fn object(properties: Vec<Property>) -> SchemaNode {
        SchemaNode::new(SchemaKind::Object(ObjectShape {
            properties,
            additional: None,
        }))
    }

    #[test]
    fn test_primitive_formats_are_distinct() {
        let int = SchemaNode::new(SchemaKind::Integer);
        let int64 = SchemaNode::new(SchemaKind::Integer).with_format("int64");
        let timestamp = SchemaNode::new(SchemaKind::String).with_format("date-time");
        assert_eq!(primitive_for(&int), Primitive::Int);
        assert_eq!(primitive_for(&int64), Primitive::Int64);
        assert_eq!(primitive_for(&timestamp), Primitive::DateTime);
        assert_eq!(primitive_for(&SchemaNode::new(SchemaKind::String)), Primitive::String);
    }

    #[test]
    fn test_identical_inline_shapes_share_one_type() {
        let mut names = NamingRegistry::new();
        let mut registry = TypeRegistry::new(OptionalStyle::Pointer);
        let a = object(vec![
            prop("id", true, SchemaNode::new(SchemaKind::Integer)),
            prop("name", false, SchemaNode::new(SchemaKind::String)),
        ]);
        // same shape, different property order
        let b = object(vec![
            prop("name", false, SchemaNode::new(SchemaKind::String)),
            prop("id", true, SchemaNode::new(SchemaKind::Integer)),
        ]);

        let first = registry.map_schema(&a, "ListPetsResponse", Some("ListPets"), &mut names);
        let second = registry.map_schema(&b, "GetPetResponse", Some("GetPet"), &mut names);
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);

        let named = registry.get("ListPetsResponse").unwrap();
        assert_eq!(named.owners.len(), 2);
        assert_eq!(named.single_owner(), None);
    }

    #[test]
    fn test_reused_shape_passes_owner_to_nested_types() {
        let mut names = NamingRegistry::new();
        let mut registry = TypeRegistry::new(OptionalStyle::Pointer);
        let shape = || {
            object(vec![prop(
                "inner",
                true,
                object(vec![prop("code", true, SchemaNode::new(SchemaKind::String))]),
            )])
        };

        registry.map_schema(&shape(), "GetAResponse", Some("GetA"), &mut names);
        registry.map_schema(&shape(), "GetBResponse", Some("GetB"), &mut names);
        assert_eq!(registry.len(), 2);

        let inner = registry.get("GetAResponseInner").unwrap();
        let owners: Vec<&str> = inner.owners.iter().map(String::as_str).collect();
        assert_eq!(owners, vec!["GetA", "GetB"]);
        assert_eq!(inner.single_owner(), None);
    }

    #[test]
    fn test_components_keep_their_own_name() {
        let mut names = NamingRegistry::new();
        let mut registry = TypeRegistry::new(OptionalStyle::Pointer);
        let shape = || object(vec![prop("id", true, SchemaNode::new(SchemaKind::Integer))]);
        let mut schemas = IndexMap::new();
        schemas.insert("Cat".to_string(), shape());
        schemas.insert("Dog".to_string(), shape());
        registry.register_components(&schemas, &mut names);

        assert!(registry.get("Cat").is_some());
        assert!(registry.get("Dog").is_some());
    }

    #[test]
    fn test_self_reference_resolves_without_expansion() {
        let mut names = NamingRegistry::new();
        let mut registry = TypeRegistry::new(OptionalStyle::Pointer);
        let mut schemas = IndexMap::new();
        schemas.insert(
            "Node".to_string(),
            object(vec![
                prop(
                    "children",
                    true,
                    SchemaNode::new(SchemaKind::Array {
                        items: Box::new(SchemaNode::reference("Node")),
                    }),
                ),
                prop("parent", false, SchemaNode::reference("Node")),
            ]),
        );
        registry.register_components(&schemas, &mut names);

        let NamedBody::Struct { fields } = &registry.get("Node").unwrap().body else {
            panic!("expected struct");
        };
        assert_eq!(fields[0].ty.to_string(), "[]Node");
        assert_eq!(fields[1].ty.to_string(), "*Node");
    }

    #[test]
    fn test_optional_wrapping_policy() {
        let mut names = NamingRegistry::new();
        let mut registry = TypeRegistry::new(OptionalStyle::Pointer);
        let mut nullable = SchemaNode::new(SchemaKind::String);
        nullable.nullable = true;
        let node = object(vec![
            prop("id", true, SchemaNode::new(SchemaKind::Integer).with_format("int64")),
            prop("tag", false, SchemaNode::new(SchemaKind::String)),
            prop("note", true, nullable),
        ]);
        let ty = registry.map_schema(&node, "Item", None, &mut names);
        let NamedBody::Struct { fields } = &registry.get(&ty.to_string()).unwrap().body else {
            panic!("expected struct");
        };
        assert_eq!(fields[0].ty.optional_depth(), 0);
        assert_eq!(fields[1].ty.optional_depth(), 1);
        assert_eq!(fields[2].ty.optional_depth(), 0);

        let value_style = TypeRegistry::new(OptionalStyle::Value);
        assert_eq!(value_style.field_type(TypeDescriptor::string(), false).optional_depth(), 0);
        // re-applying the policy never nests
        let once = registry.field_type(TypeDescriptor::string(), false);
        assert_eq!(registry.field_type(once, false).optional_depth(), 1);
    }

    #[test]
    fn test_additional_properties_only_is_a_map() {
        let mut names = NamingRegistry::new();
        let mut registry = TypeRegistry::new(OptionalStyle::Pointer);
        let node = SchemaNode::new(SchemaKind::Object(ObjectShape {
            properties: vec![],
            additional: Some(Box::new(SchemaNode::new(SchemaKind::Integer))),
        }));
        let ty = registry.map_schema(&node, "Counts", None, &mut names);
        assert_eq!(ty.to_string(), "map[string]int");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unresolved_reference_degrades_to_any() {
        let mut names = NamingRegistry::new();
        let mut registry = TypeRegistry::new(OptionalStyle::Pointer);
        let ty = registry.map_schema(&SchemaNode::reference("Missing"), "X", None, &mut names);
        assert_eq!(ty, TypeDescriptor::Any);
        assert_eq!(registry.take_issues().len(), 1);
    }

    #[test]
    fn test_enum_values_appended_to_doc() {
        let mut node = SchemaNode::new(SchemaKind::String);
        node.description = Some("Pet status".into());
        node.enum_values = vec!["available".into(), "sold".into()];
        let doc = schema_doc(&node);
        assert_eq!(doc.lines(), &["Pet status", "Allowed values: available, sold"]);
    }
}
