//! Conversion of `openapiv3` schema objects into [`SchemaNode`]s.
//!
//! Both dialects funnel through here: Swagger 2 schema objects are decoded
//! with the same `openapiv3` types since the subset we read is shared.

use super::model::{ObjectShape, Property, SchemaKind, SchemaNode};
use openapiv3::{
    AdditionalProperties, IntegerFormat, NumberFormat, ReferenceOr, Schema, SchemaKind as OaKind,
    StringFormat, Type, VariantOrUnknownOrEmpty,
};

/// `#/components/schemas/Pet` or `#/definitions/Pet` -> `Pet`
pub fn reference_name(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

pub fn convert_ref(schema_ref: &ReferenceOr<Schema>) -> SchemaNode {
    match schema_ref {
        ReferenceOr::Reference { reference } => SchemaNode::reference(reference_name(reference)),
        ReferenceOr::Item(schema) => convert(schema),
    }
}

pub fn convert_boxed_ref(schema_ref: &ReferenceOr<Box<Schema>>) -> SchemaNode {
    match schema_ref {
        ReferenceOr::Reference { reference } => SchemaNode::reference(reference_name(reference)),
        ReferenceOr::Item(schema) => convert(schema),
    }
}

fn format_name<T: std::fmt::Debug>(
    format: &VariantOrUnknownOrEmpty<T>,
    known: impl Fn(&T) -> &'static str,
) -> Option<String> {
    match format {
        VariantOrUnknownOrEmpty::Item(item) => Some(known(item).to_string()),
        VariantOrUnknownOrEmpty::Unknown(other) => Some(other.clone()),
        VariantOrUnknownOrEmpty::Empty => None,
    }
}

pub fn convert(schema: &Schema) -> SchemaNode {
    let data = &schema.schema_data;
    // Swagger 2 spells nullability as a vendor extension
    let nullable = data.nullable
        || data
            .extensions
            .get("x-nullable")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

    let mut node = match &schema.schema_kind {
        OaKind::Type(Type::String(string_type)) => {
            let mut node = SchemaNode::new(SchemaKind::String);
            node.format = format_name(&string_type.format, |f| match f {
                StringFormat::Date => "date",
                StringFormat::DateTime => "date-time",
                StringFormat::Password => "password",
                StringFormat::Byte => "byte",
                StringFormat::Binary => "binary",
            });
            node.enum_values = string_type.enumeration.iter().flatten().cloned().collect();
            node
        }
        OaKind::Type(Type::Integer(int_type)) => {
            let mut node = SchemaNode::new(SchemaKind::Integer);
            node.format = format_name(&int_type.format, |f| match f {
                IntegerFormat::Int32 => "int32",
                IntegerFormat::Int64 => "int64",
            });
            node
        }
        OaKind::Type(Type::Number(num_type)) => {
            let mut node = SchemaNode::new(SchemaKind::Number);
            node.format = format_name(&num_type.format, |f| match f {
                NumberFormat::Float => "float",
                NumberFormat::Double => "double",
            });
            node
        }
        OaKind::Type(Type::Boolean(_)) => SchemaNode::new(SchemaKind::Boolean),
        OaKind::Type(Type::Array(array_type)) => {
            let items = array_type
                .items
                .as_ref()
                .map(convert_boxed_ref)
                .unwrap_or_else(SchemaNode::any);
            SchemaNode::new(SchemaKind::Array {
                items: Box::new(items),
            })
        }
        OaKind::Type(Type::Object(obj_type)) => {
            let properties = obj_type
                .properties
                .iter()
                .map(|(name, prop)| Property {
                    name: name.clone(),
                    required: obj_type.required.contains(name),
                    schema: convert_boxed_ref(prop),
                })
                .collect();

            let additional = match &obj_type.additional_properties {
                Some(AdditionalProperties::Schema(inner)) => Some(Box::new(convert_ref(inner))),
                Some(AdditionalProperties::Any(true)) => Some(Box::new(SchemaNode::any())),
                Some(AdditionalProperties::Any(false)) | None => None,
            };

            SchemaNode::new(SchemaKind::Object(ObjectShape {
                properties,
                additional,
            }))
        }
        // A single-member allOf is the usual way to attach docs to a $ref
        OaKind::AllOf { all_of } if all_of.len() == 1 => convert_ref(&all_of[0]),
        OaKind::AllOf { all_of } => merge_all_of(all_of),
        OaKind::OneOf { .. } | OaKind::AnyOf { .. } | OaKind::Not { .. } | OaKind::Any(_) => {
            SchemaNode::any()
        }
    };

    node.nullable = node.nullable || nullable;
    if node.description.is_none() {
        node.description = data.description.clone();
    }
    node
}

/// Inline object members of an `allOf` are merged; referenced members cannot
/// be flattened without the component table, so a mix degrades to `Any`.
fn merge_all_of(members: &[ReferenceOr<Schema>]) -> SchemaNode {
    let mut merged = ObjectShape::default();
    for member in members {
        match convert_ref(member).kind {
            SchemaKind::Object(shape) => {
                for property in shape.properties {
                    if !merged.properties.iter().any(|p| p.name == property.name) {
                        merged.properties.push(property);
                    }
                }
                if merged.additional.is_none() {
                    merged.additional = shape.additional;
                }
            }
            _ => return SchemaNode::any(),
        }
    }
    SchemaNode::new(SchemaKind::Object(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(value: serde_json::Value) -> ReferenceOr<Schema> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_reference_name() {
        assert_eq!(reference_name("#/components/schemas/Pet"), "Pet");
        assert_eq!(reference_name("#/definitions/Error"), "Error");
    }

    #[test]
    fn test_primitive_formats() {
        let node = convert_ref(&schema(json!({ "type": "integer", "format": "int64" })));
        assert_eq!(node.kind, SchemaKind::Integer);
        assert_eq!(node.format.as_deref(), Some("int64"));

        let node = convert_ref(&schema(json!({ "type": "string", "format": "date-time" })));
        assert_eq!(node.format.as_deref(), Some("date-time"));

        let node = convert_ref(&schema(json!({ "type": "string", "format": "uuid" })));
        assert_eq!(node.format.as_deref(), Some("uuid"));
    }

    #[test]
    fn test_object_required_flags() {
        let node = convert_ref(&schema(json!({
            "type": "object",
            "required": ["id"],
            "properties": {
                "id": { "type": "integer" },
                "tag": { "type": "string" }
            }
        })));
        let SchemaKind::Object(shape) = node.kind else {
            panic!("expected object");
        };
        assert!(shape.properties[0].required);
        assert!(!shape.properties[1].required);
    }

    #[test]
    fn test_swagger_nullable_extension() {
        let node = convert_ref(&schema(json!({ "type": "string", "x-nullable": true })));
        assert!(node.nullable);
    }

    #[test]
    fn test_array_of_reference() {
        let node = convert_ref(&schema(json!({
            "type": "array",
            "items": { "$ref": "#/definitions/Pet" }
        })));
        match node.kind {
            SchemaKind::Array { items } => assert_eq!(items.reference_name(), Some("Pet")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
