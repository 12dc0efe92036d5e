//! Normalized property schemas.
//!
//! Every language backend converts argument expressions into the same
//! `PropertySchema` tree. Serialized form:
//!
//! ```json
//! {"kind": "primitive", "type": "string"}
//! {"kind": "array", "items": {"kind": "primitive", "type": "number"}}
//! {"kind": "object", "fields": {"id": {"kind": "primitive", "type": "string"}}}
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Property name to schema. Keys are unique; ordering is by name.
pub type Properties = BTreeMap<String, PropertySchema>;

/// Leaf type of a primitive schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PrimitiveType {
    String,
    Number,
    Boolean,
    Null,
    Any,
    /// Union labels (`string | undefined`) and named types that were not expanded.
    Label(String),
}

impl PrimitiveType {
    pub fn as_str(&self) -> &str {
        match self {
            PrimitiveType::String => "string",
            PrimitiveType::Number => "number",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Null => "null",
            PrimitiveType::Any => "any",
            PrimitiveType::Label(label) => label,
        }
    }
}

impl From<String> for PrimitiveType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "string" => PrimitiveType::String,
            "number" => PrimitiveType::Number,
            "boolean" => PrimitiveType::Boolean,
            "null" => PrimitiveType::Null,
            "any" => PrimitiveType::Any,
            _ => PrimitiveType::Label(s),
        }
    }
}

impl From<PrimitiveType> for String {
    fn from(t: PrimitiveType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recursive schema of a tracked property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PropertySchema {
    Primitive {
        #[serde(rename = "type")]
        ty: PrimitiveType,
    },
    Array {
        items: Box<PropertySchema>,
    },
    Object {
        fields: Properties,
    },
}

impl PropertySchema {
    pub fn primitive(ty: PrimitiveType) -> Self {
        PropertySchema::Primitive { ty }
    }

    pub fn string() -> Self {
        Self::primitive(PrimitiveType::String)
    }

    pub fn number() -> Self {
        Self::primitive(PrimitiveType::Number)
    }

    pub fn boolean() -> Self {
        Self::primitive(PrimitiveType::Boolean)
    }

    pub fn null() -> Self {
        Self::primitive(PrimitiveType::Null)
    }

    pub fn any() -> Self {
        Self::primitive(PrimitiveType::Any)
    }

    /// A primitive from a type name, mapping the well-known names.
    pub fn label(name: impl Into<String>) -> Self {
        Self::primitive(PrimitiveType::from(name.into()))
    }

    pub fn array(items: PropertySchema) -> Self {
        PropertySchema::Array {
            items: Box::new(items),
        }
    }

    pub fn object(fields: Properties) -> Self {
        PropertySchema::Object { fields }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, PropertySchema::Primitive { ty: PrimitiveType::Any })
    }

    /// Label used when this schema takes part in a union.
    pub fn type_label(&self) -> String {
        match self {
            PropertySchema::Primitive { ty } => ty.as_str().to_string(),
            PropertySchema::Array { items } => format!("{}[]", items.type_label()),
            PropertySchema::Object { .. } => "object".to_string(),
        }
    }

    /// Union of member schemas, in the given order.
    ///
    /// Duplicates collapse; a single distinct member is returned as is.
    pub fn union(members: Vec<PropertySchema>) -> Self {
        let mut distinct: Vec<PropertySchema> = Vec::new();
        for member in members {
            if !distinct.contains(&member) {
                distinct.push(member);
            }
        }
        match distinct.len() {
            0 => Self::any(),
            1 => distinct.remove(0),
            _ => {
                let labels: Vec<String> = distinct.iter().map(PropertySchema::type_label).collect();
                Self::label(labels.join(" | "))
            }
        }
    }
}

/// Merge `from` into `into`; keys from `from` overwrite.
pub fn merge_properties(into: &mut Properties, from: Properties) {
    for (key, schema) in from {
        into.insert(key, schema);
    }
}

/// Item schema for an array literal.
///
/// Identical elements share their schema, object elements merge their
/// fields, heterogeneous primitives become a sorted union label, and an empty
/// literal is `any`.
pub fn infer_array_items(elements: Vec<PropertySchema>) -> PropertySchema {
    if elements.is_empty() {
        return PropertySchema::any();
    }
    if elements.iter().all(|e| *e == elements[0]) {
        return elements[0].clone();
    }

    if elements
        .iter()
        .any(|e| matches!(e, PropertySchema::Object { .. }))
    {
        let mut fields = Properties::new();
        for element in elements {
            if let PropertySchema::Object { fields: f } = element {
                merge_properties(&mut fields, f);
            }
        }
        return PropertySchema::object(fields);
    }

    let mut labels: Vec<String> = elements.iter().map(PropertySchema::type_label).collect();
    labels.sort();
    labels.dedup();
    PropertySchema::label(labels.join(" | "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(fields: &[(&str, PropertySchema)]) -> PropertySchema {
        PropertySchema::object(
            fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_serialized_shape() {
        let schema = obj(&[
            ("plan", PropertySchema::string()),
            ("items", PropertySchema::array(obj(&[("sku", PropertySchema::string())]))),
        ]);
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["kind"], "object");
        assert_eq!(json["fields"]["plan"]["type"], "string");
        assert_eq!(json["fields"]["items"]["kind"], "array");
        assert_eq!(json["fields"]["items"]["items"]["kind"], "object");
        assert_eq!(json["fields"]["items"]["items"]["fields"]["sku"]["kind"], "primitive");

        let back: PropertySchema = serde_json::from_value(json).unwrap();
        assert_eq!(back, schema);
    }

    #[test]
    fn test_label_maps_known_names() {
        assert_eq!(PropertySchema::label("number"), PropertySchema::number());
        assert_eq!(
            PropertySchema::label("string | undefined"),
            PropertySchema::primitive(PrimitiveType::Label("string | undefined".into()))
        );
    }

    #[test]
    fn test_array_items_of_objects_merge() {
        let items = infer_array_items(vec![
            obj(&[("a", PropertySchema::number())]),
            obj(&[("b", PropertySchema::string())]),
        ]);
        assert_eq!(
            items,
            obj(&[("a", PropertySchema::number()), ("b", PropertySchema::string())])
        );
    }

    #[test]
    fn test_array_items_mixed_primitives_union() {
        let items = infer_array_items(vec![
            PropertySchema::string(),
            PropertySchema::number(),
            PropertySchema::string(),
        ]);
        assert_eq!(items, PropertySchema::label("number | string"));
        assert!(infer_array_items(vec![]).is_any());
    }

    #[test]
    fn test_union_keeps_source_order() {
        let u = PropertySchema::union(vec![
            PropertySchema::string(),
            PropertySchema::label("undefined"),
        ]);
        assert_eq!(u.type_label(), "string | undefined");
        assert_eq!(
            PropertySchema::union(vec![PropertySchema::number(), PropertySchema::number()]),
            PropertySchema::number()
        );
    }

    #[test]
    fn test_merge_overwrites() {
        let mut a = Properties::new();
        a.insert("x".into(), PropertySchema::string());
        a.insert("y".into(), PropertySchema::string());
        let mut b = Properties::new();
        b.insert("y".into(), PropertySchema::number());
        b.insert("z".into(), PropertySchema::boolean());
        merge_properties(&mut a, b);
        assert_eq!(a.len(), 3);
        assert_eq!(a["y"], PropertySchema::number());
    }
}
