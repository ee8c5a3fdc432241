use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A node of an HTML syntax tree, as produced by an external parser.
///
/// The union is closed: anything whose `type` discriminator is not one of
/// the recognized kinds lands in [`Unknown`], which the sanitizer treats
/// as a transparent container at best.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Root(Root),
    Element(Element),
    Text(Text),
    Comment(Comment),
    Doctype(Doctype),
    Unknown(Unknown),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Root {
    pub children: Vec<Node>,
    pub data: Option<Value>,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag_name: String,
    pub properties: BTreeMap<String, PropertyValue>,
    pub children: Vec<Node>,
    pub data: Option<Value>,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Text {
    pub value: String,
    pub data: Option<Value>,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Comment {
    pub value: String,
    pub data: Option<Value>,
    pub position: Option<Position>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Doctype {
    pub name: Option<String>,
    pub data: Option<Value>,
    pub position: Option<Position>,
}

/// A node with an unrecognized `type`. `children` is `Some` only when the
/// input carried a children sequence, which matters to the sanitizer:
/// unknown containers are unwrapped, childless unknowns are dropped.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Unknown {
    pub kind: String,
    pub tag_name: Option<String>,
    pub children: Option<Vec<Node>>,
    pub data: Option<Value>,
    pub position: Option<Position>,
}

/// Source span copied verbatim from input to output, never synthesized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub start: Point,
    pub end: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub line: u64,
    pub column: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

/// A single attribute value. Anything else (objects, null) is invalid
/// and is dropped at the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(f64),
    String(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(value) => write!(f, "{value}"),
            Scalar::Number(value) => write!(f, "{value}"),
            Scalar::String(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Number(value as f64)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl From<Scalar> for PropertyValue {
    fn from(value: Scalar) -> Self {
        PropertyValue::Scalar(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Scalar(Scalar::Bool(value))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Scalar(Scalar::Number(value))
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Scalar(Scalar::Number(value as f64))
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Scalar(Scalar::String(value.to_string()))
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Scalar(Scalar::String(value))
    }
}

impl From<Vec<Scalar>> for PropertyValue {
    fn from(values: Vec<Scalar>) -> Self {
        PropertyValue::List(values)
    }
}

impl Node {
    pub fn root(children: Vec<Node>) -> Node {
        Node::Root(Root {
            children,
            data: None,
            position: None,
        })
    }

    pub fn element(
        tag_name: impl Into<String>,
        properties: BTreeMap<String, PropertyValue>,
        children: Vec<Node>,
    ) -> Node {
        Node::Element(Element {
            tag_name: tag_name.into(),
            properties,
            children,
            data: None,
            position: None,
        })
    }

    pub fn text(value: impl Into<String>) -> Node {
        Node::Text(Text {
            value: value.into(),
            data: None,
            position: None,
        })
    }

    pub fn comment(value: impl Into<String>) -> Node {
        Node::Comment(Comment {
            value: value.into(),
            data: None,
            position: None,
        })
    }

    /// Lenient conversion from arbitrary JSON. Never fails: untrusted
    /// input that does not match the node contract degrades instead of
    /// erroring. Non-objects and objects without a string `type` become
    /// childless [`Unknown`] nodes (which sanitize to nothing), wrong
    /// field shapes fall back per field (non-string `value` reads as
    /// empty, invalid property values are skipped, malformed `position`
    /// reads as absent).
    pub fn from_json(value: &Value) -> Node {
        let Some(object) = value.as_object() else {
            return Node::Unknown(Unknown::default());
        };
        let Some(kind) = object.get("type").and_then(Value::as_str) else {
            return Node::Unknown(Unknown::default());
        };

        let data = object.get("data").filter(|v| !v.is_null()).cloned();
        let position = object
            .get("position")
            .and_then(|v| Position::deserialize(v).ok());

        match kind {
            "root" => Node::Root(Root {
                children: children_from(object).unwrap_or_default(),
                data,
                position,
            }),
            "element" => Node::Element(Element {
                tag_name: object
                    .get("tagName")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                properties: properties_from(object.get("properties")),
                children: children_from(object).unwrap_or_default(),
                data,
                position,
            }),
            "text" => Node::Text(Text {
                value: string_field(object, "value"),
                data,
                position,
            }),
            "comment" => Node::Comment(Comment {
                value: string_field(object, "value"),
                data,
                position,
            }),
            "doctype" => Node::Doctype(Doctype {
                name: object
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                data,
                position,
            }),
            other => Node::Unknown(Unknown {
                kind: other.to_string(),
                tag_name: object
                    .get("tagName")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                children: children_from(object),
                data,
                position,
            }),
        }
    }

    /// Serialize to the hast JSON shape: a `type` discriminator plus
    /// camelCase fields; elements always carry `properties` and
    /// `children`, roots always carry `children`.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        let (data, position) = match self {
            Node::Root(root) => {
                object.insert("type".to_string(), Value::from("root"));
                object.insert("children".to_string(), children_to_json(&root.children));
                (&root.data, &root.position)
            }
            Node::Element(element) => {
                object.insert("type".to_string(), Value::from("element"));
                object.insert("tagName".to_string(), Value::from(element.tag_name.clone()));
                let properties: Map<String, Value> = element
                    .properties
                    .iter()
                    .map(|(name, value)| (name.clone(), json_value(value)))
                    .collect();
                object.insert("properties".to_string(), Value::Object(properties));
                object.insert("children".to_string(), children_to_json(&element.children));
                (&element.data, &element.position)
            }
            Node::Text(text) => {
                object.insert("type".to_string(), Value::from("text"));
                object.insert("value".to_string(), Value::from(text.value.clone()));
                (&text.data, &text.position)
            }
            Node::Comment(comment) => {
                object.insert("type".to_string(), Value::from("comment"));
                object.insert("value".to_string(), Value::from(comment.value.clone()));
                (&comment.data, &comment.position)
            }
            Node::Doctype(doctype) => {
                object.insert("type".to_string(), Value::from("doctype"));
                if let Some(name) = &doctype.name {
                    object.insert("name".to_string(), Value::from(name.clone()));
                }
                (&doctype.data, &doctype.position)
            }
            Node::Unknown(unknown) => {
                object.insert("type".to_string(), Value::from(unknown.kind.clone()));
                if let Some(tag_name) = &unknown.tag_name {
                    object.insert("tagName".to_string(), Value::from(tag_name.clone()));
                }
                if let Some(children) = &unknown.children {
                    object.insert("children".to_string(), children_to_json(children));
                }
                (&unknown.data, &unknown.position)
            }
        };
        if let Some(data) = data {
            object.insert("data".to_string(), data.clone());
        }
        if let Some(position) = position
            && let Ok(span) = serde_json::to_value(position)
        {
            object.insert("position".to_string(), span);
        }
        Value::Object(object)
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Node::from_json(&value))
    }
}

fn children_from(object: &Map<String, Value>) -> Option<Vec<Node>> {
    let children = object.get("children")?.as_array()?;
    Some(children.iter().map(Node::from_json).collect())
}

fn children_to_json(children: &[Node]) -> Value {
    Value::Array(children.iter().map(Node::to_json).collect())
}

fn string_field(object: &Map<String, Value>, field: &str) -> String {
    object
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn properties_from(value: Option<&Value>) -> BTreeMap<String, PropertyValue> {
    let Some(object) = value.and_then(Value::as_object) else {
        return BTreeMap::new();
    };
    object
        .iter()
        .filter_map(|(name, value)| Some((name.clone(), property_value_from(value)?)))
        .collect()
}

fn property_value_from(value: &Value) -> Option<PropertyValue> {
    match value {
        Value::Array(items) => Some(PropertyValue::List(
            items.iter().filter_map(scalar_from).collect(),
        )),
        other => scalar_from(other).map(PropertyValue::Scalar),
    }
}

fn scalar_from(value: &Value) -> Option<Scalar> {
    match value {
        Value::Bool(value) => Some(Scalar::Bool(*value)),
        Value::Number(value) => value.as_f64().map(Scalar::Number),
        Value::String(value) => Some(Scalar::String(value.clone())),
        _ => None,
    }
}

fn json_value(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Scalar(scalar) => scalar_to_json(scalar),
        PropertyValue::List(items) => Value::Array(items.iter().map(scalar_to_json).collect()),
    }
}

fn scalar_to_json(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Bool(value) => Value::from(*value),
        Scalar::Number(value) => serde_json::Number::from_f64(*value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::from(value.to_string())),
        Scalar::String(value) => Value::from(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_object_input_becomes_childless_unknown() {
        for value in [json!(true), json!(null), json!(1), json!([])] {
            let node = Node::from_json(&value);
            assert_eq!(node, Node::Unknown(Unknown::default()), "{value}");
        }
    }

    #[test]
    fn object_without_type_becomes_childless_unknown() {
        let node = Node::from_json(&json!({"children": [{"type": "text", "value": "x"}]}));
        assert_eq!(node, Node::Unknown(Unknown::default()));
    }

    #[test]
    fn unknown_type_keeps_its_children_sequence() {
        let node = Node::from_json(&json!({
            "type": "directive",
            "name": "!alpha",
            "children": [{"type": "text", "value": "x"}]
        }));
        let Node::Unknown(unknown) = node else {
            panic!("expected unknown node");
        };
        assert_eq!(unknown.kind, "directive");
        assert_eq!(unknown.children, Some(vec![Node::text("x")]));
    }

    #[test]
    fn non_string_text_value_reads_as_empty() {
        let node = Node::from_json(&json!({"type": "text", "value": {"evil": true}}));
        assert_eq!(node, Node::text(""));
    }

    #[test]
    fn invalid_property_shapes_are_skipped() {
        let node = Node::from_json(&json!({
            "type": "element",
            "tagName": "img",
            "properties": {
                "alt": "ok",
                "width": 1,
                "hidden": true,
                "className": ["a", 2, [3], {"evil": true}],
                "onError": null,
                "style": {"evil": true}
            }
        }));
        let Node::Element(element) = node else {
            panic!("expected element");
        };
        assert_eq!(
            element.properties,
            BTreeMap::from([
                ("alt".to_string(), PropertyValue::from("ok")),
                ("width".to_string(), PropertyValue::from(1.0)),
                ("hidden".to_string(), PropertyValue::from(true)),
                (
                    "className".to_string(),
                    PropertyValue::List(vec![Scalar::from("a"), Scalar::from(2.0)])
                ),
            ])
        );
        assert!(element.children.is_empty());
    }

    #[test]
    fn malformed_position_reads_as_absent() {
        let node = Node::from_json(&json!({
            "type": "text",
            "value": "x",
            "position": {"start": {"line": "nope"}}
        }));
        let Node::Text(text) = node else {
            panic!("expected text");
        };
        assert_eq!(text.position, None);
    }

    #[test]
    fn element_serializes_with_properties_and_children() {
        let node = Node::element(
            "a",
            BTreeMap::from([("href".to_string(), PropertyValue::from("#top"))]),
            vec![Node::text("up")],
        );
        assert_eq!(
            node.to_json(),
            json!({
                "type": "element",
                "tagName": "a",
                "properties": {"href": "#top"},
                "children": [{"type": "text", "value": "up"}]
            })
        );
    }

    #[test]
    fn json_round_trip_preserves_data_and_position() {
        let input = json!({
            "type": "root",
            "children": [{
                "type": "text",
                "value": "x",
                "data": {"anything": [1, 2]},
                "position": {
                    "start": {"line": 1, "column": 1},
                    "end": {"line": 1, "column": 2}
                }
            }]
        });
        let node = Node::from_json(&input);
        assert_eq!(node.to_json(), input);
    }
}
