//! Intermediate tree the picker assembles before decoding an input.
//!
//! JSON-sourced members stay JSON and decode strictly. Text-sourced members (query
//! values, headers, cookies) are converted on demand to whatever scalar the target
//! field asks for.

use std::collections::BTreeMap;

use serde::de::value::{MapDeserializer, SeqDeserializer};
use serde::de::{self, IntoDeserializer, Unexpected, Visitor};
use serde::forward_to_deserialize_any;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Node {
    Json(Value),
    Text(String),
    Map(BTreeMap<String, Node>),
    Seq(BTreeMap<usize, Node>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Segment {
    Key(String),
    Index(usize),
}

impl Node {
    /// Set `leaf` at `path`, turning intermediate JSON containers into tree nodes.
    ///
    /// Writing text where text already sits turns the slot into a list, so that
    /// repeated query keys collect.
    pub(crate) fn set(&mut self, path: &[Segment], leaf: Node) {
        let Some((head, rest)) = path.split_first() else {
            *self = match (std::mem::replace(self, Node::Json(Value::Null)), leaf) {
                (Node::Text(prev), Node::Text(next)) => {
                    Node::Seq(BTreeMap::from([(0, Node::Text(prev)), (1, Node::Text(next))]))
                }
                (Node::Seq(mut items), Node::Text(next)) if is_text_list(&items) => {
                    items.insert(items.len(), Node::Text(next));
                    Node::Seq(items)
                }
                (_, leaf) => leaf,
            };
            return;
        };

        match head {
            Segment::Key(key) => {
                self.expand_object();
                if let Node::Map(map) = self {
                    map.entry(key.clone())
                        .or_insert(Node::Json(Value::Null))
                        .set(rest, leaf);
                }
            }
            Segment::Index(idx) => {
                self.expand_array();
                if let Node::Seq(items) = self {
                    items
                        .entry(*idx)
                        .or_insert(Node::Json(Value::Null))
                        .set(rest, leaf);
                }
            }
        }
    }

    fn expand_object(&mut self) {
        match std::mem::replace(self, Node::Map(BTreeMap::new())) {
            Node::Json(Value::Object(obj)) => {
                *self = Node::Map(obj.into_iter().map(|(k, v)| (k, Node::Json(v))).collect());
            }
            Node::Map(map) => *self = Node::Map(map),
            _ => {}
        }
    }

    fn expand_array(&mut self) {
        match std::mem::replace(self, Node::Seq(BTreeMap::new())) {
            Node::Json(Value::Array(items)) => {
                *self = Node::Seq(items.into_iter().map(Node::Json).enumerate().collect());
            }
            Node::Seq(items) => *self = Node::Seq(items),
            _ => {}
        }
    }
}

fn is_text_list(items: &BTreeMap<usize, Node>) -> bool {
    items.values().all(|n| matches!(n, Node::Text(_)))
}

type Error = serde_json::Error;

impl<'de> IntoDeserializer<'de, Error> for Node {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

fn visit_map<'de, V: Visitor<'de>>(map: BTreeMap<String, Node>, visitor: V) -> Result<V::Value, Error> {
    let mut access: MapDeserializer<'de, _, Error> = MapDeserializer::new(map.into_iter());
    let value = visitor.visit_map(&mut access)?;
    access.end()?;
    Ok(value)
}

fn visit_seq<'de, V: Visitor<'de>>(
    items: impl Iterator<Item = Node>,
    visitor: V,
) -> Result<V::Value, Error> {
    let mut access: SeqDeserializer<_, Error> = SeqDeserializer::new(items);
    let value = visitor.visit_seq(&mut access)?;
    access.end()?;
    Ok(value)
}

macro_rules! text_scalar {
    ($($method:ident => $visit:ident: $ty:ty),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
                match self {
                    Node::Text(s) => match s.trim().parse::<$ty>() {
                        Ok(v) => visitor.$visit(v),
                        Err(_) => Err(de::Error::invalid_value(Unexpected::Str(&s), &visitor)),
                    },
                    Node::Json(v) => de::Deserializer::$method(v, visitor),
                    other => de::Deserializer::deserialize_any(other, visitor),
                }
            }
        )*
    };
}

impl<'de> de::Deserializer<'de> for Node {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self {
            Node::Json(v) => de::Deserializer::deserialize_any(v, visitor),
            Node::Text(s) => visitor.visit_string(s),
            Node::Map(map) => visit_map(map, visitor),
            Node::Seq(items) => visit_seq(items.into_values(), visitor),
        }
    }

    text_scalar! {
        deserialize_bool => visit_bool: bool,
        deserialize_i8 => visit_i8: i8,
        deserialize_i16 => visit_i16: i16,
        deserialize_i32 => visit_i32: i32,
        deserialize_i64 => visit_i64: i64,
        deserialize_u8 => visit_u8: u8,
        deserialize_u16 => visit_u16: u16,
        deserialize_u32 => visit_u32: u32,
        deserialize_u64 => visit_u64: u64,
        deserialize_f32 => visit_f32: f32,
        deserialize_f64 => visit_f64: f64,
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self {
            Node::Json(v) => de::Deserializer::deserialize_option(v, visitor),
            other => visitor.visit_some(other),
        }
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self {
            Node::Json(v) => de::Deserializer::deserialize_seq(v, visitor),
            // a single query value for a list field
            Node::Text(s) => visit_seq(std::iter::once(Node::Text(s)), visitor),
            other => de::Deserializer::deserialize_any(other, visitor),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Error> {
        match self {
            Node::Json(v) => de::Deserializer::deserialize_newtype_struct(v, name, visitor),
            other => visitor.visit_newtype_struct(other),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        match self {
            Node::Json(v) => de::Deserializer::deserialize_enum(v, name, variants, visitor),
            Node::Text(s) => visitor.visit_enum(s.into_deserializer()),
            other => de::Deserializer::deserialize_any(other, visitor),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        match self {
            Node::Json(v) => de::Deserializer::deserialize_struct(v, name, fields, visitor),
            other => de::Deserializer::deserialize_any(other, visitor),
        }
    }

    forward_to_deserialize_any! {
        i128 u128 char str string bytes byte_buf unit unit_struct
        tuple tuple_struct map identifier ignored_any
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn key(k: &str) -> Segment {
        Segment::Key(k.to_owned())
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Target {
        n: u32,
        flag: bool,
        ratio: f64,
        name: String,
        maybe: Option<i64>,
        tags: Vec<String>,
    }

    #[test]
    fn text_scalars_are_converted_on_demand() {
        let mut root = Node::Json(json!({ "tags": [] }));
        root.set(&[key("n")], Node::Text("7".to_owned()));
        root.set(&[key("flag")], Node::Text("true".to_owned()));
        root.set(&[key("ratio")], Node::Text("0.5".to_owned()));
        root.set(&[key("name")], Node::Text("42".to_owned()));
        root.set(&[key("maybe")], Node::Text("-3".to_owned()));

        let t = Target::deserialize(root).unwrap();
        assert_eq!(
            t,
            Target {
                n: 7,
                flag: true,
                ratio: 0.5,
                name: "42".to_owned(),
                maybe: Some(-3),
                tags: vec![]
            }
        );
    }

    #[test]
    fn repeated_text_collects_into_list() {
        let mut root = Node::Json(json!({}));
        root.set(&[key("tags")], Node::Text("a".to_owned()));
        root.set(&[key("tags")], Node::Text("b".to_owned()));
        root.set(&[key("tags")], Node::Text("c".to_owned()));
        let v = Value::deserialize(root).unwrap();
        assert_eq!(v, json!({ "tags": ["a", "b", "c"] }));
    }

    #[test]
    fn indexed_paths_build_nested_lists() {
        let mut root = Node::Json(json!({ "items": [{ "k": "x", "keep": 1 }] }));
        root.set(
            &[key("items"), Segment::Index(0), key("k")],
            Node::Text("y".to_owned()),
        );
        root.set(
            &[key("items"), Segment::Index(1), key("k")],
            Node::Text("z".to_owned()),
        );
        let v = Value::deserialize(root).unwrap();
        assert_eq!(v, json!({ "items": [{ "k": "y", "keep": 1 }, { "k": "z" }] }));
    }

    #[test]
    fn bad_scalar_text_is_an_error() {
        let mut root = Node::Json(json!({ "flag": false, "ratio": 0.0, "name": "", "tags": [] }));
        root.set(&[key("n")], Node::Text("seven".to_owned()));
        assert!(Target::deserialize(root).is_err());
    }
}
