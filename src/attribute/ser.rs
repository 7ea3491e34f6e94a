//! `Serialize` 型を [`AttributeValue`] に直接変換するシリアライザ。
//!
//! serde_json::value::Serializer と同じ構成だが、非有限の数値を null に
//! 置き換えず、文字列以外のマップキーも文字列化せずにエラーとする。
//! エラーには値の位置をキーパス（`device.score`、`tags[1]`）で付与する。

use serde::ser::{self, Serialize};
use thiserror::Error;

use super::{AttributeValue, Attributes};

#[derive(Debug, Error)]
#[error("{reason}")]
pub(crate) struct SerializeError {
    /// 失敗した値のキーパス。Serialize 実装が返した独自エラーでは None。
    pub(crate) path: Option<String>,
    pub(crate) reason: String,
}

impl ser::Error for SerializeError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        SerializeError {
            path: None,
            reason: msg.to_string(),
        }
    }
}

fn child(path: &str, key: &str) -> String {
    format!("{path}.{key}")
}

fn element(path: &str, index: usize) -> String {
    format!("{path}[{index}]")
}

/// `value` を `path` 位置の属性値として変換する。
pub(crate) fn to_attribute_value<T>(value: &T, path: &str) -> Result<AttributeValue, SerializeError>
where
    T: Serialize + ?Sized,
{
    value.serialize(AttributeSerializer {
        path: path.to_string(),
    })
}

struct AttributeSerializer {
    path: String,
}

impl ser::Serializer for AttributeSerializer {
    type Ok = AttributeValue;
    type Error = SerializeError;

    type SerializeSeq = SerializeList;
    type SerializeTuple = SerializeList;
    type SerializeTupleStruct = SerializeList;
    type SerializeTupleVariant = SerializeTupleVariant;
    type SerializeMap = SerializeMap;
    type SerializeStruct = SerializeMap;
    type SerializeStructVariant = SerializeStructVariant;

    fn serialize_bool(self, v: bool) -> Result<AttributeValue, SerializeError> {
        Ok(AttributeValue::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<AttributeValue, SerializeError> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_i16(self, v: i16) -> Result<AttributeValue, SerializeError> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_i32(self, v: i32) -> Result<AttributeValue, SerializeError> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_i64(self, v: i64) -> Result<AttributeValue, SerializeError> {
        Ok(AttributeValue::Number(v as f64))
    }

    fn serialize_i128(self, v: i128) -> Result<AttributeValue, SerializeError> {
        Ok(AttributeValue::Number(v as f64))
    }

    fn serialize_u8(self, v: u8) -> Result<AttributeValue, SerializeError> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_u16(self, v: u16) -> Result<AttributeValue, SerializeError> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_u32(self, v: u32) -> Result<AttributeValue, SerializeError> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_u64(self, v: u64) -> Result<AttributeValue, SerializeError> {
        Ok(AttributeValue::Number(v as f64))
    }

    fn serialize_u128(self, v: u128) -> Result<AttributeValue, SerializeError> {
        Ok(AttributeValue::Number(v as f64))
    }

    fn serialize_f32(self, v: f32) -> Result<AttributeValue, SerializeError> {
        self.serialize_f64(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<AttributeValue, SerializeError> {
        if !v.is_finite() {
            return Err(SerializeError {
                path: Some(self.path),
                reason: format!("non-finite number {v} has no structured-value representation"),
            });
        }
        Ok(AttributeValue::Number(v))
    }

    fn serialize_char(self, v: char) -> Result<AttributeValue, SerializeError> {
        Ok(AttributeValue::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<AttributeValue, SerializeError> {
        Ok(AttributeValue::String(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<AttributeValue, SerializeError> {
        Ok(AttributeValue::List(
            v.iter().map(|b| AttributeValue::Number(f64::from(*b))).collect(),
        ))
    }

    fn serialize_none(self) -> Result<AttributeValue, SerializeError> {
        Ok(AttributeValue::Null)
    }

    fn serialize_some<T>(self, value: &T) -> Result<AttributeValue, SerializeError>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<AttributeValue, SerializeError> {
        Ok(AttributeValue::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<AttributeValue, SerializeError> {
        Ok(AttributeValue::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<AttributeValue, SerializeError> {
        Ok(AttributeValue::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<AttributeValue, SerializeError>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<AttributeValue, SerializeError>
    where
        T: Serialize + ?Sized,
    {
        let inner = to_attribute_value(value, &child(&self.path, variant))?;
        Ok(AttributeValue::Map(
            Attributes::new().with_attribute(variant, inner),
        ))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SerializeList, SerializeError> {
        Ok(SerializeList {
            path: self.path,
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SerializeList, SerializeError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SerializeList, SerializeError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<SerializeTupleVariant, SerializeError> {
        Ok(SerializeTupleVariant {
            variant,
            list: SerializeList {
                path: child(&self.path, variant),
                items: Vec::with_capacity(len),
            },
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<SerializeMap, SerializeError> {
        Ok(SerializeMap {
            path: self.path,
            map: Attributes::new(),
            next_key: None,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SerializeMap, SerializeError> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<SerializeStructVariant, SerializeError> {
        Ok(SerializeStructVariant {
            variant,
            map: SerializeMap {
                path: child(&self.path, variant),
                map: Attributes::new(),
                next_key: None,
            },
        })
    }
}

pub(crate) struct SerializeList {
    path: String,
    items: Vec<AttributeValue>,
}

impl SerializeList {
    fn push<T>(&mut self, value: &T) -> Result<(), SerializeError>
    where
        T: Serialize + ?Sized,
    {
        let path = element(&self.path, self.items.len());
        self.items.push(to_attribute_value(value, &path)?);
        Ok(())
    }
}

impl ser::SerializeSeq for SerializeList {
    type Ok = AttributeValue;
    type Error = SerializeError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), SerializeError>
    where
        T: Serialize + ?Sized,
    {
        self.push(value)
    }

    fn end(self) -> Result<AttributeValue, SerializeError> {
        Ok(AttributeValue::List(self.items))
    }
}

impl ser::SerializeTuple for SerializeList {
    type Ok = AttributeValue;
    type Error = SerializeError;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), SerializeError>
    where
        T: Serialize + ?Sized,
    {
        self.push(value)
    }

    fn end(self) -> Result<AttributeValue, SerializeError> {
        Ok(AttributeValue::List(self.items))
    }
}

impl ser::SerializeTupleStruct for SerializeList {
    type Ok = AttributeValue;
    type Error = SerializeError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<(), SerializeError>
    where
        T: Serialize + ?Sized,
    {
        self.push(value)
    }

    fn end(self) -> Result<AttributeValue, SerializeError> {
        Ok(AttributeValue::List(self.items))
    }
}

pub(crate) struct SerializeTupleVariant {
    variant: &'static str,
    list: SerializeList,
}

impl ser::SerializeTupleVariant for SerializeTupleVariant {
    type Ok = AttributeValue;
    type Error = SerializeError;

    fn serialize_field<T>(&mut self, value: &T) -> Result<(), SerializeError>
    where
        T: Serialize + ?Sized,
    {
        self.list.push(value)
    }

    fn end(self) -> Result<AttributeValue, SerializeError> {
        Ok(AttributeValue::Map(Attributes::new().with_attribute(
            self.variant,
            AttributeValue::List(self.list.items),
        )))
    }
}

pub(crate) struct SerializeMap {
    path: String,
    map: Attributes,
    next_key: Option<String>,
}

impl SerializeMap {
    fn insert<T>(&mut self, key: &str, value: &T) -> Result<(), SerializeError>
    where
        T: Serialize + ?Sized,
    {
        let value = to_attribute_value(value, &child(&self.path, key))?;
        self.map.insert(key, value);
        Ok(())
    }
}

impl ser::SerializeMap for SerializeMap {
    type Ok = AttributeValue;
    type Error = SerializeError;

    fn serialize_key<T>(&mut self, key: &T) -> Result<(), SerializeError>
    where
        T: Serialize + ?Sized,
    {
        // キーは文字列（または文字列として直列化される unit variant 等）のみ受け付ける
        match to_attribute_value(key, &self.path)? {
            AttributeValue::String(key) => {
                self.next_key = Some(key);
                Ok(())
            }
            _ => Err(SerializeError {
                path: Some(self.path.clone()),
                reason: "map key must be a string".to_string(),
            }),
        }
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<(), SerializeError>
    where
        T: Serialize + ?Sized,
    {
        let key = self.next_key.take().ok_or_else(|| SerializeError {
            path: Some(self.path.clone()),
            reason: "serialize_value called before serialize_key".to_string(),
        })?;
        self.insert(&key, value)
    }

    fn end(self) -> Result<AttributeValue, SerializeError> {
        Ok(AttributeValue::Map(self.map))
    }
}

impl ser::SerializeStruct for SerializeMap {
    type Ok = AttributeValue;
    type Error = SerializeError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<(), SerializeError>
    where
        T: Serialize + ?Sized,
    {
        self.insert(key, value)
    }

    fn end(self) -> Result<AttributeValue, SerializeError> {
        Ok(AttributeValue::Map(self.map))
    }
}

pub(crate) struct SerializeStructVariant {
    variant: &'static str,
    map: SerializeMap,
}

impl ser::SerializeStructVariant for SerializeStructVariant {
    type Ok = AttributeValue;
    type Error = SerializeError;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<(), SerializeError>
    where
        T: Serialize + ?Sized,
    {
        self.map.insert(key, value)
    }

    fn end(self) -> Result<AttributeValue, SerializeError> {
        Ok(AttributeValue::Map(Attributes::new().with_attribute(
            self.variant,
            AttributeValue::Map(self.map.map),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    #[derive(serde::Serialize)]
    enum Plan {
        Free,
        Trial(u32),
        Paid { seats: u32 },
    }

    #[test]
    fn test_enum_variants() {
        assert_eq!(
            to_attribute_value(&Plan::Free, "plan").unwrap(),
            AttributeValue::String("Free".to_string())
        );
        assert_eq!(
            to_attribute_value(&Plan::Trial(14), "plan").unwrap(),
            AttributeValue::Map(Attributes::new().with_attribute("Trial", 14))
        );
        assert_eq!(
            to_attribute_value(&Plan::Paid { seats: 3 }, "plan").unwrap(),
            AttributeValue::Map(Attributes::new().with_attribute(
                "Paid",
                Attributes::new().with_attribute("seats", 3)
            ))
        );
    }

    #[test]
    fn test_string_keyed_map() {
        let mut counts = BTreeMap::new();
        counts.insert("visits".to_string(), 3u32);
        assert_eq!(
            to_attribute_value(&counts, "counts").unwrap(),
            AttributeValue::Map(Attributes::new().with_attribute("visits", 3))
        );
    }

    #[test]
    fn test_integer_map_key_is_rejected() {
        let mut by_id = HashMap::new();
        by_id.insert(7u32, "seven");
        let err = to_attribute_value(&by_id, "by_id").unwrap_err();
        assert_eq!(err.path.as_deref(), Some("by_id"));
        assert!(err.reason.contains("map key"));
    }

    #[test]
    fn test_nan_in_nested_list_reports_index() {
        let nested = vec![vec![1.0f32], vec![0.5, f32::NAN]];
        let err = to_attribute_value(&nested, "scores").unwrap_err();
        assert_eq!(err.path.as_deref(), Some("scores[1][1]"));
    }

    #[test]
    fn test_option_and_unit() {
        assert_eq!(
            to_attribute_value(&None::<u8>, "k").unwrap(),
            AttributeValue::Null
        );
        assert_eq!(
            to_attribute_value(&Some("x"), "k").unwrap(),
            AttributeValue::String("x".to_string())
        );
    }
}
