//! ユーザー属性と wire 上の構造化値 (`google.protobuf.Struct`) の相互変換。
//!
//! 属性値は [`AttributeValue`] の各バリアントに `From` で分類される。
//! wire 表現を持たない値（非有限の数値、シリアライズに失敗する型）は
//! 文字列化などで丸めずに [`ActivationError::UnsupportedAttribute`] を返す。
//!
//! 数値は wire 上 f64 で送られるため、±2^53 を超える整数は精度を失う。

use std::collections::{btree_map, BTreeMap, HashMap};

use prost_types::value::Kind;
use prost_types::{ListValue, Struct, Value};
use serde::Serialize;

use crate::error::ActivationError;

mod ser;

/// AttributeValue は構造化値として送信可能な属性値。
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<AttributeValue>),
    Map(Attributes),
}

/// Attributes は属性名をキーとする属性値のマップ。
/// wire 上の `Struct.fields` と同じくキー順に保持する。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attributes {
    entries: BTreeMap<String, AttributeValue>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Option<AttributeValue> {
        self.entries.insert(key.into(), value.into())
    }

    /// 任意の `Serialize` 型を属性値として追加する。
    /// 構造化値に変換できない値（非有限の数値、文字列以外のマップキー）を含む場合は
    /// 失敗位置のキーパス付きで `UnsupportedAttribute` を返し、何も追加しない。
    pub fn insert_serialize<T>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), ActivationError>
    where
        T: Serialize + ?Sized,
    {
        let key = key.into();
        let value = ser::to_attribute_value(value, &key).map_err(|e| {
            ActivationError::UnsupportedAttribute {
                key: e.path.unwrap_or_else(|| key.clone()),
                reason: e.reason,
            }
        })?;
        self.entries.insert(key, value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, AttributeValue> {
        self.entries.iter()
    }
}

impl<K, V> FromIterator<(K, V)> for Attributes
where
    K: Into<String>,
    V: Into<AttributeValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Attributes {
    type Item = (&'a String, &'a AttributeValue);
    type IntoIter = btree_map::Iter<'a, String, AttributeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Attributes {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        map.into_iter().collect()
    }
}

// ---- 値の分類 ----------------------------------------------------

macro_rules! impl_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for AttributeValue {
                fn from(v: $t) -> Self {
                    AttributeValue::Number(v as f64)
                }
            }
        )*
    };
}

impl_from_number!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl From<()> for AttributeValue {
    fn from(_: ()) -> Self {
        AttributeValue::Null
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl From<&String> for AttributeValue {
    fn from(v: &String) -> Self {
        AttributeValue::String(v.clone())
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(AttributeValue::Null, Into::into)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(v: Vec<T>) -> Self {
        AttributeValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Clone + Into<AttributeValue>> From<&[T]> for AttributeValue {
    fn from(v: &[T]) -> Self {
        AttributeValue::List(v.iter().cloned().map(Into::into).collect())
    }
}

impl From<Attributes> for AttributeValue {
    fn from(v: Attributes) -> Self {
        AttributeValue::Map(v)
    }
}

impl<V: Into<AttributeValue>> From<HashMap<String, V>> for AttributeValue {
    fn from(v: HashMap<String, V>) -> Self {
        AttributeValue::Map(v.into_iter().collect())
    }
}

impl<V: Into<AttributeValue>> From<BTreeMap<String, V>> for AttributeValue {
    fn from(v: BTreeMap<String, V>) -> Self {
        AttributeValue::Map(v.into_iter().collect())
    }
}

impl From<serde_json::Value> for AttributeValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => AttributeValue::Null,
            serde_json::Value::Bool(b) => AttributeValue::Bool(b),
            // as_f64 が None になるのは arbitrary_precision の範囲外の数値のみ。
            // NaN は encode 時に UnsupportedAttribute として拒否される。
            serde_json::Value::Number(n) => AttributeValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => AttributeValue::String(s),
            serde_json::Value::Array(arr) => {
                AttributeValue::List(arr.into_iter().map(AttributeValue::from).collect())
            }
            serde_json::Value::Object(map) => AttributeValue::Map(Attributes::from(map)),
        }
    }
}

// ---- Attributes <-> prost_types 変換 ------------------------------

/// Attributes を wire 用の `prost_types::Struct` に変換する。
pub fn encode(attributes: &Attributes) -> Result<Struct, ActivationError> {
    encode_map(attributes, "")
}

fn encode_map(attributes: &Attributes, path: &str) -> Result<Struct, ActivationError> {
    let fields = attributes
        .iter()
        .map(|(k, v)| {
            let key_path = if path.is_empty() {
                k.clone()
            } else {
                format!("{path}.{k}")
            };
            Ok((k.clone(), encode_value(v, &key_path)?))
        })
        .collect::<Result<BTreeMap<String, Value>, ActivationError>>()?;
    Ok(Struct { fields })
}

fn encode_value(value: &AttributeValue, path: &str) -> Result<Value, ActivationError> {
    let kind = match value {
        AttributeValue::Null => Kind::NullValue(0),
        AttributeValue::Bool(b) => Kind::BoolValue(*b),
        AttributeValue::Number(n) if !n.is_finite() => {
            return Err(ActivationError::UnsupportedAttribute {
                key: path.to_string(),
                reason: format!("non-finite number {n} has no structured-value representation"),
            });
        }
        AttributeValue::Number(n) => Kind::NumberValue(*n),
        AttributeValue::String(s) => Kind::StringValue(s.clone()),
        AttributeValue::List(items) => {
            let values = items
                .iter()
                .enumerate()
                .map(|(i, v)| encode_value(v, &format!("{path}[{i}]")))
                .collect::<Result<Vec<_>, _>>()?;
            Kind::ListValue(ListValue { values })
        }
        AttributeValue::Map(m) => Kind::StructValue(encode_map(m, path)?),
    };
    Ok(Value { kind: Some(kind) })
}

/// `prost_types::Struct` を Attributes に戻す。encode の逆変換。
pub fn decode(s: &Struct) -> Attributes {
    s.fields
        .iter()
        .map(|(k, v)| (k.clone(), decode_value(v)))
        .collect()
}

fn decode_value(value: &Value) -> AttributeValue {
    match &value.kind {
        None | Some(Kind::NullValue(_)) => AttributeValue::Null,
        Some(Kind::BoolValue(b)) => AttributeValue::Bool(*b),
        Some(Kind::NumberValue(n)) => AttributeValue::Number(*n),
        Some(Kind::StringValue(s)) => AttributeValue::String(s.clone()),
        Some(Kind::ListValue(l)) => {
            AttributeValue::List(l.values.iter().map(decode_value).collect())
        }
        Some(Kind::StructValue(s)) => AttributeValue::Map(decode(s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Attributes {
        Attributes::new()
            .with_attribute("customer_uuid", "b5aedcf2-c5d8-4bd1-a4df-4d76702cea74")
            .with_attribute("country", "US")
            .with_attribute("beta", true)
            .with_attribute("age", 42)
            .with_attribute("score", 0.75)
            .with_attribute("referrer", ())
            .with_attribute("tags", vec!["a", "b"])
            .with_attribute("geo", Attributes::new().with_attribute("country", "US"))
    }

    #[test]
    fn test_encode_empty() {
        let s = encode(&Attributes::new()).unwrap();
        assert!(s.fields.is_empty());
    }

    #[test]
    fn test_encode_scalars() {
        let s = encode(&sample()).unwrap();
        assert_eq!(
            s.fields["country"].kind,
            Some(Kind::StringValue("US".to_string()))
        );
        assert_eq!(s.fields["beta"].kind, Some(Kind::BoolValue(true)));
        assert_eq!(s.fields["age"].kind, Some(Kind::NumberValue(42.0)));
        assert_eq!(s.fields["referrer"].kind, Some(Kind::NullValue(0)));
    }

    #[test]
    fn test_encode_nested_map_is_not_flattened() {
        let s = encode(&sample()).unwrap();
        match &s.fields["geo"].kind {
            Some(Kind::StructValue(geo)) => {
                assert_eq!(
                    geo.fields["country"].kind,
                    Some(Kind::StringValue("US".to_string()))
                );
            }
            other => panic!("expected StructValue, got {other:?}"),
        }
        assert!(!s.fields.contains_key("geo.country"));
    }

    #[test]
    fn test_encode_list() {
        let s = encode(&sample()).unwrap();
        match &s.fields["tags"].kind {
            Some(Kind::ListValue(l)) => {
                assert_eq!(l.values.len(), 2);
                assert_eq!(l.values[1].kind, Some(Kind::StringValue("b".to_string())));
            }
            other => panic!("expected ListValue, got {other:?}"),
        }
    }

    #[test]
    fn test_round_trip_preserves_types_and_values() {
        let attrs = sample();
        let decoded = decode(&encode(&attrs).unwrap());
        assert_eq!(decoded, attrs);
    }

    #[test]
    fn test_large_integer_rounds_to_f64() {
        let big: i64 = (1 << 53) + 1;
        let attrs = Attributes::new().with_attribute("id", big);
        let s = encode(&attrs).unwrap();
        assert_eq!(
            s.fields["id"].kind,
            Some(Kind::NumberValue(9_007_199_254_740_992.0))
        );
    }

    #[test]
    fn test_non_finite_number_is_rejected_with_key_path() {
        let attrs = Attributes::new().with_attribute(
            "geo",
            Attributes::new().with_attribute("lat", f64::NAN),
        );
        let err = encode(&attrs).unwrap_err();
        match err {
            ActivationError::UnsupportedAttribute { key, .. } => assert_eq!(key, "geo.lat"),
            other => panic!("expected UnsupportedAttribute, got {other:?}"),
        }
    }

    #[test]
    fn test_non_finite_number_in_list_is_rejected_with_index() {
        let attrs =
            Attributes::new().with_attribute("scores", vec![1.0, 2.0, f64::INFINITY]);
        let err = encode(&attrs).unwrap_err();
        match err {
            ActivationError::UnsupportedAttribute { key, .. } => assert_eq!(key, "scores[2]"),
            other => panic!("expected UnsupportedAttribute, got {other:?}"),
        }
    }

    #[test]
    fn test_insert_serialize_struct() {
        #[derive(Serialize)]
        struct Device {
            platform: String,
            version: u32,
        }

        let mut attrs = Attributes::new();
        attrs
            .insert_serialize(
                "device",
                &Device {
                    platform: "mobile".to_string(),
                    version: 3,
                },
            )
            .unwrap();

        let expected = Attributes::new()
            .with_attribute("platform", "mobile")
            .with_attribute("version", 3);
        assert_eq!(attrs.get("device"), Some(&AttributeValue::Map(expected)));
    }

    #[test]
    fn test_insert_serialize_unsupported_type_names_key() {
        let mut grid: HashMap<(i32, i32), i32> = HashMap::new();
        grid.insert((0, 0), 1);

        let mut attrs = Attributes::new();
        let err = attrs.insert_serialize("grid", &grid).unwrap_err();
        match err {
            ActivationError::UnsupportedAttribute { key, .. } => assert_eq!(key, "grid"),
            other => panic!("expected UnsupportedAttribute, got {other:?}"),
        }
        assert!(attrs.is_empty());
    }

    #[test]
    fn test_insert_serialize_nan_is_rejected() {
        let mut attrs = Attributes::new();
        let err = attrs.insert_serialize("ltv", &f64::NAN).unwrap_err();
        match err {
            ActivationError::UnsupportedAttribute { key, .. } => assert_eq!(key, "ltv"),
            other => panic!("expected UnsupportedAttribute, got {other:?}"),
        }
        assert!(attrs.get("ltv").is_none());
    }

    #[test]
    fn test_insert_serialize_struct_with_nan_field_names_path() {
        #[derive(Serialize)]
        struct Device {
            platform: String,
            score: f32,
        }

        let mut attrs = Attributes::new();
        let err = attrs
            .insert_serialize(
                "device",
                &Device {
                    platform: "mobile".to_string(),
                    score: f32::NAN,
                },
            )
            .unwrap_err();
        match err {
            ActivationError::UnsupportedAttribute { key, .. } => {
                assert_eq!(key, "device.score")
            }
            other => panic!("expected UnsupportedAttribute, got {other:?}"),
        }
        assert!(attrs.is_empty());
    }

    #[test]
    fn test_from_json_value() {
        let json = serde_json::json!({
            "country": "US",
            "platform": "mobile",
            "visits": 3,
            "flags": [true, null],
        });
        let value = AttributeValue::from(json);
        let expected = Attributes::new()
            .with_attribute("country", "US")
            .with_attribute("platform", "mobile")
            .with_attribute("visits", 3)
            .with_attribute(
                "flags",
                AttributeValue::List(vec![AttributeValue::Bool(true), AttributeValue::Null]),
            );
        assert_eq!(value, AttributeValue::Map(expected));
    }

    #[test]
    fn test_from_iterator_and_option() {
        let attrs: Attributes = vec![("a", Some(1)), ("b", None)].into_iter().collect();
        assert_eq!(attrs.len(), 2);
        assert_eq!(attrs.get("a"), Some(&AttributeValue::Number(1.0)));
        assert_eq!(attrs.get("b"), Some(&AttributeValue::Null));
    }
}
