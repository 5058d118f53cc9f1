use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::StoreError;
use crate::value::TypedValue;

/// A named, typed field set delivered as one unit to the store.
///
/// Field order is preserved: it is the column order of generated
/// statements. Field names are unique. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRecord {
    fields: Vec<(String, TypedValue)>,
}

impl WireRecord {
    /// Build a record, rejecting duplicate field names.
    pub fn new(fields: Vec<(String, TypedValue)>) -> Result<Self, StoreError> {
        for (i, (name, _)) in fields.iter().enumerate() {
            if fields[..i].iter().any(|(prev, _)| prev == name) {
                return Err(StoreError::precondition(format!(
                    "duplicate field '{name}' in record"
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Build from `(name, value)` pairs.
    pub fn from_pairs<N, V, I>(pairs: I) -> Result<Self, StoreError>
    where
        N: Into<String>,
        V: Into<TypedValue>,
        I: IntoIterator<Item = (N, V)>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        )
    }

    pub fn fields(&self) -> impl ExactSizeIterator<Item = (&str, &TypedValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn get(&self, name: &str) -> Option<&TypedValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// JSON form: an object of field name → TypedValue, in field order.

impl Serialize for WireRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for WireRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = WireRecord;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object of field name to typed value")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<WireRecord, A::Error> {
                let mut fields = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, value)) = access.next_entry::<String, TypedValue>()? {
                    fields.push((name, value));
                }
                WireRecord::new(fields).map_err(|e| serde::de::Error::custom(e.message))
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}
