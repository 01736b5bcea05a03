//! Purpose: Turn one decoded top-level JSON object into a store-ready BSON document.
//! Exports: `normalize`, `migrate`.
//! Role: Second half of decode; runs the resolver, then legacy identifier migration.
//! Invariants: Only objects become documents; arrays and scalars are `Structural` errors.
//! Invariants: Migration runs after resolution, over the whole tree, so no `LegacyId` survives.
//! Invariants: Field order matches the source object.
use bson::{Bson, Document, JavaScriptCodeWithScope};
use serde_json::Value;

use crate::core::error::{Error, ErrorKind};
use crate::core::extjson;
use crate::core::value::ExtValue;

pub fn normalize(value: Value) -> Result<Document, Error> {
    let map = match value {
        Value::Object(map) => map,
        other => {
            return Err(Error::new(ErrorKind::Structural)
                .with_message(format!(
                    "top-level value must be an object, found {}",
                    json_kind(&other)
                ))
                .with_hint("each fixture record must be a JSON object"));
        }
    };
    let fields = extjson::resolve_fields(map)?;
    into_document(fields)
}

/// Convert a resolved value into BSON, re-encoding legacy identifiers as `ObjectId`.
pub fn migrate(value: ExtValue) -> Result<Bson, Error> {
    Ok(match value {
        ExtValue::Null => Bson::Null,
        ExtValue::Bool(b) => Bson::Boolean(b),
        ExtValue::Int32(i) => Bson::Int32(i),
        ExtValue::Int64(i) => Bson::Int64(i),
        ExtValue::Double(f) => Bson::Double(f),
        ExtValue::String(s) => Bson::String(s),
        ExtValue::Array(items) => Bson::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| migrate(item).map_err(|err| err.within_field(i)))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        ExtValue::Document(fields) => Bson::Document(into_document(fields)?),
        ExtValue::DateTime(dt) => Bson::DateTime(dt),
        ExtValue::Binary(bin) => Bson::Binary(bin),
        ExtValue::LegacyId(legacy) => Bson::ObjectId(legacy.to_object_id()?),
        ExtValue::Timestamp(ts) => Bson::Timestamp(ts),
        ExtValue::Regex(re) => Bson::RegularExpression(re),
        ExtValue::Decimal128(d) => Bson::Decimal128(d),
        ExtValue::Symbol(s) => Bson::Symbol(s),
        ExtValue::JavaScript(code) => Bson::JavaScriptCode(code),
        ExtValue::JavaScriptWithScope { code, scope } => {
            Bson::JavaScriptCodeWithScope(JavaScriptCodeWithScope {
                code,
                scope: into_document(scope).map_err(|err| err.within_field("$scope"))?,
            })
        }
        ExtValue::MinKey => Bson::MinKey,
        ExtValue::MaxKey => Bson::MaxKey,
        ExtValue::Undefined => Bson::Undefined,
    })
}

fn into_document(fields: Vec<(String, ExtValue)>) -> Result<Document, Error> {
    let mut doc = Document::new();
    for (key, value) in fields {
        let value = migrate(value).map_err(|err| err.within_field(&key))?;
        doc.insert(key, value);
    }
    Ok(doc)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
