//! Purpose: Resolve extended JSON type wrappers (`{"$date": ...}` and friends) into typed values.
//! Exports: `resolve`, `resolve_fields`.
//! Role: Pure conversion from a decoded JSON tree to `ExtValue`; no I/O.
//! Invariants: A wrapper is recognized only by its exact key set; anything else is a document.
//! Invariants: A recognized tag with a malformed payload is a `TypeResolution` error, never a panic.
//! Invariants: Field order and array order are preserved.
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bson::spec::BinarySubtype;
use bson::{Binary, Bson, DateTime, Decimal128, Regex, Timestamp};
use serde_json::{Map, Number, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

use crate::core::error::{Error, ErrorKind};
use crate::core::value::{ExtValue, LegacyObjectId};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Tag {
    Date,
    Oid,
    Binary,
    LegacyBinary,
    Uuid,
    NumberInt,
    NumberLong,
    NumberDouble,
    NumberDecimal,
    Timestamp,
    RegularExpression,
    LegacyRegex,
    Symbol,
    Code,
    CodeWithScope,
    MinKey,
    MaxKey,
    Undefined,
}

impl Tag {
    fn detect(map: &Map<String, Value>) -> Option<Self> {
        let mut keys = map.keys().map(String::as_str);
        match map.len() {
            1 => match keys.next()? {
                "$date" => Some(Tag::Date),
                "$oid" => Some(Tag::Oid),
                "$binary" => Some(Tag::Binary),
                "$uuid" => Some(Tag::Uuid),
                "$numberInt" => Some(Tag::NumberInt),
                "$numberLong" => Some(Tag::NumberLong),
                "$numberDouble" => Some(Tag::NumberDouble),
                "$numberDecimal" => Some(Tag::NumberDecimal),
                "$timestamp" => Some(Tag::Timestamp),
                "$regularExpression" => Some(Tag::RegularExpression),
                "$regex" => Some(Tag::LegacyRegex),
                "$symbol" => Some(Tag::Symbol),
                "$code" => Some(Tag::Code),
                "$minKey" => Some(Tag::MinKey),
                "$maxKey" => Some(Tag::MaxKey),
                "$undefined" => Some(Tag::Undefined),
                _ => None,
            },
            2 => {
                let mut pair = [keys.next()?, keys.next()?];
                pair.sort_unstable();
                match pair {
                    ["$binary", "$type"] => Some(Tag::LegacyBinary),
                    ["$options", "$regex"] => Some(Tag::LegacyRegex),
                    ["$code", "$scope"] => Some(Tag::CodeWithScope),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Tag::Date => "$date",
            Tag::Oid => "$oid",
            Tag::Binary | Tag::LegacyBinary => "$binary",
            Tag::Uuid => "$uuid",
            Tag::NumberInt => "$numberInt",
            Tag::NumberLong => "$numberLong",
            Tag::NumberDouble => "$numberDouble",
            Tag::NumberDecimal => "$numberDecimal",
            Tag::Timestamp => "$timestamp",
            Tag::RegularExpression => "$regularExpression",
            Tag::LegacyRegex => "$regex",
            Tag::Symbol => "$symbol",
            Tag::Code | Tag::CodeWithScope => "$code",
            Tag::MinKey => "$minKey",
            Tag::MaxKey => "$maxKey",
            Tag::Undefined => "$undefined",
        }
    }
}

/// Resolve one decoded JSON value, depth first.
pub fn resolve(value: Value) -> Result<ExtValue, Error> {
    match value {
        Value::Null => Ok(ExtValue::Null),
        Value::Bool(b) => Ok(ExtValue::Bool(b)),
        Value::Number(n) => Ok(resolve_number(&n)),
        Value::String(s) => Ok(ExtValue::String(s)),
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| resolve(item).map_err(|err| err.within_field(i)))
            .collect::<Result<Vec<_>, _>>()
            .map(ExtValue::Array),
        Value::Object(map) => match Tag::detect(&map) {
            Some(tag) => resolve_wrapper(tag, map),
            None => resolve_fields(map).map(ExtValue::Document),
        },
    }
}

/// Resolve every field of an object, keeping source order.
pub fn resolve_fields(map: Map<String, Value>) -> Result<Vec<(String, ExtValue)>, Error> {
    let mut fields = Vec::with_capacity(map.len());
    for (key, value) in map {
        match resolve(value) {
            Ok(resolved) => fields.push((key, resolved)),
            Err(err) => return Err(err.within_field(key)),
        }
    }
    Ok(fields)
}

fn resolve_number(n: &Number) -> ExtValue {
    if let Some(i) = n.as_i64() {
        return match i32::try_from(i) {
            Ok(small) => ExtValue::Int32(small),
            Err(_) => ExtValue::Int64(i),
        };
    }
    // u64 beyond i64::MAX and fractional values both land here.
    ExtValue::Double(n.as_f64().unwrap_or(f64::NAN))
}

fn resolve_wrapper(tag: Tag, mut map: Map<String, Value>) -> Result<ExtValue, Error> {
    let payload = map.remove(tag.key()).unwrap_or(Value::Null);
    match tag {
        Tag::Date => resolve_date(payload).map(ExtValue::DateTime),
        Tag::Oid => match payload {
            Value::String(hex) => LegacyObjectId::from_hex(&hex).map(ExtValue::LegacyId),
            _ => Err(malformed(tag, "a 24 character hex string")),
        },
        Tag::Binary => resolve_binary(payload).map(ExtValue::Binary),
        Tag::LegacyBinary => {
            let subtype = map.remove("$type").unwrap_or(Value::Null);
            match (payload, subtype) {
                (Value::String(data), Value::String(subtype)) => {
                    binary_from_parts(tag, &data, &subtype).map(ExtValue::Binary)
                }
                _ => Err(malformed(tag, "base64 string with a hex \"$type\" string")),
            }
        }
        Tag::Uuid => match payload {
            Value::String(text) => parse_uuid(&text).map(|bytes| {
                ExtValue::Binary(Binary {
                    subtype: BinarySubtype::Uuid,
                    bytes,
                })
            }),
            _ => Err(malformed(tag, "a hyphenated uuid string")),
        },
        Tag::NumberInt => {
            let value = integer_payload(tag, payload)?;
            i32::try_from(value)
                .map(ExtValue::Int32)
                .map_err(|_| malformed(tag, "a 32-bit integer"))
        }
        Tag::NumberLong => integer_payload(tag, payload).map(ExtValue::Int64),
        Tag::NumberDouble => match payload {
            Value::String(text) => parse_double(&text)
                .map(ExtValue::Double)
                .ok_or_else(|| malformed(tag, "a decimal string, Infinity, -Infinity or NaN")),
            Value::Number(n) => n
                .as_f64()
                .map(ExtValue::Double)
                .ok_or_else(|| malformed(tag, "a number")),
            _ => Err(malformed(tag, "a decimal string")),
        },
        Tag::NumberDecimal => match payload {
            Value::String(text) => parse_decimal(&text).map(ExtValue::Decimal128),
            _ => Err(malformed(tag, "a decimal string")),
        },
        Tag::Timestamp => resolve_timestamp(payload).map(ExtValue::Timestamp),
        Tag::RegularExpression => match payload {
            Value::Object(mut inner) if inner.len() == 2 => {
                match (inner.remove("pattern"), inner.remove("options")) {
                    (Some(Value::String(pattern)), Some(Value::String(options))) => {
                        Ok(ExtValue::Regex(regex(pattern, &options)))
                    }
                    _ => Err(malformed(tag, "{\"pattern\": string, \"options\": string}")),
                }
            }
            _ => Err(malformed(tag, "{\"pattern\": string, \"options\": string}")),
        },
        Tag::LegacyRegex => {
            let options = map.remove("$options").unwrap_or(Value::String(String::new()));
            match (payload, options) {
                (Value::String(pattern), Value::String(options)) => {
                    Ok(ExtValue::Regex(regex(pattern, &options)))
                }
                _ => Err(malformed(tag, "a pattern string with an optional \"$options\" string")),
            }
        }
        Tag::Symbol => match payload {
            Value::String(symbol) => Ok(ExtValue::Symbol(symbol)),
            _ => Err(malformed(tag, "a string")),
        },
        Tag::Code => match payload {
            Value::String(code) => Ok(ExtValue::JavaScript(code)),
            _ => Err(malformed(tag, "a string")),
        },
        Tag::CodeWithScope => {
            let scope = map.remove("$scope").unwrap_or(Value::Null);
            match (payload, scope) {
                (Value::String(code), Value::Object(scope)) => {
                    let scope = resolve_fields(scope).map_err(|err| err.within_field("$scope"))?;
                    Ok(ExtValue::JavaScriptWithScope { code, scope })
                }
                _ => Err(malformed(tag, "a code string with a \"$scope\" object")),
            }
        }
        Tag::MinKey | Tag::MaxKey => {
            if payload.as_i64() != Some(1) {
                return Err(malformed(tag, "the number 1"));
            }
            Ok(if tag == Tag::MinKey {
                ExtValue::MinKey
            } else {
                ExtValue::MaxKey
            })
        }
        Tag::Undefined => match payload {
            Value::Bool(true) => Ok(ExtValue::Undefined),
            _ => Err(malformed(tag, "true")),
        },
    }
}

fn resolve_date(payload: Value) -> Result<DateTime, Error> {
    match payload {
        Value::String(text) => parse_iso_date(&text),
        Value::Number(n) => n
            .as_i64()
            .map(DateTime::from_millis)
            .ok_or_else(|| malformed(Tag::Date, "integer milliseconds since the epoch")),
        Value::Object(mut inner) if inner.len() == 1 && inner.contains_key("$numberLong") => {
            let millis = inner.remove("$numberLong").unwrap_or(Value::Null);
            integer_payload(Tag::NumberLong, millis)
                .map(DateTime::from_millis)
                .map_err(|err| err.within_field("$numberLong"))
        }
        _ => Err(malformed(
            Tag::Date,
            "an ISO-8601 string, integer milliseconds, or {\"$numberLong\": string}",
        )),
    }
}

fn parse_iso_date(text: &str) -> Result<DateTime, Error> {
    // mongoexport before 3.x wrote offsets without a colon, e.g. `+0000`.
    let compact_offset = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]][offset_hour sign:mandatory][offset_minute]"
    );
    let parsed = OffsetDateTime::parse(text, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(text, compact_offset))
        .map_err(|err| {
            malformed(Tag::Date, "an ISO-8601 timestamp")
                .with_hint(format!("could not parse {text:?}"))
                .with_source(err)
        })?;
    let millis = parsed.unix_timestamp_nanos().div_euclid(1_000_000);
    i64::try_from(millis)
        .map(DateTime::from_millis)
        .map_err(|_| malformed(Tag::Date, "a timestamp within the 64-bit millisecond range"))
}

fn resolve_binary(payload: Value) -> Result<Binary, Error> {
    let expected = "{\"base64\": string, \"subType\": hex string}";
    let Value::Object(mut inner) = payload else {
        return Err(malformed(Tag::Binary, expected));
    };
    if inner.len() != 2 {
        return Err(malformed(Tag::Binary, expected));
    }
    match (inner.remove("base64"), inner.remove("subType")) {
        (Some(Value::String(data)), Some(Value::String(subtype))) => {
            binary_from_parts(Tag::Binary, &data, &subtype)
        }
        _ => Err(malformed(Tag::Binary, expected)),
    }
}

fn binary_from_parts(tag: Tag, data: &str, subtype: &str) -> Result<Binary, Error> {
    if subtype.is_empty()
        || subtype.len() > 2
        || !subtype.bytes().all(|b| b.is_ascii_hexdigit())
    {
        return Err(malformed(tag, "a one or two character hex subtype"));
    }
    let subtype = u8::from_str_radix(subtype, 16)
        .map_err(|_| malformed(tag, "a one or two character hex subtype"))?;
    let bytes = BASE64
        .decode(data)
        .map_err(|err| malformed(tag, "standard base64 data").with_source(err))?;
    Ok(Binary {
        subtype: BinarySubtype::from(subtype),
        bytes,
    })
}

fn parse_uuid(text: &str) -> Result<Vec<u8>, Error> {
    let bytes = text.as_bytes();
    let well_formed = bytes.len() == 36
        && bytes.iter().enumerate().all(|(i, b)| match i {
            8 | 13 | 18 | 23 => *b == b'-',
            _ => b.is_ascii_hexdigit(),
        });
    if !well_formed {
        return Err(malformed(Tag::Uuid, "a hyphenated uuid string"));
    }
    let digits: Vec<u8> = bytes.iter().copied().filter(|b| *b != b'-').collect();
    digits
        .chunks_exact(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| malformed(Tag::Uuid, "a hyphenated uuid string"))
        })
        .collect()
}

fn resolve_timestamp(payload: Value) -> Result<Timestamp, Error> {
    let expected = "{\"t\": u32, \"i\": u32}";
    let Value::Object(inner) = payload else {
        return Err(malformed(Tag::Timestamp, expected));
    };
    let field = |name: &str| {
        inner
            .get(name)
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
    };
    match (inner.len(), field("t"), field("i")) {
        (2, Some(time), Some(increment)) => Ok(Timestamp { time, increment }),
        _ => Err(malformed(Tag::Timestamp, expected)),
    }
}

fn integer_payload(tag: Tag, payload: Value) -> Result<i64, Error> {
    match payload {
        Value::String(text) => text
            .parse::<i64>()
            .map_err(|err| malformed(tag, "a decimal integer string").with_source(err)),
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| malformed(tag, "an integer")),
        _ => Err(malformed(tag, "a decimal integer string")),
    }
}

fn parse_double(text: &str) -> Option<f64> {
    match text {
        "Infinity" => Some(f64::INFINITY),
        "-Infinity" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => text.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

fn parse_decimal(text: &str) -> Result<Decimal128, Error> {
    let wrapped = serde_json::json!({ "$numberDecimal": text });
    match Bson::try_from(wrapped) {
        Ok(Bson::Decimal128(decimal)) => Ok(decimal),
        Ok(_) => Err(malformed(Tag::NumberDecimal, "a decimal string")),
        Err(err) => Err(malformed(Tag::NumberDecimal, "a decimal string").with_source(err)),
    }
}

fn regex(pattern: String, options: &str) -> Regex {
    let mut flags: Vec<char> = options.chars().collect();
    flags.sort_unstable();
    Regex {
        pattern,
        options: flags.into_iter().collect(),
    }
}

fn malformed(tag: Tag, expected: &str) -> Error {
    Error::new(ErrorKind::TypeResolution)
        .with_message(format!("malformed {} payload: expected {expected}", tag.key()))
}
