// Resolved extended JSON values, before identifier migration.
use std::fmt;

use bson::{Binary, DateTime, Decimal128, Regex, Timestamp};

use crate::core::error::{Error, ErrorKind};

/// Output of the extended value resolver. Closed set: every wrapper tag maps
/// to exactly one variant, and documents keep their source field order.
#[derive(Clone, Debug, PartialEq)]
pub enum ExtValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    String(String),
    Array(Vec<ExtValue>),
    Document(Vec<(String, ExtValue)>),
    DateTime(DateTime),
    Binary(Binary),
    LegacyId(LegacyObjectId),
    Timestamp(Timestamp),
    Regex(Regex),
    Decimal128(Decimal128),
    Symbol(String),
    JavaScript(String),
    JavaScriptWithScope {
        code: String,
        scope: Vec<(String, ExtValue)>,
    },
    MinKey,
    MaxKey,
    Undefined,
}

/// A 24-hex-character identifier as written by older exporters (`{"$oid": ...}`).
/// Stored in lowercase; the hex digits are otherwise kept verbatim.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct LegacyObjectId(String);

impl LegacyObjectId {
    pub const HEX_LEN: usize = 24;

    pub fn from_hex(hex: &str) -> Result<Self, Error> {
        if hex.len() != Self::HEX_LEN || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::new(ErrorKind::TypeResolution).with_message(format!(
                "object id must be {} hex characters, got {hex:?}",
                Self::HEX_LEN
            )));
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    pub fn hex(&self) -> &str {
        &self.0
    }

    /// Re-encode as the driver's native identifier.
    pub fn to_object_id(&self) -> Result<bson::oid::ObjectId, Error> {
        bson::oid::ObjectId::parse_str(&self.0).map_err(|err| {
            Error::new(ErrorKind::TypeResolution)
                .with_message(format!("invalid object id {:?}", self.0))
                .with_source(err)
        })
    }
}

impl fmt::Display for LegacyObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
