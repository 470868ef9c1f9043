//! Semantic field types and native field values.

use crate::error::ProtocolError;
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Time span stored in a `TIME` column.
pub type TimeSpan = chrono::Duration;

/// The minimum datetime, `0001-01-01 00:00:00`. Decodes to absence.
pub fn datetime_min() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

/// Declared variants of an integer-backed enum.
#[derive(Debug, PartialEq, Eq)]
pub struct EnumDescriptor {
    name: &'static str,
    variants: &'static [(&'static str, i64)],
}

impl EnumDescriptor {
    pub const fn new(name: &'static str, variants: &'static [(&'static str, i64)]) -> Self {
        Self { name, variants }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn variants(&self) -> &'static [(&'static str, i64)] {
        self.variants
    }

    /// Looks up the underlying integer of a declared variant name.
    pub fn value_of(&self, name: &str) -> Option<i64> {
        self.variants
            .iter()
            .find(|(variant, _)| *variant == name)
            .map(|(_, value)| *value)
    }

    /// Looks up the declared name of an underlying integer.
    pub fn name_of(&self, value: i64) -> Option<&'static str> {
        self.variants
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(name, _)| *name)
    }

    pub fn contains(&self, value: i64) -> bool {
        self.name_of(value).is_some()
    }
}

/// Semantic type of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Decimal,
    String,
    DateTime,
    TimeSpan,
    Guid,
    Enum(&'static EnumDescriptor),
    /// Nested records, collections and other shapes the codec skips.
    Unsupported(&'static str),
}

impl FieldType {
    pub fn is_supported(&self) -> bool {
        !matches!(self, FieldType::Unsupported(_))
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(
            self,
            FieldType::UInt8 | FieldType::UInt16 | FieldType::UInt32 | FieldType::UInt64
        )
    }

    /// Returns the SQL column type, or `None` for unsupported shapes.
    pub fn column_type(&self) -> Option<&'static str> {
        let sql = match self {
            FieldType::Bool => "BIT",
            FieldType::Int8 | FieldType::UInt8 => "TINYINT",
            FieldType::Int16 | FieldType::UInt16 => "SMALLINT",
            FieldType::Int32 | FieldType::UInt32 => "INT",
            FieldType::Int64 | FieldType::UInt64 => "BIGINT",
            FieldType::Float32 => "REAL",
            FieldType::Float64 => "FLOAT",
            FieldType::Decimal => "DECIMAL",
            FieldType::String => "VARCHAR(255)",
            FieldType::DateTime => "DATETIME",
            FieldType::TimeSpan => "TIME",
            FieldType::Guid => "UNIQUEIDENTIFIER",
            FieldType::Enum(_) => "INT",
            FieldType::Unsupported(_) => return None,
        };
        Some(sql)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Bool => write!(f, "bool"),
            FieldType::Int8 => write!(f, "i8"),
            FieldType::Int16 => write!(f, "i16"),
            FieldType::Int32 => write!(f, "i32"),
            FieldType::Int64 => write!(f, "i64"),
            FieldType::UInt8 => write!(f, "u8"),
            FieldType::UInt16 => write!(f, "u16"),
            FieldType::UInt32 => write!(f, "u32"),
            FieldType::UInt64 => write!(f, "u64"),
            FieldType::Float32 => write!(f, "f32"),
            FieldType::Float64 => write!(f, "f64"),
            FieldType::Decimal => write!(f, "decimal"),
            FieldType::String => write!(f, "string"),
            FieldType::DateTime => write!(f, "datetime"),
            FieldType::TimeSpan => write!(f, "timespan"),
            FieldType::Guid => write!(f, "guid"),
            FieldType::Enum(desc) => write!(f, "enum {}", desc.name()),
            FieldType::Unsupported(shape) => write!(f, "unsupported {}", shape),
        }
    }
}

/// Fixed-point decimal kept in its textual form.
///
/// Accepts an optional leading `-`, at least one integer digit, and an
/// optional fractional part.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal(String);

impl Decimal {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Decimal {
    fn default() -> Self {
        Decimal("0".to_string())
    }
}

impl FromStr for Decimal {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('-').unwrap_or(s);
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((int_part, frac_part)) => (int_part, Some(frac_part)),
            None => (digits, None),
        };
        let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(int_part) || !frac_part.map_or(true, all_digits) {
            return Err(ProtocolError::conversion(
                FieldType::Decimal,
                s,
                "expected [-]digits[.digits]",
            ));
        }
        Ok(Decimal(s.to_string()))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Decimal(value.to_string())
    }
}

/// A single field value in its native form.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    String(String),
    DateTime(NaiveDateTime),
    TimeSpan(TimeSpan),
    Guid(Uuid),
    /// Underlying integer of an enum variant.
    Enum(i64),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the value's variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::TimeSpan(_) => "timespan",
            Value::Guid(_) => "guid",
            Value::Enum(_) => "enum",
        }
    }

    /// Returns whether this value can be encoded as `ty` without coercion.
    pub fn matches(&self, ty: FieldType) -> bool {
        matches!(
            (self, ty),
            (Value::Null, _)
                | (Value::Bool(_), FieldType::Bool)
                | (Value::I8(_), FieldType::Int8)
                | (Value::I16(_), FieldType::Int16)
                | (Value::I32(_), FieldType::Int32)
                | (Value::I64(_), FieldType::Int64)
                | (Value::U8(_), FieldType::UInt8)
                | (Value::U16(_), FieldType::UInt16)
                | (Value::U32(_), FieldType::UInt32)
                | (Value::U64(_), FieldType::UInt64)
                | (Value::F32(_), FieldType::Float32)
                | (Value::F64(_), FieldType::Float64)
                | (Value::Decimal(_), FieldType::Decimal)
                | (Value::String(_), FieldType::String)
                | (Value::DateTime(_), FieldType::DateTime)
                | (Value::TimeSpan(_), FieldType::TimeSpan)
                | (Value::Guid(_), FieldType::Guid)
                | (Value::Enum(_), FieldType::Enum(_))
        )
    }

    /// Integer payload of any integer or enum value.
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Value::I8(v) => Some(v as i128),
            Value::I16(v) => Some(v as i128),
            Value::I32(v) => Some(v as i128),
            Value::I64(v) => Some(v as i128),
            Value::U8(v) => Some(v as i128),
            Value::U16(v) => Some(v as i128),
            Value::U32(v) => Some(v as i128),
            Value::U64(v) => Some(v as i128),
            Value::Enum(v) => Some(v as i128),
            _ => None,
        }
    }

    /// Converts this value to the representation of `ty`.
    ///
    /// Integers convert across widths when in range, enum variants accept
    /// their underlying integer, and `f32` widens to `f64`. Anything else
    /// must already match.
    pub fn coerce(self, field: &str, ty: FieldType) -> Result<Value, ProtocolError> {
        if self.matches(ty) {
            return Ok(self);
        }
        let mismatch = |value: &Value| ProtocolError::TypeMismatch {
            field: field.to_string(),
            expected: ty.to_string(),
            actual: value.type_name().to_string(),
        };
        if let Value::F32(v) = self {
            if ty == FieldType::Float64 {
                return Ok(Value::F64(v as f64));
            }
        }
        let Some(n) = self.as_i128() else {
            return Err(mismatch(&self));
        };
        let out_of_range =
            || ProtocolError::conversion(ty, n.to_string(), "integer out of range");
        let coerced = match ty {
            FieldType::Int8 => Value::I8(i8::try_from(n).map_err(|_| out_of_range())?),
            FieldType::Int16 => Value::I16(i16::try_from(n).map_err(|_| out_of_range())?),
            FieldType::Int32 => Value::I32(i32::try_from(n).map_err(|_| out_of_range())?),
            FieldType::Int64 => Value::I64(i64::try_from(n).map_err(|_| out_of_range())?),
            FieldType::UInt8 => Value::U8(u8::try_from(n).map_err(|_| out_of_range())?),
            FieldType::UInt16 => Value::U16(u16::try_from(n).map_err(|_| out_of_range())?),
            FieldType::UInt32 => Value::U32(u32::try_from(n).map_err(|_| out_of_range())?),
            FieldType::UInt64 => Value::U64(u64::try_from(n).map_err(|_| out_of_range())?),
            FieldType::Enum(desc) => {
                let v = i64::try_from(n).map_err(|_| out_of_range())?;
                if !desc.contains(v) {
                    return Err(ProtocolError::conversion(
                        ty,
                        v.to_string(),
                        "not a declared variant",
                    ));
                }
                Value::Enum(v)
            }
            _ => return Err(mismatch(&self)),
        };
        Ok(coerced)
    }
}

/// A native type that maps onto one semantic field type.
pub trait FieldValue: Sized {
    fn field_type() -> FieldType;

    fn to_value(&self) -> Value;

    /// Builds the native value. `Value::Null` yields the type's zero value;
    /// use `Option<T>` to keep absence distinguishable.
    fn from_value(value: Value) -> Result<Self, ProtocolError>;
}

fn unexpected(expected: FieldType, value: &Value) -> ProtocolError {
    ProtocolError::conversion(expected, value.type_name(), "unexpected value variant")
}

macro_rules! impl_field_value {
    ($native:ty, $variant:ident, $field_type:ident, $zero:expr) => {
        impl FieldValue for $native {
            fn field_type() -> FieldType {
                FieldType::$field_type
            }

            fn to_value(&self) -> Value {
                Value::$variant(self.clone())
            }

            fn from_value(value: Value) -> Result<Self, ProtocolError> {
                match value {
                    Value::$variant(v) => Ok(v),
                    Value::Null => Ok($zero),
                    other => Err(unexpected(FieldType::$field_type, &other)),
                }
            }
        }

        impl From<$native> for Value {
            fn from(v: $native) -> Self {
                Value::$variant(v)
            }
        }
    };
}

impl_field_value!(bool, Bool, Bool, false);
impl_field_value!(i8, I8, Int8, 0);
impl_field_value!(i16, I16, Int16, 0);
impl_field_value!(i32, I32, Int32, 0);
impl_field_value!(i64, I64, Int64, 0);
impl_field_value!(u8, U8, UInt8, 0);
impl_field_value!(u16, U16, UInt16, 0);
impl_field_value!(u32, U32, UInt32, 0);
impl_field_value!(u64, U64, UInt64, 0);
impl_field_value!(f32, F32, Float32, 0.0);
impl_field_value!(f64, F64, Float64, 0.0);
impl_field_value!(Decimal, Decimal, Decimal, Decimal::default());
impl_field_value!(String, String, String, String::new());
impl_field_value!(NaiveDateTime, DateTime, DateTime, datetime_min());
impl_field_value!(TimeSpan, TimeSpan, TimeSpan, TimeSpan::zero());
impl_field_value!(Uuid, Guid, Guid, Uuid::nil());

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn field_type() -> FieldType {
        T::field_type()
    }

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Registers a fieldless enum as an integer-backed field type.
///
/// The enum must implement `Default`; its default variant is used when the
/// stored value is absent.
///
/// ```
/// use dbapi_protocol::{db_enum, FieldType, FieldValue};
///
/// #[derive(Debug, Default, PartialEq)]
/// enum Level {
///     #[default]
///     Low = 1,
///     High = 2,
/// }
/// db_enum!(Level { Low, High });
///
/// assert!(matches!(Level::field_type(), FieldType::Enum(_)));
/// ```
#[macro_export]
macro_rules! db_enum {
    ($ty:ident { $($variant:ident),+ $(,)? }) => {
        impl $crate::FieldValue for $ty {
            fn field_type() -> $crate::FieldType {
                static DESCRIPTOR: $crate::EnumDescriptor = $crate::EnumDescriptor::new(
                    stringify!($ty),
                    &[$((stringify!($variant), $ty::$variant as i64)),+],
                );
                $crate::FieldType::Enum(&DESCRIPTOR)
            }

            fn to_value(&self) -> $crate::Value {
                match self {
                    $($ty::$variant => $crate::Value::Enum($ty::$variant as i64),)+
                }
            }

            fn from_value(value: $crate::Value) -> Result<Self, $crate::ProtocolError> {
                if value.is_null() {
                    return Ok(<$ty as Default>::default());
                }
                let raw = value.as_i128();
                $(
                    if raw == Some($ty::$variant as i64 as i128) {
                        return Ok($ty::$variant);
                    }
                )+
                Err($crate::ProtocolError::Conversion {
                    expected: stringify!($ty).to_string(),
                    text: format!("{:?}", value),
                    reason: "not a declared variant".to_string(),
                })
            }
        }

        impl From<$ty> for $crate::Value {
            fn from(v: $ty) -> Self {
                <$ty as $crate::FieldValue>::to_value(&v)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    enum Color {
        #[default]
        Red = 1,
        Green = 2,
        Blue = 5,
    }
    crate::db_enum!(Color { Red, Green, Blue });

    #[test]
    fn test_column_types() {
        assert_eq!(FieldType::Bool.column_type(), Some("BIT"));
        assert_eq!(FieldType::Int8.column_type(), Some("TINYINT"));
        assert_eq!(FieldType::Int16.column_type(), Some("SMALLINT"));
        assert_eq!(FieldType::Int32.column_type(), Some("INT"));
        assert_eq!(FieldType::Int64.column_type(), Some("BIGINT"));
        assert_eq!(FieldType::Float32.column_type(), Some("REAL"));
        assert_eq!(FieldType::Float64.column_type(), Some("FLOAT"));
        assert_eq!(FieldType::Decimal.column_type(), Some("DECIMAL"));
        assert_eq!(FieldType::String.column_type(), Some("VARCHAR(255)"));
        assert_eq!(FieldType::Guid.column_type(), Some("UNIQUEIDENTIFIER"));
        assert_eq!(FieldType::DateTime.column_type(), Some("DATETIME"));
        assert_eq!(FieldType::TimeSpan.column_type(), Some("TIME"));
        assert_eq!(Color::field_type().column_type(), Some("INT"));
        assert_eq!(FieldType::Unsupported("Vec<String>").column_type(), None);
    }

    #[test]
    fn test_decimal_parsing() {
        assert!("12.50".parse::<Decimal>().is_ok());
        assert!("-3".parse::<Decimal>().is_ok());
        assert!("0.001".parse::<Decimal>().is_ok());
        assert!("".parse::<Decimal>().is_err());
        assert!("1.".parse::<Decimal>().is_err());
        assert!(".5".parse::<Decimal>().is_err());
        assert!("1e5".parse::<Decimal>().is_err());
        assert_eq!(Decimal::default().as_str(), "0");
    }

    #[test]
    fn test_enum_descriptor() {
        let FieldType::Enum(desc) = Color::field_type() else {
            panic!("expected enum field type");
        };
        assert_eq!(desc.name(), "Color");
        assert_eq!(desc.value_of("Blue"), Some(5));
        assert_eq!(desc.name_of(2), Some("Green"));
        assert!(!desc.contains(3));
    }

    #[test]
    fn test_enum_field_value() {
        assert_eq!(Color::Blue.to_value(), Value::Enum(5));
        assert_eq!(Color::from_value(Value::Enum(2)).unwrap(), Color::Green);
        assert_eq!(Color::from_value(Value::Null).unwrap(), Color::Red);
        assert!(Color::from_value(Value::Enum(3)).is_err());
    }

    #[test]
    fn test_null_yields_zero_value() {
        assert_eq!(i32::from_value(Value::Null).unwrap(), 0);
        assert_eq!(String::from_value(Value::Null).unwrap(), "");
        assert_eq!(NaiveDateTime::from_value(Value::Null).unwrap(), datetime_min());
        assert_eq!(Option::<i32>::from_value(Value::Null).unwrap(), None);
        assert_eq!(
            Option::<i32>::from_value(Value::I32(7)).unwrap(),
            Some(7)
        );
    }

    #[test]
    fn test_mismatched_variant_rejected() {
        assert!(i32::from_value(Value::String("1".into())).is_err());
        assert!(bool::from_value(Value::I32(1)).is_err());
    }

    #[test]
    fn test_coerce_integers() {
        let v = Value::I32(1).coerce("id", FieldType::Int64).unwrap();
        assert_eq!(v, Value::I64(1));

        let v = Value::I64(200).coerce("id", FieldType::UInt8).unwrap();
        assert_eq!(v, Value::U8(200));

        assert!(Value::I64(300).coerce("id", FieldType::Int8).is_err());
        assert!(Value::I32(-1).coerce("id", FieldType::UInt32).is_err());
    }

    #[test]
    fn test_coerce_enum_and_float() {
        let v = Value::I32(5).coerce("color", Color::field_type()).unwrap();
        assert_eq!(v, Value::Enum(5));
        assert!(Value::I32(4).coerce("color", Color::field_type()).is_err());

        let v = Value::F32(1.5).coerce("ratio", FieldType::Float64).unwrap();
        assert_eq!(v, Value::F64(1.5));
    }

    #[test]
    fn test_coerce_mismatch() {
        let err = Value::String("x".into())
            .coerce("age", FieldType::Int32)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::TypeMismatch { .. }));
        assert_eq!(
            Value::Null.coerce("age", FieldType::Int32).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_datetime_min_sentinel() {
        assert_eq!(datetime_min().to_string(), "0001-01-01 00:00:00");
    }
}
