//! Encoder and decoder for the row, message and predicate framings.

use crate::error::ProtocolError;
use crate::frame::{
    self, Conjunction, Framing, INSERT_ROW_DELIMITER, NULL_LITERAL, NULL_MESSAGE_LITERAL, QUOTE,
};
use crate::message::BODY_SEPARATOR;
use crate::schema::{short_type_name, FieldDescriptor, Record, SchemaDescriptor};
use crate::value::{datetime_min, Decimal, FieldType, TimeSpan, Value};
use chrono::NaiveDateTime;
use uuid::Uuid;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATETIME_SHAPE: &str = "dddd-dd-dd dd:dd:dd";
const TIMESPAN_SHAPE: &str = "dd:dd:dd";
const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// How decode failures are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodeMode {
    /// Fail with a conversion error.
    #[default]
    Strict,
    /// Map the offending field to absence and keep going.
    Degrade,
}

/// Encodes values and records into their textual framings.
pub struct Encoder;

impl Encoder {
    /// Encodes one value of type `ty`.
    pub fn encode_value(value: &Value, ty: FieldType, framing: Framing) -> Result<String, ProtocolError> {
        render("value", value, ty, framing)
    }

    /// Encodes a record as one row: ordinal-order, comma-joined values.
    pub fn encode_row<R: Record>(schema: &SchemaDescriptor, record: &R) -> Result<String, ProtocolError> {
        Self::encode_row_values(schema, &schema.values_of(record))
    }

    /// Encodes ordinal-order field values as one row.
    pub fn encode_row_values(schema: &SchemaDescriptor, values: &[Value]) -> Result<String, ProtocolError> {
        if values.len() != schema.len() {
            return Err(ProtocolError::FieldCountMismatch {
                expected: schema.len(),
                actual: values.len(),
            });
        }
        let mut out = String::new();
        for (field, value) in schema.fields().iter().zip(values) {
            if field.ordinal > 0 {
                out.push_str(frame::FIELD_SEPARATOR);
            }
            out.push_str(&render(field.name, value, field.field_type, Framing::Row)?);
        }
        Ok(out)
    }

    /// Encodes records as a bracketed row set.
    pub fn encode_row_set<R: Record>(schema: &SchemaDescriptor, records: &[R]) -> Result<String, ProtocolError> {
        let rows = records
            .iter()
            .map(|r| Self::encode_row(schema, r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(frame::join_row_set(&rows))
    }

    /// Encodes records as the body of a multi-row insert.
    ///
    /// The endpoint wraps the body as `VALUES (<body>)`, so rows are joined
    /// with `),(`.
    pub fn encode_insert_values<R: Record>(
        schema: &SchemaDescriptor,
        records: &[R],
    ) -> Result<String, ProtocolError> {
        let rows = records
            .iter()
            .map(|r| Self::encode_row(schema, r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.join(INSERT_ROW_DELIMITER))
    }

    /// Encodes a record as one braced message of `name:value` pairs.
    pub fn encode_message<R: Record>(schema: &SchemaDescriptor, record: &R) -> Result<String, ProtocolError> {
        let mut out = String::from("{");
        for field in schema.fields() {
            if field.ordinal > 0 {
                out.push_str(frame::FIELD_SEPARATOR);
            }
            let value = record.get(field.name).unwrap_or(Value::Null);
            out.push_str(field.name);
            out.push(frame::PAIR_SEPARATOR);
            out.push_str(&render(field.name, &value, field.field_type, Framing::Message)?);
        }
        out.push('}');
        Ok(out)
    }

    /// Encodes records as a bracketed message batch.
    pub fn encode_message_batch<R: Record>(
        schema: &SchemaDescriptor,
        records: &[R],
    ) -> Result<String, ProtocolError> {
        let messages = records
            .iter()
            .map(|r| Self::encode_message(schema, r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(frame::join_message_batch(&messages))
    }

    /// Renders `name=value` terms joined by `conjunction`.
    ///
    /// An absent value renders as `name IS NULL` in a WHERE clause and as
    /// `name=NULL` in a SET clause.
    pub fn encode_predicate<'a, I>(terms: I, conjunction: Conjunction) -> Result<String, ProtocolError>
    where
        I: IntoIterator<Item = (&'a FieldDescriptor, &'a Value)>,
    {
        let mut out = String::new();
        for (i, (field, value)) in terms.into_iter().enumerate() {
            if i > 0 {
                out.push_str(conjunction.separator());
            }
            out.push_str(field.name);
            if value.is_null() && conjunction == Conjunction::Where {
                out.push_str(" IS NULL");
            } else {
                out.push('=');
                out.push_str(&render(field.name, value, field.field_type, Framing::Predicate)?);
            }
        }
        Ok(out)
    }

    /// Renders every participating field of `record` as a predicate.
    pub fn encode_record_predicate<R: Record>(
        schema: &SchemaDescriptor,
        record: &R,
        conjunction: Conjunction,
    ) -> Result<String, ProtocolError> {
        let values = schema.values_of(record);
        Self::encode_predicate(schema.fields().iter().zip(values.iter()), conjunction)
    }
}

/// Decodes values and records from their textual framings.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder {
    mode: DecodeMode,
}

impl Decoder {
    pub fn new(mode: DecodeMode) -> Self {
        Self { mode }
    }

    pub fn strict() -> Self {
        Self::new(DecodeMode::Strict)
    }

    pub fn degrade() -> Self {
        Self::new(DecodeMode::Degrade)
    }

    pub fn mode(&self) -> DecodeMode {
        self.mode
    }

    /// Decodes one value of type `ty`. In degrade mode an unparsable value
    /// decodes to absence.
    pub fn decode_value(&self, text: &str, ty: FieldType, framing: Framing) -> Result<Value, ProtocolError> {
        match parse_value(text, ty, framing) {
            Ok(value) => Ok(value),
            Err(e) if self.mode == DecodeMode::Degrade => {
                tracing::warn!(error = %e, "Substituting absence for unparsable value");
                Ok(Value::Null)
            }
            Err(e) => Err(e),
        }
    }

    /// Decodes one unbracketed row.
    pub fn decode_row<R: Record>(&self, schema: &SchemaDescriptor, row: &str) -> Result<R, ProtocolError> {
        self.decode_row_values(schema, row).map(|(record, _)| record)
    }

    /// Decodes one unbracketed row, also returning the wire values in
    /// ordinal order before they were converted into the record.
    ///
    /// A NULL read into a non-optional field stays `Value::Null` here even
    /// though the record holds the field's default. Degraded fields are
    /// reported as `Value::Null`.
    pub fn decode_row_values<R: Record>(
        &self,
        schema: &SchemaDescriptor,
        row: &str,
    ) -> Result<(R, Vec<Value>), ProtocolError> {
        let texts = frame::split_row(row)?;
        if texts.len() != schema.len() {
            return Err(ProtocolError::FieldCountMismatch {
                expected: schema.len(),
                actual: texts.len(),
            });
        }
        let mut record = R::default();
        let mut values = Vec::with_capacity(texts.len());
        for (field, text) in schema.fields().iter().zip(texts) {
            values.push(self.assign(&mut record, field, text, Framing::Row)?);
        }
        Ok((record, values))
    }

    /// Decodes a bracketed row set.
    pub fn decode_row_set<R: Record>(&self, schema: &SchemaDescriptor, text: &str) -> Result<Vec<R>, ProtocolError> {
        frame::split_row_set(text)?
            .into_iter()
            .map(|row| self.decode_row(schema, row))
            .collect()
    }

    /// Decodes a bracketed row set, keeping the wire values of each row.
    pub fn decode_row_set_values<R: Record>(
        &self,
        schema: &SchemaDescriptor,
        text: &str,
    ) -> Result<Vec<(R, Vec<Value>)>, ProtocolError> {
        frame::split_row_set(text)?
            .into_iter()
            .map(|row| self.decode_row_values(schema, row))
            .collect()
    }

    /// Decodes one braced message. Fields are matched by name; fields
    /// missing from the message keep their default.
    pub fn decode_message<R: Record>(&self, schema: &SchemaDescriptor, text: &str) -> Result<R, ProtocolError> {
        let mut record = R::default();
        for pair in frame::split_message(text)? {
            let (name, value) = frame::split_pair(pair)?;
            let field = schema.field(name).ok_or_else(|| {
                ProtocolError::malformed(
                    "message",
                    format!("unknown field '{}' for {}", name, schema.record_name()),
                )
            })?;
            self.assign(&mut record, field, value, Framing::Message)?;
        }
        Ok(record)
    }

    /// Decodes a bracketed message batch.
    pub fn decode_message_batch<R: Record>(
        &self,
        schema: &SchemaDescriptor,
        text: &str,
    ) -> Result<Vec<R>, ProtocolError> {
        frame::split_message_batch(text)?
            .into_iter()
            .map(|message| self.decode_message(schema, message))
            .collect()
    }

    fn assign<R: Record>(
        &self,
        record: &mut R,
        field: &FieldDescriptor,
        text: &str,
        framing: Framing,
    ) -> Result<Value, ProtocolError> {
        let result = parse_value(text, field.field_type, framing)
            .and_then(|value| record.set(field.name, value.clone()).map(|()| value));
        match result {
            Ok(value) => Ok(value),
            Err(e) if self.mode == DecodeMode::Degrade => {
                tracing::warn!(
                    record = short_type_name::<R>(),
                    field = field.name,
                    framing = framing.name(),
                    error = %e,
                    "Substituting absence for unparsable field"
                );
                record.set(field.name, Value::Null)?;
                Ok(Value::Null)
            }
            Err(e) => Err(e),
        }
    }
}

fn render(field: &str, value: &Value, ty: FieldType, framing: Framing) -> Result<String, ProtocolError> {
    if !value.matches(ty) {
        return Err(ProtocolError::TypeMismatch {
            field: field.to_string(),
            expected: ty.to_string(),
            actual: value.type_name().to_string(),
        });
    }
    let text = match value {
        Value::Null => framing.null_literal().to_string(),
        Value::Bool(v) => v.to_string(),
        Value::I8(v) => v.to_string(),
        Value::I16(v) => v.to_string(),
        Value::I32(v) => v.to_string(),
        Value::I64(v) => v.to_string(),
        Value::U8(v) => v.to_string(),
        Value::U16(v) => v.to_string(),
        Value::U32(v) => v.to_string(),
        Value::U64(v) => v.to_string(),
        Value::F32(v) if v.is_finite() => v.to_string(),
        Value::F64(v) if v.is_finite() => v.to_string(),
        Value::F32(v) => return Err(ProtocolError::conversion(ty, v.to_string(), "non-finite float")),
        Value::F64(v) => return Err(ProtocolError::conversion(ty, v.to_string(), "non-finite float")),
        Value::Decimal(d) => d.to_string(),
        Value::String(s) => {
            if s.contains(QUOTE) {
                return Err(ProtocolError::conversion(
                    ty,
                    s.as_str(),
                    "string literals cannot contain a single quote",
                ));
            }
            // Select and update bodies are split on the separator server-side
            if framing == Framing::Predicate && s.contains(BODY_SEPARATOR) {
                return Err(ProtocolError::conversion(
                    ty,
                    s.as_str(),
                    "predicate literals cannot contain '|'",
                ));
            }
            quoted(s)
        }
        Value::DateTime(dt) => quoted(dt.format(DATETIME_FORMAT)),
        Value::TimeSpan(ts) => quoted(format_timespan(ts)?),
        Value::Guid(g) => quoted(g.hyphenated()),
        Value::Enum(v) => {
            if let FieldType::Enum(desc) = ty {
                if !desc.contains(*v) {
                    return Err(ProtocolError::conversion(ty, v.to_string(), "not a declared variant"));
                }
            }
            v.to_string()
        }
    };
    Ok(text)
}

fn quoted(content: impl std::fmt::Display) -> String {
    format!("{}{}{}", QUOTE, content, QUOTE)
}

fn format_timespan(ts: &TimeSpan) -> Result<String, ProtocolError> {
    let secs = ts.num_seconds();
    if !(0..SECONDS_PER_DAY).contains(&secs) || *ts < TimeSpan::zero() {
        return Err(ProtocolError::conversion(
            FieldType::TimeSpan,
            format!("{}s", secs),
            "time span must lie within one day",
        ));
    }
    Ok(format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60))
}

fn parse_value(text: &str, ty: FieldType, framing: Framing) -> Result<Value, ProtocolError> {
    let text = text.trim();
    if text == NULL_LITERAL || text == NULL_MESSAGE_LITERAL {
        return Ok(Value::Null);
    }
    let fail = |reason: &dyn std::fmt::Display| ProtocolError::conversion(ty, text, reason.to_string());

    let value = match ty {
        FieldType::Bool => {
            if text.eq_ignore_ascii_case("true") {
                Value::Bool(true)
            } else if text.eq_ignore_ascii_case("false") {
                Value::Bool(false)
            } else {
                return Err(fail(&"expected true or false"));
            }
        }
        FieldType::Int8 => Value::I8(text.parse().map_err(|e| fail(&e))?),
        FieldType::Int16 => Value::I16(text.parse().map_err(|e| fail(&e))?),
        FieldType::Int32 => Value::I32(text.parse().map_err(|e| fail(&e))?),
        FieldType::Int64 => Value::I64(text.parse().map_err(|e| fail(&e))?),
        FieldType::UInt8 => Value::U8(text.parse().map_err(|e| fail(&e))?),
        FieldType::UInt16 => Value::U16(text.parse().map_err(|e| fail(&e))?),
        FieldType::UInt32 => Value::U32(text.parse().map_err(|e| fail(&e))?),
        FieldType::UInt64 => Value::U64(text.parse().map_err(|e| fail(&e))?),
        FieldType::Float32 => {
            let v: f32 = text.parse().map_err(|e| fail(&e))?;
            if !v.is_finite() {
                return Err(fail(&"non-finite float"));
            }
            Value::F32(v)
        }
        FieldType::Float64 => {
            let v: f64 = text.parse().map_err(|e| fail(&e))?;
            if !v.is_finite() {
                return Err(fail(&"non-finite float"));
            }
            Value::F64(v)
        }
        FieldType::Decimal => Value::Decimal(text.parse::<Decimal>()?),
        FieldType::String => {
            let inner = text
                .strip_prefix(QUOTE)
                .and_then(|rest| rest.strip_suffix(QUOTE))
                .filter(|_| text.len() >= 2)
                .ok_or_else(|| fail(&"string literal must be enclosed in single quotes"))?;
            Value::String(inner.to_string())
        }
        FieldType::DateTime => {
            let s = unquote_optional(text);
            if !has_shape(s, DATETIME_SHAPE) {
                return Err(fail(&"expected yyyy-MM-dd HH:mm:ss"));
            }
            let dt = NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).map_err(|e| fail(&e))?;
            if dt == datetime_min() {
                Value::Null
            } else {
                Value::DateTime(dt)
            }
        }
        FieldType::TimeSpan => {
            let s = unquote_optional(text);
            if !has_shape(s, TIMESPAN_SHAPE) {
                return Err(fail(&"expected hh:mm:ss"));
            }
            let part = |range: std::ops::Range<usize>| s[range].parse::<i64>().unwrap_or(0);
            let (h, m, sec) = (part(0..2), part(3..5), part(6..8));
            if h >= 24 || m >= 60 || sec >= 60 {
                return Err(fail(&"time component out of range"));
            }
            Value::TimeSpan(TimeSpan::seconds(h * 3600 + m * 60 + sec))
        }
        FieldType::Guid => {
            let s = unquote_optional(text);
            if s.len() != 36 {
                return Err(fail(&"expected dashed guid"));
            }
            Value::Guid(Uuid::parse_str(s).map_err(|e| fail(&e))?)
        }
        FieldType::Enum(desc) => {
            let by_name = match framing {
                Framing::Message => desc.value_of(text),
                Framing::Row | Framing::Predicate => None,
            };
            let v = match by_name {
                Some(v) => v,
                None => text.parse::<i64>().map_err(|e| fail(&e))?,
            };
            if !desc.contains(v) {
                return Err(fail(&"not a declared variant"));
            }
            Value::Enum(v)
        }
        FieldType::Unsupported(_) => return Err(fail(&"unsupported field type")),
    };
    Ok(value)
}

fn unquote_optional(text: &str) -> &str {
    text.strip_prefix(QUOTE)
        .and_then(|rest| rest.strip_suffix(QUOTE))
        .unwrap_or(text)
}

/// Checks `text` against a shape where `d` is any ASCII digit and every other
/// character must match literally.
fn has_shape(text: &str, shape: &str) -> bool {
    text.len() == shape.len()
        && text.bytes().zip(shape.bytes()).all(|(c, s)| match s {
            b'd' => c.is_ascii_digit(),
            _ => c == s,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaOptions;
    use crate::value::{EnumDescriptor, FieldValue};
    use proptest::prelude::*;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Person {
        id: i32,
        name: String,
        age: i32,
    }
    crate::impl_record!(Person { id, name, age });

    #[derive(Debug, Default, Clone, Copy, PartialEq)]
    enum Level {
        #[default]
        Low = 1,
        Mid = 2,
        High = 5,
    }
    crate::db_enum!(Level { Low, Mid, High });

    #[derive(Debug, Clone, PartialEq)]
    struct Reading {
        id: i64,
        level: Level,
        taken: NaiveDateTime,
        elapsed: TimeSpan,
        sensor: Uuid,
        note: Option<String>,
        ratio: f64,
        ok: bool,
    }
    crate::impl_record!(Reading {
        id,
        level,
        taken,
        elapsed,
        sensor,
        note,
        ratio,
        ok,
    });

    impl Default for Reading {
        fn default() -> Self {
            Self {
                id: 0,
                level: Level::default(),
                taken: datetime_min(),
                elapsed: TimeSpan::zero(),
                sensor: Uuid::nil(),
                note: None,
                ratio: 0.0,
                ok: false,
            }
        }
    }

    static LEVELS: EnumDescriptor =
        EnumDescriptor::new("Level", &[("Low", 1), ("Mid", 2), ("High", 5)]);

    fn person_schema() -> SchemaDescriptor {
        SchemaDescriptor::describe::<Person>(&SchemaOptions::default()).unwrap()
    }

    fn reading_schema() -> SchemaDescriptor {
        SchemaDescriptor::describe::<Reading>(&SchemaOptions::default()).unwrap()
    }

    fn ann() -> Person {
        Person {
            id: 1,
            name: "Ann".into(),
            age: 30,
        }
    }

    fn datetime(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).unwrap()
    }

    #[test]
    fn test_encode_row() {
        let row = Encoder::encode_row(&person_schema(), &ann()).unwrap();
        assert_eq!(row, "1,'Ann',30");

        let decoded: Person = Decoder::strict().decode_row(&person_schema(), &row).unwrap();
        assert_eq!(decoded, ann());
    }

    #[test]
    fn test_encode_message() {
        let message = Encoder::encode_message(&person_schema(), &ann()).unwrap();
        assert_eq!(message, "{id:1,name:'Ann',age:30}");

        let decoded: Person = Decoder::strict()
            .decode_message(&person_schema(), &message)
            .unwrap();
        assert_eq!(decoded, ann());
    }

    #[test]
    fn test_row_set_round_trip() {
        let schema = person_schema();
        let people = vec![
            ann(),
            Person {
                id: 2,
                name: "Bo".into(),
                age: 41,
            },
        ];
        let text = Encoder::encode_row_set(&schema, &people).unwrap();
        assert_eq!(text, "[1,'Ann',30],[2,'Bo',41]");
        let decoded: Vec<Person> = Decoder::strict().decode_row_set(&schema, &text).unwrap();
        assert_eq!(decoded, people);

        let empty: Vec<Person> = Decoder::strict().decode_row_set(&schema, "[]").unwrap();
        assert!(empty.is_empty());
        assert_eq!(Encoder::encode_row_set::<Person>(&schema, &[]).unwrap(), "[]");
    }

    #[test]
    fn test_message_batch_round_trip() {
        let schema = person_schema();
        let people = vec![
            ann(),
            Person {
                id: 2,
                name: "Bo".into(),
                age: 41,
            },
        ];
        let text = Encoder::encode_message_batch(&schema, &people).unwrap();
        assert_eq!(text, "[{id:1,name:'Ann',age:30};{id:2,name:'Bo',age:41}]");
        let decoded: Vec<Person> = Decoder::strict()
            .decode_message_batch(&schema, &text)
            .unwrap();
        assert_eq!(decoded, people);
    }

    #[test]
    fn test_insert_values() {
        let schema = person_schema();
        let people = vec![ann(), Person { id: 2, name: "Bo".into(), age: 41 }];
        let body = Encoder::encode_insert_values(&schema, &people).unwrap();
        assert_eq!(body, "1,'Ann',30),(2,'Bo',41");
    }

    #[test]
    fn test_null_literals_per_framing() {
        let v = Encoder::encode_value(&Value::Null, FieldType::Int32, Framing::Row).unwrap();
        assert_eq!(v, "NULL");
        let v = Encoder::encode_value(&Value::Null, FieldType::Int32, Framing::Message).unwrap();
        assert_eq!(v, "null");

        let decoder = Decoder::strict();
        for literal in ["NULL", "null"] {
            for framing in [Framing::Row, Framing::Message, Framing::Predicate] {
                let v = decoder.decode_value(literal, FieldType::String, framing).unwrap();
                assert_eq!(v, Value::Null);
            }
        }
    }

    #[test]
    fn test_quoted_null_is_a_string() {
        let v = Decoder::strict()
            .decode_value("'NULL'", FieldType::String, Framing::Row)
            .unwrap();
        assert_eq!(v, Value::String("NULL".into()));
    }

    #[test]
    fn test_string_requires_quotes() {
        let err = Decoder::strict()
            .decode_value("Ann", FieldType::String, Framing::Row)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Conversion);
        assert!(Decoder::strict()
            .decode_value("'", FieldType::String, Framing::Row)
            .is_err());
    }

    #[test]
    fn test_string_with_quote_rejected() {
        let err = Encoder::encode_value(&Value::from("O'Brien"), FieldType::String, Framing::Row)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Conversion);
    }

    #[test]
    fn test_body_separator_rejected_in_predicates() {
        let err = Encoder::encode_value(&Value::from("a|b"), FieldType::String, Framing::Predicate)
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Conversion);

        let schema = person_schema();
        let piped = Person {
            name: "a|b".into(),
            ..ann()
        };
        let err = Encoder::encode_record_predicate(&schema, &piped, Conjunction::Where).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Conversion);

        // Row and message bodies are not split on it
        assert_eq!(Encoder::encode_row(&schema, &piped).unwrap(), "1,'a|b',30");
        assert_eq!(
            Encoder::encode_message(&schema, &piped).unwrap(),
            "{id:1,name:'a|b',age:30}"
        );
    }

    #[test]
    fn test_strings_may_carry_delimiters() {
        let schema = person_schema();
        let tricky = Person {
            id: 3,
            name: "a,b],[c{d};e:f".into(),
            age: 1,
        };
        let row = Encoder::encode_row(&schema, &tricky).unwrap();
        let decoded: Person = Decoder::strict().decode_row(&schema, &row).unwrap();
        assert_eq!(decoded, tricky);

        let batch = Encoder::encode_message_batch(&schema, &[tricky.clone(), ann()]).unwrap();
        let decoded: Vec<Person> = Decoder::strict().decode_message_batch(&schema, &batch).unwrap();
        assert_eq!(decoded, vec![tricky, ann()]);
    }

    #[test]
    fn test_boolean_case_insensitive() {
        let decoder = Decoder::strict();
        assert_eq!(
            decoder.decode_value("True", FieldType::Bool, Framing::Row).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            decoder.decode_value("FALSE", FieldType::Bool, Framing::Row).unwrap(),
            Value::Bool(false)
        );
        assert!(decoder.decode_value("1", FieldType::Bool, Framing::Row).is_err());
    }

    #[test]
    fn test_enum_decoding_asymmetry() {
        let ty = Level::field_type();
        let decoder = Decoder::strict();

        assert_eq!(
            decoder.decode_value("High", ty, Framing::Message).unwrap(),
            Value::Enum(5)
        );
        assert_eq!(
            decoder.decode_value("5", ty, Framing::Message).unwrap(),
            Value::Enum(5)
        );
        assert_eq!(decoder.decode_value("5", ty, Framing::Row).unwrap(), Value::Enum(5));
        assert!(decoder.decode_value("High", ty, Framing::Row).is_err());
        assert!(decoder.decode_value("3", ty, Framing::Row).is_err());
        assert!(decoder.decode_value("Extreme", ty, Framing::Message).is_err());
    }

    #[test]
    fn test_enum_encodes_integer() {
        let v = Encoder::encode_value(&Level::High.to_value(), Level::field_type(), Framing::Message)
            .unwrap();
        assert_eq!(v, "5");
        assert!(Encoder::encode_value(&Value::Enum(3), Level::field_type(), Framing::Row).is_err());
    }

    #[test]
    fn test_datetime_format_and_sentinel() {
        let dt = datetime("2024-03-09 07:05:01");
        let text = Encoder::encode_value(&Value::DateTime(dt), FieldType::DateTime, Framing::Row)
            .unwrap();
        assert_eq!(text, "'2024-03-09 07:05:01'");

        let decoder = Decoder::strict();
        assert_eq!(
            decoder
                .decode_value("2024-03-09 07:05:01", FieldType::DateTime, Framing::Row)
                .unwrap(),
            Value::DateTime(dt)
        );
        assert_eq!(
            decoder
                .decode_value("'0001-01-01 00:00:00'", FieldType::DateTime, Framing::Row)
                .unwrap(),
            Value::Null
        );
        assert!(decoder
            .decode_value("2024-3-9 7:05:01", FieldType::DateTime, Framing::Row)
            .is_err());
        assert!(decoder
            .decode_value("2024-03-09T07:05:01", FieldType::DateTime, Framing::Row)
            .is_err());
    }

    #[test]
    fn test_datetime_truncates_subseconds() {
        let dt = NaiveDateTime::parse_from_str("2024-03-09 07:05:01.750", "%Y-%m-%d %H:%M:%S%.3f")
            .unwrap();
        let text = Encoder::encode_value(&Value::DateTime(dt), FieldType::DateTime, Framing::Row)
            .unwrap();
        assert_eq!(text, "'2024-03-09 07:05:01'");
    }

    #[test]
    fn test_timespan() {
        let ts = TimeSpan::seconds(3 * 3600 + 4 * 60 + 5);
        let text = Encoder::encode_value(&Value::TimeSpan(ts), FieldType::TimeSpan, Framing::Row)
            .unwrap();
        assert_eq!(text, "'03:04:05'");

        let decoder = Decoder::strict();
        assert_eq!(
            decoder.decode_value("03:04:05", FieldType::TimeSpan, Framing::Row).unwrap(),
            Value::TimeSpan(ts)
        );
        assert!(decoder.decode_value("24:00:00", FieldType::TimeSpan, Framing::Row).is_err());
        assert!(decoder.decode_value("3:04:05", FieldType::TimeSpan, Framing::Row).is_err());

        let too_long = TimeSpan::seconds(SECONDS_PER_DAY);
        assert!(Encoder::encode_value(&Value::TimeSpan(too_long), FieldType::TimeSpan, Framing::Row).is_err());
        let negative = TimeSpan::seconds(-1);
        assert!(Encoder::encode_value(&Value::TimeSpan(negative), FieldType::TimeSpan, Framing::Row).is_err());
    }

    #[test]
    fn test_guid_canonical_form() {
        let id = Uuid::parse_str("67E55044-10B1-426F-9247-BB680E5FE0C8").unwrap();
        let text = Encoder::encode_value(&Value::Guid(id), FieldType::Guid, Framing::Row).unwrap();
        assert_eq!(text, "'67e55044-10b1-426f-9247-bb680e5fe0c8'");

        let decoder = Decoder::strict();
        assert_eq!(
            decoder.decode_value(&text, FieldType::Guid, Framing::Row).unwrap(),
            Value::Guid(id)
        );
        assert!(decoder
            .decode_value("67e5504410b1426f9247bb680e5fe0c8", FieldType::Guid, Framing::Row)
            .is_err());
    }

    #[test]
    fn test_non_finite_floats_rejected() {
        assert!(Encoder::encode_value(&Value::F64(f64::NAN), FieldType::Float64, Framing::Row).is_err());
        assert!(Encoder::encode_value(&Value::F32(f32::INFINITY), FieldType::Float32, Framing::Row).is_err());
        assert!(Decoder::strict()
            .decode_value("inf", FieldType::Float64, Framing::Row)
            .is_err());
    }

    #[test]
    fn test_type_mismatch_on_encode() {
        let err = Encoder::encode_value(&Value::I64(1), FieldType::Int32, Framing::Row).unwrap_err();
        assert!(matches!(err, ProtocolError::TypeMismatch { .. }));
    }

    #[test]
    fn test_field_count_mismatch() {
        let schema = person_schema();
        let err = Decoder::strict().decode_row::<Person>(&schema, "1,'Ann'").unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::FieldCountMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(err.kind(), crate::ErrorKind::Protocol);

        // Framing errors are never degraded.
        assert!(Decoder::degrade()
            .decode_row::<Person>(&schema, "1,'Ann',30,4")
            .is_err());
    }

    #[test]
    fn test_malformed_frames() {
        let schema = person_schema();
        let decoder = Decoder::strict();
        assert!(decoder.decode_row_set::<Person>(&schema, "1,'Ann',30").is_err());
        assert!(decoder.decode_message::<Person>(&schema, "id:1").is_err());
        let err = decoder
            .decode_message::<Person>(&schema, "{id:1,height:2}")
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Protocol);
    }

    #[test]
    fn test_message_missing_fields_keep_default() {
        let decoded: Person = Decoder::strict()
            .decode_message(&person_schema(), "{name:'Ann'}")
            .unwrap();
        assert_eq!(
            decoded,
            Person {
                id: 0,
                name: "Ann".into(),
                age: 0
            }
        );
        let empty: Person = Decoder::strict().decode_message(&person_schema(), "{}").unwrap();
        assert_eq!(empty, Person::default());
    }

    #[test]
    fn test_degrade_mode_substitutes_absence() {
        let schema = reading_schema();
        let row = "7,9,'2024-01-01 00:00:00','01:00:00','bogus','hi',0.5,true";

        let err = Decoder::strict().decode_row::<Reading>(&schema, row).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Conversion);

        let reading: Reading = Decoder::degrade().decode_row(&schema, row).unwrap();
        assert_eq!(reading.id, 7);
        assert_eq!(reading.level, Level::Low);
        assert_eq!(reading.sensor, Uuid::nil());
        assert_eq!(reading.note.as_deref(), Some("hi"));
        assert!(reading.ok);

        let v = Decoder::degrade()
            .decode_value("abc", FieldType::Int32, Framing::Row)
            .unwrap();
        assert_eq!(v, Value::Null);
    }

    #[test]
    fn test_degrade_batch_keeps_other_records() {
        let schema = person_schema();
        let people: Vec<Person> = Decoder::degrade()
            .decode_row_set(&schema, "[1,'Ann',x],[2,'Bo',41]")
            .unwrap();
        assert_eq!(people.len(), 2);
        assert_eq!(people[0].age, 0);
        assert_eq!(people[1].age, 41);
    }

    #[derive(Debug, Default)]
    struct Required {
        code: i32,
    }

    impl Record for Required {
        fn fields() -> Vec<crate::schema::FieldDef> {
            vec![crate::schema::FieldDef::new("code", FieldType::Int32)]
        }

        fn get(&self, field: &str) -> Option<Value> {
            (field == "code").then(|| self.code.to_value())
        }

        fn set(&mut self, field: &str, value: Value) -> Result<(), ProtocolError> {
            match (field, value) {
                ("code", Value::Null) => Err(ProtocolError::conversion(
                    FieldType::Int32,
                    "NULL",
                    "code is required",
                )),
                ("code", value) => {
                    self.code = i32::from_value(value)?;
                    Ok(())
                }
                (field, _) => Err(ProtocolError::UnknownField {
                    record: "Required".into(),
                    field: field.into(),
                }),
            }
        }
    }

    #[test]
    fn test_degrade_fails_when_record_refuses_absence() {
        let schema = SchemaDescriptor::describe::<Required>(&SchemaOptions::default()).unwrap();
        let ok: Required = Decoder::degrade().decode_row(&schema, "7").unwrap();
        assert_eq!(ok.code, 7);

        let err = Decoder::degrade()
            .decode_row::<Required>(&schema, "x")
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Conversion);
    }

    #[test]
    fn test_row_values_keep_wire_nulls() {
        let schema = person_schema();
        let (person, values): (Person, _) = Decoder::strict()
            .decode_row_values(&schema, "1,NULL,30")
            .unwrap();
        assert_eq!(person.name, "");
        assert_eq!(values, vec![Value::I32(1), Value::Null, Value::I32(30)]);

        let rows: Vec<(Person, Vec<Value>)> = Decoder::degrade()
            .decode_row_set_values(&schema, "[1,'Ann',x],[2,'Bo',41]")
            .unwrap();
        assert_eq!(rows[0].0.age, 0);
        assert_eq!(rows[0].1[2], Value::Null);
        assert_eq!(rows[1].1, vec![Value::I32(2), Value::from("Bo"), Value::I32(41)]);
    }

    #[test]
    fn test_full_record_round_trip() {
        let schema = reading_schema();
        let reading = Reading {
            id: 42,
            level: Level::High,
            taken: datetime("2023-12-31 23:59:59"),
            elapsed: TimeSpan::seconds(90),
            sensor: Uuid::from_u128(0x1234),
            note: None,
            ratio: -2.25,
            ok: true,
        };
        let row = Encoder::encode_row(&schema, &reading).unwrap();
        assert_eq!(
            row,
            "42,5,'2023-12-31 23:59:59','00:01:30','00000000-0000-0000-0000-000000001234',NULL,-2.25,true"
        );
        let decoded: Reading = Decoder::strict().decode_row(&schema, &row).unwrap();
        assert_eq!(decoded, reading);

        let message = Encoder::encode_message(&schema, &reading).unwrap();
        assert!(message.contains("note:null"));
        let decoded: Reading = Decoder::strict().decode_message(&schema, &message).unwrap();
        assert_eq!(decoded, reading);
    }

    #[test]
    fn test_where_predicate() {
        let schema = person_schema();
        let where_clause =
            Encoder::encode_record_predicate(&schema, &ann(), Conjunction::Where).unwrap();
        assert_eq!(where_clause, "id=1 AND name='Ann' AND age=30");

        let set_clause = Encoder::encode_record_predicate(&schema, &ann(), Conjunction::Set).unwrap();
        assert_eq!(set_clause, "id=1, name='Ann', age=30");
    }

    #[test]
    fn test_predicate_null_rendering() {
        let schema = reading_schema();
        let note = schema.field("note").unwrap();
        let terms = [(note, &Value::Null)];
        assert_eq!(
            Encoder::encode_predicate(terms.iter().copied(), Conjunction::Where).unwrap(),
            "note IS NULL"
        );
        assert_eq!(
            Encoder::encode_predicate(terms.iter().copied(), Conjunction::Set).unwrap(),
            "note=NULL"
        );
    }

    fn scalar_value() -> impl Strategy<Value = (FieldType, Value)> {
        prop_oneof![
            any::<bool>().prop_map(|v| (FieldType::Bool, Value::Bool(v))),
            any::<i8>().prop_map(|v| (FieldType::Int8, Value::I8(v))),
            any::<i16>().prop_map(|v| (FieldType::Int16, Value::I16(v))),
            any::<i32>().prop_map(|v| (FieldType::Int32, Value::I32(v))),
            any::<i64>().prop_map(|v| (FieldType::Int64, Value::I64(v))),
            any::<u8>().prop_map(|v| (FieldType::UInt8, Value::U8(v))),
            any::<u16>().prop_map(|v| (FieldType::UInt16, Value::U16(v))),
            any::<u32>().prop_map(|v| (FieldType::UInt32, Value::U32(v))),
            any::<u64>().prop_map(|v| (FieldType::UInt64, Value::U64(v))),
        ]
    }

    fn rich_value() -> impl Strategy<Value = (FieldType, Value)> {
        prop_oneof![
            any::<f32>()
                .prop_filter("finite", |v| v.is_finite())
                .prop_map(|v| (FieldType::Float32, Value::F32(v))),
            any::<f64>()
                .prop_filter("finite", |v| v.is_finite())
                .prop_map(|v| (FieldType::Float64, Value::F64(v))),
            "-?[0-9]{1,12}(\\.[0-9]{1,6})?".prop_map(|s| {
                (FieldType::Decimal, Value::Decimal(s.parse().unwrap()))
            }),
            "[^']{0,24}".prop_map(|s| (FieldType::String, Value::String(s))),
            (0i64..253_402_300_799).prop_map(|secs| {
                let dt = chrono::DateTime::from_timestamp(secs, 0).unwrap().naive_utc();
                (FieldType::DateTime, Value::DateTime(dt))
            }),
            (0i64..SECONDS_PER_DAY)
                .prop_map(|secs| (FieldType::TimeSpan, Value::TimeSpan(TimeSpan::seconds(secs)))),
            any::<u128>().prop_map(|v| (FieldType::Guid, Value::Guid(Uuid::from_u128(v)))),
            prop::sample::select(vec![1i64, 2, 5])
                .prop_map(|v| (FieldType::Enum(&LEVELS), Value::Enum(v))),
            Just((FieldType::Int32, Value::Null)),
        ]
    }

    fn framing() -> impl Strategy<Value = Framing> {
        prop_oneof![
            Just(Framing::Row),
            Just(Framing::Message),
            Just(Framing::Predicate),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_value_round_trip(
            (ty, value) in prop_oneof![scalar_value(), rich_value()],
            framing in framing(),
        ) {
            let text = Encoder::encode_value(&value, ty, framing).unwrap();
            let decoded = Decoder::strict().decode_value(&text, ty, framing).unwrap();
            prop_assert_eq!(decoded, value);
        }

        #[test]
        fn prop_person_row_round_trip(id in any::<i32>(), name in "[^']{0,32}", age in any::<i32>()) {
            let schema = person_schema();
            let person = Person { id, name, age };
            let row = Encoder::encode_row(&schema, &person).unwrap();
            let decoded: Person = Decoder::strict().decode_row(&schema, &row).unwrap();
            prop_assert_eq!(decoded, person);
        }

        #[test]
        fn prop_person_message_round_trip(id in any::<i32>(), name in "[^']{0,32}", age in any::<i32>()) {
            let schema = person_schema();
            let person = Person { id, name, age };
            let message = Encoder::encode_message(&schema, &person).unwrap();
            let decoded: Person = Decoder::strict().decode_message(&schema, &message).unwrap();
            prop_assert_eq!(decoded, person);
        }
    }
}
