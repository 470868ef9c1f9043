//! Record schemas and the schema registry.
//!
//! A record type describes its fields once, at registration time, through
//! the [`Record`] trait. [`SchemaDescriptor::describe`] selects the fields
//! that take part in the wire format and derives the column definitions
//! used for table creation. [`SchemaRegistry`] memoises descriptors per
//! record type for the lifetime of the registry.

use crate::error::ProtocolError;
use crate::value::{FieldType, FieldValue, Value};
use dashmap::DashMap;
use std::any::TypeId;
use std::sync::Arc;

/// Declaration of one record field, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub field_type: FieldType,
    pub writable: bool,
    pub excluded: bool,
}

impl FieldDef {
    pub fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            field_type,
            writable: true,
            excluded: false,
        }
    }

    /// Marks the field as not writable. Read-only fields never take part
    /// in the wire format.
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    /// Explicitly excludes the field from the wire format.
    pub fn excluded(mut self) -> Self {
        self.excluded = true;
        self
    }
}

/// A structured value with named, typed fields.
///
/// Implement by hand or with [`impl_record!`](crate::impl_record).
pub trait Record: Default + Send + Sync + 'static {
    /// All declared fields, in declaration order.
    fn fields() -> Vec<FieldDef>;

    /// Returns the current value of a declared field.
    fn get(&self, field: &str) -> Option<Value>;

    /// Replaces the value of a declared field.
    fn set(&mut self, field: &str, value: Value) -> Result<(), ProtocolError>;
}

/// Resolves the field type of a struct member through its accessor.
///
/// Used by [`impl_record!`](crate::impl_record).
pub fn field_type_of<R, T, F>(_accessor: F) -> FieldType
where
    T: FieldValue,
    F: Fn(&R) -> &T,
{
    T::field_type()
}

/// Derives [`Record`] for a struct from a list of its fields.
///
/// Fields not listed are excluded from the wire format. Prefix a field with
/// `@read_only` to declare it without letting it participate.
///
/// ```
/// use dbapi_protocol::{impl_record, Record};
///
/// #[derive(Debug, Default)]
/// struct Person {
///     id: i32,
///     name: String,
///     age: i32,
/// }
/// impl_record!(Person { id, name, age });
///
/// assert_eq!(Person::fields().len(), 3);
/// ```
#[macro_export]
macro_rules! impl_record {
    ($ty:ty { $($(@$flag:ident)? $field:ident),+ $(,)? }) => {
        impl $crate::Record for $ty {
            fn fields() -> Vec<$crate::FieldDef> {
                vec![$(
                    $crate::FieldDef::new(
                        stringify!($field),
                        $crate::schema::field_type_of(|r: &$ty| &r.$field),
                    )$(.$flag())?
                ),+]
            }

            fn get(&self, field: &str) -> Option<$crate::Value> {
                match field {
                    $(stringify!($field) => Some($crate::FieldValue::to_value(&self.$field)),)+
                    _ => None,
                }
            }

            fn set(
                &mut self,
                field: &str,
                value: $crate::Value,
            ) -> Result<(), $crate::ProtocolError> {
                match field {
                    $(stringify!($field) => {
                        self.$field = $crate::FieldValue::from_value(value)?;
                        Ok(())
                    })+
                    _ => Err($crate::ProtocolError::UnknownField {
                        record: stringify!($ty).to_string(),
                        field: field.to_string(),
                    }),
                }
            }
        }
    };
}

/// Options applied when describing record types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaOptions {
    /// Map unsigned integer fields to same-width columns instead of
    /// rejecting them.
    pub allow_unsigned: bool,
}

/// A participating field of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub field_type: FieldType,
    /// Position in the row framing.
    pub ordinal: usize,
    pub writable: bool,
    pub excluded: bool,
}

impl FieldDescriptor {
    /// Returns whether this is the identity field.
    pub fn is_identity(&self) -> bool {
        self.name.eq_ignore_ascii_case("id")
    }
}

/// Immutable schema of one record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    record: &'static str,
    fields: Vec<FieldDescriptor>,
    column_definitions: String,
    identity: Option<usize>,
}

impl SchemaDescriptor {
    /// Builds the schema of `R`. Pure; repeated calls yield equal schemas.
    pub fn describe<R: Record>(options: &SchemaOptions) -> Result<Self, ProtocolError> {
        let record = short_type_name::<R>();

        let mut fields = Vec::new();
        for def in R::fields() {
            if !def.writable || def.excluded || !def.field_type.is_supported() {
                continue;
            }
            if def.field_type.is_unsigned() && !options.allow_unsigned {
                return Err(ProtocolError::UnsignedNotAllowed {
                    record: record.to_string(),
                    field: def.name.to_string(),
                });
            }
            fields.push(FieldDescriptor {
                name: def.name,
                field_type: def.field_type,
                ordinal: fields.len(),
                writable: def.writable,
                excluded: def.excluded,
            });
        }

        if fields.is_empty() {
            return Err(ProtocolError::EmptySchema {
                record: record.to_string(),
            });
        }

        let identity = fields.iter().position(FieldDescriptor::is_identity);

        let mut column_definitions = String::new();
        for field in &fields {
            if let Some(sql) = field.field_type.column_type() {
                column_definitions.push_str(field.name);
                column_definitions.push(' ');
                column_definitions.push_str(sql);
                column_definitions.push_str(", ");
            }
        }
        match identity {
            Some(idx) => {
                column_definitions.push_str("PRIMARY KEY(");
                column_definitions.push_str(fields[idx].name);
                column_definitions.push(')');
            }
            None => {
                column_definitions.truncate(column_definitions.len() - 2);
            }
        }

        Ok(Self {
            record,
            fields,
            column_definitions,
            identity,
        })
    }

    /// Short name of the record type.
    pub fn record_name(&self) -> &'static str {
        self.record
    }

    /// Participating fields in ordinal order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Comma-joined `name TYPE` list for table creation.
    pub fn column_definitions(&self) -> &str {
        &self.column_definitions
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a field, failing with a validation error if unknown.
    pub fn require_field(&self, name: &str) -> Result<&FieldDescriptor, ProtocolError> {
        self.field(name).ok_or_else(|| ProtocolError::UnknownField {
            record: self.record.to_string(),
            field: name.to_string(),
        })
    }

    pub fn identity(&self) -> Option<&FieldDescriptor> {
        self.identity.map(|idx| &self.fields[idx])
    }

    pub fn require_identity(&self) -> Result<&FieldDescriptor, ProtocolError> {
        self.identity().ok_or_else(|| ProtocolError::MissingIdentity {
            record: self.record.to_string(),
        })
    }

    /// Current values of the participating fields, in ordinal order.
    pub fn values_of<R: Record>(&self, record: &R) -> Vec<Value> {
        self.fields
            .iter()
            .map(|f| record.get(f.name).unwrap_or(Value::Null))
            .collect()
    }

    /// Ordinal of the identity field, if the schema has one.
    pub fn identity_index(&self) -> Option<usize> {
        self.identity
    }

    /// Current value of the identity field, if the schema has one.
    pub fn identity_value<R: Record>(&self, record: &R) -> Option<Value> {
        self.identity()
            .map(|f| record.get(f.name).unwrap_or(Value::Null))
    }
}

pub(crate) fn short_type_name<R>() -> &'static str {
    let full = std::any::type_name::<R>();
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::").next().unwrap_or(path)
}

/// Memoising, thread-safe cache of record schemas.
///
/// Owned by the application; building is pure, so two threads racing on the
/// first lookup of a type only duplicate work.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    options: SchemaOptions,
    schemas: DashMap<TypeId, Arc<SchemaDescriptor>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: SchemaOptions) -> Self {
        Self {
            options,
            schemas: DashMap::new(),
        }
    }

    pub fn options(&self) -> &SchemaOptions {
        &self.options
    }

    /// Returns the schema of `R`, building it on first use.
    pub fn describe<R: Record>(&self) -> Result<Arc<SchemaDescriptor>, ProtocolError> {
        let key = TypeId::of::<R>();
        if let Some(schema) = self.schemas.get(&key) {
            return Ok(Arc::clone(schema.value()));
        }

        let built = Arc::new(SchemaDescriptor::describe::<R>(&self.options)?);
        tracing::debug!(
            record = built.record_name(),
            fields = built.len(),
            "Described record schema"
        );
        Ok(Arc::clone(self.schemas.entry(key).or_insert(built).value()))
    }

    /// Number of cached schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Drops every cached schema.
    pub fn clear(&self) {
        self.schemas.clear();
    }
}
