//! Schema descriptors: columns, tables and constraints.
//!
//! These types describe schema operations independently of any engine. They are
//! rendered to SQL by a [`Dialect`](super::traits::Dialect) and recovered from
//! catalog metadata by the same dialect.

use std::collections::BTreeSet;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{MigrateError, Result};

/// Abstract column type, mapped to a native type name by each dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbType {
    Boolean,
    Byte,
    Int16,
    Int32,
    Int64,
    Single,
    Double,
    /// Exact numeric; size is the precision.
    Decimal,
    Currency,
    /// Variable-length Unicode string; size is the character length.
    String,
    StringFixedLength,
    AnsiString,
    /// Unbounded character data.
    Text,
    /// Variable-length binary; size is the byte length.
    Binary,
    /// Unbounded binary data.
    Blob,
    Date,
    Time,
    DateTime,
    DateTimeOffset,
    Guid,
}

impl DbType {
    /// Whether a size must accompany this type.
    pub fn requires_size(self) -> bool {
        matches!(
            self,
            DbType::String
                | DbType::StringFixedLength
                | DbType::AnsiString
                | DbType::Binary
                | DbType::Decimal
        )
    }

    /// The size for a sized type, or an error naming the type.
    pub fn required_size(self, size: Option<u32>) -> Result<u32> {
        match size {
            Some(n) if n > 0 => Ok(n),
            _ => Err(MigrateError::invalid_column(
                self.to_string(),
                format!("{} requires a size", self),
            )),
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            DbType::Byte
                | DbType::Int16
                | DbType::Int32
                | DbType::Int64
                | DbType::Single
                | DbType::Double
                | DbType::Decimal
                | DbType::Currency
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DbType::Byte | DbType::Int16 | DbType::Int32 | DbType::Int64
        )
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Column flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ColumnProperty {
    NotNull,
    Null,
    PrimaryKey,
    /// Identity / auto-increment.
    Identity,
    Unique,
    /// Create a non-unique index on the column.
    Indexed,
    /// Column references another table; nullable unless `NotNull` is explicit.
    ForeignKey,
}

/// Set of column flags.
pub type ColumnProperties = BTreeSet<ColumnProperty>;

/// Typed literal used as a column default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DefaultValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    /// Emitted verbatim (e.g. `CURRENT_TIMESTAMP`, or a default read back from the catalog).
    Raw(String),
}

impl From<bool> for DefaultValue {
    fn from(v: bool) -> Self {
        DefaultValue::Bool(v)
    }
}

impl From<i32> for DefaultValue {
    fn from(v: i32) -> Self {
        DefaultValue::Int(v as i64)
    }
}

impl From<i64> for DefaultValue {
    fn from(v: i64) -> Self {
        DefaultValue::Int(v)
    }
}

impl From<f64> for DefaultValue {
    fn from(v: f64) -> Self {
        DefaultValue::Float(v)
    }
}

impl From<Decimal> for DefaultValue {
    fn from(v: Decimal) -> Self {
        DefaultValue::Decimal(v)
    }
}

impl From<&str> for DefaultValue {
    fn from(v: &str) -> Self {
        DefaultValue::Text(v.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(v: String) -> Self {
        DefaultValue::Text(v)
    }
}

/// Column definition.
///
/// Built with chained setters and checked by [`Column::build`]:
///
/// ```rust
/// use schemigrate::core::{Column, DbType};
///
/// let id = Column::new("Id", DbType::Int32).primary_key_with_identity().build()?;
/// let title = Column::new("Title", DbType::String).size(100).null().build()?;
/// # Ok::<(), schemigrate::MigrateError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub db_type: DbType,
    /// Character length, binary length or numeric precision.
    pub size: Option<u32>,
    /// Numeric scale.
    pub scale: Option<u32>,
    pub properties: ColumnProperties,
    pub default: Option<DefaultValue>,
}

impl Column {
    pub fn new(name: impl Into<String>, db_type: DbType) -> Self {
        Self {
            name: name.into(),
            db_type,
            size: None,
            scale: None,
            properties: ColumnProperties::new(),
            default: None,
        }
    }

    pub fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }

    pub fn property(mut self, property: ColumnProperty) -> Self {
        self.properties.insert(property);
        self
    }

    pub fn not_null(self) -> Self {
        self.property(ColumnProperty::NotNull)
    }

    pub fn null(self) -> Self {
        self.property(ColumnProperty::Null)
    }

    pub fn primary_key(self) -> Self {
        self.property(ColumnProperty::PrimaryKey)
    }

    pub fn identity(self) -> Self {
        self.property(ColumnProperty::Identity)
    }

    pub fn primary_key_with_identity(self) -> Self {
        self.property(ColumnProperty::PrimaryKey)
            .property(ColumnProperty::Identity)
            .property(ColumnProperty::NotNull)
    }

    pub fn unique(self) -> Self {
        self.property(ColumnProperty::Unique)
    }

    pub fn indexed(self) -> Self {
        self.property(ColumnProperty::Indexed)
    }

    pub fn foreign_key(self) -> Self {
        self.property(ColumnProperty::ForeignKey)
    }

    pub fn default(mut self, value: impl Into<DefaultValue>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Validate and return the column.
    pub fn build(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Check the column invariants.
    ///
    /// - `NotNull` and `Null` are mutually exclusive.
    /// - `PrimaryKey` and `Identity` cannot be combined with an explicit `Null`.
    /// - Variable-length types carry a non-zero size.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(MigrateError::invalid_column("", "column name is empty"));
        }
        if self.has(ColumnProperty::NotNull) && self.has(ColumnProperty::Null) {
            return Err(MigrateError::invalid_column(
                &self.name,
                "NotNull and Null are mutually exclusive",
            ));
        }
        if self.has(ColumnProperty::Null)
            && (self.has(ColumnProperty::PrimaryKey) || self.has(ColumnProperty::Identity))
        {
            return Err(MigrateError::invalid_column(
                &self.name,
                "primary key and identity columns cannot be nullable",
            ));
        }
        if self.db_type.requires_size() && self.size.unwrap_or(0) == 0 {
            return Err(MigrateError::invalid_column(
                &self.name,
                format!("{} requires a size", self.db_type),
            ));
        }
        if let (Some(scale), Some(size)) = (self.scale, self.size) {
            if self.db_type == DbType::Decimal && scale > size {
                return Err(MigrateError::invalid_column(
                    &self.name,
                    format!("scale {} exceeds precision {}", scale, size),
                ));
            }
        }
        Ok(())
    }

    pub fn has(&self, property: ColumnProperty) -> bool {
        self.properties.contains(&property)
    }

    pub fn is_primary_key(&self) -> bool {
        self.has(ColumnProperty::PrimaryKey)
    }

    pub fn is_identity(&self) -> bool {
        self.has(ColumnProperty::Identity)
    }

    /// Effective NOT NULL, including the implication from primary key / identity.
    pub fn is_not_null(&self) -> bool {
        self.has(ColumnProperty::NotNull) || self.is_primary_key() || self.is_identity()
    }
}

/// Referential action for foreign keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Cascade,
    SetNull,
    Restrict,
}

impl ForeignKeyAction {
    pub fn as_sql(self) -> &'static str {
        match self {
            ForeignKeyAction::NoAction => "NO ACTION",
            ForeignKeyAction::Cascade => "CASCADE",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::Restrict => "RESTRICT",
        }
    }
}

/// Constraint body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Constraint {
    PrimaryKey {
        columns: Vec<String>,
    },
    ForeignKey {
        columns: Vec<String>,
        ref_table: String,
        ref_columns: Vec<String>,
        on_delete: ForeignKeyAction,
    },
    Unique {
        columns: Vec<String>,
    },
    Check {
        expression: String,
    },
}

impl Constraint {
    pub fn kind(&self) -> ConstraintKind {
        match self {
            Constraint::PrimaryKey { .. } => ConstraintKind::PrimaryKey,
            Constraint::ForeignKey { .. } => ConstraintKind::ForeignKey,
            Constraint::Unique { .. } => ConstraintKind::Unique,
            Constraint::Check { .. } => ConstraintKind::Check,
        }
    }
}

/// A constraint attached to a table, with an explicit or derived name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedConstraint {
    pub name: Option<String>,
    pub table: String,
    pub constraint: Constraint,
}

impl NamedConstraint {
    pub fn new(name: Option<&str>, table: impl Into<String>, constraint: Constraint) -> Self {
        Self {
            name: name.map(str::to_string),
            table: table.into(),
            constraint,
        }
    }

    /// Explicit name, or the name derived from kind, table and columns.
    pub fn name(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.derived_name(),
        }
    }

    pub fn derived_name(&self) -> String {
        match &self.constraint {
            Constraint::PrimaryKey { .. } => primary_key_name(&self.table),
            Constraint::ForeignKey { ref_table, .. } => format!("FK_{}_{}", self.table, ref_table),
            Constraint::Unique { columns } => format!("UQ_{}_{}", self.table, columns.join("_")),
            Constraint::Check { expression } => {
                let digest = Sha256::digest(expression.as_bytes());
                let hex: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();
                format!("CK_{}_{}", self.table, hex)
            }
        }
    }
}

/// Name of the primary key constraint for a table.
pub fn primary_key_name(table: &str) -> String {
    format!("PK_{}", table)
}

/// Name of the index created for an `Indexed` column.
pub fn index_name(table: &str, column: &str) -> String {
    format!("IX_{}_{}", table, column)
}

/// Table definition for `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    /// Order is significant for generated DDL and positional inserts.
    pub columns: Vec<Column>,
    /// Table-level constraints emitted inside `CREATE TABLE`.
    pub constraints: Vec<NamedConstraint>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            constraints: Vec::new(),
        }
    }

    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn columns(mut self, columns: impl IntoIterator<Item = Column>) -> Self {
        self.columns.extend(columns);
        self
    }

    pub fn constraint(mut self, name: Option<&str>, constraint: Constraint) -> Self {
        let named = NamedConstraint::new(name, self.name.clone(), constraint);
        self.constraints.push(named);
        self
    }

    /// Primary key column names in declaration order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key())
            .map(|c| c.name.as_str())
            .collect()
    }

    /// More than one primary key column: emitted as one table-level constraint.
    pub fn has_compound_primary_key(&self) -> bool {
        self.primary_key().len() > 1
    }

    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(MigrateError::Migration(format!(
                "table '{}' must have at least one column",
                self.name
            )));
        }
        for column in &self.columns {
            column.validate()?;
        }
        Ok(())
    }
}

/// Kind of a constraint found in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
}

impl ConstraintKind {
    /// Parse the `CONSTRAINT_TYPE` spelling used by information_schema.
    pub fn from_catalog(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "PRIMARY KEY" | "P" => Some(ConstraintKind::PrimaryKey),
            "FOREIGN KEY" | "F" => Some(ConstraintKind::ForeignKey),
            "UNIQUE" | "U" => Some(ConstraintKind::Unique),
            "CHECK" | "C" => Some(ConstraintKind::Check),
            _ => None,
        }
    }
}

/// Constraint as read back from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintInfo {
    pub name: String,
    pub kind: ConstraintKind,
}
