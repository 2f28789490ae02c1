//! Logical column types and per-dialect capability tables.
//!
//! [`ColumnType`] is the dialect-agnostic vocabulary used by declared schemas.
//! Each dialect classifies every symbol through an exhaustive match, so adding
//! a symbol without deciding how (or whether) every engine renders it does not
//! compile. [`TypeCatalog`] is the resulting lookup table.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ReconcileError;

/// A supported database engine family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// MySQL and MariaDB.
    MySql,
    /// PostgreSQL.
    Postgres,
}

impl Dialect {
    /// Human readable engine name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MySql => "MySQL",
            Self::Postgres => "PostgreSQL",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            other => Err(format!("unknown dialect '{other}'")),
        }
    }
}

macro_rules! column_types {
    ($($(#[$doc:meta])* $variant:ident),+ $(,)?) => {
        /// Logical column type shared by every dialect.
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub enum ColumnType {
            $($(#[$doc])* $variant,)+
        }

        impl ColumnType {
            /// Every logical type, in declaration order.
            pub const ALL: &'static [ColumnType] = &[$(ColumnType::$variant),+];

            /// Symbol used in declarative source (`ColumnType::VarChar` → `"VarChar"`).
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(ColumnType::$variant => stringify!($variant),)+
                }
            }
        }
    };
}

column_types! {
    Bool,
    Boolean,
    TinyInt,
    SmallInt,
    MediumInt,
    Int,
    Integer,
    BigInt,
    Decimal,
    Float,
    Real,
    Double,
    Bit,
    Binary,
    VarBinary,
    TinyBlob,
    Blob,
    MediumBlob,
    LongBlob,
    Char,
    /// National character type (SQL Server heritage).
    NChar,
    VarChar,
    /// National variable character type (SQL Server heritage).
    NVarChar,
    TinyText,
    Text,
    MediumText,
    LongText,
    Enum,
    Set,
    Json,
    Uuid,
    Date,
    DateTime,
    DateTime2,
    DateTimeOffset,
    SmallDateTime,
    Time,
    Timestamp,
    Year,
    Geometry,
    GeometryCollection,
    LineString,
    MultiLineString,
    MultiPoint,
    MultiPolygon,
    Point,
    Polygon,
}

impl ColumnType {
    /// Returns true for types whose default values are rendered as quoted literals.
    #[must_use]
    pub const fn is_string_like(self) -> bool {
        matches!(
            self,
            Self::Char
                | Self::NChar
                | Self::VarChar
                | Self::NVarChar
                | Self::TinyText
                | Self::Text
                | Self::MediumText
                | Self::LongText
                | Self::Enum
                | Self::Set
        )
    }
}

impl ColumnType {
    /// Returns true for integer, fixed point and floating point types.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::TinyInt
                | Self::SmallInt
                | Self::MediumInt
                | Self::Int
                | Self::Integer
                | Self::BigInt
                | Self::Decimal
                | Self::Float
                | Self::Real
                | Self::Double
        )
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let symbol = s.strip_prefix("ColumnType::").unwrap_or(s);
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(symbol))
            .ok_or_else(|| format!("unknown column type '{s}'"))
    }
}

/// Length, precision or value list attached to a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LengthRepr", into = "LengthRepr")]
pub enum Length {
    /// A character, byte or display width.
    Size(u32),
    /// Decimal precision and scale.
    Precision(u32, u32),
    /// The engine's maximum (`varchar(MAX)` style).
    Max,
    /// Allowed values of an enum or set column.
    Values(Vec<String>),
}

impl Length {
    /// Builds a value list from anything string-like.
    #[must_use]
    pub fn values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Values(values.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Size(size) => write!(f, "{size}"),
            Self::Precision(precision, scale) => write!(f, "{precision},{scale}"),
            Self::Max => f.write_str("MAX"),
            Self::Values(values) => {
                let quoted: Vec<String> = values
                    .iter()
                    .map(|v| format!("'{}'", v.replace('\'', "''")))
                    .collect();
                f.write_str(&quoted.join(","))
            }
        }
    }
}

impl From<u32> for Length {
    fn from(size: u32) -> Self {
        Self::Size(size)
    }
}

impl From<(u32, u32)> for Length {
    fn from((precision, scale): (u32, u32)) -> Self {
        Self::Precision(precision, scale)
    }
}

impl FromStr for Length {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("max") || s == "-1" {
            return Ok(Self::Max);
        }
        if let Some((precision, scale)) = s.split_once(',') {
            let precision = precision.trim().parse::<u32>();
            let scale = scale.trim().parse::<u32>();
            if let (Ok(precision), Ok(scale)) = (precision, scale) {
                return Ok(Self::Precision(precision, scale));
            }
        }
        if let Ok(size) = s.parse::<u32>() {
            return Ok(Self::Size(size));
        }
        if s.starts_with('\'') {
            return Ok(Self::Values(split_quoted_values(s)));
        }
        Err(format!("invalid length '{s}'"))
    }
}

/// Splits `'a','b''c'` into `["a", "b'c"]`.
fn split_quoted_values(s: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, in_quote) {
            ('\'', true) if chars.peek() == Some(&'\'') => {
                current.push('\'');
                chars.next();
            }
            ('\'', true) => {
                values.push(std::mem::take(&mut current));
                in_quote = false;
            }
            ('\'', false) => in_quote = true,
            (c, true) => current.push(c),
            _ => {}
        }
    }
    values
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum LengthRepr {
    Size(u32),
    Precision(u32, u32),
    Text(String),
    Values(Vec<String>),
}

impl TryFrom<LengthRepr> for Length {
    type Error = String;

    fn try_from(repr: LengthRepr) -> Result<Self, Self::Error> {
        match repr {
            LengthRepr::Size(size) => Ok(Self::Size(size)),
            LengthRepr::Precision(precision, scale) => Ok(Self::Precision(precision, scale)),
            LengthRepr::Text(text) => text.parse(),
            LengthRepr::Values(values) => Ok(Self::Values(values)),
        }
    }
}

impl From<Length> for LengthRepr {
    fn from(length: Length) -> Self {
        match length {
            Length::Size(size) => Self::Size(size),
            Length::Precision(precision, scale) => Self::Precision(precision, scale),
            Length::Max => Self::Text("MAX".to_string()),
            Length::Values(values) => Self::Values(values),
        }
    }
}

/// How a type treats the length attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LengthRule {
    /// Never rendered; any declared length is ignored.
    None,
    /// Rendered, falling back to the given default.
    Default(Length),
    /// Rendered and mandatory (`varchar`, `char`).
    Required,
    /// Rendered and must be a value list (`enum`, `set`).
    Values,
}

/// How one dialect renders one logical type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSpec {
    /// Engine type name.
    pub name: &'static str,
    /// Length handling.
    pub length: LengthRule,
    /// Whether a collation clause applies.
    pub collatable: bool,
}

impl TypeSpec {
    const fn plain(name: &'static str) -> Self {
        Self {
            name,
            length: LengthRule::None,
            collatable: false,
        }
    }

    const fn sized(name: &'static str, size: u32) -> Self {
        Self {
            name,
            length: LengthRule::Default(Length::Size(size)),
            collatable: false,
        }
    }

    const fn required(name: &'static str) -> Self {
        Self {
            name,
            length: LengthRule::Required,
            collatable: false,
        }
    }

    const fn collatable(mut self) -> Self {
        self.collatable = true;
        self
    }
}

/// Returned when a dialect has no mapping for a logical type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsupportedType {
    /// The rejected type.
    pub column_type: ColumnType,
    /// The dialect that rejected it.
    pub dialect: Dialect,
}

impl UnsupportedType {
    /// Converts into a reconciliation error naming the offending column.
    #[must_use]
    pub fn for_column(self, column: &str) -> ReconcileError {
        ReconcileError::UnsupportedType {
            column_type: self.column_type,
            dialect: self.dialect,
            table: None,
            column: column.to_string(),
        }
    }
}

impl fmt::Display for UnsupportedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} is not supported by {}", self.column_type, self.dialect)
    }
}

impl std::error::Error for UnsupportedType {}

/// Per-dialect capability table covering every [`ColumnType`].
#[derive(Debug, Clone)]
pub struct TypeCatalog {
    dialect: Dialect,
    entries: BTreeMap<ColumnType, Option<TypeSpec>>,
}

impl TypeCatalog {
    /// Builds the catalog for a dialect by classifying every logical type.
    #[must_use]
    pub fn for_dialect(dialect: Dialect) -> Self {
        let classify = match dialect {
            Dialect::MySql => mysql_spec,
            Dialect::Postgres => postgres_spec,
        };
        let entries = ColumnType::ALL
            .iter()
            .map(|&column_type| (column_type, classify(column_type)))
            .collect();
        Self { dialect, entries }
    }

    /// The dialect this catalog describes.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Looks up the full rendering rule for a type.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedType`] when the dialect has no rendering for the type.
    pub fn spec(&self, column_type: ColumnType) -> Result<&TypeSpec, UnsupportedType> {
        self.entries
            .get(&column_type)
            .and_then(Option::as_ref)
            .ok_or(UnsupportedType {
                column_type,
                dialect: self.dialect,
            })
    }

    /// Engine type name for a logical type.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedType`] when the dialect has no rendering for the type.
    pub fn renders_as(&self, column_type: ColumnType) -> Result<&'static str, UnsupportedType> {
        self.spec(column_type).map(|spec| spec.name)
    }

    /// Length used when a column declares none.
    #[must_use]
    pub fn default_length(&self, column_type: ColumnType) -> Option<Length> {
        match self.spec(column_type).ok()?.length {
            LengthRule::Default(ref length) => Some(length.clone()),
            _ => None,
        }
    }

    /// Length handling for a type.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedType`] when the dialect has no rendering for the type.
    pub fn length_rule(&self, column_type: ColumnType) -> Result<&LengthRule, UnsupportedType> {
        self.spec(column_type).map(|spec| &spec.length)
    }

    /// Whether a collation clause applies to the type.
    #[must_use]
    pub fn is_collatable(&self, column_type: ColumnType) -> bool {
        self.spec(column_type).is_ok_and(|spec| spec.collatable)
    }

    /// Types this dialect cannot render.
    #[must_use]
    pub fn unsupported(&self) -> Vec<ColumnType> {
        self.entries
            .iter()
            .filter(|(_, spec)| spec.is_none())
            .map(|(column_type, _)| *column_type)
            .collect()
    }
}

fn mysql_spec(column_type: ColumnType) -> Option<TypeSpec> {
    use ColumnType as T;

    let spec = match column_type {
        T::Bool | T::Boolean => TypeSpec::sized("tinyint", 1),
        T::TinyInt => TypeSpec::sized("tinyint", 4),
        T::SmallInt => TypeSpec::sized("smallint", 6),
        T::MediumInt => TypeSpec::sized("mediumint", 9),
        T::Int | T::Integer => TypeSpec::sized("int", 11),
        T::BigInt => TypeSpec::sized("bigint", 20),
        T::Decimal => TypeSpec {
            name: "decimal",
            length: LengthRule::Default(Length::Precision(10, 0)),
            collatable: false,
        },
        T::Float => TypeSpec::plain("float"),
        T::Real | T::Double => TypeSpec::plain("double"),
        T::Bit => TypeSpec::sized("bit", 2),
        T::Binary => TypeSpec::required("binary"),
        T::VarBinary => TypeSpec::required("varbinary"),
        T::TinyBlob => TypeSpec::plain("tinyblob"),
        T::Blob => TypeSpec::plain("blob"),
        T::MediumBlob => TypeSpec::plain("mediumblob"),
        T::LongBlob => TypeSpec::plain("longblob"),
        T::Char => TypeSpec::required("char").collatable(),
        T::VarChar => TypeSpec::required("varchar").collatable(),
        T::TinyText => TypeSpec::plain("tinytext").collatable(),
        T::Text => TypeSpec::plain("text").collatable(),
        T::MediumText => TypeSpec::plain("mediumtext").collatable(),
        T::LongText => TypeSpec::plain("longtext").collatable(),
        T::Enum => TypeSpec {
            name: "enum",
            length: LengthRule::Values,
            collatable: true,
        },
        T::Set => TypeSpec {
            name: "set",
            length: LengthRule::Values,
            collatable: true,
        },
        T::Json => TypeSpec::plain("json"),
        T::Date => TypeSpec::plain("date"),
        T::DateTime => TypeSpec::plain("datetime"),
        T::Time => TypeSpec::plain("time"),
        T::Timestamp => TypeSpec::plain("timestamp"),
        T::Year => TypeSpec::sized("year", 4),
        T::Geometry => TypeSpec::plain("geometry"),
        T::GeometryCollection => TypeSpec::plain("geometrycollection"),
        T::LineString => TypeSpec::plain("linestring"),
        T::MultiLineString => TypeSpec::plain("multilinestring"),
        T::MultiPoint => TypeSpec::plain("multipoint"),
        T::MultiPolygon => TypeSpec::plain("multipolygon"),
        T::Point => TypeSpec::plain("point"),
        T::Polygon => TypeSpec::plain("polygon"),
        T::NChar | T::NVarChar | T::Uuid | T::DateTime2 | T::DateTimeOffset | T::SmallDateTime => {
            return None
        }
    };
    Some(spec)
}

fn postgres_spec(column_type: ColumnType) -> Option<TypeSpec> {
    use ColumnType as T;

    let spec = match column_type {
        T::Bool | T::Boolean => TypeSpec::plain("boolean"),
        T::TinyInt | T::SmallInt => TypeSpec::plain("smallint"),
        T::MediumInt | T::Int | T::Integer => TypeSpec::plain("integer"),
        T::BigInt => TypeSpec::plain("bigint"),
        T::Decimal => TypeSpec {
            name: "numeric",
            length: LengthRule::Default(Length::Precision(10, 0)),
            collatable: false,
        },
        T::Float => TypeSpec::plain("real"),
        T::Real | T::Double => TypeSpec::plain("double precision"),
        T::Bit => TypeSpec::sized("bit", 1),
        T::Binary | T::VarBinary | T::TinyBlob | T::Blob | T::MediumBlob | T::LongBlob => {
            TypeSpec::plain("bytea")
        }
        T::Char | T::NChar => TypeSpec::required("char").collatable(),
        T::VarChar | T::NVarChar => TypeSpec::required("varchar").collatable(),
        T::TinyText | T::Text | T::MediumText | T::LongText => {
            TypeSpec::plain("text").collatable()
        }
        T::Json => TypeSpec::plain("jsonb"),
        T::Uuid => TypeSpec::plain("uuid"),
        T::Date => TypeSpec::plain("date"),
        T::DateTime | T::DateTime2 | T::Timestamp => TypeSpec::plain("timestamp"),
        T::DateTimeOffset => TypeSpec::plain("timestamptz"),
        T::Time => TypeSpec::plain("time"),
        T::Enum
        | T::Set
        | T::Year
        | T::SmallDateTime
        | T::Geometry
        | T::GeometryCollection
        | T::LineString
        | T::MultiLineString
        | T::MultiPoint
        | T::MultiPolygon
        | T::Point
        | T::Polygon => return None,
    };
    Some(spec)
}
