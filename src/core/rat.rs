//! Raster attribute tables.
//!
//! A table associates raster cell values (or value ranges) with typed
//! attribute rows, such as a class name per land-cover code. Tables are
//! shared between bands and clones through `Arc`.

use crate::core::text::{format_f64, parse_f64, parse_i64};
use crate::util::{Error, Result};
use crate::xml::XmlNode;

/// Column value type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RatFieldType {
    Integer,
    Real,
    String,
}

impl RatFieldType {
    fn code(self) -> u32 {
        match self {
            Self::Integer => 0,
            Self::Real => 1,
            Self::String => 2,
        }
    }

    fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Integer),
            1 => Some(Self::Real),
            2 => Some(Self::String),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Integer => "Integer",
            Self::Real => "Real",
            Self::String => "String",
        }
    }
}

/// Column role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RatFieldUsage {
    Generic,
    PixelCount,
    Name,
    Min,
    Max,
    MinMax,
    Red,
    Green,
    Blue,
    Alpha,
    /// Usage code this crate does not name; kept for round trips.
    Other(u32),
}

impl RatFieldUsage {
    fn code(self) -> u32 {
        match self {
            Self::Generic => 0,
            Self::PixelCount => 1,
            Self::Name => 2,
            Self::Min => 3,
            Self::Max => 4,
            Self::MinMax => 5,
            Self::Red => 6,
            Self::Green => 7,
            Self::Blue => 8,
            Self::Alpha => 9,
            Self::Other(code) => code,
        }
    }

    fn from_code(code: u32) -> Self {
        match code {
            0 => Self::Generic,
            1 => Self::PixelCount,
            2 => Self::Name,
            3 => Self::Min,
            4 => Self::Max,
            5 => Self::MinMax,
            6 => Self::Red,
            7 => Self::Green,
            8 => Self::Blue,
            9 => Self::Alpha,
            other => Self::Other(other),
        }
    }
}

/// Thematic tables classify discrete values; athematic tables bin ranges.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RatTableType {
    #[default]
    Thematic,
    Athematic,
}

/// Column definition.
#[derive(Clone, Debug, PartialEq)]
pub struct RatColumn {
    pub name: String,
    pub field_type: RatFieldType,
    pub usage: RatFieldUsage,
}

/// One cell.
#[derive(Clone, Debug, PartialEq)]
pub enum RatValue {
    Integer(i64),
    Real(f64),
    String(String),
}

impl RatValue {
    fn field_type(&self) -> RatFieldType {
        match self {
            Self::Integer(_) => RatFieldType::Integer,
            Self::Real(_) => RatFieldType::Real,
            Self::String(_) => RatFieldType::String,
        }
    }

    fn default_for(field_type: RatFieldType) -> Self {
        match field_type {
            RatFieldType::Integer => Self::Integer(0),
            RatFieldType::Real => Self::Real(0.0),
            RatFieldType::String => Self::String(String::new()),
        }
    }

    fn to_text(&self) -> String {
        match self {
            Self::Integer(v) => v.to_string(),
            Self::Real(v) => format_f64(*v),
            Self::String(v) => v.clone(),
        }
    }

    fn parse(field_type: RatFieldType, text: &str) -> Result<Self> {
        Ok(match field_type {
            RatFieldType::Integer => Self::Integer(parse_i64("F", text)?),
            RatFieldType::Real => Self::Real(parse_f64("F", text)?),
            RatFieldType::String => Self::String(text.to_string()),
        })
    }
}

/// Raster attribute table. Every row holds one value per column.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttributeTable {
    table_type: RatTableType,
    columns: Vec<RatColumn>,
    rows: Vec<Vec<RatValue>>,
}

impl AttributeTable {
    /// Create an empty table.
    pub fn new(table_type: RatTableType) -> Self {
        Self {
            table_type,
            ..Default::default()
        }
    }

    /// Table type.
    pub fn table_type(&self) -> RatTableType {
        self.table_type
    }

    /// Add a column; existing rows receive the type's zero value.
    pub fn add_column(&mut self, name: impl Into<String>, field_type: RatFieldType, usage: RatFieldUsage) {
        self.columns.push(RatColumn {
            name: name.into(),
            field_type,
            usage,
        });
        for row in &mut self.rows {
            row.push(RatValue::default_for(field_type));
        }
    }

    /// Column definitions.
    pub fn columns(&self) -> &[RatColumn] {
        &self.columns
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table has neither rows nor columns.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.columns.is_empty()
    }

    /// Append a row; values must match the column types in order.
    pub fn push_row(&mut self, values: Vec<RatValue>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(Error::TypeMismatch {
                expected: format!("{} values", self.columns.len()),
                actual: format!("{} values", values.len()),
            });
        }
        for (value, column) in values.iter().zip(&self.columns) {
            check_type(column, value)?;
        }
        self.rows.push(values);
        Ok(())
    }

    /// Get one cell.
    pub fn value(&self, row: usize, column: usize) -> Option<&RatValue> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// Set one cell, growing the table with default rows as needed.
    pub fn set_value(&mut self, row: usize, column: usize, value: RatValue) -> Result<()> {
        let col = self.columns.get(column).ok_or_else(|| {
            Error::other(format!("column {column} out of range ({} columns)", self.columns.len()))
        })?;
        check_type(col, &value)?;
        while self.rows.len() <= row {
            let defaults = self.columns.iter().map(|c| RatValue::default_for(c.field_type)).collect();
            self.rows.push(defaults);
        }
        self.rows[row][column] = value;
        Ok(())
    }

    pub(crate) fn to_xml(&self) -> XmlNode {
        let mut node = XmlNode::new("GDALRasterAttributeTable").attr(
            "tableType",
            match self.table_type {
                RatTableType::Thematic => "thematic",
                RatTableType::Athematic => "athematic",
            },
        );
        for (i, column) in self.columns.iter().enumerate() {
            let mut defn = XmlNode::new("FieldDefn").attr("index", i.to_string());
            defn.push_text("Name", column.name.as_str());
            defn.push_text("Type", column.field_type.code().to_string());
            defn.push_text("Usage", column.usage.code().to_string());
            node.push(defn);
        }
        for (i, row) in self.rows.iter().enumerate() {
            let mut row_node = XmlNode::new("Row").attr("index", i.to_string());
            for value in row {
                row_node.push_text("F", value.to_text());
            }
            node.push(row_node);
        }
        node
    }

    pub(crate) fn from_xml(node: &XmlNode) -> Result<Self> {
        let table_type = match node.attribute("tableType") {
            Some(t) if t.eq_ignore_ascii_case("athematic") => RatTableType::Athematic,
            _ => RatTableType::Thematic,
        };
        let mut table = Self::new(table_type);

        for defn in node.children_named("FieldDefn") {
            let code = |key: &str| -> Result<u32> {
                let text = defn.child_text(key).unwrap_or("0");
                text.trim()
                    .parse::<u32>()
                    .map_err(|_| Error::invalid_value(format!("FieldDefn/{key}"), text))
            };
            let type_code = code("Type")?;
            let field_type = RatFieldType::from_code(type_code)
                .ok_or_else(|| Error::invalid_value("FieldDefn/Type", type_code.to_string()))?;
            table.columns.push(RatColumn {
                name: defn.child_text("Name").unwrap_or("").to_string(),
                field_type,
                usage: RatFieldUsage::from_code(code("Usage")?),
            });
        }

        for row in node.children_named("Row") {
            let cells: Vec<&XmlNode> = row.children_named("F").collect();
            if cells.len() != table.columns.len() {
                return Err(Error::invalid_value(
                    "Row",
                    format!("{} fields for {} columns", cells.len(), table.columns.len()),
                ));
            }
            let values = cells
                .iter()
                .zip(&table.columns)
                .map(|(cell, column)| RatValue::parse(column.field_type, cell.text()))
                .collect::<Result<Vec<_>>>()?;
            table.rows.push(values);
        }

        Ok(table)
    }
}

fn check_type(column: &RatColumn, value: &RatValue) -> Result<()> {
    if value.field_type() == column.field_type {
        Ok(())
    } else {
        Err(Error::TypeMismatch {
            expected: column.field_type.name().to_string(),
            actual: value.field_type().name().to_string(),
        })
    }
}
