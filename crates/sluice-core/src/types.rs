//! Warehouse column types and the JSON-schema type mapper.

use std::fmt;

use serde_json::Value;

/// The two supported warehouse flavors.
///
/// The dialect decides column type names, the order synthetic columns take in
/// DDL and CSV headers, storage hints, and whether bulk loads pull from object
/// storage or from a local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Stages through object storage and ingests with a `COPY` command.
    Redshift,
    /// Stages through local files and ingests with `LOAD DATA LOCAL INFILE`.
    Singlestore,
}

/// Column length: a character count or the symbolic unbounded marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    Chars(u64),
    Max,
}

/// A warehouse column type: a name plus an optional length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataType {
    pub name: &'static str,
    pub length: Option<Length>,
}

impl DataType {
    pub fn new(name: &'static str) -> Self {
        Self { name, length: None }
    }

    pub fn with_length(name: &'static str, length: Length) -> Self {
        Self {
            name,
            length: Some(length),
        }
    }

    /// The fixed-width string type of the synthetic identity column.
    pub fn identity() -> Self {
        Self::with_length("VARCHAR", Length::Chars(32))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.length {
            Some(Length::Chars(n)) => write!(f, "{}({})", self.name, n),
            Some(Length::Max) => write!(f, "{}(MAX)", self.name),
            None => f.write_str(self.name),
        }
    }
}

/// A named column. Renders as `"name" TYPE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub data_type: DataType,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" {}", self.name, self.data_type)
    }
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Redshift => "redshift",
            Dialect::Singlestore => "singlestore",
        }
    }

    pub fn timestamp_type(&self) -> DataType {
        match self {
            Dialect::Redshift => DataType::new("TIMESTAMP WITHOUT TIME ZONE"),
            Dialect::Singlestore => DataType::new("TIMESTAMP"),
        }
    }

    /// The type every untypable value falls back to.
    pub fn fallback_type(&self) -> DataType {
        match self {
            Dialect::Redshift => DataType::with_length("VARCHAR", Length::Max),
            Dialect::Singlestore => DataType::new("TEXT"),
        }
    }

    fn string_type(&self, format: Option<&str>, max_length: Option<u64>) -> DataType {
        match format {
            Some("date-time") => self.timestamp_type(),
            Some("time") => DataType::new("TIME"),
            Some("date") => DataType::new("DATE"),
            _ => match max_length {
                Some(n) => DataType::with_length("VARCHAR", Length::Chars(n)),
                None => self.fallback_type(),
            },
        }
    }

    /// Resolves a JSON-schema leaf type to a warehouse column type.
    ///
    /// The `type` keyword may be a single name or a list mixing `"null"` with
    /// concrete names. A missing type, an all-null list, or a list with more
    /// than one concrete member collapses to `string`. Unknown names take the
    /// dialect fallback.
    pub fn convert(&self, json_type: Option<&Value>, format: Option<&str>, max_length: Option<u64>) -> DataType {
        let mut concrete: Vec<&str> = Vec::new();
        match json_type {
            Some(Value::String(name)) if name.as_str() != "null" => concrete.push(name.as_str()),
            Some(Value::Array(names)) => {
                concrete.extend(
                    names
                        .iter()
                        .filter_map(Value::as_str)
                        .filter(|name| *name != "null"),
                );
            }
            _ => {}
        }

        let resolved = match concrete.as_slice() {
            [single] => *single,
            _ => "string",
        };

        match resolved {
            "string" => self.string_type(format, max_length),
            "number" => match self {
                Dialect::Redshift => DataType::new("DOUBLE PRECISION"),
                Dialect::Singlestore => DataType::new("DOUBLE"),
            },
            "integer" => DataType::new("BIGINT"),
            "boolean" => DataType::new("BOOLEAN"),
            _ => self.fallback_type(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_string_falls_back_to_unbounded() {
        assert_eq!(
            Dialect::Redshift.convert(Some(&json!("string")), None, None).to_string(),
            "VARCHAR(MAX)"
        );
        assert_eq!(
            Dialect::Singlestore.convert(Some(&json!("string")), None, None).to_string(),
            "TEXT"
        );
    }

    #[test]
    fn string_with_max_length_is_bounded_varchar() {
        let data_type = Dialect::Redshift.convert(Some(&json!("string")), None, Some(255));
        assert_eq!(data_type.to_string(), "VARCHAR(255)");
    }

    #[test]
    fn string_formats_resolve_to_temporal_types() {
        assert_eq!(
            Dialect::Redshift
                .convert(Some(&json!("string")), Some("date-time"), None)
                .to_string(),
            "TIMESTAMP WITHOUT TIME ZONE"
        );
        assert_eq!(
            Dialect::Singlestore
                .convert(Some(&json!("string")), Some("date-time"), None)
                .to_string(),
            "TIMESTAMP"
        );
        assert_eq!(
            Dialect::Redshift.convert(Some(&json!("string")), Some("time"), None).to_string(),
            "TIME"
        );
        assert_eq!(
            Dialect::Redshift.convert(Some(&json!("string")), Some("date"), None).to_string(),
            "DATE"
        );
    }

    #[test]
    fn scalar_types_map_per_dialect() {
        assert_eq!(
            Dialect::Redshift.convert(Some(&json!("number")), None, None).to_string(),
            "DOUBLE PRECISION"
        );
        assert_eq!(
            Dialect::Singlestore.convert(Some(&json!("number")), None, None).to_string(),
            "DOUBLE"
        );
        assert_eq!(
            Dialect::Redshift.convert(Some(&json!("integer")), None, None).to_string(),
            "BIGINT"
        );
        assert_eq!(
            Dialect::Redshift.convert(Some(&json!("boolean")), None, None).to_string(),
            "BOOLEAN"
        );
    }

    #[test]
    fn nullable_list_resolves_to_concrete_member() {
        let data_type = Dialect::Redshift.convert(Some(&json!(["null", "integer"])), None, None);
        assert_eq!(data_type.to_string(), "BIGINT");
    }

    #[test]
    fn ambiguous_or_unknown_types_fall_back() {
        // Two concrete members collapse to string.
        let data_type = Dialect::Redshift.convert(Some(&json!(["integer", "string"])), None, None);
        assert_eq!(data_type.to_string(), "VARCHAR(MAX)");

        let data_type = Dialect::Redshift.convert(Some(&json!("geometry")), None, None);
        assert_eq!(data_type.to_string(), "VARCHAR(MAX)");

        let data_type = Dialect::Singlestore.convert(None, None, None);
        assert_eq!(data_type.to_string(), "TEXT");
    }

    #[test]
    fn field_renders_quoted_name_and_type() {
        let field = Field::new("id", DataType::new("BIGINT"));
        assert_eq!(field.to_string(), "\"id\" BIGINT");

        let field = Field::new("name", DataType::with_length("VARCHAR", Length::Chars(255)));
        assert_eq!(field.to_string(), "\"name\" VARCHAR(255)");
    }
}
