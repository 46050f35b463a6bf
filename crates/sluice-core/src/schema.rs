//! Walks a JSON schema and produces the ordered tree of target tables.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::table::{ParentLink, Table};
use crate::types::{Dialect, Field};

/// Separator between parent and child segments in a table's dotted path.
pub const PARENT_CHILD_SPLITTER: char = '.';

/// Translates one stream's JSON schema into related flat tables.
///
/// Scalar properties become columns. An object property with `properties`
/// becomes a child table whose reference key joins its primary key (one child
/// row per parent). An array of objects becomes a child table without that
/// key in the primary key (many child rows per parent). Arrays of scalars and
/// objects without `properties` degenerate to a single string column on the
/// parent.
pub struct SchemaFlattener {
    schema: String,
    root: String,
    dialect: Dialect,
    /// Declared primary-key paths, each rooted at the stream name.
    primary_keys: Vec<Vec<String>>,
    tables: IndexMap<String, Table>,
}

impl SchemaFlattener {
    pub fn new(
        schema: impl Into<String>,
        root: impl Into<String>,
        dialect: Dialect,
        primary_keys: Vec<Vec<String>>,
    ) -> Self {
        Self {
            schema: schema.into(),
            root: root.into(),
            dialect,
            primary_keys,
            tables: IndexMap::new(),
        }
    }

    /// Produces the dotted-path → table map, root first, every child after
    /// its parent.
    pub fn convert(mut self, json_schema: &Value) -> IndexMap<String, Table> {
        if let Some(properties) = json_schema.get("properties").and_then(Value::as_object) {
            let root = self.root.clone();
            self.extract_tables(properties, &root, None, false);
        }
        self.tables
    }

    fn extract_tables(
        &mut self,
        properties: &Map<String, Value>,
        path: &str,
        parent: Option<ParentLink>,
        reference_key_as_primary_key: bool,
    ) {
        let table_name = path.replace(PARENT_CHILD_SPLITTER, "_");
        let segments: Vec<&str> = path.split(PARENT_CHILD_SPLITTER).collect();
        let declared_keys = self
            .primary_keys
            .iter()
            .filter(|key_path| !key_path.is_empty() && key_path[..key_path.len() - 1] == segments[..])
            .filter_map(|key_path| key_path.last().cloned())
            .collect();

        let mut table = Table::new(
            self.schema.clone(),
            table_name,
            self.dialect,
            declared_keys,
            parent,
        );
        if reference_key_as_primary_key {
            if let Some(key) = table.reference_key() {
                table.primary_keys.push(key.name);
            }
        }

        let link = ParentLink {
            name: table.name.clone(),
            full_name: table.full_name(),
        };
        let mut children: Vec<(String, Map<String, Value>, bool)> = Vec::new();

        for (property, value) in properties {
            let declared = value.get("type");
            let type_names: Vec<&str> = match declared {
                Some(Value::String(name)) => vec![name.as_str()],
                Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).collect(),
                _ => Vec::new(),
            };

            if !type_names.iter().any(|name| *name == "object" || *name == "array") {
                let format = value.get("format").and_then(Value::as_str);
                let max_length = value.get("maxLength").and_then(Value::as_u64);
                let data_type = self.dialect.convert(declared, format, max_length);
                table.add_field(Field::new(property.clone(), data_type));
            } else if type_names.contains(&"object") {
                match value.get("properties").and_then(Value::as_object) {
                    Some(child_properties) => {
                        children.push((property.clone(), child_properties.clone(), true));
                    }
                    // A typed object with no declared shape is stored whole.
                    None => table.add_field(Field::new(property.clone(), self.dialect.fallback_type())),
                }
            } else {
                match value
                    .get("items")
                    .and_then(|items| items.get("properties"))
                    .and_then(Value::as_object)
                {
                    Some(item_properties) => {
                        // An array of objects fans out to many child rows, so
                        // the reference key cannot be part of the primary key.
                        children.push((property.clone(), item_properties.clone(), false));
                    }
                    None => table.add_field(Field::new(property.clone(), self.dialect.fallback_type())),
                }
            }
        }

        self.tables.insert(path.to_string(), table);

        for (property, child_properties, key_in_primary) in children {
            let child_path = format!("{path}{PARENT_CHILD_SPLITTER}{property}");
            self.extract_tables(&child_properties, &child_path, Some(link.clone()), key_in_primary);
        }
    }
}
