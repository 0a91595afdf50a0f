use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::Value;

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Bytes,
    /// Holds the identifier of a row of the named row type.
    Reference(String),
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// Layout of one relational table.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RowShape {
    pub row_type: String,
    pub identifier: String,
    pub columns: Vec<Column>,
    pub extends: Option<String>,
}

impl RowShape {
    /// Starts a shape whose identifier is a text column.
    pub fn new(row_type: impl Into<String>, identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            row_type: row_type.into(),
            columns: vec![Column {
                name: identifier.clone(),
                kind: ColumnKind::Text,
            }],
            identifier,
            extends: None,
        }
    }

    pub fn column(mut self, name: impl Into<String>, kind: ColumnKind) -> Self {
        let name = name.into();
        if let Some(existing) = self.columns.iter_mut().find(|column| column.name == name) {
            existing.kind = kind;
        } else {
            self.columns.push(Column { name, kind });
        }
        self
    }

    pub fn extending(mut self, row_type: impl Into<String>) -> Self {
        self.extends = Some(row_type.into());
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.find_column(name).is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub row_type: String,
    pub values: IndexMap<String, Value>,
}

impl Row {
    pub fn new(row_type: impl Into<String>) -> Self {
        Self {
            row_type: row_type.into(),
            values: IndexMap::new(),
        }
    }

    pub fn get(&self, column: &str) -> &Value {
        const NULL: &Value = &Value::Null;
        self.values.get(column).unwrap_or(NULL)
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn identifier(&self, shape: &RowShape) -> &Value {
        self.get(&shape.identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::{ColumnKind, Row, RowShape};
    use crate::Value;

    #[test]
    fn shape_starts_with_text_identifier() {
        let shape = RowShape::new("idm_role", "id")
            .column("name", ColumnKind::Text)
            .column("id", ColumnKind::Reference("idm_identity_type".to_string()));
        assert_eq!(shape.columns.len(), 2);
        assert_eq!(
            shape.find_column("id").map(|column| &column.kind),
            Some(&ColumnKind::Reference("idm_identity_type".to_string()))
        );
        assert!(!shape.has_column("missing"));
    }

    #[test]
    fn missing_columns_read_as_null() {
        let row = Row::new("idm_role").with("name", "admin");
        assert_eq!(row.get("name"), &Value::from("admin"));
        assert!(row.get("other").is_null());
    }
}
