//! Column-oriented table used by every stage of the pipeline.
//!
//! Cells are `serde_json::Value`s restricted in practice to `Null`, `String`
//! and `Number`. Rows are positionally aligned across columns.

use serde_json::Value;

/// A named column of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// A column of `len` nulls.
    pub fn nulls(name: impl Into<String>, len: usize) -> Self {
        Self::new(name, vec![Value::Null; len])
    }
}

/// An ordered set of equally long columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    height: usize,
}

impl Table {
    /// An empty table: no columns, no rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with no columns yet but a fixed number of rows.
    pub fn with_height(height: usize) -> Self {
        Self {
            columns: Vec::new(),
            height,
        }
    }

    /// Build a table from row-major data. Short rows are padded with nulls,
    /// cells beyond the header width are ignored.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let height = rows.len();
        let mut columns: Vec<Column> = headers
            .into_iter()
            .map(|name| Column::new(name, Vec::with_capacity(height)))
            .collect();

        for row in rows {
            let mut cells = row.into_iter();
            for column in columns.iter_mut() {
                column.values.push(cells.next().unwrap_or(Value::Null));
            }
        }

        Self { columns, height }
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// True when the table has no rows or no columns.
    pub fn is_empty(&self) -> bool {
        self.height == 0 || self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// First column with the given name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Cells of the first column with the given name.
    pub fn values(&self, name: &str) -> Option<&[Value]> {
        self.column(name).map(|c| c.values.as_slice())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Append a column. Values are padded with nulls or truncated to the
    /// table height; the first column of a table with no rows sets the height.
    pub fn push_column(&mut self, name: impl Into<String>, mut values: Vec<Value>) {
        if self.columns.is_empty() && self.height == 0 {
            self.height = values.len();
        }
        values.resize(self.height, Value::Null);
        self.columns.push(Column::new(name, values));
    }

    /// Replace the first column with this name, or append it.
    pub fn set_column(&mut self, name: &str, mut values: Vec<Value>) {
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(column) => {
                values.resize(self.height, Value::Null);
                column.values = values;
            }
            None => self.push_column(name, values),
        }
    }

    /// Mutable access to the cells of the first column with this name.
    pub fn values_mut(&mut self, name: &str) -> Option<&mut Vec<Value>> {
        self.columns
            .iter_mut()
            .find(|c| c.name == name)
            .map(|c| &mut c.values)
    }

    /// Keep only the rows whose flag is `true`.
    pub fn retain_rows(&mut self, keep: &[bool]) {
        for column in self.columns.iter_mut() {
            let mut flags = keep.iter();
            column
                .values
                .retain(|_| flags.next().copied().unwrap_or(false));
        }
        self.height = keep
            .iter()
            .take(self.height)
            .filter(|flag| **flag)
            .count();
    }

    /// Reindex to exactly `names`, in order. Columns absent from the table
    /// are filled with nulls.
    pub fn select(&self, names: &[String]) -> Table {
        let columns = names
            .iter()
            .map(|name| match self.column(name) {
                Some(column) => Column::new(name.clone(), column.values.clone()),
                None => Column::nulls(name.clone(), self.height),
            })
            .collect();

        Table {
            columns,
            height: self.height,
        }
    }

    /// The first `n` rows.
    pub fn head(&self, n: usize) -> Table {
        let height = n.min(self.height);
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), c.values[..height].to_vec()))
            .collect();
        Table { columns, height }
    }

    /// Cells of row `index`, in column order.
    pub fn row(&self, index: usize) -> Option<Vec<&Value>> {
        if index >= self.height {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.values[index]).collect())
    }

    /// Iterate rows in order.
    pub fn rows(&self) -> impl Iterator<Item = Vec<&Value>> + '_ {
        (0..self.height).map(move |i| self.columns.iter().map(|c| &c.values[i]).collect())
    }
}
