//! Row blocks
//!
//! A block is an ordered list of named, typed columns of equal length. It is
//! the unit that flows between pipeline steps. A block with zero rows serves
//! as a stream header: it carries the exact schema every block of that
//! stream conforms to.

use super::types::{ColumnDef, DataType};
use super::value::Value;

/// A named, typed column of values
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            data_type,
            values,
        }
    }

    /// Column with no rows
    pub fn empty(name: impl Into<String>, data_type: DataType) -> Self {
        Self::new(name, data_type, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn def(&self) -> ColumnDef {
        ColumnDef::new(self.name.clone(), self.data_type.clone())
    }
}

/// Out-of-band block attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockInfo {
    /// The block holds the aggregation overflow row, not a regular group
    pub is_overflows: bool,
}

/// A chunk of rows with named, typed columns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    columns: Vec<Column>,
    pub info: BlockInfo,
}

impl Block {
    /// Creates a block from columns of equal length
    pub fn new(columns: Vec<Column>) -> Self {
        debug_assert!(
            columns.windows(2).all(|w| w[0].len() == w[1].len()),
            "columns of a block must have equal length"
        );
        Self {
            columns,
            info: BlockInfo::default(),
        }
    }

    /// Zero-row block with the given schema
    pub fn header(defs: &[ColumnDef]) -> Self {
        Self::new(
            defs.iter()
                .map(|d| Column::empty(d.name.clone(), d.data_type.clone()))
                .collect(),
        )
    }

    /// Builds a block from row-major values laid out according to `header`
    pub fn from_rows(header: &Block, rows: Vec<Vec<Value>>) -> Self {
        let mut columns: Vec<Column> = header
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), c.data_type.clone(), Vec::with_capacity(rows.len())))
            .collect();
        for row in rows {
            for (column, value) in columns.iter_mut().zip(row) {
                column.values.push(value);
            }
        }
        Self::new(columns)
    }

    pub fn rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Appends a column, replacing an existing one of the same name
    pub fn insert(&mut self, column: Column) {
        match self.position(&column.name) {
            Some(pos) => self.columns[pos] = column,
            None => self.columns.push(column),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Column> {
        self.position(name).map(|pos| self.columns.remove(pos))
    }

    pub fn names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.data_type.clone()).collect()
    }

    pub fn defs(&self) -> Vec<ColumnDef> {
        self.columns.iter().map(Column::def).collect()
    }

    /// Same schema with no rows
    pub fn clone_empty(&self) -> Self {
        Self::new(
            self.columns
                .iter()
                .map(|c| Column::empty(c.name.clone(), c.data_type.clone()))
                .collect(),
        )
    }

    /// Whether both blocks have the same column names and types in order
    pub fn same_structure(&self, other: &Block) -> bool {
        self.num_columns() == other.num_columns()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.name == b.name && a.data_type == b.data_type)
    }

    /// Values of one row
    pub fn row(&self, index: usize) -> Vec<Value> {
        self.columns.iter().map(|c| c.values[index].clone()).collect()
    }

    /// Values of the given column positions for one row
    pub fn key(&self, positions: &[usize], index: usize) -> Vec<Value> {
        positions
            .iter()
            .map(|&p| self.columns[p].values[index].clone())
            .collect()
    }

    /// Keeps the rows whose mask entry is true
    pub fn filter(&self, mask: &[bool]) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let values = c
                    .values
                    .iter()
                    .zip(mask)
                    .filter(|(_, keep)| **keep)
                    .map(|(v, _)| v.clone())
                    .collect();
                Column::new(c.name.clone(), c.data_type.clone(), values)
            })
            .collect();
        Self {
            columns,
            info: self.info.clone(),
        }
    }

    /// Rows `[offset, offset + length)`, clamped to the block
    pub fn slice(&self, offset: usize, length: usize) -> Self {
        let start = offset.min(self.rows());
        let end = (offset + length).min(self.rows());
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), c.data_type.clone(), c.values[start..end].to_vec()))
            .collect();
        Self {
            columns,
            info: self.info.clone(),
        }
    }

    /// Collects every row of every block into row-major form
    pub fn to_rows(&self) -> Vec<Vec<Value>> {
        (0..self.rows()).map(|i| self.row(i)).collect()
    }
}
