//! In-memory event table

use pfc_core::{Error, Result};

/// Named `f64` columns of equal length, one row per PFCluster.
///
/// Column order is insertion order; integer branches are stored promoted to
/// `f64`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTable {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    len: usize,
}

impl EventTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(name, values)` pairs; all columns must have one length.
    pub fn from_columns<S: Into<String>>(columns: impl IntoIterator<Item = (S, Vec<f64>)>) -> Result<Self> {
        let mut table = Self::new();
        for (name, values) in columns {
            table.insert_column(name, values)?;
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Column names in insertion order.
    pub fn columns(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
            .ok_or_else(|| Error::MissingColumn(name.to_string()))
    }

    /// Add or replace a column.
    pub fn insert_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if !self.names.is_empty() && values.len() != self.len {
            return Err(Error::Validation(format!(
                "column '{name}' has {} rows, table has {}",
                values.len(),
                self.len
            )));
        }
        self.len = values.len();
        match self.names.iter().position(|n| *n == name) {
            Some(i) => self.columns[i] = values,
            None => {
                self.names.push(name);
                self.columns.push(values);
            }
        }
        Ok(())
    }

    /// Builder form of [`EventTable::insert_column`].
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self> {
        self.insert_column(name, values)?;
        Ok(self)
    }

    /// Add every column of a friend table computed from the same ntuple.
    ///
    /// Friend columns replace same-named columns of `self`.
    pub fn join_friend(&mut self, friend: EventTable) -> Result<()> {
        if !self.names.is_empty() && !friend.names.is_empty() && friend.len != self.len {
            return Err(Error::Validation(format!(
                "friend table has {} rows, ntuple has {}",
                friend.len, self.len
            )));
        }
        for (name, values) in friend.names.into_iter().zip(friend.columns) {
            self.insert_column(name, values)?;
        }
        Ok(())
    }

    /// Rows where `mask` is true.
    pub fn select_rows(&self, mask: &[bool]) -> Result<EventTable> {
        if mask.len() != self.len {
            return Err(Error::Validation(format!(
                "mask has {} entries, table has {}",
                mask.len(),
                self.len
            )));
        }
        let keep: Vec<usize> = (0..self.len).filter(|&i| mask[i]).collect();
        Ok(self.take(&keep))
    }

    fn take(&self, rows: &[usize]) -> EventTable {
        EventTable {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| rows.iter().map(|&i| c[i]).collect()).collect(),
            len: rows.len(),
        }
    }

    /// Odd entries, the events held out from training.
    pub fn test_rows(&self) -> EventTable {
        let rows: Vec<usize> = (1..self.len).step_by(2).collect();
        self.take(&rows)
    }

    /// Even entries, the events used for training.
    pub fn train_rows(&self) -> EventTable {
        let rows: Vec<usize> = (0..self.len).step_by(2).collect();
        self.take(&rows)
    }

    /// Iterate `(name, values)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.names.iter().map(String::as_str).zip(self.columns.iter().map(Vec::as_slice))
    }
}
