//! Sequential column reader over libSQL rows

use std::str::FromStr;

use libsql::{Row, Value};

use crate::error::{Error, Result};
use crate::models::{EntityId, Envelope};

/// Reads columns left to right so entity mappings stay in `COLUMNS` order.
pub struct RowReader<'a> {
    row: &'a Row,
    index: i32,
}

impl<'a> RowReader<'a> {
    pub const fn new(row: &'a Row) -> Self {
        Self { row, index: 0 }
    }

    fn next_value(&mut self) -> Result<Value> {
        let value = self.row.get_value(self.index)?;
        self.index += 1;
        Ok(value)
    }

    fn unexpected(&self, expected: &str, value: &Value) -> Error {
        Error::Database(format!(
            "column {} expected {expected}, found {value:?}",
            self.index - 1
        ))
    }

    pub fn text(&mut self) -> Result<String> {
        match self.next_value()? {
            Value::Text(text) => Ok(text),
            other => Err(self.unexpected("text", &other)),
        }
    }

    pub fn opt_text(&mut self) -> Result<Option<String>> {
        match self.next_value()? {
            Value::Null => Ok(None),
            Value::Text(text) => Ok(Some(text)),
            other => Err(self.unexpected("text or null", &other)),
        }
    }

    pub fn int(&mut self) -> Result<i64> {
        match self.next_value()? {
            Value::Integer(value) => Ok(value),
            other => Err(self.unexpected("integer", &other)),
        }
    }

    pub fn opt_int(&mut self) -> Result<Option<i64>> {
        match self.next_value()? {
            Value::Null => Ok(None),
            Value::Integer(value) => Ok(Some(value)),
            other => Err(self.unexpected("integer or null", &other)),
        }
    }

    pub fn flag(&mut self) -> Result<bool> {
        Ok(self.int()? != 0)
    }

    pub fn id(&mut self) -> Result<EntityId> {
        let raw = self.text()?;
        raw.parse()
            .map_err(|_| Error::Database(format!("invalid entity id '{raw}'")))
    }

    pub fn opt_id(&mut self) -> Result<Option<EntityId>> {
        self.opt_text()?
            .map(|raw| {
                raw.parse()
                    .map_err(|_| Error::Database(format!("invalid entity id '{raw}'")))
            })
            .transpose()
    }

    pub fn parsed<T>(&mut self) -> Result<T>
    where
        T: FromStr<Err = Error>,
    {
        self.text()?.parse()
    }

    /// Envelope columns, which every entity query selects first.
    pub fn envelope(&mut self) -> Result<Envelope> {
        Ok(Envelope {
            id: self.id()?,
            last_modified: self.int()?,
            is_synced: self.flag()?,
            sync_version: self.opt_text()?,
            is_deleted: self.flag()?,
        })
    }
}
