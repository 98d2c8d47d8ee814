//! Streaming query result support.
//!
//! This module provides streaming result sets for memory-efficient
//! processing of large query results.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;

use crate::error::Error;
use crate::row::{Column, Row};

/// A single result set: its column metadata and rows, fully materialized
/// from one `ColMetaData`/`ROW`/`DONE` token sequence.
///
/// Used internally to hold the result sets of a multi-statement batch
/// before they are handed out one at a time via [`MultiResultStream`].
#[derive(Debug, Clone)]
pub struct ResultSet {
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl ResultSet {
    pub(crate) fn new(columns: Vec<Column>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Column metadata for this result set.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Rows in this result set.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Consume the result set, returning its rows.
    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// A streaming result set from a query.
///
/// The rows behind a single statement are parsed eagerly from the wire
/// response into memory (see `Client::read_query_response`); this type
/// exposes them through the same `Stream`/`collect_all` surface a true
/// incremental reader would, so callers are not coupled to that detail.
///
/// # Example
///
/// ```rust,ignore
/// use futures::StreamExt;
///
/// let mut stream = client.query_stream("SELECT * FROM large_table").await?;
///
/// while let Some(row) = stream.next().await {
///     let row = row?;
///     process_row(&row);
/// }
/// ```
pub struct QueryStream<'a> {
    /// Column metadata for the result set.
    columns: Vec<Column>,
    /// Remaining rows to yield.
    rows: VecDeque<Row>,
    /// Lifetime tied to the connection.
    _marker: std::marker::PhantomData<&'a ()>,
}

impl<'a> QueryStream<'a> {
    /// Create a new query stream from an already-parsed result set.
    pub(crate) fn new(columns: Vec<Column>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows: rows.into(),
            _marker: std::marker::PhantomData,
        }
    }

    /// Get the column metadata for this result set.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Check if the stream has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.rows.is_empty()
    }

    /// Collect all remaining rows into a vector.
    ///
    /// This consumes the stream and loads all rows into memory.
    /// For large result sets, consider iterating with the stream instead.
    pub async fn collect_all(mut self) -> Result<Vec<Row>, Error> {
        Ok(self.rows.drain(..).collect())
    }
}

impl Stream for QueryStream<'_> {
    type Item = Result<Row, Error>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Poll::Ready(this.rows.pop_front().map(Ok))
    }
}

/// Result of a non-query execution.
///
/// Contains the number of affected rows and any output parameters.
#[derive(Debug, Clone)]
pub struct ExecuteResult {
    /// Number of rows affected by the statement.
    pub rows_affected: u64,
    /// Output parameters from stored procedures.
    pub output_params: Vec<OutputParam>,
}

/// An output parameter from a stored procedure call.
#[derive(Debug, Clone)]
pub struct OutputParam {
    /// Parameter name.
    pub name: String,
    /// Parameter value.
    pub value: mssql_types::SqlValue,
}

impl ExecuteResult {
    /// Create a new execute result.
    pub fn new(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            output_params: Vec::new(),
        }
    }

    /// Create a result with output parameters.
    pub fn with_outputs(rows_affected: u64, output_params: Vec<OutputParam>) -> Self {
        Self {
            rows_affected,
            output_params,
        }
    }

    /// Get an output parameter by name.
    #[must_use]
    pub fn get_output(&self, name: &str) -> Option<&OutputParam> {
        self.output_params
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

/// Multiple result sets from a batch or stored procedure.
///
/// Some queries return multiple result sets (e.g., stored procedures
/// with multiple SELECT statements).
pub struct MultiResultStream<'a> {
    /// All result sets produced by the batch.
    result_sets: Vec<ResultSet>,
    /// Current result set index.
    current_result: usize,
    /// Rows remaining in the current result set.
    current_rows: VecDeque<Row>,
    /// Lifetime tied to the connection.
    _marker: std::marker::PhantomData<&'a ()>,
}

impl<'a> MultiResultStream<'a> {
    /// Create a new multi-result stream from already-parsed result sets.
    pub(crate) fn new(result_sets: Vec<ResultSet>) -> Self {
        let current_rows = result_sets
            .first()
            .map(|rs| rs.rows.clone())
            .unwrap_or_default()
            .into();
        Self {
            result_sets,
            current_result: 0,
            current_rows,
            _marker: std::marker::PhantomData,
        }
    }

    /// Get the current result set index (0-based).
    #[must_use]
    pub fn current_result_index(&self) -> usize {
        self.current_result
    }

    /// Column metadata for the current result set.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        self.result_sets
            .get(self.current_result)
            .map(|rs| rs.columns.as_slice())
            .unwrap_or(&[])
    }

    /// Number of result sets in this batch.
    #[must_use]
    pub fn result_set_count(&self) -> usize {
        self.result_sets.len()
    }

    /// Move to the next result set.
    ///
    /// Returns `true` if there is another result set, `false` if no more.
    pub async fn next_result(&mut self) -> Result<bool, Error> {
        self.current_result += 1;
        match self.result_sets.get(self.current_result) {
            Some(rs) => {
                self.current_rows = rs.rows.clone().into();
                Ok(true)
            }
            None => {
                self.current_rows.clear();
                Ok(false)
            }
        }
    }

    /// Get the next row from the current result set.
    pub async fn next_row(&mut self) -> Result<Option<Row>, Error> {
        Ok(self.current_rows.pop_front())
    }
}
