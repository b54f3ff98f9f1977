use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use log::debug;
use quarry_common::spec::{Row, ScalarValue, SchemaRef};

use crate::connection::{ConnectionInner, CursorToken};
use crate::error::{QueryError, QueryResult};
use crate::result_set::ResultSet;
use crate::statistics::{ExecutionStatistics, QueryStatistics};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No statement has been executed yet.
    Idle,
    /// Rows may remain to be fetched.
    Executing,
    /// Every row of the current execution has been fetched.
    Exhausted,
    /// The current execution failed. A new statement may be executed.
    Failed,
    /// The cursor or its connection was closed.
    Closed,
}

impl fmt::Display for CursorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CursorState::Idle => "idle",
            CursorState::Executing => "executing",
            CursorState::Exhausted => "exhausted",
            CursorState::Failed => "failed",
            CursorState::Closed => "closed",
        };
        write!(f, "{name}")
    }
}

/// Executes statements and fetches their rows lazily.
///
/// Each execution replaces the result of the previous one. Rows are pulled
/// from the backend only as they are fetched, except when the relation is
/// served from the cache.
pub struct Cursor {
    // dropped before the connection that owns the runtime
    result: Option<ResultSet>,
    token: Arc<CursorToken>,
    state: CursorState,
    schema: Option<SchemaRef>,
    statistics: ExecutionStatistics,
    rowcount: usize,
    connection: Arc<ConnectionInner>,
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("state", &self.state())
            .field("schema", &self.schema)
            .field("rowcount", &self.rowcount)
            .finish()
    }
}

impl Cursor {
    pub(crate) fn new(connection: Arc<ConnectionInner>, token: Arc<CursorToken>) -> Self {
        Self {
            connection,
            token,
            state: CursorState::Idle,
            result: None,
            schema: None,
            statistics: ExecutionStatistics::default(),
            rowcount: 0,
        }
    }

    pub fn execute(&mut self, sql: &str) -> QueryResult<()> {
        self.execute_with(sql, vec![])
    }

    /// Executes a statement, binding each `?` placeholder to the next parameter.
    pub fn execute_with(&mut self, sql: &str, parameters: Vec<ScalarValue>) -> QueryResult<()> {
        self.check_open()?;
        self.result = None;
        self.schema = None;
        self.statistics = ExecutionStatistics::default();
        self.rowcount = 0;

        let start = Instant::now();
        debug!("Executing statement: {sql}");
        match self.connection.execute(sql, &parameters) {
            Ok(execution) => {
                self.schema = Some(execution.result.schema().clone());
                self.result = Some(execution.result);
                self.statistics = execution.statistics;
                self.statistics.add_elapsed(start.elapsed());
                self.state = CursorState::Executing;
                Ok(())
            }
            Err(e) => {
                debug!("Statement failed: {e}");
                self.state = CursorState::Failed;
                Err(e)
            }
        }
    }

    /// Fetches the next row, or `None` once every row has been fetched.
    pub fn fetchone(&mut self) -> QueryResult<Option<Row>> {
        self.check_open()?;
        match self.state {
            CursorState::Executing => {}
            CursorState::Exhausted => return Ok(None),
            CursorState::Idle => {
                return Err(QueryError::cursor_invalid("no statement has been executed"))
            }
            CursorState::Failed => {
                return Err(QueryError::cursor_invalid("the last execution failed"))
            }
            CursorState::Closed => return Err(QueryError::cursor_invalid("cursor is closed")),
        }
        let Some(result) = self.result.as_mut() else {
            return Err(QueryError::internal("an executing cursor has no result"));
        };
        let start = Instant::now();
        let output = result.next_row();
        self.statistics.add_elapsed(start.elapsed());
        match output {
            Ok(Some(row)) => {
                self.rowcount += 1;
                Ok(Some(row))
            }
            Ok(None) => {
                debug!("Cursor exhausted after {} row(s)", self.rowcount);
                self.result = None;
                self.state = CursorState::Exhausted;
                Ok(None)
            }
            Err(e) => {
                self.result = None;
                self.state = CursorState::Failed;
                Err(e)
            }
        }
    }

    /// Fetches up to `size` rows. Fewer rows are returned only when the result is exhausted.
    pub fn fetchmany(&mut self, size: usize) -> QueryResult<Vec<Row>> {
        self.check_open()?;
        let mut rows = Vec::with_capacity(size.min(1024));
        while rows.len() < size {
            match self.fetchone()? {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        Ok(rows)
    }

    /// Fetches every remaining row.
    pub fn fetchall(&mut self) -> QueryResult<Vec<Row>> {
        let mut rows = vec![];
        while let Some(row) = self.fetchone()? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// The columns of the current result, known once a statement has been executed.
    pub fn schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }

    /// The number of rows fetched from the current result so far.
    pub fn rowcount(&self) -> usize {
        self.rowcount
    }

    pub fn statistics(&self) -> QueryStatistics {
        self.statistics.snapshot()
    }

    pub fn state(&self) -> CursorState {
        if self.token.is_valid() {
            self.state
        } else {
            CursorState::Closed
        }
    }

    /// Releases the current result. Closing a closed cursor does nothing.
    pub fn close(&mut self) {
        self.token.invalidate();
        self.release();
    }

    fn release(&mut self) {
        self.result = None;
        self.state = CursorState::Closed;
    }

    fn check_open(&mut self) -> QueryResult<()> {
        if self.token.is_valid() {
            return Ok(());
        }
        self.release();
        Err(QueryError::cursor_invalid(
            "the cursor or its connection has been closed",
        ))
    }
}
