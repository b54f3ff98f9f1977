use std::collections::VecDeque;
use std::sync::Arc;

use futures::{stream, StreamExt};
use log::debug;
use quarry_common::runtime::RuntimeHandle;
use quarry_common::spec::{Field, Row, RowBatch, ScalarValue, Schema, SchemaRef};
use quarry_connector::RowStream;

use crate::error::{QueryError, QueryResult};
use crate::expression::Expression;
use crate::statement::{ProjectionItem, SelectPlan};

/// A connector stream that is pulled on the connection runtime.
struct BatchStream {
    stream: RowStream,
    runtime: RuntimeHandle,
}

impl BatchStream {
    fn next_batch(&mut self) -> QueryResult<Option<RowBatch>> {
        match self.runtime.block_on(self.stream.next())? {
            None => Ok(None),
            Some(batch) => Ok(Some(batch?)),
        }
    }
}

impl Drop for BatchStream {
    fn drop(&mut self) {
        // connector clients may hold I/O resources registered with the runtime
        let _guard = self.runtime.inner().enter();
        self.stream = Box::pin(stream::empty());
    }
}

/// The rows of a relation, either fully read or still streaming.
pub(crate) struct RowSource {
    schema: SchemaRef,
    buffer: VecDeque<Row>,
    stream: Option<BatchStream>,
}

impl RowSource {
    pub fn materialized(batch: &RowBatch) -> Self {
        Self {
            schema: batch.schema().clone(),
            buffer: batch.rows().iter().cloned().collect(),
            stream: None,
        }
    }

    /// Wraps a connector stream, reading the first batch to learn the schema.
    pub fn try_streaming(stream: RowStream, runtime: RuntimeHandle) -> QueryResult<Self> {
        let mut stream = BatchStream { stream, runtime };
        let (schema, buffer) = match stream.next_batch()? {
            Some(batch) => (batch.schema().clone(), batch.into_rows().into()),
            None => (Arc::new(Schema::empty()), VecDeque::new()),
        };
        Ok(Self {
            schema,
            buffer,
            stream: Some(stream),
        })
    }

    fn next_row(&mut self) -> QueryResult<Option<Row>> {
        loop {
            if let Some(row) = self.buffer.pop_front() {
                return Ok(Some(row));
            }
            let Some(stream) = self.stream.as_mut() else {
                return Ok(None);
            };
            match stream.next_batch() {
                Ok(Some(batch)) => self.buffer.extend(batch.into_rows()),
                Ok(None) => {
                    self.stream = None;
                }
                Err(e) => {
                    self.stream = None;
                    return Err(e);
                }
            }
        }
    }
}

enum Projection {
    /// Every source column in order.
    Identity,
    Expressions(Vec<Expression>),
}

/// Applies the filter, offset, limit, and projection of a plan to a row source, one row at a time.
pub(crate) struct ResultSet {
    source: RowSource,
    schema: SchemaRef,
    filter: Option<Expression>,
    projection: Projection,
    offset: usize,
    limit: Option<usize>,
}

impl ResultSet {
    pub fn try_new(plan: SelectPlan, source: RowSource) -> QueryResult<Self> {
        let SelectPlan {
            projection,
            filter,
            limit,
            offset,
            ..
        } = plan;
        let input = source.schema.clone();
        // records may not have revealed any column yet
        if !input.is_empty() {
            let projected = projection.iter().flat_map(|item| match item {
                ProjectionItem::Wildcard => vec![],
                ProjectionItem::Expression { expr, .. } => expr.columns(),
            });
            let filtered = filter.iter().flat_map(|x| x.columns());
            if let Some(name) = projected
                .chain(filtered)
                .find(|name| input.index_of(name).is_none())
            {
                return Err(QueryError::sql(format!(
                    "column not found: {name}, available columns: {}",
                    input.field_names().join(", ")
                )));
            }
        }

        let identity = matches!(projection.as_slice(), [ProjectionItem::Wildcard]);
        let (schema, projection) = if identity {
            (input, Projection::Identity)
        } else {
            let mut fields = vec![];
            let mut expressions = vec![];
            for item in projection {
                match item {
                    ProjectionItem::Wildcard => {
                        for field in input.fields() {
                            fields.push(field.clone());
                            expressions.push(Expression::Column(field.name.clone()));
                        }
                    }
                    ProjectionItem::Expression { expr, name } => {
                        fields.push(Field::new(name, expr.data_type(&input)));
                        expressions.push(expr);
                    }
                }
            }
            (
                Arc::new(Schema::new(fields)),
                Projection::Expressions(expressions),
            )
        };
        debug!("Result schema: {schema}");
        Ok(Self {
            source,
            schema,
            filter,
            projection,
            offset,
            limit,
        })
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Produces the next result row, or `None` once the result is exhausted.
    pub fn next_row(&mut self) -> QueryResult<Option<Row>> {
        loop {
            if self.limit == Some(0) {
                // nothing more will be returned, so stop reading early
                self.source.stream = None;
                self.source.buffer.clear();
                return Ok(None);
            }
            let Some(row) = self.source.next_row()? else {
                return Ok(None);
            };
            if !self.accepts(&row)? {
                continue;
            }
            if self.offset > 0 {
                self.offset -= 1;
                continue;
            }
            if let Some(limit) = self.limit.as_mut() {
                *limit -= 1;
            }
            return self.project(row).map(Some);
        }
    }

    fn accepts(&self, row: &Row) -> QueryResult<bool> {
        let Some(filter) = &self.filter else {
            return Ok(true);
        };
        match filter.evaluate(row)? {
            ScalarValue::Boolean(v) => Ok(v),
            ScalarValue::Null => Ok(false),
            other => Err(QueryError::sql(format!(
                "WHERE clause must be a boolean expression, not {}",
                other.data_type()
            ))),
        }
    }

    fn project(&self, row: Row) -> QueryResult<Row> {
        match &self.projection {
            Projection::Identity => Ok(row),
            Projection::Expressions(expressions) => {
                let values = expressions
                    .iter()
                    .map(|x| x.evaluate(&row))
                    .collect::<QueryResult<Vec<_>>>()?;
                Ok(Row::try_new(self.schema.clone(), values)?)
            }
        }
    }
}
