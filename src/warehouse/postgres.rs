// src/warehouse/postgres.rs

//! [`WarehouseClient`] over the Postgres wire protocol.
//!
//! Uses the simple query protocol so every cell arrives as text and is typed
//! with [`Value::from_text`]. A single connection is shared by all tasks;
//! tokio-postgres pipelines concurrent queries on it.

use tokio_postgres::{Client, NoTls, SimpleQueryMessage};
use tracing::{debug, error, info};

use crate::errors::WarehouseError;
use crate::warehouse::{
    BulkLoadRequest, LoadMode, RowSet, Value, WarehouseClient, WarehouseFuture,
};

pub struct PostgresWarehouse {
    client: Client,
}

impl PostgresWarehouse {
    /// Connect using a libpq-style connection string and drive the
    /// connection on a background Tokio task.
    pub async fn connect(dsn: &str) -> Result<Self, WarehouseError> {
        let (client, connection) = tokio_postgres::connect(dsn, NoTls)
            .await
            .map_err(|e| WarehouseError::Connection(describe(&e)))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "warehouse connection terminated");
            }
        });

        info!("connected to warehouse");
        Ok(Self { client })
    }
}

impl WarehouseClient for PostgresWarehouse {
    fn execute<'a>(&'a self, sql: &'a str) -> WarehouseFuture<'a, RowSet> {
        Box::pin(async move {
            debug!(sql = %sql, "executing statement");
            let messages = self
                .client
                .simple_query(sql)
                .await
                .map_err(statement_error)?;
            Ok(collect_rows(messages))
        })
    }

    fn bulk_load<'a>(&'a self, request: &'a BulkLoadRequest) -> WarehouseFuture<'a, ()> {
        Box::pin(async move {
            let sql = bulk_load_statement(request);
            debug!(
                source = %request.source,
                target = %request.target,
                mode = ?request.mode,
                "issuing bulk load"
            );
            self.client
                .batch_execute(&sql)
                .await
                .map_err(|e| load_error(request, &e))
        })
    }
}

fn collect_rows(messages: Vec<SimpleQueryMessage>) -> RowSet {
    let mut rows: Option<RowSet> = None;

    for message in messages {
        if let SimpleQueryMessage::Row(row) = message {
            let set = rows.get_or_insert_with(|| {
                RowSet::new(row.columns().iter().map(|c| c.name().to_string()))
            });
            let values = (0..row.len()).map(|i| Value::from_text(row.get(i))).collect();
            set.push_row(values);
        }
    }

    rows.unwrap_or_default()
}

/// Build the COPY statement for a load.
///
/// Replace mode prepends a DELETE; both statements travel in one simple
/// query, which the server runs as a single implicit transaction, so a
/// rejected COPY leaves the previous contents in place.
pub(crate) fn bulk_load_statement(request: &BulkLoadRequest) -> String {
    let mut copy = format!(
        "COPY {} FROM '{}'",
        request.target,
        escape_literal(&request.source)
    );
    if let Some(role) = &request.iam_role {
        copy.push_str(&format!(" IAM_ROLE '{}'", escape_literal(role)));
    }
    if let Some(format) = &request.format {
        copy.push_str(&format!(" FORMAT AS {format}"));
    }
    copy.push(';');

    match request.mode {
        LoadMode::Replace => format!("DELETE FROM {}; {copy}", request.target),
        LoadMode::Append => copy,
    }
}

fn escape_literal(raw: &str) -> String {
    raw.replace('\'', "''")
}

fn describe(err: &tokio_postgres::Error) -> String {
    match err.as_db_error() {
        Some(db) => format!("{} ({})", db.message(), db.code().code()),
        None => err.to_string(),
    }
}

fn statement_error(err: tokio_postgres::Error) -> WarehouseError {
    if err.is_closed() || err.as_db_error().is_none() {
        WarehouseError::Connection(describe(&err))
    } else {
        WarehouseError::Statement(describe(&err))
    }
}

fn load_error(request: &BulkLoadRequest, err: &tokio_postgres::Error) -> WarehouseError {
    let reason = describe(err);
    if err.is_closed() || err.as_db_error().is_none() {
        return WarehouseError::Connection(reason);
    }
    if reason.contains(&request.source) || reason.contains("S3ServiceException") {
        WarehouseError::SourceUnreachable(reason)
    } else {
        WarehouseError::LoadRejected {
            target: request.target.clone(),
            reason,
        }
    }
}
