//! PostgreSQL backend over `tokio-postgres`.
//!
//! Each [`PgConnection`] owns one client plus the driver task that pumps its
//! socket. Row values are coerced column-by-column into transport-safe
//! [`Scalar`]s; a type with no scalar rendering fails the invocation with
//! `UnsupportedColumnType` naming the column.

use async_trait::async_trait;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{NoTls, Row};

use crate::config::DbConfig;
use crate::db::{ConnectionFactory, DbConnection, ResultSet, Scalar, SqlParam};
use crate::error::ServerError;

/// Opens sessions against one configured PostgreSQL endpoint.
#[derive(Debug, Clone)]
pub struct PgConnectionFactory {
    config: DbConfig,
}

impl PgConnectionFactory {
    /// Creates a factory for the given backend settings.
    #[must_use]
    pub const fn new(config: DbConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    async fn connect(&self) -> Result<Box<dyn DbConnection>, ServerError> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&self.config.host)
            .port(self.config.port)
            .user(&self.config.user)
            .password(&self.config.password)
            .dbname(&self.config.dbname);

        let (client, connection) =
            pg.connect(NoTls)
                .await
                .map_err(|e| ServerError::BackendUnavailable {
                    message: format!("connect failed: {e}"),
                })?;

        // The driver task owns the socket; it ends when the client drops.
        let task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "postgres connection task ended with error");
            }
        });

        Ok(Box::new(PgConnection {
            client,
            _task: task,
        }))
    }
}

/// One leased PostgreSQL session.
pub struct PgConnection {
    client: tokio_postgres::Client,
    _task: tokio::task::JoinHandle<()>,
}

/// Borrows bound parameters as the driver's dynamic trait objects.
fn bind_params(params: &[SqlParam]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|p| match p {
            SqlParam::Text(s) => s as &(dyn ToSql + Sync),
            SqlParam::Int(i) => i as &(dyn ToSql + Sync),
            SqlParam::Float(f) => f as &(dyn ToSql + Sync),
        })
        .collect()
}

/// Splits driver errors into statement failures (connection stays usable)
/// and transport failures (connection is broken).
fn map_pg_error(e: &tokio_postgres::Error) -> ServerError {
    if e.as_db_error().is_some() {
        ServerError::QueryFailed {
            message: e.to_string(),
        }
    } else {
        ServerError::BackendUnavailable {
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl DbConnection for PgConnection {
    async fn query(&mut self, sql: &str, params: &[SqlParam]) -> Result<ResultSet, ServerError> {
        let bound = bind_params(params);
        let rows = self
            .client
            .query(sql, &bound)
            .await
            .map_err(|e| map_pg_error(&e))?;
        materialize(&rows)
    }

    async fn execute(&mut self, sql: &str, params: &[SqlParam]) -> Result<u64, ServerError> {
        let bound = bind_params(params);
        self.client
            .execute(sql, &bound)
            .await
            .map_err(|e| map_pg_error(&e))
    }

    fn is_broken(&self) -> bool {
        self.client.is_closed()
    }
}

/// Converts driver rows into a transport-safe result set.
fn materialize(rows: &[Row]) -> Result<ResultSet, ServerError> {
    let columns: Vec<String> = rows.first().map_or_else(Vec::new, |row| {
        row.columns().iter().map(|c| c.name().to_string()).collect()
    });

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(convert_row(row)?);
    }
    Ok(ResultSet::new(columns, out))
}

/// Coerces one row to scalars, per column type.
fn convert_row(row: &Row) -> Result<Vec<Scalar>, ServerError> {
    let mut values = Vec::with_capacity(row.columns().len());
    for (idx, col) in row.columns().iter().enumerate() {
        let ty = col.type_();
        let value = match *ty {
            Type::BOOL => row
                .try_get::<_, Option<bool>>(idx)
                .map(|v| v.map_or(Scalar::Null, Scalar::Bool)),
            Type::INT2 => row
                .try_get::<_, Option<i16>>(idx)
                .map(|v| v.map_or(Scalar::Null, |n| Scalar::Int(i64::from(n)))),
            Type::INT4 => row
                .try_get::<_, Option<i32>>(idx)
                .map(|v| v.map_or(Scalar::Null, |n| Scalar::Int(i64::from(n)))),
            Type::INT8 => row
                .try_get::<_, Option<i64>>(idx)
                .map(|v| v.map_or(Scalar::Null, Scalar::Int)),
            Type::FLOAT4 => row
                .try_get::<_, Option<f32>>(idx)
                .map(|v| v.map_or(Scalar::Null, |n| Scalar::Float(f64::from(n)))),
            Type::FLOAT8 => row
                .try_get::<_, Option<f64>>(idx)
                .map(|v| v.map_or(Scalar::Null, Scalar::Float)),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => row
                .try_get::<_, Option<String>>(idx)
                .map(|v| v.map_or(Scalar::Null, Scalar::Text)),
            // Everything else must render as text (uuid, timestamp, numeric
            // casts in the projection) or it is not transport-safe.
            _ => row
                .try_get::<_, Option<String>>(idx)
                .map(|v| v.map_or(Scalar::Null, Scalar::Text)),
        }
        .map_err(|_| ServerError::UnsupportedColumnType {
            column: col.name().to_string(),
            ty: ty.to_string(),
        })?;
        values.push(value);
    }
    Ok(values)
}
