use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::{postgres::{PgArguments, PgPoolOptions, PgRow}, PgPool, Row};
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::DatabaseConfig;

use super::{
    validate_field_name, Collection, Condition, DocFilter, Document, DocumentStore, FindOptions, SortDirection,
    StoreError, ID_FIELD,
};

/// Postgres-backed document store: one table per collection holding JSONB documents.
pub struct PgDocumentStore {
    pool: PgPool,
}

/// A generated statement and its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub query: String,
    pub params: Vec<SqlParam>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Uuid(Uuid),
    Text(String),
    Float(f64),
    Int(i64),
    Json(Value),
}

impl PgDocumentStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| StoreError::Unavailable("DATABASE_URL is not configured".to_string()))?;
        url::Url::parse(url).map_err(|_| StoreError::Unavailable("Invalid DATABASE_URL".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        info!("Created database pool (max_connections={})", config.max_connections);
        Ok(Self { pool })
    }

    /// Create collection tables and unique indexes. Safe to run on every start.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in migration_statements() {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        info!("Document tables ready");
        Ok(())
    }

    async fn fetch_documents(&self, collection: Collection, statement: SqlStatement) -> Result<Vec<Document>, StoreError> {
        let rows = bind_all(sqlx::query(&statement.query), &statement.params)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify(collection, e))?;
        rows.iter().map(row_to_document).collect()
    }
}

pub fn migration_statements() -> Vec<String> {
    let mut statements = Vec::new();
    for collection in Collection::ALL {
        let table = collection.name();
        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (\
             id UUID PRIMARY KEY, \
             doc JSONB NOT NULL DEFAULT '{{}}'::jsonb, \
             created_at TIMESTAMPTZ NOT NULL DEFAULT now())"
        ));
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS \"{table}_doc_idx\" ON \"{table}\" USING GIN (doc jsonb_path_ops)"
        ));
        for fields in collection.unique_keys() {
            let columns = fields
                .iter()
                .map(|f| format!("(doc->>'{}')", f))
                .collect::<Vec<_>>()
                .join(", ");
            statements.push(format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS \"{table}_{}_key\" ON \"{table}\" ({columns})",
                fields.join("_")
            ));
        }
    }
    statements
}

fn placeholder(params: &mut Vec<SqlParam>, param: SqlParam) -> String {
    params.push(param);
    format!("${}", params.len())
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

/// Build a WHERE clause for the filter, appending its parameters.
pub fn where_clause(filter: &DocFilter, params: &mut Vec<SqlParam>) -> Result<String, StoreError> {
    let mut parts = Vec::new();

    if let Some(id) = filter.id {
        parts.push(format!("id = {}", placeholder(params, SqlParam::Uuid(id))));
    }

    for condition in &filter.conditions {
        validate_field_name(condition.field())?;
        let sql = match condition {
            Condition::Eq(field, value) => {
                let p = placeholder(params, SqlParam::Json(json!({ field.as_str(): value })));
                format!("doc @> {}::jsonb", p)
            }
            Condition::Contains(field, text) => {
                let p = placeholder(params, SqlParam::Text(escape_like(text)));
                format!("doc->>'{}' ILIKE {}", field, p)
            }
            Condition::Range { field, min, max } => {
                let numeric = format!(
                    "(CASE WHEN jsonb_typeof(doc->'{field}') = 'number' THEN (doc->>'{field}')::float8 END)"
                );
                let mut bounds = Vec::new();
                if let Some(min) = min {
                    bounds.push(format!("{} >= {}", numeric, placeholder(params, SqlParam::Float(*min))));
                }
                if let Some(max) = max {
                    bounds.push(format!("{} <= {}", numeric, placeholder(params, SqlParam::Float(*max))));
                }
                if bounds.is_empty() {
                    format!("{} IS NOT NULL", numeric)
                } else {
                    bounds.join(" AND ")
                }
            }
        };
        parts.push(sql);
    }

    Ok(if parts.is_empty() { "TRUE".to_string() } else { parts.join(" AND ") })
}

fn order_clause(options: &FindOptions) -> Result<String, StoreError> {
    let mut parts = Vec::new();
    for key in &options.sort {
        let expr = if key.field == ID_FIELD {
            "id::text".to_string()
        } else {
            validate_field_name(&key.field)?;
            format!("doc->'{}'", key.field)
        };
        // Missing fields sort first ascending, last descending
        parts.push(match key.direction {
            SortDirection::Asc => format!("{} ASC NULLS FIRST", expr),
            SortDirection::Desc => format!("{} DESC NULLS LAST", expr),
        });
    }
    parts.push("created_at ASC".to_string());
    Ok(format!("ORDER BY {}", parts.join(", ")))
}

/// Subquery selecting the id of the first document matching the filter.
fn first_match(collection: Collection, filter: &DocFilter, params: &mut Vec<SqlParam>) -> Result<String, StoreError> {
    let where_sql = where_clause(filter, params)?;
    Ok(format!(
        "SELECT id FROM \"{}\" WHERE {} ORDER BY created_at ASC LIMIT 1",
        collection.name(),
        where_sql
    ))
}

pub fn select_statement(collection: Collection, filter: &DocFilter, options: &FindOptions) -> Result<SqlStatement, StoreError> {
    let mut params = Vec::new();
    let where_sql = where_clause(filter, &mut params)?;
    let mut query = format!(
        "SELECT id, doc FROM \"{}\" WHERE {} {}",
        collection.name(),
        where_sql,
        order_clause(options)?
    );
    if let Some(limit) = options.limit {
        query.push_str(&format!(" LIMIT {}", placeholder(&mut params, SqlParam::Int(i64::try_from(limit).unwrap_or(i64::MAX)))));
    }
    if let Some(skip) = options.skip {
        query.push_str(&format!(" OFFSET {}", placeholder(&mut params, SqlParam::Int(i64::try_from(skip).unwrap_or(i64::MAX)))));
    }
    Ok(SqlStatement { query, params })
}

pub fn count_statement(collection: Collection, filter: &DocFilter) -> Result<SqlStatement, StoreError> {
    let mut params = Vec::new();
    let where_sql = where_clause(filter, &mut params)?;
    Ok(SqlStatement {
        query: format!("SELECT COUNT(*) AS count FROM \"{}\" WHERE {}", collection.name(), where_sql),
        params,
    })
}

pub fn update_set_statement(collection: Collection, filter: &DocFilter, mut fields: Document) -> Result<SqlStatement, StoreError> {
    fields.remove(ID_FIELD);
    let mut params = Vec::new();
    let patch = placeholder(&mut params, SqlParam::Json(Value::Object(fields)));
    let target = first_match(collection, filter, &mut params)?;
    Ok(SqlStatement {
        query: format!(
            "UPDATE \"{table}\" SET doc = doc || {patch}::jsonb WHERE id = ({target}) RETURNING id",
            table = collection.name()
        ),
        params,
    })
}

pub fn update_inc_statement(collection: Collection, filter: &DocFilter, field: &str, delta: i64) -> Result<SqlStatement, StoreError> {
    validate_field_name(field)?;
    let mut params = Vec::new();
    let delta = placeholder(&mut params, SqlParam::Int(delta));
    let target = first_match(collection, filter, &mut params)?;
    Ok(SqlStatement {
        query: format!(
            "UPDATE \"{table}\" SET doc = jsonb_set(doc, '{{{field}}}', to_jsonb(\
             COALESCE(CASE WHEN jsonb_typeof(doc->'{field}') = 'number' THEN (doc->>'{field}')::numeric END, 0) \
             + {delta}::bigint)) WHERE id = ({target}) RETURNING id",
            table = collection.name()
        ),
        params,
    })
}

pub fn delete_statement(collection: Collection, filter: &DocFilter) -> Result<SqlStatement, StoreError> {
    let mut params = Vec::new();
    let target = first_match(collection, filter, &mut params)?;
    Ok(SqlStatement {
        query: format!(
            "DELETE FROM \"{table}\" WHERE id = ({target}) RETURNING id, doc",
            table = collection.name()
        ),
        params,
    })
}

fn bind_all<'q>(
    mut q: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    params: &'q [SqlParam],
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    for p in params {
        q = match p {
            SqlParam::Uuid(u) => q.bind(*u),
            SqlParam::Text(s) => q.bind(s.as_str()),
            SqlParam::Float(f) => q.bind(*f),
            SqlParam::Int(i) => q.bind(*i),
            SqlParam::Json(v) => q.bind(v),
        };
    }
    q
}

fn row_to_document(row: &PgRow) -> Result<Document, StoreError> {
    let id: Uuid = row.try_get("id")?;
    let doc: Value = row.try_get("doc")?;
    let mut doc = match doc {
        Value::Object(map) => map,
        other => return Err(StoreError::Query(format!("document {} is not an object: {}", id, other))),
    };
    doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    Ok(doc)
}

/// Map driver errors onto the store taxonomy.
fn classify(collection: Collection, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(ref db) if db.code().as_deref() == Some("23505") => StoreError::Duplicate { collection },
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        other => {
            error!("Query on {} failed: {}", collection, other);
            StoreError::Query(other.to_string())
        }
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn find_one(&self, collection: Collection, filter: &DocFilter) -> Result<Option<Document>, StoreError> {
        let statement = select_statement(collection, filter, &FindOptions::default().limit(1))?;
        Ok(self.fetch_documents(collection, statement).await?.into_iter().next())
    }

    async fn find_many(
        &self,
        collection: Collection,
        filter: &DocFilter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let statement = select_statement(collection, filter, options)?;
        self.fetch_documents(collection, statement).await
    }

    async fn count(&self, collection: Collection, filter: &DocFilter) -> Result<u64, StoreError> {
        let statement = count_statement(collection, filter)?;
        let row = bind_all(sqlx::query(&statement.query), &statement.params)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(collection, e))?;
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }

    async fn insert_one(&self, collection: Collection, mut doc: Document) -> Result<Uuid, StoreError> {
        doc.remove(ID_FIELD);
        let id = Uuid::new_v4();
        let query = format!(
            "INSERT INTO \"{}\" (id, doc) VALUES ($1, $2::jsonb) ON CONFLICT DO NOTHING RETURNING id",
            collection.name()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .bind(Value::Object(doc))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(collection, e))?;

        match row {
            Some(_) => Ok(id),
            None => Err(StoreError::Duplicate { collection }),
        }
    }

    async fn update_set(&self, collection: Collection, filter: &DocFilter, fields: Document) -> Result<bool, StoreError> {
        let statement = update_set_statement(collection, filter, fields)?;
        let row = bind_all(sqlx::query(&statement.query), &statement.params)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(collection, e))?;
        Ok(row.is_some())
    }

    async fn update_inc(
        &self,
        collection: Collection,
        filter: &DocFilter,
        field: &str,
        delta: i64,
    ) -> Result<bool, StoreError> {
        let statement = update_inc_statement(collection, filter, field, delta)?;
        let row = bind_all(sqlx::query(&statement.query), &statement.params)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(collection, e))?;
        Ok(row.is_some())
    }

    async fn delete_one(&self, collection: Collection, filter: &DocFilter) -> Result<Option<Document>, StoreError> {
        let statement = delete_statement(collection, filter)?;
        let row = bind_all(sqlx::query(&statement.query), &statement.params)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| classify(collection, e))?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}
