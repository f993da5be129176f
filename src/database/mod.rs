use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use anyhow::Context;
use tracing::{debug, error, info};

const SCHEMA: &str = include_str!("schema.sql");

pub async fn connect(db_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(10))
        .connect(db_url)
        .await
        .map_err(|e| {
            error!("CRITICAL: DB Connection Failed! Is Postgres running?");
            e
        })?;
    Ok(pool)
}

/// 逐条执行 schema.sql，已存在的对象忽略，其余错误直接返回
pub async fn init_database(pool: &PgPool) -> anyhow::Result<()> {
    info!("Checking database schema...");
    for stmt in schema_statements(SCHEMA) {
        if let Err(e) = sqlx::query(stmt).execute(pool).await {
            if !already_exists(&e) {
                return Err(e).with_context(|| format!("Schema statement failed: {}", first_line(stmt)));
            }
            debug!("Schema object already exists: {}", first_line(stmt));
        }
    }
    info!("Database schema check complete.");
    Ok(())
}

fn already_exists(err: &sqlx::Error) -> bool {
    err.to_string().contains("already exists")
}

fn first_line(stmt: &str) -> &str {
    stmt.lines().next().unwrap_or(stmt)
}

fn schema_statements(sql: &str) -> Vec<&str> {
    sql.split(';').map(|s| s.trim()).filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_splits_into_table_and_index() {
        let stmts = schema_statements(SCHEMA);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].starts_with("CREATE TABLE IF NOT EXISTS feed_items"));
        assert!(stmts[1].contains("idx_feed_items_pending"));
    }

    #[test]
    fn only_already_exists_errors_are_tolerated() {
        let dup = sqlx::Error::Protocol("relation \"feed_items\" already exists".into());
        let denied = sqlx::Error::Protocol("permission denied for schema public".into());

        assert!(already_exists(&dup));
        assert!(!already_exists(&denied));
    }
}
