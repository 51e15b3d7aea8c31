//! Persistence layer: Postgres via sqlx, pgvector for embedding columns.
//!
//! Raw and derived Bahn data lives in the `bewegungsdaten` schema (see
//! `schema.sql` for the reference DDL). Embedding vectors are written and
//! read through text casts (`'[...]'::vector`) because the repositories
//! use runtime queries, not compile-time macros.

use sqlx::postgres::PgPoolOptions;

pub mod models;
pub mod repositories;
pub mod vector;

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Verify the database answers a trivial query.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
