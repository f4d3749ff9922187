// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Connection Pool
//!
//! Wraps `sqlx::postgres::PgPool` in a thin `Database` newtype that is
//! injected into all PostgreSQL repository implementations. Schema migrations
//! from `migrations/` are embedded at compile time and applied on connect.

use anyhow::{Context, Result};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn new(connection_string: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(connection_string)
            .await
            .context("Failed to connect to database")?;

        Ok(Self { pool })
    }

    /// Connect and bring the schema up to date
    pub async fn connect_and_migrate(connection_string: &str) -> Result<Self> {
        let db = Self::new(connection_string).await?;
        MIGRATOR
            .run(&db.pool)
            .await
            .context("Failed to apply migrations")?;
        info!(migrations = MIGRATOR.iter().count(), "Database schema up to date");
        Ok(db)
    }

    pub fn get_pool(&self) -> &PgPool {
        &self.pool
    }
}
