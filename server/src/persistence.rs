//! Write-through storage for the territory table.

use std::path::PathBuf;

use sqlx_core::migrate::{MigrateError, Migrator};
use turfmap_shared::{BoxRecord, TerritoryRecord};

/// Migration directory candidates: workspace root first, then the crate dir.
const MIGRATION_DIRS: [&str; 2] = ["server/migrations", "migrations"];

type TerritoryRow = (String, String, String, String, serde_json::Value);

/// Load every row. Rows whose `boxes` column does not decode are returned
/// with the decode error so the caller can log and skip them.
pub async fn load_all(
    pool: &sqlx::PgPool,
) -> Result<Vec<Result<TerritoryRecord, (String, serde_json::Error)>>, sqlx_core::Error> {
    let rows: Vec<TerritoryRow> =
        sqlx::query_as("SELECT id, name, gang, color, boxes FROM territories ORDER BY id")
            .fetch_all(pool)
            .await?;

    Ok(rows
        .into_iter()
        .map(|(id, name, gang, color, boxes)| {
            match serde_json::from_value::<Vec<BoxRecord>>(boxes) {
                Ok(boxes) => Ok(TerritoryRecord {
                    id,
                    name,
                    gang,
                    color,
                    boxes,
                }),
                Err(e) => Err((id, e)),
            }
        })
        .collect())
}

/// Apply pending file migrations from `server/migrations`.
pub async fn migrate(pool: &sqlx::PgPool) -> Result<(), MigrateError> {
    let dir = MIGRATION_DIRS
        .iter()
        .map(PathBuf::from)
        .find(|dir| dir.is_dir())
        .unwrap_or_else(|| PathBuf::from(MIGRATION_DIRS[1]));
    Migrator::new(dir).await?.run(pool).await
}

fn boxes_json(record: &TerritoryRecord) -> Result<String, sqlx_core::Error> {
    serde_json::to_string(&record.boxes).map_err(|e| sqlx_core::Error::Encode(Box::new(e)))
}

pub async fn insert(pool: &sqlx::PgPool, record: &TerritoryRecord) -> Result<(), sqlx_core::Error> {
    sqlx::query(
        "INSERT INTO territories (id, name, gang, color, boxes) VALUES ($1, $2, $3, $4, $5::jsonb)",
    )
    .bind(&record.id)
    .bind(&record.name)
    .bind(&record.gang)
    .bind(&record.color)
    .bind(boxes_json(record)?)
    .execute(pool)
    .await?;
    Ok(())
}

/// Overwrite every mutable column of an existing row.
pub async fn update(pool: &sqlx::PgPool, record: &TerritoryRecord) -> Result<u64, sqlx_core::Error> {
    let result = sqlx::query(
        "UPDATE territories \
         SET name = $2, gang = $3, color = $4, boxes = $5::jsonb, updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(&record.id)
    .bind(&record.name)
    .bind(&record.gang)
    .bind(&record.color)
    .bind(boxes_json(record)?)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete(pool: &sqlx::PgPool, id: &str) -> Result<u64, sqlx_core::Error> {
    let result = sqlx::query("DELETE FROM territories WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    const REAL_DB_TEST_LOCK: i64 = 41_770_001;

    #[tokio::test]
    async fn round_trips_rows_with_real_postgres() {
        let Ok(database_url) = std::env::var("DATABASE_URL") else {
            eprintln!("Skipping real-Postgres integration test: DATABASE_URL is not set");
            return;
        };

        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&database_url)
            .await
            .expect("connect real postgres");
        let mut lock_conn = pool.acquire().await.expect("acquire lock connection");
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(REAL_DB_TEST_LOCK)
            .execute(&mut *lock_conn)
            .await
            .expect("acquire territories test db lock");
        migrate(&pool)
            .await
            .expect("run migrations");
        sqlx::query("TRUNCATE TABLE territories")
            .execute(&pool)
            .await
            .expect("truncate territories");

        let mut record = TerritoryRecord {
            id: "custom-1".into(),
            name: "Grove".into(),
            gang: "Families".into(),
            color: "#00FF00".into(),
            boxes: vec![BoxRecord {
                bounds: [[0.0, 0.0], [10.0, 10.0]],
            }],
        };
        insert(&pool, &record).await.expect("insert row");
        assert!(insert(&pool, &record).await.is_err());

        record.boxes.push(BoxRecord {
            bounds: [[0.0, 10.0], [10.0, 20.0]],
        });
        assert_eq!(update(&pool, &record).await.expect("update row"), 1);

        let loaded = load_all(&pool).await.expect("load rows");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].as_ref().ok(), Some(&record));

        assert_eq!(delete(&pool, "custom-1").await.expect("delete row"), 1);
        assert_eq!(delete(&pool, "custom-1").await.expect("delete again"), 0);
    }
}
