use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::db::StoreError;
use crate::models::alert::{Alert, NewAlert};
use crate::models::job::{Batch, BatchStatus, Item, ItemStatus, Job, JobStatus, NewJob};
use crate::models::reference::{ListPrice, WatchlistEntry};

const JOB_COLUMNS: &str = "id, name, status, total_batches, completed_batches, created_by, \
                           created_at, completed_at, error, heartbeat_at";
const BATCH_COLUMNS: &str = "id, job_id, sequence, status, item_count, processed_count, \
                             created_at, completed_at, error";
const ITEM_COLUMNS: &str = "id, batch_id, position, identifier, status, payload, error, processed_at";

fn parse_status<T: std::str::FromStr>(row: &PgRow) -> Result<T, StoreError> {
    let raw: String = row.try_get("status")?;
    raw.parse()
        .map_err(|_| StoreError::Decode(format!("unknown status '{}'", raw)))
}

fn job_from_row(row: &PgRow) -> Result<Job, StoreError> {
    Ok(Job {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        status: parse_status::<JobStatus>(row)?,
        total_batches: row.try_get("total_batches")?,
        completed_batches: row.try_get("completed_batches")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
        error: row.try_get("error")?,
        heartbeat_at: row.try_get("heartbeat_at")?,
    })
}

fn batch_from_row(row: &PgRow) -> Result<Batch, StoreError> {
    Ok(Batch {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        sequence: row.try_get("sequence")?,
        status: parse_status::<BatchStatus>(row)?,
        item_count: row.try_get("item_count")?,
        processed_count: row.try_get("processed_count")?,
        created_at: row.try_get("created_at")?,
        completed_at: row.try_get("completed_at")?,
        error: row.try_get("error")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<Item, StoreError> {
    Ok(Item {
        id: row.try_get("id")?,
        batch_id: row.try_get("batch_id")?,
        position: row.try_get("position")?,
        identifier: row.try_get("identifier")?,
        status: parse_status::<ItemStatus>(row)?,
        payload: row.try_get("payload")?,
        error: row.try_get("error")?,
        processed_at: row.try_get("processed_at")?,
    })
}

fn alert_from_row(row: &PgRow) -> Result<Alert, StoreError> {
    Ok(Alert {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        identifier: row.try_get("identifier")?,
        seller_name: row.try_get("seller_name")?,
        current_price: row.try_get("current_price")?,
        historical_price: row.try_get("historical_price")?,
        price_change_percent: row.try_get("price_change_percent")?,
        payload: row.try_get("payload")?,
        detected_at: row.try_get("detected_at")?,
    })
}

/// Insert a job with its batches and items in a single transaction
pub async fn create_job(pool: &PgPool, new_job: &NewJob) -> Result<Job, StoreError> {
    let mut tx = pool.begin().await?;

    let job_id = Uuid::new_v4();
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO price_jobs (id, name, status, total_batches, completed_batches, created_by)
        VALUES ($1, $2, 'pending', $3, 0, $4)
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(job_id)
    .bind(&new_job.name)
    .bind(new_job.batches.len() as i32)
    .bind(new_job.created_by.as_deref())
    .fetch_one(&mut *tx)
    .await?;
    let job = job_from_row(&row)?;

    for (index, identifiers) in new_job.batches.iter().enumerate() {
        let batch_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO price_batches (id, job_id, sequence, status, item_count, processed_count)
            VALUES ($1, $2, $3, 'pending', $4, 0)
            "#,
        )
        .bind(batch_id)
        .bind(job_id)
        .bind(index as i32 + 1)
        .bind(identifiers.len() as i32)
        .execute(&mut *tx)
        .await?;

        let ids: Vec<Uuid> = identifiers.iter().map(|_| Uuid::new_v4()).collect();
        let positions: Vec<i32> = (0..identifiers.len() as i32).collect();
        sqlx::query(
            r#"
            INSERT INTO price_items (id, batch_id, position, identifier, status)
            SELECT id, $2, position, identifier, 'pending'
            FROM UNNEST($1::uuid[], $3::int4[], $4::text[]) AS t(id, position, identifier)
            "#,
        )
        .bind(&ids)
        .bind(batch_id)
        .bind(&positions)
        .bind(identifiers)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(job)
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<Job>, StoreError> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM price_jobs WHERE id = $1"))
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

pub async fn list_jobs(
    pool: &PgPool,
    created_by: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Job>, StoreError> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM price_jobs
        WHERE ($1::text IS NULL OR created_by = $1)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#
    ))
    .bind(created_by)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Jobs a worker may run: pending ones, and processing ones whose heartbeat
/// is older than `stale_before`. Oldest first.
pub async fn list_runnable_jobs(
    pool: &PgPool,
    stale_before: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Job>, StoreError> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM price_jobs
        WHERE status = 'pending'
           OR (status = 'processing' AND (heartbeat_at IS NULL OR heartbeat_at < $1))
        ORDER BY created_at ASC
        LIMIT $2
        "#
    ))
    .bind(stale_before)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Take ownership of a job. Pending and failed jobs are always claimable;
/// processing ones only once their heartbeat predates `stale_before`.
pub async fn claim_job(
    pool: &PgPool,
    job_id: Uuid,
    stale_before: DateTime<Utc>,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE price_jobs
        SET status = 'processing', error = NULL, completed_at = NULL, heartbeat_at = NOW()
        WHERE id = $1
          AND (status IN ('pending', 'failed')
               OR (status = 'processing' AND (heartbeat_at IS NULL OR heartbeat_at < $2)))
        "#,
    )
    .bind(job_id)
    .bind(stale_before)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn heartbeat_job(pool: &PgPool, job_id: Uuid) -> Result<(), StoreError> {
    sqlx::query("UPDATE price_jobs SET heartbeat_at = NOW() WHERE id = $1 AND status = 'processing'")
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn update_completed_batches(
    pool: &PgPool,
    job_id: Uuid,
    completed: i32,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE price_jobs SET completed_batches = $1 WHERE id = $2")
        .bind(completed)
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn finish_job(
    pool: &PgPool,
    job_id: Uuid,
    status: JobStatus,
    error: Option<&str>,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE price_jobs
        SET status = $1, error = $2, completed_at = NOW()
        WHERE id = $3
        "#,
    )
    .bind(status.to_string())
    .bind(error)
    .bind(job_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn complete_job_if_processing(
    pool: &PgPool,
    job_id: Uuid,
    completed_batches: i32,
) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE price_jobs
        SET status = 'completed', completed_batches = $1, completed_at = NOW()
        WHERE id = $2 AND status = 'processing'
        "#,
    )
    .bind(completed_batches)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn list_batches(pool: &PgPool, job_id: Uuid) -> Result<Vec<Batch>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {BATCH_COLUMNS} FROM price_batches WHERE job_id = $1 ORDER BY sequence ASC"
    ))
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(batch_from_row).collect()
}

pub async fn get_batch(pool: &PgPool, batch_id: Uuid) -> Result<Option<Batch>, StoreError> {
    let row = sqlx::query(&format!("SELECT {BATCH_COLUMNS} FROM price_batches WHERE id = $1"))
        .bind(batch_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(batch_from_row).transpose()
}

pub async fn start_batch(pool: &PgPool, batch_id: Uuid) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE price_batches
        SET status = 'processing', error = NULL
        WHERE id = $1 AND status IN ('pending', 'processing', 'failed')
        "#,
    )
    .bind(batch_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn update_processed_count(
    pool: &PgPool,
    batch_id: Uuid,
    processed: i32,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE price_batches SET processed_count = $1 WHERE id = $2")
        .bind(processed)
        .bind(batch_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn complete_batch(pool: &PgPool, batch_id: Uuid, processed: i32) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE price_batches
        SET status = 'completed', processed_count = $1, completed_at = NOW()
        WHERE id = $2 AND status = 'processing'
        "#,
    )
    .bind(processed)
    .bind(batch_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn fail_batch(pool: &PgPool, batch_id: Uuid, error: &str) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE price_batches
        SET status = 'failed', error = $1
        WHERE id = $2 AND status <> 'cancelled'
        "#,
    )
    .bind(error)
    .bind(batch_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn cancel_batch(pool: &PgPool, batch_id: Uuid) -> Result<bool, StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE price_batches
        SET status = 'cancelled', error = 'Cancelled by user', completed_at = NOW()
        WHERE id = $1 AND status IN ('pending', 'processing')
        "#,
    )
    .bind(batch_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn list_items(pool: &PgPool, batch_id: Uuid) -> Result<Vec<Item>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {ITEM_COLUMNS} FROM price_items WHERE batch_id = $1 ORDER BY position ASC"
    ))
    .bind(batch_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(item_from_row).collect()
}

pub async fn mark_item_processing(pool: &PgPool, item_id: Uuid) -> Result<(), StoreError> {
    sqlx::query("UPDATE price_items SET status = 'processing' WHERE id = $1")
        .bind(item_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn complete_item(
    pool: &PgPool,
    item_id: Uuid,
    payload: Option<&serde_json::Value>,
    note: Option<&str>,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE price_items
        SET status = 'completed', payload = $1, error = $2, processed_at = $3
        WHERE id = $4
        "#,
    )
    .bind(payload)
    .bind(note)
    .bind(Utc::now())
    .bind(item_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fail_item(pool: &PgPool, item_id: Uuid, error: &str) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        UPDATE price_items
        SET status = 'failed', error = $1, processed_at = $2
        WHERE id = $3
        "#,
    )
    .bind(error)
    .bind(Utc::now())
    .bind(item_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn completed_items(pool: &PgPool, job_id: Uuid) -> Result<Vec<Item>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT i.id, i.batch_id, i.position, i.identifier, i.status, i.payload, i.error,
               i.processed_at
        FROM price_items i
        JOIN price_batches b ON b.id = i.batch_id
        WHERE b.job_id = $1 AND i.status = 'completed'
        ORDER BY b.sequence ASC, i.position ASC
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(item_from_row).collect()
}

pub async fn insert_alerts(pool: &PgPool, alerts: &[NewAlert]) -> Result<(), StoreError> {
    for alert in alerts {
        sqlx::query(
            r#"
            INSERT INTO price_alerts (id, job_id, identifier, seller_name, current_price,
                                      historical_price, price_change_percent, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(alert.job_id)
        .bind(&alert.identifier)
        .bind(&alert.seller_name)
        .bind(alert.current_price)
        .bind(alert.historical_price)
        .bind(alert.price_change_percent)
        .bind(alert.payload.as_ref())
        .execute(pool)
        .await?;
    }
    Ok(())
}

pub async fn list_alerts(pool: &PgPool, job_id: Uuid) -> Result<Vec<Alert>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT id, job_id, identifier, seller_name, current_price, historical_price,
               price_change_percent, payload, detected_at
        FROM price_alerts
        WHERE job_id = $1
        ORDER BY detected_at DESC
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(alert_from_row).collect()
}

pub async fn list_prices(
    pool: &PgPool,
    identifiers: &[String],
) -> Result<HashMap<String, f64>, StoreError> {
    let rows = sqlx::query(
        "SELECT identifier, list_price FROM list_prices WHERE identifier = ANY($1)",
    )
    .bind(identifiers)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|r| Ok((r.try_get("identifier")?, r.try_get("list_price")?)))
        .collect()
}

pub async fn upsert_list_prices(pool: &PgPool, entries: &[(String, f64)]) -> Result<u64, StoreError> {
    let identifiers: Vec<&str> = entries.iter().map(|(id, _)| id.as_str()).collect();
    let prices: Vec<f64> = entries.iter().map(|(_, price)| *price).collect();

    let result = sqlx::query(
        r#"
        INSERT INTO list_prices (identifier, list_price)
        SELECT * FROM UNNEST($1::text[], $2::float8[])
        ON CONFLICT (identifier)
        DO UPDATE SET list_price = EXCLUDED.list_price, updated_at = NOW()
        "#,
    )
    .bind(&identifiers)
    .bind(&prices)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

fn list_price_from_row(row: &PgRow) -> Result<ListPrice, StoreError> {
    Ok(ListPrice {
        identifier: row.try_get("identifier")?,
        list_price: row.try_get("list_price")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn list_price_entries(
    pool: &PgPool,
    search: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ListPrice>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT identifier, list_price, updated_at
        FROM list_prices
        WHERE ($1::text IS NULL OR strpos(lower(identifier), lower($1)) > 0)
        ORDER BY identifier ASC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(search)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter().map(list_price_from_row).collect()
}

pub async fn count_list_prices(pool: &PgPool, search: Option<&str>) -> Result<i64, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS count
        FROM list_prices
        WHERE ($1::text IS NULL OR strpos(lower(identifier), lower($1)) > 0)
        "#,
    )
    .bind(search)
    .fetch_one(pool)
    .await?;

    Ok(row.try_get("count")?)
}

pub async fn get_list_price(pool: &PgPool, identifier: &str) -> Result<Option<ListPrice>, StoreError> {
    let row = sqlx::query("SELECT identifier, list_price, updated_at FROM list_prices WHERE identifier = $1")
        .bind(identifier)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(list_price_from_row).transpose()
}

pub async fn delete_list_price(pool: &PgPool, identifier: &str) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM list_prices WHERE identifier = $1")
        .bind(identifier)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn clear_list_prices(pool: &PgPool) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM list_prices").execute(pool).await?;
    Ok(result.rows_affected())
}

pub async fn watchlist(pool: &PgPool) -> Result<Vec<String>, StoreError> {
    let rows = sqlx::query("SELECT identifier FROM watchlist ORDER BY created_at ASC, identifier ASC")
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|r| r.try_get("identifier").map_err(StoreError::from))
        .collect()
}

pub async fn add_to_watchlist(pool: &PgPool, identifiers: &[String]) -> Result<u64, StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO watchlist (identifier)
        SELECT * FROM UNNEST($1::text[])
        ON CONFLICT (identifier) DO NOTHING
        "#,
    )
    .bind(identifiers)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}


pub async fn list_watchlist(
    pool: &PgPool,
    limit: i64,
    offset: i64,
) -> Result<Vec<WatchlistEntry>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT identifier, created_at
        FROM watchlist
        ORDER BY created_at ASC, identifier ASC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|r| {
            Ok(WatchlistEntry {
                identifier: r.try_get("identifier")?,
                created_at: r.try_get("created_at")?,
            })
        })
        .collect()
}

pub async fn count_watchlist(pool: &PgPool) -> Result<i64, StoreError> {
    let row = sqlx::query("SELECT COUNT(*) AS count FROM watchlist")
        .fetch_one(pool)
        .await?;
    Ok(row.try_get("count")?)
}

pub async fn remove_from_watchlist(pool: &PgPool, identifier: &str) -> Result<bool, StoreError> {
    let result = sqlx::query("DELETE FROM watchlist WHERE identifier = $1")
        .bind(identifier)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn clear_watchlist(pool: &PgPool) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM watchlist").execute(pool).await?;
    Ok(result.rows_affected())
}
