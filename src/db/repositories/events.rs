use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use log::{debug, warn};
use rusqlite::{params, Connection, Row};
use serde_json::{from_str, to_string};

use crate::db::{
    connection::Database,
    helpers::{from_unix_seconds, to_i64, to_u64, to_unix_seconds},
    models::{Event, EventKind, EventStats, Metadata, NewEvent},
};

const EVENT_COLUMNS: &str =
    "id, type, app_name, window_title, screenshot_path, metadata, timestamp, synced";

impl Database {
    /// Persists one event and returns its id. Returns only after the
    /// insert has been committed.
    pub async fn append_event(&self, event: &NewEvent) -> Result<i64> {
        if event.app_name.trim().is_empty() {
            bail!("event app_name must not be empty");
        }

        let record = event.clone();
        self.execute(move |conn| {
            let metadata_json = record
                .metadata
                .as_ref()
                .map(to_string)
                .transpose()
                .context("failed to serialize event metadata")?;

            conn.execute(
                "INSERT INTO events (type, app_name, window_title, screenshot_path, metadata, timestamp, synced)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
                params![
                    record.kind.as_str(),
                    record.app_name,
                    record.window_title,
                    record.screenshot_path,
                    metadata_json,
                    to_unix_seconds(&record.timestamp),
                ],
            )
            .with_context(|| "failed to insert event")?;

            let id = conn.last_insert_rowid();
            debug!("Event {id} logged: {} for {}", record.kind.as_str(), record.app_name);
            Ok(id)
        })
        .await
    }

    /// Up to `limit` unsynced events, oldest timestamp first.
    pub async fn query_pending(&self, limit: usize) -> Result<Vec<Event>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EVENT_COLUMNS}
                 FROM events
                 WHERE synced = 0
                 ORDER BY timestamp ASC, id ASC
                 LIMIT ?1"
            ))?;

            let mut rows = stmt.query(params![to_i64(limit)?])?;
            let mut events = Vec::new();
            while let Some(row) = rows.next()? {
                events.push(event_from_row(row)?);
            }

            Ok(events)
        })
        .await
    }

    /// Marks the given ids as synced. Already-synced and unknown ids are
    /// ignored. Returns how many rows actually changed state.
    pub async fn mark_synced(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let ids = ids.to_vec();
        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open mark-synced transaction")?;
            let mut changed = 0;
            {
                let mut stmt =
                    tx.prepare("UPDATE events SET synced = 1 WHERE id = ?1 AND synced = 0")?;
                for id in &ids {
                    changed += stmt.execute(params![id])?;
                }
            }
            tx.commit().context("failed to commit mark-synced transaction")?;

            debug!("Marked {changed} of {} events as synced", ids.len());
            Ok(changed)
        })
        .await
    }

    /// Deletes synced events older than `older_than`. Pending events are
    /// never touched, whatever their age.
    pub async fn purge_synced(&self, older_than: Duration) -> Result<usize> {
        let cutoff = to_unix_seconds(&(Utc::now() - older_than));
        self.execute(move |conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM events WHERE synced = 1 AND timestamp < ?1",
                    params![cutoff],
                )
                .with_context(|| "failed to purge synced events")?;
            Ok(deleted)
        })
        .await
    }

    pub async fn event_stats(&self) -> Result<EventStats> {
        self.execute(|conn| event_stats_in(conn)).await
    }
}

fn event_stats_in(conn: &Connection) -> Result<EventStats> {
    let (total, synced): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN synced = 1 THEN 1 ELSE 0 END), 0) FROM events",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let total = to_u64(total, "total")?;
    let synced = to_u64(synced, "synced")?;
    Ok(EventStats {
        total,
        synced,
        pending: total.saturating_sub(synced),
    })
}

fn event_from_row(row: &Row<'_>) -> Result<Event> {
    let id: i64 = row.get(0)?;
    let kind = EventKind::from_stored(&row.get::<_, String>(1)?);
    let metadata_json: Option<String> = row.get(5)?;

    let metadata = metadata_json.and_then(|raw| match from_str::<Metadata>(&raw) {
        Ok(map) => Some(map),
        Err(err) => {
            warn!("Event {id} has unreadable metadata, ignoring it: {err}");
            None
        }
    });

    Ok(Event {
        id,
        kind,
        app_name: row.get(2)?,
        window_title: row.get(3)?,
        screenshot_path: row.get(4)?,
        metadata,
        timestamp: from_unix_seconds(row.get(6)?, "timestamp")?,
        synced: row.get::<_, i64>(7)? != 0,
    })
}
