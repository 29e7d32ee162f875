//! Detection records and the owners they reference.
//!
//! Records are written once, when an image finishes detection, and never
//! mutated. Listing is paginated over insertion order (`id` ascending).

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTimeError};

use crate::detect::{BoundingBox, LabelSet};
use crate::fingerprint::{fingerprint_hex, FINGERPRINT_SCHEME};
use crate::{now_s, open_db_connection, validate_email, validate_username};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The owner a record would reference does not exist. Nothing was written.
    #[error("owner with id {0} does not exist")]
    UnknownOwner(i64),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("record {id} has malformed label data: {source}")]
    MalformedLabels {
        id: i64,
        #[source]
        source: MalformedLabelData,
    },
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("clock: {0}")]
    Clock(#[from] SystemTimeError),
}

/// Stored label text that is not a JSON array of strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct MalformedLabelData(pub String);

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub id: i64,
    pub owner_id: i64,
    pub filename: String,
    pub labels: LabelSet,
    pub bbox: Option<BoundingBox>,
    pub fingerprint: String,
    pub uploaded_at: u64,
}

impl DetectionRecord {
    pub fn ppe_count(&self) -> usize {
        self.labels.len()
    }
}

/// Label text as persisted, before decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredLabels {
    pub record_id: i64,
    pub raw: Option<String>,
}

impl StoredLabels {
    pub fn decode(&self) -> Result<LabelSet, MalformedLabelData> {
        decode_labels(self.raw.as_deref())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// SQL `LIMIT`/`OFFSET` values. Anything past `i64::MAX` saturates, which
    /// selects the same rows as the unbounded in-memory walk.
    fn sql_bounds(&self) -> (i64, i64) {
        let limit = i64::try_from(self.limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(self.offset).unwrap_or(i64::MAX);
        (limit, offset)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 10,
            offset: 0,
        }
    }
}

/// Order-preserving text form of a label set (JSON string array).
pub fn encode_labels(labels: &LabelSet) -> StoreResult<String> {
    Ok(serde_json::to_string(labels)?)
}

/// Inverse of [`encode_labels`]. Missing text decodes to an empty set.
pub fn decode_labels(raw: Option<&str>) -> Result<LabelSet, MalformedLabelData> {
    match raw.map(str::trim) {
        None | Some("") => Ok(LabelSet::new()),
        Some(text) => {
            serde_json::from_str::<LabelSet>(text).map_err(|e| MalformedLabelData(e.to_string()))
        }
    }
}

pub trait DetectionStore {
    fn register_owner(&mut self, username: &str, email: &str) -> StoreResult<Owner>;

    fn owner(&self, owner_id: i64) -> StoreResult<Option<Owner>>;

    /// Persist one detection. Fails with [`StoreError::UnknownOwner`] before
    /// any write when `owner_id` does not resolve.
    fn record(
        &mut self,
        owner_id: i64,
        filename: &str,
        labels: &LabelSet,
        bbox: Option<BoundingBox>,
    ) -> StoreResult<DetectionRecord>;

    /// Records in `id` order, optionally for one owner, `offset` applied before `limit`.
    fn list(&self, owner_id: Option<i64>, page: Page) -> StoreResult<Vec<DetectionRecord>>;

    /// Undecoded label text of every record, in `id` order.
    fn stored_labels(&self) -> StoreResult<Vec<StoredLabels>>;

    fn count(&self) -> StoreResult<u64>;
}

fn check_owner_fields(username: &str, email: &str) -> StoreResult<()> {
    validate_username(username).map_err(|e| StoreError::InvalidInput(e.to_string()))?;
    validate_email(email).map_err(|e| StoreError::InvalidInput(e.to_string()))?;
    Ok(())
}

fn check_filename(filename: &str) -> StoreResult<()> {
    if filename.trim().is_empty() {
        return Err(StoreError::InvalidInput("filename must not be empty".into()));
    }
    Ok(())
}

fn check_bbox(bbox: Option<BoundingBox>) -> StoreResult<()> {
    match bbox {
        Some(b) if !b.is_normalized() => Err(StoreError::InvalidInput(format!(
            "bounding box must have finite coordinates in [0, 1], got {:?}",
            b
        ))),
        _ => Ok(()),
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

// -------------------- SQLite --------------------

pub struct SqliteDetectionStore {
    conn: Connection,
}

impl SqliteDetectionStore {
    pub fn open(db_path: &str) -> StoreResult<Self> {
        let conn = open_db_connection(db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open(":memory:")
    }

    fn ensure_schema(&mut self) -> StoreResult<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS owners (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              username TEXT NOT NULL UNIQUE,
              email TEXT NOT NULL UNIQUE,
              created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS detections (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              owner_id INTEGER NOT NULL REFERENCES owners(id),
              filename TEXT NOT NULL,
              labels_json TEXT,
              fingerprint TEXT NOT NULL,
              fingerprint_scheme TEXT NOT NULL,
              uploaded_at INTEGER NOT NULL,
              bbox_x REAL,
              bbox_y REAL,
              bbox_w REAL,
              bbox_h REAL
            );

            CREATE INDEX IF NOT EXISTS idx_detections_owner ON detections(owner_id, id);
            CREATE INDEX IF NOT EXISTS idx_detections_fingerprint ON detections(fingerprint);
            "#,
        )?;
        Ok(())
    }
}

struct DetectionRow {
    id: i64,
    owner_id: i64,
    filename: String,
    labels_json: Option<String>,
    fingerprint: String,
    uploaded_at: i64,
    bbox: [Option<f64>; 4],
}

impl DetectionRow {
    fn into_record(self) -> StoreResult<DetectionRecord> {
        let labels = decode_labels(self.labels_json.as_deref())
            .map_err(|source| StoreError::MalformedLabels { id: self.id, source })?;
        let bbox = match self.bbox {
            [Some(x), Some(y), Some(w), Some(h)] => Some(BoundingBox { x, y, w, h }),
            _ => None,
        };
        Ok(DetectionRecord {
            id: self.id,
            owner_id: self.owner_id,
            filename: self.filename,
            labels,
            bbox,
            fingerprint: self.fingerprint,
            uploaded_at: u64::try_from(self.uploaded_at).unwrap_or(0),
        })
    }
}

impl DetectionStore for SqliteDetectionStore {
    fn register_owner(&mut self, username: &str, email: &str) -> StoreResult<Owner> {
        check_owner_fields(username, email)?;
        let created_at = now_s()?;
        let inserted = self.conn.execute(
            "INSERT INTO owners(username, email, created_at) VALUES (?1, ?2, ?3)",
            params![username, email, created_at as i64],
        );
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::Conflict(
                    "username or email already registered".into(),
                ));
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Owner {
            id: self.conn.last_insert_rowid(),
            username: username.to_string(),
            email: email.to_string(),
            created_at,
        })
    }

    fn owner(&self, owner_id: i64) -> StoreResult<Option<Owner>> {
        let owner = self
            .conn
            .query_row(
                "SELECT id, username, email, created_at FROM owners WHERE id = ?1",
                params![owner_id],
                |row| {
                    Ok(Owner {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        email: row.get(2)?,
                        created_at: u64::try_from(row.get::<_, i64>(3)?).unwrap_or(0),
                    })
                },
            )
            .optional()?;
        Ok(owner)
    }

    fn record(
        &mut self,
        owner_id: i64,
        filename: &str,
        labels: &LabelSet,
        bbox: Option<BoundingBox>,
    ) -> StoreResult<DetectionRecord> {
        check_filename(filename)?;
        check_bbox(bbox)?;
        let labels_json = encode_labels(labels)?;
        let fingerprint = fingerprint_hex(filename, owner_id);
        let uploaded_at = now_s()?;

        // Owner check and insert share one write lock.
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let owner_exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM owners WHERE id = ?1)",
            params![owner_id],
            |row| row.get(0),
        )?;
        if !owner_exists {
            return Err(StoreError::UnknownOwner(owner_id));
        }
        tx.execute(
            r#"
            INSERT INTO detections(
              owner_id, filename, labels_json, fingerprint, fingerprint_scheme, uploaded_at,
              bbox_x, bbox_y, bbox_w, bbox_h
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                owner_id,
                filename,
                labels_json,
                fingerprint,
                FINGERPRINT_SCHEME,
                uploaded_at as i64,
                bbox.map(|b| b.x),
                bbox.map(|b| b.y),
                bbox.map(|b| b.w),
                bbox.map(|b| b.h),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(DetectionRecord {
            id,
            owner_id,
            filename: filename.to_string(),
            labels: labels.clone(),
            bbox,
            fingerprint,
            uploaded_at,
        })
    }

    fn list(&self, owner_id: Option<i64>, page: Page) -> StoreResult<Vec<DetectionRecord>> {
        let (limit, offset) = page.sql_bounds();
        let rows = {
            let mut stmt = self.conn.prepare(
                r#"
                SELECT id, owner_id, filename, labels_json, fingerprint, uploaded_at,
                       bbox_x, bbox_y, bbox_w, bbox_h
                FROM detections
                WHERE (?1 IS NULL OR owner_id = ?1)
                ORDER BY id ASC
                LIMIT ?2 OFFSET ?3
                "#,
            )?;
            let mapped = stmt.query_map(params![owner_id, limit, offset], |row| {
                Ok(DetectionRow {
                    id: row.get(0)?,
                    owner_id: row.get(1)?,
                    filename: row.get(2)?,
                    labels_json: row.get(3)?,
                    fingerprint: row.get(4)?,
                    uploaded_at: row.get(5)?,
                    bbox: [row.get(6)?, row.get(7)?, row.get(8)?, row.get(9)?],
                })
            })?;
            mapped.collect::<Result<Vec<_>, _>>()?
        };
        rows.into_iter().map(DetectionRow::into_record).collect()
    }

    fn stored_labels(&self) -> StoreResult<Vec<StoredLabels>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, labels_json FROM detections ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredLabels {
                record_id: row.get(0)?,
                raw: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn count(&self) -> StoreResult<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM detections", [], |row| row.get(0))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}

// -------------------- In-memory --------------------

#[derive(Clone, Debug)]
struct InMemoryDetectionEntry {
    record: DetectionRecord,
    labels_json: Option<String>,
}

/// Store backed by process memory. Same contract as the SQLite store; labels
/// still pass through their text encoding.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDetectionStore {
    owners: Vec<Owner>,
    detections: Vec<InMemoryDetectionEntry>,
}

impl InMemoryDetectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn corrupt_labels(&mut self, record_id: i64, raw: &str) {
        if let Some(entry) = self
            .detections
            .iter_mut()
            .find(|entry| entry.record.id == record_id)
        {
            entry.labels_json = Some(raw.to_string());
        }
    }
}

impl DetectionStore for InMemoryDetectionStore {
    fn register_owner(&mut self, username: &str, email: &str) -> StoreResult<Owner> {
        check_owner_fields(username, email)?;
        if self
            .owners
            .iter()
            .any(|o| o.username == username || o.email == email)
        {
            return Err(StoreError::Conflict(
                "username or email already registered".into(),
            ));
        }
        let owner = Owner {
            id: self.owners.last().map_or(1, |o| o.id + 1),
            username: username.to_string(),
            email: email.to_string(),
            created_at: now_s()?,
        };
        self.owners.push(owner.clone());
        Ok(owner)
    }

    fn owner(&self, owner_id: i64) -> StoreResult<Option<Owner>> {
        Ok(self.owners.iter().find(|o| o.id == owner_id).cloned())
    }

    fn record(
        &mut self,
        owner_id: i64,
        filename: &str,
        labels: &LabelSet,
        bbox: Option<BoundingBox>,
    ) -> StoreResult<DetectionRecord> {
        check_filename(filename)?;
        check_bbox(bbox)?;
        if !self.owners.iter().any(|o| o.id == owner_id) {
            return Err(StoreError::UnknownOwner(owner_id));
        }
        let labels_json = encode_labels(labels)?;
        let record = DetectionRecord {
            id: self.detections.last().map_or(1, |e| e.record.id + 1),
            owner_id,
            filename: filename.to_string(),
            labels: labels.clone(),
            bbox,
            fingerprint: fingerprint_hex(filename, owner_id),
            uploaded_at: now_s()?,
        };
        self.detections.push(InMemoryDetectionEntry {
            record: record.clone(),
            labels_json: Some(labels_json),
        });
        Ok(record)
    }

    fn list(&self, owner_id: Option<i64>, page: Page) -> StoreResult<Vec<DetectionRecord>> {
        self.detections
            .iter()
            .filter(|entry| owner_id.map_or(true, |id| entry.record.owner_id == id))
            .skip(page.offset)
            .take(page.limit)
            .map(|entry| {
                let labels = decode_labels(entry.labels_json.as_deref()).map_err(|source| {
                    StoreError::MalformedLabels {
                        id: entry.record.id,
                        source,
                    }
                })?;
                Ok(DetectionRecord {
                    labels,
                    ..entry.record.clone()
                })
            })
            .collect()
    }

    fn stored_labels(&self) -> StoreResult<Vec<StoredLabels>> {
        Ok(self
            .detections
            .iter()
            .map(|entry| StoredLabels {
                record_id: entry.record.id,
                raw: entry.labels_json.clone(),
            })
            .collect())
    }

    fn count(&self) -> StoreResult<u64> {
        Ok(self.detections.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> LabelSet {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn stores() -> Vec<Box<dyn DetectionStore>> {
        vec![
            Box::new(SqliteDetectionStore::open_in_memory().unwrap()),
            Box::new(InMemoryDetectionStore::new()),
        ]
    }

    #[test]
    fn labels_round_trip_through_text() {
        let set = labels(&["vest", "helmet"]);
        let text = encode_labels(&set).unwrap();
        assert_eq!(text, r#"["helmet","vest"]"#);
        assert_eq!(decode_labels(Some(&text)).unwrap(), set);
        assert!(decode_labels(None).unwrap().is_empty());
        assert!(decode_labels(Some("  ")).unwrap().is_empty());
        assert!(decode_labels(Some("{not json")).is_err());
        assert!(decode_labels(Some("[1, 2]")).is_err());
    }

    #[test]
    fn record_requires_existing_owner() {
        for mut store in stores() {
            let err = store
                .record(42, "a.jpg", &labels(&["vest"]), None)
                .unwrap_err();
            assert!(matches!(err, StoreError::UnknownOwner(42)));
            assert_eq!(store.count().unwrap(), 0);
        }
    }

    #[test]
    fn record_then_list_round_trips() {
        for mut store in stores() {
            let owner = store.register_owner("site_lead", "lead@example.com").unwrap();
            let bbox = BoundingBox { x: 0.0, y: 0.0, w: 0.5, h: 0.5 };
            let rec = store
                .record(owner.id, "gate.png", &labels(&["helmet", "vest"]), Some(bbox))
                .unwrap();
            let listed = store.list(Some(owner.id), Page::new(10, 0)).unwrap();
            assert_eq!(listed, vec![rec.clone()]);
            assert_eq!(rec.fingerprint, fingerprint_hex("gate.png", owner.id));
            assert_eq!(rec.ppe_count(), 2);
        }
    }

    #[test]
    fn absent_region_stays_absent() {
        for mut store in stores() {
            let owner = store.register_owner("crew", "crew@example.com").unwrap();
            let zero = BoundingBox::default();
            store.record(owner.id, "none.png", &LabelSet::new(), None).unwrap();
            store.record(owner.id, "zero.png", &LabelSet::new(), Some(zero)).unwrap();
            let listed = store.list(None, Page::new(10, 0)).unwrap();
            assert_eq!(listed[0].bbox, None);
            assert_eq!(listed[1].bbox, Some(zero));
        }
    }

    #[test]
    fn out_of_range_bbox_is_rejected_before_write() {
        for mut store in stores() {
            let owner = store.register_owner("crew", "crew@example.com").unwrap();
            let bad = [
                BoundingBox { x: f64::NAN, y: 0.0, w: 0.5, h: 0.5 },
                BoundingBox { x: 0.0, y: 0.0, w: 2.5, h: 0.5 },
                BoundingBox { x: 0.0, y: 0.0, w: 0.5, h: -1.0 },
                BoundingBox { x: 0.0, y: f64::INFINITY, w: 0.5, h: 0.5 },
            ];
            for bbox in bad {
                let err = store
                    .record(owner.id, "a.png", &LabelSet::new(), Some(bbox))
                    .unwrap_err();
                assert!(matches!(err, StoreError::InvalidInput(_)));
            }
            assert_eq!(store.count().unwrap(), 0);

            let edge = BoundingBox { x: 0.0, y: 0.0, w: 1.0, h: 1.0 };
            store
                .record(owner.id, "full.png", &LabelSet::new(), Some(edge))
                .unwrap();
            let listed = store.list(None, Page::default()).unwrap();
            assert_eq!(listed[0].bbox, Some(edge));
        }
    }

    #[test]
    fn oversized_page_bounds_agree_across_stores() {
        for mut store in stores() {
            let owner = store.register_owner("crew", "crew@example.com").unwrap();
            store.record(owner.id, "a.png", &LabelSet::new(), None).unwrap();
            store.record(owner.id, "b.png", &LabelSet::new(), None).unwrap();
            let all = store.list(None, Page::new(usize::MAX, 0)).unwrap();
            assert_eq!(all.len(), 2);
            let tail = store.list(None, Page::new(usize::MAX, 1)).unwrap();
            assert_eq!(tail.len(), 1);
            assert_eq!(tail[0].filename, "b.png");
            assert!(store.list(None, Page::new(1, usize::MAX)).unwrap().is_empty());
        }
    }

    #[test]
    fn duplicate_owner_is_a_conflict() {
        for mut store in stores() {
            store.register_owner("alice", "alice@example.com").unwrap();
            let err = store
                .register_owner("alice", "other@example.com")
                .unwrap_err();
            assert!(matches!(err, StoreError::Conflict(_)));
            let err = store.register_owner("bad name!", "x@example.com").unwrap_err();
            assert!(matches!(err, StoreError::InvalidInput(_)));
        }
    }

    #[test]
    fn malformed_stored_labels_surface_on_list() {
        let mut store = SqliteDetectionStore::open_in_memory().unwrap();
        let owner = store.register_owner("ops", "ops@example.com").unwrap();
        let rec = store
            .record(owner.id, "x.jpg", &labels(&["vest"]), None)
            .unwrap();
        store
            .conn
            .execute(
                "UPDATE detections SET labels_json = '{oops' WHERE id = ?1",
                params![rec.id],
            )
            .unwrap();
        let err = store.list(None, Page::default()).unwrap_err();
        assert!(matches!(err, StoreError::MalformedLabels { id, .. } if id == rec.id));

        let raw = store.stored_labels().unwrap();
        assert_eq!(raw.len(), 1);
        assert!(raw[0].decode().is_err());
    }

    #[test]
    fn in_memory_corruption_matches_sqlite_behaviour() {
        let mut store = InMemoryDetectionStore::new();
        let owner = store.register_owner("ops", "ops@example.com").unwrap();
        let rec = store.record(owner.id, "x.jpg", &labels(&["vest"]), None).unwrap();
        store.corrupt_labels(rec.id, "[\"vest\"");
        assert!(matches!(
            store.list(None, Page::default()),
            Err(StoreError::MalformedLabels { .. })
        ));
    }
}
