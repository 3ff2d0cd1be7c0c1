//! Persistent tier of the Document Store, backed by SQLite.
//!
//! Sessions are never shared across workers: every operation here opens its
//! own [`rusqlite::Connection`], does its work, and lets it close at the end
//! of the call.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use regex::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, params_from_iter, Connection};

use crate::error::SearchError;
use crate::store::model::{Document, NewDocument};
use crate::varint;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    path            TEXT NOT NULL UNIQUE,
    size            INTEGER NOT NULL,
    last_modified   INTEGER NOT NULL,
    mime_type       TEXT NOT NULL,
    last_indexed    INTEGER
);
CREATE TABLE IF NOT EXISTS postings (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    ngram           TEXT NOT NULL UNIQUE,
    doc_ids         BLOB NOT NULL,
    last_updated    INTEGER
);
CREATE INDEX IF NOT EXISTS idx_documents_path ON documents(path);
CREATE INDEX IF NOT EXISTS idx_postings_ngram ON postings(ngram);
";

/// Handle to the SQLite-backed persistent tier. Cheap to clone the path and
/// open a fresh connection per call; the struct itself just remembers where
/// the database file lives.
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    /// Opens (creating if absent) the database at `path` and ensures the
    /// schema exists.
    pub fn open(path: &Path) -> Result<Self, SearchError> {
        let store = Self {
            path: path.to_path_buf(),
        };
        let conn = store.session()?;
        conn.execute_batch(SCHEMA)?;
        Ok(store)
    }

    fn session(&self) -> Result<Connection, SearchError> {
        let conn = Connection::open(&self.path)?;
        register_regexp(&conn)?;
        Ok(conn)
    }

    pub fn list_documents(&self, path_prefix: &str) -> Result<Vec<Document>, SearchError> {
        let conn = self.session()?;
        let like_pattern = format!("{}%", escape_like(path_prefix));
        let mut stmt = conn.prepare(
            "SELECT id, path, size, last_modified, mime_type, last_indexed \
             FROM documents WHERE path LIKE ?1 ESCAPE '\\'",
        )?;
        let rows = stmt.query_map(params![like_pattern], row_to_document)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Inserts new documents / updates existing ones (matched by `path`),
    /// returning each with its assigned id.
    pub fn upsert_documents(&self, docs: &[NewDocument]) -> Result<Vec<Document>, SearchError> {
        let mut conn = self.session()?;
        let tx = conn.transaction()?;
        let mut result = Vec::with_capacity(docs.len());
        for doc in docs {
            tx.execute(
                "INSERT INTO documents (path, size, last_modified, mime_type, last_indexed) \
                 VALUES (?1, ?2, ?3, ?4, NULL) \
                 ON CONFLICT(path) DO UPDATE SET \
                    size = excluded.size, \
                    last_modified = excluded.last_modified, \
                    mime_type = excluded.mime_type",
                params![doc.path, doc.size as i64, doc.last_modified, doc.mime_type],
            )?;
            let id: i64 = tx.query_row(
                "SELECT id FROM documents WHERE path = ?1",
                params![doc.path],
                |row| row.get(0),
            )?;
            result.push(Document {
                id,
                path: doc.path.clone(),
                size: doc.size,
                last_modified: doc.last_modified,
                mime_type: doc.mime_type.clone(),
                last_indexed: None,
            });
        }
        tx.commit()?;
        Ok(result)
    }

    /// Updates metadata for an already-tracked document without touching
    /// `last_indexed`.
    pub fn update_document_metadata(
        &self,
        id: i64,
        size: u64,
        last_modified: i64,
        mime_type: &str,
    ) -> Result<(), SearchError> {
        let conn = self.session()?;
        conn.execute(
            "UPDATE documents SET size = ?2, last_modified = ?3, mime_type = ?4 WHERE id = ?1",
            params![id, size as i64, last_modified, mime_type],
        )?;
        Ok(())
    }

    /// Stamps `last_indexed` to `now` for the given document ids.
    pub fn touch_last_indexed(&self, ids: &[i64], now: i64) -> Result<(), SearchError> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.session()?;
        let placeholders = std::iter::repeat("?")
            .take(ids.len())
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "UPDATE documents SET last_indexed = ? WHERE id IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut bound: Vec<&dyn rusqlite::ToSql> = vec![&now];
        for id in ids {
            bound.push(id);
        }
        stmt.execute(bound.as_slice())?;
        Ok(())
    }

    pub fn delete_documents(&self, ids: &[i64]) -> Result<(), SearchError> {
        if ids.is_empty() {
            return Ok(());
        }
        let conn = self.session()?;
        let placeholders = std::iter::repeat("?")
            .take(ids.len())
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!("DELETE FROM documents WHERE id IN ({placeholders})");
        conn.execute(&sql, params_from_iter(ids.iter()))?;
        Ok(())
    }

    /// Writes postings for a batch, merging under `mode`.
    pub fn put_postings(
        &self,
        postings: &HashMap<String, HashSet<i64>>,
        mode: crate::store::model::PostingMode,
        now: i64,
    ) -> Result<(), SearchError> {
        use crate::store::model::PostingMode;

        let mut conn = self.session()?;
        let tx = conn.transaction()?;
        for (ngram, ids) in postings {
            let final_ids: HashSet<i64> = match mode {
                PostingMode::Replace => ids.clone(),
                PostingMode::Union => {
                    let existing: Option<Vec<u8>> = tx
                        .query_row(
                            "SELECT doc_ids FROM postings WHERE ngram = ?1",
                            params![ngram],
                            |row| row.get(0),
                        )
                        .ok();
                    let mut merged: HashSet<i64> = match existing {
                        Some(bytes) => varint::decode_all(&bytes)?
                            .into_iter()
                            .map(|v| v as i64)
                            .collect(),
                        None => HashSet::new(),
                    };
                    merged.extend(ids.iter().copied());
                    merged
                }
            };
            let encoded = varint::encode_all(final_ids.iter().map(|&id| id as u64));
            tx.execute(
                "INSERT INTO postings (ngram, doc_ids, last_updated) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(ngram) DO UPDATE SET doc_ids = excluded.doc_ids, last_updated = excluded.last_updated",
                params![ngram, encoded, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Reads the full decoded posting set for each requested n-gram.
    pub fn query_postings(
        &self,
        ngrams: &[String],
    ) -> Result<HashMap<String, HashSet<i64>>, SearchError> {
        let conn = self.session()?;
        let mut result = HashMap::with_capacity(ngrams.len());
        for ngram in ngrams {
            let bytes: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT doc_ids FROM postings WHERE ngram = ?1",
                    params![ngram],
                    |row| row.get(0),
                )
                .ok();
            let ids = match bytes {
                Some(b) => varint::decode_all(&b)?
                    .into_iter()
                    .map(|v| v as i64)
                    .collect(),
                None => HashSet::new(),
            };
            result.insert(ngram.clone(), ids);
        }
        Ok(result)
    }

    /// Returns every persisted (ngram, doc_ids) pair; used to rebuild the
    /// cache tier on startup.
    pub fn all_postings(&self) -> Result<Vec<(String, HashSet<i64>)>, SearchError> {
        let conn = self.session()?;
        let mut stmt = conn.prepare("SELECT ngram, doc_ids FROM postings")?;
        let rows = stmt.query_map([], |row| {
            let ngram: String = row.get(0)?;
            let bytes: Vec<u8> = row.get(1)?;
            Ok((ngram, bytes))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (ngram, bytes) = row?;
            let ids = varint::decode_all(&bytes)?
                .into_iter()
                .map(|v| v as i64)
                .collect();
            out.push((ngram, ids));
        }
        Ok(out)
    }

    /// Filters documents by optional id set membership, size bounds, and a
    /// path regex, ordered by `last_modified` descending.
    pub fn filter_documents(
        &self,
        ids: Option<&HashSet<i64>>,
        size_lt: Option<u64>,
        size_gt: Option<u64>,
        path_regex: Option<&str>,
    ) -> Result<Vec<Document>, SearchError> {
        let conn = self.session()?;
        let mut sql = String::from(
            "SELECT id, path, size, last_modified, mime_type, last_indexed FROM documents WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ids) = ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = std::iter::repeat("?")
                .take(ids.len())
                .collect::<Vec<_>>()
                .join(",");
            sql.push_str(&format!(" AND id IN ({placeholders})"));
            for id in ids {
                args.push(Box::new(*id));
            }
        }
        if let Some(lt) = size_lt {
            sql.push_str(" AND size < ?");
            args.push(Box::new(lt as i64));
        }
        if let Some(gt) = size_gt {
            sql.push_str(" AND size > ?");
            args.push(Box::new(gt as i64));
        }
        if let Some(re) = path_regex {
            sql.push_str(" AND regexp(?, path)");
            args.push(Box::new(re.to_string()));
        }
        sql.push_str(" ORDER BY last_modified DESC");

        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params.as_slice(), row_to_document)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Rewrites every posting's id set to drop references to ids no longer
    /// present in `documents`, and removes postings left with an empty set.
    /// Not run automatically.
    pub fn vacuum_postings(&self) -> Result<usize, SearchError> {
        let mut conn = self.session()?;
        let tx = conn.transaction()?;
        let live_ids: HashSet<i64> = {
            let mut stmt = tx.prepare("SELECT id FROM documents")?;
            let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
            rows.collect::<Result<HashSet<_>, _>>()?
        };

        let rows: Vec<(i64, String, Vec<u8>)> = {
            let mut stmt = tx.prepare("SELECT id, ngram, doc_ids FROM postings")?;
            let mapped = stmt.query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, Vec<u8>>(2)?))
            })?;
            mapped.collect::<Result<Vec<_>, _>>()?
        };

        let mut removed = 0usize;
        for (posting_id, _ngram, bytes) in rows {
            let decoded: HashSet<i64> = varint::decode_all(&bytes)?
                .into_iter()
                .map(|v| v as i64)
                .collect();
            let cleaned: HashSet<i64> = decoded.intersection(&live_ids).copied().collect();
            if cleaned.is_empty() {
                tx.execute("DELETE FROM postings WHERE id = ?1", params![posting_id])?;
                removed += 1;
            } else if cleaned.len() != decoded.len() {
                let encoded = varint::encode_all(cleaned.iter().map(|&id| id as u64));
                tx.execute(
                    "UPDATE postings SET doc_ids = ?2 WHERE id = ?1",
                    params![posting_id, encoded],
                )?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        path: row.get(1)?,
        size: row.get::<_, i64>(2)? as u64,
        last_modified: row.get(3)?,
        mime_type: row.get(4)?,
        last_indexed: row.get(5)?,
    })
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

/// Registers a `regexp(pattern, value)` scalar function backing
/// `path_regex` filtering, since SQLite has no built-in regex operator.
fn register_regexp(conn: &Connection) -> Result<(), SearchError> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let pattern: String = ctx.get(0)?;
            let value: String = ctx.get(1)?;
            let re = Regex::new(&pattern)
                .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))?;
            Ok(re.is_match(&value))
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::PostingMode;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.sqlite3");
        let store = SqliteStore::open(&path).unwrap();
        (dir, store)
    }

    #[test]
    fn upsert_assigns_ids_and_list_finds_by_prefix() {
        let (_dir, store) = store();
        let docs = vec![NewDocument {
            path: "/repos/a/f1.txt".into(),
            size: 10,
            last_modified: 100,
            mime_type: "text/plain".into(),
        }];
        let inserted = store.upsert_documents(&docs).unwrap();
        assert_eq!(inserted.len(), 1);
        assert!(inserted[0].id > 0);

        let found = store.list_documents("/repos/a").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "/repos/a/f1.txt");
    }

    #[test]
    fn upsert_on_existing_path_updates_in_place() {
        let (_dir, store) = store();
        let doc = NewDocument {
            path: "/repos/a/f1.txt".into(),
            size: 10,
            last_modified: 100,
            mime_type: "text/plain".into(),
        };
        let first = store.upsert_documents(&[doc.clone()]).unwrap();
        let mut updated = doc;
        updated.size = 20;
        let second = store.upsert_documents(&[updated]).unwrap();
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(second[0].size, 20);
    }

    #[test]
    fn delete_documents_removes_rows() {
        let (_dir, store) = store();
        let inserted = store
            .upsert_documents(&[NewDocument {
                path: "/repos/a/f1.txt".into(),
                size: 10,
                last_modified: 100,
                mime_type: "text/plain".into(),
            }])
            .unwrap();
        store.delete_documents(&[inserted[0].id]).unwrap();
        assert!(store.list_documents("/repos/a").unwrap().is_empty());
    }

    #[test]
    fn put_postings_union_merges_with_existing() {
        let (_dir, store) = store();
        let mut first = HashMap::new();
        first.insert("abc".to_string(), [1i64, 2].into_iter().collect());
        store.put_postings(&first, PostingMode::Union, 1).unwrap();

        let mut second = HashMap::new();
        second.insert("abc".to_string(), [2i64, 3].into_iter().collect());
        store.put_postings(&second, PostingMode::Union, 2).unwrap();

        let result = store.query_postings(&["abc".to_string()]).unwrap();
        assert_eq!(result["abc"], [1, 2, 3].into_iter().collect());
    }

    #[test]
    fn put_postings_replace_overwrites() {
        let (_dir, store) = store();
        let mut first = HashMap::new();
        first.insert("abc".to_string(), [1i64, 2].into_iter().collect());
        store.put_postings(&first, PostingMode::Replace, 1).unwrap();

        let mut second = HashMap::new();
        second.insert("abc".to_string(), [3i64].into_iter().collect());
        store.put_postings(&second, PostingMode::Replace, 2).unwrap();

        let result = store.query_postings(&["abc".to_string()]).unwrap();
        assert_eq!(result["abc"], [3].into_iter().collect());
    }

    #[test]
    fn filter_documents_applies_size_and_id_bounds() {
        let (_dir, store) = store();
        let inserted = store
            .upsert_documents(&[
                NewDocument {
                    path: "/repos/a/small.txt".into(),
                    size: 5,
                    last_modified: 1,
                    mime_type: "text/plain".into(),
                },
                NewDocument {
                    path: "/repos/a/big.txt".into(),
                    size: 500,
                    last_modified: 2,
                    mime_type: "text/plain".into(),
                },
            ])
            .unwrap();

        let all_ids: HashSet<i64> = inserted.iter().map(|d| d.id).collect();
        let small = store
            .filter_documents(Some(&all_ids), Some(100), None, None)
            .unwrap();
        assert_eq!(small.len(), 1);
        assert_eq!(small[0].path, "/repos/a/small.txt");
    }

    #[test]
    fn filter_documents_path_regex_uses_registered_function() {
        let (_dir, store) = store();
        store
            .upsert_documents(&[
                NewDocument {
                    path: "/repos/a/main.rs".into(),
                    size: 5,
                    last_modified: 1,
                    mime_type: "text/plain".into(),
                },
                NewDocument {
                    path: "/repos/a/readme.md".into(),
                    size: 5,
                    last_modified: 2,
                    mime_type: "text/plain".into(),
                },
            ])
            .unwrap();

        let rust_only = store
            .filter_documents(None, None, None, Some(r"\.rs$"))
            .unwrap();
        assert_eq!(rust_only.len(), 1);
        assert_eq!(rust_only[0].path, "/repos/a/main.rs");
    }

    #[test]
    fn vacuum_postings_drops_dead_ids_and_empty_postings() {
        let (_dir, store) = store();
        let inserted = store
            .upsert_documents(&[NewDocument {
                path: "/repos/a/f1.txt".into(),
                size: 5,
                last_modified: 1,
                mime_type: "text/plain".into(),
            }])
            .unwrap();
        let live_id = inserted[0].id;
        let dead_id = live_id + 999;

        let mut postings = HashMap::new();
        postings.insert("abc".to_string(), [live_id, dead_id].into_iter().collect());
        postings.insert("onlydead".to_string(), [dead_id].into_iter().collect());
        store.put_postings(&postings, PostingMode::Replace, 1).unwrap();

        let removed = store.vacuum_postings().unwrap();
        assert_eq!(removed, 1); // "onlydead" posting is gone entirely

        let result = store
            .query_postings(&["abc".to_string(), "onlydead".to_string()])
            .unwrap();
        assert_eq!(result["abc"], [live_id].into_iter().collect());
        assert!(result["onlydead"].is_empty());
    }
}
