//! JSON-file-backed variable store.
//!
//! The whole store is one JSON object mapping paths to a string, a number,
//! or an array of strings and numbers:
//!
//! ```json
//! { "variables/count": 3, "variables/likes": ["fruit", "dogs"] }
//! ```
//!
//! The file is read once on [`JsonFileStore::open`] and rewritten on every
//! `set`/`remove` through a temp file in the same directory followed by a
//! rename, so a crash never leaves a half-written document behind.  The
//! in-memory map only changes once the write has succeeded.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Number, Value as Json};
use tokio::sync::RwLock;

use super::{check_path, Store};
use crate::error::StoreError;
use crate::value::{Scalar, Value};

/// [`Store`] persisted to a single JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    vars: RwLock<BTreeMap<String, Value>>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`.  A missing file is an
    /// empty store; it is created on the first write.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let vars = match tokio::fs::read_to_string(&path).await {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => decode(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), entries = vars.len(), "opened variable store");
        Ok(Self {
            path,
            vars: RwLock::new(vars),
        })
    }

    /// `<data_dir>/cmdvar/variables.json` for the current user.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "cmdvar")
            .map(|dirs| dirs.data_dir().join("variables.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn flush(&self, vars: &BTreeMap<String, Value>) -> Result<(), StoreError> {
        let text = encode(vars)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, text.as_bytes()))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[async_trait]
impl Store for JsonFileStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        check_path(path)?;
        Ok(self.vars.read().await.get(path).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        check_path(path)?;
        let value = value.into_persisted();
        // Reject unencodable values before touching the map.
        to_json(path, &value)?;
        let mut vars = self.vars.write().await;
        let mut next = vars.clone();
        next.insert(path.to_owned(), value);
        self.flush(&next).await?;
        *vars = next;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        check_path(path)?;
        let mut vars = self.vars.write().await;
        if !vars.contains_key(path) {
            return Ok(());
        }
        let mut next = vars.clone();
        next.remove(path);
        self.flush(&next).await?;
        *vars = next;
        Ok(())
    }
}

// ── Encoding ──────────────────────────────────────────────────────────────────

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

fn encode(vars: &BTreeMap<String, Value>) -> Result<String, StoreError> {
    let mut map = Map::new();
    for (path, value) in vars {
        map.insert(path.clone(), to_json(path, value)?);
    }
    Ok(serde_json::to_string_pretty(&Json::Object(map))?)
}

fn decode(text: &str) -> Result<BTreeMap<String, Value>, StoreError> {
    let Json::Object(map) = serde_json::from_str::<Json>(text)? else {
        return Err(StoreError::Unsupported {
            path: String::new(),
            reason: "store document is not a JSON object".into(),
        });
    };
    map.into_iter()
        .map(|(path, json)| {
            let value = from_json(&path, json)?;
            Ok((path, value))
        })
        .collect()
}

/// Integral values are written without a fraction (`3`, not `3.0`).
fn number(path: &str, n: f64) -> Result<Json, StoreError> {
    const EXACT: f64 = 9_007_199_254_740_992.0;
    if n.fract() == 0.0 && n.abs() < EXACT {
        return Ok(Json::Number(Number::from(n as i64)));
    }
    Number::from_f64(n).map(Json::Number).ok_or_else(|| StoreError::Unsupported {
        path: path.to_owned(),
        reason: format!("{n} is not a finite number"),
    })
}

fn to_json(path: &str, value: &Value) -> Result<Json, StoreError> {
    Ok(match value {
        Value::String(s) => Json::String(s.clone()),
        Value::Number(n) => number(path, *n)?,
        Value::Sequence(items) | Value::UniqueSet(items) => Json::Array(
            items
                .iter()
                .map(|item| match item {
                    Scalar::String(s) => Ok(Json::String(s.clone())),
                    Scalar::Number(n) => number(path, *n),
                })
                .collect::<Result<_, _>>()?,
        ),
    })
}

fn from_json(path: &str, json: Json) -> Result<Value, StoreError> {
    let unsupported = |what: &str| StoreError::Unsupported {
        path: path.to_owned(),
        reason: format!("{what} values are not supported"),
    };
    match json {
        Json::String(s) => Ok(Value::String(s)),
        Json::Number(n) => n.as_f64().map(Value::Number).ok_or_else(|| unsupported("number")),
        Json::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Json::String(s) => Ok(Scalar::String(s)),
                Json::Number(n) => n.as_f64().map(Scalar::Number).ok_or_else(|| unsupported("number")),
                _ => Err(unsupported("nested")),
            })
            .collect::<Result<_, _>>()
            .map(Value::Sequence),
        Json::Bool(_) => Err(unsupported("boolean")),
        Json::Null => Err(unsupported("null")),
        Json::Object(_) => Err(unsupported("object")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("vars.json")).await.unwrap();
        assert_eq!(store.get("variables/x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("vars.json");
        {
            let store = JsonFileStore::open(&path).await.unwrap();
            store.set("variables/n", Value::Number(5.0)).await.unwrap();
            store.set("variables/s", "hello".into()).await.unwrap();
            store
                .set(
                    "variables/set",
                    Value::UniqueSet(vec!["a".into(), 1.0.into(), "a".into()]),
                )
                .await
                .unwrap();
        }
        let store = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(store.get("variables/n").await.unwrap(), Some(Value::Number(5.0)));
        assert_eq!(store.get("variables/s").await.unwrap(), Some("hello".into()));
        assert_eq!(
            store.get("variables/set").await.unwrap(),
            Some(Value::Sequence(vec!["a".into(), 1.0.into()]))
        );
    }

    #[tokio::test]
    async fn remove_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vars.json");
        let store = JsonFileStore::open(&path).await.unwrap();
        store.set("variables/x", "1".into()).await.unwrap();
        store.remove("variables/x").await.unwrap();
        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("variables/x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn non_finite_numbers_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("vars.json")).await.unwrap();
        let err = store.set("variables/x", Value::Number(f64::NAN)).await;
        assert!(matches!(err, Err(StoreError::Unsupported { .. })));
        assert_eq!(store.get("variables/x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn failed_write_leaves_map_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        let store = JsonFileStore::open(blocker.join("vars.json")).await.unwrap();
        store.set("variables/kept", "1".into()).await.unwrap();

        // Turn the parent directory into a plain file so every write fails.
        std::fs::remove_dir_all(&blocker).unwrap();
        std::fs::write(&blocker, "").unwrap();

        assert!(store.set("variables/n", Value::Number(5.0)).await.is_err());
        assert_eq!(store.get("variables/n").await.unwrap(), None);

        assert!(store.remove("variables/kept").await.is_err());
        assert_eq!(store.get("variables/kept").await.unwrap(), Some("1".into()));
    }

    #[tokio::test]
    async fn unsupported_document_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vars.json");
        std::fs::write(&path, r#"{"variables/x": true}"#).unwrap();
        assert!(JsonFileStore::open(&path).await.is_err());
        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(JsonFileStore::open(&path).await.is_err());
    }
}
