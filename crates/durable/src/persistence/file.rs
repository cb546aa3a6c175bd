//! File-backed implementation of WorkflowEventStore
//!
//! Each workflow lives in its own JSON Lines file, `<dir>/<workflow_id>.jsonl`.
//! The first line records creation; every later line is an appended event or
//! a status change. Nothing is ever rewritten in place.
//!
//! # Durability
//!
//! Every record is followed by `sync_all()` before the call returns, and the
//! directory is synced after a new file is created.
//!
//! # Recovery
//!
//! [`FileWorkflowEventStore::open`] reads every log in the directory. A final
//! line that does not parse (a crash mid-write) is truncated, so each log is
//! always a valid prefix of what was written.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::store::*;
use crate::workflow::{WorkflowError, WorkflowEvent};

const LOG_EXTENSION: &str = "jsonl";

/// One line of a workflow log file
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum LogRecord {
    Created {
        workflow_type: String,
        input: serde_json::Value,
        at: DateTime<Utc>,
    },
    Event {
        sequence: i32,
        event: WorkflowEvent,
        at: DateTime<Utc>,
    },
    Status {
        status: WorkflowStatus,
        result: Option<serde_json::Value>,
        error: Option<WorkflowError>,
        at: DateTime<Utc>,
    },
}

/// Open log file plus the state rebuilt from it
struct WorkflowLog {
    file: File,
    info: WorkflowInfo,
    events: Vec<WorkflowEvent>,
}

impl WorkflowLog {
    fn write_record(&mut self, record: &LogRecord) -> Result<(), StoreError> {
        let line = serde_json::to_string(record)?;
        writeln!(self.file, "{line}")?;
        self.file.sync_all()?;
        Ok(())
    }
}

/// Durable store keeping one append-only JSON Lines file per workflow
pub struct FileWorkflowEventStore {
    dir: PathBuf,
    workflows: Mutex<HashMap<String, WorkflowLog>>,
}

impl FileWorkflowEventStore {
    /// Open (or create) a store rooted at `dir`, loading every existing log
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut workflows = HashMap::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
                continue;
            }
            let Some(workflow_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let workflow_id = workflow_id.to_string();

            match load_log(&path, &workflow_id)? {
                Some(log) => {
                    workflows.insert(workflow_id, log);
                }
                None => {
                    // Crashed before the creation record reached disk
                    warn!(path = %path.display(), "removing workflow log without creation record");
                    fs::remove_file(&path)?;
                }
            }
        }

        info!(dir = %dir.display(), workflows = workflows.len(), "opened workflow store");

        Ok(Self {
            dir,
            workflows: Mutex::new(workflows),
        })
    }

    /// Directory holding the workflow logs
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn log_path(&self, workflow_id: &str) -> Result<PathBuf, StoreError> {
        validate_workflow_id(workflow_id)?;
        Ok(self.dir.join(format!("{workflow_id}.{LOG_EXTENSION}")))
    }
}

/// Ids become file names, so keep them to a portable character set
fn validate_workflow_id(workflow_id: &str) -> Result<(), StoreError> {
    let valid = !workflow_id.is_empty()
        && !workflow_id.starts_with('.')
        && workflow_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidWorkflowId(workflow_id.to_string()))
    }
}

/// Rebuild one workflow from its log, truncating a torn final line
///
/// Returns `None` when the file holds no creation record.
fn load_log(path: &Path, workflow_id: &str) -> Result<Option<WorkflowLog>, StoreError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    let mut valid_len: u64 = 0;
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            break;
        }

        // A line without its newline was never fully written
        if !line.ends_with('\n') {
            break;
        }

        let trimmed = line.trim();
        if !trimmed.is_empty() {
            match serde_json::from_str::<LogRecord>(trimmed) {
                Ok(record) => records.push(record),
                Err(_) => break,
            }
        }
        valid_len += bytes_read as u64;
    }

    let file_len = fs::metadata(path)?.len();
    if valid_len < file_len {
        warn!(
            path = %path.display(),
            kept = valid_len,
            dropped = file_len - valid_len,
            "truncating incomplete workflow log tail"
        );
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(valid_len)?;
        file.sync_all()?;
    }

    let mut records = records.into_iter();
    let Some(LogRecord::Created {
        workflow_type,
        input,
        at,
    }) = records.next()
    else {
        return Ok(None);
    };

    let mut info = WorkflowInfo {
        id: workflow_id.to_string(),
        workflow_type,
        status: WorkflowStatus::Pending,
        input,
        result: None,
        error: None,
        created_at: at,
        updated_at: at,
    };
    let mut events = Vec::new();

    for record in records {
        match record {
            LogRecord::Event { sequence, event, at } => {
                if sequence != events.len() as i32 {
                    return Err(StoreError::Serialization(format!(
                        "{}: event sequence {} out of order (expected {})",
                        path.display(),
                        sequence,
                        events.len()
                    )));
                }
                events.push(event);
                info.updated_at = at;
            }
            LogRecord::Status {
                status,
                result,
                error,
                at,
            } => {
                info.status = status;
                info.result = result;
                info.error = error;
                info.updated_at = at;
            }
            LogRecord::Created { .. } => {
                return Err(StoreError::Serialization(format!(
                    "{}: duplicate creation record",
                    path.display()
                )));
            }
        }
    }

    let file = OpenOptions::new().append(true).open(path)?;
    debug!(%workflow_id, events = events.len(), status = %info.status, "loaded workflow log");

    Ok(Some(WorkflowLog { file, info, events }))
}

fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}

#[async_trait]
impl WorkflowEventStore for FileWorkflowEventStore {
    async fn create_workflow(
        &self,
        workflow_id: &str,
        workflow_type: &str,
        input: serde_json::Value,
    ) -> Result<(), StoreError> {
        let path = self.log_path(workflow_id)?;
        let mut workflows = self.workflows.lock();
        if workflows.contains_key(workflow_id) {
            return Err(StoreError::WorkflowAlreadyExists(workflow_id.to_string()));
        }

        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => {
                    StoreError::WorkflowAlreadyExists(workflow_id.to_string())
                }
                _ => StoreError::Io(e),
            })?;
        sync_dir(&self.dir)?;

        let now = Utc::now();
        let mut log = WorkflowLog {
            file,
            info: WorkflowInfo {
                id: workflow_id.to_string(),
                workflow_type: workflow_type.to_string(),
                status: WorkflowStatus::Pending,
                input: input.clone(),
                result: None,
                error: None,
                created_at: now,
                updated_at: now,
            },
            events: vec![],
        };
        log.write_record(&LogRecord::Created {
            workflow_type: workflow_type.to_string(),
            input,
            at: now,
        })?;

        workflows.insert(workflow_id.to_string(), log);
        Ok(())
    }

    async fn get_workflow_info(&self, workflow_id: &str) -> Result<WorkflowInfo, StoreError> {
        self.workflows
            .lock()
            .get(workflow_id)
            .map(|log| log.info.clone())
            .ok_or_else(|| StoreError::WorkflowNotFound(workflow_id.to_string()))
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowInfo>, StoreError> {
        let mut infos: Vec<WorkflowInfo> = self
            .workflows
            .lock()
            .values()
            .map(|log| log.info.clone())
            .collect();
        infos.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(infos)
    }

    async fn update_workflow_status(
        &self,
        workflow_id: &str,
        status: WorkflowStatus,
        result: Option<serde_json::Value>,
        error: Option<WorkflowError>,
    ) -> Result<(), StoreError> {
        let mut workflows = self.workflows.lock();
        let log = workflows
            .get_mut(workflow_id)
            .ok_or_else(|| StoreError::WorkflowNotFound(workflow_id.to_string()))?;

        let now = Utc::now();
        log.write_record(&LogRecord::Status {
            status,
            result: result.clone(),
            error: error.clone(),
            at: now,
        })?;

        log.info.status = status;
        log.info.result = result;
        log.info.error = error;
        log.info.updated_at = now;
        Ok(())
    }

    async fn append_events(
        &self,
        workflow_id: &str,
        expected_sequence: i32,
        events: Vec<WorkflowEvent>,
    ) -> Result<i32, StoreError> {
        let mut workflows = self.workflows.lock();
        let log = workflows
            .get_mut(workflow_id)
            .ok_or_else(|| StoreError::WorkflowNotFound(workflow_id.to_string()))?;

        let current_sequence = log.events.len() as i32;
        if current_sequence != expected_sequence {
            return Err(StoreError::ConcurrencyConflict {
                expected: expected_sequence,
                actual: current_sequence,
            });
        }

        let now = Utc::now();
        for event in events {
            let sequence = log.events.len() as i32;
            log.write_record(&LogRecord::Event {
                sequence,
                event: event.clone(),
                at: now,
            })?;
            log.events.push(event);
        }
        log.info.updated_at = now;

        Ok(log.events.len() as i32)
    }

    async fn load_events(
        &self,
        workflow_id: &str,
    ) -> Result<Vec<(i32, WorkflowEvent)>, StoreError> {
        let workflows = self.workflows.lock();
        let log = workflows
            .get(workflow_id)
            .ok_or_else(|| StoreError::WorkflowNotFound(workflow_id.to_string()))?;

        Ok(log
            .events
            .iter()
            .enumerate()
            .map(|(i, e)| (i as i32, e.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn started() -> WorkflowEvent {
        WorkflowEvent::WorkflowStarted {
            input: json!({"n": 1}),
        }
    }

    #[tokio::test]
    async fn test_events_survive_reopen() {
        let dir = tempdir().unwrap();

        {
            let store = FileWorkflowEventStore::open(dir.path()).unwrap();
            store
                .create_workflow("cadence-1", "cadence", json!({"n": 1}))
                .await
                .unwrap();
            store
                .append_events("cadence-1", 0, vec![started()])
                .await
                .unwrap();
            store
                .update_workflow_status("cadence-1", WorkflowStatus::Running, None, None)
                .await
                .unwrap();
        }

        let store = FileWorkflowEventStore::open(dir.path()).unwrap();
        let info = store.get_workflow_info("cadence-1").await.unwrap();
        assert_eq!(info.workflow_type, "cadence");
        assert_eq!(info.status, WorkflowStatus::Running);
        assert_eq!(info.input, json!({"n": 1}));

        let events = store.load_events("cadence-1").await.unwrap();
        assert_eq!(events, vec![(0, started())]);

        // Sequence continues where the previous process stopped
        let seq = store
            .append_events(
                "cadence-1",
                1,
                vec![WorkflowEvent::TimerFired {
                    timer_id: "wait-0".into(),
                }],
            )
            .await
            .unwrap();
        assert_eq!(seq, 2);
    }

    #[tokio::test]
    async fn test_torn_tail_is_truncated() {
        let dir = tempdir().unwrap();

        {
            let store = FileWorkflowEventStore::open(dir.path()).unwrap();
            store.create_workflow("wf", "t", json!({})).await.unwrap();
            store.append_events("wf", 0, vec![started()]).await.unwrap();
        }

        let path = dir.path().join("wf.jsonl");
        let intact_len = fs::metadata(&path).unwrap().len();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            write!(file, "{{\"record\":\"event\",\"sequence\":1,\"ev").unwrap();
        }

        let store = FileWorkflowEventStore::open(dir.path()).unwrap();
        assert_eq!(store.load_events("wf").await.unwrap().len(), 1);
        assert_eq!(fs::metadata(&path).unwrap().len(), intact_len);

        // The log accepts appends again after truncation
        store
            .append_events(
                "wf",
                1,
                vec![WorkflowEvent::TimerFired {
                    timer_id: "t".into(),
                }],
            )
            .await
            .unwrap();
        drop(store);

        let store = FileWorkflowEventStore::open(dir.path()).unwrap();
        assert_eq!(store.load_events("wf").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let dir = tempdir().unwrap();
        let store = FileWorkflowEventStore::open(dir.path()).unwrap();

        store.create_workflow("wf", "t", json!({})).await.unwrap();
        let result = store.create_workflow("wf", "t", json!({})).await;

        assert!(matches!(result, Err(StoreError::WorkflowAlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_concurrency_conflict() {
        let dir = tempdir().unwrap();
        let store = FileWorkflowEventStore::open(dir.path()).unwrap();
        store.create_workflow("wf", "t", json!({})).await.unwrap();

        let result = store.append_events("wf", 3, vec![started()]).await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict {
                expected: 3,
                actual: 0
            })
        ));
    }

    #[tokio::test]
    async fn test_invalid_ids_rejected() {
        let dir = tempdir().unwrap();
        let store = FileWorkflowEventStore::open(dir.path()).unwrap();

        for id in ["", "../escape", ".hidden", "a/b", "with space"] {
            let result = store.create_workflow(id, "t", json!({})).await;
            assert!(
                matches!(result, Err(StoreError::InvalidWorkflowId(_))),
                "{id:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_list_workflows() {
        let dir = tempdir().unwrap();
        let store = FileWorkflowEventStore::open(dir.path()).unwrap();
        store.create_workflow("a", "t", json!({})).await.unwrap();
        store.create_workflow("b", "t", json!({})).await.unwrap();

        let ids: Vec<String> = store
            .list_workflows()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"a".to_string()));
        assert!(ids.contains(&"b".to_string()));
    }

    #[test]
    fn test_log_without_creation_record_is_removed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orphan.jsonl");
        fs::write(&path, b"{\"record\":\"crea").unwrap();

        let store = FileWorkflowEventStore::open(dir.path()).unwrap();
        assert!(store.workflows.lock().is_empty());
        assert!(!path.exists());
    }
}
