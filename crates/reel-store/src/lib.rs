//! Filesystem task store
//!
//! One directory per task under a root:
//!
//! ```text
//! <root>/<task_id>/metadata.json
//! <root>/<task_id>/storyboard.json
//! ```
//!
//! Documents are pretty-printed JSON, written to a temporary sibling and
//! renamed into place so readers never observe a partial file.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

use async_trait::async_trait;
use reel_core::{BoxError, PersistenceStore, Storyboard, TaskId, TaskMetadata};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Metadata document name
pub const METADATA_FILE: &str = "metadata.json";
/// Storyboard document name
pub const STORYBOARD_FILE: &str = "storyboard.json";

/// Store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("task not found: {0}")]
    NotFound(TaskId),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// JSON-on-disk persistence
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Store rooted at `root` (usually the engine's tasks root)
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one task
    #[must_use]
    pub fn task_dir(&self, task_id: TaskId) -> PathBuf {
        self.root.join(task_id.to_string())
    }

    /// Load the metadata of a task
    ///
    /// # Errors
    /// `StoreError::NotFound` if the task has no metadata document
    pub async fn load_metadata(&self, task_id: TaskId) -> Result<TaskMetadata, StoreError> {
        self.read_document(task_id, METADATA_FILE).await
    }

    /// Load the storyboard of a task
    ///
    /// # Errors
    /// `StoreError::NotFound` if the task has no storyboard document
    pub async fn load_storyboard(&self, task_id: TaskId) -> Result<Storyboard, StoreError> {
        self.read_document(task_id, STORYBOARD_FILE).await
    }

    /// Metadata of every stored task, newest first
    ///
    /// Directories that are not task ids or hold no readable metadata are
    /// skipped.
    ///
    /// # Errors
    /// `StoreError::Io` if the root cannot be listed; a missing root is empty
    pub async fn list_tasks(&self) -> Result<Vec<TaskMetadata>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.root, e)),
        };

        let mut tasks = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.root, e))?
        {
            let Some(task_id) = entry
                .file_name()
                .to_str()
                .and_then(|name| name.parse::<TaskId>().ok())
            else {
                continue;
            };

            match self.load_metadata(task_id).await {
                Ok(metadata) => tasks.push(metadata),
                Err(StoreError::NotFound(_)) => {}
                Err(e) => tracing::warn!(%task_id, "Skipping unreadable task: {}", e),
            }
        }

        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn read_document<T: DeserializeOwned>(
        &self,
        task_id: TaskId,
        file: &str,
    ) -> Result<T, StoreError> {
        let path = self.task_dir(task_id).join(file);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(task_id));
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Json { path, source })
    }

    async fn write_document<T: Serialize + Sync>(
        &self,
        task_id: TaskId,
        file: &str,
        value: &T,
    ) -> Result<PathBuf, StoreError> {
        let dir = self.task_dir(task_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(&dir, e))?;

        let path = dir.join(file);
        let json = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;

        let tmp = dir.join(format!(".{file}.tmp"));
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;

        tracing::debug!(%task_id, path = %path.display(), "Document written");
        Ok(path)
    }
}

#[async_trait]
impl PersistenceStore for FsStore {
    async fn save_task_metadata(
        &self,
        task_id: TaskId,
        metadata: &TaskMetadata,
    ) -> Result<(), BoxError> {
        self.write_document(task_id, METADATA_FILE, metadata).await?;
        Ok(())
    }

    async fn save_storyboard(
        &self,
        task_id: TaskId,
        storyboard: &Storyboard,
    ) -> Result<(), BoxError> {
        self.write_document(task_id, STORYBOARD_FILE, storyboard).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use reel_core::{
        EngineSummary, FrameTemplate, JobParams, ResultSummary, StoryboardConfig,
        TtsInferenceMode, TtsSelection,
    };

    fn storyboard(task_id: TaskId) -> Storyboard {
        let template = FrameTemplate::parse(JobParams::DEFAULT_TEMPLATE).unwrap();
        let tts = TtsSelection {
            mode: TtsInferenceMode::Local,
            voice_id: Some("zh-CN-YunjianNeural".into()),
            workflow: None,
        };
        let config = StoryboardConfig::from_params(task_id, 2, &JobParams::new(), tts, &template);
        let narrations = vec!["one".to_string(), "two".to_string()];
        Storyboard::new("Title", config, &narrations, &[Some("p1".into()), Some("p2".into())])
    }

    fn metadata(task_id: TaskId, age_secs: i64) -> TaskMetadata {
        TaskMetadata {
            task_id,
            created_at: Utc::now() - Duration::seconds(age_secs),
            completed_at: Some(Utc::now()),
            status: "completed".to_string(),
            input: serde_json::json!({ "text": "topic", "title": "Title" }),
            result: ResultSummary {
                video_path: PathBuf::from("final.mp4"),
                duration: 12.5,
                file_size: 1024,
                n_frames: 2,
            },
            config: EngineSummary {
                llm_model: "model".to_string(),
                llm_base_url: "http://localhost".to_string(),
                media_service_url: "http://localhost:8188".to_string(),
                concurrent_backend_enabled: false,
            },
        }
    }

    #[tokio::test]
    async fn save_and_load_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let task_id = TaskId::new();

        store.save_task_metadata(task_id, &metadata(task_id, 0)).await.unwrap();
        store.save_storyboard(task_id, &storyboard(task_id)).await.unwrap();

        let loaded = store.load_metadata(task_id).await.unwrap();
        assert_eq!(loaded.task_id, task_id);
        assert_eq!(loaded.result.n_frames, 2);

        let board = store.load_storyboard(task_id).await.unwrap();
        assert_eq!(board.frames.len(), 2);
        assert_eq!(board.frames[1].image_prompt.as_deref(), Some("p2"));

        let task_dir = store.task_dir(task_id);
        assert!(task_dir.join(METADATA_FILE).is_file());
        assert!(!task_dir.join(format!(".{METADATA_FILE}.tmp")).exists());
    }

    #[tokio::test]
    async fn missing_task_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let task_id = TaskId::new();

        let err = store.load_metadata(task_id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == task_id));
    }

    #[tokio::test]
    async fn corrupt_document_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let task_id = TaskId::new();
        std::fs::create_dir_all(store.task_dir(task_id)).unwrap();
        std::fs::write(store.task_dir(task_id).join(METADATA_FILE), b"{not json").unwrap();

        let err = store.load_metadata(task_id).await.unwrap_err();
        assert!(matches!(err, StoreError::Json { .. }));
    }

    #[tokio::test]
    async fn list_tasks_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let older = TaskId::new();
        let newer = TaskId::new();

        store.save_task_metadata(older, &metadata(older, 60)).await.unwrap();
        store.save_task_metadata(newer, &metadata(newer, 0)).await.unwrap();
        std::fs::create_dir_all(dir.path().join("not-a-task")).unwrap();
        std::fs::create_dir_all(store.task_dir(TaskId::new())).unwrap();

        let tasks = store.list_tasks().await.unwrap();
        let ids: Vec<TaskId> = tasks.iter().map(|t| t.task_id).collect();
        assert_eq!(ids, vec![newer, older]);
    }

    #[tokio::test]
    async fn list_tasks_without_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().join("missing"));
        assert!(store.list_tasks().await.unwrap().is_empty());
    }
}
