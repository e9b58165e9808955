// crates/ctxmem-server/src/store/mod.rs
// Append-only per-context message log + metadata/summary files (spec §4.2).

use crate::error::{CtxError, Result};
use ctxmem_types::{Message, Metadata, Summary};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Replace characters that are unsafe as a single path segment. Collisions
/// on distinct ids that sanitize to the same segment are a documented hazard
/// (spec §6) -- not guarded against here.
///
/// TODO: hash the raw id into the filename, or keep a reverse lookup, if
/// strict uniqueness across colliding ids is ever required.
pub fn sanitize_context_id(id: &str) -> String {
    if id.is_empty() {
        return "empty_segment".to_string();
    }
    let replaced: String = id
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect();
    let collapsed = replaced.replace("..", "_");
    if collapsed.is_empty() {
        "empty_segment".to_string()
    } else {
        collapsed
    }
}

/// Append-only message log plus atomic metadata/summary persistence for
/// every context under a single base directory.
pub struct MessageStore {
    base_dir: PathBuf,
}

impl MessageStore {
    pub async fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        tokio::fs::create_dir_all(&base_dir).await?;
        Ok(Self { base_dir })
    }

    fn messages_path(&self, ctx: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.messages.jsonl", sanitize_context_id(ctx)))
    }

    fn metadata_path(&self, ctx: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.metadata.json", sanitize_context_id(ctx)))
    }

    fn summary_path(&self, ctx: &str) -> PathBuf {
        self.base_dir
            .join(format!("{}.summary.json", sanitize_context_id(ctx)))
    }

    /// Append a message record, flushing before return. The log is opened
    /// in append mode so concurrent appends to distinct contexts never
    /// contend on the same file handle.
    pub async fn append(&self, msg: &Message) -> Result<()> {
        let path = self.messages_path(&msg.context_id);
        let mut line = serde_json::to_string(msg)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Load all messages for a context. A log whose last line is not valid
    /// JSON is truncated to the last newline (crash recovery, §4.2).
    pub async fn load_messages(&self, ctx: &str) -> Result<Vec<Message>> {
        let path = self.messages_path(ctx);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut messages = Vec::new();
        let lines: Vec<&str> = contents.lines().collect();
        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(line) {
                Ok(m) => messages.push(m),
                Err(e) => {
                    if i == lines.len() - 1 {
                        warn!(ctx, "truncating corrupt final message line on load: {e}");
                    } else {
                        return Err(CtxError::IndexCorrupt(format!(
                            "corrupt message line {i} for context {ctx}: {e}"
                        )));
                    }
                }
            }
        }
        Ok(messages)
    }

    pub async fn load_metadata(&self, ctx: &str) -> Result<Option<Metadata>> {
        read_json_opt(&self.metadata_path(ctx)).await
    }

    pub async fn save_metadata(&self, meta: &Metadata) -> Result<()> {
        write_json_atomic(&self.metadata_path(&meta.context_id), meta).await
    }

    pub async fn load_summary(&self, ctx: &str) -> Result<Option<Summary>> {
        read_json_opt(&self.summary_path(ctx)).await
    }

    pub async fn save_summary(&self, summary: &Summary) -> Result<()> {
        write_json_atomic(&self.summary_path(&summary.context_id), summary).await
    }

    /// Delete all files for a context. Metadata is removed last so that a
    /// crash mid-deletion still leaves `invariant 1` (message file implies
    /// metadata file) observable as "fully present", never "half gone".
    pub async fn delete(&self, ctx: &str) -> Result<bool> {
        let messages = self.messages_path(ctx);
        let summary = self.summary_path(ctx);
        let metadata = self.metadata_path(ctx);

        let existed = metadata.exists() || messages.exists();

        for path in [&messages, &summary] {
            if let Err(e) = tokio::fs::remove_file(path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(e.into());
                }
            }
        }
        if let Err(e) = tokio::fs::remove_file(&metadata).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(e.into());
            }
        }

        debug!(ctx, existed, "deleted context from message store");
        Ok(existed)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

async fn read_json_opt<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write-tmp-then-rename: the rename is the durability point, so a crash
/// mid-write never corrupts the previous version of the file.
async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    let contents = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(&tmp_path, &contents).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxmem_types::Role;

    fn msg(ctx: &str, content: &str, ts: i64) -> Message {
        Message {
            context_id: ctx.to_string(),
            role: Role::User,
            content: content.to_string(),
            timestamp: ts,
            importance: 0.5,
            tags: Default::default(),
        }
    }

    #[tokio::test]
    async fn append_and_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path()).await.unwrap();
        store.append(&msg("c1", "hello", 1)).await.unwrap();
        store.append(&msg("c1", "world", 2)).await.unwrap();

        let loaded = store.load_messages("c1").await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].content, "hello");
        assert_eq!(loaded[1].content, "world");
    }

    #[tokio::test]
    async fn missing_context_loads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path()).await.unwrap();
        assert!(store.load_messages("nope").await.unwrap().is_empty());
        assert!(store.load_metadata("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_final_line_is_truncated_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path()).await.unwrap();
        store.append(&msg("c1", "first", 1)).await.unwrap();
        store.append(&msg("c1", "second", 2)).await.unwrap();

        let path = dir.path().join("c1.messages.jsonl");
        let mut contents = tokio::fs::read_to_string(&path).await.unwrap();
        contents.push_str("{\"incomplete\":"); // partial write, no trailing newline
        tokio::fs::write(&path, contents).await.unwrap();

        let loaded = store.load_messages("c1").await.unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[tokio::test]
    async fn metadata_write_is_atomic_rename() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path()).await.unwrap();
        let meta = Metadata::new("c1", 100);
        store.save_metadata(&meta).await.unwrap();

        let loaded = store.load_metadata("c1").await.unwrap().unwrap();
        assert_eq!(loaded.context_id, "c1");
        assert!(!dir.path().join("c1.metadata.json.tmp").exists());
    }

    #[tokio::test]
    async fn delete_removes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = MessageStore::new(dir.path()).await.unwrap();
        store.append(&msg("c1", "hello", 1)).await.unwrap();
        store.save_metadata(&Metadata::new("c1", 1)).await.unwrap();

        let existed = store.delete("c1").await.unwrap();
        assert!(existed);
        assert!(store.load_messages("c1").await.unwrap().is_empty());
        assert!(store.load_metadata("c1").await.unwrap().is_none());
    }

    #[test]
    fn sanitize_replaces_forbidden_characters() {
        assert_eq!(sanitize_context_id("a/b\\c:d"), "a_b_c_d");
        assert_eq!(sanitize_context_id(""), "empty_segment");
        assert_eq!(sanitize_context_id("../etc/passwd"), "_/etc/passwd".replace('/', "_"));
    }
}
