//! Forum atlas files.
//!
//! `<name>.csv` holds a header row (forum name, tag definitions as JSON,
//! default reaction, topic) followed by one row per thread (id, name,
//! locked 0/1, owner name, applied tag names as JSON). Each thread's own
//! records live in `<thread-id>.csv` in the same directory.

use chronicle_shared::atlas::{ForumAtlas, ForumHeader, ThreadDescriptor};
use chronicle_shared::error::CodecError;
use tracing::info;

use crate::error::{Result, StoreError};
use crate::store::{write_atomically, RecordStore};

impl RecordStore {
    /// Conventional atlas name for a forum.
    pub fn atlas_name(forum: impl std::fmt::Display) -> String {
        format!("{forum}_atlas")
    }

    pub fn write_atlas(&self, atlas: &ForumAtlas, name: &str) -> Result<()> {
        let path = self.file_path(name)?;
        write_atomically(&path, |writer| {
            let header = &atlas.header;
            writer.write_record([
                header.name.clone(),
                serde_json::to_string(&header.tags)?,
                header.default_reaction.clone().unwrap_or_default(),
                header.topic.clone().unwrap_or_default(),
            ])?;
            for thread in &atlas.threads {
                writer.write_record([
                    thread.id.to_string(),
                    thread.name.clone(),
                    if thread.locked { "1" } else { "0" }.to_string(),
                    thread.owner_name.clone(),
                    serde_json::to_string(&thread.applied_tags)?,
                ])?;
            }
            Ok(())
        })?;
        info!(file = %path.display(), threads = atlas.threads.len(), "wrote forum atlas");
        Ok(())
    }

    pub fn read_atlas(&self, name: &str) -> Result<ForumAtlas> {
        let path = self.file_path(name)?;
        if !path.exists() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        let file = path.display().to_string();
        let malformed = |row: usize, field: &'static str, reason: String| StoreError::Row {
            file: file.clone(),
            row,
            source: CodecError::Malformed { field, reason },
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&path)?;
        let mut rows = reader.records();

        let header_row = rows
            .next()
            .ok_or_else(|| malformed(0, "header", "empty atlas".into()))??;
        if header_row.len() != 4 {
            return Err(malformed(0, "header", format!("expected 4 columns, found {}", header_row.len())));
        }
        let header = ForumHeader {
            name: header_row[0].to_string(),
            tags: serde_json::from_str(&header_row[1])
                .map_err(|e| malformed(0, "tags", e.to_string()))?,
            default_reaction: non_empty(&header_row[2]),
            topic: non_empty(&header_row[3]),
        };

        let mut threads = Vec::new();
        for (index, row) in rows.enumerate() {
            let row = row?;
            let position = index + 1;
            if row.len() != 5 {
                return Err(malformed(position, "thread", format!("expected 5 columns, found {}", row.len())));
            }
            threads.push(ThreadDescriptor {
                id: row[0]
                    .parse()
                    .map_err(|_| malformed(position, "id", row[0].to_string()))?,
                name: row[1].to_string(),
                locked: &row[2] == "1",
                owner_name: row[3].to_string(),
                applied_tags: serde_json::from_str(&row[4])
                    .map_err(|e| malformed(position, "applied_tags", e.to_string()))?,
            });
        }

        Ok(ForumAtlas { header, threads })
    }
}

fn non_empty(raw: &str) -> Option<String> {
    (!raw.is_empty()).then(|| raw.to_string())
}
