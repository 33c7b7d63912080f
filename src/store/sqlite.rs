use std::path::Path;

use async_trait::async_trait;
use rusqlite::params;

use super::ItemStore;
use crate::db::{migrate, Db};
use crate::error::{MindOrbitError, Result};
use crate::models::{ItemType, KnowledgeItem};

/// Working set kept in a SQLite table, one row per item.
pub struct SqliteStore {
    db: Db,
}

/// Raw row before tag and type decoding.
struct ItemRow {
    id: String,
    item_type: String,
    content: String,
    title: String,
    summary: String,
    tags_json: String,
    category: String,
    created_at: i64,
}

impl ItemRow {
    fn decode(self) -> Result<KnowledgeItem> {
        Ok(KnowledgeItem {
            item_type: self.item_type.parse::<ItemType>()?,
            tags: serde_json::from_str(&self.tags_json)?,
            id: self.id,
            content: self.content,
            title: self.title,
            summary: self.summary,
            category: self.category,
            created_at: self.created_at,
        })
    }
}

impl SqliteStore {
    /// Open the database and apply pending migrations.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Db::new(path);
        db.with_connection(migrate::run_migrations).await?;
        Ok(Self { db })
    }
}

#[async_trait]
impl ItemStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn load(&self) -> Result<Vec<KnowledgeItem>> {
        let rows = self
            .db
            .with_connection(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, item_type, content, title, summary, tags_json, category, created_at \
                     FROM knowledge_items ORDER BY position",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(ItemRow {
                            id: row.get(0)?,
                            item_type: row.get(1)?,
                            content: row.get(2)?,
                            title: row.get(3)?,
                            summary: row.get(4)?,
                            tags_json: row.get(5)?,
                            category: row.get(6)?,
                            created_at: row.get(7)?,
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;
                Ok::<_, MindOrbitError>(rows)
            })
            .await?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.clone();
            match row.decode() {
                Ok(item) => items.push(item),
                Err(e) => log::warn!("Skipping unreadable stored item {}: {}", id, e),
            }
        }

        log::debug!("Loaded {} items from {}", items.len(), self.db.path().display());
        Ok(items)
    }

    async fn save(&self, items: &[KnowledgeItem]) -> Result<()> {
        let items = items.to_vec();
        let count = items.len();

        self.db
            .with_connection(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM knowledge_items", [])?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO knowledge_items \
                         (position, id, item_type, content, title, summary, tags_json, category, created_at) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    )?;
                    for (position, item) in items.iter().enumerate() {
                        stmt.execute(params![
                            position as i64,
                            item.id,
                            item.item_type.as_str(),
                            item.content,
                            item.title,
                            item.summary,
                            serde_json::to_string(&item.tags)?,
                            item.category,
                            item.created_at,
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;

        log::debug!("Saved {} items to {}", count, self.db.path().display());
        Ok(())
    }
}
