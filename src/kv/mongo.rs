//! MongoDB KV backend
//!
//! One collection of `{ _id: key, value, expiresAt }` documents. A TTL index on
//! `expiresAt` bounds storage, but the TTL monitor only runs about once a
//! minute, so every read also filters out documents whose expiry has passed.
//! `set_nx` relies on the unique `_id` index: an insert that hits duplicate key
//! error 11000 lost the race.

use async_trait::async_trait;
use bson::{doc, Document};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, IndexModel};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use super::KvStore;
use crate::clock::{system_clock, SharedClock};
use crate::types::{Result, VestibuleError};

const DUPLICATE_KEY: i32 = 11000;

/// Stored document
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KvDoc {
    #[serde(rename = "_id")]
    key: String,
    value: String,
    #[serde(rename = "expiresAt", default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<bson::DateTime>,
}

/// MongoDB-backed key-value store
#[derive(Clone)]
pub struct MongoKvStore {
    collection: Collection<KvDoc>,
    clock: SharedClock,
}

impl MongoKvStore {
    /// Connect, verify with a ping, and ensure the TTL index exists
    pub async fn connect(uri: &str, db_name: &str, collection: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // Avoid hanging on an unreachable server
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| VestibuleError::Internal(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| VestibuleError::Internal(format!("MongoDB ping failed: {}", e)))?;

        let store = Self {
            collection: client.database(db_name).collection::<KvDoc>(collection),
            clock: system_clock(),
        };
        store.apply_indexes().await?;

        info!("Connected to MongoDB database '{}' (collection '{}')", db_name, collection);
        Ok(store)
    }

    async fn apply_indexes(&self) -> Result<()> {
        let ttl_index = IndexModel::builder()
            .keys(doc! { "expiresAt": 1 })
            .options(
                IndexOptions::builder()
                    .expire_after(Duration::from_secs(0))
                    .name("expires_at_ttl".to_string())
                    .build(),
            )
            .build();

        self.collection
            .create_index(ttl_index)
            .await
            .map_err(|e| VestibuleError::Internal(format!("Failed to create indexes: {}", e)))?;
        Ok(())
    }

    fn now(&self) -> bson::DateTime {
        bson::DateTime::from_chrono(self.clock.now())
    }

    fn deadline(&self, ttl: Option<Duration>) -> Result<Option<bson::DateTime>> {
        match ttl {
            None => Ok(None),
            Some(ttl) => {
                let ttl = chrono::Duration::from_std(ttl)
                    .map_err(|e| VestibuleError::Internal(format!("TTL out of range: {}", e)))?;
                self.clock
                    .now()
                    .checked_add_signed(ttl)
                    .map(|at| Some(bson::DateTime::from_chrono(at)))
                    .ok_or_else(|| VestibuleError::Internal("TTL overflows clock".into()))
            }
        }
    }

    fn live_filter(&self, mut filter: Document) -> Document {
        filter.insert(
            "$or",
            vec![
                doc! { "expiresAt": null },
                doc! { "expiresAt": { "$gt": self.now() } },
            ],
        );
        filter
    }

    fn is_live(&self, doc: &KvDoc) -> bool {
        match doc.expires_at {
            Some(at) => at > self.now(),
            None => true,
        }
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// Escape regex metacharacters so a key prefix matches literally
pub(crate) fn escape_regex(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[async_trait]
impl KvStore for MongoKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let found = self
            .collection
            .find_one(self.live_filter(doc! { "_id": key }))
            .await?;
        Ok(found.map(|doc| doc.value))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let doc = KvDoc {
            key: key.to_string(),
            value: value.to_string(),
            expires_at: self.deadline(ttl)?,
        };
        self.collection
            .replace_one(doc! { "_id": key }, doc)
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        // Clear a logically expired document the TTL monitor has not reaped yet
        self.collection
            .delete_one(doc! { "_id": key, "expiresAt": { "$lte": self.now() } })
            .await?;

        let doc = KvDoc {
            key: key.to_string(),
            value: value.to_string(),
            expires_at: self.deadline(ttl)?,
        };
        match self.collection.insert_one(doc).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn del(&self, key: &str) -> Result<bool> {
        let removed = self
            .collection
            .find_one_and_delete(doc! { "_id": key })
            .await?;
        Ok(removed.map(|doc| self.is_live(&doc)).unwrap_or(false))
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let filter = self.live_filter(doc! {
            "_id": { "$regex": format!("^{}", escape_regex(prefix)) }
        });
        let docs: Vec<KvDoc> = self.collection.find(filter).await?.try_collect().await?;
        Ok(docs.into_iter().map(|doc| doc.key).collect())
    }

    async fn expires_at(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let found = self
            .collection
            .find_one(self.live_filter(doc! { "_id": key }))
            .await?;
        Ok(found.and_then(|doc| doc.expires_at).map(|at| at.to_chrono()))
    }
}

#[cfg(test)]
mod tests {
    // Store behaviour needs a running MongoDB; only pure helpers are tested here
    use super::*;

    #[test]
    fn test_escape_regex() {
        assert_eq!(escape_regex("pending:"), "pending:");
        assert_eq!(escape_regex("profile_name:a.b"), "profile_name:a\\.b");
        assert_eq!(escape_regex("x(1)+"), "x\\(1\\)\\+");
    }

    #[test]
    fn test_doc_omits_missing_expiry() {
        let doc = KvDoc {
            key: "profile:p1".into(),
            value: "{}".into(),
            expires_at: None,
        };
        let bson = bson::to_document(&doc).unwrap();
        assert_eq!(bson.get_str("_id").unwrap(), "profile:p1");
        assert!(!bson.contains_key("expiresAt"));
    }
}
