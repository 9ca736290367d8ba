//! Endpoint persistence over a [`KvStore`].
//!
//! # Responsibilities
//! - Encode records as JSON at `{prefix}/service/{id}`
//! - Maintain the `{prefix}/tags/{tag}/{id}` reverse index
//! - Apply field-masked patches
//!
//! # Design Decisions
//! - No multi-key transaction is assumed: detail key first, then index entries
//! - An empty stored value means "not found", distinct from a store failure
//! - Tags cannot be enumerated from the index, so deletes read the record first

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};

use crate::endpoint::id::SnowflakeGenerator;
use crate::endpoint::model::{validate_key, Endpoint, NewEndpoint, IMMUTABLE_FIELDS};
use crate::error::{Error, ErrorKind, Result};
use crate::kv::{KvStore, Revision, WatchStream};
use crate::observability::metrics::ENDPOINTS_WRITTEN_TOTAL;

/// Fields a patch may name in its mask.
const PATCHABLE_FIELDS: [&str; 7] = [
    "name",
    "service_name",
    "description",
    "tags",
    "balance",
    "endpoints",
    "descriptor_set",
];

/// Typed access to endpoint records and their tag index.
#[derive(Clone)]
pub struct EndpointStore {
    kv: Arc<dyn KvStore>,
    prefix: String,
    ids: Arc<SnowflakeGenerator>,
}

impl EndpointStore {
    pub fn new(kv: Arc<dyn KvStore>, prefix: impl Into<String>) -> Self {
        Self::with_ids(kv, prefix, Arc::new(SnowflakeGenerator::default()))
    }

    pub fn with_ids(
        kv: Arc<dyn KvStore>,
        prefix: impl Into<String>,
        ids: Arc<SnowflakeGenerator>,
    ) -> Self {
        Self {
            kv,
            prefix: prefix.into().trim_end_matches('/').to_string(),
            ids,
        }
    }

    /// Prefix watched by the reconciler.
    pub fn service_prefix(&self) -> String {
        format!("{}/service/", self.prefix)
    }

    pub fn detail_key(&self, id: &str) -> String {
        format!("{}/service/{}", self.prefix, id)
    }

    fn tag_prefix(&self, tag: &str) -> String {
        format!("{}/tags/{}/", self.prefix, tag)
    }

    fn tag_key(&self, tag: &str, id: &str) -> String {
        format!("{}{}", self.tag_prefix(tag), id)
    }

    /// Id component of a detail key.
    pub fn id_from_detail_key<'a>(&self, detail_key: &'a str) -> Option<&'a str> {
        detail_key
            .strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix("/service/"))
            .filter(|id| !id.is_empty())
    }

    /// AddConfig: assign identity, validate and persist a new record.
    pub async fn add_config(&self, new: NewEndpoint) -> Result<Endpoint> {
        let key = self.ids.next_id().to_string();
        let endpoint = new.into_endpoint(key, Utc::now());
        endpoint.validate().map_err(|e| e.within("endpoint.add_config"))?;
        self.put(&endpoint)
            .await
            .map_err(|e| e.within("endpoint.add_config"))?;
        metrics::counter!(ENDPOINTS_WRITTEN_TOTAL, "op" => "add_config").increment(1);
        tracing::info!(key = %endpoint.key, name = %endpoint.name, "Endpoint created");
        Ok(endpoint)
    }

    /// Write the detail record, then one index entry per tag. Index entries
    /// for tags only the replaced record carried are removed last.
    pub async fn put(&self, endpoint: &Endpoint) -> Result<()> {
        const OP: &str = "endpoint.put";
        validate_key(&endpoint.key).map_err(|e| e.within(OP))?;
        let detail_key = self.detail_key(&endpoint.key);
        let value = serde_json::to_vec(endpoint)
            .map_err(|e| Error::schema(OP, format!("encode {detail_key}: {e}")))?;

        let previous_tags = match self.get_by_detail_key(&detail_key).await {
            Ok(previous) => previous.tags,
            Err(e) if e.is_not_found() || matches!(e.kind(), ErrorKind::Schema(_)) => BTreeSet::new(),
            Err(e) => return Err(e.within(OP)),
        };

        self.kv.put(&detail_key, value).await.map_err(|e| e.within(OP))?;
        for tag in &endpoint.tags {
            self.kv
                .put(&self.tag_key(tag, &endpoint.key), detail_key.clone().into_bytes())
                .await
                .map_err(|e| e.within(OP))?;
        }
        self.drop_stale_tags(&endpoint.key, &previous_tags, &endpoint.tags)
            .await
            .map_err(|e| e.within(OP))
    }

    /// Point read by id.
    pub async fn get(&self, id: &str) -> Result<Endpoint> {
        validate_key(id).map_err(|e| e.within("endpoint.get"))?;
        self.get_by_detail_key(&self.detail_key(id))
            .await
            .map_err(|e| e.within("endpoint.get"))
    }

    async fn get_by_detail_key(&self, detail_key: &str) -> Result<Endpoint> {
        const OP: &str = "endpoint.get";
        let stored = self.kv.get(detail_key).await.map_err(|e| e.within(OP))?;
        match stored {
            Some(kv) if !kv.value.is_empty() => decode(OP, detail_key, &kv.value),
            _ => Err(Error::not_found(OP, detail_key)),
        }
    }

    /// Subscribe to changes of detail records.
    pub async fn watch(&self, from_revision: Revision) -> Result<WatchStream> {
        self.kv
            .watch(&self.service_prefix(), from_revision)
            .await
            .map_err(|e| e.within("endpoint.watch"))
    }

    pub async fn current_revision(&self) -> Result<Revision> {
        self.kv
            .current_revision()
            .await
            .map_err(|e| e.within("endpoint.current_revision"))
    }

    /// Batch read by detail key. Fails on the first missing record.
    pub async fn list(&self, detail_keys: &[String]) -> Result<Vec<Endpoint>> {
        let mut endpoints = Vec::with_capacity(detail_keys.len());
        for key in detail_keys {
            endpoints.push(
                self.get_by_detail_key(key)
                    .await
                    .map_err(|e| e.within("endpoint.list"))?,
            );
        }
        Ok(endpoints)
    }

    /// Records referenced by any of `tags`. Index entries whose record is
    /// gone are skipped; store failures are not.
    pub async fn list_by_tags(&self, tags: &[String]) -> Result<Vec<Endpoint>> {
        const OP: &str = "endpoint.list_by_tags";
        let keys = self.get_keys_by_tags(tags).await.map_err(|e| e.within(OP))?;
        let mut endpoints = Vec::with_capacity(keys.len());
        for key in &keys {
            match self.get_by_detail_key(key).await {
                Ok(endpoint) => endpoints.push(endpoint),
                Err(e) if e.is_not_found() => {
                    tracing::debug!(key = %key, "Skipping dangling tag index entry");
                }
                Err(e) => return Err(e.within(OP)),
            }
        }
        Ok(endpoints)
    }

    /// Every stored record, skipping empty values.
    pub async fn list_all(&self) -> Result<Vec<Endpoint>> {
        const OP: &str = "endpoint.list_all";
        let entries = self
            .kv
            .get_prefix(&self.service_prefix())
            .await
            .map_err(|e| e.within(OP))?;
        entries
            .into_iter()
            .filter(|kv| !kv.value.is_empty())
            .map(|kv| decode(OP, &kv.key, &kv.value))
            .collect()
    }

    /// Union of detail keys referenced by any of `tags`.
    pub async fn get_keys_by_tags(&self, tags: &[String]) -> Result<BTreeSet<String>> {
        let mut keys = BTreeSet::new();
        for tag in tags {
            let entries = self
                .kv
                .get_prefix(&self.tag_prefix(tag))
                .await
                .map_err(|e| e.within("endpoint.get_keys_by_tags"))?;
            keys.extend(
                entries
                    .into_iter()
                    .filter_map(|kv| String::from_utf8(kv.value).ok())
                    .filter(|key| !key.is_empty()),
            );
        }
        Ok(keys)
    }

    /// Remove the record and every index entry derived from its tags.
    pub async fn del(&self, id: &str) -> Result<Endpoint> {
        const OP: &str = "endpoint.del";
        let endpoint = self.get(id).await.map_err(|e| e.within(OP))?;
        self.kv
            .delete(&self.detail_key(id))
            .await
            .map_err(|e| e.within(OP))?;
        for tag in &endpoint.tags {
            self.kv
                .delete(&self.tag_key(tag, id))
                .await
                .map_err(|e| e.within(OP))?;
        }
        tracing::info!(key = %id, "Endpoint deleted");
        Ok(endpoint)
    }

    /// Replace the tag set, rewriting the full index.
    pub async fn put_tags(&self, id: &str, tags: BTreeSet<String>) -> Result<Endpoint> {
        const OP: &str = "endpoint.put_tags";
        let mut endpoint = self.get(id).await.map_err(|e| e.within(OP))?;
        endpoint.tags = tags;
        endpoint.touch();
        endpoint.validate().map_err(|e| e.within(OP))?;
        self.put(&endpoint).await.map_err(|e| e.within(OP))?;
        Ok(endpoint)
    }

    /// Merge the fields named by `mask` from `fields` into the stored record.
    pub async fn patch(&self, id: &str, fields: &Map<String, Value>, mask: &[String]) -> Result<Endpoint> {
        const OP: &str = "endpoint.patch";
        if mask.is_empty() {
            return Err(Error::validation(OP, "field mask must not be empty"));
        }
        for field in mask {
            if IMMUTABLE_FIELDS.contains(&field.as_str()) {
                return Err(Error::conflict(OP, format!("field {field:?} is immutable")));
            }
            if !PATCHABLE_FIELDS.contains(&field.as_str()) {
                return Err(Error::validation(OP, format!("unknown field {field:?}")));
            }
            if !fields.contains_key(field) {
                return Err(Error::validation(
                    OP,
                    format!("field {field:?} is masked but has no value"),
                ));
            }
        }

        let current = self.get(id).await.map_err(|e| e.within(OP))?;
        let Value::Object(mut merged) = serde_json::to_value(&current)
            .map_err(|e| Error::schema(OP, e.to_string()))?
        else {
            return Err(Error::schema(OP, "endpoint did not encode as an object"));
        };
        for field in mask {
            if let Some(value) = fields.get(field) {
                merged.insert(field.clone(), value.clone());
            }
        }
        let mut updated: Endpoint = serde_json::from_value(Value::Object(merged))
            .map_err(|e| Error::validation(OP, format!("patched record is invalid: {e}")))?;
        updated.touch();
        updated.validate().map_err(|e| e.within(OP))?;

        self.put(&updated).await.map_err(|e| e.within(OP))?;
        metrics::counter!(ENDPOINTS_WRITTEN_TOTAL, "op" => "patch").increment(1);
        tracing::info!(key = %id, fields = ?mask, version = %updated.version, "Endpoint patched");
        Ok(updated)
    }

    async fn drop_stale_tags(
        &self,
        id: &str,
        previous: &BTreeSet<String>,
        current: &BTreeSet<String>,
    ) -> Result<()> {
        for tag in previous.difference(current) {
            self.kv.delete(&self.tag_key(tag, id)).await?;
        }
        Ok(())
    }
}

fn decode(op: &'static str, key: &str, value: &[u8]) -> Result<Endpoint> {
    serde_json::from_slice(value).map_err(|e| Error::schema(op, format!("decode {key}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::model::EndpointAddr;
    use crate::kv::MemoryStore;
    use serde_json::json;

    const PREFIX: &str = "/gateway/endpoints";

    fn store() -> (Arc<MemoryStore>, EndpointStore) {
        let kv = Arc::new(MemoryStore::new());
        (kv.clone(), EndpointStore::new(kv, PREFIX))
    }

    fn new_endpoint(tags: &[&str]) -> NewEndpoint {
        NewEndpoint {
            name: "echo".into(),
            service_name: "echo.v1.Echo".into(),
            description: "echo service".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            balance: "rr".into(),
            endpoints: vec![EndpointAddr::new("127.0.0.1:9000", 1)],
            descriptor_set: vec![10, 0],
        }
    }

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let (_, store) = store();
        let created = store.add_config(new_endpoint(&["a"])).await.unwrap();
        let fetched = store.get(&created.key).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_layout() {
        let (kv, store) = store();
        let created = store.add_config(new_endpoint(&["a"])).await.unwrap();
        let detail = format!("{PREFIX}/service/{}", created.key);
        assert!(kv.get(&detail).await.unwrap().is_some());
        let index = kv
            .get(&format!("{PREFIX}/tags/a/{}", created.key))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(index.value, detail.as_bytes());
        assert_eq!(store.id_from_detail_key(&detail), Some(created.key.as_str()));
    }

    #[tokio::test]
    async fn test_empty_value_is_not_found() {
        let (kv, store) = store();
        kv.put(&format!("{PREFIX}/service/7"), Vec::new()).await.unwrap();
        let err = store.get("7").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.op(), "endpoint.get");
    }

    #[tokio::test]
    async fn test_store_outage_is_transient() {
        let (kv, store) = store();
        kv.set_available(false);
        let err = store.get("7").await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TransientStore(_)));
    }

    #[tokio::test]
    async fn test_tag_index_follows_put_tags() {
        let (_, store) = store();
        let created = store.add_config(new_endpoint(&["a", "b"])).await.unwrap();
        let detail = store.detail_key(&created.key);

        store
            .put_tags(&created.key, ["b", "c"].iter().map(|t| t.to_string()).collect())
            .await
            .unwrap();

        assert!(store.get_keys_by_tags(&tags(&["a"])).await.unwrap().is_empty());
        assert!(store.get_keys_by_tags(&tags(&["b"])).await.unwrap().contains(&detail));
        assert!(store.get_keys_by_tags(&tags(&["c"])).await.unwrap().contains(&detail));
    }

    #[tokio::test]
    async fn test_get_keys_by_tags_is_a_union() {
        let (_, store) = store();
        let first = store.add_config(new_endpoint(&["a"])).await.unwrap();
        let second = store.add_config(new_endpoint(&["b"])).await.unwrap();

        let keys = store.get_keys_by_tags(&tags(&["a", "b"])).await.unwrap();
        assert_eq!(keys.len(), 2);
        let listed = store.list(&keys.into_iter().collect::<Vec<_>>()).await.unwrap();
        let mut ids: Vec<_> = listed.into_iter().map(|e| e.key).collect();
        ids.sort();
        let mut expected = vec![first.key, second.key];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_del_removes_record_and_index() {
        let (kv, store) = store();
        let created = store.add_config(new_endpoint(&["a", "b"])).await.unwrap();
        store.del(&created.key).await.unwrap();

        assert!(store.get(&created.key).await.unwrap_err().is_not_found());
        assert!(store.get_keys_by_tags(&tags(&["a", "b"])).await.unwrap().is_empty());
        assert!(kv.get_prefix(&format!("{PREFIX}/tags/")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_put_with_fewer_tags_drops_their_index_entries() {
        let (_, store) = store();
        let mut endpoint = store.add_config(new_endpoint(&["a", "b"])).await.unwrap();
        let detail = store.detail_key(&endpoint.key);

        endpoint.tags = ["a".to_string()].into_iter().collect();
        store.put(&endpoint).await.unwrap();

        assert!(store.get_keys_by_tags(&tags(&["b"])).await.unwrap().is_empty());
        assert!(store.get_keys_by_tags(&tags(&["a"])).await.unwrap().contains(&detail));
    }

    #[tokio::test]
    async fn test_list_by_tags_skips_dangling_index_entries() {
        let (kv, store) = store();
        let kept = store.add_config(new_endpoint(&["a"])).await.unwrap();
        let orphaned = store.add_config(new_endpoint(&["a"])).await.unwrap();
        // Detail key removed behind the store's back; the index entry stays.
        kv.delete(&store.detail_key(&orphaned.key)).await.unwrap();

        let listed = store.list_by_tags(&tags(&["a"])).await.unwrap();
        assert_eq!(listed, vec![kept]);

        kv.set_available(false);
        let err = store.list_by_tags(&tags(&["a"])).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TransientStore(_)));
        assert_eq!(err.op(), "endpoint.list_by_tags");
    }

    #[tokio::test]
    async fn test_patch_merges_masked_fields_only() {
        let (_, store) = store();
        let created = store.add_config(new_endpoint(&["a"])).await.unwrap();
        let fields = json!({
            "description": "patched",
            "name": "ignored because unmasked",
        });
        let patched = store
            .patch(&created.key, fields.as_object().unwrap(), &tags(&["description"]))
            .await
            .unwrap();

        assert_eq!(patched.description, "patched");
        assert_eq!(patched.name, "echo");
        assert_eq!(patched.key, created.key);
        assert_eq!(patched.created_at, created.created_at);
        assert!(patched.version.parse::<i64>().unwrap() > created.version.parse::<i64>().unwrap());
    }

    #[tokio::test]
    async fn test_patch_rejects_immutable_fields() {
        let (_, store) = store();
        let created = store.add_config(new_endpoint(&[])).await.unwrap();
        let fields = json!({ "key": "other" });
        let err = store
            .patch(&created.key, fields.as_object().unwrap(), &tags(&["key"]))
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Conflict(_)));
        assert_eq!(store.get(&created.key).await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_patch_tags_reindexes() {
        let (_, store) = store();
        let created = store.add_config(new_endpoint(&["a"])).await.unwrap();
        let fields = json!({ "tags": ["z"] });
        store
            .patch(&created.key, fields.as_object().unwrap(), &tags(&["tags"]))
            .await
            .unwrap();
        assert!(store.get_keys_by_tags(&tags(&["a"])).await.unwrap().is_empty());
        assert_eq!(store.get_keys_by_tags(&tags(&["z"])).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_patch_rejects_empty_endpoints() {
        let (_, store) = store();
        let created = store.add_config(new_endpoint(&[])).await.unwrap();
        let fields = json!({ "endpoints": [] });
        let err = store
            .patch(&created.key, fields.as_object().unwrap(), &tags(&["endpoints"]))
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Validation(_)));
    }

    #[tokio::test]
    async fn test_add_config_validates() {
        let (_, store) = store();
        let mut bad = new_endpoint(&[]);
        bad.balance = "fastest".into();
        let err = store.add_config(bad).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Validation(_)));
        assert!(store.list_all().await.unwrap().is_empty());
    }
}
