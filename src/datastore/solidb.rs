//! Remote datastore over the SoliDB REST API
//!
//! Each record kind maps to one collection (`<prefix><Kind>`). Parent keys
//! are stored alongside the properties so ancestor queries can be expressed
//! in SDBQL. Every HTTP request is one RPC; cursor pages are fetched one
//! request at a time and document writes run up to `max_in_flight` at once.

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use parking_lot::Mutex;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use super::{Datastore, Direction, FetchOptions, Query};
use crate::config::SolidbConfig;
use crate::context;
use crate::error::{BenchError, BenchResult};
use crate::model::{Key, KeyId, Record};

/// Parent key path of a stored record
pub const PARENT_FIELD: &str = "ds_parent";
/// Paths of every ancestor of a stored record
pub const ANCESTORS_FIELD: &str = "ds_ancestors";

const SYSTEM_FIELDS: [&str; 5] = ["_key", "_id", "_rev", "_created_at", "_updated_at"];

#[derive(Debug, Deserialize)]
struct CursorResponse {
    #[serde(default)]
    result: Vec<Value>,
    #[serde(default, alias = "hasMore")]
    has_more: bool,
    #[serde(default)]
    id: Option<String>,
}

/// What a rendered query returns per matching document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    Documents,
    Count,
}

pub struct SolidbDatastore {
    base_url: String,
    database: String,
    prefix: String,
    batch_size: usize,
    max_in_flight: usize,
    client: reqwest::Client,
    ensured: Mutex<HashSet<String>>,
}

impl SolidbDatastore {
    pub fn new(config: &SolidbConfig) -> BenchResult<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if !config.token.is_empty() {
            let mut auth_val =
                reqwest::header::HeaderValue::from_str(&format!("Bearer {}", config.token))
                    .map_err(|e| BenchError::Config(format!("invalid token: {}", e)))?;
            auth_val.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, auth_val);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(config.max_in_flight)
            .build()?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            prefix: config.collection_prefix.clone(),
            batch_size: config.batch_size.max(1),
            max_in_flight: config.max_in_flight.max(1),
            client,
            ensured: Mutex::new(HashSet::new()),
        })
    }

    /// Collection name for a record kind
    pub fn collection(&self, kind: &str) -> BenchResult<String> {
        let name = format!("{}{}", self.prefix, kind);
        check_identifier(&name)?;
        Ok(name)
    }

    async fn send(
        &self,
        call: &'static str,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> BenchResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        context::rpc(call, async {
            let mut request = self.client.request(method, &url);
            if let Some(b) = body {
                request = request.json(b);
            }

            let response = request.send().await?;
            let status = response.status();
            let text = response.text().await?;

            if !status.is_success() {
                return Err(BenchError::Status {
                    status: status.as_u16(),
                    message: text,
                });
            }
            if text.is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&text).map_err(|e| {
                BenchError::Protocol(format!("Failed to parse response: {} - Text: {}", e, text))
            })
        })
        .await
    }

    /// Create the kind's collection once per process; an existing one is fine
    async fn ensure_collection(&self, kind: &str) -> BenchResult<String> {
        let name = self.collection(kind)?;
        if self.ensured.lock().contains(&name) {
            return Ok(name);
        }

        let path = format!("/_api/database/{}/collection", self.database);
        match self
            .send("solidb.create_collection", Method::POST, &path, Some(&json!({ "name": name })))
            .await
        {
            Ok(_) => tracing::info!("Created collection {}", name),
            Err(e) if e.status() == Some(409) => {}
            Err(e) => return Err(e),
        }

        self.ensured.lock().insert(name.clone());
        Ok(name)
    }

    async fn insert(&self, collection: &str, record: Record) -> BenchResult<Key> {
        let path = format!("/_api/database/{}/document/{}", self.database, collection);
        let doc = to_document(&record);
        let response = self.send("solidb.insert", Method::POST, &path, Some(&doc)).await?;

        let allocated = response
            .get("_key")
            .and_then(Value::as_str)
            .ok_or_else(|| BenchError::Protocol("insert response without _key".to_string()))?;

        let mut key = record.key;
        key.id = Some(parse_key_id(allocated));
        Ok(key)
    }

    async fn remove(&self, collection: &str, key: &Key) -> BenchResult<()> {
        let Some(id) = &key.id else {
            return Ok(());
        };
        let path = format!(
            "/_api/database/{}/document/{}/{}",
            self.database, collection, id
        );
        match self.send("solidb.delete", Method::DELETE, &path, None).await {
            Ok(_) => Ok(()),
            Err(e) if e.status() == Some(404) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Run an SDBQL query and drain its cursor
    async fn cursor(&self, sdbql: String, bind_vars: Map<String, Value>) -> BenchResult<Vec<Value>> {
        tracing::debug!("SDBQL: {}", sdbql);
        let path = format!("/_api/database/{}/cursor", self.database);
        let body = json!({
            "query": sdbql,
            "bindVars": bind_vars,
            "batchSize": self.batch_size,
        });

        let first: CursorResponse =
            serde_json::from_value(self.send("solidb.cursor", Method::POST, &path, Some(&body)).await?)?;
        let mut results = first.result;
        let mut has_more = first.has_more;
        let mut cursor_id = first.id;

        while has_more {
            let Some(id) = cursor_id.take() else {
                return Err(BenchError::Protocol(
                    "cursor reported more results without an id".to_string(),
                ));
            };
            let next: CursorResponse = serde_json::from_value(
                self.send("solidb.next", Method::PUT, &format!("/_api/cursor/{}", id), None)
                    .await?,
            )?;
            results.extend(next.result);
            has_more = next.has_more;
            cursor_id = next.id.or(Some(id));
        }

        Ok(results)
    }
}

#[async_trait]
impl Datastore for SolidbDatastore {
    fn name(&self) -> &'static str {
        "solidb"
    }

    async fn put_multi(&self, records: Vec<Record>) -> BenchResult<Vec<Key>> {
        let mut collections = BTreeMap::new();
        for record in &records {
            if !collections.contains_key(record.kind()) {
                let name = self.ensure_collection(record.kind()).await?;
                collections.insert(record.kind().to_string(), name);
            }
        }

        let collections = &collections;
        stream::iter(records.into_iter().map(|record| async move {
            let collection = collections
                .get(record.kind())
                .ok_or_else(|| BenchError::Datastore(format!("no collection for {}", record.kind())))?;
            self.insert(collection, record).await
        }))
        .buffered(self.max_in_flight)
        .try_collect()
        .await
    }

    async fn run_query(&self, query: &Query, options: &FetchOptions) -> BenchResult<Vec<Record>> {
        options.validate()?;
        let collection = self.ensure_collection(&query.kind).await?;
        let (sdbql, bind_vars) = render_query(&collection, query, options, ReturnShape::Documents)?;

        self.cursor(sdbql, bind_vars)
            .await?
            .into_iter()
            .map(|doc| from_document(&query.kind, doc))
            .collect()
    }

    async fn count(&self, query: &Query, limit: Option<usize>) -> BenchResult<usize> {
        let collection = self.ensure_collection(&query.kind).await?;
        let options = FetchOptions {
            limit,
            ..Default::default()
        };
        let (sdbql, bind_vars) = render_query(&collection, query, &options, ReturnShape::Count)?;

        let result = self.cursor(sdbql, bind_vars).await?;
        result
            .first()
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .ok_or_else(|| BenchError::Protocol(format!("unexpected count result: {:?}", result)))
    }

    async fn delete_multi(&self, keys: &[Key]) -> BenchResult<()> {
        let mut targets = Vec::with_capacity(keys.len());
        for key in keys {
            targets.push((self.collection(&key.kind)?, key));
        }

        let removals: Vec<_> = targets
            .iter()
            .map(|(collection, key)| self.remove(collection, key))
            .collect();
        stream::iter(removals)
            .buffer_unordered(self.max_in_flight)
            .try_collect::<Vec<()>>()
            .await?;
        Ok(())
    }
}

/// Property names are spliced into SDBQL, so only plain identifiers pass
fn check_identifier(name: &str) -> BenchResult<()> {
    let valid = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(BenchError::InvalidQuery(format!("'{}' is not a valid identifier", name)))
    }
}

fn parse_key_id(raw: &str) -> KeyId {
    match raw.parse::<i64>() {
        Ok(n) => KeyId::Id(n),
        Err(_) => KeyId::Name(raw.to_string()),
    }
}

/// Render a query as SDBQL plus bind variables
pub fn render_query(
    collection: &str,
    query: &Query,
    options: &FetchOptions,
    shape: ReturnShape,
) -> BenchResult<(String, Map<String, Value>)> {
    check_identifier(collection)?;
    let mut bind_vars = Map::new();
    let mut conditions = Vec::new();

    // A repeated property matches when any element equals the value
    for (i, filter) in query.filters.iter().enumerate() {
        check_identifier(&filter.property)?;
        conditions.push(format!(
            "(IS_ARRAY(d.{0}) ? @p{1} IN d.{0} : d.{0} == @p{1})",
            filter.property, i
        ));
        bind_vars.insert(format!("p{}", i), filter.value.clone());
    }
    if let Some(ancestor) = &query.ancestor {
        bind_vars.insert("ancestor".to_string(), json!(ancestor.path()));
        match &ancestor.id {
            // The ancestor itself lives in this collection and matches too
            Some(id) if ancestor.kind == query.kind => {
                conditions.push(format!(
                    "(@ancestor IN d.{} OR (d._key == @ancestor_key AND d.{} == @ancestor_parent))",
                    ANCESTORS_FIELD, PARENT_FIELD
                ));
                bind_vars.insert("ancestor_key".to_string(), json!(id.to_string()));
                let parent = ancestor.parent.as_deref().map(Key::path);
                bind_vars.insert("ancestor_parent".to_string(), json!(parent));
            }
            _ => conditions.push(format!("@ancestor IN d.{}", ANCESTORS_FIELD)),
        }
    }
    for property in &options.projection {
        check_identifier(property)?;
        conditions.push(format!("d.{} != null", property));
    }

    let mut sdbql = format!("FOR d IN {}", collection);
    if !conditions.is_empty() {
        sdbql.push_str(" FILTER ");
        sdbql.push_str(&conditions.join(" AND "));
    }
    if !query.order.is_empty() {
        let sorts = query
            .order
            .iter()
            .map(|o| {
                check_identifier(&o.property)?;
                let dir = match o.direction {
                    Direction::Ascending => "ASC",
                    Direction::Descending => "DESC",
                };
                Ok(format!("d.{} {}", o.property, dir))
            })
            .collect::<BenchResult<Vec<_>>>()?;
        sdbql.push_str(" SORT ");
        sdbql.push_str(&sorts.join(", "));
    }
    if let Some(limit) = options.limit {
        sdbql.push_str(" LIMIT @limit");
        bind_vars.insert("limit".to_string(), json!(limit));
    }

    match shape {
        ReturnShape::Count => {
            sdbql = format!("RETURN LENGTH(({} RETURN 1))", sdbql);
        }
        ReturnShape::Documents if options.keys_only => {
            sdbql.push_str(&format!(" RETURN {{_key: d._key, {0}: d.{0}}}", PARENT_FIELD));
        }
        ReturnShape::Documents if !options.projection.is_empty() => {
            let fields: Vec<String> = options
                .projection
                .iter()
                .map(|p| format!("{0}: d.{0}", p))
                .collect();
            sdbql.push_str(&format!(
                " RETURN {{_key: d._key, {0}: d.{0}, {1}}}",
                PARENT_FIELD,
                fields.join(", ")
            ));
        }
        ReturnShape::Documents => sdbql.push_str(" RETURN d"),
    }

    Ok((sdbql, bind_vars))
}

/// Document body for a record
pub fn to_document(record: &Record) -> Value {
    let mut doc = record.properties.clone();
    for field in SYSTEM_FIELDS.iter().chain([PARENT_FIELD, ANCESTORS_FIELD].iter()) {
        doc.remove(*field);
    }

    if let Some(id) = &record.key.id {
        doc.insert("_key".to_string(), json!(id.to_string()));
    }
    let parent = record.key.parent.as_deref().map(Key::path);
    doc.insert(PARENT_FIELD.to_string(), json!(parent));
    let ancestors: Vec<String> = record.key.ancestors().into_iter().map(Key::path).collect();
    doc.insert(ANCESTORS_FIELD.to_string(), json!(ancestors));

    Value::Object(doc)
}

/// Record for a returned document of the given kind
pub fn from_document(kind: &str, doc: Value) -> BenchResult<Record> {
    let mut map = match doc {
        Value::Object(map) => map,
        other => {
            return Err(BenchError::Protocol(format!("expected a document, got {}", other)))
        }
    };

    let raw_key = map
        .get("_key")
        .and_then(Value::as_str)
        .ok_or_else(|| BenchError::Protocol("document without _key".to_string()))?
        .to_string();
    let parent = match map.get(PARENT_FIELD) {
        Some(Value::String(path)) => Some(Key::parse_path(path)?),
        _ => None,
    };

    for field in SYSTEM_FIELDS.iter().chain([PARENT_FIELD, ANCESTORS_FIELD].iter()) {
        map.remove(*field);
    }

    let key = Key {
        kind: kind.to_string(),
        id: Some(parse_key_id(&raw_key)),
        parent: parent.map(Box::new),
    };
    Ok(Record::new(key, map))
}
