//! Weaviate adapter: object CRUD over REST, lookups and search over GraphQL.

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use super::{DocumentStore, DEFAULT_LIST_LIMIT};
use crate::error::{RagweaveError, Result};
use crate::models::{DeleteSummary, Properties, StoredObject};

const ADDITIONAL_ID: &[&str] = &["id"];
const ADDITIONAL_SEARCH: &[&str] = &["id", "score", "certainty", "distance"];

/// Class and property names are spliced into GraphQL text, so they must be
/// plain identifiers.
fn check_identifier(kind: &str, name: &str) -> Result<()> {
    static IDENT: OnceLock<Option<Regex>> = OnceLock::new();
    let valid = IDENT
        .get_or_init(|| Regex::new(r"^[_A-Za-z][_0-9A-Za-z]*$").ok())
        .as_ref()
        .map_or(false, |re| re.is_match(name));
    if valid {
        Ok(())
    } else {
        Err(RagweaveError::InvalidInput(format!("invalid {} name: {:?}", kind, name)))
    }
}

/// Typed `where` operand for a JSON value.
fn where_value(value: &Value) -> Result<(&'static str, Value)> {
    match value {
        Value::String(_) => Ok(("valueText", value.clone())),
        Value::Bool(_) => Ok(("valueBoolean", value.clone())),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(("valueInt", value.clone())),
        Value::Number(_) => Ok(("valueNumber", value.clone())),
        other => Err(RagweaveError::InvalidInput(format!(
            "unsupported filter value: {}",
            other
        ))),
    }
}

/// `where` clause comparing one property.
pub fn where_compare(field: &str, operator: &str, value: &Value) -> Result<Value> {
    check_identifier("property", field)?;
    let (key, value) = where_value(value)?;
    let mut filter = json!({ "path": [field], "operator": operator });
    filter[key] = value;
    Ok(filter)
}

pub fn where_and(operands: Vec<Value>) -> Value {
    json!({ "operator": "And", "operands": operands })
}

/// One GraphQL `Get` over a single class.
#[derive(Debug, Default)]
struct GetQuery<'a> {
    class: &'a str,
    filter: Option<Value>,
    near_text: Option<Value>,
    bm25: Option<Value>,
    limit: Option<usize>,
    properties: &'a [&'a str],
    additional: &'a [&'a str],
}

impl<'a> GetQuery<'a> {
    fn new(class: &'a str, properties: &'a [&'a str], additional: &'a [&'a str]) -> Self {
        Self {
            class,
            properties,
            additional,
            ..Default::default()
        }
    }

    /// Render the query text and its variables. User-provided values only
    /// travel as variables.
    fn render(&self) -> Result<(String, Value)> {
        check_identifier("class", self.class)?;
        for p in self.properties {
            check_identifier("property", p)?;
        }

        let mut var_defs = Vec::new();
        let mut args = Vec::new();
        let mut variables = serde_json::Map::new();

        let typed = [
            ("where", "WhereInpObj", &self.filter),
            ("nearText", "NearTextInpObj", &self.near_text),
            ("bm25", "HybridGetBm25InpObj", &self.bm25),
        ];
        for (name, type_suffix, value) in typed {
            if let Some(value) = value {
                var_defs.push(format!("${}: GetObjects{}{}!", name, self.class, type_suffix));
                args.push(format!("{}: ${}", name, name));
                variables.insert(name.to_string(), value.clone());
            }
        }
        if let Some(limit) = self.limit {
            args.push(format!("limit: {}", limit));
        }

        let operation = if var_defs.is_empty() {
            String::new()
        } else {
            format!("query({})", var_defs.join(", "))
        };
        let arguments = if args.is_empty() {
            String::new()
        } else {
            format!("({})", args.join(", "))
        };
        let additional = if self.additional.is_empty() {
            String::new()
        } else {
            format!(" _additional {{ {} }}", self.additional.join(" "))
        };

        let query = format!(
            "{} {{ Get {{ {}{} {{ {}{} }} }} }}",
            operation,
            self.class,
            arguments,
            self.properties.join(" "),
            additional
        );
        Ok((query.trim().to_string(), Value::Object(variables)))
    }
}

#[derive(Deserialize)]
struct CreatedObject {
    id: Uuid,
}

#[derive(Deserialize)]
struct BatchDeleteResponse {
    #[serde(default)]
    results: BatchDeleteResults,
}

#[derive(Default, Deserialize)]
struct BatchDeleteResults {
    #[serde(flatten)]
    summary: DeleteSummary,
    #[serde(default)]
    limit: Option<u64>,
}

/// Weaviate client implementing [`DocumentStore`].
pub struct WeaviateStore {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl WeaviateStore {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base)
            .map_err(|e| RagweaveError::Config(format!("invalid Weaviate URL {}: {}", base_url, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RagweaveError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| RagweaveError::InvalidInput(format!("invalid path {}: {}", path, e)))?;
        let builder = self.client.request(method, url);
        Ok(match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        })
    }

    /// Send a request; transport failures and non-2xx statuses become errors.
    async fn send(&self, builder: RequestBuilder, context: &str) -> Result<Response> {
        let response = builder
            .send()
            .await
            .map_err(|source| RagweaveError::StoreUnavailable {
                context: context.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error response".to_string());
        Err(RagweaveError::StoreRequest {
            context: context.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn json(&self, response: Response, context: &str) -> Result<Value> {
        response
            .json()
            .await
            .map_err(|source| RagweaveError::StoreUnavailable {
                context: format!("{}: decoding response", context),
                source,
            })
    }

    /// Run a GraphQL query; GraphQL-level `errors` are reported as failures.
    async fn graphql(&self, query: &str, variables: Value, context: &str) -> Result<Value> {
        log::debug!("GraphQL {}: {}", context, query);
        let builder = self
            .request(Method::POST, "v1/graphql")?
            .json(&json!({ "query": query, "variables": variables }));
        let response = self.send(builder, context).await?;
        let mut body = self.json(response, context).await?;

        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                return Err(RagweaveError::StoreRequest {
                    context: context.to_string(),
                    status: StatusCode::OK.as_u16(),
                    body: Value::Array(errors.clone()).to_string(),
                });
            }
        }
        Ok(body.get_mut("data").map(Value::take).unwrap_or(Value::Null))
    }

    async fn get(&self, query: GetQuery<'_>, context: &str) -> Result<Vec<StoredObject>> {
        let (text, variables) = query.render()?;
        let mut data = self.graphql(&text, variables, context).await?;
        let items = match data
            .get_mut("Get")
            .and_then(|g| g.get_mut(query.class))
            .map(Value::take)
        {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(RagweaveError::InvalidInput(format!(
                    "{}: unexpected Get result {}",
                    context, other
                )))
            }
        };
        items.into_iter().map(StoredObject::from_graphql).collect()
    }

    /// Full schema (`GET /v1/schema`).
    pub async fn get_schema(&self) -> Result<Value> {
        let response = self
            .send(self.request(Method::GET, "v1/schema")?, "get schema")
            .await?;
        self.json(response, "get schema").await
    }

    /// One class definition; a missing class is [`RagweaveError::ClassNotFound`].
    pub async fn get_class(&self, class: &str) -> Result<Value> {
        check_identifier("class", class)?;
        let context = format!("get class {}", class);
        match self
            .send(self.request(Method::GET, &format!("v1/schema/{}", class))?, &context)
            .await
        {
            Ok(response) => self.json(response, &context).await,
            Err(RagweaveError::StoreRequest { status: 404, .. }) => {
                Err(RagweaveError::ClassNotFound(class.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn create_class(&self, definition: &Value) -> Result<Value> {
        let name = definition.get("class").and_then(Value::as_str).unwrap_or("?");
        let context = format!("create class {}", name);
        let builder = self.request(Method::POST, "v1/schema")?.json(definition);
        let response = self.send(builder, &context).await?;
        self.json(response, &context).await
    }

    pub async fn delete_class(&self, class: &str) -> Result<()> {
        check_identifier("class", class)?;
        let context = format!("delete class {}", class);
        match self
            .send(self.request(Method::DELETE, &format!("v1/schema/{}", class))?, &context)
            .await
        {
            Ok(_) => Ok(()),
            Err(RagweaveError::StoreRequest { status: 404, .. }) => {
                Err(RagweaveError::ClassNotFound(class.to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl DocumentStore for WeaviateStore {
    async fn find_by_source(
        &self,
        class: &str,
        source: &str,
        properties: &[&str],
    ) -> Result<Option<StoredObject>> {
        let mut query = GetQuery::new(class, properties, ADDITIONAL_ID);
        query.filter = Some(where_compare("source", "Equal", &json!(source))?);
        // two are enough to detect a duplicate
        query.limit = Some(2);

        let mut found = self
            .get(query, &format!("find {} by source {}", class, source))
            .await?;
        if found.len() > 1 {
            return Err(RagweaveError::Integrity(format!(
                "more than one {} record has source {}",
                class, source
            )));
        }
        Ok(found.pop())
    }

    async fn create(&self, class: &str, properties: Properties) -> Result<Uuid> {
        let context = format!("create {}", class);
        let builder = self
            .request(Method::POST, "v1/objects")?
            .json(&json!({ "class": class, "properties": properties }));
        let response = self.send(builder, &context).await?;
        let created: CreatedObject = serde_json::from_value(self.json(response, &context).await?)?;
        Ok(created.id)
    }

    async fn patch(&self, class: &str, id: Uuid, properties: Properties) -> Result<()> {
        check_identifier("class", class)?;
        let context = format!("patch {}/{}", class, id);
        let builder = self
            .request(Method::PATCH, &format!("v1/objects/{}/{}", class, id))?
            .json(&json!({ "class": class, "properties": properties }));
        self.send(builder, &context).await?;
        Ok(())
    }

    async fn delete_by(&self, class: &str, field: &str, value: &Value) -> Result<DeleteSummary> {
        let context = format!("delete {} where {} = {}", class, field, value);
        let body = json!({
            "match": { "class": class, "where": where_compare(field, "Equal", value)? },
            "output": "minimal",
        });
        let builder = self.request(Method::DELETE, "v1/batch/objects")?.json(&body);
        let response = self.send(builder, &context).await?;
        let parsed: BatchDeleteResponse = serde_json::from_value(self.json(response, &context).await?)?;

        let results = parsed.results;
        if results.limit.map_or(false, |limit| results.summary.matches >= limit) {
            log::warn!(
                "{}: matched the batch limit ({}), some records may remain",
                context,
                results.summary.matches
            );
        }
        if results.summary.failed > 0 {
            log::warn!("{}: {} deletion(s) failed", context, results.summary.failed);
        }
        Ok(results.summary)
    }

    async fn near_text(
        &self,
        class: &str,
        query: &str,
        k: usize,
        properties: &[&str],
    ) -> Result<Vec<StoredObject>> {
        let mut get = GetQuery::new(class, properties, ADDITIONAL_SEARCH);
        get.near_text = Some(json!({ "concepts": [query] }));
        get.limit = Some(k);
        self.get(get, &format!("nearText on {}", class)).await
    }

    async fn chunk_range(
        &self,
        class: &str,
        source: &str,
        lo: i64,
        hi: i64,
        properties: &[&str],
    ) -> Result<Vec<StoredObject>> {
        let mut get = GetQuery::new(class, properties, ADDITIONAL_ID);
        get.filter = Some(where_and(vec![
            where_compare("source", "Equal", &json!(source))?,
            where_compare("chunk_id", "GreaterThanEqual", &json!(lo))?,
            where_compare("chunk_id", "LessThanEqual", &json!(hi))?,
        ]));
        let span = hi.saturating_sub(lo).saturating_add(1);
        // Weaviate rejects limits above its maximum result window
        get.limit = Some(usize::try_from(span).unwrap_or(0).clamp(1, DEFAULT_LIST_LIMIT));
        self.get(get, &format!("chunks {}[{}..={}] of {}", source, lo, hi, class))
            .await
    }

    async fn search_bm25(
        &self,
        class: &str,
        query: &str,
        properties: &[&str],
        k: usize,
    ) -> Result<Vec<StoredObject>> {
        if properties.is_empty() {
            return Err(RagweaveError::InvalidInput(
                "bm25 search needs at least one property".to_string(),
            ));
        }
        let mut get = GetQuery::new(class, properties, ADDITIONAL_SEARCH);
        get.bm25 = Some(json!({ "query": query, "properties": properties }));
        get.limit = Some(k);
        self.get(get, &format!("bm25 on {}", class)).await
    }

    async fn list(&self, class: &str, properties: &[&str], limit: usize) -> Result<Vec<StoredObject>> {
        let mut get = GetQuery::new(class, properties, ADDITIONAL_ID);
        get.limit = Some(limit);
        self.get(get, &format!("list {}", class)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{spawn_server, Recorded};
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode as HttpStatus};
    use axum::routing::{delete, get, patch, post};
    use axum::{Json, Router};

    #[test]
    fn test_render_find_query() {
        let mut q = GetQuery::new("Document", &["source", "size"], ADDITIONAL_ID);
        q.filter = Some(where_compare("source", "Equal", &json!("/a b\"c")).unwrap());
        q.limit = Some(2);
        let (text, vars) = q.render().unwrap();
        assert_eq!(
            text,
            "query($where: GetObjectsDocumentWhereInpObj!) { Get { Document(where: $where, limit: 2) { source size _additional { id } } } }"
        );
        // user text only travels in variables
        assert_eq!(vars["where"]["valueText"], json!("/a b\"c"));
        assert_eq!(vars["where"]["path"], json!(["source"]));
    }

    #[test]
    fn test_render_without_arguments() {
        let q = GetQuery::new("Document", &["source"], &[]);
        let (text, vars) = q.render().unwrap();
        assert_eq!(text, "{ Get { Document { source } } }");
        assert_eq!(vars, json!({}));
    }

    #[test]
    fn test_render_rejects_bad_identifiers() {
        let q = GetQuery::new("Doc) { x", &["source"], &[]);
        assert!(matches!(q.render(), Err(RagweaveError::InvalidInput(_))));
        let q = GetQuery::new("Document", &["source }"], &[]);
        assert!(q.render().is_err());
    }

    #[test]
    fn test_where_value_types() {
        assert_eq!(where_compare("chunk_id", "Equal", &json!(3)).unwrap()["valueInt"], json!(3));
        assert_eq!(
            where_compare("vectorized", "Equal", &json!(true)).unwrap()["valueBoolean"],
            json!(true)
        );
        assert!(where_compare("x", "Equal", &json!(null)).is_err());
    }

    fn graphql_item(id: Uuid, source: &str) -> Value {
        json!({ "source": source, "size": 10, "m_time": "2024-01-01T00:00:00Z", "vectorized": true,
                "_additional": { "id": id.to_string() } })
    }

    async fn graphql_with(response: Value) -> (WeaviateStore, Recorded) {
        let recorded = Recorded::default();
        let app = Router::new()
            .route(
                "/v1/graphql",
                post(|State((rec, resp)): State<(Recorded, Value)>, Json(body): Json<Value>| async move {
                    rec.push(body);
                    Json(resp)
                }),
            )
            .with_state((recorded.clone(), response));
        let url = spawn_server(app).await;
        (WeaviateStore::new(&url, None).unwrap(), recorded)
    }

    #[tokio::test]
    async fn test_find_by_source_single() {
        let id = Uuid::new_v4();
        let (store, recorded) =
            graphql_with(json!({ "data": { "Get": { "Document": [graphql_item(id, "/a")] } } })).await;
        let found = store
            .find_by_source("Document", "/a", &["source", "size", "m_time", "vectorized"])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.source(), Some("/a"));

        let sent = recorded.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["variables"]["where"]["valueText"], json!("/a"));
        assert!(sent[0]["query"].as_str().unwrap().contains("limit: 2"));
    }

    #[tokio::test]
    async fn test_find_by_source_duplicate_is_integrity_violation() {
        let (store, _) = graphql_with(json!({ "data": { "Get": { "Document": [
            graphql_item(Uuid::new_v4(), "/a"),
            graphql_item(Uuid::new_v4(), "/a"),
        ] } } }))
        .await;
        let err = store.find_by_source("Document", "/a", &["source"]).await.unwrap_err();
        assert!(matches!(err, RagweaveError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_find_by_source_absent() {
        let (store, _) = graphql_with(json!({ "data": { "Get": { "Document": [] } } })).await;
        assert!(store.find_by_source("Document", "/a", &["source"]).await.unwrap().is_none());
    }

    fn chunk_item(id: Uuid, source: &str, chunk_id: i64, distance: Option<f64>) -> Value {
        let mut additional = json!({ "id": id.to_string() });
        if let Some(distance) = distance {
            additional["distance"] = json!(distance);
        }
        json!({ "text": format!("chunk {}", chunk_id), "chunk_id": chunk_id, "source": source,
                "_additional": additional })
    }

    #[tokio::test]
    async fn test_near_text_query() {
        let id = Uuid::new_v4();
        let (store, recorded) = graphql_with(json!({ "data": { "Get": { "DocumentChunk": [
            chunk_item(id, "/a", 4, Some(0.12)),
        ] } } }))
        .await;
        let hits = store
            .near_text("DocumentChunk", "what is \"it\"", 3, &["text", "chunk_id", "source"])
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
        assert_eq!(hits[0].chunk_id(), Some(4));
        assert_eq!(hits[0].additional.distance, Some(0.12));

        let sent = recorded.take();
        assert_eq!(
            sent[0]["query"],
            json!("query($nearText: GetObjectsDocumentChunkNearTextInpObj!) { Get { DocumentChunk(nearText: $nearText, limit: 3) { text chunk_id source _additional { id score certainty distance } } } }")
        );
        assert_eq!(sent[0]["variables"], json!({ "nearText": { "concepts": ["what is \"it\""] } }));
    }

    #[tokio::test]
    async fn test_bm25_query() {
        let (store, recorded) = graphql_with(json!({ "data": { "Get": { "Document": [] } } })).await;
        let hits = store
            .search_bm25("Document", "quarterly report", &["text", "source"], 5)
            .await
            .unwrap();
        assert!(hits.is_empty());

        let sent = recorded.take();
        assert_eq!(
            sent[0]["query"],
            json!("query($bm25: GetObjectsDocumentHybridGetBm25InpObj!) { Get { Document(bm25: $bm25, limit: 5) { text source _additional { id score certainty distance } } } }")
        );
        assert_eq!(
            sent[0]["variables"]["bm25"],
            json!({ "query": "quarterly report", "properties": ["text", "source"] })
        );

        let err = store.search_bm25("Document", "x", &[], 5).await.unwrap_err();
        assert!(matches!(err, RagweaveError::InvalidInput(_)));
        assert_eq!(recorded.len(), 0);
    }

    #[tokio::test]
    async fn test_chunk_range_filters_by_source_and_bounds() {
        let (store, recorded) = graphql_with(json!({ "data": { "Get": { "DocumentChunk": [] } } })).await;
        store
            .chunk_range("DocumentChunk", "/docs/a.pdf", 3, 7, &["text", "chunk_id", "source"])
            .await
            .unwrap();

        let sent = recorded.take();
        let query = sent[0]["query"].as_str().unwrap();
        assert!(query.starts_with("query($where: GetObjectsDocumentChunkWhereInpObj!)"));
        assert!(query.contains("DocumentChunk(where: $where, limit: 5)"));
        assert_eq!(
            sent[0]["variables"]["where"],
            json!({ "operator": "And", "operands": [
                { "path": ["source"], "operator": "Equal", "valueText": "/docs/a.pdf" },
                { "path": ["chunk_id"], "operator": "GreaterThanEqual", "valueInt": 3 },
                { "path": ["chunk_id"], "operator": "LessThanEqual", "valueInt": 7 },
            ] })
        );
    }

    #[tokio::test]
    async fn test_chunk_range_limit_is_capped() {
        let (store, recorded) = graphql_with(json!({ "data": { "Get": { "DocumentChunk": [] } } })).await;
        store
            .chunk_range("DocumentChunk", "/a", 0, i64::MAX, &["chunk_id"])
            .await
            .unwrap();
        let sent = recorded.take();
        assert!(sent[0]["query"].as_str().unwrap().contains("limit: 10000)"));
        assert_eq!(sent[0]["variables"]["where"]["operands"][2]["valueInt"], json!(i64::MAX));
    }

    #[tokio::test]
    async fn test_search_near_text_expands_neighbors() {
        let hit = Uuid::new_v4();
        let before = Uuid::new_v4();
        let after = Uuid::new_v4();
        let recorded = Recorded::default();
        let app = Router::new()
            .route(
                "/v1/graphql",
                post(move |State(rec): State<Recorded>, Json(body): Json<Value>| async move {
                    let items = if body["variables"].get("nearText").is_some() {
                        vec![chunk_item(hit, "/a", 5, Some(0.2))]
                    } else {
                        vec![
                            chunk_item(before, "/a", 4, None),
                            chunk_item(hit, "/a", 5, None),
                            chunk_item(after, "/a", 6, None),
                        ]
                    };
                    rec.push(body);
                    Json(json!({ "data": { "Get": { "DocumentChunk": items } } }))
                }),
            )
            .with_state(recorded.clone());
        let url = spawn_server(app).await;
        let store = WeaviateStore::new(&url, None).unwrap();

        let results = store.search_near_text("DocumentChunk", "needle", 1, 1).await.unwrap();
        let ids: Vec<Uuid> = results.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![before, hit, after]);
        // the hit keeps its search metadata
        assert_eq!(results[1].additional.distance, Some(0.2));

        let sent = recorded.take();
        assert_eq!(sent.len(), 2);
        let operands = &sent[1]["variables"]["where"]["operands"];
        assert_eq!(operands[0]["valueText"], json!("/a"));
        assert_eq!(operands[1]["valueInt"], json!(4));
        assert_eq!(operands[2]["valueInt"], json!(6));
        assert!(sent[1]["query"].as_str().unwrap().contains("limit: 3)"));
    }

    #[tokio::test]
    async fn test_graphql_errors_surface() {
        let (store, _) = graphql_with(json!({ "errors": [{ "message": "Cannot query field" }] })).await;
        let err = store.list("Document", &["source"], 10).await.unwrap_err();
        match err {
            RagweaveError::StoreRequest { body, .. } => assert!(body.contains("Cannot query field")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_object_crud_and_auth_header() {
        let recorded = Recorded::default();
        let new_id = Uuid::new_v4();
        let app = Router::new()
            .route(
                "/v1/objects",
                post(move |State(rec): State<Recorded>, headers: HeaderMap, Json(body): Json<Value>| async move {
                    rec.push(json!({
                        "auth": headers.get("authorization").and_then(|h| h.to_str().ok()),
                        "body": body,
                    }));
                    Json(json!({ "id": new_id.to_string() }))
                }),
            )
            .route(
                "/v1/objects/:class/:id",
                patch(|State(rec): State<Recorded>, Path((class, id)): Path<(String, String)>, Json(body): Json<Value>| async move {
                    rec.push(json!({ "class": class, "id": id, "body": body }));
                    HttpStatus::NO_CONTENT
                }),
            )
            .route(
                "/v1/batch/objects",
                delete(|State(rec): State<Recorded>, Json(body): Json<Value>| async move {
                    rec.push(body);
                    Json(json!({ "match": {}, "output": "minimal",
                                 "results": { "matches": 6, "successful": 6, "failed": 0, "limit": 10000 } }))
                }),
            )
            .with_state(recorded.clone());
        let url = spawn_server(app).await;
        let store = WeaviateStore::new(&url, Some("secret".to_string())).unwrap();

        let mut props = Properties::new();
        props.insert("source".into(), json!("/a"));
        let id = store.create("Document", props.clone()).await.unwrap();
        assert_eq!(id, new_id);

        store.patch("Document", id, props).await.unwrap();

        let summary = store.delete_by("DocumentChunk", "source", &json!("/a")).await.unwrap();
        assert_eq!(summary, DeleteSummary { matches: 6, successful: 6, failed: 0 });

        let sent = recorded.take();
        assert_eq!(sent[0]["auth"], json!("Bearer secret"));
        assert_eq!(sent[0]["body"]["class"], json!("Document"));
        assert_eq!(sent[1]["id"], json!(new_id.to_string()));
        assert_eq!(sent[1]["body"]["properties"]["source"], json!("/a"));
        assert_eq!(sent[2]["match"]["class"], json!("DocumentChunk"));
        assert_eq!(sent[2]["match"]["where"]["valueText"], json!("/a"));
    }

    #[tokio::test]
    async fn test_schema_not_found_is_distinguished() {
        let app = Router::new()
            .route(
                "/v1/schema/:class",
                get(|Path(class): Path<String>| async move {
                    if class == "Document" {
                        (HttpStatus::OK, Json(json!({ "class": "Document" })))
                    } else {
                        (HttpStatus::NOT_FOUND, Json(json!({})))
                    }
                }),
            )
            .route(
                "/v1/schema",
                post(|| async { (HttpStatus::UNPROCESSABLE_ENTITY, "class already exists") }),
            );
        let url = spawn_server(app).await;
        let store = WeaviateStore::new(&url, None).unwrap();

        assert_eq!(store.get_class("Document").await.unwrap()["class"], json!("Document"));
        let err = store.get_class("Missing").await.unwrap_err();
        assert!(err.is_class_not_found());

        let err = store.create_class(&json!({ "class": "Document" })).await.unwrap_err();
        assert!(matches!(err, RagweaveError::StoreRequest { status: 422, .. }));
    }

    #[tokio::test]
    async fn test_unreachable_store() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let store = WeaviateStore::new(&format!("http://{}", addr), None).unwrap();
        let err = store.get_schema().await.unwrap_err();
        assert!(matches!(err, RagweaveError::StoreUnavailable { .. }));
    }
}
