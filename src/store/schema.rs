//! Class definitions for the two collections and one-shot schema setup.

use serde_json::{json, Value};

use super::WeaviateStore;
use crate::config::WeaviateConfig;
use crate::error::{RagweaveError, Result};

/// `DocumentChunk`-style class: vectorized text plus its position in the source.
pub fn chunk_class_definition(config: &WeaviateConfig) -> Value {
    let mut module_config = serde_json::Map::new();
    module_config.insert(
        config.vectorizer.clone(),
        json!({
            "model": config.vectorizer_model,
            "apiEndpoint": config.vectorizer_endpoint,
        }),
    );

    json!({
        "class": config.chunk_class,
        "description": "A chunk of extracted document text",
        "vectorizer": config.vectorizer,
        "moduleConfig": module_config,
        "properties": [
            { "name": "text", "dataType": ["text"] },
            { "name": "chunk_id", "dataType": ["int"] },
            { "name": "source", "dataType": ["text"], "tokenization": "field" },
            { "name": "size", "dataType": ["int"] },
            { "name": "m_time", "dataType": ["date"] },
        ]
    })
}

/// `Document`-style class: per-file metadata, never vectorized.
pub fn document_class_definition(config: &WeaviateConfig) -> Value {
    json!({
        "class": config.document_class,
        "description": "One ingested file",
        "vectorizer": "none",
        "properties": [
            { "name": "source", "dataType": ["text"], "tokenization": "field" },
            { "name": "size", "dataType": ["int"] },
            { "name": "m_time", "dataType": ["date"] },
            { "name": "vectorized", "dataType": ["boolean"] },
            { "name": "text", "dataType": ["text"] },
        ]
    })
}

/// Create every missing class. Returns the names of the classes created.
pub async fn ensure_schema(store: &WeaviateStore, config: &WeaviateConfig) -> Result<Vec<String>> {
    let mut created = Vec::new();
    for definition in [document_class_definition(config), chunk_class_definition(config)] {
        let name = definition["class"].as_str().unwrap_or_default().to_string();
        match store.get_class(&name).await {
            Ok(_) => log::info!("Class {} already exists", name),
            Err(RagweaveError::ClassNotFound(_)) => {
                store.create_class(&definition).await?;
                log::info!("✓ Created class {}", name);
                created.push(name);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{spawn_server, Recorded};
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};

    #[test]
    fn test_chunk_class_uses_configured_vectorizer() {
        let mut config = WeaviateConfig::default();
        config.vectorizer = "text2vec-openai".to_string();
        config.vectorizer_model = "text-embedding-3-small".to_string();
        let def = chunk_class_definition(&config);
        assert_eq!(def["class"], json!("DocumentChunk"));
        assert_eq!(def["vectorizer"], json!("text2vec-openai"));
        assert_eq!(
            def["moduleConfig"]["text2vec-openai"]["model"],
            json!("text-embedding-3-small")
        );
        let names: Vec<&str> = def["properties"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["text", "chunk_id", "source", "size", "m_time"]);
    }

    #[test]
    fn test_document_class_is_not_vectorized() {
        let def = document_class_definition(&WeaviateConfig::default());
        assert_eq!(def["class"], json!("Document"));
        assert_eq!(def["vectorizer"], json!("none"));
        assert_eq!(def["properties"][0]["tokenization"], json!("field"));
    }

    #[tokio::test]
    async fn test_ensure_schema_creates_only_missing_classes() {
        let recorded = Recorded::default();
        let app = Router::new()
            .route(
                "/v1/schema/:class",
                get(|Path(class): Path<String>| async move {
                    if class == "Document" {
                        (StatusCode::OK, Json(json!({ "class": "Document" })))
                    } else {
                        (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
                    }
                }),
            )
            .route(
                "/v1/schema",
                post(|State(rec): State<Recorded>, Json(body): Json<Value>| async move {
                    rec.push(body.clone());
                    Json(body)
                }),
            )
            .with_state(recorded.clone());
        let url = spawn_server(app).await;
        let store = WeaviateStore::new(&url, None).unwrap();

        let created = ensure_schema(&store, &WeaviateConfig::default()).await.unwrap();
        assert_eq!(created, vec!["DocumentChunk".to_string()]);
        let posted = recorded.take();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0]["class"], json!("DocumentChunk"));
    }
}
