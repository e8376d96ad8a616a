//! Typed records for the two collections and the mapping to the vector
//! store's generic property bag.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{RagweaveError, Result};

/// Generic property bag as sent to / received from the store
pub type Properties = Map<String, Value>;

/// Metadata the store attaches to query results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Additional {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certainty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
}

/// A record as held by the store: identifier plus untyped properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredObject {
    pub id: Uuid,
    #[serde(flatten)]
    pub properties: Properties,
    #[serde(rename = "_additional")]
    pub additional: Additional,
}

/// Numbers in `_additional` may be serialized as JSON strings ("score": "0.42").
fn lenient_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl StoredObject {
    pub fn new(id: Uuid, properties: Properties) -> Self {
        Self {
            id,
            properties,
            additional: Additional::default(),
        }
    }

    /// Parse one item of a GraphQL `Get` result.
    ///
    /// The item carries the requested properties plus an `_additional` object
    /// holding at least `id`.
    pub fn from_graphql(item: Value) -> Result<Self> {
        let mut properties = match item {
            Value::Object(map) => map,
            other => {
                return Err(RagweaveError::InvalidInput(format!(
                    "expected object in query result, got {}",
                    other
                )))
            }
        };

        let additional = properties.remove("_additional").unwrap_or(Value::Null);
        let id = additional
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RagweaveError::InvalidInput("query result is missing _additional.id".to_string())
            })?;
        let id = Uuid::parse_str(id)
            .map_err(|e| RagweaveError::InvalidInput(format!("invalid object id {}: {}", id, e)))?;

        Ok(Self {
            id,
            properties,
            additional: Additional {
                score: lenient_number(additional.get("score")),
                certainty: lenient_number(additional.get("certainty")),
                distance: lenient_number(additional.get("distance")),
            },
        })
    }

    pub fn source(&self) -> Option<&str> {
        self.properties.get("source").and_then(Value::as_str)
    }

    pub fn chunk_id(&self) -> Option<i64> {
        match self.properties.get("chunk_id")? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.properties.get("text").and_then(Value::as_str)
    }
}

/// Result of a bulk delete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteSummary {
    pub matches: u64,
    pub successful: u64,
    pub failed: u64,
}

/// A typed record kind stored in its own collection.
pub trait Record: Serialize + DeserializeOwned {
    /// Properties to request when reading this record back.
    const PROPERTIES: &'static [&'static str];

    fn id(&self) -> Option<Uuid>;

    fn set_id(&mut self, id: Uuid);

    /// Map the typed record onto the store's property bag.
    fn to_properties(&self) -> Result<Properties> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(RagweaveError::InvalidInput(format!(
                "record did not serialize to an object: {}",
                other
            ))),
        }
    }

    /// Build the typed record from a stored object.
    fn from_object(object: &StoredObject) -> Result<Self> {
        let mut record: Self = serde_json::from_value(Value::Object(object.properties.clone()))?;
        record.set_id(object.id);
        Ok(record)
    }
}

/// RFC 3339 timestamps with microsecond precision.
///
/// Parsing accepts any RFC 3339 rendering so values written by other tools
/// compare by instant, not by text.
pub mod rfc3339 {
    use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(dt: &DateTime<Utc>) -> String {
        dt.trunc_subsecs(6).to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn parse(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
    }

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            dt: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match dt {
                Some(dt) => serializer.serialize_str(&format(dt)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(s) => parse(&s).map(Some).map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}

/// Parent record for one ingested file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(skip)]
    pub id: Option<Uuid>,
    pub source: String,
    pub size: u64,
    #[serde(with = "rfc3339")]
    pub m_time: DateTime<Utc>,
    #[serde(default)]
    pub vectorized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Record for Document {
    // `text` is left out on purpose: lookups only need the metadata
    const PROPERTIES: &'static [&'static str] = &["source", "size", "m_time", "vectorized"];

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }
}

/// One searchable piece of a document's text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    #[serde(skip)]
    pub id: Option<Uuid>,
    pub text: String,
    pub chunk_id: i64,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "rfc3339::option")]
    pub m_time: Option<DateTime<Utc>>,
}

impl Record for DocumentChunk {
    const PROPERTIES: &'static [&'static str] = &["text", "chunk_id", "source"];

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn set_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample_document() -> Document {
        Document {
            id: None,
            source: "/data/report.pdf".to_string(),
            size: 2400,
            m_time: Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap(),
            vectorized: false,
            text: None,
        }
    }

    #[test]
    fn test_document_properties() {
        let props = sample_document().to_properties().unwrap();
        assert_eq!(props["source"], json!("/data/report.pdf"));
        assert_eq!(props["size"], json!(2400));
        assert_eq!(props["vectorized"], json!(false));
        // truncated to microseconds, UTC "Z" suffix
        assert_eq!(props["m_time"], json!("2023-11-14T22:13:20.123456Z"));
        assert!(!props.contains_key("text"));
        assert!(!props.contains_key("id"));
    }

    #[test]
    fn test_document_from_object_parses_any_rfc3339_form() {
        let mut props = Properties::new();
        props.insert("source".into(), json!("/data/report.pdf"));
        props.insert("size".into(), json!(2400));
        props.insert("m_time".into(), json!("2023-11-14T23:13:20.123456+01:00"));
        props.insert("vectorized".into(), json!(true));
        let id = Uuid::new_v4();

        let doc = Document::from_object(&StoredObject::new(id, props)).unwrap();
        assert_eq!(doc.id, Some(id));
        assert!(doc.vectorized);
        assert_eq!(
            doc.m_time,
            rfc3339::parse("2023-11-14T22:13:20.123456Z").unwrap()
        );
    }

    #[test]
    fn test_from_object_rejects_bad_timestamp() {
        let mut props = Properties::new();
        props.insert("source".into(), json!("/x"));
        props.insert("size".into(), json!(1));
        props.insert("m_time".into(), json!("yesterday"));
        let err = Document::from_object(&StoredObject::new(Uuid::new_v4(), props)).unwrap_err();
        assert!(matches!(err, RagweaveError::Json(_)));
    }

    #[test]
    fn test_chunk_properties_skip_missing_metadata() {
        let chunk = DocumentChunk {
            id: None,
            text: "hello".into(),
            chunk_id: 3,
            source: "/a".into(),
            size: None,
            m_time: None,
        };
        let props = chunk.to_properties().unwrap();
        assert_eq!(props.len(), 3);
        assert_eq!(props["chunk_id"], json!(3));
    }

    #[test]
    fn test_stored_object_from_graphql() {
        let id = Uuid::new_v4();
        let item = json!({
            "text": "chunk text",
            "chunk_id": 4,
            "source": "/a.pdf",
            "_additional": { "id": id.to_string(), "score": "0.75", "distance": 0.2, "certainty": null }
        });
        let obj = StoredObject::from_graphql(item).unwrap();
        assert_eq!(obj.id, id);
        assert_eq!(obj.chunk_id(), Some(4));
        assert_eq!(obj.source(), Some("/a.pdf"));
        assert_eq!(obj.text(), Some("chunk text"));
        assert_eq!(obj.additional.score, Some(0.75));
        assert_eq!(obj.additional.distance, Some(0.2));
        assert_eq!(obj.additional.certainty, None);
        assert!(!obj.properties.contains_key("_additional"));
    }

    #[test]
    fn test_stored_object_requires_id() {
        let err = StoredObject::from_graphql(json!({"text": "x"})).unwrap_err();
        assert!(matches!(err, RagweaveError::InvalidInput(_)));
    }

    #[test]
    fn test_stored_object_serializes_flat() {
        let mut props = Properties::new();
        props.insert("source".into(), json!("/a"));
        let obj = StoredObject::new(Uuid::nil(), props);
        let v = serde_json::to_value(&obj).unwrap();
        assert_eq!(v["source"], json!("/a"));
        assert_eq!(v["id"], json!(Uuid::nil().to_string()));
        assert!(v["_additional"].is_object());
    }
}
