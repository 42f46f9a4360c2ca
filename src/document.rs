//! Document model - the shape of a DAG submission
//!
//! A submission is a named set of nodes and directed edges plus free-form
//! metadata. This module owns:
//! - parsing raw request bytes into a [`DagObject`] with defaults applied
//! - optional strict validation of node ids and edge endpoints
//! - the canonical JSON form shared by the relational row and the export file

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::{Map, Value};

/// Default author recorded when a submission does not name one.
pub const DEFAULT_CREATED_BY: &str = "monarch-gpt";

/// Default relation label for edges.
pub const DEFAULT_RELATION: &str = "depends_on";

/// A single node in a submitted DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagNode {
    /// Caller-supplied node identifier
    pub id: String,
    /// Free-form node type tag
    #[serde(rename = "type")]
    pub node_type: String,
    /// Node payload
    pub content: String,
    /// Optional formal specification text
    #[serde(default)]
    pub formal_spec: String,
    /// Arbitrary JSON metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A directed edge between two nodes.
///
/// The source endpoint is written as `from` on the wire. Older clients send
/// `from_`, which is still accepted on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagEdge {
    #[serde(rename = "from", alias = "from_")]
    pub from_id: String,
    #[serde(rename = "to")]
    pub to_id: String,
    #[serde(default = "default_relation")]
    pub relation: String,
}

fn default_relation() -> String {
    DEFAULT_RELATION.to_string()
}

fn default_created_by() -> String {
    DEFAULT_CREATED_BY.to_string()
}

/// Submission-level metadata.
///
/// `created_at` stays `None` until the persister resolves it, so an omitted
/// timestamp is always taken at save time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagMetadata {
    #[serde(default = "default_created_by")]
    pub created_by: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub description: String,
}

impl Default for DagMetadata {
    fn default() -> Self {
        Self {
            created_by: default_created_by(),
            created_at: None,
            tags: Vec::new(),
            description: String::new(),
        }
    }
}

/// A DAG submission as received from a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagObject {
    pub name: String,
    pub nodes: Vec<DagNode>,
    pub edges: Vec<DagEdge>,
    #[serde(default)]
    pub metadata: DagMetadata,
}

/// A submission after identifier assignment and timestamp resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedDag {
    pub dag_id: String,
    pub name: String,
    pub nodes: Vec<DagNode>,
    pub edges: Vec<DagEdge>,
    pub metadata: DagMetadata,
    pub created_at: String,
}

impl PersistedDag {
    /// Attach an identifier and a resolved timestamp to a submission.
    ///
    /// A caller-supplied `created_at` wins over `now`.
    pub fn new(dag_id: impl Into<String>, document: &DagObject, now: impl FnOnce() -> String) -> Self {
        let mut metadata = document.metadata.clone();
        let created_at = metadata.created_at.get_or_insert_with(now).clone();

        Self {
            dag_id: dag_id.into(),
            name: document.name.clone(),
            nodes: document.nodes.clone(),
            edges: document.edges.clone(),
            metadata,
            created_at,
        }
    }
}

/// Rejected request body.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid DAG document at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        Self {
            // serde_json appends the position to Display; keep only the reason
            message: strip_position(&err.to_string()),
            line: err.line(),
            column: err.column(),
        }
    }
}

fn strip_position(message: &str) -> String {
    match message.rfind(" at line ") {
        Some(idx) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

/// Parse a raw JSON payload into a [`DagObject`].
pub fn parse(raw: &[u8]) -> Result<DagObject, ParseError> {
    Ok(serde_json::from_slice(raw)?)
}

/// Structural problems reported in strict mode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("edge {index} references unknown node: {node_id}")]
    UnknownEdgeEndpoint { index: usize, node_id: String },
}

impl DagObject {
    /// Check that node ids are unique and every edge endpoint names a node.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut ids = HashSet::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !ids.insert(node.id.as_str()) {
                return Err(ValidationError::DuplicateNodeId(node.id.clone()));
            }
        }

        for (index, edge) in self.edges.iter().enumerate() {
            for endpoint in [&edge.from_id, &edge.to_id] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(ValidationError::UnknownEdgeEndpoint {
                        index,
                        node_id: endpoint.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Canonical serialized form of a persisted DAG.
///
/// `metadata`, `nodes` and `edges` are rendered exactly once. The relational
/// columns store these strings and the export document embeds the same bytes
/// verbatim, so the two stores cannot drift apart.
#[derive(Debug)]
pub struct CanonicalDag {
    metadata: Box<RawValue>,
    nodes: Box<RawValue>,
    edges: Box<RawValue>,
    document: Vec<u8>,
}

/// Key order of the export file.
#[derive(Serialize)]
struct ExportDocument<'a> {
    dag_id: &'a str,
    name: &'a str,
    nodes: &'a RawValue,
    edges: &'a RawValue,
    metadata: &'a RawValue,
    created_at: &'a str,
}

impl CanonicalDag {
    pub fn build(dag: &PersistedDag) -> serde_json::Result<Self> {
        let metadata = serde_json::value::to_raw_value(&dag.metadata)?;
        let nodes = serde_json::value::to_raw_value(&dag.nodes)?;
        let edges = serde_json::value::to_raw_value(&dag.edges)?;

        let document = serde_json::to_vec_pretty(&ExportDocument {
            dag_id: &dag.dag_id,
            name: &dag.name,
            nodes: &nodes,
            edges: &edges,
            metadata: &metadata,
            created_at: &dag.created_at,
        })?;

        Ok(Self {
            metadata,
            nodes,
            edges,
            document,
        })
    }

    pub fn metadata_json(&self) -> &str {
        self.metadata.get()
    }

    pub fn nodes_json(&self) -> &str {
        self.nodes.get()
    }

    pub fn edges_json(&self) -> &str {
        self.edges.get()
    }

    /// Full export file contents.
    pub fn document(&self) -> &[u8] {
        &self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{"name": "pipeline-1", "nodes": [{"id":"n1","type":"task","content":"build"}], "edges": []}"#;

    fn two_node_doc() -> DagObject {
        parse(
            br#"{
                "name": "etl",
                "nodes": [
                    {"id": "a", "type": "task", "content": "extract"},
                    {"id": "b", "type": "task", "content": "load", "formal_spec": "b > a"}
                ],
                "edges": [{"from": "a", "to": "b"}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_applies_defaults() {
        let doc = parse(MINIMAL.as_bytes()).unwrap();

        assert_eq!(doc.name, "pipeline-1");
        assert_eq!(doc.nodes.len(), 1);
        assert_eq!(doc.nodes[0].node_type, "task");
        assert_eq!(doc.nodes[0].formal_spec, "");
        assert!(doc.nodes[0].metadata.is_empty());
        assert_eq!(doc.metadata, DagMetadata::default());
        assert_eq!(doc.metadata.created_by, "monarch-gpt");
        assert!(doc.metadata.created_at.is_none());
    }

    #[test]
    fn test_parse_edge_relation_default_and_legacy_key() {
        let doc = parse(
            br#"{"name": "x", "nodes": [], "edges": [
                {"from_": "a", "to": "b"},
                {"from": "b", "to": "c", "relation": "feeds"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(doc.edges[0].from_id, "a");
        assert_eq!(doc.edges[0].relation, "depends_on");
        assert_eq!(doc.edges[1].from_id, "b");
        assert_eq!(doc.edges[1].relation, "feeds");
    }

    #[test]
    fn test_parse_rejects_missing_name() {
        let err = parse(br#"{"nodes": [], "edges": []}"#).unwrap_err();
        assert!(err.message.contains("name"), "{}", err.message);
    }

    #[test]
    fn test_parse_rejects_incomplete_node() {
        let err = parse(br#"{"name": "x", "nodes": [{"id": "n1", "type": "task"}], "edges": []}"#)
            .unwrap_err();
        assert!(err.message.contains("content"), "{}", err.message);
    }

    #[test]
    fn test_parse_rejects_wrong_shape() {
        assert!(parse(br#"{"name": "x", "nodes": {}, "edges": []}"#).is_err());
        assert!(parse(br#"[1, 2, 3]"#).is_err());
        let err = parse(b"{\"name\":").unwrap_err();
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        assert_eq!(two_node_doc().validate(), Ok(()));
    }

    #[test]
    fn test_validate_duplicate_node() {
        let mut doc = two_node_doc();
        doc.nodes[1].id = "a".to_string();
        assert_eq!(doc.validate(), Err(ValidationError::DuplicateNodeId("a".to_string())));
    }

    #[test]
    fn test_validate_dangling_edge() {
        let mut doc = two_node_doc();
        doc.edges.push(DagEdge {
            from_id: "b".to_string(),
            to_id: "ghost".to_string(),
            relation: DEFAULT_RELATION.to_string(),
        });
        assert_eq!(
            doc.validate(),
            Err(ValidationError::UnknownEdgeEndpoint { index: 1, node_id: "ghost".to_string() })
        );
    }

    #[test]
    fn test_persisted_keeps_supplied_timestamp() {
        let mut doc = two_node_doc();
        doc.metadata.created_at = Some("2024-01-01T00:00:00".to_string());

        let persisted = PersistedDag::new("id-1", &doc, || unreachable!());
        assert_eq!(persisted.created_at, "2024-01-01T00:00:00");
        assert_eq!(persisted.metadata.created_at.as_deref(), Some("2024-01-01T00:00:00"));
    }

    #[test]
    fn test_persisted_resolves_missing_timestamp() {
        let doc = two_node_doc();
        let persisted = PersistedDag::new("id-1", &doc, || "now".to_string());

        assert_eq!(persisted.created_at, "now");
        assert_eq!(persisted.metadata.created_at.as_deref(), Some("now"));
        assert!(doc.metadata.created_at.is_none());
    }

    #[test]
    fn test_canonical_form_shares_bytes() {
        let persisted = PersistedDag::new("id-1", &two_node_doc(), || "t0".to_string());
        let canonical = CanonicalDag::build(&persisted).unwrap();

        let text = std::str::from_utf8(canonical.document()).unwrap();
        assert!(text.contains(canonical.nodes_json()));
        assert!(text.contains(canonical.edges_json()));
        assert!(text.contains(canonical.metadata_json()));
        assert!(text.contains(r#""name": "etl""#));
        assert!(canonical.edges_json().contains(r#""from":"a""#));
        assert!(!canonical.edges_json().contains("from_"));

        let back: PersistedDag = serde_json::from_slice(canonical.document()).unwrap();
        assert_eq!(back, persisted);
    }

    #[test]
    fn test_canonical_key_order() {
        let persisted = PersistedDag::new("id-1", &two_node_doc(), || "t0".to_string());
        let canonical = CanonicalDag::build(&persisted).unwrap();
        let text = std::str::from_utf8(canonical.document()).unwrap();

        let positions: Vec<usize> = ["\"dag_id\"", "\"name\"", "\"nodes\"", "\"edges\"", "\"metadata\"", "\"created_at\": \"t0\""]
            .iter()
            .map(|key| text.find(key).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{}", text);
    }
}
