use super::*;
use chrono::Utc;

fn test_client() -> PineconeClient {
    let config = PineconeConfig {
        index_host: "https://test-index.svc.pinecone.io".to_string(),
        api_key: "test-key".to_string(),
        namespace: "rag-docs".to_string(),
    };
    PineconeClient::new(&config).expect("Failed to create client")
}

fn test_record() -> VectorRecord {
    VectorRecord {
        id: "doc-1-chunk-0".to_string(),
        values: vec![0.1, 0.2],
        metadata: ChunkMetadata {
            document_id: "doc-1".to_string(),
            file_name: "notes.txt".to_string(),
            chunk_index: 0,
            upload_date: Utc::now(),
            text: Some("hello".to_string()),
        },
    }
}

#[test]
fn client_configuration() {
    let client = test_client();
    assert_eq!(client.namespace(), "rag-docs");
    assert_eq!(
        client.index_url.host_str(),
        Some("test-index.svc.pinecone.io")
    );
}

#[test]
fn rejects_invalid_index_host() {
    let config = PineconeConfig {
        index_host: "not a url".to_string(),
        api_key: String::new(),
        namespace: "rag-docs".to_string(),
    };
    assert!(PineconeClient::new(&config).is_err());
}

#[test]
fn upsert_wire_shape() {
    let records = [test_record()];
    let request = UpsertRequest {
        vectors: &records,
        namespace: "rag-docs",
    };
    let json = serde_json::to_value(&request).expect("serializes");

    assert_eq!(json["namespace"], "rag-docs");
    assert_eq!(json["vectors"][0]["id"], "doc-1-chunk-0");
    assert_eq!(json["vectors"][0]["metadata"]["documentId"], "doc-1");
    assert_eq!(json["vectors"][0]["metadata"]["fileName"], "notes.txt");
    assert_eq!(json["vectors"][0]["metadata"]["chunkIndex"], 0);
    assert_eq!(json["vectors"][0]["metadata"]["text"], "hello");
}

#[test]
fn query_wire_shape_with_document_filter() {
    let vector = vec![0.5_f32; 4];
    let request = QueryRequest {
        vector: &vector,
        top_k: 5,
        include_metadata: true,
        namespace: "rag-docs",
        filter: Some(document_filter("doc-1")),
    };
    let json = serde_json::to_value(&request).expect("serializes");

    assert_eq!(json["topK"], 5);
    assert_eq!(json["includeMetadata"], true);
    assert_eq!(json["filter"]["documentId"]["$eq"], "doc-1");
}

#[test]
fn query_wire_shape_without_filter_omits_key() {
    let vector = vec![0.0_f32; 4];
    let request = QueryRequest {
        vector: &vector,
        top_k: 100,
        include_metadata: true,
        namespace: "rag-docs",
        filter: None,
    };
    let json = serde_json::to_value(&request).expect("serializes");
    assert!(json.get("filter").is_none());
}

#[test]
fn stats_response_parses_record_count_and_dimension() {
    let json = r#"{
        "namespaces": { "rag-docs": { "recordCount": 42 } },
        "dimension": 1024,
        "totalVectorCount": 42
    }"#;
    let response: StatsResponse = serde_json::from_str(json).expect("parses");

    assert_eq!(response.dimension, Some(1024));
    assert_eq!(response.namespaces["rag-docs"].record_count, 42);
}

#[test]
fn stats_response_accepts_vector_count_alias() {
    let json = r#"{"namespaces": { "rag-docs": { "vectorCount": 7 } }}"#;
    let response: StatsResponse = serde_json::from_str(json).expect("parses");

    assert_eq!(response.dimension, None);
    assert_eq!(response.namespaces["rag-docs"].record_count, 7);
}

#[test]
fn malformed_metadata_is_dropped_not_fatal() {
    let value = serde_json::json!({ "unexpected": true });
    assert!(parse_metadata("doc-1-chunk-0", value).is_none());
}

#[test]
fn well_formed_metadata_round_trips() {
    let metadata = test_record().metadata;
    let value = serde_json::to_value(&metadata).expect("serializes");
    let parsed = parse_metadata("doc-1-chunk-0", value).expect("parses");
    assert_eq!(parsed, metadata);
}

#[test]
fn metadata_without_text_parses() {
    let value = serde_json::json!({
        "documentId": "doc-1",
        "fileName": "notes.txt",
        "chunkIndex": 3,
        "uploadDate": "2026-08-29T12:00:00Z"
    });
    let parsed = parse_metadata("doc-1-chunk-3", value).expect("parses");
    assert_eq!(parsed.chunk_index, 3);
    assert!(parsed.text.is_none());
}
