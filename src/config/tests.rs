use super::*;
use tempfile::TempDir;

#[test]
fn defaults_are_valid() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.pinecone.namespace, DEFAULT_NAMESPACE);
    assert_eq!(config.embedding.model, DEFAULT_EMBEDDING_MODEL);
    assert_eq!(config.chunking.chunk_size, 1000);
    assert_eq!(config.chunking.chunk_overlap, 200);
    assert_eq!(config.chunking.max_embed_size, 30000);
    assert_eq!(config.retrieval.upsert_batch_size, 25);
    assert_eq!(config.retrieval.top_k, 5);
}

#[test]
fn load_missing_file_returns_defaults() {
    let temp_dir = TempDir::new().expect("can create temp dir");

    let config = Config::load(temp_dir.path()).expect("load should succeed");

    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(config.chunking, ChunkingConfig::default());
}

#[test]
fn save_and_reload_round_trip() {
    let temp_dir = TempDir::new().expect("can create temp dir");

    let mut config = Config::load(temp_dir.path()).expect("load should succeed");
    config.pinecone.index_host = "https://my-index.svc.pinecone.io".to_string();
    config.chunking.chunk_size = 2000;
    config.retrieval.top_k = 10;
    config.save().expect("save should succeed");

    let reloaded = Config::load(temp_dir.path()).expect("reload should succeed");
    assert_eq!(
        reloaded.pinecone.index_host,
        "https://my-index.svc.pinecone.io"
    );
    assert_eq!(reloaded.chunking.chunk_size, 2000);
    assert_eq!(reloaded.retrieval.top_k, 10);
}

#[test]
fn partial_config_file_uses_defaults_for_rest() {
    let temp_dir = TempDir::new().expect("can create temp dir");
    std::fs::write(
        temp_dir.path().join("config.toml"),
        "[chunking]\nchunk_size = 500\n",
    )
    .expect("can write config");

    let config = Config::load(temp_dir.path()).expect("load should succeed");
    assert_eq!(config.chunking.chunk_size, 500);
    assert_eq!(config.chunking.chunk_overlap, 200);
    assert_eq!(config.retrieval.top_k, 5);
}

#[test]
fn rejects_overlap_larger_than_chunk_size() {
    let config = ChunkingConfig {
        chunk_size: 500,
        chunk_overlap: 500,
        max_embed_size: 30000,
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::OverlapTooLarge(500, 500))
    ));
}

#[test]
fn rejects_embed_bound_below_chunk_size() {
    let config = ChunkingConfig {
        chunk_size: 1000,
        chunk_overlap: 200,
        max_embed_size: 500,
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::MaxEmbedSizeTooSmall(500, 1000))
    ));
}

#[test]
fn rejects_out_of_range_chunk_size() {
    let config = ChunkingConfig {
        chunk_size: 10,
        chunk_overlap: 0,
        max_embed_size: 30000,
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidChunkSize(10))
    ));
}

#[test]
fn rejects_invalid_index_host() {
    let config = PineconeConfig {
        index_host: "not a url".to_string(),
        api_key: String::new(),
        namespace: DEFAULT_NAMESPACE.to_string(),
    };
    assert!(matches!(config.validate(), Err(ConfigError::InvalidUrl(_))));
}

#[test]
fn rejects_empty_namespace() {
    let config = PineconeConfig {
        index_host: String::new(),
        api_key: String::new(),
        namespace: "  ".to_string(),
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidNamespace)
    ));
}

#[test]
fn rejects_empty_model() {
    let config = EmbeddingConfig {
        base_url: DEFAULT_EMBEDDING_BASE_URL.to_string(),
        api_key: String::new(),
        model: String::new(),
    };
    assert!(matches!(config.validate(), Err(ConfigError::InvalidModel)));
}

#[test]
fn rejects_zero_batch_size() {
    let config = RetrievalConfig {
        upsert_batch_size: 0,
        ..RetrievalConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidBatchSize(0))
    ));
}

#[test]
fn rejects_excessive_top_k() {
    let config = RetrievalConfig {
        top_k: 500,
        ..RetrievalConfig::default()
    };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidTopK(500))
    ));
}
