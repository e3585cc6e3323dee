use std::fs;
use std::io::Write;
use tempfile::TempDir;

use ragdb_core::chunker::chunk;
use ragdb_core::config::{Config, EmbedderKind, VectorBackendKind};
use ragdb_core::data_processor::DataProcessor;
use ragdb_core::types::{ChunkId, DocumentId, IngestState};
use ragdb_core::Error;

fn sample_text(len: usize) -> String {
    "The quick brown fox jumps over the lazy dog. ".chars().cycle().take(len).collect()
}

#[test]
fn chunks_cover_text_without_gaps() {
    let doc = DocumentId::from("doc");
    for (len, size, overlap) in [(0, 10, 0), (1, 10, 3), (10, 10, 3), (11, 10, 3), (257, 64, 16), (500, 7, 6)] {
        let text = sample_text(len);
        let chunks = chunk(&doc, &text, size, overlap).expect("chunk");
        if len == 0 {
            assert!(chunks.is_empty());
            continue;
        }
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks.last().map(|c| c.end), Some(len), "last chunk reaches the end");
        for pair in chunks.windows(2) {
            assert!(pair[1].start <= pair[0].end, "no gap between consecutive chunks");
            assert_eq!(pair[0].end - pair[1].start, overlap, "consecutive chunks share the overlap window");
        }
        for c in &chunks {
            assert!(c.end <= len && c.start < c.end);
            assert!(c.char_len() <= size);
            let expected: String = text.chars().skip(c.start).take(c.char_len()).collect();
            assert_eq!(c.text, expected, "text matches offsets");
        }
    }
}

#[test]
fn chunking_is_deterministic() {
    let doc = DocumentId::from("doc");
    let text = sample_text(1234);
    let a = chunk(&doc, &text, 100, 20).expect("chunk");
    let b = chunk(&doc, &text, 100, 20).expect("chunk");
    assert_eq!(a, b);
    let ids: Vec<String> = a.iter().map(|c| c.id.to_string()).collect();
    assert_eq!(ids[0], "doc#0");
    assert_eq!(ids[2], "doc#2");
}

#[test]
fn three_chunk_document() {
    let chunks = chunk(&DocumentId::from("doc"), &sample_text(260), 100, 20).expect("chunk");
    assert_eq!(chunks.len(), 3);
    assert_eq!((chunks[2].start, chunks[2].end), (160, 260));
    assert!(chunks.iter().enumerate().all(|(i, c)| c.position == i));
}

#[test]
fn invalid_chunk_configuration_is_rejected() {
    let doc = DocumentId::from("doc");
    assert!(matches!(chunk(&doc, "abc", 0, 0), Err(Error::InvalidConfiguration(_))));
    assert!(matches!(chunk(&doc, "abc", 10, 10), Err(Error::InvalidConfiguration(_))));
    assert!(matches!(chunk(&doc, "abc", 10, 11), Err(Error::InvalidConfiguration(_))));
}

#[test]
fn chunk_ids_order_numerically_and_round_trip_text_form() {
    let doc = DocumentId::from("a#b");
    let two = ChunkId::new(doc.clone(), 2);
    let ten = ChunkId::new(doc, 10);
    assert!(two < ten);
    let parsed: ChunkId = ten.to_string().parse().expect("parse");
    assert_eq!(parsed, ten);
    assert!("no-separator".parse::<ChunkId>().is_err());
}

#[test]
fn ingest_state_transitions() {
    assert!(IngestState::Pending.can_advance_to(IngestState::Chunking));
    assert!(IngestState::Indexing.can_advance_to(IngestState::Committed));
    assert!(IngestState::Chunking.can_advance_to(IngestState::Failed));
    assert!(!IngestState::Pending.can_advance_to(IngestState::Committed));
    assert!(!IngestState::Committed.can_advance_to(IngestState::Failed));
}

#[test]
fn config_defaults_and_overrides() {
    let cfg = Config::from_toml_str("").rag().expect("defaults");
    assert_eq!(cfg.bm25.k1, 1.5);
    assert_eq!(cfg.bm25.b, 0.75);
    assert_eq!(cfg.vector.backend, VectorBackendKind::Flat);
    assert_eq!(cfg.embedder.kind, EmbedderKind::Hashing);

    let cfg = Config::from_toml_str(
        r#"
        [chunking]
        size = 100
        overlap = 20

        [retrieval]
        alpha = 0.8
        top_k = 2

        [vector]
        backend = "lance"
        metric = "inner_product"
        "#,
    )
    .rag()
    .expect("overrides");
    assert_eq!((cfg.chunking.size, cfg.chunking.overlap), (100, 20));
    assert_eq!(cfg.retrieval.top_k, 2);
    assert_eq!(cfg.vector.backend, VectorBackendKind::Lance);
    let top_k: usize = Config::from_toml_str("[retrieval]\ntop_k = 9").get("retrieval.top_k").expect("get");
    assert_eq!(top_k, 9);
}

#[test]
fn invalid_config_values_fail_validation() {
    for toml in [
        "[retrieval]\nalpha = 1.5",
        "[retrieval]\ntop_k = 0",
        "[bm25]\nb = 2.0",
        "[bm25]\nk1 = -1.0",
        "[chunking]\nsize = 10\noverlap = 10",
    ] {
        assert!(
            matches!(Config::from_toml_str(toml).rag(), Err(Error::InvalidConfiguration(_))),
            "{toml} should be rejected"
        );
    }
}

#[test]
fn load_directory_single_small_file() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    let file_path = dir.join("a.txt");
    let mut f = fs::File::create(&file_path).unwrap();
    writeln!(f, "Short text").unwrap();

    let processor = DataProcessor::new();
    let docs = processor.load_directory(dir).expect("load");

    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].id.as_str(), "a");
    assert_eq!(docs[0].filename, "a.txt");
    assert_eq!(docs[0].text.trim(), "Short text");
}

#[test]
fn load_directory_limited_two_files_limit_one() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir_all(dir.join("sub")).unwrap();
    fs::write(dir.join("a.txt"), "alpha bravo").unwrap();
    fs::write(dir.join("sub/b.txt"), "charlie delta").unwrap();
    fs::write(dir.join("ignored.md"), "echo").unwrap();

    let processor = DataProcessor::new();
    assert_eq!(processor.load_directory(dir).expect("load").len(), 2);
    let docs = processor.load_directory_limited(dir, 1).expect("load limited");
    assert_eq!(docs.len(), 1, "limited to one source document");

    let ids: Vec<String> = processor.load_directory(dir).unwrap().into_iter().map(|d| d.id.to_string()).collect();
    assert_eq!(ids, vec!["a".to_string(), "sub/b".to_string()]);
}

#[test]
fn load_missing_directory_is_not_found() {
    let processor = DataProcessor::new();
    assert!(matches!(
        processor.load_directory(std::path::Path::new("/definitely/not/here")),
        Err(Error::NotFound(_))
    ));
}
