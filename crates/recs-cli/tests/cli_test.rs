//! Tests for the `recs` startup helpers and import parsing.

use std::io::Cursor;

use clap::Parser;
use pretty_assertions::assert_eq;
use recs_cli::{apply_overrides, parse_documents, Cli};
use recs_types::{EmbedderProvider, Settings, VideoDocument};

#[test]
fn test_cli_flags_override_settings() {
    let mut settings = Settings::default();
    let cli = Cli::parse_from([
        "recs",
        "--log-level",
        "debug",
        "--store-path",
        "/tmp/recs-store",
        "--embedder",
        "hashing",
        "stats",
    ]);

    apply_overrides(&mut settings, &cli);

    assert_eq!(settings.log_level, "debug");
    assert_eq!(settings.store_path, "/tmp/recs-store");
    assert_eq!(settings.embedder.provider, EmbedderProvider::Hashing);
}

#[test]
fn test_no_flags_keep_settings() {
    let mut settings = Settings::default();
    let before = settings.clone();
    let cli = Cli::parse_from(["recs", "stats"]);

    apply_overrides(&mut settings, &cli);

    assert_eq!(settings.log_level, before.log_level);
    assert_eq!(settings.store_path, before.store_path);
    assert_eq!(settings.embedder.provider, before.embedder.provider);
}

#[test]
fn test_parse_documents() {
    let input = r#"{"video_id":"v1","title":"Cats","description":"Videos about cats","tags":["pets","cats"]}

{"video_id":"v2","title":"Dogs"}
not json
{"title":"missing id"}
"#;

    let (documents, rejected) = parse_documents(Cursor::new(input)).unwrap();

    assert_eq!(rejected, 2);
    assert_eq!(
        documents,
        vec![
            VideoDocument::new(
                "v1",
                "Cats",
                "Videos about cats",
                vec!["pets".to_string(), "cats".to_string()]
            ),
            VideoDocument::new("v2", "Dogs", "", vec![]),
        ]
    );
}

#[test]
fn test_parse_empty_input() {
    let (documents, rejected) = parse_documents(Cursor::new("")).unwrap();
    assert!(documents.is_empty());
    assert_eq!(rejected, 0);
}

#[test]
fn test_import_file_from_disk() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("videos.jsonl");
    std::fs::write(
        &path,
        "{\"video_id\":\"v1\",\"title\":\"Cats\"}\n{\"video_id\":\"v2\",\"title\":\"Dogs\"}\n",
    )
    .unwrap();

    let file = std::io::BufReader::new(std::fs::File::open(&path).unwrap());
    let (documents, rejected) = parse_documents(file).unwrap();
    assert_eq!(documents.len(), 2);
    assert_eq!(rejected, 0);
}
