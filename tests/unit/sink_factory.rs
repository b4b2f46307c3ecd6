use activity_harvester::progress::JobIdentity;
use activity_harvester::sink::{create_file_sink, ChunkBatch};
use activity_harvester::split::{split, DateRange};
use activity_harvester::{EntityKind, Platform};
use chrono::Utc;

fn batch() -> ChunkBatch {
    let range = DateRange::parse("2024-05-01", "2024-05-01").unwrap();
    ChunkBatch {
        job: JobIdentity::new(Platform::StackExchange, EntityKind::Question, "stackoverflow", &range),
        platform: Platform::StackExchange,
        kind: EntityKind::Question,
        scope: "stackoverflow".to_string(),
        chunk: split(&range, 1).unwrap().next().unwrap(),
        completed_at: Utc::now(),
        records: vec![serde_json::json!({ "question_id": 1, "title": "a, \"quoted\" title" })],
    }
}

#[tokio::test]
async fn test_csv_extension_selects_csv_sink() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("questions.CSV");
    let sink = create_file_sink(&path).unwrap();
    sink.write_batch(&batch()).await.unwrap();
    sink.flush().await.unwrap();

    let mut reader = csv::Reader::from_path(&path).unwrap();
    assert_eq!(&reader.headers().unwrap()[0], "job");
    let row = reader.records().next().unwrap().unwrap();
    let record: serde_json::Value = serde_json::from_str(&row[7]).unwrap();
    assert_eq!(record["title"], "a, \"quoted\" title");
}

#[tokio::test]
async fn test_other_extensions_select_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/questions.out");
    let sink = create_file_sink(&path).unwrap();
    sink.write_batch(&batch()).await.unwrap();
    sink.flush().await.unwrap();

    let line = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(value["platform"], "stackexchange");
    assert_eq!(value["record"]["question_id"], 1);
}
