//! End-to-end annotation flow against both store backends

use chartqa_annotate::aliases::AliasTable;
use chartqa_annotate::loader::load_document;
use chartqa_annotate::{AnnotateError, AnnotationService, ImageResolver, JsonFileStore, RecordStore, SqliteRecordStore, TaskStats};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::tempdir;

const BAR_CHARTS: &str = r#"{
    "bar-0": { "question": "What is the tallest bar?", "options": ["41", "42"], "image": "bar/bar-0.png" },
    "bar-1": { "metadata": { "question": "Which year peaks?" }, "choices": "2019; 2020; 2021" }
}"#;

async fn json_service(dir: &std::path::Path) -> AnnotationService {
    std::fs::write(dir.join("bar-charts.json"), BAR_CHARTS).unwrap();
    let store = JsonFileStore::open(dir, false, &AliasTable::default())
        .await
        .unwrap();
    AnnotationService::new(Arc::new(store), ImageResolver::local(), AliasTable::default())
}

async fn sqlite_service(dir: &std::path::Path) -> AnnotationService {
    let store = SqliteRecordStore::new(dir.join("annotations.db")).await.unwrap();
    let doc: Value = serde_json::from_str(BAR_CHARTS).unwrap();
    for record in load_document("bar-charts", &doc, &AliasTable::default()).unwrap() {
        store.upsert_source(record).await.unwrap();
    }
    AnnotationService::new(Arc::new(store), ImageResolver::local(), AliasTable::default())
}

async fn run_scenario(service: &AnnotationService) {
    let first = service.next_pending("bar-charts", None).await.unwrap().unwrap();
    assert_eq!(first.example_id, "bar-0");
    assert_eq!(first.options.len(), 2);

    service
        .submit("bar-charts", "bar-0", false, Some("42"))
        .await
        .unwrap();
    let next = service.next_pending("bar-charts", None).await.unwrap().unwrap();
    assert_eq!(next.example_id, "bar-1");
    assert_eq!(next.question.as_deref(), Some("Which year peaks?"));
    assert_eq!(
        service.stats("bar-charts").await.unwrap(),
        TaskStats { total: 2, answered: 1, missing: 0, remaining: 1 }
    );

    service
        .submit("bar-charts", "bar-1", true, None)
        .await
        .unwrap();
    assert!(service.next_pending("bar-charts", None).await.unwrap().is_none());

    let completed = service.export("bar-charts", true).await.unwrap();
    assert_eq!(completed["bar-0"]["human_prediction"], json!("42"));
    assert_eq!(completed["bar-0"]["missing_information"], json!(false));
    assert_eq!(completed["bar-1"]["missing_information"], json!(true));
    assert!(completed["bar-1"].get("human_prediction").is_none());
}

#[tokio::test]
async fn test_bar_charts_scenario_json_store() {
    let dir = tempdir().unwrap();
    let service = json_service(dir.path()).await;
    run_scenario(&service).await;
}

#[tokio::test]
async fn test_bar_charts_scenario_sqlite_store() {
    let dir = tempdir().unwrap();
    let service = sqlite_service(dir.path()).await;
    run_scenario(&service).await;
}

#[tokio::test]
async fn test_completed_export_is_subset_of_full_export() {
    let dir = tempdir().unwrap();
    let service = json_service(dir.path()).await;
    service
        .submit("bar-charts", "bar-1", false, Some(" B "))
        .await
        .unwrap();

    let full = service.export("bar-charts", false).await.unwrap();
    let completed = service.export("bar-charts", true).await.unwrap();
    assert_eq!(full.keys().collect::<Vec<_>>(), vec!["bar-0", "bar-1"]);
    assert_eq!(completed.keys().collect::<Vec<_>>(), vec!["bar-1"]);
    for (id, doc) in &completed {
        assert_eq!(Some(doc), full.get(id));
        assert_eq!(doc["human_prediction"], json!("B"));
    }
    assert!(full["bar-0"].get("human_prediction").is_none());
    assert_eq!(full["bar-0"]["missing_information"], json!(false));
}

#[tokio::test]
async fn test_export_reimport_round_trip() {
    let dir = tempdir().unwrap();
    let service = json_service(dir.path()).await;
    service
        .submit("bar-charts", "bar-0", false, Some("42"))
        .await
        .unwrap();
    service
        .submit("bar-charts", "bar-1", true, None)
        .await
        .unwrap();
    let exported = service.export("bar-charts", false).await.unwrap();

    let fresh = tempdir().unwrap();
    std::fs::write(
        fresh.path().join("bar-charts.json"),
        serde_json::to_string(&Value::Object(exported.clone())).unwrap(),
    )
    .unwrap();
    let reloaded = JsonFileStore::open(fresh.path(), false, &AliasTable::default())
        .await
        .unwrap();
    let reloaded = AnnotationService::new(Arc::new(reloaded), ImageResolver::local(), AliasTable::default());

    assert_eq!(reloaded.export("bar-charts", false).await.unwrap(), exported);
    assert_eq!(reloaded.stats("bar-charts").await.unwrap().remaining, 0);
}

#[tokio::test]
async fn test_missing_then_answer_overwrites() {
    let dir = tempdir().unwrap();
    let service = sqlite_service(dir.path()).await;
    service
        .submit("bar-charts", "bar-0", true, None)
        .await
        .unwrap();
    let record = service
        .submit("bar-charts", "bar-0", false, Some("41"))
        .await
        .unwrap();
    assert!(!record.missing_information);
    assert_eq!(record.human_prediction.as_deref(), Some("41"));

    let stats = service.stats("bar-charts").await.unwrap();
    assert_eq!(stats.answered + stats.missing + stats.remaining, stats.total);
    assert_eq!(stats.missing, 0);
}

#[tokio::test]
async fn test_edits_merge_into_payload() {
    let dir = tempdir().unwrap();
    let service = json_service(dir.path()).await;

    let update = service
        .update_question("bar-charts", "bar-1", "  Which year is highest?  ")
        .await
        .unwrap();
    assert_eq!(update.question, "Which year is highest?");
    assert_eq!(update.json_blob["question"], json!("Which year is highest?"));
    assert_eq!(update.json_blob["metadata"]["question"], json!("Which year is highest?"));

    let update = service
        .update_options("bar-charts", "bar-1", &["2019", "", "2021"])
        .await
        .unwrap();
    assert_eq!(update.json_blob["choices"], json!(["2019", "2021"]));
    assert!(update.json_blob.get("options").is_none());

    let view = service.next_pending("bar-charts", Some("bar-0")).await.unwrap().unwrap();
    assert_eq!(view.options.len(), 2);
    assert_eq!(view.options[1].label, "B");
    assert_eq!(view.options[1].text, "2021");
}

#[tokio::test]
async fn test_validation_errors_leave_store_untouched() {
    let dir = tempdir().unwrap();
    let service = json_service(dir.path()).await;
    let before = service.export("bar-charts", false).await.unwrap();

    assert!(matches!(
        service.update_question("bar-charts", "bar-0", "   ").await,
        Err(AnnotateError::Validation(_))
    ));
    assert!(matches!(
        service.update_options("bar-charts", "bar-0", &[" ", ""]).await,
        Err(AnnotateError::Validation(_))
    ));
    assert!(matches!(
        service.submit("bar-charts", "bar-0", false, None).await,
        Err(AnnotateError::Validation(_))
    ));
    assert!(matches!(
        service.submit("line-charts", "line-0", true, None).await,
        Err(AnnotateError::NotFound(_))
    ));

    assert_eq!(service.export("bar-charts", false).await.unwrap(), before);
}
