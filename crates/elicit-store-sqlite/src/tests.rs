//! Integration tests for `SqliteStore` against an in-memory database.

use elicit_core::{
  Candidate, Curation, DedupPolicy, Estimator, EstimatorConfig, Evidence,
  EvidenceStore, EvidenceWindow, Policy, Runner, Schema, SourceDocument,
  VariableKind,
  dedup::MatchMode,
  labelling::{KeywordMatch, LabellingFunction, LoadedFunction},
  record::{ExtractionId, PushOutcome},
};

use crate::{Error, SqliteStore};

const SCHEMA: &str = r#"
offense = ["murder", "manslaughter"]
victim_age = "continuous"
"#;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
    .with_schema(Schema::from_toml_str(SCHEMA).expect("schema"))
}

fn candidate(value: &str, confidence: f64, exact: &str, local: &str) -> Candidate {
  Candidate::new(value, confidence, Evidence::new(exact, local, local))
}

async fn push(
  s: &SqliteStore,
  document: &str,
  method: &str,
  c: Candidate,
) -> PushOutcome {
  s.push(document, "offense", c, method).await.unwrap()
}

// ─── Push ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn identical_push_is_idempotent_and_keeps_max_confidence() {
  let s = store().await;

  let first = push(&s, "D1", "qa", candidate("murder", 0.4, "murder", "of murder")).await;
  let second = push(&s, "D1", "qa", candidate("murder", 0.9, "murder", "of murder")).await;
  let third = push(&s, "D1", "qa", candidate("murder", 0.2, "murder", "of murder")).await;

  assert!(!first.merged && !first.raw_updated);
  assert!(second.merged && second.raw_updated);
  assert_eq!(first.extraction_id, second.extraction_id);
  assert_eq!(first.raw_extraction_id, third.raw_extraction_id);

  let snap = s.variable_snapshot("offense").await.unwrap();
  assert_eq!(snap.variables.len(), 1);
  assert_eq!(snap.extractions.len(), 1);
  assert_eq!(snap.raw.len(), 1);
  assert_eq!(snap.raw[0].confidence, 0.9);
}

#[tokio::test]
async fn concurrent_pushes_share_one_extraction() {
  let s = store().await;

  let handles: Vec<_> = (0..20)
    .map(|i| {
      let s = s.clone();
      let method = if i % 2 == 0 { "qa" } else { "nli" };
      let confidence = match method {
        "qa" => 0.5 + f64::from(i) * 0.02,
        _ => 0.57 + f64::from(i) * 0.02,
      };
      tokio::spawn(async move {
        s.push(
          "D1",
          "offense",
          candidate("murder", confidence, "murder", "of murder"),
          method,
        )
        .await
      })
    })
    .collect();
  for handle in handles {
    handle.await.unwrap().unwrap();
  }

  let snap = s.variable_snapshot("offense").await.unwrap();
  assert_eq!(snap.variables.len(), 1);
  assert_eq!(snap.extractions.len(), 1);
  assert_eq!(snap.raw.len(), 2);
  let best = |method: &str| {
    snap.raw.iter().find(|r| r.method == method).map(|r| r.confidence).unwrap()
  };
  assert!((best("qa") - 0.86).abs() < 1e-9);
  assert!((best("nli") - 0.95).abs() < 1e-9);
}

#[tokio::test]
async fn overlapping_contexts_collapse_into_one_extraction() {
  let s = store().await;

  let a = push(
    &s,
    "D1",
    "keyword",
    candidate("murder", 1.0, "pleaded guilty", "the defendant pleaded guilty"),
  )
  .await;
  let b = push(
    &s,
    "D1",
    "qa",
    candidate("murder", 0.7, "guilty to murder", "pleaded guilty to murder"),
  )
  .await;

  assert!(b.merged);
  assert_eq!(a.extraction_id, b.extraction_id);

  let evidence = s.document_evidence("D1", "offense").await.unwrap();
  assert_eq!(evidence.len(), 1);
  assert_eq!(evidence[0].extractions.len(), 1);
  let methods: Vec<&str> =
    evidence[0].extractions[0].raw.iter().map(|r| r.method.as_str()).collect();
  assert_eq!(methods, ["keyword", "qa"]);
}

#[tokio::test]
async fn exact_dedup_policy_keeps_distinct_quotes_apart() {
  let s = store().await.with_dedup(DedupPolicy {
    mode: MatchMode::Exact,
    ..Default::default()
  });

  push(&s, "D1", "keyword", candidate("murder", 1.0, "murder", "convicted of murder")).await;
  let b = push(&s, "D1", "qa", candidate("murder", 0.6, "of murder", "of murder")).await;
  assert!(!b.merged);
  assert_eq!(s.variable_snapshot("offense").await.unwrap().extractions.len(), 2);
}

#[tokio::test]
async fn distinct_values_never_share_extractions() {
  let s = store().await;
  let a = push(&s, "D1", "qa", candidate("murder", 0.6, "killing", "the killing")).await;
  let b = push(&s, "D1", "nli", candidate("manslaughter", 0.5, "killing", "the killing")).await;
  assert_ne!(a.variable_id, b.variable_id);
  assert_ne!(a.extraction_id, b.extraction_id);
}

#[tokio::test]
async fn schema_violation_leaves_store_unchanged() {
  let s = store().await;
  push(&s, "D1", "keyword", candidate("murder", 1.0, "murder", "of murder")).await;
  let before = s.variable_snapshot("offense").await.unwrap();
  let documents_before = s.list_documents().await.unwrap();

  let err = s
    .push("D2", "offense", candidate("arson", 1.0, "fire", "set a fire"), "keyword")
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Core(elicit_core::Error::SchemaViolation { .. })
  ));

  assert_eq!(s.variable_snapshot("offense").await.unwrap(), before);
  assert_eq!(s.list_documents().await.unwrap(), documents_before);
}

#[tokio::test]
async fn abstain_and_undeclared_variables_are_accepted() {
  let s = store().await;
  s.push("D1", "offense", candidate("ABSTAIN", 0.3, "", ""), "qa")
    .await
    .unwrap();
  s.push("D1", "judge", candidate("Smith J", 0.8, "Smith J", "before Smith J"), "qa")
    .await
    .unwrap();
  s.push("D1", "victim_age", candidate("42", 0.8, "42", "aged 42"), "qa")
    .await
    .unwrap();

  assert_eq!(
    s.list_variable_names().await.unwrap(),
    ["judge", "offense", "victim_age"]
  );
}

#[tokio::test]
async fn empty_contexts_merge_only_with_each_other() {
  let s = store().await;
  let a = push(&s, "D1", "qa", candidate("murder", 0.3, "", "")).await;
  let b = push(&s, "D1", "nli", candidate("murder", 0.2, "", "")).await;
  let c = push(&s, "D1", "keyword", candidate("murder", 1.0, "murder", "of murder")).await;
  assert_eq!(a.extraction_id, b.extraction_id);
  assert_ne!(a.extraction_id, c.extraction_id);
}

#[test]
fn unique_constraint_failures_are_dedup_violations() {
  let failure = rusqlite::Error::SqliteFailure(
    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE),
    Some("UNIQUE constraint failed: raw_extraction.extraction_id".into()),
  );
  let err = Error::from_write(tokio_rusqlite::Error::Rusqlite(failure));
  assert!(matches!(
    err,
    Error::Core(elicit_core::Error::DedupInvariantViolation(_))
  ));

  let other = Error::from_write(tokio_rusqlite::Error::ConnectionClosed);
  assert!(matches!(other, Error::Database(_)));
}

// ─── Preparation & reads ─────────────────────────────────────────────────────

#[tokio::test]
async fn prepare_creates_declared_values_and_abstain() {
  let s = store().await;
  s.prepare_documents(&["D1".into(), "D2".into()]).await.unwrap();
  // Idempotent.
  s.prepare_documents(&["D1".into()]).await.unwrap();

  let values: Vec<(String, String)> = s
    .get_variables("D1")
    .await
    .unwrap()
    .into_iter()
    .map(|v| (v.variable_name, v.variable_value))
    .collect();
  assert_eq!(
    values,
    [
      ("offense".to_owned(), "murder".to_owned()),
      ("offense".to_owned(), "manslaughter".to_owned()),
      ("offense".to_owned(), "ABSTAIN".to_owned()),
      ("victim_age".to_owned(), "ABSTAIN".to_owned()),
    ]
  );
  assert_eq!(s.list_documents().await.unwrap().len(), 2);

  // Prepared rows are reused by later pushes.
  let id = s.push_variable("D1", "offense", "murder").await.unwrap();
  assert_eq!(id, s.get_variables("D1").await.unwrap()[0].variable_id);
}

#[tokio::test]
async fn missing_names_read_as_empty() {
  let s = store().await;
  assert!(s.get_variables("nope").await.unwrap().is_empty());
  assert!(s.document_evidence("nope", "offense").await.unwrap().is_empty());
  assert!(s.variable_snapshot("nope").await.unwrap().variables.is_empty());
  assert!(!s.set_valid(99, Some(true)).await.unwrap());
  assert!(!s.set_validated_context(99, "x".into()).await.unwrap());
  assert!(s.record_explanation(99, "x".into()).await.unwrap().is_none());
}

#[tokio::test]
async fn validated_queries_filter_by_judgement() {
  let s = store().await;
  let d1 = push(&s, "D1", "keyword", candidate("murder", 1.0, "murder", "of murder")).await;
  let d2 = push(&s, "D2", "keyword", candidate("murder", 1.0, "murder", "of murder")).await;
  push(&s, "D3", "keyword", candidate("murder", 1.0, "murder", "of murder")).await;
  s.set_valid(d1.extraction_id, Some(true)).await.unwrap();
  s.set_valid(d2.extraction_id, Some(false)).await.unwrap();

  assert_eq!(
    s.get_validated_document_names("offense", false).await.unwrap(),
    ["D1"]
  );
  assert_eq!(
    s.get_validated_document_names("offense", true).await.unwrap(),
    ["D1", "D2"]
  );

  let docs = ["D1".to_owned(), "D2".to_owned(), "D3".to_owned()];
  let judged = s.get_validated_extractions(&docs, "offense", true).await.unwrap();
  assert_eq!(judged.len(), 2);
  assert_eq!(judged[1].document_name, "D2");
  assert_eq!(judged[1].extraction.valid, Some(false));
  assert_eq!(judged[1].variable.variable_value, "murder");

  let only_d2 = s
    .get_validated_extractions(&docs[1..2], "offense", false)
    .await
    .unwrap();
  assert!(only_d2.is_empty());
}

// ─── Curation ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn end_to_end_scenario() {
  let s = store().await;
  let curation = Curation::new(&s);

  let a = push(&s, "D1", "keyword", candidate("murder", 1.0, "murder", "convicted of murder"))
    .await;
  let b = push(
    &s,
    "D1",
    "qa",
    candidate("murder", 0.6, "of murder", "of murder she was convicted"),
  )
  .await;
  assert_eq!(a.extraction_id, b.extraction_id);

  let snap = s.variable_snapshot("offense").await.unwrap();
  assert_eq!(snap.variables.len(), 1);
  assert_eq!(snap.variables[0].variable_value, "murder");
  assert_eq!(snap.extractions.len(), 1);
  let votes: Vec<(&str, f64)> =
    snap.raw.iter().map(|r| (r.method.as_str(), r.confidence)).collect();
  assert_eq!(votes, [("keyword", 1.0), ("qa", 0.6)]);

  let view = curation.document_extractions("D1", "offense").await.unwrap();
  assert_eq!(view.len(), 1);
  assert_eq!(view[0].agreement.to_string(), "2/2");
  assert!(view[0].leading);

  let before = curation.download_data().await.unwrap();
  assert_eq!(before.len(), 1);
  assert!(!before[0].values.contains_key("offense"));

  assert!(curation.submit_answer(a.extraction_id, true).await.unwrap());

  let after = curation.download_data().await.unwrap();
  assert_eq!(after[0].document_name, "D1");
  assert_eq!(after[0].values["offense"], ["murder"]);
}

#[tokio::test]
async fn explanations_and_validated_context() {
  let s = store().await;
  let curation = Curation::new(&s);
  let e = push(&s, "D1", "qa", candidate("murder", 0.6, "murder", "of murder")).await;

  let first = curation
    .submit_explanation(e.extraction_id, "quoted from the verdict".into())
    .await
    .unwrap()
    .unwrap();
  curation
    .submit_explanation(e.extraction_id, "second look".into())
    .await
    .unwrap();
  let all = curation.explanations(e.extraction_id).await.unwrap();
  assert_eq!(all.len(), 2);
  assert_eq!(all[0], first);
  assert_eq!(all[1].text, "second look");

  assert!(
    curation
      .submit_validated_context(e.extraction_id, "convicted of murder".into())
      .await
      .unwrap()
  );
  let snap = s.variable_snapshot("offense").await.unwrap();
  assert_eq!(
    snap.extractions[0].validated_context.as_deref(),
    Some("convicted of murder")
  );

  assert!(curation.clear_answer(e.extraction_id).await.unwrap());
  assert_eq!(s.variable_snapshot("offense").await.unwrap().extractions[0].valid, None);
}

#[tokio::test]
async fn export_and_status() {
  let s = store().await;
  let curation = Curation::new(&s);
  s.prepare_documents(&["D1".into(), "D2".into()]).await.unwrap();
  let murder = push(&s, "D1", "keyword", candidate("murder", 1.0, "murder", "of murder")).await;
  push(&s, "D1", "qa", candidate("manslaughter", 0.4, "killing", "the killing")).await;
  curation.submit_answer(murder.extraction_id, true).await.unwrap();

  let csv = curation.export_csv().await.unwrap();
  let lines: Vec<&str> = csv.lines().collect();
  assert_eq!(lines[0], "document_name,offense,victim_age");
  assert_eq!(lines[1], r#"D1,"[""murder""]",[]"#);
  assert_eq!(lines[2], "D2,[],[]");

  let status = curation.document_status("D1").await.unwrap();
  assert_eq!(status.with_evidence, 1);
  assert_eq!(status.touched, 1);
  assert_eq!(status.complete, 0);
  assert_eq!(
    curation.document_status("D2").await.unwrap(),
    Default::default()
  );
}

#[tokio::test]
async fn precision_and_performance_from_the_store() {
  let s = store().await;
  let curation = Curation::new(&s);
  let right = push(&s, "D1", "keyword", candidate("murder", 1.0, "murder", "of murder")).await;
  let wrong = push(&s, "D1", "qa", candidate("manslaughter", 0.5, "killing", "the killing")).await;
  curation.submit_answer(right.extraction_id, true).await.unwrap();
  curation.submit_answer(wrong.extraction_id, false).await.unwrap();

  let precision = curation.method_precision("offense", false).await.unwrap();
  assert_eq!(precision["keyword"], 1.0);
  assert_eq!(precision["qa"], 0.0);

  let performance = curation
    .performance(elicit_core::PerformanceKind::Agreement)
    .await
    .unwrap();
  assert_eq!(performance["offense"], 1.0);
}

// ─── Estimators ──────────────────────────────────────────────────────────────

/// Four documents where `keyword` backs murder and `qa` backs manslaughter;
/// the first two are curated in favour of murder.
async fn curated_store() -> (SqliteStore, Vec<ExtractionId>) {
  let s = store().await;
  let mut murders = Vec::new();
  for doc in ["D1", "D2", "D3", "D4"] {
    let m = push(&s, doc, "keyword", candidate("murder", 1.0, "murder", "of murder")).await;
    let k = push(&s, doc, "qa", candidate("manslaughter", 0.7, "killing", "the killing"))
      .await;
    push(&s, doc, "nli", candidate("murder", 0.4, "murder", "of murder")).await;
    if doc == "D1" || doc == "D2" {
      s.set_valid(m.extraction_id, Some(true)).await.unwrap();
      s.set_valid(k.extraction_id, Some(false)).await.unwrap();
    }
    murders.push(m.extraction_id);
  }
  (s, murders)
}

#[tokio::test]
async fn supervised_estimation_is_idempotent() {
  let (s, murders) = curated_store().await;
  let estimator = Estimator::new(&s, EstimatorConfig::default());

  let summary = estimator.run(Policy::Supervised).await.unwrap();
  assert_eq!(summary.updated, ["offense"]);
  let first = s.variable_snapshot("offense").await.unwrap();

  estimator.run(Policy::Supervised).await.unwrap();
  let second = s.variable_snapshot("offense").await.unwrap();
  assert_eq!(first, second);

  let meta = |id| {
    first.extractions.iter().find(|e| e.extraction_id == id).unwrap().meta_confidence
  };
  assert!(meta(murders[3]).unwrap() > 0.5);
  assert!(first.variables.iter().all(|v| v.value_confidence.is_some()));
}

#[tokio::test]
async fn insufficient_training_data_skips_and_keeps_confidences() {
  let s = store().await;
  push(&s, "D1", "keyword", candidate("murder", 1.0, "murder", "of murder")).await;
  push(&s, "D1", "qa", candidate("manslaughter", 0.5, "killing", "the killing")).await;
  let estimator = Estimator::new(&s, EstimatorConfig::default());

  estimator.run(Policy::Agreement).await.unwrap();
  let after_agreement = s.variable_snapshot("offense").await.unwrap();
  let shares: Vec<Option<f64>> =
    after_agreement.variables.iter().map(|v| v.value_confidence).collect();
  assert_eq!(shares, [Some(1.0 / 1.5), Some(0.5 / 1.5)]);
  // Agreement never writes meta_confidence.
  assert!(after_agreement.extractions.iter().all(|e| e.meta_confidence.is_none()));

  let summary = estimator.run(Policy::Supervised).await.unwrap();
  assert_eq!(summary.skipped, ["offense"]);
  assert!(summary.updated.is_empty());
  assert_eq!(s.variable_snapshot("offense").await.unwrap(), after_agreement);
}

#[tokio::test]
async fn generative_estimation_writes_both_confidences() {
  let (s, murders) = curated_store().await;
  let summary = Estimator::new(&s, EstimatorConfig::default())
    .run(Policy::Generative)
    .await
    .unwrap();
  assert_eq!(summary.updated, ["offense"]);

  let snap = s.variable_snapshot("offense").await.unwrap();
  assert!(snap.extractions.iter().all(|e| e.meta_confidence.is_some()));
  assert!(snap.variables.iter().all(|v| v.value_confidence.is_some()));
  // Curated extractions are pinned to their judgement.
  let d1 = snap.extractions.iter().find(|e| e.extraction_id == murders[0]).unwrap();
  assert_eq!(d1.meta_confidence, Some(1.0));
}

// ─── Labelling functions ─────────────────────────────────────────────────────

#[tokio::test]
async fn keyword_runner_pushes_and_merges() {
  let s = store().await;
  let runner = Runner::new(&s);
  let documents = [
    SourceDocument::new("D1", "She was convicted of murder. The murder was planned."),
    SourceDocument::new("D2", "A verdict of manslaughter was returned."),
  ];
  runner.prepare(&documents).await.unwrap();

  let lf = KeywordMatch::from_toml_str(
    "[offense]\nmurder = [\"murder\"]\nmanslaughter = [\"manslaughter\"]\n",
    EvidenceWindow { local_padding: 10, wider_padding: 40, max_chars: 100 },
  )
  .unwrap();
  let report = runner.run(&lf, &documents).await.unwrap();
  assert_eq!(report.method, "keyword");
  assert_eq!(report.documents, 2);
  assert_eq!(report.pushed, 3);
  assert_eq!(report.failed, 0);

  let d1 = Curation::new(&s).document_extractions("D1", "offense").await.unwrap();
  let murder = d1.iter().find(|c| c.value == "murder").unwrap();
  assert!(murder.leading);
  assert_eq!(murder.agreement.to_string(), "1/1");
}

struct Flaky;
struct LoadedFlaky;

impl LabellingFunction for Flaky {
  type Loaded = LoadedFlaky;

  fn method(&self) -> &str { "flaky" }

  fn handles(&self, _kind: &VariableKind) -> bool { true }

  fn load(&self) -> elicit_core::Result<LoadedFlaky> { Ok(LoadedFlaky) }
}

impl LoadedFunction for LoadedFlaky {
  fn extract(
    &self,
    document: &str,
    variable: &str,
    _kind: &VariableKind,
    _text: &str,
  ) -> elicit_core::Result<Vec<Candidate>> {
    match variable {
      "offense" => Ok(vec![
        candidate("murder", 0.9, "murder", "of murder"),
        candidate("arson", 0.5, "fire", "a fire"),
      ]),
      _ if document == "bad" => {
        Err(std::io::Error::other("model crashed").into())
      }
      _ => Ok(vec![candidate("42", 0.8, "42", "aged 42")]),
    }
  }
}

#[tokio::test]
async fn runner_isolates_failures_and_rejections() {
  let s = store().await;
  let runner = Runner::new(&s);
  let documents = [
    SourceDocument::new("bad", "irrelevant"),
    SourceDocument::new("good", "irrelevant"),
  ];
  runner.prepare(&documents).await.unwrap();

  let report = runner.run(&Flaky, &documents).await.unwrap();
  assert_eq!(report.documents, 2);
  assert_eq!(report.failed, 1);
  assert_eq!(report.rejected, 1);
  assert_eq!(report.pushed, 2);

  // Nothing from the failed document was written, not even its offense vote.
  let bad = s.document_evidence("bad", "offense").await.unwrap();
  assert!(!bad.is_empty());
  assert!(bad.iter().all(|v| v.extractions.is_empty()));

  let good = s.variable_snapshot("victim_age").await.unwrap();
  assert!(good.variables.iter().any(|v| v.variable_value == "42"));
}
