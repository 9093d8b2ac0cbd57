//! The re-evaluation sweep.
//!
//! A sweep walks every pending AI cell (column by column, top to bottom),
//! renders its prompt from the row's current values, sends it to a
//! [`Completer`] and merges the answer back. Calls are sequential.
//!
//! The sheet lock is only held while picking the next job and while merging,
//! never across the network call. If the row's inputs changed in between,
//! the answer is dropped and the cell stays pending for the next sweep.
//! Failed calls leave the cell unchanged and pending as well. Each cell is
//! attempted at most once per sweep.

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};

use crate::client::Completer;
use crate::events::{EventHandler, SweepEvent};
use crate::response;
use crate::sheet::{self, MergeOutcome, Sheet};

/// Outcome counts of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Cells a prompt was sent for.
    pub attempted: usize,
    /// Cells overwritten with a new value.
    pub updated: usize,
    /// Calls that failed (transport, status or non-JSON body).
    pub failed: usize,
    /// Answers dropped because the row changed during the call.
    pub stale: usize,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Run one sweep over `sheet`.
pub async fn sweep(
    sheet: &Mutex<Sheet>,
    completer: &dyn Completer,
    handler: &dyn EventHandler,
) -> SweepReport {
    let start = Instant::now();
    let mut report = SweepReport::default();
    let mut attempted: HashSet<(usize, String)> = HashSet::new();

    let pending = sheet::lock(sheet).pending_jobs().len();
    handler.on_event(&SweepEvent::Started { pending });

    loop {
        let next = {
            let guard = sheet::lock(sheet);
            guard.next_pending(&attempted)
        };
        let Some(job) = next else {
            break;
        };
        attempted.insert((job.row, job.column.clone()));
        report.attempted += 1;

        handler.on_event(&SweepEvent::CellRequested {
            row: job.row,
            column: &job.column,
            prompt: &job.prompt,
        });

        let answer = match completer.complete(&job.prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                report.failed += 1;
                handler.on_event(&SweepEvent::CellFailed {
                    row: job.row,
                    column: &job.column,
                    error: &e.to_string(),
                });
                continue;
            }
        };

        let cell = response::interpret(&answer);
        let outcome = sheet::lock(sheet).merge(&job, cell.value.clone(), cell.note.clone());
        match outcome {
            Ok(MergeOutcome::Applied) => {
                report.updated += 1;
                handler.on_event(&SweepEvent::CellUpdated {
                    row: job.row,
                    column: &job.column,
                    value: &cell.value,
                    note: cell.note.as_deref(),
                });
            }
            Ok(MergeOutcome::Stale) | Err(_) => {
                report.stale += 1;
                handler.on_event(&SweepEvent::CellStale {
                    row: job.row,
                    column: &job.column,
                });
            }
        }
    }

    report.elapsed = start.elapsed();
    handler.on_event(&SweepEvent::Finished { report: &report });
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{CompletionError, CompletionFuture, HeuristicCompleter};
    use crate::events::NoopHandler;
    use crate::preset::PresetLibrary;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Heuristic answers, counting every call and remembering prompts.
    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
        prompts: Mutex<Vec<String>>,
    }

    impl Counting {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Completer for Counting {
        fn complete<'a>(&'a self, prompt: &'a str) -> CompletionFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            HeuristicCompleter.complete(prompt)
        }
    }

    struct Failing;

    impl Completer for Failing {
        fn complete<'a>(&'a self, _prompt: &'a str) -> CompletionFuture<'a> {
            Box::pin(async {
                Err(CompletionError::Status {
                    status: 502,
                    body: "bad gateway".into(),
                })
            })
        }
    }

    /// Edits the row's Major while "in flight", then answers.
    struct EditsDuringCall {
        sheet: Arc<Mutex<Sheet>>,
    }

    impl Completer for EditsDuringCall {
        fn complete<'a>(&'a self, _prompt: &'a str) -> CompletionFuture<'a> {
            Box::pin(async move {
                sheet::lock(&self.sheet)
                    .update_cell(0, "Major", "Philosophy")
                    .unwrap();
                Ok(json!({"isEngineer": true}))
            })
        }
    }

    fn students() -> Mutex<Sheet> {
        Mutex::new(PresetLibrary::builtin().instantiate("students").unwrap())
    }

    #[tokio::test]
    async fn students_sweep_fills_ai_column() {
        let sheet = students();
        let completer = Counting::default();

        let report = sweep(&sheet, &completer, &NoopHandler).await;
        assert_eq!(report.attempted, 3);
        assert_eq!(report.updated, 3);
        assert_eq!(completer.calls(), 3);

        let s = sheet::lock(&sheet);
        assert_eq!(s.cell(0, "isEngineer"), Some("Yes"));
        assert_eq!(s.cell(1, "isEngineer"), Some("No"));
        assert_eq!(s.cell(2, "isEngineer"), Some("Yes"));
        assert!(s.row(0).unwrap().note("isEngineer").is_some());
        assert_eq!(
            completer.prompts.lock().unwrap()[1],
            "Is the student from a major in Biology an engineer?"
        );
    }

    #[tokio::test]
    async fn second_sweep_makes_no_calls() {
        let sheet = students();
        let completer = Counting::default();
        sweep(&sheet, &completer, &NoopHandler).await;

        let report = sweep(&sheet, &completer, &NoopHandler).await;
        assert_eq!(report.attempted, 0);
        assert_eq!(completer.calls(), 3);
    }

    #[tokio::test]
    async fn edit_causes_exactly_one_recomputation() {
        let sheet = students();
        let completer = Counting::default();
        sweep(&sheet, &completer, &NoopHandler).await;

        sheet::lock(&sheet)
            .update_cell(1, "Major", "Civil Engineering")
            .unwrap();
        let report = sweep(&sheet, &completer, &NoopHandler).await;
        assert_eq!(report.attempted, 1);
        assert_eq!(completer.calls(), 4);
        assert_eq!(sheet::lock(&sheet).cell(1, "isEngineer"), Some("Yes"));

        // Editing a column the prompt does not mention costs nothing.
        sheet::lock(&sheet)
            .update_cell(1, "First name", "Janet")
            .unwrap();
        let report = sweep(&sheet, &completer, &NoopHandler).await;
        assert_eq!(report.attempted, 0);
        assert_eq!(completer.calls(), 4);
    }

    #[tokio::test]
    async fn failures_leave_cells_pending_for_next_sweep() {
        let sheet = students();
        let report = sweep(&sheet, &Failing, &NoopHandler).await;
        assert_eq!(report.attempted, 3);
        assert_eq!(report.failed, 3);
        {
            let s = sheet::lock(&sheet);
            assert!(s.rows().iter().all(|r| r.get("isEngineer") == Some("")));
            assert_eq!(s.pending_jobs().len(), 3);
        }

        let completer = Counting::default();
        let report = sweep(&sheet, &completer, &NoopHandler).await;
        assert_eq!(report.updated, 3);
    }

    #[tokio::test]
    async fn non_json_answer_counts_as_failure() {
        struct NotJson;
        impl Completer for NotJson {
            fn complete<'a>(&'a self, _prompt: &'a str) -> CompletionFuture<'a> {
                Box::pin(async { Err(CompletionError::Decode("expected value".into())) })
            }
        }
        let sheet = students();
        let report = sweep(&sheet, &NotJson, &NoopHandler).await;
        assert_eq!(report.failed, 3);
        assert_eq!(sheet::lock(&sheet).cell(0, "isEngineer"), Some(""));
    }

    #[tokio::test]
    async fn unrecognised_json_is_written_truncated() {
        struct Chatty;
        impl Completer for Chatty {
            fn complete<'a>(&'a self, _prompt: &'a str) -> CompletionFuture<'a> {
                Box::pin(async { Ok(json!({"message": "z".repeat(100)})) })
            }
        }
        let sheet = students();
        sweep(&sheet, &Chatty, &NoopHandler).await;
        let s = sheet::lock(&sheet);
        let value = s.cell(0, "isEngineer").unwrap();
        assert_eq!(value.chars().count(), response::FALLBACK_MAX_CHARS);
        assert!(value.starts_with(r#"{"message":"#));
    }

    #[tokio::test]
    async fn edit_during_call_drops_result() {
        let shared = Arc::new(students());
        let completer = EditsDuringCall {
            sheet: shared.clone(),
        };

        let report = sweep(&shared, &completer, &NoopHandler).await;
        assert_eq!(report.stale, 1);
        assert_eq!(report.updated, 2);

        let s = sheet::lock(&shared);
        assert_eq!(s.cell(0, "isEngineer"), Some(""));
        assert!(s.is_pending(0, "isEngineer"));
    }

    #[tokio::test]
    async fn chained_ai_column_sees_values_from_same_sweep() {
        let sheet = students();
        sheet::lock(&sheet)
            .push_column(crate::sheet::Column::ai_trigger(
                "Verdict",
                "Engineering? @isEngineer",
            ))
            .unwrap();
        let completer = Counting::default();
        let report = sweep(&sheet, &completer, &NoopHandler).await;
        assert_eq!(report.updated, 6);
        assert!(
            completer
                .prompts
                .lock()
                .unwrap()
                .contains(&"Engineering? Yes".to_string())
        );
        assert!(sheet::lock(&sheet).pending_jobs().is_empty());
    }

    #[tokio::test]
    async fn events_follow_the_sweep() {
        use crate::events::FnEventHandler;
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let log = seen.clone();
        let handler = FnEventHandler::new(move |event| {
            let tag = match event {
                SweepEvent::Started { pending } => format!("started:{pending}"),
                SweepEvent::CellRequested { row, .. } => format!("req:{row}"),
                SweepEvent::CellUpdated { row, value, .. } => format!("upd:{row}:{value}"),
                SweepEvent::CellStale { row, .. } => format!("stale:{row}"),
                SweepEvent::CellFailed { row, .. } => format!("fail:{row}"),
                SweepEvent::Finished { report } => format!("done:{}", report.updated),
            };
            log.lock().unwrap().push(tag);
        });

        let sheet = students();
        sweep(&sheet, &HeuristicCompleter, &handler).await;
        let seen = seen.lock().unwrap();
        assert_eq!(seen.first().map(String::as_str), Some("started:3"));
        assert_eq!(seen.last().map(String::as_str), Some("done:3"));
        assert!(seen.contains(&"upd:1:No".to_string()));
    }

    #[test]
    fn report_serializes_elapsed_as_millis() {
        let report = SweepReport {
            attempted: 1,
            elapsed: Duration::from_millis(1500),
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["elapsed_ms"], 1500);
        assert_eq!(json["attempted"], 1);
    }
}
