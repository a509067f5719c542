//! Annotation service
//!
//! Composes the record store with the pure pieces: selection, submission,
//! question/options edits, export and stats. Input is validated before the
//! store is touched, so a rejected call never mutates a record.

pub mod editor;
pub mod export;
pub mod selector;
pub mod stats;
pub mod writer;

use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::aliases::AliasTable;
use crate::error::AnnotateResult;
use crate::images::ImageResolver;
use crate::store::RecordStore;
use crate::types::{ExampleRecord, ExampleView, OptionsUpdate, QuestionUpdate, TaskStats};

pub use crate::options::selection_survives;
pub use writer::Submission;

#[derive(Clone)]
pub struct AnnotationService {
    store: Arc<dyn RecordStore>,
    images: ImageResolver,
    aliases: AliasTable,
}

impl AnnotationService {
    pub fn new(store: Arc<dyn RecordStore>, images: ImageResolver, aliases: AliasTable) -> Self {
        Self {
            store,
            images,
            aliases,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn images(&self) -> &ImageResolver {
        &self.images
    }

    pub async fn list_tasks(&self) -> AnnotateResult<Vec<String>> {
        self.store.list_tasks().await
    }

    /// First pending example after `after_id`, or `None` when the task is done
    pub async fn next_pending(&self, task: &str, after_id: Option<&str>) -> AnnotateResult<Option<ExampleView>> {
        let records = self.store.scan_by_task(task).await?;
        Ok(selector::next_pending(&records, after_id).map(|r| self.view(r)))
    }

    fn view(&self, record: &ExampleRecord) -> ExampleView {
        ExampleView {
            example_id: record.example_id.clone(),
            question: record.question.clone(),
            context: record.context.clone(),
            options: record.options.clone().unwrap_or_default(),
            image_url: record
                .image_ref
                .as_deref()
                .and_then(|r| self.images.resolve(r)),
            raw: record.raw_payload.clone(),
        }
    }

    /// Record an answer, or mark the example as missing information
    pub async fn submit(
        &self,
        task: &str,
        example_id: &str,
        missing_information: bool,
        human_prediction: Option<&str>,
    ) -> AnnotateResult<ExampleRecord> {
        let submission = Submission::new(missing_information, human_prediction)?;
        let record = self
            .store
            .update(
                task,
                example_id,
                Box::new(move |r: &mut ExampleRecord| {
                    submission.apply(r, Utc::now());
                    Ok(())
                }),
            )
            .await?;
        info!(
            "Annotated {}/{} as {:?}",
            record.task,
            record.example_id,
            record.status()
        );
        Ok(record)
    }

    pub async fn update_question(&self, task: &str, example_id: &str, question: &str) -> AnnotateResult<QuestionUpdate> {
        let question = editor::validate_question(question)?;
        let aliases = self.aliases.clone();
        let new_question = question.clone();
        let record = self
            .store
            .update(
                task,
                example_id,
                Box::new(move |r: &mut ExampleRecord| {
                    editor::apply_question(r, &new_question, &aliases, Utc::now())
                }),
            )
            .await?;
        debug!("Question of {}/{} updated", record.task, record.example_id);
        Ok(QuestionUpdate {
            question,
            json_blob: record.raw_payload,
        })
    }

    /// Replace the options; the response carries the new label set
    pub async fn update_options<S: AsRef<str>>(
        &self,
        task: &str,
        example_id: &str,
        options: &[S],
    ) -> AnnotateResult<OptionsUpdate> {
        let options = editor::validate_options(options)?;
        let aliases = self.aliases.clone();
        let new_options = options.clone();
        let record = self
            .store
            .update(
                task,
                example_id,
                Box::new(move |r: &mut ExampleRecord| {
                    editor::apply_options(r, new_options, &aliases, Utc::now())
                }),
            )
            .await?;
        debug!(
            "Options of {}/{} updated ({} entries)",
            record.task,
            record.example_id,
            options.len()
        );
        Ok(OptionsUpdate {
            options,
            json_blob: record.raw_payload,
        })
    }

    pub async fn stats(&self, task: &str) -> AnnotateResult<TaskStats> {
        let records = self.store.scan_by_task(task).await?;
        Ok(stats::tally(&records))
    }

    /// Export a task as an id-keyed mapping in stable order
    pub async fn export(&self, task: &str, completed_only: bool) -> AnnotateResult<Map<String, Value>> {
        let records = self.store.scan_by_task(task).await?;
        Ok(export::export_records(&records, completed_only))
    }

    /// ZIP of the completed records of `tasks` (all tasks when `None`)
    pub async fn export_completed_zip(&self, tasks: Option<&[String]>) -> AnnotateResult<Vec<u8>> {
        let tasks = match tasks {
            Some(tasks) => tasks.to_vec(),
            None => self.store.list_tasks().await?,
        };

        let mut exports = Vec::with_capacity(tasks.len());
        for task in tasks {
            let docs = self.export(&task, true).await?;
            exports.push((crate::types::normalize_task(&task), docs));
        }
        export::zip_exports(&exports)
    }
}
