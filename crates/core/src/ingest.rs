use crate::inspector::{list_indexed, wrap_with_header};
use crate::progress::ProgressIndicator;
use crate::traits::{with_storages, SemanticIndex};
use crate::{
    FailedDocument, IndexError, IndexReport, Interrupt, PreconditionError, TextExtractor,
};
use chrono::Utc;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

const DISPLAY_NAME_CHARS: usize = 40;
const REASON_CHARS: usize = 30;

/// PDF files directly inside `folder`, ordered by file name.
pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.into_path());
        }
    }

    files.sort_unstable_by(|left, right| left.file_name().cmp(&right.file_name()));
    files
}

pub fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct IndexPlan {
    pub files: Vec<PathBuf>,
    pub pending: Vec<PathBuf>,
    pub already_indexed: usize,
}

pub fn plan_index(pdf_dir: &Path, indexed: &BTreeSet<String>) -> IndexPlan {
    let files = discover_pdf_files(pdf_dir);
    let pending: Vec<PathBuf> = files
        .iter()
        .filter(|path| !indexed.contains(&document_name(path)))
        .cloned()
        .collect();

    IndexPlan {
        already_indexed: files.len() - pending.len(),
        files,
        pending,
    }
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

enum Failure {
    NoText,
    Insert(String),
}

/// Indexes the documents of a PDF folder that the storage does not hold yet.
pub struct Indexer<X> {
    extractor: X,
    show_progress: bool,
    interrupt: Interrupt,
}

impl<X> Indexer<X>
where
    X: TextExtractor,
{
    pub fn new(extractor: X) -> Self {
        Self {
            extractor,
            show_progress: true,
            interrupt: Interrupt::default(),
        }
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub async fn index<S>(
        &self,
        pdf_dir: &Path,
        storage_dir: &Path,
        service: &S,
    ) -> Result<IndexReport, IndexError>
    where
        S: SemanticIndex + ?Sized,
    {
        if let Some(variable) = service.missing_credential() {
            return Err(PreconditionError::MissingCredential { variable }.into());
        }
        if !pdf_dir.is_dir() {
            return Err(PreconditionError::MissingPdfDir(pdf_dir.to_path_buf()).into());
        }
        fs::create_dir_all(storage_dir)?;

        let started_at = Utc::now();
        let indexed = list_indexed(storage_dir);
        let plan = plan_index(pdf_dir, &indexed);

        info!(
            pdf_dir = %pdf_dir.display(),
            storage_dir = %storage_dir.display(),
            total = plan.files.len(),
            already_indexed = plan.already_indexed,
            pending = plan.pending.len(),
            "index plan ready"
        );
        if self.show_progress {
            println!("Total PDFs: {}", plan.files.len());
            println!("Already indexed: {}", plan.already_indexed);
            println!("Pending: {}", plan.pending.len());
            if plan.pending.is_empty() {
                println!("All files are already indexed.");
            }
        }

        let mut report = IndexReport {
            total: plan.files.len(),
            already_indexed: plan.already_indexed,
            pending: plan.pending.len(),
            succeeded: 0,
            failed: Vec::new(),
            interrupted: false,
            started_at,
            finished_at: started_at,
        };

        if !plan.pending.is_empty() {
            with_storages(service, self.index_pending(&plan.pending, service, &mut report))
                .await?;
        }

        report.finished_at = Utc::now();
        info!(
            succeeded = report.succeeded,
            failed = report.failed_count(),
            interrupted = report.interrupted,
            "index run finished"
        );
        Ok(report)
    }

    async fn index_pending<S>(
        &self,
        pending: &[PathBuf],
        service: &S,
        report: &mut IndexReport,
    ) -> Result<(), IndexError>
    where
        S: SemanticIndex + ?Sized,
    {
        let mut progress = if self.show_progress {
            ProgressIndicator::new()
        } else {
            ProgressIndicator::hidden()
        };

        for (position, path) in pending.iter().enumerate() {
            if self.interrupt.is_triggered() {
                warn!(remaining = pending.len() - position, "indexing interrupted");
                report.interrupted = true;
                break;
            }

            let name = document_name(path);
            let label = format!(
                "[{}/{}] {}",
                report.already_indexed + position + 1,
                report.total,
                truncate_chars(&name, DISPLAY_NAME_CHARS)
            );
            progress.start(&label);

            let outcome = match self.extractor.extract(path) {
                Some(text) if !text.trim().is_empty() => service
                    .insert(&wrap_with_header(&name, &text))
                    .await
                    .map_err(|error| Failure::Insert(error.to_string())),
                _ => Err(Failure::NoText),
            };

            match outcome {
                Ok(()) => {
                    progress.stop(&label);
                    info!(document = %name, "document indexed");
                    report.succeeded += 1;
                }
                Err(failure) => {
                    let (line, reason) = match failure {
                        Failure::NoText => (
                            format!("{label} - No text extracted"),
                            "no text extracted".to_string(),
                        ),
                        Failure::Insert(reason) => (
                            format!("{label} - Error: {}", truncate_chars(&reason, REASON_CHARS)),
                            reason,
                        ),
                    };
                    progress.stop(&line);
                    warn!(document = %name, %reason, "document failed");
                    report.failed.push(FailedDocument { name, reason });
                }
            }
        }

        Ok(())
    }
}
