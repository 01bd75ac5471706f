//! Integrity checking.
//!
//! Validation walks a data directory without an engine, so it can run
//! from the CLI against a store no process has open. It checks that every
//! document decodes and that its embedded `id` matches its file name. A
//! live engine validates through [`StorageEngine::validate`], which keeps
//! its own writers out while a repair is written.
//!
//! [`StorageEngine::validate`]: crate::StorageEngine::validate

use crate::dir::{validate_id, DataDir};
use crate::error::CoreResult;
use crate::format::DocumentFormat;
use docvault_codec::ID_FIELD;
use docvault_storage::{read_file, write_atomic};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

/// What is wrong with one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IssueKind {
    /// The embedded `id` is missing, not a string, or differs from the
    /// file stem.
    IdMismatch {
        /// The embedded value, rendered as text, if there was one.
        embedded: Option<String>,
    },
    /// The file does not decode (bad JSON, bad compression, failed
    /// authentication). Never repaired.
    Corrupt {
        /// Decode failure.
        reason: String,
    },
    /// The file name is not a usable document id, so the document can
    /// never be read by id. Never repaired.
    InvalidFileName {
        /// Why the name was rejected.
        reason: String,
    },
    /// A temp file from an interrupted write. Harmless; never removed.
    StaleTempFile,
}

/// One finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Collection directory.
    pub collection: String,
    /// File name inside the collection.
    pub file: String,
    /// Document id from the file name (the file name itself for temp files).
    pub id: String,
    /// The problem.
    pub kind: IssueKind,
    /// Whether the problem was repaired.
    pub fixed: bool,
}

/// Outcome of a validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Directory that was checked.
    pub data_dir: String,
    /// Collections walked.
    pub collections: usize,
    /// Document files checked.
    pub documents: usize,
    /// Documents with no issue.
    pub valid: usize,
    /// Whether repairs were requested.
    pub fix: bool,
    /// Findings, in walk order.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Id mismatches found.
    pub fn mismatches(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| matches!(i.kind, IssueKind::IdMismatch { .. }))
    }

    /// Undecodable documents found.
    pub fn corrupt(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| matches!(i.kind, IssueKind::Corrupt { .. }))
    }

    /// Files whose names are not valid ids.
    pub fn invalid_file_names(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| matches!(i.kind, IssueKind::InvalidFileName { .. }))
    }

    /// Leftover temp files found.
    pub fn stale_temp_files(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.kind == IssueKind::StaleTempFile)
    }

    /// Number of repaired documents.
    #[must_use]
    pub fn fixed_count(&self) -> usize {
        self.issues.iter().filter(|i| i.fixed).count()
    }

    /// Returns true if no mismatch is left unrepaired and nothing is
    /// corrupt. Stale temp files do not count.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues
            .iter()
            .all(|i| i.fixed || i.kind == IssueKind::StaleTempFile)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Data directory: {}", self.data_dir)?;
        writeln!(f, "Collections:    {}", self.collections)?;
        writeln!(f, "Documents:      {}", self.documents)?;
        writeln!(f, "Valid:          {}", self.valid)?;

        for issue in &self.issues {
            let location = format!("{}/{}", issue.collection, issue.file);
            match &issue.kind {
                IssueKind::IdMismatch { embedded } => {
                    let embedded = embedded.as_deref().unwrap_or("<missing>");
                    let status = if issue.fixed { "fixed" } else { "mismatch" };
                    writeln!(
                        f,
                        "  [{status}] {location}: id {embedded:?} should be {:?}",
                        issue.id
                    )?;
                }
                IssueKind::Corrupt { reason } => {
                    writeln!(f, "  [corrupt] {location}: {reason}")?;
                }
                IssueKind::InvalidFileName { reason } => {
                    writeln!(f, "  [bad name] {location}: {reason}")?;
                }
                IssueKind::StaleTempFile => {
                    writeln!(f, "  [stale] {location}: interrupted write")?;
                }
            }
        }

        if self.is_clean() {
            write!(f, "Status: OK")
        } else {
            write!(f, "Status: {} problem(s)", self.issues.len() - self.fixed_count())
        }
    }
}

/// Result of trying to rewrite one document during repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Repair {
    /// The repaired bytes replaced the file.
    Written,
    /// The file no longer held the bytes that were inspected; nothing was
    /// written. Carries the current contents, `None` if it was removed.
    Changed(Option<Vec<u8>>),
}

/// Rewrites `path` with `replacement` only if it still holds `expected`.
///
/// Other writers must be kept out between the check and the rename; the
/// engine does this with its write gate.
///
/// # Errors
///
/// Returns an error if the file cannot be read or written.
pub fn replace_if_unchanged(path: &Path, expected: &[u8], replacement: &[u8]) -> CoreResult<Repair> {
    match read_file(path)? {
        Some(current) if current == expected => {
            write_atomic(path, replacement)?;
            Ok(Repair::Written)
        }
        current => Ok(Repair::Changed(current)),
    }
}

/// A repair that lost to a concurrent write is retried this many times.
const MAX_REPAIR_ATTEMPTS: usize = 3;

enum Finding {
    Valid,
    Corrupt(String),
    Mismatch {
        embedded: Option<String>,
        fields: Map<String, Value>,
    },
}

fn inspect(format: &DocumentFormat, collection: &str, id: &str, bytes: &[u8]) -> CoreResult<Finding> {
    let value = match format.decode_value(collection, id, bytes) {
        Ok(value) => value,
        Err(e) if e.is_corruption() => return Ok(Finding::Corrupt(e.to_string())),
        Err(e) => return Err(e),
    };
    let Value::Object(fields) = value else {
        return Ok(Finding::Corrupt("document is not a JSON object".to_string()));
    };
    let embedded = match fields.get(ID_FIELD) {
        Some(Value::String(s)) if s == id => return Ok(Finding::Valid),
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
        None => None,
    };
    Ok(Finding::Mismatch { embedded, fields })
}

/// Validates every document under `data_dir`.
///
/// With `fix`, a document whose embedded id drifted from its file name is
/// rewritten (atomically) with the file stem as its id. Nothing else is
/// ever changed, and with `fix` off nothing is written at all. Files whose
/// name is not a valid id are reported and left alone.
///
/// Repairs only replace a file that still holds the bytes that were
/// inspected, but nothing stops another writer between that check and the
/// rename. With `fix`, run this on a store no engine has open, or use
/// [`StorageEngine::validate`](crate::StorageEngine::validate).
///
/// # Errors
///
/// Returns an error if a directory cannot be listed or a repair cannot be
/// written. Per-document decode failures are findings, not errors.
pub fn validate(
    data_dir: &Path,
    format: &DocumentFormat,
    fix: bool,
) -> CoreResult<ValidationReport> {
    validate_with(data_dir, format, fix, replace_if_unchanged)
}

/// Like [`validate`], with every rewrite going through `repair`.
///
/// `repair` receives the file, the bytes that were inspected and the
/// repaired bytes. When it reports [`Repair::Changed`], the new contents
/// are inspected again.
///
/// # Errors
///
/// See [`validate`].
pub fn validate_with<R>(
    data_dir: &Path,
    format: &DocumentFormat,
    fix: bool,
    repair: R,
) -> CoreResult<ValidationReport>
where
    R: Fn(&Path, &[u8], &[u8]) -> CoreResult<Repair>,
{
    let dir = DataDir::at(data_dir);
    let collections = dir.list_collections()?;
    let mut report = ValidationReport {
        data_dir: data_dir.display().to_string(),
        collections: collections.len(),
        documents: 0,
        valid: 0,
        fix,
        issues: Vec::new(),
    };

    for collection in &collections {
        for file in dir.list_documents(collection)? {
            let file_name = format!("{}{}", file.id, crate::dir::DOCUMENT_EXT);

            if let Err(e) = validate_id(&file.id) {
                warn!(collection, file = %file_name, "file name is not a valid document id");
                report.documents += 1;
                report.issues.push(ValidationIssue {
                    collection: collection.clone(),
                    file: file_name,
                    id: file.id,
                    kind: IssueKind::InvalidFileName {
                        reason: e.to_string(),
                    },
                    fixed: false,
                });
                continue;
            }

            let Some(mut bytes) = read_file(&file.path)? else {
                continue;
            };

            let mut attempts = 0;
            let outcome = loop {
                match inspect(format, collection, &file.id, &bytes)? {
                    Finding::Valid => break Some(None),
                    Finding::Corrupt(reason) => {
                        warn!(collection, id = %file.id, error = %reason, "corrupt document");
                        break Some(Some((IssueKind::Corrupt { reason }, false)));
                    }
                    Finding::Mismatch { embedded, mut fields } => {
                        if !fix || attempts == MAX_REPAIR_ATTEMPTS {
                            warn!(collection, id = %file.id, embedded = ?embedded, "embedded id mismatch");
                            break Some(Some((IssueKind::IdMismatch { embedded }, false)));
                        }
                        attempts += 1;
                        fields.insert(ID_FIELD.to_string(), Value::String(file.id.clone()));
                        let repaired = format.encode_value(&Value::Object(fields))?;
                        match repair(&file.path, &bytes, &repaired)? {
                            Repair::Written => {
                                warn!(collection, id = %file.id, embedded = ?embedded, "repaired embedded id");
                                break Some(Some((IssueKind::IdMismatch { embedded }, true)));
                            }
                            Repair::Changed(Some(current)) => {
                                debug!(collection, id = %file.id, "document changed during repair; checking again");
                                bytes = current;
                            }
                            Repair::Changed(None) => break None,
                        }
                    }
                }
            };

            // Removed while being repaired.
            let Some(issue) = outcome else {
                continue;
            };
            report.documents += 1;
            match issue {
                None => report.valid += 1,
                Some((kind, fixed)) => report.issues.push(ValidationIssue {
                    collection: collection.clone(),
                    file: file_name,
                    id: file.id,
                    kind,
                    fixed,
                }),
            }
        }

        for temp in dir.stale_temp_files(collection)? {
            let name = temp
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            report.issues.push(ValidationIssue {
                collection: collection.clone(),
                file: name.clone(),
                id: name,
                kind: IssueKind::StaleTempFile,
                fixed: false,
            });
        }
    }

    info!(
        data_dir = %data_dir.display(),
        documents = report.documents,
        valid = report.valid,
        issues = report.issues.len(),
        fixed = report.fixed_count(),
        "validation finished"
    );
    Ok(report)
}
