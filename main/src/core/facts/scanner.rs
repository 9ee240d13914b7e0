use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::api::config::{ProjectConfig, ScanScope};
use crate::api::facts::{FactIndex, OriginKind, SourceLocation};
use crate::api::types::{FactsError, RunError};
use crate::core::facts::extract::{extract_class, extract_class_name, ClassExtraction};
use crate::core::paths::{glob_matches, relativize};

/// Cooperative cancellation signal, checked at container boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// A fresh, un-cancelled token.
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Request cancellation. The pipeline aborts at the next checkpoint.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Result of the scan stage: the frozen index, per-class failures, and the
/// limit breach that aborted extraction, if one did.
#[derive(Debug)]
pub struct ScanOutcome {
    /// The frozen fact index.
    pub index: FactIndex,
    /// Per-class extraction failures, in discovery order.
    pub facts_errors: Vec<FactsError>,
    /// Message describing the scan limit that aborted extraction.
    pub limit_breach: Option<String>,
}

/// Whether a non-class file under a root is scanned as an archive:
/// `PROJECT_ONLY` never, `PROJECT_WITH_EXTERNAL_BUCKETS` per the archive
/// globs, `ALL_SOURCES` additionally admits any zip container when no
/// archive globs are configured.
fn admits_archive(config: &ProjectConfig, rel: &str) -> bool {
    match config.scan_scope {
        ScanScope::ProjectOnly => false,
        ScanScope::ProjectWithExternalBuckets => {
            config.archive_globs.iter().any(|g| glob_matches(g, rel))
        }
        ScanScope::AllSources => {
            if config.archive_globs.is_empty() {
                rel.ends_with(".jar") || rel.ends_with(".zip") || rel.ends_with(".war")
            } else {
                config.archive_globs.iter().any(|g| glob_matches(g, rel))
            }
        }
    }
}

struct DirCandidate {
    abs: PathBuf,
    rel: String,
}

struct ArchiveCandidate {
    abs: PathBuf,
    rel: String,
}

/// Walk the configured bytecode roots and extract facts from every admitted
/// container.
pub fn scan_project(
    project_root: &Path,
    config: &ProjectConfig,
    cancel: &CancelToken,
) -> Result<ScanOutcome, RunError> {
    let mut dir_candidates: Vec<DirCandidate> = Vec::new();
    let mut archive_candidates: Vec<ArchiveCandidate> = Vec::new();

    for root in &config.bytecode_roots {
        let root_path = project_root.join(root);
        if !root_path.exists() {
            debug!(root = %root, "bytecode root does not exist, skipping");
            continue;
        }
        let walker = WalkDir::new(&root_path)
            .follow_links(config.follow_symlinks)
            .sort_by_file_name();
        for entry in walker {
            if cancel.is_cancelled() {
                return Err(RunError::Canceled);
            }
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = relativize(project_root, entry.path());
            if rel.ends_with(".class") {
                let included = config.include_globs.iter().any(|g| glob_matches(g, &rel));
                let excluded = config.exclude_globs.iter().any(|g| glob_matches(g, &rel));
                if included && !excluded {
                    dir_candidates.push(DirCandidate { abs: entry.path().to_path_buf(), rel });
                }
            } else if admits_archive(config, &rel) {
                archive_candidates.push(ArchiveCandidate { abs: entry.path().to_path_buf(), rel });
            }
        }
    }

    // Deterministic processing order regardless of filesystem iteration.
    dir_candidates.sort_by(|a, b| a.rel.cmp(&b.rel));
    dir_candidates.dedup_by(|a, b| a.rel == b.rel);
    archive_candidates.sort_by(|a, b| a.rel.cmp(&b.rel));
    archive_candidates.dedup_by(|a, b| a.rel == b.rel);

    let mut facts_errors: Vec<FactsError> = Vec::new();
    let mut limit_breach: Option<String> = None;

    let max_classes = config.limits.max_classes as usize;
    if dir_candidates.len() > max_classes {
        limit_breach = Some(format!(
            "class limit exceeded: {} classes found, limit is {}",
            dir_candidates.len(),
            max_classes
        ));
        dir_candidates.truncate(max_classes);
    }

    // Extraction owns per-file buffers; results are merged in candidate order.
    let extracted: Vec<Result<ClassExtraction, FactsError>> = dir_candidates
        .par_iter()
        .map(|candidate| {
            if cancel.is_cancelled() {
                return Err(FactsError {
                    origin_id: candidate.rel.clone(),
                    phase: "cancelled".to_string(),
                    message: "extraction cancelled".to_string(),
                    cause: None,
                });
            }
            extract_dir_class(candidate, config)
        })
        .collect();
    if cancel.is_cancelled() {
        return Err(RunError::Canceled);
    }

    let mut classes = Vec::new();
    let mut methods = Vec::new();
    let mut fields = Vec::new();
    let mut edges = Vec::new();
    let mut member_refs: BTreeSet<(String, String)> = BTreeSet::new();
    let mut external_by_fqn: BTreeMap<String, String> = BTreeMap::new();

    let mut merge = |extraction: ClassExtraction,
                     classes: &mut Vec<_>,
                     methods: &mut Vec<_>,
                     fields: &mut Vec<_>,
                     edges: &mut Vec<_>,
                     member_refs: &mut BTreeSet<(String, String)>| {
        classes.push(extraction.class);
        methods.extend(extraction.methods);
        fields.extend(extraction.fields);
        edges.extend(extraction.edges);
        member_refs.extend(extraction.member_refs);
    };

    for result in extracted {
        match result {
            Ok(extraction) => merge(
                extraction,
                &mut classes,
                &mut methods,
                &mut fields,
                &mut edges,
                &mut member_refs,
            ),
            Err(error) => {
                warn!(origin = %error.origin_id, phase = %error.phase, "class skipped");
                facts_errors.push(error);
            }
        }
    }

    // Archives, walked sequentially.
    for candidate in &archive_candidates {
        if cancel.is_cancelled() {
            return Err(RunError::Canceled);
        }
        if limit_breach.is_some() {
            break;
        }
        let full_extract = config.scan_scope == ScanScope::AllSources;
        match scan_archive(candidate, config, full_extract, classes.len(), max_classes) {
            Ok(outcome) => {
                for extraction in outcome.extractions {
                    merge(
                        extraction,
                        &mut classes,
                        &mut methods,
                        &mut fields,
                        &mut edges,
                        &mut member_refs,
                    );
                }
                for (fqn, bucket) in outcome.external {
                    external_by_fqn.entry(fqn).or_insert(bucket);
                }
                facts_errors.extend(outcome.facts_errors);
                if let Some(breach) = outcome.limit_breach {
                    limit_breach = Some(breach);
                }
            }
            Err(error) => facts_errors.push(error),
        }
    }

    debug!(
        classes = classes.len(),
        edges = edges.len(),
        errors = facts_errors.len(),
        "extraction complete"
    );

    let index = FactIndex::build(classes, methods, fields, edges, member_refs, external_by_fqn);
    Ok(ScanOutcome { index, facts_errors, limit_breach })
}

fn extract_dir_class(
    candidate: &DirCandidate,
    config: &ProjectConfig,
) -> Result<ClassExtraction, FactsError> {
    let bytes = fs::read(&candidate.abs).map_err(|e| FactsError {
        origin_id: candidate.rel.clone(),
        phase: "read".to_string(),
        message: e.to_string(),
        cause: Some(e.kind().to_string()),
    })?;
    if bytes.len() as u64 > config.limits.max_class_bytes {
        return Err(FactsError {
            origin_id: candidate.rel.clone(),
            phase: "read".to_string(),
            message: format!(
                "class file is {} bytes, limit is {}",
                bytes.len(),
                config.limits.max_class_bytes
            ),
            cause: None,
        });
    }
    let location = SourceLocation {
        kind: OriginKind::DirectoryClass,
        origin_path: candidate.rel.clone(),
        container_path: None,
        entry_path: None,
        source_file: None,
        line: None,
    };
    extract_class(&bytes, location).map_err(|e| FactsError {
        origin_id: candidate.rel.clone(),
        phase: "parse".to_string(),
        message: e.to_string(),
        cause: None,
    })
}

struct ArchiveOutcome {
    extractions: Vec<ClassExtraction>,
    external: Vec<(String, String)>,
    facts_errors: Vec<FactsError>,
    limit_breach: Option<String>,
}

fn scan_archive(
    candidate: &ArchiveCandidate,
    config: &ProjectConfig,
    full_extract: bool,
    classes_so_far: usize,
    max_classes: usize,
) -> Result<ArchiveOutcome, FactsError> {
    let archive_error = |phase: &str, message: String| FactsError {
        origin_id: candidate.rel.clone(),
        phase: phase.to_string(),
        message,
        cause: None,
    };

    let file = fs::File::open(&candidate.abs)
        .map_err(|e| archive_error("archive", e.to_string()))?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| archive_error("archive", e.to_string()))?;

    let bucket = candidate
        .abs
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| candidate.rel.clone());

    let mut outcome = ArchiveOutcome {
        extractions: Vec::new(),
        external: Vec::new(),
        facts_errors: Vec::new(),
        limit_breach: None,
    };
    let mut decompressed: u64 = 0;
    let mut admitted = classes_so_far;

    for i in 0..archive.len() {
        let mut entry = match archive.by_index(i) {
            Ok(e) => e,
            Err(e) => {
                outcome
                    .facts_errors
                    .push(archive_error("archive", e.to_string()));
                continue;
            }
        };
        let entry_name = entry.name().to_string();
        if !entry_name.ends_with(".class") {
            continue;
        }
        if entry.size() > config.limits.max_class_bytes {
            outcome.limit_breach = Some(format!(
                "archive entry {}!{} is {} bytes, limit is {}",
                candidate.rel,
                entry_name,
                entry.size(),
                config.limits.max_class_bytes
            ));
            break;
        }
        decompressed += entry.size();
        if decompressed > config.limits.max_archive_bytes {
            outcome.limit_breach = Some(format!(
                "archive {} exceeds {} decompressed bytes",
                candidate.rel, config.limits.max_archive_bytes
            ));
            break;
        }

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        if let Err(e) = entry.read_to_end(&mut bytes) {
            outcome.facts_errors.push(FactsError {
                origin_id: format!("{}!{}", candidate.rel, entry_name),
                phase: "read".to_string(),
                message: e.to_string(),
                cause: Some(e.kind().to_string()),
            });
            continue;
        }

        if full_extract {
            if admitted >= max_classes {
                outcome.limit_breach = Some(format!(
                    "class limit exceeded at {}!{}, limit is {}",
                    candidate.rel, entry_name, max_classes
                ));
                break;
            }
            let location = SourceLocation {
                kind: OriginKind::ArchiveEntry,
                origin_path: candidate.rel.clone(),
                container_path: Some(candidate.rel.clone()),
                entry_path: Some(entry_name.clone()),
                source_file: None,
                line: None,
            };
            match extract_class(&bytes, location) {
                Ok(extraction) => {
                    admitted += 1;
                    outcome.extractions.push(extraction);
                }
                Err(e) => outcome.facts_errors.push(FactsError {
                    origin_id: format!("{}!{}", candidate.rel, entry_name),
                    phase: "parse".to_string(),
                    message: e.to_string(),
                    cause: None,
                }),
            }
        } else {
            match extract_class_name(&bytes) {
                Ok(fqn) => outcome.external.push((fqn, bucket.clone())),
                Err(e) => outcome.facts_errors.push(FactsError {
                    origin_id: format!("{}!{}", candidate.rel, entry_name),
                    phase: "parse".to_string(),
                    message: e.to_string(),
                    cause: None,
                }),
            }
        }
    }

    Ok(outcome)
}
