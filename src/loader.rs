//! Desired-state loader
//!
//! Resolves the configured file patterns, parses every document and merges
//! same-kind lists (`topics`, `clients`, ...) across files in file-list order.
//! An entry structurally equal to one already merged is a duplicate
//! definition and aborts the load. Unreadable or unparseable files are skipped.

use crate::error::{KafkaloError, Result};
use crate::model::{Client, Schema, SchemaSide, Topic};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Kind holding topic documents
pub const KIND_TOPICS: &str = "topics";
/// Kind holding client documents
pub const KIND_CLIENTS: &str = "clients";

/// Merged desired state from every resolved input document
#[derive(Debug, Clone, Default)]
pub struct DesiredState {
    base_dirs: Vec<PathBuf>,
    filenames: Vec<PathBuf>,
    data: BTreeMap<String, Vec<serde_yaml::Value>>,
}

impl DesiredState {
    /// Resolve `patterns`, then load and merge every matching file
    pub fn load(patterns: &[String]) -> Result<Self> {
        let filenames = resolve_patterns(patterns);
        info!(
            "Loading desired state from {} file(s) matched by {} pattern(s)",
            filenames.len(),
            patterns.len()
        );
        let data = load_and_merge(&filenames)?;

        let mut base_dirs: Vec<PathBuf> = Vec::new();
        for pattern in patterns {
            let base = base_dir(Path::new(pattern));
            if !base_dirs.contains(&base) {
                base_dirs.push(base);
            }
        }

        Ok(Self {
            base_dirs,
            filenames,
            data,
        })
    }

    /// Files that were considered, in load order
    pub fn filenames(&self) -> &[PathBuf] {
        &self.filenames
    }

    /// Raw documents of one kind, empty if the kind was never declared
    pub fn kind(&self, kind: &str) -> &[serde_yaml::Value] {
        self.data.get(kind).map(Vec::as_slice).unwrap_or_default()
    }

    /// Names of every kind present in the merged state
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.data.values().all(Vec::is_empty)
    }

    /// Topic models. When two different entries share a name the later one wins.
    pub fn topics(&self) -> Result<Vec<Topic>> {
        let mut topics: Vec<Topic> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for doc in self.kind(KIND_TOPICS) {
            let topic = Topic::from_document(doc)?;
            match index.get(&topic.name) {
                Some(&pos) => {
                    warn!("Topic {} is defined more than once, using the later definition", topic.name);
                    topics[pos] = topic;
                }
                None => {
                    index.insert(topic.name.clone(), topics.len());
                    topics.push(topic);
                }
            }
        }
        Ok(topics)
    }

    /// Client models
    pub fn clients(&self) -> Result<Vec<Client>> {
        self.kind(KIND_CLIENTS)
            .iter()
            .map(Client::from_document)
            .collect()
    }

    /// Schemas referenced by the declared topics, key before value.
    ///
    /// Every topic entry is considered, including entries that redefine a
    /// topic name. The same subject pointing at a different schema file or
    /// compatibility is a duplicate definition; an identical reference is
    /// read once. Each referenced file is read here.
    pub fn schemas(&self) -> Result<Vec<Schema>> {
        let mut schemas: Vec<Schema> = Vec::new();
        let mut declared: HashMap<String, SchemaSide> = HashMap::new();
        for doc in self.kind(KIND_TOPICS) {
            let topic = Topic::from_document(doc)?;
            for (side, reference) in topic.schema_sides() {
                let subject = topic.subject_name(side);
                match declared.get(&subject) {
                    Some(previous) if previous == reference => continue,
                    Some(_) => {
                        return Err(KafkaloError::DuplicateResource(format!(
                            "Subject {} already declared elsewhere",
                            subject
                        )));
                    }
                    None => {
                        declared.insert(subject.clone(), reference.clone());
                    }
                }
                let path = self.resolve_schema_file(&reference.schema)?;
                let body = std::fs::read_to_string(&path).map_err(|e| {
                    KafkaloError::SchemaFile(format!("cannot read {}: {}", path.display(), e))
                })?;
                schemas.push(Schema::new(
                    subject,
                    body,
                    reference.compatibility.as_deref(),
                ));
            }
        }
        Ok(schemas)
    }

    /// Schemas keyed by subject name
    pub fn schemas_by_subject(&self) -> Result<BTreeMap<String, Schema>> {
        Ok(self
            .schemas()?
            .into_iter()
            .map(|s| (s.subject_name.clone(), s))
            .collect())
    }

    /// Locate a schema file.
    ///
    /// Absolute paths are used as is. A relative path is looked up under the
    /// base directory of every input pattern; it must exist under exactly one
    /// of them. If it exists under none, the working directory is tried.
    pub fn resolve_schema_file(&self, reference: &str) -> Result<PathBuf> {
        let path = Path::new(reference);
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }

        let mut found: Vec<PathBuf> = Vec::new();
        for base in &self.base_dirs {
            let candidate = base.join(path);
            if candidate.is_file() {
                let canonical = candidate.canonicalize().unwrap_or_else(|_| candidate.clone());
                if !found.contains(&canonical) {
                    found.push(canonical);
                }
            }
        }

        match found.len() {
            1 => Ok(found.remove(0)),
            0 if path.is_file() => Ok(path.to_path_buf()),
            0 => Err(KafkaloError::SchemaFile(format!(
                "schema file {} not found under any input directory",
                reference
            ))),
            _ => Err(KafkaloError::SchemaFile(format!(
                "schema file {} is ambiguous, found: {}",
                reference,
                found
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

/// Turn glob patterns into a file list.
///
/// A pattern whose last segment has no wildcard is taken literally. Otherwise
/// the last segment is matched against the entries of its parent directory.
pub fn resolve_patterns(patterns: &[String]) -> Vec<PathBuf> {
    let mut filenames = Vec::new();
    for pattern in patterns {
        let path = Path::new(pattern);
        let segment = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !has_wildcard(&segment) {
            filenames.push(path.to_path_buf());
            continue;
        }

        let dir = base_dir(path);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Pattern {} matched nothing ({}): {}", pattern, dir.display(), e);
                continue;
            }
        };
        let mut matched: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| !p.is_dir())
            .filter(|p| {
                p.file_name()
                    .map(|name| wildcard_match(&segment, &name.to_string_lossy()))
                    .unwrap_or(false)
            })
            .collect();
        matched.sort();
        debug!("Pattern {} matched {} file(s)", pattern, matched.len());
        filenames.extend(matched);
    }
    filenames
}

fn base_dir(pattern: &Path) -> PathBuf {
    match pattern.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn has_wildcard(segment: &str) -> bool {
    segment.contains('*') || segment.contains('?')
}

/// Match a file name against a pattern with `*` (any run) and `?` (any char)
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((sp, sn)) = star {
            pi = sp + 1;
            ni = sn + 1;
            star = Some((sp, sn + 1));
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

fn load_and_merge(filenames: &[PathBuf]) -> Result<BTreeMap<String, Vec<serde_yaml::Value>>> {
    let mut merged: BTreeMap<String, Vec<serde_yaml::Value>> = BTreeMap::new();

    for filename in filenames {
        let text = match std::fs::read_to_string(filename) {
            Ok(text) => text,
            Err(e) => {
                warn!("Skipping {}: {}", filename.display(), e);
                continue;
            }
        };
        let document: serde_yaml::Value = match serde_yaml::from_str(&text) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Skipping {}: not valid YAML: {}", filename.display(), e);
                continue;
            }
        };
        let mapping = match document {
            serde_yaml::Value::Mapping(mapping) => mapping,
            serde_yaml::Value::Null => {
                debug!("Skipping empty document {}", filename.display());
                continue;
            }
            _ => {
                warn!("Skipping {}: top level is not a mapping", filename.display());
                continue;
            }
        };

        for (key, values) in mapping {
            let Some(kind) = key.as_str().map(str::to_string) else {
                warn!("Ignoring non-string key {:?} in {}", key, filename.display());
                continue;
            };
            let values = match values {
                serde_yaml::Value::Sequence(values) => values,
                serde_yaml::Value::Null => Vec::new(),
                _ => {
                    warn!("Ignoring {} in {}: not a list", kind, filename.display());
                    continue;
                }
            };

            let entries = merged.entry(kind).or_default();
            for value in values {
                if entries.contains(&value) {
                    return Err(KafkaloError::DuplicateResource(format!(
                        "Resource {} already declared elsewhere",
                        describe(&value)
                    )));
                }
                entries.push(value);
            }
        }
    }

    Ok(merged)
}

fn describe(value: &serde_yaml::Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("{:?}", value))
}
