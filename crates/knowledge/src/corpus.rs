//! Corpus loading and metadata extraction.
//!
//! A corpus is a directory of plain-text documents, one logical source per
//! file. Metadata comes from `Key: value` header lines in the text, then from a
//! `<file name>.meta.yaml` sidecar which overrides anything extracted.

use crate::types::{Document, DocumentMetadata};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tessera_core::{AppError, AppResult};
use walkdir::WalkDir;

/// Extensions loaded as documents.
const DOCUMENT_EXTENSIONS: [&str; 2] = ["txt", "md"];

/// Suffix of sidecar metadata files.
const SIDECAR_SUFFIX: &str = ".meta.yaml";

/// File name fragments mapped to canonical site names.
const KNOWN_SITES: [(&str, &str); 14] = [
    ("carthage", "Carthage"),
    ("dougga", "Dougga"),
    ("el_jem", "El Jem"),
    ("eljem", "El Jem"),
    ("el jem", "El Jem"),
    ("sbeitla", "Sbeitla"),
    ("sbeïtla", "Sbeïtla"),
    ("kerkouane", "Kerkouane"),
    ("kerk", "Kerkouane"),
    ("bulla", "Bulla Regia"),
    ("uthina", "Uthina"),
    ("maktar", "Maktar"),
    ("thuburbo", "Thuburbo Majus"),
    ("chemtou", "Chemtou"),
];

/// Content keywords mapped to a period, checked in order.
const PERIOD_HINTS: [(&[&str], &str); 4] = [
    (&["romain", "rome", "roman"], "Roman period"),
    (&["punique", "carthaginois", "punic"], "Punic period"),
    (&["byzantin", "byzantine"], "Byzantine period"),
    (&["numide", "numidian"], "Numidian period"),
];

/// Sidecar metadata; every field overrides the extracted value when present.
#[derive(Debug, Default, Deserialize)]
struct SidecarMetadata {
    title: Option<String>,
    site: Option<String>,
    category: Option<String>,
    period: Option<String>,
    source: Option<String>,
}

/// Extracts site, period and source from document text and file names.
#[derive(Debug)]
pub struct MetadataExtractor {
    site: Vec<Regex>,
    period: Vec<Regex>,
    source: Vec<Regex>,
    url: Regex,
}

impl MetadataExtractor {
    pub fn new() -> AppResult<Self> {
        let header = |key: &str| -> AppResult<Regex> {
            Regex::new(&format!(r"(?im)^\s*{}\s*[:\-]\s*(.+)$", key)).map_err(|e| {
                AppError::Knowledge(format!("Invalid metadata pattern for {}: {}", key, e))
            })
        };

        Ok(Self {
            site: vec![header("site")?, header("nom")?, header("lieu")?],
            period: vec![
                header("p[ée]riode")?,
                header("[ée]poque")?,
                header("datation")?,
            ],
            source: vec![header("source")?, header("r[ée]f[ée]rence")?],
            url: Regex::new(r"https?://\S+")
                .map_err(|e| AppError::Knowledge(format!("Invalid URL pattern: {}", e)))?,
        })
    }

    /// Metadata for a document loaded from `file_name`.
    pub fn extract(&self, text: &str, file_name: &str) -> DocumentMetadata {
        let site = first_capture(&self.site, text).or_else(|| guess_site(file_name));
        let period = first_capture(&self.period, text).or_else(|| guess_period(text));
        let source = first_capture(&self.source, text)
            .or_else(|| self.url.find(text).map(|m| m.as_str().to_string()))
            .or_else(|| guess_source(file_name));

        DocumentMetadata {
            title: String::new(),
            site,
            category: None,
            period,
            source,
        }
    }
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|re| {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

fn guess_site(file_name: &str) -> Option<String> {
    let lower = file_name.to_lowercase();
    KNOWN_SITES
        .iter()
        .find(|(key, _)| lower.contains(key))
        .map(|(_, site)| site.to_string())
}

fn guess_period(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    PERIOD_HINTS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(_, period)| period.to_string())
}

fn guess_source(file_name: &str) -> Option<String> {
    let lower = file_name.to_lowercase();
    if lower.contains("wiki") {
        Some("Wikipedia".to_string())
    } else if lower.contains("unesco") {
        Some("UNESCO".to_string())
    } else if lower.contains("inp") {
        Some("Institut National du Patrimoine (INP)".to_string())
    } else {
        None
    }
}

fn is_document(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(true);

    !hidden
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| DOCUMENT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false)
}

/// Corpus-relative path with `/` separators.
fn document_id(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn load_sidecar(path: &Path) -> AppResult<Option<SidecarMetadata>> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sidecar_path = path.with_file_name(format!("{}{}", file_name, SIDECAR_SUFFIX));

    if !sidecar_path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&sidecar_path).map_err(|e| {
        AppError::Knowledge(format!("Failed to read sidecar {:?}: {}", sidecar_path, e))
    })?;
    let sidecar = serde_yaml::from_str(&contents).map_err(|e| {
        AppError::Knowledge(format!("Failed to parse sidecar {:?}: {}", sidecar_path, e))
    })?;

    Ok(Some(sidecar))
}

/// Load one document from `path` inside the corpus rooted at `root`.
pub fn load_document(
    root: &Path,
    path: &Path,
    extractor: &MetadataExtractor,
) -> AppResult<Document> {
    let bytes = fs::read(path)
        .map_err(|e| AppError::Knowledge(format!("Failed to read {:?}: {}", path, e)))?;
    let text = String::from_utf8_lossy(&bytes).into_owned();

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut metadata = extractor.extract(&text, &file_name);
    metadata.title = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.clone());

    let id = document_id(root, path);
    metadata.category = id
        .rsplit_once('/')
        .and_then(|(parent, _)| parent.rsplit('/').next())
        .map(str::to_string);

    if let Some(sidecar) = load_sidecar(path)? {
        if let Some(title) = sidecar.title {
            metadata.title = title;
        }
        metadata.site = sidecar.site.or(metadata.site);
        metadata.category = sidecar.category.or(metadata.category);
        metadata.period = sidecar.period.or(metadata.period);
        metadata.source = sidecar.source.or(metadata.source);
    }

    Ok(Document {
        id,
        path: Some(path.to_path_buf()),
        text,
        metadata,
    })
}

/// Load every document under `dir`, sorted by identifier.
///
/// Unreadable and empty files are logged and skipped.
///
/// # Errors
/// `InvalidConfiguration` if `dir` is not a directory.
pub fn load_corpus(dir: &Path) -> AppResult<Vec<Document>> {
    if !dir.is_dir() {
        return Err(AppError::InvalidConfiguration(format!(
            "Corpus directory does not exist: {:?}",
            dir
        )));
    }

    let extractor = MetadataExtractor::new()?;
    let mut documents = Vec::new();

    for entry in WalkDir::new(dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() || !is_document(path) {
            continue;
        }

        match load_document(dir, path, &extractor) {
            Ok(doc) if doc.text.trim().is_empty() => {
                tracing::debug!("Skipping empty document {:?}", path);
            }
            Ok(doc) => {
                tracing::debug!(
                    "Loaded {} | site: {}",
                    doc.id,
                    doc.metadata.site.as_deref().unwrap_or("N/A")
                );
                documents.push(doc);
            }
            Err(e) => tracing::warn!("Skipping {:?}: {}", path, e),
        }
    }

    documents.sort_by(|a, b| a.id.cmp(&b.id));

    tracing::info!("Loaded {} documents from {:?}", documents.len(), dir);
    Ok(documents)
}
