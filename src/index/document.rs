use super::schema::{IndexFields, META_SEPARATOR};
use crate::catalog::FileRecord;
use crate::error::Error;
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tantivy::schema::Value;
use tantivy::TantivyDocument;

/// One ranked result. Fields are read back from the stored document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub storage_root: String,
    pub size: u64,
    pub modified_at: i64,
    pub extension: Option<String>,
    pub mime_type: Option<String>,
    pub file_type: Option<String>,
    pub is_directory: bool,
    pub is_duplicate: bool,
    pub score: f32,
    pub metadata: BTreeMap<String, String>,
}

/// Deleted records and records under a disabled root are kept out of the index.
pub fn is_eligible(file: &FileRecord) -> bool {
    file.is_live()
}

pub fn normalize_keyword(value: &str) -> String {
    value.trim().trim_start_matches('.').to_lowercase()
}

pub fn meta_term(key: &str, value: &str) -> String {
    format!("{key}{META_SEPARATOR}{value}")
}

pub fn to_document(fields: &IndexFields, file: &FileRecord) -> Result<TantivyDocument, Error> {
    let mut doc = TantivyDocument::default();
    doc.add_u64(fields.id, file.id as u64);
    doc.add_text(fields.name, &file.name);
    doc.add_text(fields.path, &file.path);
    doc.add_text(fields.path_raw, file.path.to_lowercase());
    doc.add_text(fields.name_sort, file.name.to_lowercase());
    doc.add_text(fields.storage_root, &file.storage_root_name);
    doc.add_text(fields.size_category, file.size_category().as_str());
    doc.add_bool(fields.is_directory, file.is_directory);
    doc.add_bool(fields.is_duplicate, file.is_duplicate);
    doc.add_u64(fields.size, file.size.max(0) as u64);
    doc.add_i64(fields.modified, file.modified_at);

    if let Some(ext) = file.extension.as_deref().filter(|e| !e.trim().is_empty()) {
        doc.add_text(fields.extension, normalize_keyword(ext));
    }
    if let Some(mime) = file.mime_type.as_deref().filter(|m| !m.trim().is_empty()) {
        doc.add_text(fields.mime_type, normalize_keyword(mime));
    }
    doc.add_text(fields.file_type, normalize_keyword(file.category()));

    if let Some(ts) = DateTime::<Utc>::from_timestamp(file.modified_at, 0) {
        doc.add_text(fields.year, format!("{:04}", ts.year()));
        doc.add_text(fields.month, format!("{:02}", ts.month()));
        doc.add_text(fields.day, format!("{:02}", ts.day()));
    }

    let mut all_text = vec![file.name.as_str(), file.path.as_str()];
    if let Some(content) = file.content.as_deref() {
        doc.add_text(fields.content, content);
        all_text.push(content);
    }
    for (key, value) in &file.metadata {
        doc.add_text(fields.meta, meta_term(key, value));
        all_text.push(value.as_str());
    }
    doc.add_text(fields.all_text, all_text.join(" "));
    doc.add_text(fields.metadata_json, serde_json::to_string(&file.metadata)?);

    Ok(doc)
}

fn text(doc: &TantivyDocument, field: tantivy::schema::Field) -> Option<String> {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn hit_from_document(fields: &IndexFields, doc: &TantivyDocument, score: f32) -> SearchHit {
    let metadata = text(doc, fields.metadata_json)
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default();
    SearchHit {
        id: doc.get_first(fields.id).and_then(|v| v.as_u64()).unwrap_or(0) as i64,
        name: text(doc, fields.name).unwrap_or_default(),
        path: text(doc, fields.path).unwrap_or_default(),
        storage_root: text(doc, fields.storage_root).unwrap_or_default(),
        size: doc.get_first(fields.size).and_then(|v| v.as_u64()).unwrap_or(0),
        modified_at: doc
            .get_first(fields.modified)
            .and_then(|v| v.as_i64())
            .unwrap_or(0),
        extension: text(doc, fields.extension),
        mime_type: text(doc, fields.mime_type),
        file_type: text(doc, fields.file_type),
        is_directory: doc
            .get_first(fields.is_directory)
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        is_duplicate: doc
            .get_first(fields.is_duplicate)
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        score,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::schema::build_schema;

    fn record() -> FileRecord {
        let mut metadata = BTreeMap::new();
        metadata.insert("artist".to_string(), "Nina Simone".to_string());
        FileRecord {
            id: 7,
            path: "Music/Feeling Good.FLAC".to_string(),
            name: "Feeling Good.FLAC".to_string(),
            storage_root_id: 1,
            storage_root_name: "nas".to_string(),
            storage_root_enabled: true,
            size: 2_000_000,
            modified_at: 1_700_000_000,
            extension: Some(".FLAC".to_string()),
            mime_type: Some("audio/flac".to_string()),
            file_type: Some("Audio".to_string()),
            is_directory: false,
            is_duplicate: true,
            duplicate_group_id: Some(3),
            content: None,
            metadata,
            deleted: false,
        }
    }

    #[test]
    fn test_stored_fields_read_back() {
        let (_, fields) = build_schema();
        let doc = to_document(&fields, &record()).unwrap();
        let hit = hit_from_document(&fields, &doc, 1.5);

        assert_eq!(hit.id, 7);
        assert_eq!(hit.name, "Feeling Good.FLAC");
        assert_eq!(hit.extension.as_deref(), Some("flac"));
        assert_eq!(hit.file_type.as_deref(), Some("audio"));
        assert_eq!(hit.size, 2_000_000);
        assert!(hit.is_duplicate);
        assert_eq!(hit.metadata.get("artist").map(String::as_str), Some("Nina Simone"));
        assert_eq!(
            doc.get_first(fields.size_category).and_then(|v| v.as_str()),
            Some("medium")
        );
        assert_eq!(doc.get_first(fields.year).and_then(|v| v.as_str()), Some("2023"));
    }

    #[test]
    fn test_deleted_or_disabled_is_ineligible() {
        let mut file = record();
        assert!(is_eligible(&file));
        file.storage_root_enabled = false;
        assert!(!is_eligible(&file));
        file.storage_root_enabled = true;
        file.deleted = true;
        assert!(!is_eligible(&file));
    }
}
