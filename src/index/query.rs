use super::document::{meta_term, normalize_keyword};
use super::schema::{IndexFields, MODIFIED_FIELD, SIZE_FIELD};
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound;
use tantivy::query::{
    AllQuery, BooleanQuery, Occur, Query, QueryParser, RangeQuery, RegexQuery, TermQuery,
};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::Term;
use tracing::debug;

pub const DEFAULT_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateFilter {
    #[default]
    Any,
    Only,
    Exclude,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Relevance,
    Name,
    Size,
    Modified,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// A search over the index. Same-kind lists (file types, roots, ...) match
/// any of their values; different filters must all match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRequest {
    pub query: String,
    pub file_types: Vec<String>,
    pub extensions: Vec<String>,
    pub mime_types: Vec<String>,
    /// Inclusive lower size bound in bytes.
    pub min_size: Option<u64>,
    /// Exclusive upper size bound in bytes.
    pub max_size: Option<u64>,
    /// Inclusive lower bound, unix seconds.
    pub modified_after: Option<i64>,
    /// Exclusive upper bound, unix seconds.
    pub modified_before: Option<i64>,
    pub path_contains: Option<String>,
    pub storage_roots: Vec<String>,
    pub duplicates: DuplicateFilter,
    pub include_directories: bool,
    pub metadata: BTreeMap<String, String>,
    pub sort: SortField,
    pub order: SortOrder,
    pub limit: usize,
    pub offset: usize,
    pub include_facets: bool,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            file_types: Vec::new(),
            extensions: Vec::new(),
            mime_types: Vec::new(),
            min_size: None,
            max_size: None,
            modified_after: None,
            modified_before: None,
            path_contains: None,
            storage_roots: Vec::new(),
            duplicates: DuplicateFilter::Any,
            include_directories: false,
            metadata: BTreeMap::new(),
            sort: SortField::Relevance,
            order: SortOrder::Desc,
            limit: DEFAULT_LIMIT,
            offset: 0,
            include_facets: false,
        }
    }
}

fn sorted_keywords(values: &[String]) -> Vec<String> {
    let mut values: Vec<String> = values
        .iter()
        .map(|v| normalize_keyword(v))
        .filter(|v| !v.is_empty())
        .collect();
    values.sort();
    values.dedup();
    values
}

fn sorted_exact(values: &[String]) -> Vec<String> {
    let mut values: Vec<String> = values.iter().filter(|v| !v.is_empty()).cloned().collect();
    values.sort();
    values.dedup();
    values
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Canonical cache key covering the query text, every filter and the
    /// sort. Pagination and the facet flag are left out, so pages of one
    /// search share a cached query.
    pub fn fingerprint(&self) -> String {
        format!(
            "q={:?}|types={:?}|ext={:?}|mime={:?}|size={:?}..{:?}|modified={:?}..{:?}|path={:?}|roots={:?}|dup={:?}|dirs={}|meta={:?}|sort={:?}:{:?}",
            self.query.trim(),
            sorted_keywords(&self.file_types),
            sorted_keywords(&self.extensions),
            sorted_keywords(&self.mime_types),
            self.min_size,
            self.max_size,
            self.modified_after,
            self.modified_before,
            self.path_contains.as_deref().map(str::to_lowercase),
            sorted_exact(&self.storage_roots),
            self.duplicates,
            self.include_directories,
            self.metadata,
            self.sort,
            self.order,
        )
    }
}

fn term_query(term: Term) -> Box<dyn Query> {
    Box::new(TermQuery::new(term, IndexRecordOption::Basic))
}

fn any_of(field: Field, values: &[String]) -> Box<dyn Query> {
    let clauses = values
        .iter()
        .map(|value| term_query(Term::from_field_text(field, value)))
        .collect();
    Box::new(BooleanQuery::union(clauses))
}

/// Turn a request into one tantivy query. Filters are appended in a fixed
/// order: text, file types, extensions, mime types, size, modified time,
/// path, storage roots, duplicates, directories, metadata.
pub fn build_query(
    fields: &IndexFields,
    parser: &QueryParser,
    request: &SearchRequest,
) -> Result<Box<dyn Query>, Error> {
    let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

    let text = request.query.trim();
    if !text.is_empty() {
        let (parsed, errors) = parser.parse_query_lenient(text);
        if !errors.is_empty() {
            debug!("Lenient parse of {:?} dropped {} fragments", text, errors.len());
        }
        let whole_name = term_query(Term::from_field_text(fields.name_sort, &text.to_lowercase()));
        clauses.push((
            Occur::Must,
            Box::new(BooleanQuery::new(vec![
                (Occur::Should, parsed),
                (Occur::Should, whole_name),
            ])),
        ));
    }

    let file_types = sorted_keywords(&request.file_types);
    if !file_types.is_empty() {
        clauses.push((Occur::Must, any_of(fields.file_type, &file_types)));
    }
    let extensions = sorted_keywords(&request.extensions);
    if !extensions.is_empty() {
        clauses.push((Occur::Must, any_of(fields.extension, &extensions)));
    }
    let mime_types = sorted_keywords(&request.mime_types);
    if !mime_types.is_empty() {
        clauses.push((Occur::Must, any_of(fields.mime_type, &mime_types)));
    }

    if request.min_size.is_some() || request.max_size.is_some() {
        let lower = request.min_size.map_or(Bound::Unbounded, Bound::Included);
        let upper = request.max_size.map_or(Bound::Unbounded, Bound::Excluded);
        clauses.push((
            Occur::Must,
            Box::new(RangeQuery::new_u64_bounds(SIZE_FIELD.to_string(), lower, upper)),
        ));
    }
    if request.modified_after.is_some() || request.modified_before.is_some() {
        let lower = request.modified_after.map_or(Bound::Unbounded, Bound::Included);
        let upper = request.modified_before.map_or(Bound::Unbounded, Bound::Excluded);
        clauses.push((
            Occur::Must,
            Box::new(RangeQuery::new_i64_bounds(MODIFIED_FIELD.to_string(), lower, upper)),
        ));
    }

    if let Some(fragment) = request.path_contains.as_deref().filter(|p| !p.is_empty()) {
        let pattern = format!(".*{}.*", regex::escape(&fragment.to_lowercase()));
        clauses.push((
            Occur::Must,
            Box::new(RegexQuery::from_pattern(&pattern, fields.path_raw)?),
        ));
    }

    let roots = sorted_exact(&request.storage_roots);
    if !roots.is_empty() {
        clauses.push((Occur::Must, any_of(fields.storage_root, &roots)));
    }

    let duplicate = || term_query(Term::from_field_bool(fields.is_duplicate, true));
    match request.duplicates {
        DuplicateFilter::Any => {}
        DuplicateFilter::Only => clauses.push((Occur::Must, duplicate())),
        DuplicateFilter::Exclude => clauses.push((Occur::MustNot, duplicate())),
    }

    if !request.include_directories {
        clauses.push((
            Occur::MustNot,
            term_query(Term::from_field_bool(fields.is_directory, true)),
        ));
    }

    for (key, value) in &request.metadata {
        clauses.push((
            Occur::Must,
            term_query(Term::from_field_text(fields.meta, &meta_term(key, value))),
        ));
    }

    if clauses.is_empty() {
        return Ok(Box::new(AllQuery));
    }
    if !clauses.iter().any(|(occur, _)| *occur == Occur::Must) {
        clauses.insert(0, (Occur::Must, Box::new(AllQuery)));
    }
    Ok(Box::new(BooleanQuery::new(clauses)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_ignores_pagination_and_list_order() {
        let a = SearchRequest {
            file_types: vec!["video".into(), "Audio".into()],
            limit: 10,
            offset: 0,
            ..SearchRequest::new("holiday")
        };
        let b = SearchRequest {
            file_types: vec!["audio".into(), "video".into()],
            limit: 50,
            offset: 100,
            include_facets: true,
            ..SearchRequest::new("holiday")
        };
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_distinguishes_filters_and_sort() {
        let base = SearchRequest::new("holiday");
        let sized = SearchRequest {
            min_size: Some(1),
            ..base.clone()
        };
        let sorted = SearchRequest {
            sort: SortField::Size,
            ..base.clone()
        };
        assert_ne!(base.fingerprint(), sized.fingerprint());
        assert_ne!(base.fingerprint(), sorted.fingerprint());
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: SearchRequest =
            serde_json::from_str(r#"{"query":"report","file_types":["document"],"limit":10}"#)
                .unwrap();
        assert_eq!(request.limit, 10);
        assert_eq!(request.duplicates, DuplicateFilter::Any);
        assert!(!request.include_directories);
        assert_eq!(request.sort, SortField::Relevance);
    }
}
