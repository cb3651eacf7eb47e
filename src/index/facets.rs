use super::schema::IndexFields;
use crate::error::Error;
use ahash::AHashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use tantivy::collector::TopDocs;
use tantivy::query::Query;
use tantivy::schema::{Field, Value};
use tantivy::{Searcher, TantivyDocument};

pub const MAX_FACET_VALUES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetCount {
    pub value: String,
    pub count: usize,
}

fn facet_fields(fields: &IndexFields) -> [(&'static str, Field); 4] {
    [
        ("file_type", fields.file_type),
        ("size_category", fields.size_category),
        ("year", fields.year),
        ("storage_root", fields.storage_root),
    ]
}

/// Tally stored values of each facet field over the top `scan_limit`
/// matches of `query`. Counts are approximate once matches exceed the limit.
pub fn collect_facets(
    searcher: &Searcher,
    query: &dyn Query,
    fields: &IndexFields,
    scan_limit: usize,
) -> Result<BTreeMap<String, Vec<FacetCount>>, Error> {
    let mut facets = BTreeMap::new();
    for (name, field) in facet_fields(fields) {
        let mut tally: AHashMap<String, usize> = AHashMap::new();
        if scan_limit > 0 {
            let top = searcher.search(query, &TopDocs::with_limit(scan_limit))?;
            for (_, address) in top {
                let doc: TantivyDocument = searcher.doc(address)?;
                if let Some(value) = doc.get_first(field).and_then(|v| v.as_str()) {
                    *tally.entry(value.to_string()).or_insert(0) += 1;
                }
            }
        }
        facets.insert(name.to_string(), rank(tally));
    }
    Ok(facets)
}

/// Count descending, ties by value ascending, at most [`MAX_FACET_VALUES`].
pub fn rank(tally: AHashMap<String, usize>) -> Vec<FacetCount> {
    let mut counts: Vec<FacetCount> = tally
        .into_iter()
        .map(|(value, count)| FacetCount { value, count })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    counts.truncate(MAX_FACET_VALUES);
    counts
}
