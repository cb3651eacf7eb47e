//! Near-real-time full-text index over catalog records.
//!
//! Writes go through a single writer behind a mutex and mark the reader
//! stale; the next search reloads the reader before running its query.

pub mod cache;
pub mod document;
pub mod facets;
pub mod query;
pub mod schema;

pub use document::SearchHit;
pub use facets::FacetCount;
pub use query::{DuplicateFilter, SearchRequest, SortField, SortOrder};

use crate::catalog::{Catalog, FileRecord};
use crate::config::IndexConfig;
use crate::error::Error;
use crate::outcome::BatchOutcome;
use crate::progress::ProgressReporter;
use cache::QueryCache;
use document::{hit_from_document, is_eligible, to_document};
use rayon::prelude::*;
use schema::{build_schema, IndexFields, MODIFIED_FIELD, SIZE_FIELD};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tantivy::collector::{Count, DocSetCollector, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::query::{Query, QueryParser};
use tantivy::schema::Value;
use tantivy::{
    DocAddress, Index, IndexReader, IndexWriter, Order, ReloadPolicy, Searcher, TantivyDocument,
    TantivyError, Term,
};
use tracing::{debug, error, info, warn};

const PROGRESS_INTERVAL: usize = 1000;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    /// Exact number of matching documents, independent of pagination.
    pub total_hits: usize,
    pub facets: Option<BTreeMap<String, Vec<FacetCount>>>,
    pub took: Duration,
}

pub struct SearchIndex {
    index: Index,
    fields: IndexFields,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    parser: QueryParser,
    cache: QueryCache,
    stale: AtomicBool,
    facet_scan_limit: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Run `queue` against the writer. On failure every operation queued since
/// the last commit is rolled back, so a later commit cannot apply half a batch.
fn queue_or_rollback<T>(
    writer: &mut IndexWriter,
    queue: impl FnOnce(&mut IndexWriter) -> Result<T, Error>,
) -> Result<T, Error> {
    match queue(writer) {
        Ok(value) => Ok(value),
        Err(e) => {
            if let Err(rollback) = writer.rollback() {
                warn!("Index rollback failed: {}", rollback);
            }
            Err(e)
        }
    }
}

impl SearchIndex {
    /// Open the index under `config.path`, creating it when absent.
    pub fn open(config: &IndexConfig) -> Result<Self, Error> {
        fs::create_dir_all(&config.path)?;
        let (schema, fields) = build_schema();
        let directory = MmapDirectory::open(&config.path).map_err(TantivyError::from)?;
        let index = Index::open_or_create(directory, schema)?;
        info!("Opened search index at {}", config.path.display());
        Self::from_index(index, fields, config)
    }

    pub fn open_in_ram(config: &IndexConfig) -> Result<Self, Error> {
        let (schema, fields) = build_schema();
        Self::from_index(Index::create_in_ram(schema), fields, config)
    }

    fn from_index(index: Index, fields: IndexFields, config: &IndexConfig) -> Result<Self, Error> {
        let writer: IndexWriter = index.writer(config.writer_heap_bytes)?;
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let parser = QueryParser::for_index(&index, vec![fields.all_text]);
        Ok(Self {
            index,
            fields,
            reader,
            writer: Mutex::new(writer),
            parser,
            cache: QueryCache::new(config.query_cache_capacity),
            stale: AtomicBool::new(false),
            facet_scan_limit: config.facet_scan_limit,
        })
    }

    fn id_term(&self, id: i64) -> Term {
        Term::from_field_u64(self.fields.id, id as u64)
    }

    fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    /// Reload the reader if a write landed since the last reload.
    fn refresh_if_stale(&self) -> Result<bool, Error> {
        if !self.stale.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }
        if let Err(e) = self.reader.reload() {
            self.mark_stale();
            return Err(e.into());
        }
        debug!("Search reader reloaded");
        Ok(true)
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Replace the document for `file`, or drop it when the record is no
    /// longer eligible.
    pub fn upsert(&self, file: &FileRecord) -> Result<(), Error> {
        let outcome = self.upsert_batch(std::slice::from_ref(file))?;
        match outcome.skipped.into_iter().next() {
            Some(skipped) => Err(Error::Other(skipped.reason)),
            None => Ok(()),
        }
    }

    /// Upsert every record, then commit once.
    pub fn upsert_batch(&self, files: &[FileRecord]) -> Result<BatchOutcome, Error> {
        let mut writer = lock(&self.writer);
        let outcome = queue_or_rollback(&mut writer, |writer| {
            let mut outcome = BatchOutcome::new();
            for file in files {
                writer.delete_term(self.id_term(file.id));
                if !is_eligible(file) {
                    debug!("File {} is not eligible, removed from index", file.id);
                    outcome.success();
                    continue;
                }
                match to_document(&self.fields, file) {
                    Ok(doc) => {
                        writer.add_document(doc)?;
                        outcome.success();
                    }
                    Err(e) => outcome.skip(format!("file {}", file.id), e),
                }
            }
            writer.commit()?;
            Ok(outcome)
        })?;
        self.mark_stale();
        Ok(outcome)
    }

    pub fn delete(&self, id: i64) -> Result<(), Error> {
        let mut writer = lock(&self.writer);
        queue_or_rollback(&mut writer, |writer| {
            writer.delete_term(self.id_term(id));
            writer.commit()?;
            Ok(())
        })?;
        self.mark_stale();
        debug!("Deleted file {} from index", id);
        Ok(())
    }

    /// Drop every document and index all live catalog records.
    pub fn reindex_all(
        &self,
        catalog: &Catalog,
        reporter: &dyn ProgressReporter,
    ) -> Result<BatchOutcome, Error> {
        let started = Instant::now();
        let files = catalog.snapshot()?.files;
        let total = files.len();
        reporter.on_index_start(total);
        info!("Reindexing {} live files", total);

        let fields = self.fields;
        let docs: Vec<Result<TantivyDocument, Error>> =
            files.par_iter().map(|file| to_document(&fields, file)).collect();

        let mut writer = lock(&self.writer);
        let outcome = queue_or_rollback(&mut writer, |writer| {
            let mut outcome = BatchOutcome::new();
            writer.delete_all_documents()?;
            for (i, (file, doc)) in files.iter().zip(docs).enumerate() {
                match doc {
                    Ok(doc) => {
                        writer.add_document(doc)?;
                        outcome.success();
                    }
                    Err(e) => outcome.skip(format!("file {}", file.id), e),
                }
                if (i + 1) % PROGRESS_INTERVAL == 0 {
                    reporter.on_index_progress(i + 1, total);
                }
            }
            writer.commit()?;
            Ok(outcome)
        })?;
        drop(writer);
        self.mark_stale();

        reporter.on_index_progress(total, total);
        reporter.on_index_complete(outcome.succeeded, started.elapsed().as_secs_f64());
        info!(
            "Reindexed {} files ({} skipped) in {:.2}s",
            outcome.succeeded,
            outcome.skipped_count(),
            started.elapsed().as_secs_f64()
        );
        Ok(outcome)
    }

    pub fn commit(&self) -> Result<(), Error> {
        lock(&self.writer).commit()?;
        self.mark_stale();
        Ok(())
    }

    /// Merge all searchable segments into one and collect unused files.
    pub fn optimize(&self) -> Result<(), Error> {
        let mut writer = lock(&self.writer);
        let segments = self.index.searchable_segment_ids()?;
        if segments.len() > 1 {
            info!("Merging {} segments", segments.len());
            writer.merge(&segments).wait()?;
        }
        writer.garbage_collect_files().wait()?;
        drop(writer);
        self.mark_stale();
        Ok(())
    }

    pub fn doc_count(&self) -> Result<u64, Error> {
        self.refresh_if_stale()?;
        Ok(self.reader.searcher().num_docs())
    }

    pub fn cached_queries(&self) -> usize {
        self.cache.len()
    }

    // ── Search ───────────────────────────────────────────────────

    /// Like [`try_search`](Self::try_search), but a failure is logged and
    /// reported as an empty result.
    pub fn search(&self, request: &SearchRequest) -> SearchResponse {
        match self.try_search(request) {
            Ok(response) => response,
            Err(e) => {
                error!("Search for {:?} failed: {}", request.query, e);
                SearchResponse::default()
            }
        }
    }

    pub fn try_search(&self, request: &SearchRequest) -> Result<SearchResponse, Error> {
        let started = Instant::now();
        self.refresh_if_stale()?;
        let query = self.cached_query(request)?;
        let searcher = self.reader.searcher();

        let (total_hits, hits) = self.collect_hits(&searcher, query.as_ref(), request)?;
        let facets = if request.include_facets {
            Some(facets::collect_facets(
                &searcher,
                query.as_ref(),
                &self.fields,
                self.facet_scan_limit,
            )?)
        } else {
            None
        };

        let took = started.elapsed();
        debug!(
            "Search {:?}: {} of {} hits in {:?}",
            request.query,
            hits.len(),
            total_hits,
            took
        );
        Ok(SearchResponse {
            hits,
            total_hits,
            facets,
            took,
        })
    }

    fn cached_query(&self, request: &SearchRequest) -> Result<Box<dyn Query>, Error> {
        let fingerprint = request.fingerprint();
        if let Some(query) = self.cache.get(&fingerprint) {
            return Ok(query);
        }
        let query = query::build_query(&self.fields, &self.parser, request)?;
        self.cache.insert(fingerprint, query.as_ref());
        Ok(query)
    }

    fn load_hit(&self, searcher: &Searcher, address: DocAddress, score: f32) -> Result<SearchHit, Error> {
        let doc: TantivyDocument = searcher.doc(address)?;
        Ok(hit_from_document(&self.fields, &doc, score))
    }

    fn collect_hits(
        &self,
        searcher: &Searcher,
        query: &dyn Query,
        request: &SearchRequest,
    ) -> Result<(usize, Vec<SearchHit>), Error> {
        if request.limit == 0 {
            return Ok((searcher.search(query, &Count)?, Vec::new()));
        }
        let order = match request.order {
            SortOrder::Asc => Order::Asc,
            SortOrder::Desc => Order::Desc,
        };
        let top = TopDocs::with_limit(request.limit).and_offset(request.offset);

        match request.sort {
            SortField::Relevance => {
                let (total, page) = searcher.search(query, &(Count, top))?;
                let hits = page
                    .into_iter()
                    .map(|(score, address)| self.load_hit(searcher, address, score))
                    .collect::<Result<Vec<_>, Error>>()?;
                Ok((total, hits))
            }
            SortField::Size => {
                let collector = top.order_by_fast_field::<u64>(SIZE_FIELD, order);
                let (total, page) = searcher.search(query, &(Count, collector))?;
                let hits = page
                    .into_iter()
                    .map(|(_, address)| self.load_hit(searcher, address, 0.0))
                    .collect::<Result<Vec<_>, Error>>()?;
                Ok((total, hits))
            }
            SortField::Modified => {
                let collector = top.order_by_fast_field::<i64>(MODIFIED_FIELD, order);
                let (total, page) = searcher.search(query, &(Count, collector))?;
                let hits = page
                    .into_iter()
                    .map(|(_, address)| self.load_hit(searcher, address, 0.0))
                    .collect::<Result<Vec<_>, Error>>()?;
                Ok((total, hits))
            }
            SortField::Name => self.collect_by_name(searcher, query, request),
        }
    }

    /// Name order needs the stored sort key of every match.
    fn collect_by_name(
        &self,
        searcher: &Searcher,
        query: &dyn Query,
        request: &SearchRequest,
    ) -> Result<(usize, Vec<SearchHit>), Error> {
        let addresses = searcher.search(query, &DocSetCollector)?;
        let mut keyed = Vec::with_capacity(addresses.len());
        for address in addresses {
            let doc: TantivyDocument = searcher.doc(address)?;
            let key = doc
                .get_first(self.fields.name_sort)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let id = doc
                .get_first(self.fields.id)
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            keyed.push((key, id, address));
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        if request.order == SortOrder::Desc {
            keyed.reverse();
        }

        let total = keyed.len();
        let hits = keyed
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .map(|(_, _, address)| self.load_hit(searcher, address, 0.0))
            .collect::<Result<Vec<_>, Error>>()?;
        Ok((total, hits))
    }
}
