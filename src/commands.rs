use catalog_projector::index::{DuplicateFilter, SortField, SortOrder};
use catalog_projector::SearchRequest;
use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "catalog-projector")]
#[command(about = "Browse and search a file catalog", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Rebuild the whole virtual tree from the catalog
    RebuildView,
    /// Re-place one file in the virtual tree after a catalog change
    SyncFile { id: i64 },
    /// Remove one file from the virtual tree
    RemoveFile { id: i64 },
    /// Regenerate a duplicate group's directory
    SyncGroup { id: i64 },
    /// Compare the ledger with the tree on disk
    VerifyView,
    /// Rebuild the search index from the catalog
    Reindex,
    /// Update one file's search document
    IndexFile { id: i64 },
    /// Search the index
    Search(SearchArgs),
    /// Merge index segments
    Optimize,
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DuplicatesArg {
    Any,
    Only,
    Exclude,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortArg {
    Relevance,
    Name,
    Size,
    Modified,
}

#[derive(Debug, clap::Args)]
pub struct SearchArgs {
    /// Free text query
    #[arg(default_value = "")]
    pub query: String,
    #[arg(long = "type")]
    pub file_types: Vec<String>,
    #[arg(long = "ext")]
    pub extensions: Vec<String>,
    #[arg(long = "mime")]
    pub mime_types: Vec<String>,
    #[arg(long)]
    pub min_size: Option<u64>,
    #[arg(long)]
    pub max_size: Option<u64>,
    /// Unix seconds, inclusive
    #[arg(long)]
    pub after: Option<i64>,
    /// Unix seconds, exclusive
    #[arg(long)]
    pub before: Option<i64>,
    #[arg(long)]
    pub path: Option<String>,
    #[arg(long = "root")]
    pub storage_roots: Vec<String>,
    #[arg(long, value_enum, default_value = "any")]
    pub duplicates: DuplicatesArg,
    #[arg(long)]
    pub directories: bool,
    /// Metadata filter as key=value
    #[arg(long = "meta")]
    pub metadata: Vec<String>,
    #[arg(long, value_enum, default_value = "relevance")]
    pub sort: SortArg,
    #[arg(long)]
    pub asc: bool,
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
    #[arg(long)]
    pub facets: bool,
    /// Print the response as JSON
    #[arg(long)]
    pub json: bool,
}

impl SearchArgs {
    pub fn to_request(&self) -> SearchRequest {
        let metadata = self
            .metadata
            .iter()
            .filter_map(|pair| pair.split_once('='))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SearchRequest {
            query: self.query.clone(),
            file_types: self.file_types.clone(),
            extensions: self.extensions.clone(),
            mime_types: self.mime_types.clone(),
            min_size: self.min_size,
            max_size: self.max_size,
            modified_after: self.after,
            modified_before: self.before,
            path_contains: self.path.clone(),
            storage_roots: self.storage_roots.clone(),
            duplicates: match self.duplicates {
                DuplicatesArg::Any => DuplicateFilter::Any,
                DuplicatesArg::Only => DuplicateFilter::Only,
                DuplicatesArg::Exclude => DuplicateFilter::Exclude,
            },
            include_directories: self.directories,
            metadata,
            sort: match self.sort {
                SortArg::Relevance => SortField::Relevance,
                SortArg::Name => SortField::Name,
                SortArg::Size => SortField::Size,
                SortArg::Modified => SortField::Modified,
            },
            order: if self.asc { SortOrder::Asc } else { SortOrder::Desc },
            limit: self.limit,
            offset: self.offset,
            include_facets: self.facets,
        }
    }
}
