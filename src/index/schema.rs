use tantivy::schema::{Field, Schema, FAST, INDEXED, STORED, STRING, TEXT};

pub const SIZE_FIELD: &str = "size";
pub const MODIFIED_FIELD: &str = "modified";

/// Separates key and value in `meta` terms.
pub const META_SEPARATOR: char = '\u{1f}';

/// Handles to every field of the search schema.
#[derive(Debug, Clone, Copy)]
pub struct IndexFields {
    pub id: Field,
    pub name: Field,
    pub path: Field,
    pub content: Field,
    pub all_text: Field,
    /// Lowercased full path, untokenized, for substring matching.
    pub path_raw: Field,
    pub extension: Field,
    pub mime_type: Field,
    pub file_type: Field,
    pub storage_root: Field,
    pub size_category: Field,
    pub year: Field,
    pub month: Field,
    pub day: Field,
    /// Lowercased name, for sorting and whole-name matches.
    pub name_sort: Field,
    pub is_directory: Field,
    pub is_duplicate: Field,
    pub size: Field,
    pub modified: Field,
    /// One `key\u{1f}value` term per metadata pair.
    pub meta: Field,
    pub metadata_json: Field,
}

pub fn build_schema() -> (Schema, IndexFields) {
    let mut builder = Schema::builder();
    let fields = IndexFields {
        id: builder.add_u64_field("id", INDEXED | STORED | FAST),
        name: builder.add_text_field("name", TEXT | STORED),
        path: builder.add_text_field("path", TEXT | STORED),
        content: builder.add_text_field("content", TEXT | STORED),
        all_text: builder.add_text_field("all_text", TEXT),
        path_raw: builder.add_text_field("path_raw", STRING),
        extension: builder.add_text_field("extension", STRING | STORED),
        mime_type: builder.add_text_field("mime_type", STRING | STORED),
        file_type: builder.add_text_field("file_type", STRING | STORED),
        storage_root: builder.add_text_field("storage_root", STRING | STORED),
        size_category: builder.add_text_field("size_category", STRING | STORED),
        year: builder.add_text_field("year", STRING | STORED),
        month: builder.add_text_field("month", STRING | STORED),
        day: builder.add_text_field("day", STRING | STORED),
        name_sort: builder.add_text_field("name_sort", STRING | STORED),
        is_directory: builder.add_bool_field("is_directory", INDEXED | STORED),
        is_duplicate: builder.add_bool_field("is_duplicate", INDEXED | STORED),
        size: builder.add_u64_field(SIZE_FIELD, INDEXED | STORED | FAST),
        modified: builder.add_i64_field(MODIFIED_FIELD, INDEXED | STORED | FAST),
        meta: builder.add_text_field("meta", STRING),
        metadata_json: builder.add_text_field("metadata_json", STORED),
    };
    (builder.build(), fields)
}
