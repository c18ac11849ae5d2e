//! Full-text index over product name and description, using Tantivy.
//!
//! The index lives in RAM and is kept in step with the product repository:
//! every create/update replaces the product's document and every delete
//! removes it. At startup it is rebuilt from the repository.

use std::sync::{Arc, Mutex};

use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{
    Field, IndexRecordOption, STORED, STRING, Schema, TextFieldIndexing, TextOptions, Value,
};
use tantivy::tokenizer::{Language, LowerCaser, RemoveLongFilter, SimpleTokenizer, Stemmer, TextAnalyzer};
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term, doc};
use tracing::{debug, instrument};

use souk_core::ProductId;

use super::SearchError;
use crate::models::Product;

const TOKENIZER: &str = "en_stem";
const WRITER_MEMORY_BYTES: usize = 20_000_000;

/// Schema field handles.
#[derive(Clone, Copy)]
struct TextFields {
    id: Field,
    name: Field,
    description: Field,
}

struct TextIndexInner {
    index: Index,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
    fields: TextFields,
}

/// Relevance index for text search.
#[derive(Clone)]
pub struct TextIndex {
    inner: Arc<TextIndexInner>,
}

impl TextIndex {
    /// Create an empty in-memory index.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer or reader cannot be created.
    pub fn new() -> Result<Self, SearchError> {
        let (schema, fields) = Self::build_schema();
        let index = Index::create_in_ram(schema);

        index.tokenizers().register(
            TOKENIZER,
            TextAnalyzer::builder(SimpleTokenizer::default())
                .filter(RemoveLongFilter::limit(40))
                .filter(LowerCaser)
                .filter(Stemmer::new(Language::English))
                .build(),
        );

        let writer = index
            .writer_with_num_threads(1, WRITER_MEMORY_BYTES)
            .map_err(|e| SearchError::Index(format!("Failed to create writer: {e}")))?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| SearchError::Index(format!("Failed to create reader: {e}")))?;

        Ok(Self {
            inner: Arc::new(TextIndexInner {
                index,
                reader,
                writer: Mutex::new(writer),
                fields,
            }),
        })
    }

    fn build_schema() -> (Schema, TextFields) {
        let mut schema_builder = Schema::builder();

        // STRING means indexed but not tokenized (exact match), used for deletes
        let id = schema_builder.add_text_field("id", STRING | STORED);

        let text_indexing = TextFieldIndexing::default()
            .set_tokenizer(TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions);
        let text_options = TextOptions::default().set_indexing_options(text_indexing);

        let name = schema_builder.add_text_field("name", text_options.clone());
        let description = schema_builder.add_text_field("description", text_options);

        (schema_builder.build(), TextFields { id, name, description })
    }

    fn document(&self, product: &Product) -> TantivyDocument {
        let fields = self.inner.fields;
        doc!(
            fields.id => product.id.to_string(),
            fields.name => product.name.clone(),
            fields.description => product.description.clone().unwrap_or_default()
        )
    }

    /// Run `apply` against the writer, then commit and make the change visible.
    fn write(&self, apply: impl FnOnce(&IndexWriter) -> Result<(), SearchError>) -> Result<(), SearchError> {
        let mut writer = self
            .inner
            .writer
            .lock()
            .map_err(|_| SearchError::Index("Lock poisoned".to_string()))?;
        apply(&writer)?;
        writer
            .commit()
            .map_err(|e| SearchError::Index(format!("Failed to commit index: {e}")))?;
        drop(writer);

        self.inner
            .reader
            .reload()
            .map_err(|e| SearchError::Index(format!("Failed to reload reader: {e}")))
    }

    /// Index a product, replacing any previous version of it.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written or committed.
    pub fn upsert(&self, product: &Product) -> Result<(), SearchError> {
        let doc = self.document(product);
        let id_term = Term::from_field_text(self.inner.fields.id, &product.id.to_string());
        self.write(|writer| {
            writer.delete_term(id_term);
            writer
                .add_document(doc)
                .map_err(|e| SearchError::Index(format!("Failed to add document: {e}")))?;
            Ok(())
        })
    }

    /// Remove a product from the index.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletion cannot be committed.
    pub fn remove(&self, id: ProductId) -> Result<(), SearchError> {
        let id_term = Term::from_field_text(self.inner.fields.id, &id.to_string());
        self.write(|writer| {
            writer.delete_term(id_term);
            Ok(())
        })
    }

    /// Replace the whole index with `products`.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be cleared or rebuilt.
    pub fn replace_all(&self, products: &[Product]) -> Result<(), SearchError> {
        let docs: Vec<_> = products.iter().map(|p| self.document(p)).collect();
        self.write(|writer| {
            writer
                .delete_all_documents()
                .map_err(|e| SearchError::Index(format!("Failed to clear index: {e}")))?;
            for doc in docs {
                writer
                    .add_document(doc)
                    .map_err(|e| SearchError::Index(format!("Failed to add document: {e}")))?;
            }
            Ok(())
        })
    }

    /// Product ids matching `query`, best match first, with their scores.
    ///
    /// Terms are OR-ed and stemmed; query syntax errors are tolerated.
    ///
    /// # Errors
    ///
    /// Returns an error if the search itself fails.
    #[instrument(skip(self))]
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<(ProductId, f32)>, SearchError> {
        let query = query.trim();
        let searcher = self.inner.reader.searcher();
        if query.is_empty() || limit == 0 || searcher.num_docs() == 0 {
            return Ok(Vec::new());
        }

        let fields = self.inner.fields;
        let parser = QueryParser::for_index(&self.inner.index, vec![fields.name, fields.description]);
        let (parsed, errors) = parser.parse_query_lenient(query);
        if !errors.is_empty() {
            debug!(?errors, "Ignored parts of search query");
        }

        let top_docs = searcher
            .search(&parsed, &TopDocs::with_limit(limit))
            .map_err(|e| SearchError::Query(format!("Search failed: {e}")))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, address) in top_docs {
            let doc = searcher
                .doc::<TantivyDocument>(address)
                .map_err(|e| SearchError::Query(format!("Failed to retrieve doc: {e}")))?;
            let raw = doc
                .get_first(fields.id)
                .and_then(|v| v.as_str())
                .ok_or_else(|| SearchError::Query("Document without id".to_string()))?;
            let id = raw
                .parse()
                .map_err(|e| SearchError::Query(format!("Invalid id {raw}: {e}")))?;
            hits.push((id, score));
        }
        Ok(hits)
    }

    /// Number of indexed products.
    #[must_use]
    pub fn num_docs(&self) -> u64 {
        self.inner.reader.searcher().num_docs()
    }
}
