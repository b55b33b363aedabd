//! Tantivy index management and the bundled search backend

use crate::search::backend::{BackendQuery, ProjectionRow, SearchBackend, SearchHit};
use crate::search::clause::{Clause, FieldMatch, MatchKind, FUZZY_SIMILARITY};
use crate::search::config::SearchConfig;
use crate::search::document::{register_analyzers, IndexDocument};
use crate::search::error::{SearchError, SearchResult};
use crate::search::filter::FilterClause;
use crate::search::normalizer::QueryTextNormalizer;
use crate::search::query::{Limit, Window};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{
    AllQuery, BooleanQuery, BoostQuery, ConstScoreQuery, EmptyQuery, FuzzyTermQuery, Occur, PhraseQuery, Query,
    RegexQuery, TermQuery, TermSetQuery,
};
use tantivy::schema::{Field, FieldType, IndexRecordOption, Schema, Value};
use tantivy::tokenizer::TokenStream;
use tantivy::{DocAddress, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term};

/// Maximum edit distance of a fuzzy match
const MAX_FUZZY_EDITS: u8 = 2;

/// Index statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    /// Total number of live documents in the index
    pub total_documents: u64,

    /// Index size in bytes, zero for an in-RAM index
    pub index_size_bytes: u64,

    /// Number of segments
    pub num_segments: usize,
}

/// [`SearchBackend`] over a tantivy index held on disk or in RAM
pub struct TantivyBackend {
    index: Index,
    schema: Schema,

    /// Single writer; upserts and deletes stay invisible until [`Self::commit`]
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    identity: Field,
    index_path: Option<PathBuf>,
}

impl TantivyBackend {
    /// Open the index for records of type `D`, creating it when absent
    pub fn open<D: IndexDocument>(config: &SearchConfig) -> SearchResult<Self> {
        config.validate()?;
        let schema = D::schema();
        let index_path = config.index_path.as_ref().map(|p| p.join(D::INDEX_NAME));

        let index = match &index_path {
            Some(path) => Self::open_in_dir(path, schema.clone())?,
            None => Index::create_in_ram(schema.clone()),
        };
        register_analyzers(&index);

        let identity = schema.get_field(&config.identity_field).map_err(|_| {
            SearchError::Configuration(format!(
                "identity field '{}' is not part of the {} schema",
                config.identity_field,
                D::INDEX_NAME
            ))
        })?;

        let writer: IndexWriter = index
            .writer_with_num_threads(1, config.writer_heap_size)
            .map_err(|e| SearchError::IndexInitFailed(format!("Failed to create writer: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| SearchError::IndexInitFailed(format!("Failed to create reader: {}", e)))?;

        tracing::info!(
            index = D::INDEX_NAME,
            path = ?index_path,
            "Opened search index"
        );

        Ok(Self {
            index,
            schema,
            writer: Mutex::new(writer),
            reader,
            identity,
            index_path,
        })
    }

    fn open_in_dir(path: &Path, schema: Schema) -> SearchResult<Index> {
        std::fs::create_dir_all(path)
            .map_err(|e| SearchError::IndexInitFailed(format!("Failed to create index directory: {}", e)))?;

        if path.join("meta.json").exists() {
            Index::open_in_dir(path)
                .map_err(|e| SearchError::IndexInitFailed(format!("Failed to open existing index: {}", e)))
        } else {
            Index::create_in_dir(path, schema)
                .map_err(|e| SearchError::IndexInitFailed(format!("Failed to create new index: {}", e)))
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Stage an upsert of `document`; visible after the next commit
    pub fn index_document<D: IndexDocument>(&self, document: &D) -> SearchResult<()> {
        let writer = self.writer.lock();
        writer.delete_term(Term::from_field_text(self.identity, &document.document_id()));
        writer
            .add_document(document.to_tantivy_doc(&self.schema))
            .map_err(|e| SearchError::IndexingFailed(format!("Failed to add document: {}", e)))?;
        Ok(())
    }

    /// Upsert every document and commit
    pub fn index_documents<D: IndexDocument>(&self, documents: &[D]) -> SearchResult<usize> {
        {
            let writer = self.writer.lock();
            for (indexed, document) in documents.iter().enumerate() {
                writer.delete_term(Term::from_field_text(self.identity, &document.document_id()));
                writer.add_document(document.to_tantivy_doc(&self.schema)).map_err(|e| {
                    SearchError::IndexingFailed(format!("Failed to add document {}: {}", indexed, e))
                })?;
            }
        }

        self.commit()?;
        Ok(documents.len())
    }

    /// Stage deletion of the record with identity `document_id`
    pub fn delete_document(&self, document_id: &str) -> SearchResult<()> {
        self.writer
            .lock()
            .delete_term(Term::from_field_text(self.identity, document_id));
        Ok(())
    }

    /// Commit staged changes and make them visible to searches
    pub fn commit(&self) -> SearchResult<()> {
        self.writer
            .lock()
            .commit()
            .map_err(|e| SearchError::IndexingFailed(format!("Failed to commit: {}", e)))?;
        self.reader
            .reload()
            .map_err(|e| SearchError::IndexingFailed(format!("Failed to reload reader: {}", e)))?;
        Ok(())
    }

    /// Remove every document
    pub fn clear(&self) -> SearchResult<()> {
        self.writer
            .lock()
            .delete_all_documents()
            .map_err(|e| SearchError::IndexingFailed(format!("Failed to clear index: {}", e)))?;
        self.commit()?;
        tracing::info!(path = ?self.index_path, "Cleared search index");
        Ok(())
    }

    /// Get index statistics
    pub fn stats(&self) -> SearchResult<IndexStats> {
        let searcher = self.reader.searcher();

        let index_size_bytes = self
            .index_path
            .as_ref()
            .and_then(|path| std::fs::read_dir(path).ok())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.metadata().ok())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0);

        Ok(IndexStats {
            total_documents: searcher.num_docs(),
            index_size_bytes,
            num_segments: searcher.segment_readers().len(),
        })
    }

    fn field(&self, name: &str) -> SearchResult<Field> {
        self.schema
            .get_field(name)
            .map_err(|_| SearchError::Backend(format!("Unknown field '{}'", name)))
    }

    /// Whether `field` is indexed through an analyzer rather than as a raw keyword
    fn is_analyzed(&self, field: Field) -> bool {
        match self.schema.get_field_entry(field).field_type() {
            FieldType::Str(options) => options
                .get_indexing_options()
                .map(|indexing| indexing.tokenizer() != "raw")
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Index terms of `text` in `field`
    fn terms(&self, field: Field, text: &str) -> SearchResult<Vec<Term>> {
        let literal = QueryTextNormalizer::unescape(text);
        if !self.is_analyzed(field) {
            return Ok(vec![Term::from_field_text(field, literal.trim())]);
        }

        let mut analyzer = self.index.tokenizer_for_field(field)?;
        let mut stream = analyzer.token_stream(&literal);
        let mut terms = Vec::new();
        stream.process(&mut |token| terms.push(Term::from_field_text(field, &token.text)));
        Ok(terms)
    }

    fn translate(&self, clause: &Clause) -> SearchResult<Box<dyn Query>> {
        match clause {
            Clause::MatchAll => Ok(Box::new(AllQuery)),
            Clause::Match(m) => {
                let query = self.translate_match(m)?;
                Ok(with_boost(query, m.boost))
            }
            Clause::Bool(b) => {
                let mut subqueries: Vec<(Occur, Box<dyn Query>)> = Vec::new();
                for c in &b.must {
                    subqueries.push((Occur::Must, self.translate(c)?));
                }
                for c in &b.should {
                    subqueries.push((Occur::Should, self.translate(c)?));
                }
                for c in &b.must_not {
                    subqueries.push((Occur::MustNot, self.translate(c)?));
                }

                if subqueries.is_empty() {
                    return Ok(Box::new(EmptyQuery));
                }
                if b.must.is_empty() && b.should.is_empty() {
                    subqueries.push((Occur::Must, Box::new(AllQuery)));
                }
                Ok(with_boost(Box::new(BooleanQuery::new(subqueries)), b.boost))
            }
        }
    }

    fn translate_match(&self, m: &FieldMatch) -> SearchResult<Box<dyn Query>> {
        let field = self.field(&m.field)?;
        let terms = self.terms(field, &m.text)?;
        if terms.is_empty() {
            return Ok(Box::new(EmptyQuery));
        }

        let query: Box<dyn Query> = match m.kind {
            MatchKind::ExactPhrase if terms.len() > 1 => Box::new(PhraseQuery::new(terms)),
            MatchKind::ExactPhrase | MatchKind::ExactTerm => all_required(terms.into_iter().map(term_query).collect()),
            MatchKind::Prefix => {
                let mut prefixes: Vec<Box<dyn Query>> = Vec::with_capacity(terms.len());
                for term in &terms {
                    let value = term.value();
                    let text = value.as_str().unwrap_or_default();
                    let pattern = format!("{}.*", regex::escape(text));
                    prefixes.push(Box::new(RegexQuery::from_pattern(&pattern, field)?));
                }
                all_required(prefixes)
            }
            MatchKind::Fuzzy => all_required(
                terms
                    .into_iter()
                    .map(|term| {
                        let len = term.value().as_str().map(|t| t.chars().count()).unwrap_or(0);
                        Box::new(FuzzyTermQuery::new(term, fuzzy_edits(len), true)) as Box<dyn Query>
                    })
                    .collect(),
            ),
        };
        Ok(query)
    }

    /// Relevance clause AND the filter layer; filters contribute no score
    fn build_query(&self, query: &BackendQuery<'_>) -> SearchResult<Box<dyn Query>> {
        let mut subqueries: Vec<(Occur, Box<dyn Query>)> = vec![(Occur::Must, self.translate(query.relevance)?)];

        for clause in &query.filter.clauses {
            match clause {
                FilterClause::MustAnyOf { field, values } => {
                    let field = self.field(field)?;
                    let terms: Vec<Term> = values.iter().map(|v| Term::from_field_text(field, v)).collect();
                    subqueries.push((Occur::Must, Box::new(ConstScoreQuery::new(Box::new(TermSetQuery::new(terms)), 0.0))));
                }
                FilterClause::MustNot { field, value } => {
                    let field = self.field(field)?;
                    subqueries.push((Occur::MustNot, term_query(Term::from_field_text(field, value))));
                }
            }
        }

        Ok(Box::new(BooleanQuery::new(subqueries)))
    }

    /// Ranked document addresses inside `window`
    fn top_docs(&self, searcher: &Searcher, query: &dyn Query, window: Window) -> SearchResult<Vec<(f32, DocAddress)>> {
        let available = usize::try_from(searcher.num_docs())
            .unwrap_or(usize::MAX)
            .saturating_sub(window.offset);
        let limit = match window.limit {
            Limit::Bounded(limit) => limit.min(available),
            Limit::All => (searcher.search(query, &Count)?).saturating_sub(window.offset),
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let top = searcher.search(query, &TopDocs::with_limit(limit).and_offset(window.offset))?;
        Ok(top)
    }

    fn stored_values(doc: &TantivyDocument, field: Field) -> Vec<String> {
        doc.get_all(field).filter_map(|v| v.as_str()).map(str::to_string).collect()
    }

    fn to_hit(&self, score: f32, doc: &TantivyDocument) -> SearchHit {
        let id = Self::stored_values(doc, self.identity).into_iter().next().unwrap_or_default();
        let mut hit = SearchHit::new(id, score);
        for (field, entry) in self.schema.fields() {
            if !entry.is_stored() {
                continue;
            }
            let values = Self::stored_values(doc, field);
            if !values.is_empty() {
                hit.fields.insert(entry.name().to_string(), values);
            }
        }
        hit
    }
}

fn term_query(term: Term) -> Box<dyn Query> {
    Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs))
}

fn with_boost(query: Box<dyn Query>, boost: f32) -> Box<dyn Query> {
    if boost == 1.0 {
        query
    } else {
        Box::new(BoostQuery::new(query, boost))
    }
}

fn all_required(mut queries: Vec<Box<dyn Query>>) -> Box<dyn Query> {
    if queries.len() == 1 {
        return queries.remove(0);
    }
    Box::new(BooleanQuery::new(queries.into_iter().map(|q| (Occur::Must, q)).collect()))
}

/// Edit distance allowed for a term of `len` characters at [`FUZZY_SIMILARITY`]
pub(crate) fn fuzzy_edits(len: usize) -> u8 {
    // f32 similarity is not exact; nudge before flooring so 0.2 * 5 yields 1
    let edits = ((1.0 - f64::from(FUZZY_SIMILARITY)) * len as f64 + 1e-6).floor();
    (edits as u8).min(MAX_FUZZY_EDITS)
}

impl SearchBackend for TantivyBackend {
    fn search(&self, query: &BackendQuery<'_>, window: Window) -> SearchResult<Vec<SearchHit>> {
        let query = self.build_query(query)?;
        let searcher = self.reader.searcher();

        self.top_docs(&searcher, query.as_ref(), window)?
            .into_iter()
            .map(|(score, address)| {
                let doc: TantivyDocument = searcher.doc(address)?;
                Ok(self.to_hit(score, &doc))
            })
            .collect()
    }

    fn project(&self, query: &BackendQuery<'_>, fields: &[String], window: Window) -> SearchResult<Vec<ProjectionRow>> {
        let projected = fields
            .iter()
            .map(|name| self.field(name))
            .collect::<SearchResult<Vec<Field>>>()?;
        let query = self.build_query(query)?;
        let searcher = self.reader.searcher();

        self.top_docs(&searcher, query.as_ref(), window)?
            .into_iter()
            .map(|(_, address)| {
                let doc: TantivyDocument = searcher.doc(address)?;
                Ok(projected
                    .iter()
                    .map(|field| Self::stored_values(&doc, *field).into_iter().next())
                    .collect())
            })
            .collect()
    }

    fn count(&self, query: &BackendQuery<'_>) -> SearchResult<u64> {
        let query = self.build_query(query)?;
        let searcher = self.reader.searcher();
        Ok(searcher.search(query.as_ref(), &Count)? as u64)
    }
}
