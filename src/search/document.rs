//! Indexable records and the schemas of the bundled tantivy indexes

use crate::search::locale::Locale;
use serde::{Deserialize, Serialize};
use tantivy::schema::*;
use tantivy::tokenizer::{AsciiFoldingFilter, LowerCaser, SimpleTokenizer, TextAnalyzer};
use tantivy::{Index, TantivyDocument};

/// Analyzer of name and code fields: lowercase, ASCII folded
pub const CONCEPT_NAME_ANALYZER: &str = "concept_name";

/// Field names shared by the schemas and the search policies
pub mod fields {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const CODE: &str = "code";
    pub const LOCALE: &str = "locale";
    pub const LOCALE_PREFERRED: &str = "locale_preferred";
    pub const VOIDED: &str = "voided";
    pub const CONCEPT_ID: &str = "concept_id";
    pub const CLASS_ID: &str = "class_id";
    pub const DATATYPE_ID: &str = "datatype_id";
    pub const CONCEPT_RETIRED: &str = "concept_retired";
    pub const RETIRED: &str = "retired";
}

/// Trait for records that can be written to a tantivy index
pub trait IndexDocument {
    /// Sub-directory of the configured index path holding this record type
    const INDEX_NAME: &'static str;

    /// Schema of the index holding this record type
    fn schema() -> Schema;

    /// Convert to a tantivy document
    fn to_tantivy_doc(&self, schema: &Schema) -> TantivyDocument;

    /// Identity key, unique within the index
    fn document_id(&self) -> String;
}

/// A name of a concept in one locale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptNameDocument {
    pub concept_name_id: i64,
    pub concept_id: i64,
    pub name: String,
    pub locale: Locale,

    /// Canonical display name of the concept in its locale
    pub locale_preferred: bool,
    pub voided: bool,

    pub class_id: i64,
    pub datatype_id: i64,
    pub concept_retired: bool,

    /// Reference term codes mapped to the concept
    #[serde(default)]
    pub codes: Vec<String>,
}

/// A drug formulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugDocument {
    pub drug_id: i64,
    pub name: String,
    pub concept_id: Option<i64>,
    pub retired: bool,

    /// Reference term codes mapped to the drug
    #[serde(default)]
    pub codes: Vec<String>,
}

fn flag(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn add_text(doc: &mut TantivyDocument, schema: &Schema, name: &str, value: &str) {
    if let Ok(field) = schema.get_field(name) {
        doc.add_text(field, value);
    }
}

impl IndexDocument for ConceptNameDocument {
    const INDEX_NAME: &'static str = "concept_names";

    fn schema() -> Schema {
        build_concept_name_schema()
    }

    fn to_tantivy_doc(&self, schema: &Schema) -> TantivyDocument {
        let mut doc = TantivyDocument::new();

        add_text(&mut doc, schema, fields::ID, &self.concept_name_id.to_string());
        add_text(&mut doc, schema, fields::NAME, &self.name);
        add_text(&mut doc, schema, fields::LOCALE, &self.locale.to_string());
        add_text(&mut doc, schema, fields::LOCALE_PREFERRED, flag(self.locale_preferred));
        add_text(&mut doc, schema, fields::VOIDED, flag(self.voided));
        add_text(&mut doc, schema, fields::CONCEPT_ID, &self.concept_id.to_string());
        add_text(&mut doc, schema, fields::CLASS_ID, &self.class_id.to_string());
        add_text(&mut doc, schema, fields::DATATYPE_ID, &self.datatype_id.to_string());
        add_text(&mut doc, schema, fields::CONCEPT_RETIRED, flag(self.concept_retired));

        for code in &self.codes {
            add_text(&mut doc, schema, fields::CODE, code);
        }

        doc
    }

    fn document_id(&self) -> String {
        self.concept_name_id.to_string()
    }
}

impl IndexDocument for DrugDocument {
    const INDEX_NAME: &'static str = "drugs";

    fn schema() -> Schema {
        build_drug_schema()
    }

    fn to_tantivy_doc(&self, schema: &Schema) -> TantivyDocument {
        let mut doc = TantivyDocument::new();

        add_text(&mut doc, schema, fields::ID, &self.drug_id.to_string());
        add_text(&mut doc, schema, fields::NAME, &self.name);
        add_text(&mut doc, schema, fields::RETIRED, flag(self.retired));
        if let Some(concept_id) = self.concept_id {
            add_text(&mut doc, schema, fields::CONCEPT_ID, &concept_id.to_string());
        }

        for code in &self.codes {
            add_text(&mut doc, schema, fields::CODE, code);
        }

        doc
    }

    fn document_id(&self) -> String {
        self.drug_id.to_string()
    }
}

/// Full-text options of name and code fields
fn analyzed_text() -> TextOptions {
    let indexing = TextFieldIndexing::default()
        .set_tokenizer(CONCEPT_NAME_ANALYZER)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    TextOptions::default().set_indexing_options(indexing).set_stored()
}

/// Build the search schema for concept names
pub fn build_concept_name_schema() -> Schema {
    let mut schema_builder = Schema::builder();

    // Identity - raw keyword, stored for projection
    schema_builder.add_text_field(fields::ID, STRING | STORED);

    // Name and reference codes - analyzed, positions kept for phrase matching
    schema_builder.add_text_field(fields::NAME, analyzed_text());
    schema_builder.add_text_field(fields::CODE, analyzed_text());

    // Keyword fields used by locale clauses and filters
    schema_builder.add_text_field(fields::LOCALE, STRING | STORED);
    schema_builder.add_text_field(fields::LOCALE_PREFERRED, STRING | STORED);
    schema_builder.add_text_field(fields::VOIDED, STRING | STORED);
    schema_builder.add_text_field(fields::CONCEPT_ID, STRING | STORED);
    schema_builder.add_text_field(fields::CLASS_ID, STRING | STORED);
    schema_builder.add_text_field(fields::DATATYPE_ID, STRING | STORED);
    schema_builder.add_text_field(fields::CONCEPT_RETIRED, STRING | STORED);

    schema_builder.build()
}

/// Build the search schema for drugs
pub fn build_drug_schema() -> Schema {
    let mut schema_builder = Schema::builder();

    schema_builder.add_text_field(fields::ID, STRING | STORED);
    schema_builder.add_text_field(fields::NAME, analyzed_text());
    schema_builder.add_text_field(fields::CODE, analyzed_text());
    schema_builder.add_text_field(fields::CONCEPT_ID, STRING | STORED);
    schema_builder.add_text_field(fields::RETIRED, STRING | STORED);

    schema_builder.build()
}

/// Register the analyzers referenced by the schemas on `index`
pub fn register_analyzers(index: &Index) {
    let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(AsciiFoldingFilter)
        .build();
    index.tokenizers().register(CONCEPT_NAME_ANALYZER, analyzer);
}
