//! Shared fixture: a small clinical terminology indexed in RAM
#![allow(dead_code)]

use concept_search::policy::{ConceptNameSearchPolicy, DrugSearchPolicy, InMemoryTerminology, SearchContext};
use concept_search::search::{ConceptNameDocument, DrugDocument, Locale, SearchConfig, TantivyBackend};

pub const CLASS_DRUG: i64 = 1;
pub const CLASS_DIAGNOSIS: i64 = 2;
pub const CLASS_QUESTION: i64 = 3;

pub const DATATYPE_NA: i64 = 4;
pub const DATATYPE_CODED: i64 = 7;

pub const ASPIRIN: i64 = 1;
pub const RETIRED_ASPIRIN: i64 = 2;
pub const CHEST_PAIN: i64 = 3;
pub const HEADACHE: i64 = 4;
pub const FEVER: i64 = 5;
pub const PRESENTING_SYMPTOM: i64 = 6;
pub const PARACETAMOL: i64 = 7;
pub const COMMON_COLD: i64 = 8;
pub const COPD: i64 = 9;

pub struct Fixture {
    pub names: TantivyBackend,
    pub drugs: TantivyBackend,
}

pub fn init_tracing() {
    concept_search::telemetry::init_tracing("concept_search=debug");
}

#[allow(clippy::too_many_arguments)]
fn name(
    id: i64,
    concept_id: i64,
    text: &str,
    locale: &str,
    preferred: bool,
    class_id: i64,
    datatype_id: i64,
) -> ConceptNameDocument {
    ConceptNameDocument {
        concept_name_id: id,
        concept_id,
        name: text.to_string(),
        locale: locale.parse().unwrap(),
        locale_preferred: preferred,
        voided: false,
        class_id,
        datatype_id,
        concept_retired: false,
        codes: vec![],
    }
}

pub fn concept_names() -> Vec<ConceptNameDocument> {
    let mut aspirin = name(101, ASPIRIN, "Aspirin", "en", true, CLASS_DRUG, DATATYPE_NA);
    aspirin.codes = vec!["ASA".to_string()];

    let mut retired = name(201, RETIRED_ASPIRIN, "Aspirin 81", "en", true, CLASS_DRUG, DATATYPE_NA);
    retired.concept_retired = true;

    let mut voided = name(303, CHEST_PAIN, "Thoracic pain", "en", false, CLASS_DIAGNOSIS, DATATYPE_NA);
    voided.voided = true;

    let mut paracetamol = name(701, PARACETAMOL, "Paracetamol", "en", true, CLASS_DRUG, DATATYPE_NA);
    paracetamol.codes = vec!["PCM".to_string()];

    vec![
        aspirin,
        name(102, ASPIRIN, "Acetylsalicylic acid", "en", false, CLASS_DRUG, DATATYPE_NA),
        name(103, ASPIRIN, "Aspirina", "es", true, CLASS_DRUG, DATATYPE_NA),
        retired,
        name(301, CHEST_PAIN, "Chest pain", "en", true, CLASS_DIAGNOSIS, DATATYPE_NA),
        name(302, CHEST_PAIN, "Pain in chest", "en_GB", false, CLASS_DIAGNOSIS, DATATYPE_NA),
        voided,
        name(401, HEADACHE, "Headache", "en", true, CLASS_DIAGNOSIS, DATATYPE_NA),
        name(402, HEADACHE, "Cephalgia", "en", false, CLASS_DIAGNOSIS, DATATYPE_NA),
        name(501, FEVER, "Fever", "en", true, CLASS_DIAGNOSIS, DATATYPE_NA),
        name(502, FEVER, "Pyrexia", "en_GB", false, CLASS_DIAGNOSIS, DATATYPE_NA),
        name(601, PRESENTING_SYMPTOM, "Presenting symptom", "en", true, CLASS_QUESTION, DATATYPE_CODED),
        paracetamol,
        name(702, PARACETAMOL, "Acetaminophen", "en_US", false, CLASS_DRUG, DATATYPE_NA),
        name(801, COMMON_COLD, "Cold", "en", true, CLASS_DIAGNOSIS, DATATYPE_NA),
        name(901, COPD, "COLD", "en", true, CLASS_DIAGNOSIS, DATATYPE_NA),
        name(902, COPD, "Chronic obstructive lung disease", "en", false, CLASS_DIAGNOSIS, DATATYPE_NA),
    ]
}

fn drug(drug_id: i64, text: &str, concept_id: Option<i64>, retired: bool, codes: &[&str]) -> DrugDocument {
    DrugDocument {
        drug_id,
        name: text.to_string(),
        concept_id,
        retired,
        codes: codes.iter().map(|c| c.to_string()).collect(),
    }
}

pub fn drugs() -> Vec<DrugDocument> {
    vec![
        drug(1, "Aspirin 81mg tablet", Some(ASPIRIN), false, &["ASP81"]),
        drug(2, "Aspirin 325mg", Some(ASPIRIN), true, &[]),
        drug(3, "Paracetamol 500mg", Some(PARACETAMOL), false, &[]),
        drug(4, "Amoxicillin + Clavulanate 625mg", Some(10), false, &[]),
        drug(5, "Ecotrin", Some(ASPIRIN), false, &[]),
    ]
}

pub fn fixture() -> Fixture {
    init_tracing();
    let config = SearchConfig::default();

    let names = TantivyBackend::open::<ConceptNameDocument>(&config).unwrap();
    names.index_documents(&concept_names()).unwrap();

    let drugs_backend = TantivyBackend::open::<DrugDocument>(&config).unwrap();
    drugs_backend.index_documents(&drugs()).unwrap();

    Fixture {
        names,
        drugs: drugs_backend,
    }
}

pub fn lookup() -> InMemoryTerminology {
    InMemoryTerminology::new()
        .with_stop_words(Locale::new("en"), ["IN", "OF", "THE"])
        .with_answers(PRESENTING_SYMPTOM, [CHEST_PAIN, HEADACHE, FEVER])
}

pub fn concept_policy(fixture: &Fixture) -> ConceptNameSearchPolicy<&TantivyBackend, InMemoryTerminology> {
    ConceptNameSearchPolicy::new(&fixture.names, lookup())
}

pub fn drug_policy(
    fixture: &Fixture,
) -> DrugSearchPolicy<&TantivyBackend, &TantivyBackend, InMemoryTerminology> {
    DrugSearchPolicy::new(&fixture.drugs, concept_policy(fixture))
}

pub fn english() -> SearchContext {
    SearchContext::default()
}
