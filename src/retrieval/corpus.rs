//! The builtin documentation corpus and endpoint-alias hinting.
//!
//! For each endpoint the corpus carries one curated how-to chunk
//! (purpose, example queries in both natural-language and filter form,
//! canonical field names) plus an overview chunk; a general chunk
//! documents the filter language itself. The scraper that refreshes
//! field-reference chunks from the openFDA documentation site is
//! external; these compiled-in chunks are the floor the agent always
//! has.

use crate::core::{ChunkKind, CorpusChunk};
use crate::fda::Endpoint;

/// Alias dictionary for endpoint hinting. Longer, more specific phrases
/// first so counting stays meaningful.
const ENDPOINT_ALIASES: &[(Endpoint, &[&str])] = &[
    (
        Endpoint::Clearance510k,
        &[
            "510(k)",
            "510k",
            "k-number",
            "k number",
            "substantial equivalence",
            "clearance",
            "cleared",
        ],
    ),
    (
        Endpoint::Pma,
        &["premarket approval", "p-number", "p number", "pma"],
    ),
    (
        Endpoint::Enforcement,
        &["recall", "recalled", "enforcement"],
    ),
    (
        Endpoint::Event,
        &[
            "adverse event",
            "maude",
            "malfunction",
            "injury",
            "death",
            "event report",
        ],
    ),
    (
        Endpoint::Classification,
        &[
            "classification",
            "device class",
            "product code",
            "regulation number",
        ],
    ),
    (
        Endpoint::Udi,
        &["gudid", "udi", "unique device", "device identifier"],
    ),
    (
        Endpoint::RegistrationListing,
        &[
            "registration",
            "registered",
            "establishment",
            "listing",
            "facility",
        ],
    ),
];

/// Matches a question against the endpoint alias dictionary.
///
/// Returns endpoints with at least one alias hit, ordered by hit count
/// descending. Zero, one, or many hints may fire.
#[must_use]
pub fn endpoint_hints(question: &str) -> Vec<Endpoint> {
    let lower = question.to_ascii_lowercase();
    let mut scored: Vec<(Endpoint, usize)> = ENDPOINT_ALIASES
        .iter()
        .map(|(endpoint, aliases)| {
            let hits = aliases
                .iter()
                .filter(|alias| lower.contains(*alias))
                .count();
            (*endpoint, hits)
        })
        .filter(|(_, hits)| *hits > 0)
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.into_iter().map(|(endpoint, _)| endpoint).collect()
}

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| (*n).to_string()).collect()
}

/// Builds the compiled-in corpus: one how-to and one overview chunk per
/// endpoint, plus the general query-syntax chunk.
#[must_use]
pub fn builtin_corpus() -> Vec<CorpusChunk> {
    let mut chunks = Vec::new();

    chunks.push(CorpusChunk::new(
        Some(Endpoint::Classification),
        ChunkKind::Howto,
        fields(&[
            "device_name",
            "device_class",
            "product_code",
            "regulation_number",
            "medical_specialty_description",
            "review_panel",
        ]),
        "Purpose: look up device types by risk class, product code or regulation.\n\
         Example: \"Show me 5 Class II devices\" -> search=device_class:2&limit=5\n\
         Example: \"What kind of device is product code FXX?\" -> search=product_code:FXX\n\
         Example: \"Devices under regulation 878.4040\" -> search=regulation_number:878.4040\n\
         Device classes are numeric 1, 2, 3. Product codes are three uppercase letters.",
    ));
    chunks.push(CorpusChunk::new(
        Some(Endpoint::Classification),
        ChunkKind::Overview,
        fields(&["device_name", "device_class", "product_code"]),
        "The classification dataset describes generic device types: their risk \
         class (1-3), three-letter product code, governing regulation and medical \
         specialty panel. One record per device type, not per marketed device.",
    ));

    chunks.push(CorpusChunk::new(
        Some(Endpoint::Clearance510k),
        ChunkKind::Howto,
        fields(&[
            "k_number",
            "applicant",
            "device_name",
            "product_code",
            "decision_date",
            "clearance_type",
        ]),
        "Purpose: find 510(k) premarket notifications (clearances).\n\
         Example: \"Show me K123456\" -> search=k_number:K123456\n\
         Example: \"510k clearances from Medtronic since 2023\" -> \
         search=applicant:Medtronic AND decision_date:[20230101 TO 30001231]\n\
         Example: \"Clearances for product code DXY\" -> search=product_code:DXY\n\
         K-numbers are the letter K followed by six digits.",
    ));
    chunks.push(CorpusChunk::new(
        Some(Endpoint::Clearance510k),
        ChunkKind::Overview,
        fields(&["k_number", "applicant", "decision_date"]),
        "The 510(k) dataset holds premarket notifications demonstrating \
         substantial equivalence. Dates use decision_date; the submitter is the \
         applicant.",
    ));

    chunks.push(CorpusChunk::new(
        Some(Endpoint::Pma),
        ChunkKind::Howto,
        fields(&[
            "pma_number",
            "applicant",
            "trade_name",
            "product_code",
            "decision_date",
        ]),
        "Purpose: find premarket approvals for Class III devices.\n\
         Example: \"Show me P970004\" -> search=pma_number:P970004\n\
         Example: \"PMA approvals from Abbott\" -> search=applicant:Abbott\n\
         Example: \"Approvals decided in 2024\" -> \
         search=decision_date:[20240101 TO 20241231]\n\
         PMA numbers are the letter P followed by six digits. The device name \
         field is trade_name.",
    ));

    chunks.push(CorpusChunk::new(
        Some(Endpoint::Enforcement),
        ChunkKind::Howto,
        fields(&[
            "recalling_firm",
            "product_description",
            "classification",
            "country",
            "recall_initiation_date",
            "status",
            "reason_for_recall",
        ]),
        "Purpose: find device recalls (enforcement reports).\n\
         Example: \"Any Class I recalls?\" -> search=classification:\"Class I\"\n\
         Example: \"Recalls from Medtronic since 2023\" -> \
         search=recalling_firm:Medtronic AND recall_initiation_date:[20230101 TO 30001231]\n\
         Example: \"Recalls of devices made in China\" -> search=country:China\n\
         Recall classes are the strings \"Class I\", \"Class II\", \"Class III\". \
         Country values are full English names. There is NO product_code field; \
         search by product_description instead.",
    ));
    chunks.push(CorpusChunk::new(
        Some(Endpoint::Enforcement),
        ChunkKind::Overview,
        fields(&["classification", "recalling_firm", "country"]),
        "The enforcement dataset lists recall actions with severity \
         classification, recalling firm, distribution and origin country. \
         Class I is the most serious tier.",
    ));

    chunks.push(CorpusChunk::new(
        Some(Endpoint::Event),
        ChunkKind::Howto,
        fields(&[
            "device.generic_name",
            "device.brand_name",
            "device.manufacturer_d_name",
            "device.manufacturer_d_country",
            "device.device_report_product_code",
            "event_type",
            "date_received",
        ]),
        "Purpose: find MAUDE adverse event reports.\n\
         Example: \"Adverse events for pacemakers\" -> search=device.generic_name:pacemaker\n\
         Example: \"Events from Chinese manufacturers\" -> \
         search=device.manufacturer_d_country:CN\n\
         Example: \"Malfunctions reported in 2024\" -> \
         search=event_type:Malfunction AND date_received:[20240101 TO 20241231]\n\
         Country values are ISO two-letter codes (China is CN). Event types are \
         Malfunction, Injury, Death, Other.",
    ));

    chunks.push(CorpusChunk::new(
        Some(Endpoint::Udi),
        ChunkKind::Howto,
        fields(&[
            "brand_name",
            "company_name",
            "identifiers.id",
            "device_description",
            "gmdn_terms.name",
        ]),
        "Purpose: look up GUDID device identification records.\n\
         Example: \"UDI records for brand CardioPace\" -> search=brand_name:CardioPace\n\
         Example: \"Devices listed by PulseWorks\" -> search=company_name:PulseWorks\n\
         Example: \"Look up identifier 00812345678905\" -> \
         search=identifiers.id:00812345678905",
    ));

    chunks.push(CorpusChunk::new(
        Some(Endpoint::RegistrationListing),
        ChunkKind::Howto,
        fields(&[
            "registration.name",
            "iso_country_code",
            "registration.state_code",
            "registration.fei_number",
            "products.product_code",
            "products.openfda.device_name",
        ]),
        "Purpose: find registered establishments and their device listings.\n\
         Example: \"Establishments in China\" -> search=iso_country_code:CN\n\
         Example: \"Facilities in California\" -> search=registration.state_code:CA\n\
         Example: \"Who lists product code FXX?\" -> search=products.product_code:FXX\n\
         Country values are ISO two-letter codes; states are two-letter codes.",
    ));

    chunks.push(CorpusChunk::new(
        None,
        ChunkKind::QuerySyntax,
        Vec::new(),
        "openFDA filter language: clauses are field:value, joined with AND; \
         alternatives group as (field:a OR field:b); ranges are \
         field:[20230101 TO 20231231]; multi-word literals are quoted. The \
         count parameter aggregates a field into term/count pairs instead of \
         returning records. limit caps at 1000; skip pages through results.",
    ));

    chunks
}
