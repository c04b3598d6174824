pub mod fields;
pub mod text;

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::category::CanonicalCategory;
use crate::profiles::{self, SourceProfile};
use crate::raw::RawRecord;
use fields::*;
use text::*;

pub const DEFAULT_AUCTION_TYPE: &str = "Leilão";

/// Canonical lot, ready for the store. Every field is either well formed or `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub source: String,
    /// Upsert key, passed through untouched.
    pub external_id: Option<String>,
    pub category: CanonicalCategory,
    pub subcategory: Option<String>,

    pub title: String,
    pub normalized_title: String,
    pub description: Option<String>,
    pub description_preview: String,

    pub value: Option<f64>,
    pub value_text: Option<String>,

    pub auction_round: Option<i64>,
    pub discount_percentage: Option<f64>,
    pub first_round_value: Option<f64>,
    pub first_round_date: Option<String>,

    pub city: Option<String>,
    pub state: Option<String>,
    pub address: Option<String>,

    pub auction_date: Option<String>,
    pub days_remaining: Option<i64>,
    pub auction_type: Option<String>,
    pub auction_name: Option<String>,
    pub store_name: Option<String>,
    pub lot_number: Option<String>,

    pub total_visits: i64,
    pub total_bids: i64,
    pub total_bidders: i64,

    pub link: Option<String>,

    pub vehicle_type: Option<String>,
    pub property_type: Option<String>,
    pub animal_type: Option<String>,
    pub appliance_type: Option<String>,
    pub tech_type: Option<String>,
    pub parts_type: Option<String>,
    pub specialized_type: Option<String>,
    pub construction_material_type: Option<String>,
    pub consumption_goods_type: Option<String>,

    pub metadata: Map<String, Value>,
}

/// Normalize with the profile named by the record's `source`, or the generic one.
pub fn normalize(raw: &RawRecord) -> NormalizedRecord {
    normalize_with(raw, profiles::registry().for_record(raw))
}

/// Alias resolution, classification, then field-by-field cleanup. Never fails.
pub fn normalize_with(raw: &RawRecord, profile: &SourceProfile) -> NormalizedRecord {
    let raw = profile.resolve(raw);
    let text_of = |key: &str| raw.text(key);

    let subcategory = plain_text(text_of("subcategory").as_deref());
    let category = profile.classifier.classify(subcategory.as_deref());

    let external_id = text_of("external_id");
    let title = external_id
        .as_deref()
        .filter(|_| profile.title_from_external_id)
        .and_then(|id| title_from_external_id(id, &profile.id_prefix()))
        .unwrap_or_else(|| clean_title(text_of("title").as_deref()));
    let description = clean_description(text_of("description").as_deref());
    let description_preview = create_preview(description.as_deref(), Some(&title));
    let link = plain_text(text_of("link").as_deref())
        .or_else(|| external_id.as_deref().and_then(|id| profile.link_for(id)));

    NormalizedRecord {
        source: plain_text(text_of("source").as_deref()).unwrap_or_else(|| profile.id.clone()),
        external_id,
        category,
        subcategory,

        normalized_title: normalize_for_search(&title),
        title,
        description,
        description_preview,

        value: parse_value(raw.get("value")),
        value_text: plain_text(text_of("value_text").as_deref()),

        auction_round: parse_opt_int(raw.get("auction_round")),
        discount_percentage: parse_value(raw.get("discount_percentage")),
        first_round_value: parse_value(raw.get("first_round_value")),
        first_round_date: parse_date(text_of("first_round_date").as_deref()),

        city: clean_city(text_of("city").as_deref()),
        state: classify_state(text_of("state").as_deref()).map(str::to_string),
        address: clean_address(text_of("address").as_deref()),

        auction_date: parse_date(text_of("auction_date").as_deref()),
        days_remaining: parse_days_remaining(raw.get("days_remaining")),
        auction_type: clean_text(text_of("auction_type").as_deref(), Some(DEFAULT_AUCTION_TYPE)),
        auction_name: clean_text(text_of("auction_name").as_deref(), None),
        store_name: clean_text(text_of("store_name").as_deref(), None),
        lot_number: clean_text(text_of("lot_number").as_deref(), None),

        total_visits: parse_int(raw.get("total_visits"), 0),
        total_bids: parse_int(raw.get("total_bids"), 0),
        total_bidders: parse_int(raw.get("total_bidders"), 0),

        link,

        vehicle_type: plain_text(text_of("vehicle_type").as_deref()),
        property_type: plain_text(text_of("property_type").as_deref()),
        animal_type: plain_text(text_of("animal_type").as_deref()),
        appliance_type: plain_text(text_of("appliance_type").as_deref()),
        tech_type: plain_text(text_of("tech_type").as_deref()),
        parts_type: plain_text(text_of("parts_type").as_deref()),
        specialized_type: plain_text(text_of("specialized_type").as_deref()),
        construction_material_type: plain_text(text_of("construction_material_type").as_deref()),
        consumption_goods_type: plain_text(text_of("consumption_goods_type").as_deref()),

        metadata: build_metadata(&raw),
    }
}

/// Normalize a batch in parallel; output order follows input order.
pub fn normalize_batch(raws: &[RawRecord], profile: &SourceProfile) -> Vec<NormalizedRecord> {
    raws.par_iter().map(|r| normalize_with(r, profile)).collect()
}

pub fn count_by_category(records: &[NormalizedRecord]) -> BTreeMap<CanonicalCategory, usize> {
    let mut counts = BTreeMap::new();
    for r in records {
        *counts.entry(r.category).or_insert(0) += 1;
    }
    counts
}

// ── Tests ──
