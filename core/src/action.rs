//! Action filters: RFM segment set ∩ category-interest pattern.

use crate::{
    config::ActionFilterConfig,
    customer::Customer,
    rfm::RfmRecord,
    types::CustomerId,
};
use std::collections::{BTreeSet, HashMap};

/// Ids of customers in one of the filter's segments whose category text
/// contains any of its patterns, case-insensitively. Missing category
/// text never matches. An empty pattern list accepts any category text.
///
/// The result is deduplicated and ordered by customer id.
pub fn select_customers(
    records: &[RfmRecord],
    customers: &[Customer],
    filter: &ActionFilterConfig,
) -> Vec<CustomerId> {
    let patterns: Vec<String> = filter.category_patterns.iter().map(|p| p.to_lowercase()).collect();

    let mut categories: HashMap<&str, Vec<&str>> = HashMap::new();
    for c in customers {
        if let Some(text) = c.category_interest.as_deref() {
            categories.entry(c.customer_id.as_str()).or_default().push(text);
        }
    }

    let selected: BTreeSet<&str> = records
        .iter()
        .filter(|r| filter.segments.contains(&r.segment))
        .filter(|r| {
            categories.get(r.customer_id.as_str()).is_some_and(|texts| {
                texts.iter().any(|text| category_matches(text, &patterns))
            })
        })
        .map(|r| r.customer_id.as_str())
        .collect();

    log::debug!("action '{}': {} customer(s) selected", filter.name, selected.len());
    selected.into_iter().map(str::to_string).collect()
}

fn category_matches(text: &str, lowercase_patterns: &[String]) -> bool {
    if lowercase_patterns.is_empty() {
        return true;
    }
    let text = text.to_lowercase();
    lowercase_patterns.iter().any(|p| text.contains(p.as_str()))
}
