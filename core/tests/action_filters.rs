use chrono::NaiveDate;
use custscore_core::{
    action::select_customers,
    config::ActionFilterConfig,
    customer::Customer,
    rfm::{RfmRecord, RfmSegment},
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn customer(id: &str, category: Option<&str>) -> Customer {
    let day = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
    Customer {
        customer_id: id.to_string(),
        order_channel: Some("Desktop".into()),
        last_order_channel: Some("Offline".into()),
        first_order_date: day,
        last_order_date: day,
        last_order_date_online: None,
        last_order_date_offline: Some(day),
        order_count_online: 0,
        order_count_offline: 2,
        monetary_online: 0.0,
        monetary_offline: 80.0,
        category_interest: category.map(str::to_string),
    }
}

fn record(id: &str, segment: RfmSegment) -> RfmRecord {
    RfmRecord {
        customer_id: id.to_string(),
        recency: 30,
        frequency: 2,
        monetary: 80.0,
        recency_score: 3,
        frequency_score: 3,
        monetary_score: 3,
        rf_code: "33".into(),
        segment,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// Filter (a) keeps champions and loyal customers whose category text
/// contains the women's tag, ignoring case.
#[test]
fn loyal_champions_with_womens_interest() {
    let customers = vec![
        customer("c1", Some("[KADIN, ERKEK]")),
        customer("c2", Some("[kadin]")),
        customer("c3", Some("[ERKEK]")),
        customer("c4", Some("[KADIN]")),
        customer("c5", Some("[AKTIFSPOR, Kadin]")),
    ];
    let records = vec![
        record("c1", RfmSegment::Champions),
        record("c2", RfmSegment::LoyalCustomers),
        record("c3", RfmSegment::Champions),
        record("c4", RfmSegment::Hibernating),
        record("c5", RfmSegment::LoyalCustomers),
    ];
    let ids = select_customers(&records, &customers, &ActionFilterConfig::loyal_champ_women());
    assert_eq!(ids, vec!["c1", "c2", "c5"]);
}

/// Missing category text never matches and never errors.
#[test]
fn missing_category_is_excluded() {
    let customers = vec![customer("c1", None), customer("c2", Some("[KADIN]"))];
    let records = vec![
        record("c1", RfmSegment::Champions),
        record("c2", RfmSegment::Champions),
    ];
    let ids = select_customers(&records, &customers, &ActionFilterConfig::loyal_champ_women());
    assert_eq!(ids, vec!["c2"]);
}

/// Filter (b) matches any of men's or children's tags, with or without the
/// Turkish dotted capital.
#[test]
fn lapsing_customers_with_mens_or_childrens_interest() {
    let customers = vec![
        customer("c1", Some("[ERKEK]")),
        customer("c2", Some("[ÇOCUK]")),
        customer("c3", Some("[AKTIFCOCUK]")),
        customer("c4", Some("[KADIN]")),
        customer("c5", Some("[ERKEK]")),
    ];
    let records = vec![
        record("c1", RfmSegment::CantLoose),
        record("c2", RfmSegment::AboutToSleep),
        record("c3", RfmSegment::AtRisk),
        record("c4", RfmSegment::AtRisk),
        record("c5", RfmSegment::Champions),
    ];
    let ids = select_customers(&records, &customers, &ActionFilterConfig::discount_men_children());
    assert_eq!(ids, vec!["c1", "c2", "c3"]);
}

/// Output ids are unique even when the category table repeats a customer.
#[test]
fn selection_is_deduplicated() {
    let customers = vec![
        customer("c1", Some("[KADIN]")),
        customer("c1", Some("[KADIN, ERKEK]")),
    ];
    let records = vec![record("c1", RfmSegment::Champions)];
    let ids = select_customers(&records, &customers, &ActionFilterConfig::loyal_champ_women());
    assert_eq!(ids, vec!["c1"]);
}

/// The filter mechanism takes any segment set and pattern list.
#[test]
fn custom_filter_without_patterns_accepts_any_category() {
    let filter = ActionFilterConfig {
        name: "new_any".into(),
        segments: vec![RfmSegment::NewCustomers],
        category_patterns: Vec::new(),
    };
    let customers = vec![customer("c1", Some("[]")), customer("c2", None)];
    let records = vec![
        record("c1", RfmSegment::NewCustomers),
        record("c2", RfmSegment::NewCustomers),
    ];
    assert_eq!(select_customers(&records, &customers, &filter), vec!["c1"]);
}
