//! RFM scoring and rule-based segmentation.
//!
//! Recency is days from a customer's last order to the reference date,
//! frequency and monetary are lifetime totals. Each is cut into five
//! equal-population bins; the segment is a function of the recency and
//! frequency scores only.
//!
//! RULE: the segment taxonomy is closed. Every code with digits in 1..=5
//! matches exactly one rule, and any code that does not is an error.

use crate::{
    customer::Customer,
    error::{ScoreError, ScoreResult},
    stats::{qcut, rank_first},
    types::CustomerId,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, ops::RangeInclusive};

const QUINTILES: usize = 5;

// ── Segments ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RfmSegment {
    Hibernating,
    AtRisk,
    CantLoose,
    AboutToSleep,
    NeedAttention,
    LoyalCustomers,
    Promising,
    NewCustomers,
    PotentialLoyalist,
    Champions,
}

impl RfmSegment {
    pub const ALL: [RfmSegment; 10] = [
        Self::Hibernating,
        Self::AtRisk,
        Self::CantLoose,
        Self::AboutToSleep,
        Self::NeedAttention,
        Self::LoyalCustomers,
        Self::Promising,
        Self::NewCustomers,
        Self::PotentialLoyalist,
        Self::Champions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hibernating       => "hibernating",
            Self::AtRisk            => "at_risk",
            Self::CantLoose         => "cant_loose",
            Self::AboutToSleep      => "about_to_sleep",
            Self::NeedAttention     => "need_attention",
            Self::LoyalCustomers    => "loyal_customers",
            Self::Promising         => "promising",
            Self::NewCustomers      => "new_customers",
            Self::PotentialLoyalist => "potential_loyalist",
            Self::Champions         => "champions",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|seg| seg.as_str() == s)
    }
}

/// (recency digits, frequency digits, segment), evaluated in order.
const SEGMENT_RULES: [(RangeInclusive<u8>, RangeInclusive<u8>, RfmSegment); 10] = [
    (1..=2, 1..=2, RfmSegment::Hibernating),
    (1..=2, 3..=4, RfmSegment::AtRisk),
    (1..=2, 5..=5, RfmSegment::CantLoose),
    (3..=3, 1..=2, RfmSegment::AboutToSleep),
    (3..=3, 3..=3, RfmSegment::NeedAttention),
    (3..=4, 4..=5, RfmSegment::LoyalCustomers),
    (4..=4, 1..=1, RfmSegment::Promising),
    (5..=5, 1..=1, RfmSegment::NewCustomers),
    (4..=5, 2..=3, RfmSegment::PotentialLoyalist),
    (5..=5, 4..=5, RfmSegment::Champions),
];

/// Segment for a two-digit RF code, first matching rule wins.
pub fn classify(rf_code: &str) -> Option<RfmSegment> {
    let mut digits = rf_code.chars().map(|c| c.to_digit(10));
    let (Some(Some(recency)), Some(Some(frequency)), None) =
        (digits.next(), digits.next(), digits.next())
    else {
        return None;
    };
    let (recency, frequency) = (recency as u8, frequency as u8);
    SEGMENT_RULES
        .iter()
        .find(|(r, f, _)| r.contains(&recency) && f.contains(&frequency))
        .map(|(_, _, segment)| *segment)
}

// ── Records ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfmMetrics {
    pub customer_id: CustomerId,
    /// Days from last order to the reference date.
    pub recency:     i64,
    pub frequency:   u32,
    pub monetary:    f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RfmScores {
    pub recency_score:   u8,
    pub frequency_score: u8,
    pub monetary_score:  u8,
}

impl RfmScores {
    /// Recency digit then frequency digit. Monetary is not part of the code.
    pub fn rf_code(&self) -> String {
        format!("{}{}", self.recency_score, self.frequency_score)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfmRecord {
    pub customer_id:     CustomerId,
    pub recency:         i64,
    pub frequency:       u32,
    pub monetary:        f64,
    pub recency_score:   u8,
    pub frequency_score: u8,
    pub monetary_score:  u8,
    pub rf_code:         String,
    pub segment:         RfmSegment,
}

// ── Operations ──────────────────────────────────────────────────────

/// One row per customer id, ordered by id. Duplicate ids are merged:
/// latest last order, summed totals.
pub fn compute_rfm(customers: &[Customer], reference_date: NaiveDate) -> Vec<RfmMetrics> {
    let mut grouped: BTreeMap<&str, (NaiveDate, u32, f64)> = BTreeMap::new();
    for c in customers {
        let entry = grouped
            .entry(c.customer_id.as_str())
            .or_insert((c.last_order_date, 0, 0.0));
        entry.0 = entry.0.max(c.last_order_date);
        entry.1 += c.total_orders();
        entry.2 += c.total_value();
    }

    grouped
        .into_iter()
        .map(|(id, (last_order, frequency, monetary))| RfmMetrics {
            customer_id: id.to_string(),
            recency: (reference_date - last_order).num_days(),
            frequency,
            monetary,
        })
        .collect()
}

/// Quintile scores for every row, in input order.
pub fn score_rfm(rows: &[RfmMetrics]) -> Vec<RfmScores> {
    let recency: Vec<f64> = rows.iter().map(|r| r.recency as f64).collect();
    let frequency: Vec<f64> = rows.iter().map(|r| f64::from(r.frequency)).collect();
    let monetary: Vec<f64> = rows.iter().map(|r| r.monetary).collect();

    let recency_bins = qcut(&recency, QUINTILES);
    let frequency_bins = qcut(&rank_first(&frequency), QUINTILES);
    let monetary_bins = qcut(&monetary, QUINTILES);

    recency_bins
        .into_iter()
        .zip(frequency_bins)
        .zip(monetary_bins)
        .map(|((r, f), m)| RfmScores {
            recency_score:   (QUINTILES - r) as u8,
            frequency_score: (f + 1) as u8,
            monetary_score:  (m + 1) as u8,
        })
        .collect()
}

/// Attach RF codes and segments. Fails on the first code outside the
/// taxonomy.
pub fn assign_segments(rows: Vec<RfmMetrics>, scores: &[RfmScores]) -> ScoreResult<Vec<RfmRecord>> {
    rows.into_iter()
        .zip(scores)
        .map(|(row, scores)| {
            let rf_code = scores.rf_code();
            let segment = classify(&rf_code).ok_or_else(|| ScoreError::Segmentation {
                rf_code: rf_code.clone(),
                customer_id: row.customer_id.clone(),
            })?;
            Ok(RfmRecord {
                customer_id:     row.customer_id,
                recency:         row.recency,
                frequency:       row.frequency,
                monetary:        row.monetary,
                recency_score:   scores.recency_score,
                frequency_score: scores.frequency_score,
                monetary_score:  scores.monetary_score,
                rf_code,
                segment,
            })
        })
        .collect()
}

/// Compute, score and segment in one pass.
pub fn build_rfm(customers: &[Customer], reference_date: NaiveDate) -> ScoreResult<Vec<RfmRecord>> {
    let rows = compute_rfm(customers, reference_date);
    let scores = score_rfm(&rows);
    assign_segments(rows, &scores)
}

/// Customers per segment, every segment listed.
pub fn segment_counts(records: &[RfmRecord]) -> Vec<(RfmSegment, usize)> {
    RfmSegment::ALL
        .iter()
        .map(|seg| (*seg, records.iter().filter(|r| r.segment == *seg).count()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_matches_exactly_one_rule() {
        for r in 1..=5u8 {
            for f in 1..=5u8 {
                let matches = SEGMENT_RULES
                    .iter()
                    .filter(|(rr, fr, _)| rr.contains(&r) && fr.contains(&f))
                    .count();
                assert_eq!(matches, 1, "code {r}{f}");
                assert!(classify(&format!("{r}{f}")).is_some());
            }
        }
    }

    #[test]
    fn every_segment_is_reachable() {
        for seg in RfmSegment::ALL {
            let reachable = (1..=5).any(|r| {
                (1..=5).any(|f| classify(&format!("{r}{f}")) == Some(seg))
            });
            assert!(reachable, "{seg:?}");
        }
    }

    #[test]
    fn known_codes() {
        assert_eq!(classify("11"), Some(RfmSegment::Hibernating));
        assert_eq!(classify("25"), Some(RfmSegment::CantLoose));
        assert_eq!(classify("33"), Some(RfmSegment::NeedAttention));
        assert_eq!(classify("41"), Some(RfmSegment::Promising));
        assert_eq!(classify("44"), Some(RfmSegment::LoyalCustomers));
        assert_eq!(classify("51"), Some(RfmSegment::NewCustomers));
        assert_eq!(classify("53"), Some(RfmSegment::PotentialLoyalist));
        assert_eq!(classify("55"), Some(RfmSegment::Champions));
    }

    #[test]
    fn malformed_codes_do_not_classify() {
        for code in ["", "1", "06", "60", "5a", "555", "-1"] {
            assert_eq!(classify(code), None, "{code:?}");
        }
    }

    #[test]
    fn segment_names_round_trip() {
        for seg in RfmSegment::ALL {
            assert_eq!(RfmSegment::parse(seg.as_str()), Some(seg));
            let json = serde_json::to_string(&seg).unwrap();
            assert_eq!(json, format!("\"{}\"", seg.as_str()));
        }
    }

    #[test]
    fn tied_frequencies_split_by_first_seen_order() {
        let rows: Vec<RfmMetrics> = (0..10)
            .map(|i| RfmMetrics {
                customer_id: format!("c{i}"),
                recency:     i,
                frequency:   2,
                monetary:    100.0,
            })
            .collect();
        let scores = score_rfm(&rows);
        let freq: Vec<u8> = scores.iter().map(|s| s.frequency_score).collect();
        assert_eq!(freq, vec![1, 1, 2, 2, 3, 3, 4, 4, 5, 5]);
        let rec: Vec<u8> = scores.iter().map(|s| s.recency_score).collect();
        assert_eq!(rec, vec![5, 5, 4, 4, 3, 3, 2, 2, 1, 1]);
    }
}
