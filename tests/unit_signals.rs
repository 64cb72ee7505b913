// Signal fusion and market-state classification tests.
//
// Partitions and fingerprints are built by hand so the fused scores can be
// worked out on paper.

use chrono::{TimeZone, Utc};
use topicscout::clustering::{ClusterParams, Partition};
use topicscout::db::models::MarketState;
use topicscout::scoring::market::{assess, classify, ClassifierThresholds, Direction};
use topicscout::signals::{aggregate_engagement, fuse, AioSnapshot, FusionConfig, Month, SearchIndex, SearchRow};
use topicscout::store::Document;
use topicscout::topics::{ClusterProfile, Fingerprint, ScoredKeyword};

fn doc(id: &str, month: u32, engagement: f64) -> Document {
    Document {
        doc_id: id.to_string(),
        embedding: vec![0.0, 1.0],
        engagement_weight: engagement,
        timestamp: Utc.with_ymd_and_hms(2025, month, 10, 9, 0, 0).unwrap(),
        text: String::new(),
    }
}

fn profile(cluster_id: &str, rep: &str, terms: &[&str]) -> ClusterProfile {
    ClusterProfile {
        cluster_id: cluster_id.to_string(),
        representative_doc_id: rep.to_string(),
        fingerprint: Fingerprint {
            cluster_id: cluster_id.to_string(),
            keywords: terms
                .iter()
                .enumerate()
                .map(|(i, t)| ScoredKeyword {
                    term: t.to_string(),
                    score: 1.0 - i as f64 * 0.1,
                })
                .collect(),
        },
    }
}

fn search_row(query: &str, month: u32, impressions: f64) -> SearchRow {
    SearchRow {
        query: query.to_string(),
        month: Month::new(2025, month).unwrap(),
        impressions,
        clicks: impressions / 10.0,
        ctr: 0.1,
        position: 4.0,
    }
}

/// Cluster x: rising engagement, no matching queries.
/// Cluster y: flat engagement, a matched query whose impressions fall and
/// which shows an AI overview.
fn fixture() -> (Partition, Vec<Document>, Vec<ClusterProfile>, SearchIndex) {
    let docs = vec![
        doc("x1", 3, 1.0),
        doc("x2", 4, 5.0),
        doc("x3", 5, 10.0),
        doc("y1", 3, 1.0),
        doc("y2", 4, 1.0),
        doc("y3", 5, 1.0),
    ];
    let labels = vec![Some(0), Some(0), Some(0), Some(1), Some(1), Some(1)];
    let partition = Partition::from_labels(&docs, &labels, &ClusterParams::default());

    let profiles = vec![
        profile("cl-x1", "x3", &["asparagus", "risotto"]),
        profile("cl-y1", "y1", &["fridge", "bins"]),
    ];

    let rows = vec![
        search_row("fridge bins", 3, 100.0),
        search_row("fridge bins", 4, 50.0),
        search_row("fridge bins", 5, 0.0),
        search_row("pantry shelves", 4, 900.0),
    ];
    let snapshots = vec![AioSnapshot {
        query: "fridge bins".to_string(),
        aio_present: true,
    }];
    let search = SearchIndex::new(&rows, &snapshots);

    (partition, docs, profiles, search)
}

#[test]
fn unmatched_rising_cluster_without_overview_is_emerging() {
    let (partition, docs, profiles, search) = fixture();
    let engagement = aggregate_engagement(&partition, &docs);
    let signals = fuse(&profiles, &engagement, &search, &FusionConfig::default());
    let assessments = assess(&signals, &ClassifierThresholds::default());

    let x_signal = signals.iter().find(|s| s.cluster_id == "cl-x1").unwrap();
    assert!(x_signal.search_unmatched);
    assert!(x_signal.matched_queries.is_empty());
    assert!(!x_signal.aio_present);
    assert!(x_signal.rows.iter().all(|r| r.search_norm == 0.0));

    let x = assessments.iter().find(|a| a.cluster_id == "cl-x1").unwrap();
    assert_eq!(x.state, MarketState::Emerging);
    assert!(x.search_unmatched);
    assert_eq!(x.direction, Direction::Rising);
    assert_eq!(x.percentile, 100.0);
}

#[test]
fn matched_falling_cluster_with_overview_is_saturated() {
    let (partition, docs, profiles, search) = fixture();
    let engagement = aggregate_engagement(&partition, &docs);
    let signals = fuse(&profiles, &engagement, &search, &FusionConfig::default());
    let assessments = assess(&signals, &ClassifierThresholds::default());

    let y_signal = signals.iter().find(|s| s.cluster_id == "cl-y1").unwrap();
    assert_eq!(y_signal.matched_queries, vec!["fridge bins".to_string()]);
    assert_eq!(y_signal.dominant_query.as_deref(), Some("fridge bins"));
    assert!(y_signal.aio_present);

    let y = assessments.iter().find(|a| a.cluster_id == "cl-y1").unwrap();
    assert_eq!(y.direction, Direction::Falling);
    assert_eq!(y.state, MarketState::Saturated);
}

#[test]
fn fused_rows_cover_the_shared_month_axis() {
    let (partition, docs, profiles, search) = fixture();
    let engagement = aggregate_engagement(&partition, &docs);
    let signals = fuse(&profiles, &engagement, &search, &FusionConfig::default());

    for s in &signals {
        let months: Vec<String> = s.rows.iter().map(|r| r.month.to_string()).collect();
        assert_eq!(months, vec!["2025-03", "2025-04", "2025-05"]);
        for r in &s.rows {
            assert!((0.0..=1.0).contains(&r.engagement_norm));
            assert!((0.0..=1.0).contains(&r.search_norm));
            let expected = 0.6 * r.engagement_norm + 0.4 * r.search_norm;
            assert!((r.fused_score - expected).abs() < 1e-12);
        }
    }

    // x starts at the global engagement minimum, so its first fused score is
    // 0 and the following month-over-month change is undefined.
    let x = signals.iter().find(|s| s.cluster_id == "cl-x1").unwrap();
    assert_eq!(x.rows[0].fused_score, 0.0);
    assert!(x.rows[0].mom_change.is_none());
    assert!(x.rows[1].mom_change.is_none());
    assert!(x.rows[2].mom_change.unwrap() > 0.0);
}

#[test]
fn raising_percentile_while_rising_never_leads_to_saturated() {
    let t = ClassifierThresholds::default();

    assert_ne!(classify(false, 40.0, Direction::Rising, &t), MarketState::Emerging);
    assert_eq!(classify(false, 60.0, Direction::Rising, &t), MarketState::Emerging);

    let mut seen_emerging = false;
    for pct in 0..=100 {
        let state = classify(false, pct as f64, Direction::Rising, &t);
        assert_ne!(state, MarketState::Saturated);
        assert_ne!(state, MarketState::Competitive);
        if seen_emerging {
            assert_eq!(state, MarketState::Emerging, "dropped out of Emerging at {pct}");
        }
        seen_emerging |= state == MarketState::Emerging;
    }
    assert!(seen_emerging);
}

#[test]
fn overview_present_states_follow_the_table() {
    let t = ClassifierThresholds::default();
    assert_eq!(classify(true, 90.0, Direction::Rising, &t), MarketState::Competitive);
    assert_eq!(classify(true, 10.0, Direction::Flat, &t), MarketState::Saturated);
    assert_eq!(classify(true, 10.0, Direction::Rising, &t), MarketState::Niche);
    assert_eq!(classify(false, 10.0, Direction::Falling, &t), MarketState::Niche);
    assert_eq!(classify(false, 70.0, Direction::Flat, &t), MarketState::Niche);
}
