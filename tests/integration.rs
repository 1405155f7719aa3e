//! Integration tests for PersonaForge

use personaforge::{
    load_transactions, segment_transactions, FeatureExtractor, PipelineConfig, RawTransaction,
    SegmentationError, SegmentationModel,
};
use std::io::Write;
use tempfile::NamedTempFile;

/// Monthly profile of a synthetic customer group
struct Group {
    prefix: &'static str,
    income: f64,
    essential: f64,
    discretionary: f64,
    fixed: f64,
}

const GROUPS: [Group; 5] = [
    // savings rate 0.6
    Group { prefix: "SAVER", income: 5000.0, essential: 1200.0, discretionary: 500.0, fixed: 300.0 },
    // savings rate ~0.033
    Group { prefix: "TIGHT", income: 3000.0, essential: 1500.0, discretionary: 400.0, fixed: 1000.0 },
    Group { prefix: "EARNER", income: 8000.0, essential: 1500.0, discretionary: 4000.0, fixed: 1500.0 },
    Group { prefix: "PLANNER", income: 4000.0, essential: 1800.0, discretionary: 600.0, fixed: 800.0 },
    Group { prefix: "LIFESTYLE", income: 2500.0, essential: 800.0, discretionary: 1400.0, fixed: 200.0 },
];

fn row(customer: &str, date: String, description: &str, amount: f64, kind: &str, category: &str) -> RawTransaction {
    RawTransaction {
        customer_id: customer.to_string(),
        date,
        description: description.to_string(),
        amount: format!("{:.2}", amount),
        transaction_type: kind.to_string(),
        category: category.to_string(),
        account_name: "Checking".to_string(),
    }
}

/// 50 customers, 10 per group, 6 months of history each
fn synthetic_population() -> Vec<RawTransaction> {
    let mut rows = Vec::new();
    for group in &GROUPS {
        for i in 0..10 {
            let customer = format!("{}-{:02}", group.prefix, i);
            for month in 1..=6 {
                let date = |day: u32| format!("2024-{:02}-{:02}", month, day);
                rows.push(row(&customer, date(1), "PAYCHECK - ABC CORP", group.income, "credit", "Income"));
                rows.push(row(&customer, date(3), "RENT PAYMENT", -group.fixed, "debit", "Mortgage & Rent"));
                rows.push(row(&customer, date(8), "WHOLE FOODS", -group.essential, "debit", "Groceries"));
                rows.push(row(&customer, date(15), "LOCAL RESTAURANT", -group.discretionary, "debit", "Restaurants"));
            }
        }
    }
    rows
}

fn write_csv(rows: &[RawTransaction]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "date,description,amount,transaction_type,category,account_name,customer_id"
    )
    .unwrap();
    for r in rows {
        writeln!(
            file,
            "{},{},{},{},{},{},{}",
            r.date, r.description, r.amount, r.transaction_type, r.category, r.account_name, r.customer_id
        )
        .unwrap();
    }
    file
}

#[test]
fn test_end_to_end_pipeline() {
    let _ = env_logger::builder().is_test(true).try_init();

    let test_file = write_csv(&synthetic_population());
    let rows = load_transactions(test_file.path()).unwrap();
    assert_eq!(rows.len(), 50 * 6 * 4);

    let segmentation = segment_transactions(&rows, &PipelineConfig::default()).unwrap();

    // Five perfectly separated groups
    assert_eq!(segmentation.model.n_clusters, 5);
    assert_eq!(segmentation.assignments.len(), 50);
    assert!(segmentation.model.silhouette > 0.99);

    let saver = segmentation.assignment("SAVER-00").unwrap();
    let tight = segmentation.assignment("TIGHT-00").unwrap();
    assert_ne!(saver.cluster, tight.cluster);
    assert_eq!(saver.persona, "Super Saver");
    assert_eq!(tight.persona, "Budget Conscious");

    // Every member of a group shares its cluster
    for group in &GROUPS {
        let first = segmentation
            .assignment(&format!("{}-00", group.prefix))
            .unwrap()
            .cluster;
        for i in 1..10 {
            let other = segmentation
                .assignment(&format!("{}-{:02}", group.prefix, i))
                .unwrap();
            assert_eq!(other.cluster, first);
        }
    }

    let saver_rate = segmentation.centroids[saver.cluster]
        .mean(personaforge::Feature::SavingsRate)
        .unwrap();
    let tight_rate = segmentation.centroids[tight.cluster]
        .mean(personaforge::Feature::SavingsRate)
        .unwrap();
    assert!((saver_rate - 0.6).abs() < 1e-9);
    assert!((tight_rate - 100.0 / 3000.0).abs() < 1e-9);
    assert!(saver_rate - tight_rate > 0.5);

    let persona_of = |prefix: &str| {
        segmentation
            .assignment(&format!("{}-00", prefix))
            .unwrap()
            .persona
            .clone()
    };
    assert_eq!(persona_of("EARNER"), "High Earner Spender");
    assert_eq!(persona_of("PLANNER"), "Prudent Planner");
    assert_eq!(persona_of("LIFESTYLE"), "Lifestyle Enthusiast");
}

#[test]
fn test_repeated_runs_are_identical() {
    let rows = synthetic_population();
    let config = PipelineConfig::default();

    let first = segment_transactions(&rows, &config).unwrap();
    let second = segment_transactions(&rows, &config).unwrap();

    assert_eq!(first.assignments, second.assignments);
    assert_eq!(first.centroids, second.centroids);
}

#[test]
fn test_feature_extraction_is_deterministic() {
    let rows = synthetic_population();
    let extractor = FeatureExtractor::default();

    let first = extractor.extract_raw(&rows).unwrap();
    let second = extractor.extract_raw(&rows).unwrap();
    assert_eq!(first, second);

    let saver = first.iter().find(|v| v.customer_id == "SAVER-03").unwrap();
    assert_eq!(saver.months_observed, 6);
    assert_eq!(saver.savings_rate, Some(0.6));
    assert_eq!(saver.spend_volatility, Some(0.0));
}

#[test]
fn test_single_month_customer_has_null_volatility() {
    let rows = vec![
        row("ONE", "2024-05-01".to_string(), "PAYCHECK", 3000.0, "credit", "income"),
        row("ONE", "2024-05-09".to_string(), "GROCERY", -400.0, "debit", "essential"),
    ];
    let vectors = FeatureExtractor::default().extract_raw(&rows).unwrap();
    assert_eq!(vectors.len(), 1);
    assert_eq!(vectors[0].spend_volatility, None);
}

#[test]
fn test_error_handling_small_population() {
    let rows: Vec<RawTransaction> = synthetic_population()
        .into_iter()
        .filter(|r| r.customer_id == "SAVER-00" || r.customer_id == "TIGHT-00")
        .collect();

    let err = segment_transactions(&rows, &PipelineConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        SegmentationError::InsufficientData { customers: 2, required: 3 }
    ));
}

#[test]
fn test_error_handling_identical_population() {
    let rows: Vec<RawTransaction> = synthetic_population()
        .into_iter()
        .filter(|r| r.customer_id.starts_with("SAVER"))
        .collect();

    let err = segment_transactions(&rows, &PipelineConfig::default()).unwrap_err();
    assert!(matches!(err, SegmentationError::DegenerateInput));
}

#[test]
fn test_error_handling_malformed_row() {
    let mut rows = synthetic_population();
    rows[17].date = "31/31/2024".to_string();

    let err = segment_transactions(&rows, &PipelineConfig::default()).unwrap_err();
    match err {
        SegmentationError::InvalidData { record, field, .. } => {
            assert_eq!(field, "date");
            assert!(record.contains("row 17"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_saved_model_scores_like_the_run() {
    let rows = synthetic_population();
    let segmentation = segment_transactions(&rows, &PipelineConfig::default()).unwrap();

    let model_file = NamedTempFile::new().unwrap();
    segmentation.model.save(model_file.path()).unwrap();
    let model = SegmentationModel::load(model_file.path()).unwrap();
    assert_eq!(model, segmentation.model);

    let vectors = FeatureExtractor::default().extract_raw(&rows).unwrap();
    for vector in &vectors {
        let scored = model.score(vector).unwrap();
        let assigned = segmentation.assignment(&vector.customer_id).unwrap();
        assert_eq!(scored.cluster, assigned.cluster);
        assert_eq!(scored.persona, assigned.persona);
    }
}
