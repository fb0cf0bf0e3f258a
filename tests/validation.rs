use plan_import::{
    parse_csv, validate, validate_text, ImportError, KindRegistry, Schema, ValidationResult, KPIS,
    STRATEGIC_GOALS,
};
use std::time::Duration;

fn goals_schema() -> Schema {
    KindRegistry::builtin()
        .get(STRATEGIC_GOALS)
        .map(|spec| spec.schema.clone())
        .unwrap()
}

async fn check(text: &str) -> ValidationResult {
    validate_text(text, &goals_schema()).await
}

#[tokio::test]
async fn reports_each_blocking_row_error() {
    let result = check(
        "name,status,progress\n\
         Expand EU market,active,40\n\
         ,completed,100\n\
         Grow ARR,bogus,55\n",
    )
    .await;

    assert!(!result.is_valid);
    assert_eq!(result.row_count, 3);
    assert_eq!(
        result.errors,
        vec![
            "Row 2: Name is required".to_string(),
            "Row 3: Invalid status 'bogus'. Must be one of: planned, active, completed, paused"
                .to_string(),
        ]
    );
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn missing_required_column_is_reported_once() -> anyhow::Result<()> {
    let mut text = String::from("description,status\n");
    for i in 0..25 {
        text.push_str(&format!("Goal {i},active\n"));
    }
    let parsed = parse_csv(&text).await?;
    let result = validate(&parsed.headers, &parsed.rows, &goals_schema());

    assert!(!result.is_valid);
    assert_eq!(result.errors, vec!["Missing required column: name".to_string()]);
    assert_eq!(result.row_count, 25);
    Ok(())
}

#[tokio::test]
async fn status_must_be_in_the_allowed_set() {
    let archived = check("name,status\nA,archived\n").await;
    assert!(!archived.is_valid);
    assert!(archived.errors[0].starts_with("Row 1: Invalid status 'archived'"));

    let paused = check("name,status\nA,paused\n").await;
    assert!(paused.is_valid, "{:?}", paused.errors);

    let mixed_case = check("Name,Status\nA,Active\n").await;
    assert!(mixed_case.is_valid, "{:?}", mixed_case.errors);
}

#[tokio::test]
async fn progress_is_an_integer_from_0_to_100() {
    for bad in ["-1", "101", "abc", "12.5"] {
        let result = check(&format!("name,progress\nA,{bad}\n")).await;
        assert!(!result.is_valid, "progress {bad} should fail");
        assert_eq!(
            result.errors,
            vec![format!(
                "Row 1: Progress must be an integer between 0 and 100, got '{bad}'"
            )]
        );
    }
    for good in ["0", "100", "55", ""] {
        let result = check(&format!("name,progress\nA,{good}\n")).await;
        assert!(result.is_valid, "progress {good:?}: {:?}", result.errors);
    }
}

#[tokio::test]
async fn unparsable_optional_numbers_and_dates_only_warn() {
    let result = check("name,target_value,due_date\nA,abc,not-a-date\nB,12.5,2026-03-31\n").await;

    assert!(result.is_valid);
    assert_eq!(
        result.warnings,
        vec![
            "Row 1: Target value 'abc' is not a valid number and will be ignored".to_string(),
            "Row 1: Due date 'not-a-date' is not a valid date and will be ignored".to_string(),
        ]
    );
}

#[tokio::test]
async fn unknown_columns_warn() {
    let result = check("name,owner\nA,someone\n").await;
    assert!(result.is_valid);
    assert_eq!(
        result.warnings,
        vec!["Unrecognized column 'owner' will be ignored".to_string()]
    );
}

#[tokio::test]
async fn oversized_cells_block_the_row() {
    let schema = goals_schema().with_field_limit(64);
    let long = "x".repeat(100);
    let result = validate_text(&format!("name,description\nA,{long}\nB,short\n"), &schema).await;

    assert!(!result.is_valid);
    assert_eq!(
        result.errors,
        vec!["Row 1: Description exceeds maximum size (102 > 64 bytes)".to_string()]
    );
}

#[tokio::test]
async fn markup_is_cleaned_before_required_checks() {
    let result = check("name\n<>\n").await;
    assert_eq!(result.errors, vec!["Row 1: Name is required".to_string()]);
}

#[tokio::test]
async fn empty_or_header_only_files_are_blocking_errors() {
    for text in ["", "name,status\n"] {
        let result = check(text).await;
        assert!(!result.is_valid);
        assert_eq!(result.row_count, 0);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Malformed CSV"), "{}", result.errors[0]);
    }
}

#[tokio::test]
async fn validation_is_repeatable() {
    let text = "name,status\nA,bogus\n";
    let first = check(text).await;
    let second = check(text).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn kpi_frequency_is_checked() {
    let schema = KindRegistry::builtin()
        .get(KPIS)
        .map(|spec| spec.schema.clone())
        .unwrap();
    let result = validate_text(
        "name,frequency,unit\nNPS,quarterly,points\nChurn,hourly,%\n",
        &schema,
    )
    .await;

    assert_eq!(
        result.errors,
        vec![
            "Row 2: Invalid frequency 'hourly'. Must be one of: daily, weekly, monthly, quarterly, yearly"
                .to_string()
        ]
    );
}

#[tokio::test]
async fn failed_checks_convert_to_schema_errors() {
    let ok = check("name\nA\n").await;
    assert_eq!(ok.clone().into_result().ok(), Some(ok));

    let bad = check("name,status\n,active\nB,bogus\n").await;
    let err = bad.clone().into_result().unwrap_err();
    assert_eq!(err.to_string(), "Schema validation failed with 2 error(s)");
    assert!(!err.is_system());
    match err {
        ImportError::SchemaValidationFailed(errors) => assert_eq!(errors, bad.errors),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn row_level_errors_are_not_system_errors() {
    let row_level = [
        ImportError::MalformedCsv("x".into()),
        ImportError::SchemaValidationFailed(vec!["x".into()]),
        ImportError::RowPersistenceFailed {
            row: 3,
            message: "x".into(),
        },
        ImportError::PayloadTooLarge { size: 5, limit: 4 },
    ];
    assert!(row_level.iter().all(|e| !e.is_system()));

    let system = [
        ImportError::Cancelled,
        ImportError::UnknownKind("budgets".into()),
        ImportError::RateLimited {
            retry_after: Duration::from_secs(1),
        },
        ImportError::System("x".into()),
    ];
    assert!(system.iter().all(ImportError::is_system));
}
