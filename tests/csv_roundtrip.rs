use plan_import::{export_filename, parse_csv, to_csv, ImportError};
use serde_json::{json, Map, Value};

fn objects(values: Value) -> Vec<Map<String, Value>> {
    match values {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

#[tokio::test]
async fn quoted_fields_keep_commas_quotes_and_newlines() -> anyhow::Result<()> {
    let text = "name,description\n\"Alpha\",\"a,b\"\"c\"\nBeta,\"line one\nline two\"\n";
    let parsed = parse_csv(text).await?;

    assert_eq!(parsed.headers, vec!["name", "description"]);
    assert_eq!(
        parsed.rows,
        vec![
            vec!["Alpha".to_string(), "a,b\"c".to_string()],
            vec!["Beta".to_string(), "line one\nline two".to_string()],
        ]
    );
    Ok(())
}

#[tokio::test]
async fn unquoted_whitespace_is_trimmed_and_short_rows_padded() -> anyhow::Result<()> {
    let parsed = parse_csv("Name , Due Date,status\n  Alpha ,2026-01-01 \nBeta\n").await?;

    assert_eq!(parsed.headers, vec!["Name", "Due Date", "status"]);
    assert_eq!(parsed.header_keys(), vec!["name", "due_date", "status"]);
    assert_eq!(parsed.rows[0], vec!["Alpha", "2026-01-01", ""]);
    assert_eq!(parsed.rows[1], vec!["Beta", "", ""]);
    assert_eq!(parsed.row_count(), 2);
    Ok(())
}

#[tokio::test]
async fn quoted_whitespace_is_kept() -> anyhow::Result<()> {
    let parsed = parse_csv("name,memo\n\"  quoted  \",  bare  \n").await?;
    assert_eq!(parsed.rows, vec![vec!["  quoted  ".to_string(), "bare".to_string()]]);
    Ok(())
}

#[tokio::test]
async fn rejects_files_without_data_rows() {
    for text in ["", "name,status\n"] {
        let err = parse_csv(text).await.unwrap_err();
        assert!(matches!(err, ImportError::MalformedCsv(_)), "{text:?}: {err}");
    }
}

#[tokio::test]
async fn extra_fields_are_malformed_unless_empty() -> anyhow::Result<()> {
    let err = parse_csv("a,b\n1,2,3\n").await.unwrap_err();
    assert!(matches!(err, ImportError::MalformedCsv(ref m) if m.contains("row 1")));

    let parsed = parse_csv("a,b\n1,2,\n").await?;
    assert_eq!(parsed.rows, vec![vec!["1".to_string(), "2".to_string()]]);
    Ok(())
}

#[tokio::test]
async fn export_quotes_only_when_needed() -> anyhow::Result<()> {
    let records = objects(json!([
        { "id": "r1", "name": "a,b\"c", "progress": 40, "note": null, "ok": true },
        { "id": "r2", "name": "plain", "progress": 0, "note": "n", "ok": false },
    ]));

    let csv = to_csv(&records).await?;
    assert_eq!(
        csv,
        "name,progress,note,ok\n\"a,b\"\"c\",40,,true\nplain,0,n,false\n"
    );
    Ok(())
}

#[tokio::test]
async fn export_then_parse_reproduces_values() -> anyhow::Result<()> {
    let records = objects(json!([
        { "id": 1, "name": "Expand EU market", "target": 1.5, "owner": "x,y", "memo": "say \"hi\"" },
        { "id": 2, "name": "", "target": null, "owner": "z", "memo": "" },
        { "id": 3, "name": "Grow ARR", "target": -20, "memo": "no owner" },
    ]));

    let parsed = parse_csv(&to_csv(&records).await?).await?;
    assert_eq!(parsed.headers, vec!["name", "target", "owner", "memo"]);

    for (record, row) in records.iter().zip(&parsed.rows) {
        for (header, cell) in parsed.headers.iter().zip(row) {
            let expected = match record.get(header) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            };
            assert_eq!(cell, &expected, "column {header}");
        }
    }
    Ok(())
}

#[tokio::test]
async fn padded_values_survive_a_round_trip() -> anyhow::Result<()> {
    let records = objects(json!([
        { "name": "  padded  ", "memo": " x" },
        { "name": "tab\t", "memo": "plain" },
    ]));

    let csv = to_csv(&records).await?;
    assert_eq!(csv, "name,memo\n\"  padded  \",\" x\"\n\"tab\t\",plain\n");

    let parsed = parse_csv(&csv).await?;
    assert_eq!(parsed.rows[0], vec!["  padded  ", " x"]);
    assert_eq!(parsed.rows[1], vec!["tab\t", "plain"]);
    Ok(())
}

#[tokio::test]
async fn single_column_exports_keep_empty_rows() -> anyhow::Result<()> {
    let records = objects(json!([{ "name": "a" }, { "name": "" }, { "name": "b" }]));

    let csv = to_csv(&records).await?;
    assert_eq!(csv, "name\na\n\"\"\nb\n");
    assert_eq!(parse_csv(&csv).await?.row_count(), 3);
    Ok(())
}

#[tokio::test]
async fn empty_export_is_empty_text() -> anyhow::Result<()> {
    assert_eq!(to_csv(&[]).await?, "");
    Ok(())
}

#[test]
fn export_file_names_carry_kind_and_date() {
    let date = chrono::NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
    assert_eq!(
        export_filename("strategic_goals", date),
        "strategic_goals_2026-10-16.csv"
    );
}
