use async_compression::tokio::write::GzipEncoder;
use plan_import::{
    read_source, reader_from_path, ImportError, ImportRequest, Importer, InMemoryStore,
    SourceMeta, STRATEGIC_GOALS,
};
use std::io::Cursor;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn imports_a_gzipped_upload() -> anyhow::Result<()> {
    let mut csv = String::from("name,status,progress\n");
    for i in 0..2_000 {
        csv.push_str(&format!("Goal {i:05},active,{}\n", i % 101));
    }

    let mut encoder = GzipEncoder::new(Vec::new());
    encoder.write_all(csv.as_bytes()).await?;
    encoder.shutdown().await?;

    let dir = tempfile::tempdir()?;
    let gz_path = dir.path().join("goals.csv.gz");
    std::fs::write(&gz_path, encoder.into_inner())?;

    let (file, meta) = reader_from_path(&gz_path).await?;
    assert_eq!(meta.content_encoding, "gzip");
    let (text, info) = read_source(file, &meta, 1 << 20).await?;
    assert_eq!(text, csv);
    assert_eq!(info.file_name, "goals.csv.gz");
    assert_eq!(info.byte_size, csv.len());
    assert_eq!(info.checksum, crc32fast::hash(csv.as_bytes()));

    let store = Arc::new(InMemoryStore::new());
    let importer = Importer::new(store.clone());
    let request = ImportRequest::new(text, "owner-1", info.file_name.clone(), STRATEGIC_GOALS)
        .with_source(info.clone());
    let outcome = importer.import(request).await;

    let summary = outcome.summary().expect("completed import");
    assert_eq!(summary.processed, 2_000);
    assert_eq!(store.count("strategic_goals"), 2_000);

    let job = importer.job(&summary.job_id).await?.expect("job stored");
    assert_eq!(job.checksum, Some(info.checksum));
    assert_eq!(job.file_size, info.byte_size);
    Ok(())
}

#[tokio::test]
async fn transcodes_declared_charset() -> anyhow::Result<()> {
    let raw = b"name,description\nCaf\xe9,na\xefve\n".to_vec();
    let meta = SourceMeta {
        content_type: "text/csv; charset=windows-1252".into(),
        file_name: "legacy.csv".into(),
        ..Default::default()
    };

    let (text, _) = read_source(Cursor::new(raw), &meta, 1024).await?;
    assert_eq!(text, "name,description\nCafé,naïve\n");
    Ok(())
}

#[tokio::test]
async fn drops_a_utf8_bom() -> anyhow::Result<()> {
    let raw = "\u{FEFF}name\nA\n".as_bytes().to_vec();
    let (text, info) = read_source(Cursor::new(raw), &SourceMeta::default(), 1024).await?;
    assert_eq!(text, "name\nA\n");
    assert_eq!(info.byte_size, 7);
    Ok(())
}

#[tokio::test]
async fn rejects_oversized_and_undecodable_uploads() {
    let big = vec![b'a'; 64];
    let err = read_source(Cursor::new(big), &SourceMeta::default(), 16)
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::PayloadTooLarge { limit: 16, .. }));

    let invalid = vec![b'n', 0xFF, b'\n'];
    let err = read_source(Cursor::new(invalid), &SourceMeta::default(), 16)
        .await
        .unwrap_err();
    assert!(matches!(err, ImportError::MalformedCsv(_)));
}
