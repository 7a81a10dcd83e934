use anyhow::Result;
use imtag::config::ConfDir;
use imtag::db::{self, crud};
use imtag::hamming::encode_fingerprint;
use imtag::query::CancelToken;
use imtag::{EvaluationWarning, LibraryBuilder};
use tempfile::TempDir;

async fn open(dir: &TempDir) -> Result<db::Database> {
    Ok(db::init_db(dir.path().join("imtag.db")).await?)
}

#[tokio::test]
async fn load_snapshot() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pool = open(&dir).await?;

    let animal = crud::add_tag_type(&pool, "animal", '#', 0xff8800).await?;
    crud::add_tag(&pool, "cat", Some(animal), None).await?;
    crud::add_tag(&pool, "dog", Some(animal), None).await?;
    crud::add_tag(&pool, "pets", None, Some("cat + dog")).await?;

    let fp = encode_fingerprint(0xdead_beef);
    let a = crud::add_image(&pool, "a.jpg", Some(fp.as_slice())).await?;
    let b = crud::add_image(&pool, "b.jpg", None).await?;
    crud::set_image_tags(&pool, a, &["cat".to_string()]).await?;
    crud::set_image_tags(&pool, b, &["dog".to_string(), "dog".to_string()]).await?;

    let snapshot = db::load_snapshot(&pool).await?;
    assert_eq!(snapshot.catalog.len(), 3);
    assert_eq!(snapshot.catalog.tag_type(animal).map(|t| t.symbol), Some('#'));
    assert!(snapshot.catalog.tag("pets").unwrap().is_compound());
    assert_eq!(snapshot.index.metadata_of(a).unwrap().fingerprint, Some(0xdead_beef));
    assert_eq!(snapshot.index.metadata_of(b).unwrap().fingerprint, None);
    assert_eq!(snapshot.index.posting_len("dog"), 1);
    Ok(())
}

#[tokio::test]
async fn cascade_delete() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pool = open(&dir).await?;

    crud::add_tag(&pool, "cat", None, None).await?;
    let a = crud::add_image(&pool, "a.jpg", None).await?;
    crud::set_image_tags(&pool, a, &["cat".to_string()]).await?;
    assert_eq!(crud::list_image_tags(&pool).await?.len(), 1);

    assert!(crud::delete_tag(&pool, "cat").await?);
    assert!(crud::list_image_tags(&pool).await?.is_empty());
    assert!(!crud::delete_tag(&pool, "cat").await?);

    crud::add_tag(&pool, "cat", None, None).await?;
    crud::set_image_tags(&pool, a, &["cat".to_string(), "missing".to_string()]).await?;
    assert_eq!(crud::list_image_tags(&pool).await?.len(), 1);
    assert!(crud::delete_image(&pool, a).await?);
    assert!(crud::list_image_tags(&pool).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn update_image() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pool = open(&dir).await?;

    let a = crud::add_image(&pool, "a.jpg", None).await?;
    assert!(crud::add_image(&pool, "a.jpg", None).await.is_err());
    assert!(crud::update_image_path(&pool, a, "b.jpg").await?);
    assert_eq!(crud::get_image_id(&pool, "b.jpg").await?, Some(a));
    assert_eq!(crud::get_image_id(&pool, "a.jpg").await?, None);
    Ok(())
}

#[tokio::test]
async fn skip_invalid_rows() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pool = open(&dir).await?;

    crud::add_tag(&pool, "cat", None, None).await?;
    crud::add_tag(&pool, "bad label", None, None).await?;
    crud::add_image(&pool, "a.jpg", Some(&[1, 2, 3][..])).await?;

    let snapshot = db::load_snapshot(&pool).await?;
    assert_eq!(snapshot.catalog.len(), 1);
    assert_eq!(snapshot.index.len(), 1);
    assert_eq!(snapshot.index.metadata_of(1).unwrap().fingerprint, None);
    Ok(())
}

#[tokio::test]
async fn skip_invalid_tag_type() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let pool = open(&dir).await?;

    // 符号不合法的类型只能绕过 crud 直接写入
    let bad: i64 = sqlx::query_scalar(
        "INSERT INTO tag_type (label, symbol, color) VALUES ('bad', 'a', 0) RETURNING id",
    )
    .fetch_one(&pool)
    .await?;
    let cat = crud::add_tag(&pool, "cat", Some(bad), None).await?;
    let a = crud::add_image(&pool, "a.jpg", None).await?;
    crud::set_image_tags(&pool, a, &["cat".to_string()]).await?;

    let snapshot = db::load_snapshot(&pool).await?;
    assert!(snapshot.catalog.tag_type(bad).is_none());
    let tag = snapshot.catalog.tag("cat").unwrap();
    assert_eq!(tag.id, cat);
    assert_eq!(tag.type_id, None);
    assert_eq!(snapshot.index.posting_len("cat"), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn reload_library() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let conf_dir: ConfDir = dir.path().to_str().unwrap().parse()?;
    let library = LibraryBuilder::new(conf_dir).threshold(4).open().await?;
    let pool = library.db().cloned().unwrap();

    crud::add_tag(&pool, "cat", None, None).await?;
    crud::add_tag(&pool, "cats", None, Some("cat")).await?;
    let a = crud::add_image(&pool, "a.jpg", None).await?;
    crud::set_image_tags(&pool, a, &["cat".to_string()]).await?;

    let output = library.compile_and_run("cats", &CancelToken::new())?;
    assert!(output.images.is_empty());
    assert_eq!(output.warnings, vec![EvaluationWarning::UnknownTag { label: "cats".into() }]);

    library.reload().await?;
    let output = library.compile_and_run("cats", &CancelToken::new())?;
    assert_eq!(output.images.len(), 1);
    assert!(output.warnings.is_empty());
    assert_eq!(library.similarity().threshold, 4);
    Ok(())
}
