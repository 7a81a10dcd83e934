use sqlx::{Executor, Result, Sqlite, SqlitePool};

use super::{ImageRecord, ImageTagRecord, TagRecord, TagTypeRecord};

/// 添加图片记录
pub async fn add_image<'c, E>(executor: E, path: &str, fingerprint: Option<&[u8]>) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar(
        r#"
        INSERT INTO image (path, fingerprint)
        VALUES (?, ?)
        RETURNING id
        "#,
    )
    .bind(path)
    .bind(fingerprint)
    .fetch_one(executor)
    .await
}

/// 根据路径查找图片 ID
pub async fn get_image_id<'c, E>(executor: E, path: &str) -> Result<Option<i64>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar("SELECT id FROM image WHERE path = ?")
        .bind(path)
        .fetch_optional(executor)
        .await
}

/// 修改图片路径
pub async fn update_image_path<'c, E>(executor: E, id: i64, path: &str) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE image SET path = ? WHERE id = ?")
        .bind(path)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// 删除图片，关联的标签记录会被级联删除
pub async fn delete_image<'c, E>(executor: E, id: i64) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM image WHERE id = ?").bind(id).execute(executor).await?;
    Ok(result.rows_affected() > 0)
}

/// 添加标签类型
pub async fn add_tag_type<'c, E>(executor: E, label: &str, symbol: char, color: u32) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar(
        r#"
        INSERT INTO tag_type (label, symbol, color)
        VALUES (?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(label)
    .bind(symbol.to_string())
    .bind(color as i64)
    .fetch_one(executor)
    .await
}

/// 添加标签
pub async fn add_tag<'c, E>(
    executor: E,
    label: &str,
    type_id: Option<i64>,
    definition: Option<&str>,
) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar(
        r#"
        INSERT INTO tag (label, type_id, definition)
        VALUES (?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(label)
    .bind(type_id)
    .bind(definition)
    .fetch_one(executor)
    .await
}

/// 修改标签的类型和定义
pub async fn update_tag<'c, E>(
    executor: E,
    label: &str,
    type_id: Option<i64>,
    definition: Option<&str>,
) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("UPDATE tag SET type_id = ?, definition = ? WHERE label = ?")
        .bind(type_id)
        .bind(definition)
        .bind(label)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// 删除标签，关联记录会被级联删除
pub async fn delete_tag<'c, E>(executor: E, label: &str) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result =
        sqlx::query("DELETE FROM tag WHERE label = ?").bind(label).execute(executor).await?;
    Ok(result.rows_affected() > 0)
}

/// 替换图片的标签，标签必须已经存在
pub async fn set_image_tags(executor: &SqlitePool, image_id: i64, labels: &[String]) -> Result<()> {
    let mut tx = executor.begin().await?;
    sqlx::query("DELETE FROM image_tag WHERE image_id = ?")
        .bind(image_id)
        .execute(&mut *tx)
        .await?;
    for label in labels {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO image_tag (image_id, tag_id)
            SELECT ?, id FROM tag WHERE label = ?
            "#,
        )
        .bind(image_id)
        .bind(label)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn list_images(executor: &SqlitePool) -> Result<Vec<ImageRecord>> {
    sqlx::query_as::<_, ImageRecord>("SELECT id, path, fingerprint FROM image ORDER BY id")
        .fetch_all(executor)
        .await
}

pub async fn list_tag_types(executor: &SqlitePool) -> Result<Vec<TagTypeRecord>> {
    sqlx::query_as::<_, TagTypeRecord>("SELECT id, label, symbol, color FROM tag_type ORDER BY id")
        .fetch_all(executor)
        .await
}

pub async fn list_tags(executor: &SqlitePool) -> Result<Vec<TagRecord>> {
    sqlx::query_as::<_, TagRecord>("SELECT id, label, type_id, definition FROM tag ORDER BY id")
        .fetch_all(executor)
        .await
}

/// 列出所有图片和标签的关联
pub async fn list_image_tags(executor: &SqlitePool) -> Result<Vec<ImageTagRecord>> {
    sqlx::query_as::<_, ImageTagRecord>(
        r#"
        SELECT image_tag.image_id AS image_id, tag.label AS label
        FROM image_tag
        JOIN tag ON image_tag.tag_id = tag.id
        ORDER BY image_tag.image_id
        "#,
    )
    .fetch_all(executor)
    .await
}
