use sqlx::FromRow;

/// 图片记录
#[derive(Debug, Clone, FromRow)]
pub struct ImageRecord {
    /// 图片 ID
    pub id: i64,
    /// 图片路径
    pub path: String,
    /// 8 字节大端序指纹
    pub fingerprint: Option<Vec<u8>>,
}

/// 标签类型记录
#[derive(Debug, Clone, FromRow)]
pub struct TagTypeRecord {
    pub id: i64,
    pub label: String,
    /// 单个字符
    pub symbol: String,
    /// RGB 颜色
    pub color: i64,
}

/// 标签记录
#[derive(Debug, Clone, FromRow)]
pub struct TagRecord {
    pub id: i64,
    pub label: String,
    pub type_id: Option<i64>,
    /// 复合标签的定义
    pub definition: Option<String>,
}

/// 图片和标签的关联
#[derive(Debug, Clone, FromRow)]
pub struct ImageTagRecord {
    pub image_id: i64,
    pub label: String,
}
