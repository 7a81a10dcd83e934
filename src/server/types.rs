use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::library::ScoredImage;

/// 查询请求参数
#[derive(Debug, Deserialize, ToSchema)]
pub struct QueryRequest {
    /// 查询语句
    pub query: String,
    /// 返回的结果数量，不填则使用服务器配置
    pub count: Option<usize>,
}

/// 查询响应
#[derive(Debug, Serialize, ToSchema)]
pub struct QueryResponse {
    /// 查询耗时，单位为毫秒
    pub time: u32,
    /// 匹配的图片总数，不受 count 影响
    pub total: usize,
    /// 按分数和 ID 排序的图片
    pub images: Vec<ScoredImage>,
    /// 不影响执行的警告，例如未知标签
    pub warnings: Vec<String>,
}

/// 只需要查询语句的请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct TextRequest {
    pub query: String,
}

/// 检查查询的响应
#[derive(Debug, Serialize, ToSchema)]
pub struct ValidateResponse {
    pub warnings: Vec<String>,
}

/// 化简后的查询
#[derive(Debug, Serialize, ToSchema)]
pub struct ExplainResponse {
    pub expr: String,
}
