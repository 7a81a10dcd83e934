use std::sync::Arc;

use crate::Library;
use crate::config::QueryOptions;

/// 应用状态
pub struct AppState {
    /// 图库
    pub library: Library,
    /// 查询配置选项
    pub options: QueryOptions,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(library: Library, options: QueryOptions) -> Arc<Self> {
        Arc::new(AppState { library, options })
    }
}
