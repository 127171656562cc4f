use std::sync::Arc;

use anyhow::Result;

use crate::config::UploadOptions;
use crate::engine::SharedEngine;
use crate::upload::{Rejection, UploadPolicy, UploadStore};
use crate::utils::format_size;

/// 应用状态
pub struct AppState {
    /// 延迟加载的相似度引擎
    pub engine: SharedEngine,
    /// 上传文件校验规则
    pub policy: UploadPolicy,
    /// 上传文件存储，`--no-save` 时为空
    pub store: Option<UploadStore>,
    /// 整个请求体的大小上限
    pub max_request_size: usize,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(engine: SharedEngine, upload: &UploadOptions) -> Result<Arc<Self>> {
        let store = if upload.no_save { None } else { Some(UploadStore::open(&upload.upload_dir)?) };
        Ok(Arc::new(AppState {
            engine,
            policy: UploadPolicy::from_options(upload),
            store,
            max_request_size: upload.max_request_size,
        }))
    }

    pub fn too_large(&self) -> Rejection {
        Rejection::TooLarge(format_size(self.policy.max_file_size))
    }
}
