use std::sync::Arc;

use clap::Parser;
use log::info;
use tokio::net::TcpListener;

use crate::cli::SubCommandExtend;
use crate::config::{EngineOptions, UploadOptions};
use crate::engine::{SharedEngine, SimilarityEngine};
use crate::{Opts, server};

#[derive(Parser, Debug, Clone)]
pub struct ServerCommand {
    #[command(flatten)]
    pub engine: EngineOptions,
    #[command(flatten)]
    pub upload: UploadOptions,
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub addr: String,
    /// 启动时立即加载模型，而不是等到第一次请求
    #[arg(long)]
    pub preload: bool,
}

impl SubCommandExtend for ServerCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let engine_opts = Arc::new(self.engine.clone());
        let model_dir = opts.model_dir.clone();
        let engine = SharedEngine::new(move || SimilarityEngine::load(&engine_opts, &model_dir));
        if self.preload {
            engine.get().await?;
        }

        // 创建应用状态
        let state = server::AppState::new(engine, &self.upload)?;
        if let Some(store) = &state.store {
            info!("上传文件保存在: {}", store.dir().display());
        }

        // 创建应用
        let app = server::create_app(state);

        // 启动服务器
        info!("服务器启动：http://{}", &self.addr);
        let listener = TcpListener::bind(&self.addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}
