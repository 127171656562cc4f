use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::model::{self, ModelKind};

#[derive(Parser, Debug, Clone)]
pub struct FetchCommand {
    /// 需要下载的模型
    #[arg(short, long, value_enum, default_value_t = ModelKind::Resnet50)]
    pub model: ModelKind,
}

impl SubCommandExtend for FetchCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let (kind, model_dir) = (self.model, opts.model_dir.clone());
        let path = tokio::task::spawn_blocking(move || model::resolve_weights(kind, &model_dir, None)).await??;
        println!("{}", path.display());
        Ok(())
    }
}
