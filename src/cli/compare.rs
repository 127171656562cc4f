use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Parser, ValueEnum};
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{EngineOptions, Opts, UploadOptions};
use crate::engine::SimilarityEngine;
use crate::similarity::SimilarityResult;
use crate::upload::UploadPolicy;

#[derive(Parser, Debug, Clone)]
pub struct CompareCommand {
    #[command(flatten)]
    pub engine: EngineOptions,
    /// 第一张图片路径
    pub image1: PathBuf,
    /// 第二张图片路径
    pub image2: PathBuf,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for CompareCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let policy = UploadPolicy::from_options(&UploadOptions::default());
        let mut files = vec![];
        for path in [&self.image1, &self.image2] {
            let size = std::fs::metadata(path)
                .map_err(|e| anyhow!("{}: {}", path.display(), e))?
                .len() as usize;
            let name = path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
            files.push((name, size));
        }
        let files = files.iter().map(|(name, size)| Some((name.as_str(), *size))).collect::<Vec<_>>();
        policy.check(&files).map_err(|e| anyhow!("{}", e))?;

        let result = block_in_place(|| -> Result<_> {
            let engine = SimilarityEngine::load(&self.engine, &opts.model_dir)?;
            engine.compare_files(&self.image1, &self.image2)
        })?;

        print_result(&result, &self.output_format)
    }
}

fn print_result(result: &SimilarityResult, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            println!("{:.2}%\t{}\t{:.6}", result.similarity_score, result.similarity_level.as_str(), result.raw_score);
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone)]
pub enum OutputFormat {
    Json,
    Table,
}
