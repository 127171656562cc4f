use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use indicatif::ProgressBar;
use log::info;
use rayon::prelude::*;
use regex::Regex;
use tokio::task::block_in_place;
use walkdir::WalkDir;

use crate::cli::{OutputFormat, SubCommandExtend};
use crate::config::{EngineOptions, Opts};
use crate::engine::{BatchEntry, SimilarityEngine, sort_entries};
use crate::utils::pb_style;

/// 每次读取并预处理的文件数量
const CHUNK_SIZE: usize = 64;

#[derive(Parser, Debug, Clone)]
pub struct BatchCommand {
    #[command(flatten)]
    pub engine: EngineOptions,
    /// 参考图片路径
    pub reference: PathBuf,
    /// 待比较图片所在目录
    pub path: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png")]
    pub suffix: String,
    /// 显示的结果数量，0 表示全部显示
    #[arg(long, value_name = "COUNT", default_value_t = 10)]
    pub count: usize,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl BatchCommand {
    /// 扫描目录下所有符合后缀的文件
    fn scan(&self) -> Result<Vec<PathBuf>> {
        let re_suf = Regex::new(&format!("(?i)^({})$", self.suffix.replace(',', "|")))?;
        let mut files = WalkDir::new(&self.path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().is_some_and(|ext| re_suf.is_match(&ext.to_string_lossy())))
            .collect::<Vec<_>>();
        files.sort();
        Ok(files)
    }
}

impl SubCommandExtend for BatchCommand {
    async fn run(&self, opts: &Opts) -> anyhow::Result<()> {
        let files = self.scan()?;
        if files.is_empty() {
            bail!("no images found in {}", self.path.display());
        }
        info!("共找到 {} 张图片", files.len());

        let mut entries = block_in_place(|| -> Result<_> {
            let engine = SimilarityEngine::load(&self.engine, &opts.model_dir)?;
            let reference = std::fs::read(&self.reference)
                .with_context(|| format!("failed to read {}", self.reference.display()))?;
            let reference = engine.extract_features(&reference)?;

            let pb = ProgressBar::new(files.len() as u64).with_style(pb_style());
            let mut entries = Vec::with_capacity(files.len());
            for chunk in files.chunks(CHUNK_SIZE) {
                let inputs = chunk
                    .par_iter()
                    .map(|path| (path.display().to_string(), engine.preprocessor().process_file(path)))
                    .collect::<Vec<_>>();
                entries.extend(engine.score_candidates(&reference, inputs));
                pb.inc(chunk.len() as u64);
            }
            pb.finish_with_message("比较完成");
            Ok(entries)
        })?;

        sort_entries(&mut entries);
        if self.count > 0 {
            entries.truncate(self.count);
        }
        print_result(&entries, &self.output_format)
    }
}

fn print_result(entries: &[BatchEntry], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(entries)?)
        }
        OutputFormat::Table => {
            for entry in entries {
                match &entry.error {
                    Some(err) => println!("{:.2}\t{}\t{}", entry.similarity, entry.image, err),
                    None => println!("{:.2}\t{}", entry.similarity, entry.image),
                }
            }
        }
    }
    Ok(())
}
