use std::path::PathBuf;
use std::sync::LazyLock;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use image::imageops::FilterType;

use crate::cli::*;
use crate::model::ModelKind;
use crate::preprocess::Preprocessor;

static PROJECT_DIRS: LazyLock<Option<ProjectDirs>> =
    LazyLock::new(|| ProjectDirs::from("", "imsim", "imsim"));

fn default_model_dir() -> PathBuf {
    match &*PROJECT_DIRS {
        Some(dirs) => dirs.cache_dir().join("models"),
        None => PathBuf::from("models"),
    }
}

fn default_upload_dir() -> PathBuf {
    match &*PROJECT_DIRS {
        Some(dirs) => dirs.data_dir().join("uploads"),
        None => PathBuf::from("uploads"),
    }
}

#[derive(Parser, Debug, Clone)]
pub struct EngineOptions {
    /// 用于提取特征的预训练模型
    #[arg(short, long, value_enum, default_value_t = ModelKind::Resnet50)]
    pub model: ModelKind,
    /// 本地 safetensors 权重文件，不填则从 HuggingFace 下载
    #[arg(long, value_name = "PATH")]
    pub weights: Option<PathBuf>,
    /// 模型输入尺寸，图片会被缩放为 SIZExSIZE
    #[arg(long, value_name = "SIZE", default_value_t = 224)]
    pub image_size: u32,
    /// 缩放插值方式
    #[arg(long, value_name = "FILTER", default_value = "lanczos3", value_parser = parse_filter)]
    pub filter: FilterType,
    /// 使用 CUDA 推理（需要启用 cuda feature）
    #[arg(long)]
    pub cuda: bool,
}

impl EngineOptions {
    pub fn preprocessor(&self) -> Preprocessor {
        Preprocessor::new(self.image_size, self.filter)
    }
}

#[derive(Parser, Debug, Clone)]
pub struct UploadOptions {
    /// 单个文件的最大体积，支持 K/M/G 后缀
    #[arg(long, value_name = "SIZE", default_value = "16M", value_parser = parse_bytes)]
    pub max_file_size: usize,
    /// 整个请求体的最大体积
    #[arg(long, value_name = "SIZE", default_value = "64M", value_parser = parse_bytes)]
    pub max_request_size: usize,
    /// 允许的文件后缀名，多个后缀用逗号分隔
    #[arg(long, value_name = "LIST", default_value = "png,jpg,jpeg")]
    pub extensions: String,
    /// 上传文件保存目录
    #[arg(long, value_name = "DIR", default_value_os_t = default_upload_dir())]
    pub upload_dir: PathBuf,
    /// 不保存上传的文件
    #[arg(long)]
    pub no_save: bool,
}

impl UploadOptions {
    /// 小写的后缀名列表
    pub fn extension_list(&self) -> Vec<String> {
        self.extensions
            .split(',')
            .map(|s| s.trim().trim_start_matches('.').to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            max_file_size: 16 * 1024 * 1024,
            max_request_size: 64 * 1024 * 1024,
            extensions: "png,jpg,jpeg".to_string(),
            upload_dir: default_upload_dir(),
            no_save: false,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imsim", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 模型权重缓存目录
    #[arg(long, global = true, value_name = "DIR", default_value_os_t = default_model_dir())]
    pub model_dir: PathBuf,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 启动 HTTP 服务
    Server(ServerCommand),
    /// 比较两张图片的相似度
    Compare(CompareCommand),
    /// 将一张图片与目录中的所有图片比较
    Batch(BatchCommand),
    /// 预先下载模型权重
    Fetch(FetchCommand),
}

fn parse_filter(s: &str) -> Result<FilterType, String> {
    match s {
        "nearest" => Ok(FilterType::Nearest),
        "triangle" => Ok(FilterType::Triangle),
        "catmull-rom" => Ok(FilterType::CatmullRom),
        "gaussian" => Ok(FilterType::Gaussian),
        "lanczos3" => Ok(FilterType::Lanczos3),
        _ => Err(format!("无效的插值方式: {}", s)),
    }
}

/// 解析 `16M`、`512K`、`1024` 形式的体积
pub fn parse_bytes(s: &str) -> anyhow::Result<usize> {
    let s = s.trim();
    let (num, unit) = match s.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((i, _)) => s.split_at(i),
        None => (s, ""),
    };
    let num: usize = num.parse().map_err(|_| anyhow::anyhow!("无效的体积: {}", s))?;
    let shift = match unit.to_ascii_uppercase().trim_end_matches(['B', 'I']) {
        "" => 0,
        "K" => 10,
        "M" => 20,
        "G" => 30,
        _ => return Err(anyhow::anyhow!("无效的体积单位: {}", unit)),
    };
    num.checked_mul(1 << shift).ok_or_else(|| anyhow::anyhow!("体积过大: {}", s))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("1024", 1024)]
    #[case("16M", 16 * 1024 * 1024)]
    #[case("16MB", 16 * 1024 * 1024)]
    #[case("16MiB", 16 * 1024 * 1024)]
    #[case("512k", 512 * 1024)]
    #[case("1G", 1 << 30)]
    fn test_parse_bytes(#[case] input: &str, #[case] expected: usize) {
        assert_eq!(parse_bytes(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("M")]
    #[case("12T")]
    #[case("1.5M")]
    fn test_parse_bytes_invalid(#[case] input: &str) {
        assert!(parse_bytes(input).is_err());
    }

    #[test]
    fn test_extension_list() {
        let opts = UploadOptions { extensions: "PNG, .jpg,,jpeg".to_string(), ..Default::default() };
        assert_eq!(opts.extension_list(), vec!["png", "jpg", "jpeg"]);
    }

    #[test]
    fn test_default_options() {
        let opts = Opts::try_parse_from(["imsim", "compare", "a.png", "b.png"]).unwrap();
        match opts.subcmd {
            SubCommand::Compare(cmd) => {
                assert_eq!(cmd.engine.model, ModelKind::Resnet50);
                assert_eq!(cmd.engine.image_size, 224);
                assert_eq!(cmd.engine.filter, FilterType::Lanczos3);
            }
            _ => panic!("unexpected subcommand"),
        }
    }

    #[test]
    fn test_server_upload_defaults() {
        let opts = Opts::try_parse_from(["imsim", "server", "--model", "resnet18"]).unwrap();
        match opts.subcmd {
            SubCommand::Server(cmd) => {
                assert_eq!(cmd.engine.model, ModelKind::Resnet18);
                assert_eq!(cmd.upload.max_file_size, 16 * 1024 * 1024);
                assert_eq!(cmd.upload.extension_list(), vec!["png", "jpg", "jpeg"]);
                assert!(!cmd.preload);
            }
            _ => panic!("unexpected subcommand"),
        }
    }
}
