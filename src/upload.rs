use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use log::info;

use crate::config::UploadOptions;
use crate::utils::{format_size, join_words};

/// 上传文件被拒绝的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// 缺少文件字段
    Missing,
    /// 文件名为空
    NoSelection,
    /// 后缀名不在允许列表中
    FileType(String),
    /// 文件过大
    TooLarge(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "Both images are required"),
            Self::NoSelection => write!(f, "No selected files"),
            Self::FileType(allowed) => write!(f, "Only {allowed} files are allowed"),
            Self::TooLarge(limit) => write!(f, "File size exceeds {limit} limit"),
        }
    }
}

/// 上传文件的校验规则
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    pub max_file_size: usize,
    pub extensions: Vec<String>,
}

impl UploadPolicy {
    pub fn from_options(opts: &UploadOptions) -> Self {
        Self { max_file_size: opts.max_file_size, extensions: opts.extension_list() }
    }

    /// 文件名是否带有允许的后缀
    pub fn allowed_file(&self, filename: &str) -> bool {
        match filename.rsplit_once('.') {
            Some((_, ext)) => self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }

    fn file_type_rejection(&self) -> Rejection {
        let names = self.extensions.iter().map(|e| e.to_uppercase()).collect::<Vec<_>>();
        Rejection::FileType(join_words(&names))
    }

    /// 依次检查文件是否齐全、文件名、后缀名以及体积
    ///
    /// 每个元素为 `(文件名, 文件大小)`，缺失的字段为 `None`。
    pub fn check(&self, files: &[Option<(&str, usize)>]) -> Result<(), Rejection> {
        if files.iter().any(Option::is_none) {
            return Err(Rejection::Missing);
        }
        let files = files.iter().flatten().collect::<Vec<_>>();
        if files.iter().any(|(name, _)| name.is_empty()) {
            return Err(Rejection::NoSelection);
        }
        if !files.iter().all(|(name, _)| self.allowed_file(name)) {
            return Err(self.file_type_rejection());
        }
        self.check_size(files.iter().map(|(_, size)| *size))
    }

    pub fn check_size(&self, sizes: impl IntoIterator<Item = usize>) -> Result<(), Rejection> {
        if sizes.into_iter().any(|size| size > self.max_file_size) {
            return Err(Rejection::TooLarge(format_size(self.max_file_size)));
        }
        Ok(())
    }
}

/// 清理文件名，只保留 ASCII 字母数字以及 `.`、`-`、`_`
///
/// 路径部分会被丢弃，空白替换为下划线，开头的 `.` 和 `_` 会被去掉。
pub fn secure_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect::<String>();
    cleaned.trim_start_matches(['.', '_']).to_string()
}

/// 上传文件的存储目录
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create upload directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 生成存储用的文件名：`<时间戳>_<内容哈希前 8 位>_<清理后的文件名>`
    pub fn stored_name(filename: &str, contents: &[u8]) -> String {
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let hash = blake3::hash(contents).to_hex();
        let mut name = secure_filename(filename);
        if name.is_empty() || !name.contains('.') {
            name = format!("image.{}", filename.rsplit_once('.').map(|(_, e)| e).unwrap_or("bin"));
            name = secure_filename(&name);
        }
        format!("{}_{}_{}", timestamp, &hash[..8], name)
    }

    /// 保存上传的文件，返回存储的文件名
    pub async fn save(&self, filename: &str, contents: &[u8]) -> Result<String> {
        let name = Self::stored_name(filename, contents);
        let path = self.dir.join(&name);
        tokio::fs::write(&path, contents)
            .await
            .with_context(|| format!("failed to save {}", path.display()))?;
        info!("文件已保存: {}", path.display());
        Ok(name)
    }
}
