use indicatif::ProgressStyle;

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .expect("invalid progress bar template")
        .progress_chars("#>-")
}

/// 将字节数格式化为 `16MB` 这样的形式，只在整除时使用更大的单位
pub fn format_size(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes;
    let mut unit = 0;
    while unit + 1 < UNITS.len() && value >= 1024 && value % 1024 == 0 {
        value /= 1024;
        unit += 1;
    }
    format!("{}{}", value, UNITS[unit])
}

/// 将多个词连接为 `A, B, and C` 形式
pub fn join_words(words: &[String]) -> String {
    match words {
        [] => String::new(),
        [a] => a.clone(),
        [a, b] => format!("{a} and {b}"),
        [rest @ .., last] => format!("{}, and {}", rest.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(16 * 1024 * 1024), "16MB");
        assert_eq!(format_size(512 * 1024), "512KB");
        assert_eq!(format_size(1500), "1500B");
        assert_eq!(format_size(0), "0B");
    }

    #[test]
    fn test_join_words() {
        let words = ["PNG", "JPG", "JPEG"].map(String::from);
        assert_eq!(join_words(&words), "PNG, JPG, and JPEG");
        assert_eq!(join_words(&words[..2]), "PNG and JPG");
        assert_eq!(join_words(&words[..1]), "PNG");
    }
}
