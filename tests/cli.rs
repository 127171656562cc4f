use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use rstest::*;

macro_rules! cargo_run {
    ($cmd:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin($cmd)?;
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

#[test]
fn help_lists_subcommands() -> Result<()> {
    cargo_run!("imsim", "--help")
        .success()
        .stdout(predicate::str::contains("server"))
        .stdout(predicate::str::contains("compare"))
        .stdout(predicate::str::contains("batch"))
        .stdout(predicate::str::contains("fetch"));
    Ok(())
}

#[test]
fn compare_missing_file() -> Result<()> {
    let dir = assert_fs::TempDir::new()?;
    let image = dir.child("a.png");
    image.write_binary(b"\x89PNG")?;

    cargo_run!("imsim", "--model-dir", dir.path(), "compare", image.path(), dir.child("missing.png").path())
        .failure()
        .stderr(predicate::str::contains("missing.png"));
    Ok(())
}

#[rstest]
#[case::gif("b.gif", 16)]
#[case::no_extension("b", 16)]
#[case::too_large("b.jpg", 16 * 1024 * 1024 + 1)]
fn compare_rejected_before_loading_model(#[case] name: &str, #[case] size: usize) -> Result<()> {
    let dir = assert_fs::TempDir::new()?;
    let models = dir.child("models");
    let image1 = dir.child("a.png");
    let image2 = dir.child(name);
    image1.write_binary(b"\x89PNG")?;
    image2.write_binary(&vec![0u8; size])?;

    let expected = if size > 16 {
        "File size exceeds 16MB limit"
    } else {
        "Only PNG, JPG, and JPEG files are allowed"
    };
    cargo_run!("imsim", "--model-dir", models.path(), "compare", image1.path(), image2.path())
        .failure()
        .stderr(predicate::str::contains(expected));

    // 校验失败时不会尝试下载权重
    models.assert(predicate::path::missing());
    Ok(())
}

#[test]
fn batch_empty_directory() -> Result<()> {
    let dir = assert_fs::TempDir::new()?;
    let images = dir.child("images");
    images.create_dir_all()?;
    images.child("notes.txt").write_str("not an image")?;
    let reference = dir.child("ref.png");
    reference.write_binary(b"\x89PNG")?;

    cargo_run!("imsim", "--model-dir", dir.child("models").path(), "batch", reference.path(), images.path())
        .failure()
        .stderr(predicate::str::contains("no images found"));
    Ok(())
}

#[rstest]
#[case::bad_filter(&["compare", "--filter", "cubic", "a.png", "b.png"])]
#[case::bad_model(&["fetch", "-m", "vgg16"])]
#[case::bad_size(&["server", "--max-file-size", "lots"])]
fn invalid_arguments(#[case] args: &[&str]) -> Result<()> {
    let mut cmd = Command::cargo_bin("imsim")?;
    cmd.args(args).assert().failure().code(2);
    Ok(())
}
