//! # xtask - 开发辅助工具
//!
//! 提供本地质量门禁与开发辅助命令。
//!
//! ## 命令
//!
//! - `check-all`: fmt、clippy、test 门禁
//! - `cov-message` / `cov-workspace`: llvm-cov 覆盖率报告
//! - `markup-check`: 消息标记静态检查

use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use vn_message::{ControlRegistry, DiagnosticResult, analyze_markup};
use walkdir::WalkDir;

/// `check-all` 依次执行的 cargo 子命令
const GATE_STEPS: &[&[&str]] = &[
    &["fmt", "--all", "--", "--check"],
    &["clippy", "--workspace", "--all-targets"],
    &["test", "--workspace"],
];

/// 执行一条 cargo 命令，失败即中止
fn cargo(args: &[&str]) -> anyhow::Result<()> {
    let step = format!("cargo {}", args.join(" "));
    eprintln!("\n==> {step}");
    let status = Command::new("cargo").args(args).status()?;
    anyhow::ensure!(status.success(), "{step} failed with {status}");
    Ok(())
}

/// 生成 HTML 覆盖率报告，`scope` 为包选择参数
fn coverage(scope: &[&str]) -> anyhow::Result<()> {
    let available = Command::new("cargo")
        .args(["llvm-cov", "--version"])
        .status()
        .is_ok_and(|s| s.success());
    anyhow::ensure!(
        available,
        "需要 cargo-llvm-cov：cargo install cargo-llvm-cov && rustup component add llvm-tools-preview"
    );

    let mut args = vec!["llvm-cov"];
    args.extend_from_slice(scope);
    args.extend_from_slice(&["--all-features", "--html"]);
    cargo(&args)?;

    eprintln!("\n报告: target/llvm-cov/html/index.html");
    Ok(())
}

fn main() -> ExitCode {
    match real_main() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("xtask error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn real_main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let sub = args.next().unwrap_or_else(|| "help".to_string());

    match sub.as_str() {
        "check-all" => GATE_STEPS.iter().try_for_each(|step| cargo(step))?,
        "cov-message" => coverage(&["-p", "vn-message"])?,
        // xtask 本身不计入
        "cov-workspace" => coverage(&["--workspace", "--exclude", "xtask"])?,
        "markup-check" => markup_check(args.next().as_deref())?,
        "help" | "-h" | "--help" => print_help(),
        other => anyhow::bail!("unknown xtask subcommand: {other}"),
    }

    Ok(())
}

fn print_help() {
    eprintln!(
        r#"xtask - 开发辅助工具

用法: cargo run -p xtask -- <command>

  check-all              fmt + clippy + test
  cov-message            vn-message 覆盖率（HTML）
  cov-workspace          整个 workspace 覆盖率（不含 xtask）
  markup-check [path]    静态检查消息标记

markup-check 默认扫描 assets/messages/ 下的 .txt 文件，
也可以指定单个文件或目录。报告未知控制码、缺失或无效的参数、
未配对的超链接标记；存在错误时以非零状态退出。
"#
    );
}

//=============================================================================
// markup-check 命令实现
//=============================================================================

const DEFAULT_MESSAGES_DIR: &str = "assets/messages";

/// 执行标记检查
fn markup_check(path: Option<&str>) -> anyhow::Result<()> {
    let files = match path {
        Some(p) => {
            let path = PathBuf::from(p);
            if path.is_file() {
                vec![path]
            } else if path.is_dir() {
                collect_markup_files(&path)
            } else {
                anyhow::bail!("路径不存在: {}", p);
            }
        }
        None => {
            let dir = Path::new(DEFAULT_MESSAGES_DIR);
            if !dir.exists() {
                anyhow::bail!(
                    "默认消息目录不存在: {}\n请在 workspace 根目录运行，或指定消息路径",
                    dir.display()
                );
            }
            collect_markup_files(dir)
        }
    };

    if files.is_empty() {
        eprintln!("未找到消息文件（.txt）");
        return Ok(());
    }

    eprintln!("==> 检查 {} 个消息文件...\n", files.len());

    let registry = ControlRegistry::with_builtins();
    let mut diagnostics = DiagnosticResult::new();
    let mut read_errors = 0;

    for file in &files {
        let source_id = file.display().to_string();
        match std::fs::read_to_string(file) {
            Ok(content) => diagnostics.merge(analyze_markup(&source_id, &content, &registry)),
            Err(e) => {
                eprintln!("[ERROR] {}: 无法读取文件 - {}", source_id, e);
                read_errors += 1;
            }
        }
    }

    print_check_result(files.len(), read_errors, &diagnostics);

    if read_errors > 0 || diagnostics.has_errors() {
        anyhow::bail!("标记检查发现错误");
    }

    Ok(())
}

/// 收集目录下的所有 .txt 文件
fn collect_markup_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
        .collect();
    files.sort();
    files
}

/// 输出检查结果
fn print_check_result(checked: usize, read_errors: usize, diagnostics: &DiagnosticResult) {
    eprintln!("─────────────────────────────────────────────────────");
    eprintln!("检查完成: {} 个文件", checked);
    eprintln!();

    for diag in &diagnostics.diagnostics {
        eprintln!("{}", diag);
    }

    let error_count = read_errors + diagnostics.error_count();
    let warn_count = diagnostics.warn_count();

    eprintln!();
    if error_count > 0 {
        eprintln!("❌ {} 个错误, {} 个警告", error_count, warn_count);
    } else if warn_count > 0 {
        eprintln!("⚠️  0 个错误, {} 个警告", warn_count);
    } else {
        eprintln!("✅ 检查通过，无错误");
    }
}
