//! # Host CLI
//!
//! 消息渲染器的终端预览 - 用 headless 协作者逐帧回放消息，
//! 在每个页尾打印消息框内容和期间发出的事件。
//!
//! ## 用法
//!
//! ```bash
//! cargo run -p host-cli -- "你好<W:500>世界"
//! cargo run -p host-cli -- --file story.txt --records records.json
//! cargo run -p host-cli -- --file story.txt --skip --skip-time 0
//! cargo run -p host-cli -- --file story.txt --save-at 40 --save-bundle save.json
//! cargo run -p host-cli -- --load-bundle save.json
//! ```
//!
//! 消息文件以空行分隔多条消息。

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{Level, debug, info, warn};
use vn_message::{
    HeadlessHost, Message, MessageEvent, MessageRenderer, MessageSettings, RecordBook,
    RendererBundle, RevealState,
};

#[derive(Parser)]
#[command(name = "vn-message")]
#[command(about = "消息渲染器终端预览 - 逐帧回放带控制码的消息")]
#[command(version)]
struct Cli {
    /// 直接给出的消息标记（与 --file 二选一）
    text: Option<String>,

    /// 消息文件，空行分隔多条消息
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// 渲染器配置文件（JSON）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 记录表文件（JSON）
    #[arg(short, long)]
    records: Option<PathBuf>,

    /// 跳过模式
    #[arg(long)]
    skip: bool,

    /// 跳过模式下的等待帧数，0 表示瞬间跳过（默认取配置）
    #[arg(long)]
    skip_time: Option<u32>,

    /// 单条消息的最大帧数，超过视为卡死
    #[arg(long, default_value = "100000")]
    max_frames: usize,

    /// 在第 N 帧导出存档包（配合 --save-bundle）
    #[arg(long)]
    save_at: Option<usize>,

    /// 存档包输出路径
    #[arg(long)]
    save_bundle: Option<PathBuf>,

    /// 从存档包恢复并继续回放
    #[arg(long)]
    load_bundle: Option<PathBuf>,

    /// 输出调试日志
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_target(false)
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("❌ 回放失败: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    let settings = load_settings(cli.config.as_deref())?;
    let records = match &cli.records {
        Some(path) => RecordBook::load(path)
            .with_context(|| format!("无法加载记录表: {}", path.display()))?,
        None => RecordBook::default(),
    };

    let skip_time = cli.skip_time.unwrap_or(settings.skip_time);
    let mut host = HeadlessHost::with_records(records);
    let mut renderer = MessageRenderer::new(settings);
    renderer.set_skip(cli.skip, skip_time);

    let mut player = Player {
        cli,
        frame: 0,
        page: 0,
        printed_events: 0,
        page_printed: false,
    };

    if let Some(path) = &cli.load_bundle {
        let json = fs::read_to_string(path)
            .with_context(|| format!("无法读取存档包: {}", path.display()))?;
        let bundle = RendererBundle::from_json(&json)?;
        renderer.restore(bundle);
        renderer.on_data_bundle_restore(&mut host.services());
        info!(path = %path.display(), "已从存档包恢复");
        println!("📂 已恢复存档: {}", path.display());
        player.play(&mut renderer, &mut host)?;
    }

    let messages = load_messages(cli)?;
    if messages.is_empty() && cli.load_bundle.is_none() {
        bail!("没有可回放的消息，请给出消息文本或 --file");
    }

    for (index, text) in messages.iter().enumerate() {
        println!("💬 消息 {}", index + 1);
        renderer.draw_formatted_text(&Message::narration(text.as_str()), &mut host.services());
        player.play(&mut renderer, &mut host)?;
    }

    println!(
        "✅ 完成: {} 帧, {} 页, 表面 {} 个",
        player.frame,
        player.page,
        host.surfaces.surfaces.len()
    );
    Ok(())
}

fn load_settings(path: Option<&Path>) -> Result<MessageSettings> {
    let settings = match path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
            MessageSettings::from_json(&json)?
        }
        None => MessageSettings::default(),
    };
    settings.validate()?;
    Ok(settings)
}

fn load_messages(cli: &Cli) -> Result<Vec<String>> {
    if let Some(text) = &cli.text {
        return Ok(vec![text.clone()]);
    }
    let Some(path) = &cli.file else {
        return Ok(Vec::new());
    };

    let content = fs::read_to_string(path)
        .with_context(|| format!("无法读取消息文件: {}", path.display()))?;
    let content = content.replace("\r\n", "\n");
    Ok(content
        .split("\n\n")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

/// 回放循环的状态
struct Player<'a> {
    cli: &'a Cli,
    frame: usize,
    page: usize,
    printed_events: usize,
    /// 当前屏是否已打印
    page_printed: bool,
}

impl Player<'_> {
    /// 驱动当前消息直到结束，所有按键等待自动确认
    fn play(&mut self, renderer: &mut MessageRenderer, host: &mut HeadlessHost) -> Result<()> {
        let mut frames = 0;
        self.page_printed = false;

        while renderer.state() != RevealState::Finished {
            if renderer.state() == RevealState::Idle {
                warn!("渲染器空闲，没有可回放的消息");
                return Ok(());
            }

            renderer.update(&mut host.services());
            if let RevealState::FadingOut { animation } = renderer.state() {
                debug!(frame = self.frame, opacity = ?host.animator.opacity(animation), "翻页淡出");
            }
            host.animator.tick();
            self.frame += 1;
            frames += 1;

            if Some(self.frame) == self.cli.save_at {
                self.save_bundle(renderer)?;
            }

            if let RevealState::WaitingForKey { page_end } = renderer.state() {
                if page_end && !self.page_printed {
                    self.print_page(host);
                }
                debug!(frame = self.frame, page_end, "自动确认");
                renderer.on_advance(&mut host.services());
            }
            self.print_events(host);

            if frames >= self.cli.max_frames {
                bail!("消息在 {} 帧内没有结束，状态: {:?}", frames, renderer.state());
            }
        }

        // 瞬间跳过时页尾不停顿，结束时补打最后一屏
        if !self.page_printed {
            self.print_page(host);
        }
        self.print_events(host);
        Ok(())
    }

    fn print_page(&mut self, host: &HeadlessHost) {
        self.page += 1;
        self.page_printed = true;
        println!("── 第 {} 页 (帧 {}) ──", self.page, self.frame);
        for line in host.surfaces.screen_text() {
            println!("  │ {line}");
        }
    }

    fn print_events(&mut self, host: &HeadlessHost) {
        for event in &host.events.events[self.printed_events..] {
            if matches!(event, MessageEvent::MessageBatch { .. }) {
                self.page_printed = false;
            }
            println!("  ⚡ {}", event.name());
        }
        self.printed_events = host.events.events.len();
    }

    fn save_bundle(&self, renderer: &MessageRenderer) -> Result<()> {
        let Some(path) = &self.cli.save_bundle else {
            warn!("指定了 --save-at 但没有 --save-bundle，忽略");
            return Ok(());
        };
        let json = renderer.to_data_bundle().to_json()?;
        fs::write(path, json).with_context(|| format!("无法写入存档包: {}", path.display()))?;
        println!("💾 第 {} 帧已存档: {}", self.frame, path.display());
        Ok(())
    }
}
