//! Stepwise 驱动程序
//!
//! 从 stdin 逐行读取：`/obs <文本>` 推送观察，`/frame <路径>` 推送图片，`/belief` 查看当前信念，
//! `/reset` 清空信念与图片，`/quit` 退出，其余内容作为查询。所有回复以 JSON 输出到 stdout。

use std::path::PathBuf;

use anyhow::Context;
use serde::Serialize;
use stepwise::{config::load_config, create_agent_from_config, observability, vision::CachedFrame, Agent};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let agent = create_agent_from_config(&cfg).context("Failed to create agent")?;

    tracing::info!(
        name = cfg.app.name.as_deref().unwrap_or("stepwise"),
        "Ready; commands: /obs <text>, /frame <path>, /belief, /reset, /quit"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" {
            break;
        }
        handle_line(&agent, line).await?;
    }

    tracing::info!("Bye");
    Ok(())
}

async fn handle_line(agent: &Agent, line: &str) -> anyhow::Result<()> {
    if let Some(text) = line.strip_prefix("/obs ") {
        return print_json(&agent.observe(text.trim()));
    }
    if let Some(path) = line.strip_prefix("/frame ") {
        let path = path.trim();
        match CachedFrame::from_path(path) {
            Ok(frame) => {
                agent.put_frame(frame);
                print_json(&serde_json::json!({ "frame": path }))?;
            }
            // 读图失败只影响本条命令
            Err(e) => tracing::warn!(path, "Failed to read frame: {}", e),
        }
        return Ok(());
    }
    if line == "/reset" {
        agent.reset();
        return print_json(&agent.get_belief());
    }
    if line == "/belief" {
        return print_json(&agent.get_belief());
    }
    print_json(&agent.query(line).await)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string(value).context("Failed to serialize response")?);
    Ok(())
}
