//! SipControl - 节制饮酒陪伴助手
//!
//! 入口：初始化日志、按配置创建 Agent 组件，进入命令行菜单（交互会话 / 预设场景）。
//! 可选的第一个参数为额外的 TOML 配置文件路径。

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use sipcontrol::agent::{create_agent_components, process_message, AgentComponents, Session};
use sipcontrol::config::{load_config, AppConfig};
use sipcontrol::core::ConversationState;
use sipcontrol::memory::Message;
use sipcontrol::observability;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

type Input = Lines<BufReader<Stdin>>;

const SCENARIOS: [(&str, &str); 4] = [
    ("stress", "I'm really stressed at work and had several drinks yesterday to calm down."),
    ("social", "My friends keep pressuring me to drink at parties."),
    ("boredom", "I'm just sitting at home bored and thinking about having a drink."),
    ("positive", "I managed to avoid drinking at the party last night!"),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    let components = create_agent_components(&cfg).context("Failed to create agent")?;

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    loop {
        println!("\n{} Menu:", cfg.app.name);
        println!("1. Interactive Session");
        println!("2. Run Test Scenarios");
        println!("3. Exit");
        let Some(choice) = prompt(&mut input, "\nSelect an option (1-3): ").await? else {
            break;
        };
        match choice.as_str() {
            "1" => interactive_session(&components, &mut input).await?,
            "2" => run_scenarios(&components).await,
            "3" => {
                println!("\nExiting. Goodbye!");
                break;
            }
            _ => println!("\nInvalid choice. Please select 1-3."),
        }
    }
    Ok(())
}

/// 打印提示并读一行；EOF 返回 None
async fn prompt(input: &mut Input, text: &str) -> anyhow::Result<Option<String>> {
    print!("{}", text);
    std::io::stdout().flush()?;
    Ok(input.next_line().await?.map(|l| l.trim().to_string()))
}

async fn interactive_session(components: &AgentComponents, input: &mut Input) -> anyhow::Result<()> {
    println!("\n=== Interactive session ===");
    println!("Type 'quit' or 'exit' to end the session");
    println!("Type 'new' to start a new conversation thread");

    let mut session = Session::new("cli_user");
    let mut history: Vec<Message> = Vec::new();

    while let Some(line) = prompt(input, "\nYou: ").await? {
        if line.is_empty() {
            continue;
        }
        match line.to_lowercase().as_str() {
            "quit" | "exit" => {
                println!("\n[Debug] Token usage: {}", components.token_usage_summary());
                println!("\nEnding session. Goodbye!");
                return Ok(());
            }
            "new" => {
                session.renew();
                history.clear();
                println!("\n=== Starting new conversation ===");
                continue;
            }
            _ => {}
        }

        tracing::debug!(session_id = %session.id, history = history.len(), "running workflow");
        match process_message(components, history.clone(), &line, &session).await {
            Ok(state) => {
                print_result(&state);
                show_progress(components, &session);
                history = state.messages;
            }
            Err(e) => {
                println!("\nError occurred: {}", e);
                println!("Please try again or type 'new' to start a fresh conversation.");
            }
        }
    }
    Ok(())
}

async fn run_scenarios(components: &AgentComponents) {
    println!("\n=== Running Test Scenarios ===");
    for (name, message) in SCENARIOS {
        println!("\n--- Testing {} scenario ---", name.to_uppercase());
        println!("User: {}", message);
        let session = Session::new(format!("scenario_{}", name));
        match process_message(components, Vec::new(), message, &session).await {
            Ok(state) => {
                print_result(&state);
                println!("\nTrace:\n{}", state.debug_log.render());
            }
            Err(e) => println!("\nError occurred: {}", e),
        }
        println!("\n{}", "=".repeat(50));
    }
    println!("\n[Debug] Token usage: {}", components.token_usage_summary());
}

fn print_result(state: &ConversationState) {
    if let Some(last) = state.last_message() {
        println!("\nAI Assistant: {}", last.content);
    }
    if let Some(trigger) = state.trigger_type {
        println!("[Debug] Detected trigger: {}", trigger.as_str());
    }
    if let Some(met) = state.met_goal {
        println!("[Debug] Goal status: {}", if met { "Met" } else { "Not met" });
    }
}

fn show_progress(components: &AgentComponents, session: &Session) {
    let Some(store) = &components.store else {
        return;
    };
    match store.latest_daily_log(&session.user_id) {
        Ok(Some(log)) => println!("[Debug] Streak: {} day(s) on track", log.streak),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "failed to read progress"),
    }
}
