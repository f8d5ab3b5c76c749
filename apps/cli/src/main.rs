use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use dsa_instructor_core_sdk::{
    composer,
    config::{FallbackMode, InstructorConfig},
    db,
    llm::Instructor,
    server, telemetry,
    transport::HttpTransport,
};

/**
 * \brief CLI 程序入口：DSA 讲师单次提问、调试与本地 relay 服务。
 */
#[derive(Parser, Debug)]
#[command(
    name = "dsa-instructor",
    version,
    about = "Data Structures & Algorithms instructor backed by Gemini"
)]
struct Cli {
    /** \brief 本次运行开启文件遥测日志 */
    #[arg(long, global = true, default_value_t = false)]
    enable_telemetry: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /**
     * \brief 将 API Key 保存到本地设置库。
     */
    Init {
        #[arg(long)]
        api_key: String,
        /** \brief 持久开启遥测 */
        #[arg(long, default_value_t = false)]
        telemetry: bool,
    },

    /**
     * \brief 提一个问题并打印回复。
     */
    Ask {
        #[arg(long, default_value = "What is DSA?")]
        prompt: String,
        /** \brief 先用短提示探测可用模型 */
        #[arg(long, default_value_t = false)]
        probe: bool,
    },

    /**
     * \brief 打印等价的 curl 命令（不执行，凭据已隐藏）。
     */
    Curl {
        #[arg(long)]
        prompt: String,
    },

    /**
     * \brief 列出当前凭据可见的模型。
     */
    Models,

    /**
     * \brief 启动本地 relay 服务并提供前端页面。
     */
    Serve {
        #[arg(long)]
        addr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let conn = db::open_default_db().context("open settings database failed")?;
    db::migrate(&conn).context("apply migrations failed")?;
    let telemetry_enabled = db::get_telemetry_enabled(&conn).unwrap_or(false)
        || telemetry::env_requested()
        || cli.enable_telemetry;
    telemetry::set_enabled(telemetry_enabled);

    match cli.command {
        Commands::Init {
            api_key,
            telemetry: persist_telemetry,
        } => {
            db::set_api_key(&conn, &api_key).context("save api key failed")?;
            db::set_telemetry_enabled(&conn, persist_telemetry)
                .context("save telemetry failed")?;
            telemetry::log_event("cli.init", "api key saved");
            println!(
                "Saved API key to local settings (telemetry={})",
                persist_telemetry
            );
        }
        Commands::Ask { prompt, probe } => {
            let mut config = load_config(&conn)?;
            if probe {
                config = config.with_mode(FallbackMode::Probe);
            }
            telemetry::log_event(
                "cli.ask",
                &format!("prompt_len={} mode={:?}", prompt.len(), config.mode),
            );
            let transport = HttpTransport::new(&config)?;
            let instructor = Instructor::new(config, transport);
            match instructor.ask(&prompt).await {
                Ok(result) => {
                    eprintln!("model: {}", result.model);
                    println!("{}", result.text);
                }
                Err(e) => {
                    telemetry::log_error("cli.ask", &e.to_string());
                    eprintln!("error: {}", e);
                    eprintln!("hint: {}", e.user_message());
                    std::process::exit(1);
                }
            }
        }
        Commands::Curl { prompt } => {
            let config = load_config(&conn)?;
            config.api_key()?;
            let request = composer::persona_request(&prompt)?;
            println!(
                "{}",
                composer::curl_preview(&config.api_base, config.models.first(), &request)?
            );
        }
        Commands::Models => {
            let config = load_config(&conn)?;
            let transport = HttpTransport::new(&config)?;
            let instructor = Instructor::new(config, transport);
            match instructor.list_models().await {
                Ok(models) => {
                    for model in models {
                        println!("{}", model);
                    }
                }
                Err(e) => {
                    eprintln!("error: {}", e);
                    eprintln!("hint: {}", e.user_message());
                    std::process::exit(1);
                }
            }
        }
        Commands::Serve { addr } => {
            let config = load_config(&conn)?;
            let addr = addr.unwrap_or_else(server::default_addr);
            server::run(&addr, config).await?;
        }
    }

    Ok(())
}

/**
 * \brief 解析配置：环境变量（含 .env）优先，其次本地设置库中的 API Key。
 */
fn load_config(conn: &db::Connection) -> Result<InstructorConfig> {
    let stored_key = db::get_api_key(conn).context("load api key failed")?;
    InstructorConfig::from_env(stored_key).context("invalid configuration")
}
