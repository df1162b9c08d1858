use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use orchestrator::report::{render_agents, render_report, render_snapshots};
use orchestrator::{Application, OutputFormat};
use orchestrator_config::AppConfig;
use orchestrator_core::AgentRegistry;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

fn cli() -> Command {
    Command::new("orchestrator")
        .version(env!("CARGO_PKG_VERSION"))
        .about("批量文件分析任务编排引擎")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，未指定时查找默认位置")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"])
                .global(true),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FORMAT")
                .help("结果输出格式")
                .value_parser(["text", "json"])
                .default_value("text")
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("提交文件分析作业并等待结束")
                .arg(
                    Arg::new("file")
                        .short('f')
                        .long("file")
                        .value_name("PATH")
                        .help("待分析文件，可重复指定")
                        .action(ArgAction::Append)
                        .required(true),
                )
                .arg(
                    Arg::new("agent")
                        .short('a')
                        .long("agent")
                        .value_name("KEY")
                        .help("分析代理，可重复指定")
                        .action(ArgAction::Append)
                        .required(true),
                ),
        )
        .subcommand(Command::new("agents").about("列出可用的分析代理及其输出结构"))
        .subcommand(
            Command::new("snapshot").about("查看持久化的作业快照").arg(
                Arg::new("job")
                    .short('j')
                    .long("job")
                    .value_name("ID")
                    .help("只显示指定作业"),
            ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let mut config = AppConfig::load(config_path).context("加载配置失败")?;
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.observability.log_format = format.clone();
    }
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;

    let output = OutputFormat::parse(
        matches
            .get_one::<String>("output")
            .map(String::as_str)
            .unwrap_or("text"),
    )?;

    match matches.subcommand() {
        Some(("run", sub)) => run(config, sub, output).await,
        Some(("agents", _)) => {
            print!("{}", render_agents(AgentRegistry::builtin().descriptors(), output)?);
            Ok(())
        }
        Some(("snapshot", sub)) => {
            let job_id = sub
                .get_one::<String>("job")
                .map(|id| Uuid::parse_str(id).with_context(|| format!("无效的作业ID: {id}")))
                .transpose()?;
            let app = Application::new(config)?;
            let snapshots = app.snapshots(job_id).await?;
            print!("{}", render_snapshots(&snapshots, output)?);
            Ok(())
        }
        _ => Err(anyhow::anyhow!("未知的子命令")),
    }
}

async fn run(config: AppConfig, matches: &ArgMatches, output: OutputFormat) -> Result<()> {
    let files: Vec<String> = matches
        .get_many::<String>("file")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let agents: Vec<String> = matches
        .get_many::<String>("agent")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    info!(files = files.len(), agents = agents.len(), "启动分析作业");
    let app = Application::new(config)?;
    let mut stdout = std::io::stdout();
    let report = app.run_job(files, agents, output, &mut stdout).await?;
    print!("{}", render_report(&report, output)?);
    info!(job_id = %report.job.id, status = %report.job.status, "分析作业结束");
    Ok(())
}

/// 初始化日志系统，RUST_LOG 优先于配置
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}
