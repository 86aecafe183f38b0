//! 命令行入口

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use futures::StreamExt;

use epub2pdf::env::{core::LogLevel, EnvVar};
use epub2pdf::task::{JobOptions, JobRun, JobStatus, Orchestrator, OutputFormat, JobStore};
use epub2pdf::translation::{
    load_translation_config, BackendKind, TranslationConfig, TranslationResult,
};

/// 把 EPUB 转成 PDF，可选翻译成中文；也可翻译 PDF 文本
#[derive(Parser, Debug)]
#[command(name = "epub2pdf", version, about)]
struct Cli {
    /// 输入文件（.epub 或 .pdf）
    input: PathBuf,

    /// 把主要产物复制到这个路径
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 工作目录，保存检查点与任务记录
    #[arg(short = 't', long = "temp")]
    temp: Option<PathBuf>,

    /// 成功后保留检查点目录
    #[arg(short = 'k', long, default_value_t = false)]
    keep_temp: bool,

    /// 翻译成中文
    #[arg(long, default_value_t = false)]
    translate: bool,

    /// 主翻译后端：siliconflow | deepseek | google | simulate
    #[arg(long)]
    backend: Option<String>,

    /// 输出格式：pdf | html | text
    #[arg(long, default_value = "pdf")]
    format: OutputFormat,

    /// 译文后附原文
    #[arg(long, default_value_t = false)]
    bilingual: bool,

    /// 恢复指定任务
    #[arg(long, value_name = "JOB_ID")]
    resume: Option<String>,

    /// 每段最大字符数
    #[arg(long)]
    max_segment_chars: Option<usize>,

    /// 输出调试日志
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(JobStatus::Completed) => ExitCode::SUCCESS,
        Ok(status) => {
            eprintln!("任务结束于状态: {}", status);
            ExitCode::from(2)
        }
        Err(e) => {
            eprintln!("错误: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        "debug".to_string()
    } else {
        LogLevel::get().unwrap_or_else(|_| "info".to_string())
    };
    let level = level.parse().unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> TranslationResult<JobStatus> {
    let config = build_config(&cli)?;
    let orchestrator = Orchestrator::from_config(&config, JobStore::new())?;

    let JobRun {
        job_id,
        mut events,
        handle,
    } = match &cli.resume {
        Some(job_id) => {
            orchestrator
                .resume_job(job_id, Some(cli.input.clone()))
                .await?
        }
        None => {
            let options = JobOptions {
                translate: cli.translate,
                output: cli.format,
                bilingual: cli.bilingual,
                max_segment_chars: cli
                    .max_segment_chars
                    .unwrap_or(config.segment_max_chars),
                title: None,
            };
            orchestrator.run_job(cli.input.clone(), options)
        }
    };

    println!("任务编号: {}", job_id);
    while let Some(event) = events.next().await {
        let marker = if event.degraded { " [离线模拟]" } else { "" };
        println!("[{:>3}%] {}{}", event.percent, event.message, marker);
    }

    let job = handle.await?;
    match job.status {
        JobStatus::Completed => {
            for path in job.outputs.all() {
                println!("产物: {}", path.display());
            }

            if let (Some(target), Some(primary)) = (&cli.output, job.outputs.primary()) {
                tokio::fs::copy(primary, target).await?;
                println!("已复制到: {}", target.display());
            }

            if !cli.keep_temp {
                orchestrator.store().remove_job(&job.job_id, &[])?;
            }
        }
        JobStatus::Error => {
            if let Some(detail) = &job.error_detail {
                eprintln!("失败原因: {}", detail);
            }
            eprintln!("可以使用 --resume {} 继续", job.job_id);
        }
        JobStatus::Cancelled => {
            eprintln!("可以使用 --resume {} 继续", job.job_id);
        }
        _ => {}
    }

    Ok(job.status)
}

fn build_config(cli: &Cli) -> TranslationResult<TranslationConfig> {
    let mut config = load_translation_config();

    if let Some(backend) = &cli.backend {
        let kind: BackendKind = backend
            .parse()
            .map_err(epub2pdf::translation::TranslationError::InvalidInput)?;
        config.primary_backend = kind.to_string();
    }
    if let Some(temp) = &cli.temp {
        config.work_dir = temp.clone();
    }
    if let Some(max) = cli.max_segment_chars {
        config.segment_max_chars = max;
    }

    config.validate()?;
    Ok(config)
}
