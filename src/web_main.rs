//! Web 服务器主程序入口

use epub2pdf::env::{core::LogLevel, generate_env_docs, EnvVar};
use epub2pdf::translation::load_translation_config;
use epub2pdf::web::{WebConfig, WebServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let level = LogLevel::get()
        .unwrap_or_else(|_| "info".to_string())
        .parse()
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    let args: Vec<String> = std::env::args().collect();
    let mut web_config = WebConfig::default();

    // 简单的命令行参数解析
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    web_config.bind_addr = args[i + 1].clone();
                    i += 2;
                } else {
                    eprintln!("Error: --bind requires an address");
                    std::process::exit(1);
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    web_config.port = args[i + 1].parse().unwrap_or_else(|_| {
                        eprintln!("Error: Invalid port number");
                        std::process::exit(1);
                    });
                    i += 2;
                } else {
                    eprintln!("Error: --port requires a port number");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("Error: Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    web_config.validate()?;

    let translation_config = load_translation_config();
    tracing::info!(
        "翻译后端: {}，工作目录: {}，输出目录: {}",
        translation_config.primary_backend,
        translation_config.work_dir.display(),
        translation_config.output_dir.display()
    );

    let server = WebServer::new(web_config, translation_config);
    server.start().await?;

    Ok(())
}

fn print_help() {
    println!("epub2pdf Web Server");
    println!();
    println!("USAGE:");
    println!("    epub2pdf-web [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -b, --bind <ADDRESS>     Bind address [default: 127.0.0.1]");
    println!("    -p, --port <PORT>        Port number [default: 3030]");
    println!("    -h, --help               Print help information");
    println!();
    println!("EXAMPLES:");
    println!("    epub2pdf-web");
    println!("    epub2pdf-web --bind 0.0.0.0 --port 3000");
    println!();
    print!("{}", generate_env_docs());
}
