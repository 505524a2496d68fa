use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use lib::chat::{ChatError, PaperContext};
use lib::engine::Engine;
use lib::llm::OllamaError;

#[derive(Parser)]
#[command(name = "lectern")]
#[command(about = "Lectern CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and default files (config, runtime bin/models dirs).
    Init {
        /// Config file path (default: LECTERN_CONFIG_PATH or ~/.lectern/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Bring the runtime up: install it if needed, start it, and download the default model.
    Up {
        /// Config file path (default: LECTERN_CONFIG_PATH or ~/.lectern/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Show whether the runtime is reachable and installed, and list local models.
    Status {
        /// Config file path (default: LECTERN_CONFIG_PATH or ~/.lectern/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// List locally available models.
    Models {
        /// Config file path (default: LECTERN_CONFIG_PATH or ~/.lectern/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Download a model if it is not already available.
    Pull {
        /// Model name, optionally tagged (e.g. "llama3.2:1b")
        model: String,

        /// Config file path (default: LECTERN_CONFIG_PATH or ~/.lectern/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Chat about one or more papers (interactive). Papers are plain text
    /// files; the filename stem is used as the title.
    Chat {
        /// Paper text files to attach to the session
        #[arg(value_name = "FILE")]
        files: Vec<PathBuf>,

        /// Config file path (default: LECTERN_CONFIG_PATH or ~/.lectern/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Model override for this run
        #[arg(long, short)]
        model: Option<String>,

        /// Session id to create or resume within this run
        #[arg(long, value_name = "ID")]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("lectern {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Init { config }) => run_init(config),
        Some(Commands::Up { config }) => run_up(config).await,
        Some(Commands::Status { config }) => run_status(config).await,
        Some(Commands::Models { config }) => run_models(config).await,
        Some(Commands::Pull { model, config }) => run_pull(config, model).await,
        Some(Commands::Chat {
            files,
            config,
            model,
            session,
        }) => run_chat(config, model, session, files).await,
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let (config, path) = lib::config::load_config(Some(path))?;
    let dir = lib::init::init_config_dir(&path, &config)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

fn print_progress(message: &str, percent: i32) {
    if percent >= 0 {
        println!("[{:>3}%] {}", percent, message);
    } else {
        println!("[ -- ] {}", message);
    }
}

async fn run_up(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let mut engine = Engine::new(config)?;
    engine
        .initialize(&mut print_progress)
        .await
        .context("runtime initialization failed")?;
    if engine.owns_runtime() {
        println!("runtime started (it stops when this process exits; rerun `lectern up` as needed)");
    }
    Ok(())
}

async fn run_status(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let engine = Engine::new(config)?;
    let running = engine.client().is_running().await;
    println!("runtime:   {}", if running { "running" } else { "not running" });
    println!(
        "installed: {} ({})",
        engine.paths().is_installed(),
        engine.paths().binary_path.display()
    );
    if running {
        let models = engine.client().list_models().await.unwrap_or_default();
        println!("models:    {}", models.len());
        for m in models {
            println!("  {}", m.name);
        }
    }
    Ok(())
}

async fn run_models(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let engine = Engine::new(config)?;
    let models = engine
        .client()
        .list_models()
        .await
        .context("listing models (is the runtime running? try `lectern up`)")?;
    for m in &models {
        let size = m.size.map(format_size).unwrap_or_default();
        let modified = m.modified_at.clone().unwrap_or_default();
        println!("{:<40} {:>10}  {}", m.name, size, modified);
    }
    if models.is_empty() {
        println!("no models installed; try `lectern pull llama3.2:1b`");
    }
    Ok(())
}

async fn run_pull(config_path: Option<PathBuf>, model: String) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let engine = Engine::new(config)?;
    lib::models::ensure_model(engine.client(), &model, &mut print_progress)
        .await
        .with_context(|| format!("pulling model {}", model))?;
    println!("model {} is available", model);
    Ok(())
}

async fn run_chat(
    config_path: Option<PathBuf>,
    model: Option<String>,
    session: Option<String>,
    files: Vec<PathBuf>,
) -> anyhow::Result<()> {
    use std::io;

    let (config, _) = lib::config::load_config(config_path)?;
    let mut engine = Engine::new(config)?;
    if let Some(m) = model {
        engine.sessions.set_model(m);
    }

    engine
        .initialize(&mut print_progress)
        .await
        .context("runtime initialization failed")?;

    let papers: Vec<PaperContext> = files
        .iter()
        .map(|f| load_paper(f))
        .collect::<anyhow::Result<_>>()?;
    let id = engine.sessions.start_chat(papers, session);
    println!(
        "session {} ({}) — /add <file>, /sessions, /switch <id>, /close <id>, /clear, /exit",
        id,
        engine
            .sessions
            .get_active_session()
            .map(|s| s.label.as_str())
            .unwrap_or("")
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }
        if let Some(rest) = input.strip_prefix('/') {
            if let Err(e) = handle_command(&mut engine, rest) {
                eprintln!("{}", e);
            }
            continue;
        }

        let mut on_token = |token: &str| {
            print!("{}", token);
            let _ = io::stdout().flush();
        };
        match engine.send_message(input, &mut on_token).await {
            Ok(_) => println!(),
            Err(ChatError::Llm(OllamaError::Cancelled)) => println!(),
            Err(e) => eprintln!("chat error: {}", e),
        }
    }

    engine.shutdown();
    Ok(())
}

fn handle_command(engine: &mut Engine, command: &str) -> anyhow::Result<()> {
    let (name, arg) = command
        .split_once(char::is_whitespace)
        .map(|(n, a)| (n, a.trim()))
        .unwrap_or((command, ""));
    match name {
        "add" => {
            if arg.is_empty() {
                anyhow::bail!("usage: /add <file>");
            }
            let paper = load_paper(Path::new(arg))?;
            engine.sessions.add_papers(vec![paper]);
            let session = engine
                .sessions
                .get_active_session()
                .context("no active session")?;
            println!("{} paper(s) attached", session.papers.len());
        }
        "sessions" => {
            for s in engine.sessions.get_all_sessions() {
                let marker = if s.id == engine.sessions.active_session_id() {
                    "*"
                } else {
                    " "
                };
                println!("{} {}  {}", marker, s.id, s.label);
            }
        }
        "switch" => {
            if !engine.sessions.switch_session(arg) {
                anyhow::bail!("no such session: {}", arg);
            }
        }
        "close" => {
            engine.sessions.close_session(arg);
            println!("active: {}", engine.sessions.active_session_id());
        }
        "clear" => engine.sessions.clear_chat(),
        other => anyhow::bail!("unknown command: /{}", other),
    }
    Ok(())
}

/// Read a plain text file as a paper; the filename stem stands in for the
/// title. Metadata-rich extraction is a separate concern upstream of the CLI.
fn load_paper(path: &Path) -> anyhow::Result<PaperContext> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading paper from {}", path.display()))?;
    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(PaperContext {
        title,
        text,
        ..Default::default()
    })
}

fn format_size(bytes: u64) -> String {
    const GB: u64 = 1024 * 1024 * 1024;
    const MB: u64 = 1024 * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.0} MB", bytes as f64 / MB as f64)
    } else {
        format!("{} B", bytes)
    }
}
