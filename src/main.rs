use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use draftwise::ai::{
    ChatClient, GenerationActorHandle, GenerationCommand, GenerationEvent, Orchestrator,
    spawn_generation_actor,
};
use draftwise::config::Config;
use draftwise::credentials::ApiKeyStore;
use draftwise::mail::{
    ClientFingerprints, FileBody, MailBody, ThreadParser, combine_messages_for_context,
    detect_signature, extract_plain_text, extract_signature, signature_confidence,
};
use draftwise::summarize::estimate_compression_ratio;
use draftwise::tokens::{check_limit, model_limit};

fn setup_logging() {
    use std::fs::OpenOptions;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,draftwise=debug"));

    // Try to create a log file in the config directory
    let log_file = Config::ensure_dirs()
        .and_then(|_| Config::config_dir())
        .ok()
        .map(|dir| dir.join("draftwise.log"))
        .and_then(|path| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .ok()
        });

    if let Some(file) = log_file {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false),
            )
            .init();
    } else {
        // Fallback to stderr if file logging fails
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn print_usage() {
    eprintln!(
        r#"draftwise - Draft email replies from the thread you are answering

Usage: draftwise <command> [options]

Commands:
    generate <file> <prompt...> [--model M] [--out PATH]
                Draft a reply to the thread in <file> (.html or .eml) and
                write the body with the reply above the signature to PATH
                (default: <file stem>.reply.html). Ctrl-C cancels.
    parse <file>
                Show the detected email client and the messages of the thread
    signature <file>
                Show where the signature starts and how confident that is
    tokens <file> [--model M]
                Count the thread's tokens against the model's context window
    setup       Store the API key
    help        Show this help message

Configuration file: ~/.config/draftwise/config.toml
"#
    );
}

/// Remove `--name VALUE` from `args` and return VALUE.
fn take_option(args: &mut Vec<String>, name: &str) -> Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| a == name) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        anyhow::bail!("{} needs a value", name);
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

fn file_arg(args: &[String]) -> Result<PathBuf> {
    args.first()
        .map(PathBuf::from)
        .context("Missing <file> argument")
}

async fn read_body(path: &Path) -> Result<String> {
    let body = FileBody::new(path, FileBody::default_destination(path));
    Ok(body.get_body().await?)
}

fn thread_parser(config: &Config) -> ThreadParser {
    ThreadParser::new(ClientFingerprints::new(
        &config.detection.outlook_separator_colors,
    ))
}

async fn run_generate(mut args: Vec<String>) -> Result<()> {
    let model = take_option(&mut args, "--model")?;
    let out = take_option(&mut args, "--out")?;
    let source = file_arg(&args)?;
    let prompt = args[1..].join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("Missing <prompt> argument");
    }

    let mut config = Config::load()?;
    if let Some(model) = model {
        config.ai.model = model;
    }
    let api_key = ApiKeyStore::in_config_dir().get_api_key(&config.ai)?;

    let client = ChatClient::new(
        &config.ai.base_url,
        api_key,
        config.ai.max_response_tokens,
        config.ai.temperature,
    );
    let orchestrator = Arc::new(Orchestrator::new(client, &config));
    let destination = out
        .map(PathBuf::from)
        .unwrap_or_else(|| FileBody::default_destination(&source));
    let body = Arc::new(FileBody::new(&source, &destination));

    let GenerationActorHandle {
        cmd_tx,
        mut event_rx,
    } = spawn_generation_actor(orchestrator, body);

    eprintln!("Drafting reply with {}...", config.ai.model);
    cmd_tx
        .send(GenerationCommand::Generate {
            request_id: 1,
            prompt,
        })
        .await
        .context("Generation task stopped")?;

    let event = tokio::select! {
        event = event_rx.recv() => event,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nCancelling...");
            let _ = cmd_tx.send(GenerationCommand::Cancel).await;
            event_rx.recv().await
        }
    };
    let _ = cmd_tx.send(GenerationCommand::Shutdown).await;

    match event {
        Some(GenerationEvent::Generated { response, .. }) => {
            println!("{}", response.generated_text);
            eprintln!();
            eprintln!("Written to {}", destination.display());
            if response.was_summarized {
                eprintln!("The thread was summarized to fit the model's context window.");
            }
            let tokens = response
                .tokens_used
                .map(|u| format!(", {} tokens", u.total_tokens))
                .unwrap_or_default();
            let cost = response
                .estimated_cost
                .map(|c| format!(", ~${:.4}", c))
                .unwrap_or_default();
            eprintln!("{:.1}s{}{}", response.elapsed.as_secs_f64(), tokens, cost);
            Ok(())
        }
        Some(GenerationEvent::Failed { error, .. }) => {
            eprintln!("Error: {}", error);
            if error.is_retryable() {
                eprintln!("Run the same command again to retry.");
            }
            std::process::exit(1);
        }
        None => anyhow::bail!("Generation task stopped unexpectedly"),
    }
}

async fn run_parse(args: Vec<String>) -> Result<()> {
    let path = file_arg(&args)?;
    let html = read_body(&path).await?;
    let thread = thread_parser(&Config::load()?).parse(&html);

    println!("Client: {}", thread.client);
    println!("Messages: {}", thread.len());
    for (i, message) in thread.messages.iter().enumerate() {
        println!();
        println!(
            "[{}] From: {}  Date: {}",
            i + 1,
            message.from.as_deref().unwrap_or("-"),
            message.date.as_deref().unwrap_or("-")
        );
        println!("{}", message.content);
    }
    Ok(())
}

async fn run_signature(args: Vec<String>) -> Result<()> {
    let path = file_arg(&args)?;
    let html = read_body(&path).await?;

    match detect_signature(&html) {
        Some(offset) => {
            println!(
                "Signature at byte {} (confidence {:.2})",
                offset,
                signature_confidence(&html)
            );
            println!();
            println!("{}", extract_plain_text(&extract_signature(&html)));
        }
        None => println!("No signature found"),
    }
    Ok(())
}

async fn run_tokens(mut args: Vec<String>) -> Result<()> {
    let model = take_option(&mut args, "--model")?;
    let path = file_arg(&args)?;
    let config = Config::load()?;
    let model = model.unwrap_or_else(|| config.ai.model.clone());

    let html = read_body(&path).await?;
    let thread = thread_parser(&config).parse(&html);
    let text = combine_messages_for_context(&thread.messages);
    let limit = model_limit(&model);
    let check = check_limit(&text, limit, &model);

    println!("Model: {}", model);
    println!("Messages: {}", thread.len());
    println!("Tokens: {}", check.token_count);
    println!("Limit: {}", limit);
    println!("Remaining: {}", check.tokens_remaining);
    println!(
        "Estimated compression ratio: {:.2}",
        estimate_compression_ratio(&text)
    );
    if !check.within_limit {
        println!("Over the limit: the thread will be summarized before generation.");
    }
    Ok(())
}

fn run_setup() -> Result<()> {
    use std::io::{self, Write};

    println!("Draftwise Setup");
    println!("===============\n");

    let config_path = Config::config_path()?;
    if !config_path.exists() {
        Config::default().save()?;
        println!("Default configuration written to {}", config_path.display());
    }

    print!("API key: ");
    io::stdout().flush()?;
    let api_key = rpassword_read()?;
    println!();
    if api_key.is_empty() {
        println!("No key entered, nothing stored.");
        return Ok(());
    }

    let store = ApiKeyStore::in_config_dir();
    store.set_api_key(&api_key)?;

    let config = Config::load()?;
    if store.get_api_key(&config.ai).is_ok() {
        println!("API key stored successfully.");
    } else {
        eprintln!("Warning: Failed to store the API key.");
        return Err(anyhow::anyhow!("Credential storage failed"));
    }

    println!("\nSetup complete! Run 'draftwise generate <file> <prompt>' to draft a reply.");
    Ok(())
}

fn rpassword_read() -> Result<String> {
    use std::io;

    // Disable echo
    let _guard = DisableEcho::new()?;

    let mut secret = String::new();
    io::stdin().read_line(&mut secret)?;
    Ok(secret.trim().to_string())
}

struct DisableEcho {
    #[cfg(unix)]
    original: libc::termios,
}

impl DisableEcho {
    #[cfg(unix)]
    fn new() -> Result<Self> {
        use std::mem::MaybeUninit;
        use std::os::unix::io::AsRawFd;

        let fd = std::io::stdin().as_raw_fd();
        let mut termios = MaybeUninit::<libc::termios>::uninit();

        unsafe {
            if libc::tcgetattr(fd, termios.as_mut_ptr()) != 0 {
                anyhow::bail!("Failed to get terminal attributes");
            }
            let original = termios.assume_init();
            let mut new = original;
            new.c_lflag &= !libc::ECHO;
            if libc::tcsetattr(fd, libc::TCSANOW, &new) != 0 {
                anyhow::bail!("Failed to set terminal attributes");
            }
            Ok(Self { original })
        }
    }

    #[cfg(not(unix))]
    fn new() -> Result<Self> {
        Ok(Self {})
    }
}

#[cfg(unix)]
impl Drop for DisableEcho {
    fn drop(&mut self) {
        use std::os::unix::io::AsRawFd;
        let fd = std::io::stdin().as_raw_fd();
        unsafe {
            libc::tcsetattr(fd, libc::TCSANOW, &self.original);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() {
        print_usage();
        std::process::exit(1);
    }
    let command = args.remove(0);

    match command.as_str() {
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        "setup" => run_setup(),
        "generate" | "parse" | "signature" | "tokens" => {
            setup_logging();
            match command.as_str() {
                "generate" => run_generate(args).await,
                "parse" => run_parse(args).await,
                "signature" => run_signature(args).await,
                _ => run_tokens(args).await,
            }
        }
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            print_usage();
            std::process::exit(1);
        }
    }
}
