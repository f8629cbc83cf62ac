use amy::config::{self, Config, API_KEY_ENV, VALID_LOG_LEVELS};
use amy::confirm::TerminalConfirmation;
use amy::environment::EnvironmentContext;
use amy::executor::ShellExecutor;
use amy::history::FailureHistoryStore;
use amy::llm::{ModelError, OpenAiClient};
use amy::session::{SessionContext, SessionController, SessionOptions};
use amy::{explain, logging, update};
use anyhow::{anyhow, Context, Result};
use clap::builder::PossibleValuesParser;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "amy",
    about = "Turn plain-English requests into shell commands, then run them with your OK",
    version
)]
struct Args {
    /// What you want to do, e.g. `amy show disk usage`
    #[arg(required_unless_present_any = ["setup", "config"])]
    intent: Vec<String>,

    /// Run the generated command without asking for confirmation
    #[arg(short, long)]
    force: bool,

    /// Ask the model to explain the command before running it
    #[arg(short, long)]
    explain: bool,

    /// Print the command with an explanation and exit without running it
    #[arg(long, conflicts_with_all = ["force", "explain"])]
    explain_only: bool,

    /// Log verbosity for this run (overrides the saved setting)
    #[arg(long, value_name = "LEVEL", value_parser = PossibleValuesParser::new(VALID_LOG_LEVELS))]
    log_level: Option<String>,

    /// Store your model API key
    #[arg(long, conflicts_with = "config")]
    setup: bool,

    /// Open the interactive settings menu
    #[arg(long)]
    config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::load();

    let level = logging::effective_level(args.log_level.as_deref(), &config.log_level).to_string();
    let log_file = if config.file_logging {
        Config::log_file_path()
    } else {
        None
    };
    logging::init(&level, log_file.as_deref());

    if args.setup {
        config::setup_api_key_interactive().map_err(|e| anyhow!(e))?;
        return Ok(());
    }
    if args.config {
        return run_config_menu(&mut config);
    }

    let intent = args.intent.join(" ").trim().to_string();
    if intent.is_empty() {
        anyhow::bail!("Nothing to do. Usage: amy [OPTIONS] <INTENT>...");
    }

    let client = match OpenAiClient::from_config(&config) {
        Ok(client) => client,
        Err(ModelError::MissingApiKey) => {
            let api_key = config::setup_api_key_interactive().map_err(|e| anyhow!(e))?;
            OpenAiClient::new(api_key, &config)?
        }
        Err(err) => return Err(err.into()),
    };
    let environment = EnvironmentContext::detect()?;
    let history = FailureHistoryStore::at_default_location()
        .context("Could not determine config directory for command history")?;

    if args.explain_only {
        let proposal = explain::explain_command(&client, &environment, &history.load(), &intent)
            .await
            .map_err(|e| anyhow!("Failed to explain command: {}", e))?;
        print!("{}", explain::render_report(&intent, &environment, &proposal));
        return Ok(());
    }

    let update_check = update::spawn_check();

    let context = SessionContext {
        environment,
        model: Arc::new(client),
        confirmation: Arc::new(TerminalConfirmation),
        executor: Arc::new(ShellExecutor),
        history,
    };
    let mut session = SessionController::new(
        context,
        SessionOptions {
            force: args.force,
            explain: args.explain,
        },
    );
    let result = session.run(&intent).await;

    if let Some(info) = update::take_if_finished(update_check).await {
        update::print_notice(&info);
    }

    result?;
    Ok(())
}

/// Read one trimmed line; `None` on EOF
fn prompt_line(prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn save_config(config: &Config) {
    match config.save() {
        Ok(()) => println!("  + Saved to {}", Config::config_location()),
        Err(e) => eprintln!("  Warning: {}", e),
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", amy::util::truncate_str(key, 3), tail)
}

fn show_config(config: &Config) {
    let key_status = match config.get_api_key() {
        Some(key) => {
            let source = if std::env::var(API_KEY_ENV).is_ok_and(|v| !v.trim().is_empty()) {
                API_KEY_ENV.to_string()
            } else {
                amy::keyring::credentials_store_label().to_string()
            };
            format!("{} (from {})", mask_key(&key), source)
        }
        None => "not set (run amy --setup)".to_string(),
    };

    println!();
    println!("  Config file:   {}", Config::config_location());
    println!("  Log level:     {}", config.log_level);
    println!(
        "  File logging:  {}",
        if config.file_logging { "on" } else { "off" }
    );
    if let Some(path) = Config::log_file_path() {
        println!("  Log file:      {}", path.display());
    }
    println!("  Model:         {}", config.model);
    println!("  Endpoint:      {}", config.base_url);
    println!("  API key:       {}", key_status);
}

fn run_config_menu(config: &mut Config) -> Result<()> {
    loop {
        println!();
        println!("  amy settings");
        println!("  1. Change log level (current: {})", config.log_level);
        println!(
            "  2. {} file logging",
            if config.file_logging { "Disable" } else { "Enable" }
        );
        println!("  3. Update API key");
        println!("  4. Show current configuration");
        println!("  5. Exit");

        let Some(choice) = prompt_line("  Choose an option [1-5]: ")? else {
            return Ok(());
        };

        match choice.as_str() {
            "1" => {
                let prompt = format!("  New log level ({}): ", VALID_LOG_LEVELS.join("/"));
                let Some(level) = prompt_line(&prompt)? else {
                    return Ok(());
                };
                let level = level.to_lowercase();
                if config::is_valid_log_level(&level) {
                    config.log_level = level;
                    save_config(config);
                } else {
                    eprintln!("  Invalid log level: {}", level);
                }
            }
            "2" => {
                config.file_logging = !config.file_logging;
                save_config(config);
            }
            "3" => {
                if let Err(e) = config::setup_api_key_interactive() {
                    eprintln!("  Warning: {}", e);
                }
            }
            "4" => show_config(config),
            "5" | "q" | "" => return Ok(()),
            other => eprintln!("  Unknown option: {}", other),
        }
    }
}
