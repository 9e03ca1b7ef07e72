use std::io::{self, BufRead, ErrorKind, Write};
use std::ops::ControlFlow;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use stylist_contracts::chat::{parse_intent, CHAT_HELP_COMMANDS};
use stylist_contracts::closet::ImageUpload;
use stylist_contracts::errors::StylistError;
use stylist_contracts::events::EventWriter;
use stylist_contracts::models::{ModelId, ModelRegistry};
use stylist_engine::{
    build_client, load_upload, AddImagesReport, ConfigOverrides, GenerationClient,
    SessionController, SessionPhase, StylistConfig, TurnOutcome,
};

#[derive(Debug, Parser)]
#[command(
    name = "stylist",
    version,
    about = "Outfit recommendations from photos of your own clothes"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive stylist chat.
    Chat(ChatArgs),
    /// Ask a single question and print the stylist's answer.
    Ask(AskArgs),
    /// List the supported models.
    Models,
}

#[derive(Debug, Args)]
struct SessionArgs {
    /// Photo of a clothing item (PNG or JPEG); repeatable.
    #[arg(long = "image", short = 'i')]
    images: Vec<PathBuf>,
    #[arg(long)]
    model: Option<String>,
    /// Gemini API key; defaults to GEMINI_API_KEY or GOOGLE_API_KEY.
    #[arg(long)]
    api_key: Option<String>,
    /// Append session events to this JSONL file.
    #[arg(long)]
    events: Option<PathBuf>,
    /// Answer offline without calling Gemini.
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    timeout_secs: Option<f64>,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[command(flatten)]
    session: SessionArgs,
}

#[derive(Debug, Parser)]
struct AskArgs {
    #[command(flatten)]
    session: SessionArgs,
    #[arg(long)]
    prompt: String,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("stylist error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Ask(args) => run_ask(args),
        Command::Models => {
            print_models();
            Ok(0)
        }
    }
}

fn load_config(args: &SessionArgs, fallback_on_unknown_model: bool) -> Result<StylistConfig> {
    let config = StylistConfig::from_env(ConfigOverrides {
        api_key: args.api_key.clone(),
        model: args.model.clone(),
        request_timeout_s: args.timeout_secs,
        fallback_on_unknown_model,
    })?;
    Ok(config)
}

fn open_session(args: &SessionArgs, config: &StylistConfig) -> SessionController {
    let session = SessionController::new(config.model.model.id);
    match args.events.as_ref() {
        Some(path) => session.with_events(&EventWriter::new(path, "stylist-cli")),
        None => session,
    }
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let args = args.session;
    let config = load_config(&args, true)?;
    if let Some(reason) = config.model.fallback_reason.as_deref() {
        println!("Model: {} ({reason})", config.model.model.name());
    }

    let mut session = open_session(&args, &config);
    if !args.images.is_empty() {
        add_image_paths(&mut session, &args.images);
    }

    let stdin = io::stdin();
    let mut input = stdin.lock();
    ChatRepl::new(config, args.dry_run, session).run(&mut input)
}

type Connect = fn(&StylistConfig, bool) -> Result<Box<dyn GenerationClient>, StylistError>;

/// Interactive chat over one session. Without a usable client the REPL stays
/// up in a locked state where everything but talking to the stylist works.
struct ChatRepl {
    config: StylistConfig,
    dry_run: bool,
    session: SessionController,
    client: Option<Box<dyn GenerationClient>>,
    connect: Connect,
}

impl ChatRepl {
    fn new(config: StylistConfig, dry_run: bool, session: SessionController) -> Self {
        Self::with_connect(config, dry_run, session, build_client)
    }

    fn with_connect(
        config: StylistConfig,
        dry_run: bool,
        session: SessionController,
        connect: Connect,
    ) -> Self {
        let mut repl = Self {
            config,
            dry_run,
            session,
            client: None,
            connect,
        };
        if dry_run || repl.config.has_api_key() {
            repl.reconnect();
        }
        repl
    }

    fn reconnect(&mut self) -> bool {
        match (self.connect)(&self.config, self.dry_run) {
            Ok(client) => {
                self.client = Some(client);
                true
            }
            Err(err) => {
                self.client = None;
                println!("{err}");
                false
            }
        }
    }

    fn set_api_key(&mut self, key: &str) {
        if self.dry_run {
            println!("Dry run: no API key is needed.");
            return;
        }
        if key.trim().is_empty() {
            println!("/key requires your Gemini API key");
            return;
        }
        self.config = self.config.clone().with_api_key(key);
        if self.reconnect() {
            println!("API key saved ✅");
        }
    }

    fn run(&mut self, input: &mut impl BufRead) -> Result<()> {
        if self.client.is_none() {
            println!("Get your key at aistudio.google.com");
            if let Some(key) = prompt_line(input, "Enter Gemini API Key: ")? {
                self.set_api_key(&key);
            }
        } else if !self.dry_run {
            println!("API key loaded ✅");
        }
        self.print_banner();

        let mut line = String::new();
        loop {
            print!("> ");
            io::stdout().flush()?;

            line.clear();
            let read = match input.read_line(&mut line) {
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            if read == 0 || self.handle_line(&line).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn print_banner(&self) {
        match self.client.as_deref() {
            Some(client) => println!(
                "👗 Digital Stylist ready ({}). Type /help for commands.",
                describe_client(client, self.session.model())
            ),
            None => println!("🔒 No Gemini API key yet. Enter it with /key YOUR_KEY; /help lists commands."),
        }
        if self.session.phase() == SessionPhase::Empty {
            println!("👋 Ready to style! Upload some photos of your clothes with /add to begin.");
        } else {
            print_closet(&self.session);
        }
    }

    fn handle_line(&mut self, line: &str) -> ControlFlow<()> {
        let intent = parse_intent(line.trim_end_matches(['\n', '\r']));
        match intent.action.as_str() {
            "noop" => {}
            "help" => {
                println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
                println!("Anything else is sent to the stylist, e.g. 'What can I wear for a business meeting?'");
            }
            "quit" => return ControlFlow::Break(()),
            "list_models" => print_models(),
            "set_api_key" => {
                let key = value_as_non_empty_string(intent.command_args.get("key")).unwrap_or_default();
                self.set_api_key(&key);
            }
            "set_model" => match value_as_non_empty_string(intent.command_args.get("model")) {
                Some(name) => match self.session.select_model(&name) {
                    Ok(model) => println!("Model set to {model}"),
                    Err(err) => println!("{err}"),
                },
                None => println!("Model: {}", self.session.model()),
            },
            "add_images" => {
                let paths = value_as_string_list(intent.command_args.get("paths"))
                    .into_iter()
                    .map(PathBuf::from)
                    .collect::<Vec<PathBuf>>();
                if paths.is_empty() {
                    println!("/add requires at least one image path");
                } else {
                    add_image_paths(&mut self.session, &paths);
                    print_closet(&self.session);
                }
            }
            "show_closet" => print_closet(&self.session),
            "show_history" => print_history(&self.session),
            "clear_closet" => match self.session.clear_closet() {
                Ok(removed) => println!("Removed {removed} photo(s) from your closet."),
                Err(err) => println!("{err}"),
            },
            "chat" => self.chat(intent.prompt.as_deref().unwrap_or_default()),
            _ => {
                let command =
                    value_as_non_empty_string(intent.command_args.get("command")).unwrap_or_default();
                println!("Unknown command /{command}. Type /help for commands.");
            }
        }
        ControlFlow::Continue(())
    }

    fn chat(&mut self, prompt: &str) {
        if self.session.phase() == SessionPhase::Empty {
            println!("Upload some photos of your clothes with /add before asking the stylist.");
            return;
        }
        let Some(client) = self.client.as_deref() else {
            println!("Enter your Gemini API key with /key YOUR_KEY before asking the stylist.");
            return;
        };
        println!("Stylist is analyzing images with {}...", self.session.model());
        match self.session.converse(client, prompt) {
            Ok(TurnOutcome::Replied(reply)) => println!("\n{}\n", reply.content),
            Ok(TurnOutcome::Failed { error, message }) => {
                eprintln!("{message}");
                if rejects_credential(&error) {
                    eprintln!("Gemini did not accept the API key; enter another with /key YOUR_KEY.");
                }
            }
            Err(err) => println!("{err}"),
        }
    }
}

/// Whether Gemini refused the request because of the key itself.
fn rejects_credential(error: &StylistError) -> bool {
    let StylistError::Generation(message) = error else {
        return false;
    };
    message.starts_with("Gemini request failed (401)")
        || message.starts_with("Gemini request failed (403)")
        || message.contains("API key not valid")
}

fn run_ask(args: AskArgs) -> Result<i32> {
    let prompt = args.prompt;
    let args = args.session;
    if args.images.is_empty() {
        bail!("ask requires at least one --image");
    }
    let config = load_config(&args, false)?;
    let client = build_client(&config, args.dry_run)?;
    let mut session = open_session(&args, &config);

    let report = add_image_paths(&mut session, &args.images);
    if report.closet_size == 0 {
        return Err(StylistError::EmptyCloset.into());
    }

    match session.converse(client.as_ref(), &prompt)? {
        TurnOutcome::Replied(reply) => {
            println!("{}", reply.content);
            Ok(0)
        }
        TurnOutcome::Failed { message, .. } => {
            eprintln!("{message}");
            Ok(1)
        }
    }
}

/// Reads every path, then hands the whole batch to the session so order is
/// kept and each bad file is reported on its own.
fn add_image_paths(session: &mut SessionController, paths: &[PathBuf]) -> AddImagesReport {
    let mut uploads: Vec<ImageUpload> = Vec::new();
    let mut unreadable: Vec<StylistError> = Vec::new();
    for path in paths {
        match load_upload(path) {
            Ok(upload) => uploads.push(upload),
            Err(err) => unreadable.push(err),
        }
    }

    let mut report = session.add_images(uploads);
    unreadable.append(&mut report.rejected);
    report.rejected = unreadable;

    for err in &report.rejected {
        eprintln!("Skipped: {err}");
    }
    if !report.added.is_empty() {
        println!(
            "Added {} photo(s); closet now holds {}.",
            report.added.len(),
            report.closet_size
        );
    }
    report
}

fn prompt_line(input: &mut impl BufRead, label: &str) -> Result<Option<String>> {
    print!("{label}");
    io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let trimmed = line.trim();
    Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
}

fn describe_client(client: &dyn GenerationClient, model: ModelId) -> String {
    format!("{} via {}", model, client.name())
}

fn print_models() {
    let registry = ModelRegistry::default();
    let default = ModelId::default();
    for spec in registry.list() {
        let marker = if spec.id == default { " (default)" } else { "" };
        if spec.transport_name == spec.name() {
            println!("{}{marker}", spec.name());
        } else {
            println!("{}{marker} -> {}", spec.name(), spec.transport_name);
        }
    }
}

fn print_closet(session: &SessionController) {
    let images = session.images();
    if images.is_empty() {
        println!("Your closet is empty.");
        return;
    }
    println!("👕 Your Digital Closet ({} photo(s))", images.len());
    for (idx, image) in images.iter().enumerate() {
        let (width, height) = image.dimensions();
        println!(
            "  {:>2}. {} [{} {}x{}, {}]",
            idx + 1,
            image.name(),
            image.format(),
            width,
            height,
            format_size(image.len())
        );
    }
}

fn print_history(session: &SessionController) {
    let transcript = session.transcript();
    if transcript.is_empty() {
        println!("No messages yet.");
        return;
    }
    for message in transcript {
        println!("[{}] {}", message.role, message.content);
    }
}

fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

fn value_as_non_empty_string(value: Option<&Value>) -> Option<String> {
    let raw = value
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}

fn value_as_string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
