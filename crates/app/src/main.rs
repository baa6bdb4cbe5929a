use std::fmt;
use std::sync::Arc;

use poll_core::model::{AnswerId, Symbol};
use poll_core::{BootstrapPhase, CODE_LENGTH};
use services::{
    BootstrapService, BootstrapServiceError, HttpGatewayConfig, HttpPollGateway, PollGateway,
    PollServices, QuestionService, VoteOutcome,
};
use storage::Storage;
use tracing::{info, warn};

mod logging;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidSymbol { raw: String },
    WrongSymbolCount { got: usize },
    InvalidAnswerId { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidSymbol { raw } => write!(f, "not a symbol: {raw}"),
            ArgsError::WrongSymbolCount { got } => {
                write!(f, "join needs exactly {CODE_LENGTH} symbols, got {got}")
            }
            ArgsError::InvalidAnswerId { raw } => write!(f, "invalid --vote value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- join <s1> <s2> <s3> <s4> [options]");
    eprintln!("  cargo run -p app -- resume [options]");
    eprintln!("  cargo run -p app -- leave  [--db <sqlite_url>]");
    eprintln!();
    eprintln!("Symbols are names or hex digits:");
    let names = Symbol::ALL
        .iter()
        .map(|symbol| format!("{}={}", symbol.hex_digit(), symbol.name()))
        .collect::<Vec<_>>();
    eprintln!("  {}", names.join(" "));
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --api <url>         backend base url");
    eprintln!("  --db <sqlite_url>   token store (default sqlite://poll.sqlite3)");
    eprintln!("  --vote <answer-id>  select an answer of the first question");
    eprintln!("  --verbose           debug logging");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  POLL_API_BASE_URL, POLL_DB_URL, RUST_LOG");
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Join(Vec<Symbol>),
    Resume,
    Leave,
}

#[derive(Debug)]
struct Args {
    command: Command,
    api_url: Option<String>,
    db_url: String,
    vote: Option<AnswerId>,
    verbose: bool,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Option<Self>, ArgsError> {
        let command = match args.next().as_deref() {
            None | Some("--help" | "-h") => return Ok(None),
            Some("join") => Command::Join(Vec::new()),
            Some("resume") => Command::Resume,
            Some("leave") => Command::Leave,
            Some(other) => return Err(ArgsError::UnknownArg(other.to_string())),
        };

        let mut parsed = Self {
            command,
            api_url: None,
            db_url: std::env::var("POLL_DB_URL")
                .ok()
                .map_or_else(|| "sqlite://poll.sqlite3".into(), normalize_sqlite_url),
            vote: None,
            verbose: false,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--api" => parsed.api_url = Some(require_value(&mut args, "--api")?),
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--vote" => {
                    let value = require_value(&mut args, "--vote")?;
                    let id = value
                        .parse::<AnswerId>()
                        .map_err(|_| ArgsError::InvalidAnswerId { raw: value.clone() })?;
                    parsed.vote = Some(id);
                }
                "--verbose" | "-v" => parsed.verbose = true,
                "--help" | "-h" => return Ok(None),
                flag if flag.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => match &mut parsed.command {
                    Command::Join(symbols) => {
                        let symbol = arg
                            .parse::<Symbol>()
                            .map_err(|_| ArgsError::InvalidSymbol { raw: arg.clone() })?;
                        symbols.push(symbol);
                    }
                    Command::Resume | Command::Leave => return Err(ArgsError::UnknownArg(arg)),
                },
            }
        }

        if let Command::Join(symbols) = &parsed.command
            && symbols.len() != CODE_LENGTH
        {
            return Err(ArgsError::WrongSymbolCount { got: symbols.len() });
        }
        Ok(Some(parsed))
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn gateway(api_url: Option<&str>) -> Result<Arc<dyn PollGateway>, Box<dyn std::error::Error>> {
    let config = match api_url {
        Some(url) => HttpGatewayConfig::new(url)?,
        None => HttpGatewayConfig::from_env()?,
    };
    let gateway = HttpPollGateway::new(config)?;
    info!(base_url = %gateway.base_url(), "using backend");
    Ok(Arc::new(gateway))
}

/// Drops the stored token when the backend no longer accepts it.
async fn forget_rejected_token(bootstrap: &BootstrapService, rejected: bool) {
    if !rejected {
        return;
    }
    warn!("token rejected by the backend, leaving session");
    if let Err(err) = bootstrap.leave().await {
        warn!(%err, "could not clear stored token");
    }
}

async fn join(
    bootstrap: &BootstrapService,
    symbols: &[Symbol],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut phase = bootstrap.phase();
    for symbol in symbols {
        phase = bootstrap.add_symbol(*symbol).await?;
    }
    match phase {
        BootstrapPhase::Ready => Ok(()),
        BootstrapPhase::Rejected => {
            let snapshot = bootstrap.snapshot();
            let code = snapshot.submitted_code().map_or("", |code| code.as_str());
            Err(format!("code {code} was refused").into())
        }
        BootstrapPhase::AwaitingSession => {
            // One more attempt before giving up on a transient failure.
            match bootstrap.retry_session_lookup().await? {
                BootstrapPhase::Ready => Ok(()),
                _ => Err("session lookup failed".into()),
            }
        }
        other => Err(format!("join stopped in phase {other:?}").into()),
    }
}

async fn show_poll(
    bootstrap: &BootstrapService,
    questions: &QuestionService,
    vote: Option<AnswerId>,
) -> Result<(), Box<dyn std::error::Error>> {
    let poll = match bootstrap.resolve_poll().await {
        Ok(poll) => poll,
        Err(err) => {
            let rejected =
                matches!(&err, BootstrapServiceError::Gateway(inner) if inner.is_token_invalid());
            forget_rejected_token(bootstrap, rejected).await;
            return Err(err.into());
        }
    };
    println!("{} ({})", poll.title, poll.poll_ref());

    if let Err(err) = questions.refresh_questions().await {
        forget_rejected_token(bootstrap, questions.token_invalid()).await;
        return Err(err.into());
    }
    let list = questions.questions();
    for question in &list {
        println!("  [{}] {}", question.index_in_poll, question.title);
    }
    let Some(first) = list.into_iter().next() else {
        println!("  (no questions yet)");
        return Ok(());
    };

    if let Err(err) = questions.set_current(first.clone()).await {
        forget_rejected_token(bootstrap, questions.token_invalid()).await;
        return Err(err.into());
    }
    let votes = questions.votes();
    if let Some(answer_id) = vote {
        match votes.select(answer_id).await? {
            VoteOutcome::Confirmed => info!(answer = %answer_id, "vote recorded"),
            VoteOutcome::RolledBack => warn!(answer = %answer_id, "vote refused"),
            VoteOutcome::Superseded => {}
        }
    }

    println!();
    println!("{}", first.title);
    for answer in votes.answers() {
        let mark = if answer.selected { 'x' } else { ' ' };
        println!("  [{mark}] {} ({})", answer.title, answer.id);
    }
    if let Some(min) = votes.missing_answers() {
        println!("  check at least {min} answers");
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = match Args::parse(std::env::args().skip(1)) {
        Ok(Some(args)) => args,
        Ok(None) => {
            print_usage();
            return Ok(());
        }
        Err(err) => {
            eprintln!("{err}");
            print_usage();
            return Err(err.into());
        }
    };

    logging::init_logging(args.verbose)?;

    prepare_sqlite_file(&args.db_url)?;
    let storage = Storage::sqlite(&args.db_url).await?;
    let services = PollServices::from_storage(gateway(args.api_url.as_deref())?, &storage);
    let bootstrap = services.bootstrap();

    match &args.command {
        Command::Leave => {
            bootstrap.leave().await?;
            println!("left session");
            return Ok(());
        }
        Command::Resume => {
            if !bootstrap.resume().await? {
                return Err("no stored session, use `join` first".into());
            }
            if bootstrap.phase() != BootstrapPhase::Ready {
                bootstrap.retry_session_lookup().await?;
            }
            if bootstrap.phase() != BootstrapPhase::Ready {
                // Stored token is most likely stale.
                bootstrap.leave().await?;
                return Err("stored session is no longer valid".into());
            }
        }
        Command::Join(symbols) => join(&bootstrap, symbols).await?,
    }

    let questions = services.open_joined_poll()?;
    show_poll(&bootstrap, &questions, args.vote).await
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Option<Args>, ArgsError> {
        Args::parse(args.iter().map(|arg| (*arg).to_string()))
    }

    #[test]
    fn join_takes_names_and_hex_digits() {
        let args = parse(&["join", "heart", "A", "sun", "F", "--vote", "12"])
            .unwrap()
            .unwrap();
        assert_eq!(
            args.command,
            Command::Join(vec![Symbol::Heart, Symbol::Fish, Symbol::Sun, Symbol::Music])
        );
        assert_eq!(args.vote, Some(AnswerId::new(12)));
    }

    #[test]
    fn join_requires_full_code() {
        let err = parse(&["join", "heart", "A"]).unwrap_err();
        assert!(matches!(err, ArgsError::WrongSymbolCount { got: 2 }));
    }

    #[test]
    fn rejects_unknown_symbol_and_stray_arguments() {
        assert!(matches!(
            parse(&["join", "heart", "dragon"]).unwrap_err(),
            ArgsError::InvalidSymbol { .. }
        ));
        assert!(matches!(
            parse(&["resume", "extra"]).unwrap_err(),
            ArgsError::UnknownArg(_)
        ));
        assert!(matches!(
            parse(&["leave", "--db"]).unwrap_err(),
            ArgsError::MissingValue { flag: "--db" }
        ));
    }

    #[test]
    fn help_and_empty_print_usage() {
        assert!(parse(&[]).unwrap().is_none());
        assert!(parse(&["--help"]).unwrap().is_none());
    }

    #[test]
    fn db_flag_is_normalized() {
        let args = parse(&["leave", "--db", "sqlite:/tmp/poll.db"]).unwrap().unwrap();
        assert_eq!(args.db_url, "sqlite:///tmp/poll.db");
    }
}
