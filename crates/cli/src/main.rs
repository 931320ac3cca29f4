mod checks;
mod config;
mod error;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use runtime::{App, LlmBackend, ScriptedBackend, interface::read_interface, prompt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{Config, ConfigError};
use error::{Error, Result};

const DEFAULT_QUESTION: &str = "what should I wear today?";
const DEFAULT_EXEC_QUESTION: &str = "What's the temperature outside?";
const VERBOSE_FILTER: &str = "warn,codecall=debug,runtime=debug,sandbox=debug,tools=debug,policy=debug";

#[derive(Parser)]
#[command(name = "codecall")]
#[command(about = "Answer questions by having a model write code against local tools", long_about = None)]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Config file (defaults to codecall.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,

    /// Question to answer
    question: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question
    Ask {
        /// Question to answer
        question: Vec<String>,
    },
    /// Answer questions read from stdin until quit
    Chat,
    /// Run the built-in battery of example questions
    Check,
    /// Clean and run model output without calling the model
    Exec {
        /// File holding the model output (stdin when omitted)
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Question passed to the generated function
        #[arg(short, long)]
        question: Option<String>,
    },
    /// Print the system prompt
    Prompt,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::discover(cli.config.as_deref())?.with_env(|name| std::env::var(name).ok());

    match cli.command {
        Some(Commands::Ask { question }) => cmd_ask(&config, &question),
        Some(Commands::Chat) => cmd_chat(&config),
        Some(Commands::Check) => cmd_check(&config),
        Some(Commands::Exec { file, question }) => cmd_exec(&config, file.as_deref(), question),
        Some(Commands::Prompt) => {
            println!("{}", prompt::build_system_prompt(&read_interface(config.interface_file())));
            Ok(())
        }
        None => cmd_ask(&config, &cli.question),
    }
}

fn question_text(words: &[String]) -> String {
    if words.is_empty() {
        DEFAULT_QUESTION.to_string()
    } else {
        words.join(" ")
    }
}

fn cmd_ask(config: &Config, words: &[String]) -> Result<()> {
    let app = config.app(config.backend()?);
    let answer = app.answer(&question_text(words))?;
    println!("Answer: {answer}");
    Ok(())
}

fn cmd_chat(config: &Config) -> Result<()> {
    let backend = config.backend()?;
    info!(%backend, "starting chat");
    let app = config.app(backend);
    println!("codecall v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'quit' or Ctrl+D to exit.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    chat_loop(&app, stdin.lock(), &mut stdout)
}

fn chat_loop<B: LlmBackend>(app: &App<B>, mut input: impl BufRead, out: &mut impl Write) -> Result<()> {
    loop {
        write!(out, "> ")?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "quit" || question == "exit" {
            break;
        }

        match app.answer(question) {
            Ok(answer) => writeln!(out, "Answer: {answer}\n")?,
            Err(e) => eprintln!("Error: {e}\n"),
        }
    }
    Ok(())
}

fn cmd_check(config: &Config) -> Result<()> {
    let app = config.app(config.backend()?);
    let mut stdout = io::stdout();
    let failed = checks::run(&app, checks::CHECKS, &mut stdout)?;
    if failed > 0 {
        return Err(Error::ChecksFailed {
            failed,
            total: checks::CHECKS.len(),
        });
    }
    Ok(())
}

fn cmd_exec(config: &Config, file: Option<&Path>, question: Option<String>) -> Result<()> {
    let output = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            eprintln!("Paste the model output, then end with 'END' on its own line or EOF:");
            read_output(io::stdin().lock())?
        }
    };
    if output.trim().is_empty() {
        println!("No LLM output provided.");
        return Ok(());
    }
    let question = question
        .filter(|q| !q.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_EXEC_QUESTION.to_string());

    let result = match config.backend() {
        Ok(backend) => config.app(backend).run_output(&output, &question),
        Err(ConfigError::MissingAuth) => {
            warn!("no API key configured; call_llm will fail");
            config.app(ScriptedBackend::default()).run_output(&output, &question)
        }
        Err(e) => return Err(e.into()),
    };
    println!("Result: {result}");
    Ok(())
}

/// Read model output up to EOF or a line containing only `END`.
fn read_output(input: impl BufRead) -> io::Result<String> {
    let mut lines = Vec::new();
    for line in input.lines() {
        let line = line?;
        if line.trim() == "END" {
            break;
        }
        lines.push(line);
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &str = "def answer_user_question(question):\n    return 'echo: ' + question\n";

    #[test]
    fn cli_parses_bare_question() {
        let cli = Cli::try_parse_from(["codecall", "is", "it", "cold?"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(question_text(&cli.question), "is it cold?");
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["codecall", "--verbose", "check"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Some(Commands::Check)));

        let cli = Cli::try_parse_from([
            "codecall", "exec", "--file", "out.txt", "--question", "hot?", "--config", "c.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("c.toml")));
        let Some(Commands::Exec { file, question }) = cli.command else {
            panic!("expected exec");
        };
        assert_eq!(file, Some(PathBuf::from("out.txt")));
        assert_eq!(question.as_deref(), Some("hot?"));
    }

    #[test]
    fn verbose_filter_names_the_binary_crate() {
        let krate = module_path!().split("::").next().unwrap_or_default();
        assert_eq!(krate, "codecall");
        assert!(VERBOSE_FILTER.contains(&format!("{krate}=debug")));
    }

    #[test]
    fn default_question() {
        assert_eq!(question_text(&[]), "what should I wear today?");
    }

    #[test]
    fn read_output_stops_at_end_marker() {
        let input = "```python\nx = 1\n```\n  END  \nignored\n";
        assert_eq!(read_output(input.as_bytes()).unwrap(), "```python\nx = 1\n```");
        assert_eq!(read_output("a\nb".as_bytes()).unwrap(), "a\nb");
    }

    #[test]
    fn chat_loop_answers_until_quit() {
        let app = App::new(ScriptedBackend::new([PROGRAM, PROGRAM]));
        let input = "hello\n\nworld\nquit\nnever asked\n";
        let mut out = Vec::new();
        chat_loop(&app, input.as_bytes(), &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("Answer: echo: hello\n"), "{out}");
        assert!(out.contains("Answer: echo: world\n"), "{out}");
        assert_eq!(app.backend().requests().len(), 2);
    }

    #[test]
    fn chat_loop_ends_at_eof() {
        let app = App::new(ScriptedBackend::default());
        let mut out = Vec::new();
        chat_loop(&app, "".as_bytes(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "> ");
    }
}
