use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use mc_avail::check::{Client, DEFAULT_API_BASE};
use mc_avail::dispatch::BatchPolicy;
use mc_avail::run::{RunConfig, Summary, check_concurrency, check_length, run};
use mc_avail::sink::{DEFAULT_AVAILABLE_PATH, DEFAULT_RESULTS_PATH, ResultSink};

#[derive(Parser)]
#[command(
    name = "mc-avail",
    about = "Check random Minecraft usernames for availability",
    after_help = "With --count, --length and --concurrency all given, performs a single \
                  run and exits. Otherwise prompts for the missing values and offers to \
                  run again after each round.\n\n\
                  Results come from the public Mojang profile API and are not always \
                  accurate; names reported available may still be blocked or reserved."
)]
struct Cli {
    /// How many random names to check
    #[arg(short = 'n', long)]
    count: Option<usize>,

    /// Length of each generated name (3-16)
    #[arg(short, long)]
    length: Option<usize>,

    /// Maximum number of lookups in flight (1-512)
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// File every result line is appended to
    #[arg(long, value_name = "PATH", default_value = DEFAULT_RESULTS_PATH)]
    results: PathBuf,

    /// File available names are appended to
    #[arg(long, value_name = "PATH", default_value = DEFAULT_AVAILABLE_PATH)]
    available: PathBuf,

    /// Per-request timeout in seconds
    #[arg(long, value_name = "SECS", default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Profile lookup endpoint; the name is appended as the last path segment
    #[arg(long, value_name = "URL", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Stop the run at the first lookup that gets no answer
    #[arg(long)]
    abort_on_error: bool,

    /// Do not echo result lines to stdout
    #[arg(short, long)]
    quiet: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Enable debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn policy(&self) -> BatchPolicy {
        if self.abort_on_error {
            BatchPolicy::AbortOnError
        } else {
            BatchPolicy::ContinueOnError
        }
    }
}

fn main() -> ExitCode {
    reset_sigpipe();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match (cli.count, cli.length, cli.concurrency) {
        (Some(count), Some(length), Some(concurrency)) => {
            let config = match RunConfig::new(count, length, concurrency) {
                Ok(config) => config.with_policy(cli.policy()),
                Err(e) => {
                    eprintln!("error: {e}");
                    return ExitCode::from(2);
                }
            };
            match execute(&cli, &config) {
                Ok(_) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("error: {e}");
                    ExitCode::from(1)
                }
            }
        }
        _ => {
            if let Err(e) = check_given(&cli) {
                eprintln!("error: {e}");
                return ExitCode::from(2);
            }
            interactive(&cli)
        }
    }
}

/// Validate the values passed as flags before prompting for the rest, since
/// the prompt loop never asks for a value that was given.
fn check_given(cli: &Cli) -> Result<(), String> {
    let checks: [(Option<usize>, fn(usize) -> Result<(), String>); 3] = [
        (cli.count, positive),
        (cli.length, valid_length),
        (cli.concurrency, valid_concurrency),
    ];
    for (value, validate) in checks {
        if let Some(value) = value {
            validate(value)?;
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "mc_avail=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

#[cfg(unix)]
fn reset_sigpipe() {
    // SAFETY: runs before any other thread exists and only restores the default handler.
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    }
}

#[cfg(not(unix))]
fn reset_sigpipe() {}

/// One run with its own client, so the connection pool lives exactly as long as the run.
fn execute(cli: &Cli, config: &RunConfig) -> Result<Summary, Box<dyn Error>> {
    let client = Client::with_settings(&cli.api_base, Duration::from_secs(cli.timeout));
    let sink = ResultSink::open(&cli.results, &cli.available)?.with_echo(!cli.quiet);
    let summary = run(&client, config, &sink)?;

    if cli.json {
        println!("{}", serde_json::to_string(&summary)?);
    } else {
        println!(
            "查询完成，找到 {} 个可用 ID，结果已保存至 {}",
            summary.available_count,
            sink.available_path().display()
        );
        if summary.error_count > 0 {
            println!("{} 个 ID 查询出错，未写入结果文件", summary.error_count);
        }
    }
    Ok(summary)
}

fn interactive(cli: &Cli) -> ExitCode {
    let stdin = io::stdin();
    let mut input = stdin.lock();

    loop {
        let config = match prompt_config(&mut input, cli) {
            Ok(Some(config)) => config,
            Ok(None) => return ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("error: reading stdin: {e}");
                return ExitCode::from(2);
            }
        };

        if let Err(e) = execute(cli, &config) {
            println!("发生错误！：{e}");
        }

        match prompt_line(&mut input, "\n是否继续查询？(y/n): ") {
            Ok(Some(answer)) if answer.trim().eq_ignore_ascii_case("y") => {
                println!("即将要开始下一轮查询...");
                thread::sleep(Duration::from_secs(1));
            }
            Ok(_) => {
                println!("程序已退出，再见!");
                return ExitCode::SUCCESS;
            }
            Err(e) => {
                eprintln!("error: reading stdin: {e}");
                return ExitCode::from(2);
            }
        }
    }
}

const COUNT_PROMPT: &str = "\n请输入要查询的 ID 数量: ";
const LENGTH_PROMPT: &str = "请输入要生成的 ID 长度 (3~16位): ";
const CONCURRENCY_PROMPT: &str = "请输入脚本同时请求查询次数的最大数量（推荐 50~100）: ";

/// Collect a valid configuration, taking values given on the command line as-is.
///
/// Returns `None` on end of input.
fn prompt_config<R: BufRead>(input: &mut R, cli: &Cli) -> io::Result<Option<RunConfig>> {
    loop {
        let Some(count) = value_or_prompt(input, cli.count, COUNT_PROMPT, positive)? else {
            return Ok(None);
        };
        let Some(length) = value_or_prompt(input, cli.length, LENGTH_PROMPT, valid_length)? else {
            return Ok(None);
        };
        let Some(concurrency) =
            value_or_prompt(input, cli.concurrency, CONCURRENCY_PROMPT, valid_concurrency)?
        else {
            return Ok(None);
        };

        match RunConfig::new(count, length, concurrency) {
            Ok(config) => return Ok(Some(config.with_policy(cli.policy()))),
            Err(e) => println!("输入不符合要求！: {e}"),
        }
    }
}

fn positive(n: usize) -> Result<(), String> {
    if n == 0 {
        Err("必须大于 0".to_string())
    } else {
        Ok(())
    }
}

fn valid_length(n: usize) -> Result<(), String> {
    check_length(n).map_err(|_| "ID 长度必须在 3 到 16 之间。".to_string())
}

fn valid_concurrency(n: usize) -> Result<(), String> {
    check_concurrency(n).map(|_| ()).map_err(|e| e.to_string())
}

fn value_or_prompt<R: BufRead>(
    input: &mut R,
    given: Option<usize>,
    prompt: &str,
    validate: fn(usize) -> Result<(), String>,
) -> io::Result<Option<usize>> {
    if let Some(value) = given {
        return Ok(Some(value));
    }
    loop {
        let Some(line) = prompt_line(input, prompt)? else {
            return Ok(None);
        };
        match line.trim().parse::<usize>() {
            Ok(value) => match validate(value) {
                Ok(()) => return Ok(Some(value)),
                Err(msg) => println!("输入不符合要求！: {msg}"),
            },
            Err(e) => println!("输入不符合要求！: {e}"),
        }
    }
}

/// Print `prompt` and read one line; `None` at end of input.
fn prompt_line<R: BufRead>(input: &mut R, prompt: &str) -> io::Result<Option<String>> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("mc-avail").chain(args.iter().copied()))
    }

    #[test]
    fn prompts_until_length_is_valid() {
        let mut input = Cursor::new("10\n2\nabc\n5\n8\n");
        let config = prompt_config(&mut input, &cli(&[])).unwrap().unwrap();
        assert_eq!(config.candidate_count(), 10);
        assert_eq!(config.id_length(), 5);
        assert_eq!(config.max_concurrency().get(), 8);
    }

    #[test]
    fn flags_skip_their_prompts() {
        let mut input = Cursor::new("4\n");
        let config = prompt_config(&mut input, &cli(&["-n", "7", "--length", "6"]))
            .unwrap()
            .unwrap();
        assert_eq!(config.candidate_count(), 7);
        assert_eq!(config.id_length(), 6);
        assert_eq!(config.max_concurrency().get(), 4);
    }

    #[test]
    fn end_of_input_yields_none() {
        let mut input = Cursor::new("5\n");
        assert!(prompt_config(&mut input, &cli(&[])).unwrap().is_none());
    }

    #[test]
    fn impossible_count_restarts_the_round() {
        let mut input = Cursor::new("50000\n3\n10\n5\n3\n10\n");
        let config = prompt_config(&mut input, &cli(&[])).unwrap().unwrap();
        assert_eq!(config.candidate_count(), 5);
    }

    #[test]
    fn invalid_length_flag_is_rejected_up_front() {
        assert!(check_given(&cli(&["-l", "2"])).is_err());
        assert!(check_given(&cli(&["-c", "0"])).is_err());
        assert!(check_given(&cli(&["-c", "513"])).is_err());
        assert!(check_given(&cli(&["-n", "5", "-l", "16"])).is_ok());
        assert!(check_given(&cli(&[])).is_ok());
    }

    #[test]
    fn concurrency_prompt_enforces_cap() {
        let mut input = Cursor::new("10\n4\n1000\n20\n");
        let config = prompt_config(&mut input, &cli(&[])).unwrap().unwrap();
        assert_eq!(config.max_concurrency().get(), 20);
    }

    #[test]
    fn abort_flag_sets_policy() {
        assert_eq!(cli(&["--abort-on-error"]).policy(), BatchPolicy::AbortOnError);
        assert_eq!(cli(&[]).policy(), BatchPolicy::ContinueOnError);
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let parsed = Cli::try_parse_from(["mc-avail", "--timeout", "0"]);
        assert!(parsed.is_err());
    }
}
