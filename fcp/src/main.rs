use anyhow::Result;
use clap::Parser;
use common::credential::CredentialSource;
use common::executor::{ToolOptions, TransferExecutor, TransferSpec};
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "fcp",
    version,
    about = "Copy files to many remote hosts in parallel",
    long_about = "`fcp` pushes the same files to every host in a host list, running one transfer
tool invocation (scp by default) per host with bounded parallelism.

A transfer only counts as successful if the tool exits 0 AND its output shows no
error (e.g. \"Permission denied\"). Failed hosts can be retried in bounded rounds.
Progress goes to stderr, the final report to stdout.

EXIT CODES:
    0 - All hosts succeeded
    1 - At least one host failed, or the configuration is invalid

EXAMPLES:
    # Copy a tarball to every host, 20 at a time
    fcp --hosts fleet.txt -p 20 release.tar.gz /opt/releases

    # Copy a directory as user deploy, retrying failures twice
    fcp --hosts fleet.txt -l deploy -r --retry 2 ./conf /etc/app

    # Authenticate with a password typed on the terminal
    fcp --hosts fleet.txt -A release.tar.gz /tmp"
)]
struct Args {
    /// Source paths followed by the destination path on the remote hosts
    #[arg(required = true, value_name = "SOURCE... DEST")]
    paths: Vec<String>,

    /// File listing the target hosts, one per line
    ///
    /// Surrounding whitespace is trimmed, blank lines and lines starting with `#` are
    /// ignored. Duplicates are transferred to once per occurrence.
    #[arg(short = 'H', long, value_name = "FILE", help_heading = "Fan-out")]
    hosts: std::path::PathBuf,

    // Transfer options
    /// Transfer tool to run for each host
    #[arg(
        long,
        default_value = "scp",
        value_name = "PATH",
        help_heading = "Transfer options"
    )]
    tool: std::path::PathBuf,

    /// Remote port
    #[arg(short = 'P', long, value_name = "PORT", help_heading = "Transfer options")]
    port: Option<u16>,

    /// Remote user, applied to hosts that do not name one (`user@host`)
    #[arg(short = 'l', long, value_name = "USER", help_heading = "Transfer options")]
    user: Option<String>,

    /// Identity (private key) file
    #[arg(short = 'i', long, value_name = "FILE", help_heading = "Transfer options")]
    identity: Option<std::path::PathBuf>,

    /// Copy directories recursively
    #[arg(short = 'r', long, help_heading = "Transfer options")]
    recursive: bool,

    /// Extra option passed to the tool as `-o OPTION` (can be specified multiple times)
    #[arg(
        short = 'o',
        long,
        value_name = "OPTION",
        action = clap::ArgAction::Append,
        help_heading = "Transfer options"
    )]
    tool_option: Vec<String>,

    /// Connection timeout in seconds for each transfer
    #[arg(
        short = 't',
        long,
        default_value = "10",
        value_name = "SECONDS",
        help_heading = "Transfer options"
    )]
    timeout: u64,

    // Fan-out
    /// Maximum number of concurrent transfers
    ///
    /// Applies to the initial pass only; retry rounds run all remaining hosts at once.
    #[arg(
        short = 'p',
        long,
        default_value = "10",
        value_name = "N",
        help_heading = "Fan-out"
    )]
    parallel: usize,

    /// Number of retry rounds for failed hosts
    #[arg(long, default_value = "0", value_name = "N", help_heading = "Fan-out")]
    retry: u32,

    /// How often to check for finished transfers
    ///
    /// This option accepts a human readable duration, e.g. "100ms", "1s".
    #[arg(
        long,
        default_value = "100ms",
        value_name = "DELAY",
        value_parser = humantime::parse_duration,
        help_heading = "Fan-out"
    )]
    poll_interval: std::time::Duration,

    /// Pause before each retry round
    #[arg(
        long,
        default_value = "2s",
        value_name = "DELAY",
        value_parser = humantime::parse_duration,
        help_heading = "Fan-out"
    )]
    retry_delay: std::time::Duration,

    /// Directory for per-host logs and status files (default: a fresh directory under $TMPDIR)
    #[arg(long, value_name = "DIR", help_heading = "Fan-out")]
    work_dir: Option<std::path::PathBuf>,

    /// Keep per-host logs after the run (implied by -v)
    #[arg(long, help_heading = "Fan-out")]
    keep_logs: bool,

    // Credentials
    /// Password to answer the tool's password prompts with
    ///
    /// Requires `expect`. Prefer --ask-password or the environment variable over putting the
    /// password on the command line.
    #[arg(
        long,
        env = common::credential::PASSWORD_ENV,
        hide_env_values = true,
        value_name = "PASSWORD",
        help_heading = "Credentials"
    )]
    password: Option<String>,

    /// Prompt for the password on the terminal
    #[arg(short = 'A', long, help_heading = "Credentials")]
    ask_password: bool,

    /// Program used to answer password prompts
    #[arg(
        long,
        default_value = "expect",
        value_name = "PATH",
        help_heading = "Credentials"
    )]
    driver: std::path::PathBuf,

    // Progress & output
    /// Set the type of progress display
    ///
    /// Options are: `ProgressBar` (animated progress bar), `TextUpdates` (one line per event,
    /// appropriate for logging), Auto (default, will choose between `ProgressBar` or
    /// `TextUpdates` depending on the type of terminal attached to stderr)
    #[arg(long, value_name = "TYPE", help_heading = "Progress & output")]
    progress_type: Option<common::ProgressType>,

    /// Verbose level (keeps logs): -v INFO / -vv DEBUG / -vvv TRACE and verbose tool output (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Quiet mode, don't report errors, progress or the final report
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Advanced settings
    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,
}

#[instrument(skip(args))]
async fn async_main(args: Args) -> Result<common::Report> {
    let credential_source =
        CredentialSource::from_options(args.password.clone(), args.ask_password)?;
    let Some((destination, sources)) = args.paths.split_last() else {
        return Err(common::ConfigError::MissingPaths.into());
    };
    if sources.is_empty() {
        return Err(common::ConfigError::MissingPaths.into());
    }
    for source in sources {
        if !tokio::fs::try_exists(source).await.unwrap_or(false) {
            return Err(common::ConfigError::MissingSource(source.into()).into());
        }
    }
    let hosts = common::read_host_list(&args.hosts).await?;
    let settings = common::FanoutSettings {
        max_parallel: args.parallel,
        retries: args.retry,
        poll_interval: args.poll_interval,
        retry_delay: args.retry_delay,
        keep_artifacts: args.keep_logs || args.verbose > 0,
    };
    settings.validate()?;
    let tool_options = ToolOptions {
        port: args.port,
        identity: args.identity.clone(),
        recursive: args.recursive,
        connect_timeout: args.timeout,
        batch_mode: credential_source == CredentialSource::None,
        tool_verbose: args.verbose >= 3,
        extra: args.tool_option.clone(),
    };
    tool_options.validate()?;
    let credential = tokio::task::spawn_blocking(move || credential_source.resolve()).await??;
    let spec = TransferSpec {
        tool: args.tool.clone(),
        options: tool_options.to_args(),
        sources: sources.iter().map(std::path::PathBuf::from).collect(),
        destination: destination.clone(),
        user: args.user.clone(),
    };
    let classifier = std::sync::Arc::new(common::classify::LogScanClassifier::new(&args.tool));
    let executor =
        TransferExecutor::new(spec, credential, classifier).with_driver(args.driver.clone());
    let work_dir = common::artifacts::WorkDir::create(args.work_dir.clone()).await?;
    let progress =
        common::progress::make_sink(args.progress_type.unwrap_or_default(), args.quiet);
    tracing::info!(
        "copying {} source(s) to {} host(s), {} at a time",
        sources.len(),
        hosts.len(),
        settings.max_parallel
    );
    common::fanout(hosts, &executor, &work_dir, &settings, progress.as_ref()).await
}

fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(error) => {
            // usage errors are configuration errors and share their exit code
            let code = if error.use_stderr() { 1 } else { 0 };
            if let Err(print_error) = error.print() {
                eprintln!("{print_error}");
            }
            std::process::exit(code);
        }
    };
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: !args.quiet,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    match common::run(output, runtime, func) {
        Some(report) if report.all_succeeded() => Ok(()),
        _ => std::process::exit(1),
    }
}
