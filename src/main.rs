use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use prpilot_core::{OutputFormat, PrPilotConfig, ReviewIntent, Service, CONFIG_FILE_NAME};
use prpilot_review::automation::{
    BatchReviewResult, CreatePrResult, ReviewOutcome, SheetActionResult, Stats, StatusInfo,
    TrackingResult, WorkflowResult,
};
use prpilot_review::{Automation, CreatePrRequest, SheetAction};

#[derive(Parser)]
#[command(
    name = "prpilot",
    version,
    about = "Pull request autopilot: create, AI-review, and track approvals",
    long_about = "prpilot automates the pull request lifecycle on GitHub.\n\n\
                   It opens PRs with AI-written titles and descriptions, reviews them with an\n\
                   OpenAI-compatible model, and tracks approvals in a Google Sheet.\n\n\
                   Examples:\n  \
                     prpilot create-pr -b feature/login      Open a PR with generated content\n  \
                     prpilot review-prs --all                Review every open PR\n  \
                     prpilot track-approvals --sync          Reconcile approvals into the sheet\n  \
                     prpilot auto-workflow -c -i 1800        Review and track every 30 minutes\n  \
                     prpilot serve --port 8000               Start the dashboard API\n  \
                     prpilot setup                           Check setup and environment"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .prpilot.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text  Human-readable summaries (default)\n  \
                         json  Machine-readable JSON with camelCase keys"
    )]
    format: OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    verbose: bool,

    /// When to use colors
    #[arg(long, global = true, default_value = "auto")]
    color: ColorChoice,
}

#[derive(Subcommand)]
enum Command {
    /// Create a pull request, generating content with AI
    #[command(long_about = "Create a pull request for a branch.\n\n\
        When no title is given, or a prompt is supplied, the title, description, labels,\n\
        and reviewers are generated from the branch's commits and changed files. If\n\
        generation fails, a default title and description are used.\n\n\
        --auto-merge squash-merges the new PR only when no reviewers are requested;\n\
        a PR that asks for review is never merged automatically, and nothing is\n\
        merged without the flag.\n\n\
        Examples:\n  prpilot create-pr -b feature/login\n  prpilot create-pr -b fix/crash -t 'Fix crash on empty input'\n  prpilot create-pr -b docs -p 'Mention the migration guide' --auto-merge")]
    CreatePr {
        /// Branch with the changes
        #[arg(short, long)]
        branch: String,
        /// PR title (generated when omitted)
        #[arg(short, long)]
        title: Option<String>,
        /// Extra instructions for content generation
        #[arg(short, long)]
        prompt: Option<String>,
        /// Branch to merge into (default: github.base_branch)
        #[arg(long)]
        base: Option<String>,
        /// Merge right away, but only if no reviewers are requested
        #[arg(long)]
        auto_merge: bool,
    },
    /// Run the AI review on one or all open pull requests
    #[command(long_about = "Run the AI review on pull requests.\n\n\
        Reviews are stored in the local review history and, with --auto-comment,\n\
        posted to the PR as comments. The tracking sheet row is marked reviewed.\n\n\
        Examples:\n  prpilot review-prs -n 42\n  prpilot review-prs --all --auto-comment=false")]
    ReviewPrs {
        /// Pull request number
        #[arg(short = 'n', long)]
        pr_number: Option<u64>,
        /// Review every open pull request
        #[arg(short, long, conflicts_with = "pr_number")]
        all: bool,
        /// Post AI comments to the PR (default: workflow.auto_comment)
        #[arg(long, num_args = 0..=1, default_missing_value = "true")]
        auto_comment: Option<bool>,
    },
    /// Reconcile approvals for all pull requests
    #[command(long_about = "Reconcile approvals for all pull requests.\n\n\
        A PR counts as approved once it is merged or has any APPROVED review.\n\
        With --sync, each PR gets a sheet row (added if missing) with its status\n\
        and approval count.\n\n\
        Examples:\n  prpilot track-approvals\n  prpilot track-approvals --sync")]
    TrackApprovals {
        /// Write approvals to the tracking sheet
        #[arg(long)]
        sync: bool,
        /// Alias of --sync
        #[arg(long, hide = true)]
        update: bool,
    },
    /// Review open PRs and track approvals, once or continuously
    #[command(long_about = "Review open PRs and track approvals.\n\n\
        Runs once by default. With --continuous, repeats every --interval seconds until\n\
        interrupted with Ctrl-C; a failed run is retried after workflow.retry_delay_secs.\n\n\
        Examples:\n  prpilot auto-workflow\n  prpilot auto-workflow -c -i 1800")]
    AutoWorkflow {
        /// Seconds between runs (default: workflow.interval_secs)
        #[arg(short, long)]
        interval: Option<u64>,
        /// Keep running until interrupted
        #[arg(short, long)]
        continuous: bool,
    },
    /// Manage the tracking sheet
    #[command(long_about = "Manage the tracking sheet.\n\n\
        Actions:\n  setup  Write the header row\n  sync   Add and refresh a row per pull request\n  clear  Remove all data rows\n\n\
        Examples:\n  prpilot update-sheet --action setup\n  prpilot update-sheet --action sync")]
    UpdateSheet {
        /// sync, clear or setup
        #[arg(long, default_value = "sync")]
        action: SheetAction,
    },
    /// Submit a review, refusing changes to an approved PR
    #[command(long_about = "Submit a review on a pull request.\n\n\
        Once a PR is approved (or merged), only comments are accepted; approve and\n\
        request-changes are refused without contacting GitHub.\n\n\
        Examples:\n  prpilot submit-review -n 42 --action approve\n  prpilot submit-review -n 42 --action request-changes --body 'Please add tests'")]
    SubmitReview {
        /// Pull request number
        #[arg(short = 'n', long)]
        pr_number: u64,
        /// comment, approve or request-changes
        #[arg(long, default_value = "comment")]
        action: ReviewIntent,
        /// Review body
        #[arg(long)]
        body: Option<String>,
    },
    /// Delete a pending review
    DeleteReview {
        /// Pull request number
        #[arg(short = 'n', long)]
        pr_number: u64,
        /// Review id
        #[arg(long)]
        review_id: u64,
    },
    /// Show repository and tracking status
    Status,
    /// Show sheet and review history statistics
    Stats,
    /// Start the HTTP API for the dashboard
    #[command(long_about = "Start the HTTP API for the dashboard.\n\n\
        Serves JSON endpoints under /api with open CORS. Stops on Ctrl-C.\n\n\
        Example:\n  prpilot serve --host 0.0.0.0 --port 8000")]
    Serve {
        /// Address to bind (default: server.host)
        #[arg(long)]
        host: Option<String>,
        /// Port to bind (default: server.port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Check your prpilot setup and environment
    #[command(long_about = "Check your prpilot setup and environment.\n\n\
        Verifies the config file, GitHub token and repository, LLM key, sheet\n\
        credentials, and review store, then probes the configured services.\n\
        Use --format json for machine-readable output.")]
    Setup,
    /// Create a default .prpilot.toml configuration file
    #[command(long_about = "Create a default .prpilot.toml configuration file.\n\n\
        Generates a commented-out template with all available options.\n\
        Fails if .prpilot.toml already exists.")]
    Init,
    /// Generate shell completion scripts
    #[command(hide = true)]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Clone, PartialEq, Eq, ValueEnum)]
enum ColorChoice {
    /// Auto-detect based on terminal
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

fn init_tracing(verbose: bool, serving: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if verbose {
        "warn,prpilot=debug,prpilot_core=debug,prpilot_review=debug,prpilot_server=debug,tower_http=debug"
    } else if serving {
        "warn,prpilot_review=info,prpilot_server=info,tower_http=info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn print_welcome(use_color: bool) {
    let version = env!("CARGO_PKG_VERSION");

    if use_color {
        println!("\x1b[1m\x1b[33m\u{2708}\x1b[0m \x1b[1mprpilot\x1b[0m v{version}: pull requests on autopilot\n");

        println!("Quick start:");
        println!("  \x1b[36mprpilot init\x1b[0m                  Create a .prpilot.toml config file");
        println!("  \x1b[36mprpilot setup\x1b[0m                 Check credentials and connectivity");
        println!("  \x1b[36mprpilot create-pr -b <branch>\x1b[0m Open a PR with AI-written content\n");

        println!("All commands:");
        println!("  \x1b[32mcreate-pr\x1b[0m        Create a PR, generating content with AI");
        println!("  \x1b[32mreview-prs\x1b[0m       AI review of one or all open PRs");
        println!("  \x1b[32mtrack-approvals\x1b[0m  Reconcile approvals, optionally into the sheet");
        println!("  \x1b[32mauto-workflow\x1b[0m    Review and track, once or continuously");
        println!("  \x1b[32mupdate-sheet\x1b[0m     Set up, sync, or clear the tracking sheet");
        println!("  \x1b[32msubmit-review\x1b[0m    Comment, approve, or request changes");
        println!("  \x1b[32mdelete-review\x1b[0m    Delete a pending review");
        println!("  \x1b[32mstatus\x1b[0m           Repository and tracking status");
        println!("  \x1b[32mstats\x1b[0m            Sheet and review history statistics");
        println!("  \x1b[32mserve\x1b[0m            Start the dashboard API");
        println!("  \x1b[32msetup\x1b[0m            Check your setup and environment");
        println!("  \x1b[32minit\x1b[0m             Create default configuration\n");
    } else {
        println!("prpilot v{version}: pull requests on autopilot\n");

        println!("Quick start:");
        println!("  prpilot init                  Create a .prpilot.toml config file");
        println!("  prpilot setup                 Check credentials and connectivity");
        println!("  prpilot create-pr -b <branch> Open a PR with AI-written content\n");

        println!("All commands:");
        println!("  create-pr        Create a PR, generating content with AI");
        println!("  review-prs       AI review of one or all open PRs");
        println!("  track-approvals  Reconcile approvals, optionally into the sheet");
        println!("  auto-workflow    Review and track, once or continuously");
        println!("  update-sheet     Set up, sync, or clear the tracking sheet");
        println!("  submit-review    Comment, approve, or request changes");
        println!("  delete-review    Delete a pending review");
        println!("  status           Repository and tracking status");
        println!("  stats            Sheet and review history statistics");
        println!("  serve            Start the dashboard API");
        println!("  setup            Check your setup and environment");
        println!("  init             Create default configuration\n");
    }

    println!("Run 'prpilot <command> --help' for details.");
}

fn spinner(message: &str) -> Option<indicatif::ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_style(
        indicatif::ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    Some(pb)
}

/// Finish the spinner with "Done" or "Failed" depending on `result`.
fn settle<T, E>(pb: Option<indicatif::ProgressBar>, result: std::result::Result<T, E>) -> std::result::Result<T, E> {
    if let Some(pb) = pb {
        pb.finish_with_message(if result.is_ok() { "Done" } else { "Failed" });
    }
    result
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

fn print_created(result: &CreatePrResult) {
    println!("Created PR #{}: {}", result.number, result.title);
    println!("  {}", result.url);
    if !result.labels.is_empty() {
        println!("  labels:    {}", result.labels.join(", "));
    }
    if !result.reviewers.is_empty() {
        println!("  reviewers: {}", result.reviewers.join(", "));
    }
    if !result.ai_generated {
        println!("  content:   provided or default (not AI-generated)");
    }
    if result.tracked {
        println!("  tracked in sheet");
    }
    if result.merged {
        println!("  auto-merged");
    }
}

fn print_outcome(outcome: &ReviewOutcome) {
    let review = &outcome.review;
    println!(
        "PR #{} {}: score {:.1}/10 ({} ms)",
        outcome.pr_number, outcome.title, review.score, outcome.processing_time_ms
    );
    println!("  {}", review.summary);
    for issue in &review.issues {
        println!("  issue: {issue}");
    }
    for suggestion in &review.suggestions {
        println!("  suggestion: {suggestion}");
    }
    if outcome.comments_posted > 0 {
        println!("  {} comments posted", outcome.comments_posted);
    }
}

fn print_batch(result: &BatchReviewResult) {
    for outcome in &result.reviewed {
        print_outcome(outcome);
    }
    for failure in &result.failures {
        println!("PR #{} failed: {}", failure.pr_number, failure.error);
    }
    println!(
        "\n{} reviewed, {} comments posted, {} failed",
        result.reviewed_count,
        result.comments_count,
        result.failures.len()
    );
}

fn print_tracking(result: &TrackingResult) {
    for record in &result.records {
        let approval = &record.approval;
        let by = if approval.approved_by.is_empty() {
            String::new()
        } else {
            format!(" by {}", approval.approved_by.join(", "))
        };
        println!(
            "  #{:<5} {:<7} {:<9} {}{}  {}",
            record.pr_number,
            record.state.to_string(),
            if approval.approved { "approved" } else { "pending" },
            approval.approvals_cell(),
            by,
            record.title
        );
    }
    for failure in &result.failures {
        println!("  #{:<5} failed: {}", failure.pr_number, failure.error);
    }
    println!(
        "\n{} tracked, {} sheet rows updated, {} failed",
        result.tracked_count,
        result.sheets_updated,
        result.failures.len()
    );
}

fn print_workflow(result: &WorkflowResult) {
    println!("Reviews:");
    print_batch(&result.reviews);
    println!("\nApprovals:");
    print_tracking(&result.tracking);
    println!("\nFinished at {}", result.finished_at.to_rfc3339());
}

fn print_sheet(result: &SheetActionResult) {
    println!("{}: {}", result.action, result.message);
    if let Some(tracking) = &result.tracking {
        print_tracking(tracking);
    }
}

fn print_status(status: &StatusInfo) {
    println!("Repository:       {}", status.repository);
    println!("Open PRs:         {}", status.open_prs);
    println!("Pending reviews:  {}", status.pending_reviews);
    println!(
        "Sheet:            {}",
        if status.sheets_connected { "connected" } else { "not connected" }
    );
    println!("AI model:         {}", status.ai_model);
    match status.last_sync {
        Some(at) => println!("Last sync:        {}", at.to_rfc3339()),
        None => println!("Last sync:        never (this session)"),
    }
}

fn print_stats(stats: &Stats) {
    match &stats.sheet {
        Some(sheet) => {
            println!("Tracking sheet");
            println!("  total PRs:       {}", sheet.total_prs);
            println!("  open / closed:   {} / {}", sheet.open_prs, sheet.closed_prs);
            println!("  approved:        {}", sheet.approved_prs);
            println!("  pending reviews: {}", sheet.pending_reviews);
            println!("  approval rate:   {:.1}%", sheet.approval_rate);
        }
        None => println!("Tracking sheet: not configured"),
    }
    match &stats.reviews {
        Some(reviews) => {
            println!("AI review history");
            println!("  total reviews:   {}", reviews.total_reviews);
            println!("  average score:   {:.2}", reviews.average_score);
            println!("  last 7 days:     {}", reviews.recent_reviews);
            for author in &reviews.reviews_by_author {
                println!("  {:<16} {}", author.author, author.count);
            }
        }
        None => println!("AI review history: disabled"),
    }
    for failure in &stats.failures {
        println!("{} unavailable: {}", failure.source, failure.error);
    }
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self) -> &'static str {
        match self.status {
            "pass" => "\u{2713}",
            "fail" => "\u{2717}",
            _ => "~",
        }
    }

    fn colored_symbol(&self) -> String {
        match self.status {
            "pass" => "\x1b[32m\u{2713}\x1b[0m".into(),
            "fail" => "\x1b[31m\u{2717}\x1b[0m".into(),
            _ => "\x1b[33m~\x1b[0m".into(),
        }
    }
}

async fn run_setup(
    config: &PrPilotConfig,
    config_path: Option<&Path>,
    format: OutputFormat,
    use_color: bool,
) -> Result<()> {
    let mut checks: Vec<CheckResult> = Vec::new();

    // 1. Config file
    let path = config_path.unwrap_or_else(|| Path::new(CONFIG_FILE_NAME));
    if path.exists() {
        checks.push(CheckResult::pass(
            "config_file",
            format!("{} found", path.display()),
        ));
    } else {
        checks.push(CheckResult::info(
            "config_file",
            "no config file, using defaults and environment",
        ));
    }

    // 2. GitHub
    if config.github.token.is_some() {
        checks.push(CheckResult::pass("github_token", "GITHUB_TOKEN set"));
    } else {
        checks.push(CheckResult::fail(
            "github_token",
            "GITHUB_TOKEN not set",
            "Create a token with repo scope and export GITHUB_TOKEN",
        ));
    }
    match config.github.repo() {
        Ok(repo) => checks.push(CheckResult::pass("github_repository", repo.to_string())),
        Err(e) => checks.push(CheckResult::fail(
            "github_repository",
            e.to_string(),
            "Set GITHUB_REPO to owner/repo or add repository under [github]",
        )),
    }

    // 3. LLM
    if config.llm.api_key.is_some() {
        checks.push(CheckResult::pass(
            "llm_api_key",
            format!("set (model {})", config.llm.model),
        ));
    } else {
        checks.push(CheckResult::fail(
            "llm_api_key",
            "GROQ_API_KEY not set",
            "Export GROQ_API_KEY or add api_key under [llm]",
        ));
    }

    // 4. Sheet
    match (&config.sheets.spreadsheet_id, &config.sheets.access_token) {
        (Some(id), Some(_)) => checks.push(CheckResult::pass(
            "tracking_sheet",
            format!("spreadsheet {id}, worksheet '{}'", config.sheets.worksheet_name),
        )),
        (Some(_), None) => checks.push(CheckResult::fail(
            "tracking_sheet",
            "spreadsheet set but GOOGLE_SHEETS_ACCESS_TOKEN missing",
            "Export GOOGLE_SHEETS_ACCESS_TOKEN with a token that can edit the sheet",
        )),
        (None, _) => checks.push(CheckResult::info(
            "tracking_sheet",
            "not configured (approval sync disabled)",
        )),
    }

    // 5. Review store
    if config.store.enabled {
        checks.push(CheckResult::info(
            "review_store",
            format!("{}", config.store.path.display()),
        ));
    } else {
        checks.push(CheckResult::info("review_store", "disabled"));
    }

    // 6. Connectivity
    match Automation::from_config(config) {
        Ok(automation) => {
            let mut services = vec![Service::GitHub, Service::Llm];
            if automation.has_sheet() {
                services.push(Service::Sheets);
            }
            for service in services {
                let name = match service {
                    Service::GitHub => "github_connection",
                    Service::Llm => "llm_connection",
                    Service::Sheets => "sheet_connection",
                };
                let check = automation.test_connection(service).await;
                if check.success {
                    checks.push(CheckResult::pass(name, check.message));
                } else {
                    checks.push(CheckResult::fail(
                        name,
                        check.message,
                        format!("Verify the {service} credentials and that the network is reachable"),
                    ));
                }
            }
        }
        Err(e) => checks.push(CheckResult::fail(
            "connectivity",
            e.to_string(),
            "Fix the configuration problems above first",
        )),
    }

    // Output
    match format {
        OutputFormat::Json => {
            let version = env!("CARGO_PKG_VERSION");
            let json = serde_json::json!({
                "version": version,
                "checks": checks,
            });
            print_json(&json)?;
        }
        OutputFormat::Text => {
            let version = env!("CARGO_PKG_VERSION");
            println!("prpilot v{version}: environment check\n");

            for check in &checks {
                let sym = if use_color {
                    check.colored_symbol()
                } else {
                    check.symbol().to_string()
                };
                let label = check.name.replace('_', " ");
                println!("  {sym} {label:<20} {}", check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }

            let passed = checks.iter().filter(|c| c.status == "pass").count();
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            let info = checks.iter().filter(|c| c.status == "info").count();
            println!("\n{passed} checks passed, {failed} failed, {info} info");
        }
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# prpilot configuration
# Environment variables override these values (see `prpilot setup`).

[github]
# token = "ghp_..."            # prefer GITHUB_TOKEN
# repository = "owner/repo"
# base_branch = "main"
# auto_merge = false
# require_reviews = true

[llm]
# api_key = "gsk_..."          # prefer GROQ_API_KEY
# model = "llama-3.1-8b-instant"
# base_url = "https://api.groq.com/openai/v1"
# max_tokens = 2048
# temperature = 0.7

[sheets]
# access_token = "ya29..."     # prefer GOOGLE_SHEETS_ACCESS_TOKEN
# spreadsheet_id = ""
# worksheet_name = "PR Tracking"
# auto_sync = true
# sync_interval_secs = 300

[store]
# enabled = true
# path = ".prpilot/reviews.db"

[server]
# host = "127.0.0.1"
# port = 8000

[workflow]
# interval_secs = 3600
# retry_delay_secs = 60
# auto_comment = true
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_tracing(cli.verbose, matches!(cli.command, Some(Command::Serve { .. })));

    let use_color = match cli.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    };

    let command = match cli.command {
        None => {
            print_welcome(use_color);
            return Ok(());
        }
        Some(Command::Init) => {
            let path = Path::new(CONFIG_FILE_NAME);
            if path.exists() {
                miette::bail!("{CONFIG_FILE_NAME} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE_NAME} with default configuration");
            return Ok(());
        }
        Some(Command::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "prpilot", &mut std::io::stdout());
            return Ok(());
        }
        Some(command) => command,
    };

    let config = PrPilotConfig::load(cli.config.as_deref())?;
    tracing::debug!(path = ?cli.config, format = %cli.format, "configuration loaded");
    for problem in config.validate() {
        tracing::debug!(%problem, "configuration incomplete");
    }

    if let Command::Setup = command {
        return run_setup(&config, cli.config.as_deref(), cli.format, use_color).await;
    }

    let automation = Automation::from_config(&config)?;
    let format = cli.format;

    match command {
        Command::CreatePr {
            branch,
            title,
            prompt,
            base,
            auto_merge,
        } => {
            let request = CreatePrRequest {
                branch,
                title,
                prompt,
                base,
                auto_merge,
            };
            let pb = spinner("Creating pull request...");
            let result = settle(pb, automation.create_pr(&request).await)?;
            match format {
                OutputFormat::Json => print_json(&result)?,
                OutputFormat::Text => print_created(&result),
            }
        }
        Command::ReviewPrs {
            pr_number,
            all,
            auto_comment,
        } => {
            let auto_comment = auto_comment.unwrap_or(config.workflow.auto_comment);
            match (pr_number, all) {
                (Some(number), _) => {
                    let pb = spinner(&format!("Reviewing PR #{number}..."));
                    let outcome = settle(pb, automation.review_pr(number, auto_comment).await)?;
                    match format {
                        OutputFormat::Json => print_json(&outcome)?,
                        OutputFormat::Text => print_outcome(&outcome),
                    }
                }
                (None, true) => {
                    let pb = spinner("Reviewing open pull requests...");
                    let result = settle(pb, automation.review_open_prs(auto_comment).await)?;
                    match format {
                        OutputFormat::Json => print_json(&result)?,
                        OutputFormat::Text => print_batch(&result),
                    }
                }
                (None, false) => {
                    miette::bail!(
                        help = "Pass -n <number> for one PR or --all for every open PR",
                        "Nothing to review"
                    );
                }
            }
        }
        Command::TrackApprovals { sync, update } => {
            let pb = spinner("Tracking approvals...");
            let result = settle(pb, automation.track_approvals(sync || update).await)?;
            match format {
                OutputFormat::Json => print_json(&result)?,
                OutputFormat::Text => print_tracking(&result),
            }
        }
        Command::AutoWorkflow {
            interval,
            continuous,
        } => {
            if continuous {
                let interval =
                    Duration::from_secs(interval.unwrap_or(config.workflow.interval_secs));
                eprintln!(
                    "Running every {}s, press Ctrl-C to stop",
                    interval.as_secs()
                );
                let shutdown = async {
                    let _ = tokio::signal::ctrl_c().await;
                };
                let completed = automation.run_continuous(interval, shutdown).await;
                match format {
                    OutputFormat::Json => {
                        print_json(&serde_json::json!({ "completedRuns": completed }))?
                    }
                    OutputFormat::Text => println!("Stopped after {completed} completed runs"),
                }
            } else {
                let pb = spinner("Running workflow...");
                let result = settle(pb, automation.run_single_workflow().await)?;
                match format {
                    OutputFormat::Json => print_json(&result)?,
                    OutputFormat::Text => print_workflow(&result),
                }
            }
        }
        Command::UpdateSheet { action } => {
            let pb = spinner(&format!("Sheet {action}..."));
            let result = settle(pb, automation.manage_sheet(action).await)?;
            match format {
                OutputFormat::Json => print_json(&result)?,
                OutputFormat::Text => print_sheet(&result),
            }
        }
        Command::SubmitReview {
            pr_number,
            action,
            body,
        } => {
            let review = automation
                .submit_review(pr_number, action, body.as_deref())
                .await?;
            match format {
                OutputFormat::Json => print_json(&review)?,
                OutputFormat::Text => {
                    println!("Submitted {} review {} on PR #{pr_number}", action, review.id)
                }
            }
        }
        Command::DeleteReview {
            pr_number,
            review_id,
        } => {
            automation.delete_review(pr_number, review_id).await?;
            match format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "prNumber": pr_number,
                    "reviewId": review_id,
                    "deleted": true,
                }))?,
                OutputFormat::Text => println!("Deleted review {review_id} on PR #{pr_number}"),
            }
        }
        Command::Status => {
            let status = automation.status().await?;
            match format {
                OutputFormat::Json => print_json(&status)?,
                OutputFormat::Text => print_status(&status),
            }
        }
        Command::Stats => {
            let stats = automation.stats().await;
            match format {
                OutputFormat::Json => print_json(&stats)?,
                OutputFormat::Text => print_stats(&stats),
            }
        }
        Command::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let state = prpilot_server::AppState::new(automation, config.summary());
            prpilot_server::serve(state, &host, port)
                .await
                .map_err(|e| miette::miette!("{e:#}"))?;
        }
        Command::Setup | Command::Init | Command::Completions { .. } => {}
    }

    Ok(())
}
