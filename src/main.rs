use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use microloan::application::repayment_flow::RepaymentFlow;
use microloan::config::{ApiConfig, DEFAULT_API_URL, PollPolicy};
use microloan::domain::loan::{LoanApplication, LoanQuote};
use microloan::domain::ports::{GatewayRef, LedgerRef};
use microloan::domain::repayment::{LoanId, RepaymentRequest};
use microloan::domain::session::Session;
use microloan::domain::user::{LoginCredentials, RegisterCredentials};
use microloan::error::Error;
use microloan::infrastructure::http::ApiClient;
use microloan::infrastructure::in_memory::{InMemoryLedger, ScriptedGateway, ScriptedStatus};
use microloan::interfaces::csv::report_writer::ReportWriter;
use miette::{IntoDiagnostic, MietteHandlerOpts, Result};
use rust_decimal::Decimal;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the microloan API
    #[arg(long, env = "MICROLOAN_API_URL", default_value = DEFAULT_API_URL, global = true)]
    api_url: String,

    /// Bearer token from a previous login
    #[arg(long, env = "MICROLOAN_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 10, global = true)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in and print the session token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "MICROLOAN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and print the session token
    Register {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "MICROLOAN_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        phone: String,
    },
    /// Show the logged-in user
    Whoami,
    /// List your loans
    Loans,
    /// Show what a loan would cost without applying
    Quote {
        #[arg(long)]
        amount: Decimal,
        #[arg(long, default_value_t = 30)]
        term: u32,
    },
    /// Apply for a loan
    Apply {
        #[arg(long)]
        amount: Decimal,
        #[arg(long, default_value_t = 30)]
        term: u32,
        #[arg(long)]
        purpose: String,
    },
    /// List repayments, optionally for one loan
    Repayments {
        #[arg(long)]
        loan_id: Option<String>,
    },
    /// Show your credit score
    Score,
    /// Show dashboard totals
    Dashboard,
    /// Repay a loan via mobile money
    Repay(RepayArgs),
}

#[derive(Args)]
struct RepayArgs {
    #[arg(long)]
    loan_id: String,

    #[arg(long)]
    amount: Decimal,

    /// Phone number to charge (07XXXXXXXX or 2547XXXXXXXX)
    #[arg(long)]
    phone: String,

    /// Delay between payment status checks
    #[arg(long, default_value_t = 3000)]
    poll_interval_ms: u64,

    /// Status checks before giving up
    #[arg(long, default_value_t = 10)]
    max_attempts: u32,

    /// Run against an in-memory gateway and ledger instead of the API
    #[arg(long, value_enum)]
    sandbox: Option<SandboxOutcome>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SandboxOutcome {
    Success,
    Cancel,
    Timeout,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn api_client(cli: &Cli) -> Result<ApiClient> {
    let config = ApiConfig::new(&cli.api_url, Duration::from_secs(cli.timeout_secs));
    let client = ApiClient::new(&config).into_diagnostic()?;
    match &cli.token {
        Some(token) => {
            let session = Session::restore(token, None, Utc::now()).map_err(|e| {
                warn!(error = %e, "stored token rejected");
                Error::Unauthorized
            });
            Ok(client.with_session(session.into_diagnostic()?))
        }
        None => Ok(client),
    }
}

fn sandbox_ports(outcome: SandboxOutcome) -> (GatewayRef, LedgerRef) {
    let gateway = ScriptedGateway::accepting("ws_CO_SANDBOX");
    let gateway = match outcome {
        SandboxOutcome::Success => gateway.with_statuses([
            ScriptedStatus::pending(),
            ScriptedStatus::pending(),
            ScriptedStatus::success("SANDBOX0001"),
        ]),
        SandboxOutcome::Cancel => gateway.with_statuses([ScriptedStatus::cancelled()]),
        SandboxOutcome::Timeout => gateway,
    };
    (Arc::new(gateway), Arc::new(InMemoryLedger::new()))
}

async fn repay(cli: &Cli, args: &RepayArgs) -> Result<()> {
    // Validate before touching the network.
    let request =
        RepaymentRequest::new(&args.loan_id, args.amount, &args.phone).into_diagnostic()?;
    let policy = PollPolicy::new(
        Duration::from_millis(args.poll_interval_ms),
        args.max_attempts,
    )
    .into_diagnostic()?;

    let (gateway, ledger): (GatewayRef, LedgerRef) = match args.sandbox {
        Some(outcome) => sandbox_ports(outcome),
        None => {
            let client = Arc::new(api_client(cli)?);
            (client.clone(), client)
        }
    };

    eprintln!(
        "Sending a payment prompt for {} to {}. Enter your PIN on the phone when asked.",
        request.amount(),
        request.phone_number()
    );

    let handle = RepaymentFlow::new(gateway, ledger, policy).spawn(request);
    let receipt = tokio::select! {
        outcome = handle.outcome() => outcome.into_diagnostic()?,
        _ = tokio::signal::ctrl_c() => {
            return Err(Error::FlowAborted("interrupted".to_string())).into_diagnostic();
        }
    };

    println!(
        "Repayment of {} recorded for loan {} (reference {})",
        receipt.amount, receipt.loan_id, receipt.reference
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(MietteHandlerOpts::new().width(400).build())
    }))
    .ok();
    init_tracing();

    let cli = Cli::parse();
    let stdout = io::stdout();
    let mut writer = ReportWriter::new(stdout.lock());

    match &cli.command {
        Command::Login { email, password } => {
            let credentials = LoginCredentials::new(email, password).into_diagnostic()?;
            let client = api_client(&cli)?;
            client.login(&credentials).await.into_diagnostic()?;
            if let Some(session) = client.session().await {
                println!("{}", session.token());
            }
        }
        Command::Register {
            first_name,
            last_name,
            email,
            password,
            phone,
        } => {
            let credentials =
                RegisterCredentials::new(first_name, last_name, email, password, phone)
                    .into_diagnostic()?;
            let client = api_client(&cli)?;
            client.register(&credentials).await.into_diagnostic()?;
            if let Some(session) = client.session().await {
                println!("{}", session.token());
            }
        }
        Command::Whoami => {
            let user = api_client(&cli)?.current_user().await.into_diagnostic()?;
            println!(
                "{} {} <{}> {}",
                user.first_name, user.last_name, user.email, user.phone_number
            );
        }
        Command::Loans => {
            let loans = api_client(&cli)?.loans().await.into_diagnostic()?;
            writer.write_loans(&loans, Utc::now()).into_diagnostic()?;
        }
        Command::Quote { amount, term } => {
            writer
                .write_quote(&LoanQuote::new(*amount, *term).into_diagnostic()?)
                .into_diagnostic()?;
        }
        Command::Apply {
            amount,
            term,
            purpose,
        } => {
            let client = api_client(&cli)?;
            let max_amount = match client.credit_score().await {
                Ok(score) => Some(score.max_loan_amount),
                Err(e) => {
                    warn!(error = %e, "could not fetch credit limit, applying without it");
                    None
                }
            };
            let application =
                LoanApplication::new(*amount, *term, purpose, max_amount).into_diagnostic()?;
            let loan = client
                .apply_for_loan(&application)
                .await
                .into_diagnostic()?;
            writer.write_loans(&[loan], Utc::now()).into_diagnostic()?;
        }
        Command::Repayments { loan_id } => {
            let loan_id = loan_id
                .as_deref()
                .map(LoanId::new)
                .transpose()
                .into_diagnostic()?;
            let repayments = api_client(&cli)?
                .repayments(loan_id.as_ref())
                .await
                .into_diagnostic()?;
            writer.write_repayments(&repayments).into_diagnostic()?;
        }
        Command::Score => {
            let score = api_client(&cli)?.credit_score().await.into_diagnostic()?;
            writer.write_credit_score(&score).into_diagnostic()?;
        }
        Command::Dashboard => {
            let stats = api_client(&cli)?.dashboard_stats().await.into_diagnostic()?;
            writer.write_dashboard(&stats).into_diagnostic()?;
        }
        Command::Repay(args) => repay(&cli, args).await?,
    }

    Ok(())
}
