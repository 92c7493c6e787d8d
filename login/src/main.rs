//! Submit a login through the instrumented login flow, reporting telemetry to the collector.
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use collector::{Collector, PageContext, Properties};
use envconfig::Envconfig;
use tracing::info;

use login::client::LoginClient;
use login::config::Config;
use login::submission::LoginForm;

#[derive(Parser, Debug)]
#[command(about = "Log in against the configured endpoint")]
struct Args {
    /// The email address to log in with
    #[arg(short, long)]
    email: String,

    /// The password to log in with
    #[arg(short, long, env = "LOGIN_PASSWORD", hide_env_values = true)]
    password: String,
}

async fn run(args: Args) -> anyhow::Result<Result<String, String>> {
    let config = Config::init_from_env().context("Invalid configuration")?;

    let collector =
        Collector::from_config(&config.collector).context("failed to start event collector")?;
    collector.set_context(PageContext::new(&config.page_url, &config.page_title));
    collector.track("page_view", Properties::new());

    let client = LoginClient::new(
        &config.login_api_url,
        config.timeout.0,
        config.retry_policy(),
        collector.clone(),
    )
    .context("failed to create login client")?;
    let form = LoginForm::new(client, config.min_password_length, config.debounce.0);

    let outcome = form
        .submit(&args.email, &args.password)
        .await
        .map(|response| {
            response
                .message
                .unwrap_or_else(|| "Welcome back!".to_owned())
        })
        .map_err(|error| error.user_message());

    collector.shutdown().await;

    Ok(outcome)
}

#[tokio::main]
async fn main() -> ExitCode {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::Level::INFO.into())
                .from_env_lossy(),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    match run(Args::parse()).await {
        Ok(Ok(message)) => {
            info!("login succeeded");
            println!("{message}");
            ExitCode::SUCCESS
        }
        Ok(Err(message)) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
        Err(error) => {
            eprintln!("Oops! {error:#}");
            ExitCode::FAILURE
        }
    }
}
