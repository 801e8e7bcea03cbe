use std::io::Read;
use std::process;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use pirate_rewriter::controls::{ConfigArgs, ExtractArgs, RewriteArgs};
use pirate_rewriter::{
    Cli, Command, Extractor, FileSettingsStore, InputSource, OpenAiCompatClient, Orchestrator,
    PageSession, RunObserver, Settings, SettingsStore,
};
use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const USER_AGENT: &str = concat!("piratify/", env!("CARGO_PKG_VERSION"));
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("piratify: {err:#}");
            process::exit(1);
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    let store = FileSettingsStore::new(cli.settings.clone());
    match cli.command {
        Command::Rewrite(args) => rewrite(&store, &args).await,
        Command::Extract(args) => extract(&args).await,
        Command::Config(args) => config(&store, &args),
    }
}

async fn rewrite(store: &FileSettingsStore, args: &RewriteArgs) -> Result<i32> {
    let settings = args.resolve_settings(&store.load()?);
    settings.validate()?;
    let extractor = Extractor::new(args.extraction.build_rules())?;
    let client = OpenAiCompatClient::new(&settings, args.timeout())?
        .with_temperature(args.temperature);
    tracing::debug!(
        endpoint = client.endpoint(),
        model = %settings.model_name,
        "rewrite client ready"
    );
    let orchestrator = Orchestrator::new(extractor, client);

    let html = read_input(&args.input).await?;
    let mut page = PageSession::parse(&html);
    let outcome = orchestrator.run_observed(&mut page, &StderrStatus).await;
    eprintln!("{}", outcome.status_message());

    let rendered = page.to_html();
    match &args.output {
        Some(path) => tokio::fs::write(path, rendered)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{rendered}"),
    }
    Ok(if outcome.is_failure() { 2 } else { 0 })
}

async fn extract(args: &ExtractArgs) -> Result<i32> {
    let extractor = Extractor::new(args.extraction.build_rules())?;
    let html = read_input(&args.input).await?;
    let page = PageSession::parse(&html);
    let result = extractor.extract(page.document());
    let json = serde_json::to_string_pretty(&result).context("failed to serialize segments")?;
    println!("{json}");
    Ok(0)
}

fn config(store: &FileSettingsStore, args: &ConfigArgs) -> Result<i32> {
    let mut settings = store.load()?;
    if args.has_updates() {
        settings = args.apply(&settings);
        store.save(&settings)?;
        eprintln!("Settings saved, Cap'n! Ready to set sail!");
    }
    let view = SettingsView::from(&settings);
    println!(
        "{}",
        serde_json::to_string_pretty(&view).context("failed to serialize settings")?
    );
    Ok(0)
}

async fn read_input(raw: &str) -> Result<String> {
    match InputSource::parse(raw) {
        InputSource::Stdin => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
        InputSource::File(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read '{}'", path.display())),
        InputSource::Url(url) => {
            let client = reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(FETCH_TIMEOUT)
                .build()
                .context("failed to build page HTTP client")?;
            let resp = client
                .get(url.clone())
                .send()
                .await
                .with_context(|| format!("failed to fetch {url}"))?;
            if !resp.status().is_success() {
                bail!("fetching {} returned {}", url, resp.status());
            }
            resp.text()
                .await
                .with_context(|| format!("failed to read body of {url}"))
        }
    }
}

struct StderrStatus;

impl RunObserver for StderrStatus {
    fn busy(&self, segments: usize) {
        eprintln!("⏳ Piratifyin' {segments} segment(s)... shiver me timbers!");
    }
}

#[derive(Serialize)]
struct SettingsView<'a> {
    api_url: &'a str,
    model_name: &'a str,
    api_key: &'static str,
}

impl<'a> From<&'a Settings> for SettingsView<'a> {
    fn from(settings: &'a Settings) -> Self {
        Self {
            api_url: &settings.api_url,
            model_name: &settings.model_name,
            api_key: if settings.api_key.is_some() {
                "<set>"
            } else {
                "<none>"
            },
        }
    }
}

