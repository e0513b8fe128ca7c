use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::{mpsc, watch as channel};
use tracing::warn;
use uuid::Uuid;

use burnout_trends::config::Settings;
use burnout_trends::sources::credentials::SessionCredentials;
use burnout_trends::sources::{DeviceLocalAdapter, FallbackDerivationAdapter, RemoteStoreAdapter};
use burnout_trends::watch::{self, Trigger, TrendView};
use burnout_trends::{
    db, logging, report, risk, Granularity, LookbackWindow, ReconciliationMode, TrendQuery,
    TrendResult, TrendService, UserContext,
};

#[derive(Parser)]
#[command(name = "burnout-trends")]
#[command(about = "Burnout trend reconciliation for interpreter wellness check-ins", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the reconciled trend
    Trend {
        #[command(flatten)]
        scope: Scope,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        scope: Scope,
        #[arg(long, default_value = "burnout-report.md")]
        out: PathBuf,
    },
    /// Recompute whenever an assessment is saved
    Watch {
        #[command(flatten)]
        scope: Scope,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[derive(Args, Clone)]
#[command(group(
    ArgGroup::new("span")
        .args(["window", "since_days"])
        .multiple(false)
))]
struct Scope {
    /// Signed-in user; omit to read this device's cached assessments
    #[arg(long)]
    user: Option<Uuid>,
    #[arg(long, value_enum)]
    window: Option<WindowArg>,
    #[arg(long)]
    since_days: Option<i64>,
    #[arg(long, value_enum, default_value_t = GranularityArg::Daily)]
    granularity: GranularityArg,
    /// Approximate from reflection history instead of assessments
    #[arg(long)]
    best_effort: bool,
}

impl Scope {
    fn context(&self) -> UserContext {
        UserContext { user_id: self.user }
    }

    fn view(&self) -> TrendView {
        let lookback_days = self
            .since_days
            .or(self.window.map(|window| LookbackWindow::from(window).days()))
            .unwrap_or(LookbackWindow::Month.days());
        TrendView {
            lookback_days,
            granularity: self.granularity.into(),
            mode: if self.best_effort {
                ReconciliationMode::BestEffort
            } else {
                ReconciliationMode::Default
            },
        }
    }

    fn query(&self) -> TrendQuery {
        let view = self.view();
        let mut query = TrendQuery::new(view.lookback_days, view.granularity);
        query.mode = view.mode;
        query
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum WindowArg {
    Week,
    Month,
    #[value(name = "90-days")]
    NinetyDays,
}

impl From<WindowArg> for LookbackWindow {
    fn from(value: WindowArg) -> Self {
        match value {
            WindowArg::Week => LookbackWindow::Week,
            WindowArg::Month => LookbackWindow::Month,
            WindowArg::NinetyDays => LookbackWindow::NinetyDays,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum GranularityArg {
    Daily,
    Weekly,
    Monthly,
}

impl From<GranularityArg> for Granularity {
    fn from(value: GranularityArg) -> Self {
        match value {
            GranularityArg::Daily => Granularity::Daily,
            GranularityArg::Weekly => Granularity::Weekly,
            GranularityArg::Monthly => Granularity::Monthly,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let cli = Cli::parse();
    let settings = Settings::from_env().context("invalid burnout-trends configuration")?;

    match cli.command {
        Commands::Trend { scope, format } => {
            let (service, _) = build_service(&settings, scope.user)?;
            let result = service.get_trend(&scope.context(), &scope.query()).await;
            print_trend(&result, format)?;
        }
        Commands::Report { scope, out } => {
            let (service, _) = build_service(&settings, scope.user)?;
            let query = scope.query();
            let (trend, records) = service.trend_with_records(&scope.context(), &query).await;
            let user_label = scope.user.map(|user| user.to_string());
            let report = report::build_report(
                user_label.as_deref(),
                query.lookback_days,
                risk::cutoff_date(query.as_of.date_naive(), query.lookback_days),
                query.granularity,
                &trend,
                &records,
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {} (source: {}).", out.display(), trend.source_used);
        }
        Commands::Watch { scope, format } => {
            let (service, pool) = build_service(&settings, scope.user)?;
            watch_trend(service, pool, scope.context(), scope.view(), format).await?;
        }
    }

    Ok(())
}

fn build_service(settings: &Settings, user: Option<Uuid>) -> anyhow::Result<(TrendService, Option<PgPool>)> {
    let local = Arc::new(DeviceLocalAdapter::new(settings.local_store_path.clone()));
    let mut service = TrendService::new(local);

    let Some(database_url) = settings.database_url.as_deref() else {
        if user.is_some() {
            warn!("DATABASE_URL is not set; remote assessments are unavailable");
        }
        return Ok((service, None));
    };

    let pool = db::lazy_pool(database_url, settings.fetch_timeout)
        .context("DATABASE_URL is not a valid Postgres connection string")?;
    let credentials = Arc::new(SessionCredentials::new(
        settings.access_token.clone(),
        user,
        settings.session_file.clone(),
    ));

    service = service
        .with_remote(Arc::new(
            RemoteStoreAdapter::new(pool.clone(), credentials).with_settings(settings),
        ))
        .with_derivation(Arc::new(
            FallbackDerivationAdapter::new(pool.clone()).with_row_limit(settings.row_limit),
        ));

    Ok((service, Some(pool)))
}

async fn watch_trend(
    service: TrendService,
    pool: Option<PgPool>,
    ctx: UserContext,
    view: TrendView,
    format: Format,
) -> anyhow::Result<()> {
    let (trigger_tx, trigger_rx) = mpsc::channel(16);
    let (results_tx, mut results_rx) = channel::channel(None);

    match pool {
        Some(pool) => {
            let mut listener = PgListener::connect_with(&pool)
                .await
                .context("failed to open a notification listener")?;
            listener
                .listen(db::ASSESSMENT_NOTIFY_CHANNEL)
                .await
                .context("failed to LISTEN for saved assessments")?;

            tokio::spawn(async move {
                loop {
                    match listener.recv().await {
                        Ok(notification) => {
                            if !watch::notification_applies(notification.payload(), &ctx) {
                                continue;
                            }
                            if trigger_tx.send(Trigger::AssessmentSaved).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(error = %err, "notification listener stopped");
                            break;
                        }
                    }
                }
            });
        }
        None => {
            warn!("no DATABASE_URL; showing the current trend without live updates");
            drop(trigger_tx);
        }
    }

    let worker = tokio::spawn(async move { watch::run(&service, ctx, view, trigger_rx, results_tx).await });

    loop {
        tokio::select! {
            changed = results_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = results_rx.borrow_and_update().clone();
                if let Some(result) = latest {
                    print_trend(&result, format)?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                worker.abort();
                break;
            }
        }
    }

    Ok(())
}

fn print_trend(result: &TrendResult, format: Format) -> anyhow::Result<()> {
    match format {
        Format::Json => {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
        Format::Csv => {
            report::write_csv(std::io::stdout().lock(), &result.buckets)?;
        }
        Format::Text => {
            println!("Source: {}", result.source_used);
            if result.buckets.is_empty() {
                println!("No assessments found for this window.");
                return Ok(());
            }
            for bucket in result.buckets.iter() {
                println!(
                    "- {} score {:.1} ({}) across {} assessments",
                    bucket.period_key, bucket.total_score, bucket.risk_level, bucket.count
                );
            }
        }
    }
    Ok(())
}
