use std::{fs, path::PathBuf, str::FromStr, sync::Arc};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use backoffice_variance::{
    config::{self, AppConfig},
    db,
    entities::{
        csv_upload::CsvUploadType,
        inventory_period::{PeriodStatus, PeriodType},
        period_inventory_snapshot::SnapshotType,
        theoretical_usage_analysis::{InvestigationStatus, VariancePriority},
    },
    events,
    repositories::Repositories,
    services::{
        csv::TransformOptions,
        factory::{ServiceContainer, ServiceFactory},
        periods::{CreatePeriodRequest, RecordSnapshotRequest},
        pos::PosProvider,
        variance::{
            CalculationRequest, InvestigateRequest, Resolution, ResolveRequest, TrendQuery,
            VarianceFilter,
        },
    },
    CollectedErrors, OperationResult,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize(matches!(cli.command, Commands::Migrate)).await?;

    match cli.command {
        Commands::Migrate => {
            db::run_migrations(&context.db)
                .await
                .context("failed to run migrations")?;
            if !cli.json {
                println!("Migrations applied");
            }
            Ok(())
        }
        Commands::Period(command) => handle_period_command(&context, command, cli.json).await,
        Commands::Calculate(args) => handle_calculate(&context, args, cli.json).await,
        Commands::Report(args) => handle_report(&context, args, cli.json).await,
        Commands::Summary { period_id } => {
            let result = context
                .services
                .reporting
                .priority_variance_summary(period_id)
                .await;
            render(result, cli.json, |summary| {
                for bucket in &summary.buckets {
                    println!(
                        "{:<9} {:>4} analyses, {:>4} unresolved, |$| {}",
                        bucket.priority, bucket.count, bucket.unresolved, bucket.total_absolute_dollar
                    );
                }
                for rec in &summary.recommendations {
                    println!("! {}", rec.message);
                }
                for insight in &summary.insights {
                    println!("* {}", insight.message);
                }
            })
        }
        Commands::Trends(args) => handle_trends(&context, args, cli.json).await,
        Commands::Investigate(args) => {
            let result = context
                .services
                .investigations
                .investigate_variance(
                    args.analysis_id,
                    InvestigateRequest {
                        assigned_to: args.assigned_to,
                        notes: args.notes,
                    },
                )
                .await;
            render(result, cli.json, |analysis| {
                println!(
                    "Analysis {} is {} (assigned to {})",
                    analysis.id,
                    analysis.investigation_status,
                    analysis
                        .assigned_to
                        .map(|id| id.to_string())
                        .unwrap_or_default()
                );
            })
        }
        Commands::Resolve(args) => {
            let result = context
                .services
                .investigations
                .resolve_variance_investigation(
                    args.analysis_id,
                    ResolveRequest {
                        resolved_by: args.resolved_by,
                        explanation: args.explanation,
                        resolution: args.resolution.into(),
                    },
                )
                .await;
            render(result, cli.json, |analysis| {
                println!("Analysis {} is {}", analysis.id, analysis.investigation_status);
            })
        }
        Commands::PosTransform(args) => {
            let result = context
                .services
                .pos
                .transform_restaurant(args.restaurant_id, args.provider.into())
                .await;
            render_collected(result, cli.json, |outcome| {
                println!(
                    "{}: processed {}, created {}, updated {}, unchanged {}, skipped {}, errors {}",
                    outcome.provider,
                    outcome.processed,
                    outcome.created,
                    outcome.updated,
                    outcome.unchanged,
                    outcome.skipped,
                    outcome.errors.len()
                );
            })
        }
        Commands::CsvValidate(args) => {
            let data = fs::read(&args.file)
                .with_context(|| format!("failed to read {}", args.file.display()))?;
            let filename = args
                .file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload.csv".to_string());
            let result = context
                .services
                .csv_upload
                .validate_upload(args.restaurant_id, &filename, args.kind.into(), &data)
                .await;
            render_collected(result, cli.json, |validation| {
                let upload = &validation.upload;
                println!(
                    "Upload {} {}: {} rows, {} valid, {} invalid, {} batches",
                    upload.id,
                    upload.status,
                    upload.rows_total,
                    upload.rows_valid,
                    upload.rows_invalid,
                    upload.batch_count
                );
            })
        }
        Commands::CsvTransform(args) => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received; cancelling after the current batch");
                    on_signal.cancel();
                }
            });

            let options = TransformOptions {
                transform_type: args.kind.into(),
                dry_run: args.dry_run,
                max_error_rate: args
                    .max_error_rate
                    .or(context.config.csv.max_error_rate),
            };
            let result = context
                .services
                .csv_transform
                .transform(args.upload_id, options, cancel)
                .await;
            render_collected(result, cli.json, |run| {
                println!(
                    "Transform {} {}{}: processed {}, created {}, updated {}, skipped {}, errors {} (rate {})",
                    run.transform_id,
                    run.status,
                    if run.dry_run { " (dry run)" } else { "" },
                    run.summary.processed,
                    run.summary.created,
                    run.summary.updated,
                    run.summary.skipped,
                    run.summary.error_count,
                    run.error_rate
                );
            })
        }
    }
}

#[derive(Parser)]
#[command(
    name = "variance-cli",
    about = "Inventory usage variance and POS/CSV reconciliation",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    #[command(subcommand)]
    Period(PeriodCommands),
    /// Calculate usage variance for a period
    Calculate(CalculateArgs),
    /// List a period's analyses, largest dollar impact first
    Report(ReportArgs),
    /// Per-priority summary with recommendations and insights
    Summary {
        #[arg(long)]
        period_id: Uuid,
    },
    /// Variance trends across closed periods
    Trends(TrendsArgs),
    /// Start investigating a variance
    Investigate(InvestigateArgs),
    /// Close an investigation
    Resolve(ResolveArgs),
    /// Transform a restaurant's raw POS data into the unified schema
    PosTransform(PosTransformArgs),
    /// Validate a CSV file into batches
    CsvValidate(CsvValidateArgs),
    /// Transform a validated CSV upload
    CsvTransform(CsvTransformArgs),
}

#[derive(Subcommand)]
enum PeriodCommands {
    Create(CreatePeriodArgs),
    Activate {
        #[arg(long)]
        period_id: Uuid,
    },
    Snapshot(SnapshotArgs),
    CompleteSnapshots {
        #[arg(long)]
        period_id: Uuid,
        #[arg(long, value_enum)]
        snapshot_type: SnapshotKind,
    },
    Close {
        #[arg(long)]
        period_id: Uuid,
    },
    Lock {
        #[arg(long)]
        period_id: Uuid,
    },
    List {
        #[arg(long)]
        restaurant_id: Uuid,
        #[arg(long, value_parser = parse_period_status)]
        status: Option<PeriodStatus>,
    },
}

#[derive(Args)]
struct CreatePeriodArgs {
    #[arg(long)]
    restaurant_id: Uuid,
    #[arg(long)]
    name: String,
    #[arg(long, value_parser = parse_period_type, default_value = "weekly")]
    period_type: PeriodType,
    #[arg(long, help = "First day, YYYY-MM-DD")]
    start: NaiveDate,
    #[arg(long, help = "Exclusive end day, YYYY-MM-DD")]
    end: NaiveDate,
}

#[derive(Args)]
struct SnapshotArgs {
    #[arg(long)]
    period_id: Uuid,
    #[arg(long)]
    item_id: Uuid,
    #[arg(long, value_enum)]
    snapshot_type: SnapshotKind,
    #[arg(long, value_parser = parse_decimal)]
    quantity: Decimal,
    #[arg(long, value_parser = parse_decimal)]
    unit_cost: Option<Decimal>,
    #[arg(long)]
    counted_by: Option<Uuid>,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Args)]
struct CalculateArgs {
    #[arg(long)]
    period_id: Uuid,
    #[arg(long, default_value = "recipe_based")]
    method: String,
    #[arg(long = "item", help = "Restrict to an item; repeatable")]
    item_ids: Vec<Uuid>,
    #[arg(long, action = ArgAction::SetTrue)]
    recalculate: bool,
}

#[derive(Args)]
struct ReportArgs {
    #[arg(long)]
    period_id: Uuid,
    #[arg(long, value_parser = parse_priority)]
    priority: Option<VariancePriority>,
    #[arg(long, value_parser = parse_investigation_status)]
    status: Option<InvestigationStatus>,
    #[arg(long, value_parser = parse_decimal)]
    min_dollar_impact: Option<Decimal>,
}

#[derive(Args)]
struct TrendsArgs {
    #[arg(long)]
    restaurant_id: Uuid,
    #[arg(long = "item")]
    item_ids: Vec<Uuid>,
    #[arg(long)]
    periods: Option<u64>,
}

#[derive(Args)]
struct InvestigateArgs {
    #[arg(long)]
    analysis_id: Uuid,
    #[arg(long)]
    assigned_to: Uuid,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Args)]
struct ResolveArgs {
    #[arg(long)]
    analysis_id: Uuid,
    #[arg(long)]
    resolved_by: Uuid,
    #[arg(long)]
    explanation: String,
    #[arg(long, value_enum, default_value = "resolved")]
    resolution: ResolutionArg,
}

#[derive(Args)]
struct PosTransformArgs {
    #[arg(long)]
    restaurant_id: Uuid,
    #[arg(long, value_enum)]
    provider: ProviderArg,
}

#[derive(Args)]
struct CsvValidateArgs {
    #[arg(long)]
    restaurant_id: Uuid,
    #[arg(long, value_enum)]
    kind: UploadKind,
    file: PathBuf,
}

#[derive(Args)]
struct CsvTransformArgs {
    #[arg(long)]
    upload_id: Uuid,
    #[arg(long, value_enum)]
    kind: UploadKind,
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,
    #[arg(long, help = "Reject the run when more than this fraction of rows fail")]
    max_error_rate: Option<f64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SnapshotKind {
    Beginning,
    Ending,
}

impl From<SnapshotKind> for SnapshotType {
    fn from(kind: SnapshotKind) -> Self {
        match kind {
            SnapshotKind::Beginning => SnapshotType::Beginning,
            SnapshotKind::Ending => SnapshotType::Ending,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ResolutionArg {
    Resolved,
    Accepted,
    Escalated,
}

impl From<ResolutionArg> for Resolution {
    fn from(arg: ResolutionArg) -> Self {
        match arg {
            ResolutionArg::Resolved => Resolution::Resolved,
            ResolutionArg::Accepted => Resolution::Accepted,
            ResolutionArg::Escalated => Resolution::Escalated,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderArg {
    Square,
    Toast,
}

impl From<ProviderArg> for PosProvider {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Square => PosProvider::Square,
            ProviderArg::Toast => PosProvider::Toast,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum UploadKind {
    Inventory,
    Sales,
}

impl From<UploadKind> for CsvUploadType {
    fn from(kind: UploadKind) -> Self {
        match kind {
            UploadKind::Inventory => CsvUploadType::Inventory,
            UploadKind::Sales => CsvUploadType::Sales,
        }
    }
}

struct CliContext {
    config: AppConfig,
    db: Arc<db::DbPool>,
    services: ServiceContainer,
}

impl CliContext {
    async fn initialize(migrating: bool) -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        if config.auto_migrate && !migrating {
            db::run_migrations(&db_pool)
                .await
                .context("failed to run migrations")?;
        }
        let db = Arc::new(db_pool);

        let (event_sender, event_rx) = events::channel(config.event_channel_capacity);
        tokio::spawn(events::process_events(event_rx));

        let factory =
            ServiceFactory::from_config(Repositories::sea_orm(db.clone()), &config, Some(event_sender));
        let services = ServiceContainer::new(&factory);
        info!(environment = %config.environment, "variance-cli ready");

        Ok(Self {
            config,
            db,
            services,
        })
    }
}

async fn handle_period_command(
    context: &CliContext,
    command: PeriodCommands,
    json: bool,
) -> Result<()> {
    let periods = &context.services.periods;
    let print_period = |period: &backoffice_variance::entities::inventory_period::Model| {
        println!(
            "Period {} '{}' {} to {} is {} (beginning {}, ending {}, analysis {})",
            period.id,
            period.name,
            period.period_start,
            period.period_end,
            period.status,
            period.beginning_snapshot_completed,
            period.ending_snapshot_completed,
            period.variance_analysis_completed
        );
    };

    match command {
        PeriodCommands::Create(args) => {
            let result = periods
                .create_period(CreatePeriodRequest {
                    restaurant_id: args.restaurant_id,
                    name: args.name,
                    period_type: args.period_type,
                    period_start: args.start,
                    period_end: args.end,
                })
                .await;
            render(result, json, print_period)
        }
        PeriodCommands::Activate { period_id } => {
            render(periods.activate_period(period_id).await, json, print_period)
        }
        PeriodCommands::Snapshot(args) => {
            let result = periods
                .record_snapshot(
                    args.period_id,
                    RecordSnapshotRequest {
                        inventory_item_id: args.item_id,
                        snapshot_type: args.snapshot_type.into(),
                        quantity: args.quantity,
                        unit_cost: args.unit_cost,
                        counted_by: args.counted_by,
                        notes: args.notes,
                    },
                )
                .await;
            render(result, json, |snapshot| {
                println!(
                    "Snapshot {} {} qty {} @ {}",
                    snapshot.id, snapshot.snapshot_type, snapshot.quantity, snapshot.unit_cost
                );
            })
        }
        PeriodCommands::CompleteSnapshots {
            period_id,
            snapshot_type,
        } => render(
            periods
                .complete_snapshots(period_id, snapshot_type.into())
                .await,
            json,
            print_period,
        ),
        PeriodCommands::Close { period_id } => {
            render(periods.close_period(period_id).await, json, print_period)
        }
        PeriodCommands::Lock { period_id } => {
            render(periods.lock_period(period_id).await, json, print_period)
        }
        PeriodCommands::List {
            restaurant_id,
            status,
        } => render(
            periods.list_periods(restaurant_id, status).await,
            json,
            |list| list.iter().for_each(print_period),
        ),
    }
}

async fn handle_calculate(context: &CliContext, args: CalculateArgs, json: bool) -> Result<()> {
    let request = CalculationRequest {
        method: args.method,
        item_ids: if args.item_ids.is_empty() {
            None
        } else {
            Some(args.item_ids)
        },
        recalculate: args.recalculate,
    };
    let result = context
        .services
        .usage
        .calculate_usage_for_period(args.period_id, request)
        .await;
    render_collected(result, json, |outcome| {
        for analysis in &outcome.analyses {
            println!(
                "{} theoretical {} actual {} variance {} ({}%) ${} {}",
                analysis.inventory_item_id,
                analysis.theoretical_quantity,
                analysis.actual_quantity,
                analysis.variance_quantity,
                analysis.variance_percentage,
                analysis.variance_dollar_value,
                analysis.priority
            );
        }
        if !outcome.skipped.is_empty() {
            println!("{} items kept their existing analysis", outcome.skipped.len());
        }
    })
}

async fn handle_report(context: &CliContext, args: ReportArgs, json: bool) -> Result<()> {
    let filter = VarianceFilter {
        priority: args.priority,
        status: args.status,
        min_dollar_impact: args.min_dollar_impact,
    };
    let result = context
        .services
        .reporting
        .analyze_period_variance(args.period_id, filter)
        .await;
    render(result, json, |report| {
        for analysis in &report.analyses {
            println!(
                "{} {:<8} ${:>10} {}",
                analysis.id,
                analysis.priority,
                analysis.variance_dollar_value,
                analysis.investigation_status
            );
        }
        println!(
            "{} analyses, |$| {}, net ${}",
            report.totals.count, report.totals.total_absolute_dollar, report.totals.net_dollar
        );
    })
}

async fn handle_trends(context: &CliContext, args: TrendsArgs, json: bool) -> Result<()> {
    let query = TrendQuery {
        item_ids: if args.item_ids.is_empty() {
            None
        } else {
            Some(args.item_ids)
        },
        periods: args.periods,
    };
    let result = context
        .services
        .reporting
        .historical_variance_trends(args.restaurant_id, query)
        .await;
    render(result, json, |trends| {
        for trend in trends {
            println!(
                "{} {} over {} periods, average ${}",
                trend.item_id,
                trend.direction,
                trend.points.len(),
                trend.average_variance_dollar
            );
        }
    })
}

fn render<T: Serialize>(
    result: Result<T, backoffice_variance::errors::ServiceError>,
    json: bool,
    human: impl FnOnce(&T),
) -> Result<()> {
    emit(OperationResult::from_result(result), json, human)
}

fn render_collected<T: Serialize + CollectedErrors>(
    result: Result<T, backoffice_variance::errors::ServiceError>,
    json: bool,
    human: impl FnOnce(&T),
) -> Result<()> {
    emit(OperationResult::collect(result), json, human)
}

fn emit<T: Serialize>(outcome: OperationResult<T>, json: bool, human: impl FnOnce(&T)) -> Result<()> {
    if json {
        print_json(&outcome)?;
    } else {
        if let Some(data) = &outcome.data {
            human(data);
        }
        for error in &outcome.errors {
            match (error.item_id, error.row_number) {
                (Some(item), _) => eprintln!("item {}: {}", item, error.message),
                (None, Some(row)) => eprintln!("row {}: {}", row, error.message),
                _ => eprintln!("{}", error.message),
            }
        }
    }

    if outcome.success {
        Ok(())
    } else {
        Err(anyhow::anyhow!(outcome
            .message
            .unwrap_or_else(|| "operation failed".to_string())))
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_decimal(raw: &str) -> Result<Decimal, String> {
    Decimal::from_str(raw).map_err(|_| format!("invalid decimal '{raw}'"))
}

fn parse_period_type(raw: &str) -> Result<PeriodType, String> {
    PeriodType::from_str(raw).map_err(|_| format!("invalid period type '{raw}'"))
}

fn parse_period_status(raw: &str) -> Result<PeriodStatus, String> {
    PeriodStatus::from_str(raw).map_err(|_| format!("invalid period status '{raw}'"))
}

fn parse_priority(raw: &str) -> Result<VariancePriority, String> {
    VariancePriority::from_str(raw).map_err(|_| format!("invalid priority '{raw}'"))
}

fn parse_investigation_status(raw: &str) -> Result<InvestigationStatus, String> {
    InvestigationStatus::from_str(raw).map_err(|_| format!("invalid investigation status '{raw}'"))
}
