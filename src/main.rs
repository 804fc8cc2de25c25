use chrono::{TimeDelta, Utc};
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use rentpilot::application::executor::PaymentExecutor;
use rentpilot::application::gateway::PaymentGateway;
use rentpilot::application::invoices::{InvoiceService, Role};
use rentpilot::application::policy::DecisionPolicy;
use rentpilot::application::scheduler::MonitoringScheduler;
use rentpilot::config::EngineConfig;
use rentpilot::domain::decision::{LatePaymentContext, PaymentContext, PaymentHistoryEntry};
use rentpilot::domain::invoice::{Amount, InvoiceFilter};
use rentpilot::domain::ports::{
    InferenceClientRef, InvoiceStore, InvoiceStoreRef, NotificationSinkRef, PropertyStore,
    PropertyStoreRef, WalletApiRef,
};
use rentpilot::error::EngineError;
use rentpilot::infrastructure::broadcast::BroadcastNotifier;
use rentpilot::infrastructure::circle::{CircleWalletClient, EntitySecret};
use rentpilot::infrastructure::in_memory::{InMemoryInvoiceStore, InMemoryPropertyStore};
use rentpilot::infrastructure::inference::{ChainedInference, GeminiClient, OpenAiCompatibleClient};
#[cfg(feature = "storage-rocksdb")]
use rentpilot::infrastructure::rocksdb::RocksDBStore;
use rentpilot::interfaces::csv::invoice_writer::InvoiceWriter;
use rentpilot::interfaces::csv::seed_reader::SeedReader;
use rentpilot::telemetry;
use serde::Serialize;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const NOTIFICATION_CAPACITY: usize = 64;
const HISTORY_LIMIT: usize = 5;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Properties CSV to load before running the command
    #[arg(long, global = true)]
    properties: Option<PathBuf>,

    /// Invoices CSV to load before running the command
    #[arg(long, global = true)]
    invoices: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitoring scheduler until interrupted
    Monitor {
        /// Run a single cycle, print its report and exit
        #[arg(long)]
        once: bool,
    },
    /// Pay an invoice on behalf of its tenant
    Pay {
        /// Invoice id. Defaults to the tenant's earliest pending invoice.
        invoice: Option<String>,
        #[arg(long)]
        tenant: String,
    },
    /// Ask the decision policy about a payment situation
    Decide {
        #[command(subcommand)]
        situation: Situation,
    },
    /// Write invoices as CSV to stdout
    Report {
        #[arg(long, conflicts_with = "tenant")]
        owner: Option<String>,
        #[arg(long)]
        tenant: Option<String>,
    },
    /// Invoice counts, income and recent payments
    Summary {
        #[arg(long)]
        owner: String,
        /// Also list this tenant's recent payments
        #[arg(long)]
        tenant: Option<String>,
    },
    /// Cancel a pending invoice
    Cancel {
        invoice: String,
        #[arg(long)]
        owner: String,
    },
    /// Show balances and recent transactions of a custodial wallet
    Wallet {
        /// Defaults to the configured tenant wallet
        wallet_id: Option<String>,
    },
}

#[derive(Subcommand)]
enum Situation {
    /// An invoice past its due date
    Late {
        #[arg(long)]
        days_overdue: i64,
        #[arg(long)]
        amount: String,
        #[arg(long, default_value = "tenant")]
        tenant: String,
        #[arg(long, default_value = "property")]
        property: String,
    },
    /// A payment ahead of its due date
    PreDue {
        #[arg(long)]
        due_in_days: i64,
        #[arg(long)]
        amount: String,
        #[arg(long, default_value = "tenant")]
        tenant: String,
        #[arg(long, default_value = "property")]
        property: String,
    },
}

struct Stores {
    invoices: InvoiceStoreRef,
    properties: PropertyStoreRef,
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    if let Some(db_path) = db_path {
        let store = RocksDBStore::open(db_path).into_diagnostic()?;
        return Ok(Stores {
            invoices: Arc::new(store.clone()),
            properties: Arc::new(store),
        });
    }
    Ok(in_memory_stores())
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<PathBuf>) -> Result<Stores> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(in_memory_stores())
}

fn in_memory_stores() -> Stores {
    Stores {
        invoices: Arc::new(InMemoryInvoiceStore::new()),
        properties: Arc::new(InMemoryPropertyStore::new()),
    }
}

async fn load_seed(cli: &Cli, stores: &Stores) -> Result<()> {
    if let Some(path) = &cli.properties {
        let file = File::open(path).into_diagnostic()?;
        for property in SeedReader::new(file).properties() {
            match property {
                Ok(property) => stores.properties.insert(property).await.into_diagnostic()?,
                Err(e) => eprintln!("Error reading property: {}", e),
            }
        }
    }
    if let Some(path) = &cli.invoices {
        let file = File::open(path).into_diagnostic()?;
        for invoice in SeedReader::new(file).invoices(Utc::now()) {
            match invoice {
                Ok(invoice) => stores.invoices.insert(invoice).await.into_diagnostic()?,
                Err(e) => eprintln!("Error reading invoice: {}", e),
            }
        }
    }
    Ok(())
}

fn inference_client(config: &EngineConfig) -> Result<Option<InferenceClientRef>> {
    let timeout = config.inference_timeout();
    let mut providers: Vec<(String, InferenceClientRef)> = Vec::new();
    if let Some(key) = config.gemini_api_key.as_deref().filter(|k| !k.is_empty()) {
        let client = GeminiClient::new(key, &config.gemini_model, timeout).into_diagnostic()?;
        providers.push(("gemini".to_string(), Arc::new(client)));
    }
    if let Some(key) = config.openai_api_key.as_deref().filter(|k| !k.is_empty()) {
        let client = OpenAiCompatibleClient::new(&config.openai_api_url, key, &config.openai_model, timeout)
            .into_diagnostic()?;
        providers.push(("openai".to_string(), Arc::new(client)));
    }
    let chain = ChainedInference::new(providers);
    if chain.is_empty() {
        info!("no inference provider configured, decisions use the deterministic rule");
        return Ok(None);
    }
    Ok(Some(Arc::new(chain)))
}

fn wallet_client(config: &EngineConfig) -> Result<Option<WalletApiRef>> {
    let Some(key) = config.wallet_api_key.as_deref().filter(|k| !k.is_empty()) else {
        info!("wallet API not configured, transfers will be simulated");
        return Ok(None);
    };
    let entity_secret = config
        .wallet_entity_secret
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(EntitySecret::from_hex)
        .transpose()
        .into_diagnostic()?;
    let client = CircleWalletClient::new(
        &config.wallet_api_url,
        key,
        entity_secret,
        config.inference_timeout(),
    )
    .into_diagnostic()?;
    Ok(Some(Arc::new(client)))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = EngineConfig::from_env().into_diagnostic()?;
    telemetry::init_tracing(&config.log_level, config.log_json);

    let stores = open_stores(cli.db_path.clone())?;
    load_seed(&cli, &stores).await?;

    let sink: NotificationSinkRef = Arc::new(BroadcastNotifier::new(NOTIFICATION_CAPACITY));
    let policy = Arc::new(DecisionPolicy::new(
        inference_client(&config)?,
        config.inference_timeout(),
    ));
    let gateway = Arc::new(PaymentGateway::new(wallet_client(&config)?));
    let service = InvoiceService::new(stores.invoices.clone(), sink.clone());

    match cli.command {
        Commands::Monitor { once } => {
            let scheduler = MonitoringScheduler::new(
                stores.invoices.clone(),
                policy,
                sink,
                config.scheduler_settings(),
            );
            if once {
                let report = scheduler.run_cycle_at(Utc::now()).await.into_diagnostic()?;
                print_json(&report)?;
            } else {
                scheduler.start();
                tokio::signal::ctrl_c().await.into_diagnostic()?;
                info!("interrupt received, shutting down");
                scheduler.shutdown().await;
                print_json(&scheduler.status())?;
            }
        }
        Commands::Pay { invoice, tenant } => {
            let executor = PaymentExecutor::new(
                stores.invoices.clone(),
                stores.properties.clone(),
                gateway,
                sink,
                config.payment_settings(),
            );
            let receipt = match invoice {
                Some(invoice_id) => executor.pay(&invoice_id, &tenant).await,
                None => executor.pay_next_due(&tenant).await,
            }
            .into_diagnostic()?;
            print_json(&receipt)?;
        }
        Commands::Decide { situation } => match situation {
            Situation::Late {
                days_overdue,
                amount,
                tenant,
                property,
            } => {
                let ctx = LatePaymentContext {
                    days_overdue,
                    amount: amount.parse::<Amount>().into_diagnostic()?,
                    tenant_id: tenant,
                    property_name: property,
                };
                print_json(&policy.decide_late_payment(&ctx).await)?;
            }
            Situation::PreDue {
                due_in_days,
                amount,
                tenant,
                property,
            } => {
                let now = Utc::now();
                let due_date = TimeDelta::try_days(due_in_days)
                    .and_then(|d| now.checked_add_signed(d))
                    .ok_or_else(|| {
                        EngineError::ValidationError(format!(
                            "due date {} days from now is out of range",
                            due_in_days
                        ))
                    })
                    .into_diagnostic()?;
                let history = service
                    .payment_history(&tenant, HISTORY_LIMIT)
                    .await
                    .into_diagnostic()?
                    .into_iter()
                    .map(|invoice| PaymentHistoryEntry {
                        amount: invoice.amount,
                        due_date: invoice.due_date,
                        paid_date: invoice.paid_date,
                    })
                    .collect();
                let ctx = PaymentContext {
                    property_id: property,
                    tenant,
                    amount: amount.parse::<Amount>().into_diagnostic()?,
                    due_date,
                    current_date: now,
                    tenant_balance: None,
                    history,
                };
                print_json(&policy.decide_pre_due(&ctx).await)?;
            }
        },
        Commands::Report { owner, tenant } => {
            let invoices = match (owner, tenant) {
                (Some(owner), _) => service.list_for(Role::Owner, &owner).await,
                (None, Some(tenant)) => service.list_for(Role::Tenant, &tenant).await,
                (None, None) => stores.invoices.find(&InvoiceFilter::default()).await,
            }
            .into_diagnostic()?;

            let stdout = io::stdout();
            let mut writer = InvoiceWriter::new(stdout.lock());
            writer.write_invoices(&invoices).into_diagnostic()?;
        }
        Commands::Summary { owner, tenant } => {
            let summary = service.status_summary(&owner, Utc::now()).await.into_diagnostic()?;
            let income = service.income_report(&owner).await.into_diagnostic()?;
            let properties = stores
                .properties
                .find_by_owner(&owner)
                .await
                .into_diagnostic()?;
            let history = match tenant {
                Some(tenant) => service
                    .payment_history(&tenant, HISTORY_LIMIT)
                    .await
                    .into_diagnostic()?,
                None => Vec::new(),
            };
            print_json(&serde_json::json!({
                "status": summary,
                "income": income,
                "properties": properties,
                "recentPayments": history,
            }))?;
        }
        Commands::Cancel { invoice, owner } => {
            let cancelled = service.cancel(&invoice, &owner).await.into_diagnostic()?;
            print_json(&cancelled)?;
        }
        Commands::Wallet { wallet_id } => {
            let wallet_id = wallet_id
                .or_else(|| config.payment_settings().tenant_wallet_id)
                .ok_or_else(|| miette::miette!("no wallet id given and none configured"))?;
            let balances = gateway.balance(&wallet_id).await.into_diagnostic()?;
            let transactions = gateway
                .transactions(&wallet_id, &config.network)
                .await
                .into_diagnostic()?;
            print_json(&serde_json::json!({
                "walletId": wallet_id,
                "balances": balances,
                "transactions": transactions,
            }))?;
        }
    }

    Ok(())
}
