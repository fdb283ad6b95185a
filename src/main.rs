use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::warn;

use beatvault::backend::select_backend;
use beatvault::catalog::{Catalog, FileCatalog};
use beatvault::clock::SystemClock;
use beatvault::config::AppConfig;
use beatvault::fulfillment::FulfillmentService;
use beatvault::ledger::SalesLedger;
use beatvault::notify::Notifier;
use beatvault::server::{self, AppState};
use beatvault::tokens::TokenStore;
use beatvault::verify::{PaymentAuthority, PaymentVerifier, PaypalAuthority, UnconfiguredAuthority};
use beatvault::{logging, metrics};

#[derive(Parser)]
#[command(name = "beatvault")]
#[command(about = "BeatVault storefront purchase fulfillment service")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the fulfillment HTTP server
    Serve {
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Print lifetime and trailing-24h sales statistics
    Stats,
    /// Print the most recent sales
    Recent {
        /// Maximum number of sales to print
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    match cli.command {
        Commands::Serve { port } => {
            metrics::init_metrics();

            let backend = select_backend(config.redis_url.as_deref()).await;
            let clock = Arc::new(SystemClock);
            let catalog: Arc<dyn Catalog> = Arc::new(FileCatalog::load(&config.catalog_path)?);

            let authority: Arc<dyn PaymentAuthority> = match &config.paypal {
                Some(paypal) => Arc::new(PaypalAuthority::new(paypal.clone())),
                None => {
                    warn!("payment authority credentials not configured, all verifications will fail");
                    Arc::new(UnconfiguredAuthority)
                }
            };
            if config.admin_api_key.is_none() {
                warn!("ADMIN_API_KEY not configured, admin reporting surface is disabled");
            }

            let tokens = TokenStore::new(
                backend.clone(),
                clock.clone(),
                chrono::Duration::hours(config.token_lifetime_hours),
            );
            let ledger = Arc::new(SalesLedger::new(backend.clone(), clock.clone()));
            let verifier = PaymentVerifier::new(authority, catalog.clone(), config.currency.clone());
            let notifier = Notifier::from_config(&config.webhooks);
            let service = FulfillmentService::new(
                verifier,
                tokens,
                ledger.clone(),
                notifier,
                catalog,
            );

            let state = Arc::new(AppState {
                service,
                ledger,
                admin_api_key: config.admin_api_key.clone(),
            });
            server::start_server(state, port).await?;
        }
        Commands::Stats => {
            let backend = select_backend(config.redis_url.as_deref()).await;
            let ledger = SalesLedger::new(backend, Arc::new(SystemClock));
            let stats = ledger.stats().await;

            println!("📊 Sales stats:");
            println!("   Total sales:   {}", stats.total_sale_count);
            println!("   Total revenue: ${}", stats.total_revenue);
            println!(
                "   Last 24h:      {} sales / ${}",
                stats.sale_count_24h, stats.revenue_24h
            );
            if !stats.top_items.is_empty() {
                println!("   Top items:");
                for item in &stats.top_items {
                    println!(
                        "     {:>3}x {} ({})",
                        item.sale_count, item.item_title, item.item_id
                    );
                }
            }
        }
        Commands::Recent { limit } => {
            let backend = select_backend(config.redis_url.as_deref()).await;
            let ledger = SalesLedger::new(backend, Arc::new(SystemClock));

            let sales = ledger.recent(limit).await;
            if sales.is_empty() {
                println!("No recorded sales.");
            }
            for record in sales {
                println!(
                    "   {} ${} {} -> {} [{}]",
                    record.occurred_at_iso(),
                    record.amount(),
                    record.item_title,
                    record.buyer_contact,
                    record.transaction_id
                );
            }
        }
    }
    Ok(())
}
