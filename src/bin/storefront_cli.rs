use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use storefront_core::{
    config::{self, AppConfig},
    db,
    events::{self, EventHandler, LoggingEventHandler},
    models::{Order, OrderStatus, PaymentStatus, User},
    repositories::{DocumentStore, SqlDocumentStore},
    services::{
        order_status::OrderStatistics,
        payments::{GatewayHandle, PaymentError},
    },
    Storefront,
};
use tracing::debug;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize(&cli.admin_id).await?;

    match cli.command {
        Commands::Orders(command) => handle_orders_command(&context, command, cli.json).await?,
        Commands::Stats => handle_stats(&context, cli.json).await?,
        Commands::Users(command) => handle_users_command(&context, command, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "storefront", about = "Storefront admin CLI for orders and users", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[arg(long, global = true, help = "Id of the admin user the CLI acts as")]
    admin_id: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(subcommand)]
    Orders(OrdersCommands),
    /// Dashboard statistics over all orders
    Stats,
    #[command(subcommand)]
    Users(UsersCommands),
}

#[derive(Subcommand)]
enum OrdersCommands {
    List(ListOrdersArgs),
    Get(GetOrderArgs),
    SetStatus(SetOrderStatusArgs),
    SetPaymentStatus(SetPaymentStatusArgs),
}

#[derive(Subcommand)]
enum UsersCommands {
    List,
}

#[derive(Args)]
struct ListOrdersArgs {
    #[arg(long, help = "Only orders placed by this user id")]
    user: Option<String>,
}

#[derive(Args)]
struct GetOrderArgs {
    #[arg(value_parser = clap::value_parser!(Uuid), help = "Order identifier (UUID)")]
    id: Uuid,
}

#[derive(Args)]
struct SetOrderStatusArgs {
    #[arg(value_parser = clap::value_parser!(Uuid), help = "Order identifier (UUID)")]
    id: Uuid,
    #[arg(help = "pending, processing, shipped, completed or cancelled")]
    status: OrderStatus,
}

#[derive(Args)]
struct SetPaymentStatusArgs {
    #[arg(value_parser = clap::value_parser!(Uuid), help = "Order identifier (UUID)")]
    id: Uuid,
    #[arg(help = "pending, completed or failed")]
    status: PaymentStatus,
}

struct CliContext {
    storefront: Storefront,
    admin: User,
}

impl CliContext {
    async fn initialize(admin_id: &str) -> Result<Self> {
        let config: AppConfig =
            config::load_config().context("failed to load application config")?;
        config::init_tracing(&config.log_level, config.log_json);

        let db = db::connect_and_migrate(&config)
            .await
            .context("failed to connect to database")?;
        let store: Arc<dyn DocumentStore> = Arc::new(SqlDocumentStore::new(Arc::new(db)));

        // Card checkouts run in the shopper's browser, never from here.
        let gateway = GatewayHandle::lazy(|| async {
            Err(PaymentError::Provider(
                "card gateway is not available from the CLI".to_string(),
            ))
        });

        let (storefront, event_rx) =
            Storefront::build(config, store, gateway).context("failed to wire services")?;

        let handlers: Vec<Arc<dyn EventHandler>> = vec![Arc::new(LoggingEventHandler)];
        tokio::spawn(events::process_events(event_rx, handlers));

        let admin = storefront
            .users
            .get(admin_id)
            .await
            .with_context(|| format!("failed to look up user {}", admin_id))?
            .ok_or_else(|| anyhow!("user {} not found", admin_id))?;
        debug!(target: "storefront_cli", user_id = %admin.id, role = %admin.role, "acting user resolved");

        Ok(Self { storefront, admin })
    }
}

async fn handle_orders_command(
    context: &CliContext,
    command: OrdersCommands,
    json: bool,
) -> Result<()> {
    let queries = &context.storefront.order_queries;
    let status = &context.storefront.order_status;

    match command {
        OrdersCommands::List(args) => {
            let orders = match args.user {
                Some(user_id) => {
                    storefront_core::auth::require_admin(&context.admin)?;
                    queries
                        .list_for_user(&user_id)
                        .await
                        .with_context(|| format!("failed to list orders of {}", user_id))?
                }
                None => queries
                    .list_all(&context.admin)
                    .await
                    .context("failed to list orders")?,
            };
            if json {
                print_json(&orders)?;
            } else {
                println!("{} order(s)", orders.len());
                for order in &orders {
                    render_order(order);
                }
            }
        }
        OrdersCommands::Get(args) => {
            storefront_core::auth::require_admin(&context.admin)?;
            let order = queries
                .get_by_id(args.id)
                .await
                .with_context(|| format!("failed to fetch order {}", args.id))?;
            if json {
                print_json(&order)?;
            } else {
                render_order(&order);
                for item in &order.items {
                    println!(
                        "  • {} x {} @ {} (total {})",
                        item.quantity,
                        item.name,
                        item.price,
                        item.subtotal()
                            .map_or_else(|| "out of range".to_string(), |s| s.to_string())
                    );
                }
            }
        }
        OrdersCommands::SetStatus(args) => {
            let order = status
                .set_order_status(&context.admin, args.id, args.status)
                .await
                .with_context(|| format!("failed to update status of order {}", args.id))?;
            if json {
                print_json(&order)?;
            } else {
                println!("Order {} is now {}", order.id, order.status);
            }
        }
        OrdersCommands::SetPaymentStatus(args) => {
            let order = status
                .set_payment_status(&context.admin, args.id, args.status)
                .await
                .with_context(|| format!("failed to update payment of order {}", args.id))?;
            if json {
                print_json(&order)?;
            } else {
                println!("Order {} payment is now {}", order.id, order.payment.status);
            }
        }
    }

    Ok(())
}

async fn handle_stats(context: &CliContext, json: bool) -> Result<()> {
    let stats = context
        .storefront
        .order_status
        .statistics(&context.admin)
        .await
        .context("failed to compute statistics")?;
    if json {
        print_json(&stats)?;
    } else {
        render_stats(&stats, &context.storefront.config.currency);
    }
    Ok(())
}

async fn handle_users_command(
    context: &CliContext,
    command: UsersCommands,
    json: bool,
) -> Result<()> {
    match command {
        UsersCommands::List => {
            let users = context
                .storefront
                .order_status
                .list_users(&context.admin)
                .await
                .context("failed to list users")?;
            if json {
                print_json(&users)?;
            } else {
                for user in &users {
                    println!(
                        "- User {} • {} <{}> • {} • joined {}",
                        user.id,
                        user.name,
                        user.email,
                        user.role,
                        user.created_at.format("%Y-%m-%d")
                    );
                }
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_order(order: &Order) {
    println!(
        "- Order {} • user {} • status {} • payment {} ({}) • total {} • placed {}",
        order.id,
        order.user_id,
        order.status,
        order.payment.status,
        order.payment.method(),
        order.total,
        order.created_at.to_rfc3339()
    );
}

fn render_stats(stats: &OrderStatistics, currency: &str) {
    println!("Total revenue:    {} {}", stats.total_revenue, currency);
    println!("Total orders:     {}", stats.total_orders);
    println!("  pending:        {}", stats.pending_orders);
    println!("  processing:     {}", stats.processing_orders);
    println!("  shipped:        {}", stats.shipped_orders);
    println!("  completed:      {}", stats.completed_orders);
    println!("  cancelled:      {}", stats.cancelled_orders);
}
