use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::application::{ExpenseFilter, LedgerService};
use crate::config::{DATA_DIR_ENV, DEFAULT_DATA_DIR, LedgerConfig};
use crate::domain::{Expense, NewExpense, Split, format_cents, format_signed_cents, parse_cents};

/// Splitwise - shared expense ledger
#[derive(Parser)]
#[command(name = "splitwise")]
#[command(about = "Track shared expenses in a crash-safe ledger file that several processes can share")]
#[command(version)]
pub struct Cli {
    /// Directory holding the ledger file
    #[arg(long, env = DATA_DIR_ENV, default_value = DEFAULT_DATA_DIR, global = true)]
    pub data_dir: PathBuf,

    /// How long to wait for the ledger lease before giving up (milliseconds)
    #[arg(long, env = "SPLITWISE_LOCK_TIMEOUT_MS", default_value_t = 5000, global = true)]
    pub lock_timeout_ms: u64,

    /// Lifetime of a lease before other processes may reclaim it (milliseconds)
    #[arg(long, env = "SPLITWISE_LEASE_TTL_MS", default_value_t = 15000, global = true)]
    pub lease_ttl_ms: u64,

    /// Commit attempts before a contended write is reported as overloaded
    #[arg(long, env = "SPLITWISE_MAX_ATTEMPTS", default_value_t = 5, global = true)]
    pub max_attempts: u32,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to listen on
        #[arg(long, env = "SPLITWISE_BIND", default_value = "0.0.0.0:8000")]
        bind: SocketAddr,
    },

    /// Record a shared expense
    Add {
        /// Amount paid (e.g., "60.00" or "60")
        amount: String,

        /// Who paid
        #[arg(long)]
        payer: String,

        /// Exact share as NAME:AMOUNT (repeatable)
        #[arg(short, long = "split", conflicts_with = "among")]
        splits: Vec<String>,

        /// Split equally among these participants (comma separated)
        #[arg(long, value_delimiter = ',')]
        among: Vec<String>,

        /// Description of the expense
        #[arg(short, long, default_value = "")]
        description: String,
    },

    /// Record a repayment between two participants
    Pay {
        /// Amount repaid
        amount: String,

        /// Who pays back
        #[arg(long)]
        from: String,

        /// Who receives the money
        #[arg(long)]
        to: String,

        /// Description of the payment
        #[arg(short, long)]
        description: Option<String>,
    },

    /// List recorded expenses
    Expenses {
        /// Only expenses involving this participant
        #[arg(long)]
        participant: Option<String>,

        /// Maximum number of expenses to show (most recent)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show detailed expense information
    Show {
        /// Expense ID
        id: String,
    },

    /// Show net balance per participant
    Balances,

    /// Suggest transfers that settle all balances
    Settle,

    /// Verify ledger integrity
    Check,

    /// Export data to CSV or JSON
    Export {
        /// What to export: expenses, balances, settlements, full
        export_type: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Format: csv, json (default: csv for most types, json for full)
        #[arg(short, long)]
        format: Option<String>,
    },
}

impl Cli {
    pub fn config(&self) -> LedgerConfig {
        LedgerConfig::new(&self.data_dir)
            .with_lock_timeout(Duration::from_millis(self.lock_timeout_ms))
            .with_lease_ttl(Duration::from_millis(self.lease_ttl_ms))
            .with_max_attempts(self.max_attempts)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config();
        let service = LedgerService::open(&config)
            .await
            .with_context(|| format!("Failed to open ledger in {}", config.data_dir().display()))?;

        match self.command {
            Commands::Serve { bind } => {
                crate::server::serve(service, bind).await?;
            }

            Commands::Add {
                amount,
                payer,
                splits,
                among,
                description,
            } => {
                let amount = parse_cents(&amount)
                    .with_context(|| format!("Invalid amount: {}", amount))?;
                let input = if among.is_empty() {
                    let splits = splits
                        .iter()
                        .map(|s| parse_split(s))
                        .collect::<Result<Vec<_>>>()?;
                    NewExpense::exact(description, amount, payer, splits)
                } else {
                    NewExpense::equal(description, amount, payer, among)
                };

                let expense = service.add_expense(input).await?;
                println!(
                    "Recorded expense: {} paid by {} ({})",
                    format_cents(expense.amount),
                    expense.payer,
                    expense.id
                );
            }

            Commands::Pay {
                amount,
                from,
                to,
                description,
            } => {
                let amount = parse_cents(&amount)
                    .with_context(|| format!("Invalid amount: {}", amount))?;
                let payment = service
                    .record_payment(from.clone(), to.clone(), amount, description)
                    .await?;
                println!(
                    "Recorded payment: {} from {} to {} ({})",
                    format_cents(payment.amount),
                    from,
                    to,
                    payment.id
                );
            }

            Commands::Expenses { participant, limit } => {
                let filter = ExpenseFilter { participant, limit };
                let expenses = service.list_expenses_filtered(filter).await?;
                print_expenses(&expenses);
            }

            Commands::Show { id } => {
                let expense_id = Uuid::parse_str(&id).context("Invalid expense ID format")?;
                let expense = service.get_expense(expense_id).await?;
                print_expense(&expense);
            }

            Commands::Balances => {
                let balances = service.get_balances().await?;
                if balances.is_empty() {
                    println!("No participants yet.");
                } else {
                    println!(
                        "{:<20} {:>12} {:>12} {:>12}",
                        "PARTICIPANT", "PAID", "OWED", "NET"
                    );
                    println!("{}", "-".repeat(59));
                    for balance in &balances {
                        println!(
                            "{:<20} {:>12} {:>12} {:>12}",
                            truncate(&balance.participant, 20),
                            format_cents(balance.paid),
                            format_cents(balance.owed),
                            format_signed_cents(balance.net)
                        );
                    }
                }
            }

            Commands::Settle => {
                let plan = service.settlement_plan().await?;
                if plan.is_empty() {
                    println!("Everyone is settled up.");
                } else {
                    println!("{:<20} {:<20} {:>12}", "FROM", "TO", "AMOUNT");
                    println!("{}", "-".repeat(54));
                    for settlement in &plan {
                        println!(
                            "{:<20} {:<20} {:>12}",
                            truncate(&settlement.from, 20),
                            truncate(&settlement.to, 20),
                            format_cents(settlement.amount)
                        );
                    }
                }
            }

            Commands::Check => {
                run_check_command(&service).await?;
            }

            Commands::Export {
                export_type,
                output,
                format,
            } => {
                run_export_command(&service, &export_type, output.as_deref(), format.as_deref())
                    .await?;
            }
        }

        Ok(())
    }
}

/// Parse a `NAME:AMOUNT` share.
fn parse_split(raw: &str) -> Result<Split> {
    let (participant, amount) = raw
        .rsplit_once(':')
        .with_context(|| format!("Split must look like NAME:AMOUNT, got '{}'", raw))?;
    let owed = parse_cents(amount).with_context(|| format!("Invalid split amount in '{}'", raw))?;
    Ok(Split::new(participant.trim(), owed))
}

fn print_expenses(expenses: &[Expense]) {
    if expenses.is_empty() {
        println!("No expenses found.");
        return;
    }

    println!(
        "{:<12} {:>10} {:<15} {:<25} DESCRIPTION",
        "DATE", "AMOUNT", "PAYER", "SPLIT AMONG"
    );
    println!("{}", "-".repeat(80));
    for expense in expenses.iter().rev() {
        let among = expense
            .splits
            .iter()
            .map(|s| s.participant.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "{:<12} {:>10} {:<15} {:<25} {}",
            expense.created_at.format("%Y-%m-%d"),
            format_cents(expense.amount),
            truncate(&expense.payer, 15),
            truncate(&among, 25),
            truncate(&expense.description, 30)
        );
    }
}

fn print_expense(expense: &Expense) {
    println!("Expense: {}", expense.id);
    println!(
        "  Date:        {}",
        expense.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!("  Amount:      {}", format_cents(expense.amount));
    println!("  Paid by:     {}", expense.payer);
    if !expense.description.is_empty() {
        println!("  Description: {}", expense.description);
    }
    println!("  Splits:");
    for split in &expense.splits {
        println!(
            "    {:<20} {:>12}",
            truncate(&split.participant, 20),
            format_cents(split.owed_amount)
        );
    }
}

async fn run_check_command(service: &LedgerService) -> Result<()> {
    println!("Checking ledger integrity...\n");

    let check = service.check_integrity().await?;
    let report = &check.report;

    println!("Schema:       {}", report.schema_version);
    println!("Version:      {}", report.version);
    println!("Expenses:     {}", report.expense_count);
    println!("Participants: {}", report.participant_count);
    println!("Total spent:  {}", format_cents(report.total_amount));
    println!(
        "Net balances: {}  {}",
        format_signed_cents(report.balance_total),
        if report.balance_total == 0 {
            "OK"
        } else {
            "UNBALANCED!"
        }
    );
    println!();

    match &check.lease {
        Some(lease) => println!(
            "Lease held by {} (token {}, expires {}){}",
            lease.owner,
            lease.token,
            lease.expires_at.format("%Y-%m-%d %H:%M:%S"),
            if lease.is_expired() { " [stale]" } else { "" }
        ),
        None => println!("No writer holds the lease."),
    }
    println!();

    if report.is_ok() {
        println!("Ledger is consistent.");
    } else {
        println!("Issues found:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
        anyhow::bail!("Ledger integrity check failed");
    }

    Ok(())
}

async fn run_export_command(
    service: &LedgerService,
    export_type: &str,
    output: Option<&str>,
    format: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;
    use std::fs::File;
    use std::io::{Write, stdout};

    let exporter = Exporter::new(service);

    let writer: Box<dyn Write> = match output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path))?;
            Box::new(file)
        }
        None => Box::new(stdout()),
    };

    let format = format.unwrap_or(if export_type == "full" { "json" } else { "csv" });

    match (export_type, format) {
        ("expenses", "csv") => {
            let count = exporter.export_expenses_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} expenses", count);
            }
        }
        ("balances", "csv") => {
            let count = exporter.export_balances_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} balances", count);
            }
        }
        ("settlements", "csv") => {
            let count = exporter.export_settlements_csv(writer).await?;
            if output.is_some() {
                eprintln!("Exported {} settlements", count);
            }
        }
        ("full", "json") => {
            let snapshot = exporter.export_full_json(writer).await?;
            if output.is_some() {
                eprintln!(
                    "Exported ledger version {}: {} expenses, {} participants",
                    snapshot.ledger.version,
                    snapshot.ledger.expenses.len(),
                    snapshot.balances.len()
                );
            }
        }
        ("expenses" | "balances" | "settlements" | "full", other) => {
            anyhow::bail!("Unsupported format '{}' for {} export", other, export_type);
        }
        _ => {
            anyhow::bail!(
                "Unknown export type: {}. Valid types: expenses, balances, settlements, full",
                export_type
            );
        }
    }

    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
