pub mod board;
pub mod card;
pub mod config;
pub mod engine;
pub mod gradient;
pub mod log;
pub mod market;
pub mod orchestrator;
pub mod period;
pub mod portfolio;
pub mod provider;
pub mod providers;
pub mod quote;
pub mod store;
pub mod ui;

use crate::config::AppConfig;
use crate::engine::Engine;
use crate::period::Period;
use crate::quote::FetchCycleReport;
use crate::store::KeyValueStore;
use anyhow::Result;
use comfy_table::Cell;
use std::time::Duration;
use tracing::{debug, info};

pub enum AppCommand {
    Board,
    Watch,
    Add { symbol: String, quantity: f64 },
    Edit { symbol: String, quantity: f64 },
    Remove { symbol: String },
    Holdings,
}

pub async fn run_command(
    command: AppCommand,
    config_path: Option<&str>,
    period: Option<Period>,
    currency: Option<&str>,
) -> Result<()> {
    info!("pulseboard starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let period = period.unwrap_or(Period::Day);
    let data_path = AppConfig::default_data_path()?.join("store");
    let kv = KeyValueStore::open(&data_path)?;
    let engine = Engine::new(config, &kv)?;
    if let Some(code) = currency {
        engine.select_currency(code);
    }

    match command {
        AppCommand::Board => {
            let report = run_cycle_and_load(&engine, period).await;
            if let Some(banner) = board::cycle_banner(&report) {
                println!("{banner}");
            }
            println!("{}", board::render(&engine, period).await?);
            engine.shutdown();
        }
        AppCommand::Watch => run_watch(&engine, period).await?,
        AppCommand::Add { symbol, quantity } => {
            engine.add_holding(&symbol, quantity).await?;
            println!("Holding {symbol} set to {quantity}");
        }
        AppCommand::Edit { symbol, quantity } => {
            engine.edit_holding(&symbol, quantity).await?;
            println!("Holding {symbol} set to {quantity}");
        }
        AppCommand::Remove { symbol } => {
            engine.remove_holding(&symbol).await;
            println!("Holding {symbol} removed");
        }
        AppCommand::Holdings => show_holdings(&engine).await?,
    }

    Ok(())
}

/// One refresh cycle plus card loading, behind a spinner.
async fn run_cycle_and_load(engine: &Engine, period: Period) -> FetchCycleReport {
    let spinner = ui::new_cycle_spinner();
    spinner.set_message("Fetching quotes...");
    let report = engine.refresh().await;
    engine.load_cards(period);
    board::await_cards(engine, Duration::from_secs(8)).await;
    spinner.finish_and_clear();
    report
}

async fn run_watch(engine: &Engine, period: Period) -> Result<()> {
    let term = console::Term::stdout();
    let interval = engine.refresh_interval();
    loop {
        let report = run_cycle_and_load(engine, period).await;
        let _ = term.clear_screen();
        if let Some(banner) = board::cycle_banner(&report) {
            println!("{banner}");
        }
        println!("{}", board::render(engine, period).await?);
        println!(
            "{}",
            ui::style_text(
                &format!("Refreshing every {}s; Ctrl-C to quit", interval.as_secs()),
                ui::StyleType::Subtle
            )
        );

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                engine.shutdown();
                break;
            }
        }
    }
    Ok(())
}

async fn show_holdings(engine: &Engine) -> Result<()> {
    let held = engine.holdings().await;
    if held.is_empty() {
        println!("No holdings. Use `pulseboard add SYMBOL QUANTITY` to start.");
        return Ok(());
    }

    // Price the holdings so values show alongside quantities.
    engine.refresh().await;
    let snapshot = engine.portfolio().await;
    let currency = engine.display_currency();
    let rate = engine.display_rate().await.unwrap_or(1.0);

    let mut table = ui::new_styled_table();
    table.set_header(vec![
        ui::header_cell("Symbol"),
        ui::header_cell("Quantity"),
        ui::header_cell(&format!("Price ({currency})")),
        ui::header_cell(&format!("Value ({currency})")),
    ]);
    for holding in &held {
        let priced = snapshot
            .as_ref()
            .and_then(|s| s.constituents.iter().find(|c| c.symbol == holding.symbol));
        table.add_row(vec![
            Cell::new(&holding.symbol),
            Cell::new(format!("{:.4}", holding.quantity)),
            ui::format_optional_cell(priced.map(|c| c.price * rate), |p| format!("{p:.2}")),
            ui::format_optional_cell(priced.map(|c| c.value * rate), |v| format!("{v:.2}")),
        ]);
    }
    println!("{table}");

    if let Some(snapshot) = snapshot {
        println!(
            "\nTotal Portfolio ({}): {}",
            ui::style_text(&currency, ui::StyleType::TotalLabel),
            ui::style_text(
                &format!("{:.2}", snapshot.total_value * rate),
                ui::StyleType::TotalValue
            )
        );
    }
    Ok(())
}
