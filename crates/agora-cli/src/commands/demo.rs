//! Scripted end-to-end scenario.
//!
//! Drives all four trade modes against the in-memory ledger with a manual
//! clock, then reports events, balances and engine metrics.

use agora_core::clock::ManualClock;
use agora_core::events::FileEventSink;
use agora_core::ledger::{InMemoryLedger, LedgerGateway};
use agora_core::payments::RecordingRail;
use agora_core::raffle::TICKET_UNIT;
use agora_core::rng::SeededWinnerSource;
use agora_core::{AccountId, Bps, ContractId, Market, MarketConfig, TokenRef};
use anyhow::{bail, Result};
use std::path::PathBuf;

const PLATFORM: AccountId = AccountId(1);
const CUSTODY: AccountId = AccountId(2);
const ARTIST: AccountId = AccountId(3);
const SELLER: AccountId = AccountId(10);
const BUYER: AccountId = AccountId(11);
const RIVAL: AccountId = AccountId(12);
const LENDER: AccountId = AccountId(13);
const PATRON: AccountId = AccountId(14);

const MILLI: u128 = TICKET_UNIT / 1_000;

pub fn run(format: &str, seed: u64, event_log: Option<PathBuf>) -> Result<()> {
    if format != "human" && format != "json" {
        bail!("unknown format {format:?}, expected human or json");
    }

    let token = TokenRef::new(ContractId(7), 1);
    let config = MarketConfig::builder()
        .platform_owner(PLATFORM)
        .custody_account(CUSTODY)
        .market_fee(Bps::new(250)?)
        .build()?;

    let mut ledger = InMemoryLedger::new();
    ledger.mint(SELLER, token, 1_000);
    ledger.approve_operator(SELLER, CUSTODY);
    ledger.set_royalty(token, ARTIST, 500);

    let mut market = Market::new(
        config,
        ledger,
        RecordingRail::new(),
        ManualClock::starting_at(1_700_000_000),
        SeededWinnerSource::from_seed(seed),
    )?;
    if let Some(path) = event_log {
        market.set_event_sink(Box::new(FileEventSink::new(path)));
    }

    let item = market.create_item(SELLER, token)?;

    // Fixed-price sale with a partial fill.
    let sale = market.put_on_sale(SELLER, item, 100, 2 * MILLI)?;
    market.create_sale(BUYER, sale, 40, 80 * MILLI)?;

    // Auction: rival opens, buyer snipes inside the soft-close window.
    let auction = market.create_auction(SELLER, item, 50, 120, TICKET_UNIT)?;
    market.create_bid(RIVAL, auction, TICKET_UNIT)?;
    market.clock().advance(115 * 60);
    market.create_bid(BUYER, auction, 2 * TICKET_UNIT)?;
    market.clock().advance(601);
    market.end_auction(auction)?;

    // Raffle over 25 units.
    let raffle = market.create_raffle(SELLER, item, 25, 60)?;
    market.enter_raffle(BUYER, raffle, 2 * TICKET_UNIT)?;
    market.enter_raffle(PATRON, raffle, TICKET_UNIT)?;
    market.clock().advance(61 * 60);
    market.end_raffle(raffle)?;

    // Loan that goes unpaid and is liquidated.
    let loan = market.create_loan(SELLER, item, 200, 5 * TICKET_UNIT, TICKET_UNIT / 2, 60)?;
    market.fund_loan(LENDER, loan, 5 * TICKET_UNIT)?;
    market.clock().advance(61 * 60);
    market.liquidate(LENDER, loan)?;

    market.check_invariants()?;

    let events = market.drain_events();
    let accounts = [
        ("platform", PLATFORM),
        ("artist", ARTIST),
        ("seller", SELLER),
        ("buyer", BUYER),
        ("rival", RIVAL),
        ("lender", LENDER),
        ("patron", PATRON),
    ];

    if format == "json" {
        let balances: Vec<serde_json::Value> = accounts
            .iter()
            .map(|(name, account)| {
                serde_json::json!({
                    "account": name,
                    "units": market.ledger().balance_of(*account, token),
                    "paid_out": market.rail().total_paid(*account).to_string(),
                    "claimable": market.claimable(*account).to_string(),
                })
            })
            .collect();
        let report = serde_json::json!({
            "events": events,
            "balances": balances,
            "trades_settled": market.metrics().trades_settled.get(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("events ({}):", events.len());
    for event in &events {
        println!("  {}", serde_json::to_string(event)?);
    }
    println!();
    println!("{:<10} {:>8} {:>26} {:>12}", "account", "units", "paid out", "claimable");
    for (name, account) in accounts {
        println!(
            "{:<10} {:>8} {:>26} {:>12}",
            name,
            market.ledger().balance_of(account, token),
            market.rail().total_paid(account),
            market.claimable(account),
        );
    }
    println!();
    println!("trades settled: {}", market.metrics().trades_settled.get());
    Ok(())
}
