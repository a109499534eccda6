// src/bin/print_schedule.rs
use std::env;
use std::io;

use anyhow::{bail, Context};
use serde::Serialize;

use rate_watch::services::calculations::{calculate_amortization_schedule, calculate_total_interest, round2};

#[derive(Serialize)]
struct Row {
    month: usize,
    payment: f64,
    principal: f64,
    interest: f64,
    balance: f64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() != 3 {
        bail!("usage: print_schedule <principal> <annual rate %> <term years>");
    }
    let principal: f64 = args[0].parse().context("principal")?;
    let rate: f64 = args[1].parse().context("annual rate")?;
    let years: u32 = args[2].parse().context("term years")?;

    let schedule = calculate_amortization_schedule(principal, rate, years)?;
    let mut wtr = csv::Writer::from_writer(io::stdout());
    for (i, entry) in schedule.enumerate() {
        wtr.serialize(Row {
            month: i + 1,
            payment: round2(entry.payment),
            principal: round2(entry.principal_portion),
            interest: round2(entry.interest_portion),
            balance: round2(entry.remaining_balance),
        })?;
    }
    wtr.flush()?;

    eprintln!("Total interest: {:.2}", calculate_total_interest(principal, rate, years)?);
    Ok(())
}
