//! # Sales
//!
//! Periodic selling from the designated sell container.
//!
//! - **Generic cycle**: every `fSellIntervalHours`, up to `iSellBatchSize` units at
//!   `fSellPricePercent` of base value. The next due time is jittered by up to six hours
//!   either way so saves do not fall into lockstep.
//! - **Vendor cycles**: each active registered vendor visits on its own timer and only takes
//!   items its faction buy-list accepts. Invested vendors pay 5% more.
//!
//! Pricing per line: the unit price is `value * percent` as `f32`, the line pays
//! `trunc(unit * units)` gold, and the container receives the sum of line payments. Fractions
//! are dropped per line.
//!
//! Cycles run on sleep/wait end, on cell attach (at most once per 10 real seconds) and when
//! the overview menu opens.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, info};
use rand::Rng;
use serde::Serialize;

use crate::config::Settings;
use crate::host::{FormId, Host, ItemForm, GOLD_FORM, NO_REF};
use crate::network::validation::SELL_JITTER_HOURS;
use crate::network::{NetworkManager, Transaction};

pub const GENERIC_VENDOR_NAME: &str = "Traveling Merchant";
pub const GENERIC_ASSORTMENT: &str = "General Goods";

/// Price multiplier for vendors the player invested in.
pub const INVESTMENT_BONUS: f32 = 1.05;

/// Minimum real time between cell-attach triggered runs.
pub const CELL_ATTACH_DEBOUNCE: Duration = Duration::from_secs(10);

/// Host events that may start a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaleTrigger {
    SleepStopped,
    WaitStopped,
    CellAttached,
    MenuOpened,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SaleReport {
    pub items_sold: i32,
    pub gold_earned: i32,
    pub generic_ran: bool,
    pub vendors_visited: usize,
    pub transactions: Vec<Transaction>,
}

/// Unit price for one item at `percent`.
pub fn unit_price(value: i32, percent: f32) -> f32 {
    value as f32 * percent
}

/// Gold paid for a line, truncated.
pub fn line_gold(unit: f32, units: i32) -> i32 {
    (unit * units as f32) as i32
}

struct Offer<'a> {
    container: FormId,
    batch: i32,
    percent: f32,
    vendor_name: &'a str,
    assortment: &'a str,
    now: f64,
}

/// Sell up to `offer.batch` units the predicate accepts. Returns the transactions.
fn sell_batch(host: &dyn Host, offer: &Offer, accept: impl Fn(&ItemForm) -> bool) -> Vec<Transaction> {
    let mut remaining = offer.batch;
    let mut lines = Vec::new();
    for entry in host.inventory(offer.container) {
        if remaining <= 0 {
            debug!("sell batch of {} reached", offer.batch);
            break;
        }
        if entry.count <= 0 || entry.item == GOLD_FORM {
            continue;
        }
        let Some(item) = host.item(entry.item) else {
            continue;
        };
        if host.is_phantom(&item) || item.value <= 0 || !accept(&item) {
            continue;
        }
        let wanted = entry.count.min(remaining);
        let sold = host.remove_item(offer.container, item.id, wanted);
        if sold <= 0 {
            continue;
        }
        remaining -= sold;
        let unit = unit_price(item.value, offer.percent);
        lines.push(Transaction {
            item_name: item.name.clone(),
            vendor_name: offer.vendor_name.to_string(),
            vendor_assortment: offer.assortment.to_string(),
            quantity: sold,
            gold_earned: line_gold(unit, sold),
            price_per_unit: unit,
            game_time: offer.now,
        });
    }
    lines
}

/// Debounce state plus the cycle logic.
#[derive(Debug, Default)]
pub struct SalesScheduler {
    last_cell_attach: Mutex<Option<Instant>>,
}

impl SalesScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `trigger` at real time `now` passes the debounce.
    pub fn should_run(&self, trigger: SaleTrigger, now: Instant) -> bool {
        if trigger != SaleTrigger::CellAttached {
            return true;
        }
        let mut last = self
            .last_cell_attach
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some(previous) if now.saturating_duration_since(previous) < CELL_ATTACH_DEBOUNCE => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Handle a host event; `None` when debounced.
    pub fn on_trigger(
        &self,
        trigger: SaleTrigger,
        now: Instant,
        manager: &NetworkManager,
        settings: &Settings,
        host: &dyn Host,
    ) -> Option<SaleReport> {
        if !self.should_run(trigger, now) {
            debug!("{:?} debounced", trigger);
            return None;
        }
        Some(self.run_cycle(manager, settings, host))
    }

    /// Run the generic cycle then every due vendor.
    pub fn run_cycle(&self, manager: &NetworkManager, settings: &Settings, host: &dyn Host) -> SaleReport {
        let mut report = SaleReport::default();
        if !settings.general.mod_enabled {
            return report;
        }
        let sell = manager.sell_state();
        if sell.container == NO_REF || !host.form_exists(sell.container) {
            return report;
        }
        let now = host.game_hours();

        // An unstarted timer sells at once; the stamp below starts it.
        if !sell.timer_started || now - sell.last_sell_time >= settings.sales.interval_hours {
            let offer = Offer {
                container: sell.container,
                batch: settings.sales.batch_size,
                percent: settings.sales.price_percent,
                vendor_name: GENERIC_VENDOR_NAME,
                assortment: GENERIC_ASSORTMENT,
                now,
            };
            report.transactions.extend(sell_batch(host, &offer, |_| true));
            let jitter = rand::thread_rng().gen_range(-SELL_JITTER_HOURS..=SELL_JITTER_HOURS);
            manager.set_last_sell_time(now + jitter);
            report.generic_ran = true;
        }

        for vendor in manager.vendors() {
            if !vendor.active || now - vendor.last_visit_time < settings.vendor_sales.interval_hours {
                continue;
            }
            let data = host.vendor_data(vendor.faction).unwrap_or_default();
            let mut percent = settings.vendor_sales.price_percent;
            if vendor.invested {
                percent *= INVESTMENT_BONUS;
            }
            let offer = Offer {
                container: sell.container,
                batch: settings.vendor_sales.batch_size,
                percent,
                vendor_name: &vendor.vendor_name,
                assortment: &vendor.store_name,
                now,
            };
            report
                .transactions
                .extend(sell_batch(host, &offer, |item| data.buys(item)));
            // A visit that found nothing still resets the vendor's timer.
            if manager.set_vendor_visit(vendor.npc, now).is_ok() {
                report.vendors_visited += 1;
            }
        }

        report.items_sold = report.transactions.iter().map(|t| t.quantity).sum();
        report.gold_earned = report.transactions.iter().map(|t| t.gold_earned).sum();
        if report.items_sold > 0 {
            if report.gold_earned > 0 {
                host.add_item(sell.container, GOLD_FORM, report.gold_earned);
            }
            manager.record_sale(report.items_sold as u32, report.gold_earned.max(0) as u32);
            // Oldest line first so the log reads newest-first afterwards.
            for tx in &report.transactions {
                manager.add_transaction(tx.clone());
            }
            host.notify(&format!(
                "Sold {} items for {} gold",
                report.items_sold, report.gold_earned
            ));
            info!(
                "sold {} items for {} gold ({} vendors visited)",
                report.items_sold, report.gold_earned, report.vendors_visited
            );
        }
        report
    }

    /// Advance the game clock by the real time spent in a paused menu. Returns game hours.
    pub fn advance_calendar(&self, host: &dyn Host, real_elapsed: Duration) -> f64 {
        let hours = real_elapsed.as_secs_f64() * host.time_scale() / 3600.0;
        if hours > 0.0 {
            host.advance_game_hours(hours);
        }
        hours
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_gold_truncates_per_line() {
        let unit = unit_price(7, 0.10);
        assert_eq!(line_gold(unit, 3), 2);
        assert_eq!(line_gold(unit_price(30, 0.10), 7), 21);
        assert_eq!(line_gold(unit_price(1, 0.10), 9), 0);
    }

    #[test]
    fn cell_attach_is_debounced() {
        let scheduler = SalesScheduler::new();
        let start = Instant::now();
        assert!(scheduler.should_run(SaleTrigger::CellAttached, start));
        assert!(!scheduler.should_run(SaleTrigger::CellAttached, start + Duration::from_secs(3)));
        assert!(scheduler.should_run(SaleTrigger::SleepStopped, start + Duration::from_secs(4)));
        assert!(scheduler.should_run(SaleTrigger::CellAttached, start + Duration::from_secs(11)));
    }
}
