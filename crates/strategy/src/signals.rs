use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use common::Action;

use crate::frame::IndicatorFrame;

/// How a live check turns the latest row into a SELL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SellRule {
    /// Only on the exact 1 -> 0 transition bar.
    OnTransition,
    /// Whenever the latest filtered trend is 0. Survives a restart that
    /// missed the transition bar.
    OnFlat,
}

/// `trend[i] - trend[i-1]`; `None` at row 0.
pub fn signal_events(frame: &IndicatorFrame) -> Vec<Option<i8>> {
    let rows = frame.rows();
    (0..rows.len())
        .map(|i| {
            i.checked_sub(1)
                .map(|p| rows[i].trend as i8 - rows[p].trend as i8)
        })
        .collect()
}

/// Decision for the latest row only.
pub fn live_action(frame: &IndicatorFrame, rule: SellRule) -> Action {
    let Some(last) = frame.last() else {
        return Action::Hold;
    };
    let event = signal_events(frame).last().copied().flatten();

    if event == Some(1) {
        return Action::Buy;
    }
    match rule {
        SellRule::OnFlat if last.trend == 0 => Action::Sell,
        SellRule::OnTransition if event == Some(-1) => Action::Sell,
        _ => Action::Hold,
    }
}

/// A dated entry or exit transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub date: NaiveDate,
    pub action: Action,
    pub close: f64,
}

/// Every BUY (+1) and SELL (-1) transition, ignoring the first `skip` rows.
pub fn transition_events(frame: &IndicatorFrame, skip: usize) -> Vec<TradeEvent> {
    signal_events(frame)
        .into_iter()
        .zip(frame.rows())
        .skip(skip)
        .filter_map(|(event, row)| {
            let action = match event? {
                1 => Action::Buy,
                -1 => Action::Sell,
                _ => return None,
            };
            Some(TradeEvent {
                date: row.date,
                action,
                close: row.close,
            })
        })
        .collect()
}
