//! ADX: Average Directional Index (Wilder).
//!
//! +DM/-DM and TR are Wilder-smoothed, turned into +DI/-DI, combined into
//! DX = 100 * |+DI - -DI| / (+DI + -DI), and DX is smoothed again into ADX.
//! A zero denominator yields DX = 0.

use common::Bar;

use super::atr::{true_range, wilder};

pub fn adx(bars: &[Bar], window: usize) -> Vec<f64> {
    let n = bars.len();
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];

    for i in 1..n {
        let up_move = bars[i].high - bars[i - 1].high;
        let down_move = bars[i - 1].low - bars[i].low;
        if up_move > down_move && up_move > 0.0 {
            plus_dm[i] = up_move;
        }
        if down_move > up_move && down_move > 0.0 {
            minus_dm[i] = down_move;
        }
    }

    let smooth_tr = wilder(&true_range(bars), window);
    let smooth_plus = wilder(&plus_dm, window);
    let smooth_minus = wilder(&minus_dm, window);

    let dx: Vec<f64> = (0..n)
        .map(|i| {
            if smooth_tr[i] == 0.0 {
                return 0.0;
            }
            let plus_di = 100.0 * smooth_plus[i] / smooth_tr[i];
            let minus_di = 100.0 * smooth_minus[i] / smooth_tr[i];
            let di_sum = plus_di + minus_di;
            if di_sum == 0.0 {
                0.0
            } else {
                100.0 * (plus_di - minus_di).abs() / di_sum
            }
        })
        .collect();

    wilder(&dx, window)
}
