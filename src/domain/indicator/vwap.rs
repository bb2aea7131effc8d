//! Volume Weighted Average Price.
//!
//! VWAP[i] = Σ(volume × typical) / Σ(volume) accumulated since the last reset.
//! `reset` = 0 accumulates over the whole series; otherwise the sums restart
//! every `reset` rows. A zero-volume window gives `None`.

use crate::domain::indicator_helpers::safe_div;

pub fn calculate_vwap(typical: &[f64], volume: &[f64], reset: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(typical.len());
    let mut pv = 0.0;
    let mut vol = 0.0;
    for (i, (&tp, &v)) in typical.iter().zip(volume).enumerate() {
        if reset > 0 && i % reset == 0 {
            pv = 0.0;
            vol = 0.0;
        }
        pv += tp * v;
        vol += v;
        out.push(safe_div(pv, vol));
    }
    out
}
