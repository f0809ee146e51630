// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The Demixing Module: the ordered down-mixer chain used while encoding
//! and its inverse demixer chain used while decoding, both built as pure
//! functions over a `LabelSamples` map.

use std::collections::HashMap;

use iamf_core::error::Result;
use iamf_obu::channel_label::ChannelLabel as L;
use iamf_obu::parameter::DmixPMode;

/// Normalized `[-1, 1]` float samples per channel label, one frame's worth
/// of ticks per entry.
pub type LabelSamples = HashMap<L, Vec<f64>>;

/// `(α, β, γ, δ, w)` for one frame, resolved by the Parameters Manager from
/// either an active Demixing parameter block or the parameter definition's
/// default.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DownMixingParams {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    pub delta: f64,
    pub w: f64,
}

/// `w_idx` ranges over `0..=10`; `W[idx]` is linear, `idx as f64 / 10.0`.
pub fn w_from_idx(w_idx: u8) -> f64 {
    f64::from(w_idx.min(10)) / 10.0
}

pub fn clamp_w_idx(previous: i32, offset: i32) -> u8 {
    (previous + offset).clamp(0, 10) as u8
}

/// The fixed `(α, β, γ, δ)` a `dmixp_mode` selects. Values are the nominal
/// IAMF down-mix coefficients; the `_n` variants use a narrower surround
/// image (smaller β/δ) for content mixed with a tighter surround stage.
pub fn coefficients_for_mode(mode: DmixPMode) -> (f64, f64, f64, f64) {
    match mode {
        DmixPMode::Mode1 => (1.0, 0.866, 0.866, 0.866),
        DmixPMode::Mode2 => (0.707, 0.707, 0.866, 0.866),
        DmixPMode::Mode3 => (1.0, 1.0, 0.866, 0.866),
        DmixPMode::Mode1n => (1.0, 0.866, 0.866, 0.866 * 0.5),
        DmixPMode::Mode2n => (0.707, 0.707, 0.866, 0.866 * 0.5),
        DmixPMode::Mode3n => (1.0, 1.0, 0.866, 0.866 * 0.5),
    }
}

/// Looks a label up in `map`, falling back to its `Demixed`/base variant:
/// whichever of a label and its demixed counterpart actually holds this
/// frame's samples depends on whether that channel's substream was
/// transmitted live or only reconstructed (§4.4), and either is a valid
/// answer to "do we have this channel's samples".
fn get<'a>(map: &'a LabelSamples, label: &L) -> Result<&'a Vec<f64>> {
    map.get(label)
        .or_else(|| map.get(&label.demixed()))
        .or_else(|| map.get(label.base()))
        .ok_or_else(|| iamf_core::Error::InvalidArgument(format!("missing channel label {label:?}")))
}

fn combine(a: &[f64], b: &[f64], ka: f64, kb: f64) -> Vec<f64> {
    a.iter().zip(b.iter()).map(|(&x, &y)| ka * x + kb * y).collect()
}

fn combine1(a: &[f64], k: f64) -> Vec<f64> {
    a.iter().map(|&x| k * x).collect()
}

fn invert(num: &[f64], sub: &[f64], k: f64) -> Vec<f64> {
    num.iter().zip(sub.iter()).map(|(&n, &s)| (n - s) / k).collect()
}

pub type MixerFn = fn(&DownMixingParams, &mut LabelSamples) -> Result<()>;

fn down_s7_to_s5(p: &DownMixingParams, map: &mut LabelSamples) -> Result<()> {
    let l7 = get(map, &L::L7)?.clone();
    let r7 = get(map, &L::R7)?.clone();
    let lss7 = get(map, &L::Lss7)?.clone();
    let lrs7 = get(map, &L::Lrs7)?.clone();
    let rss7 = get(map, &L::Rss7)?.clone();
    let rrs7 = get(map, &L::Rrs7)?.clone();
    map.insert(L::L5, l7);
    map.insert(L::R5, r7);
    map.insert(L::Ls5, combine(&lss7, &lrs7, p.alpha, p.beta));
    map.insert(L::Rs5, combine(&rss7, &rrs7, p.alpha, p.beta));
    Ok(())
}

fn down_s5_to_s3(p: &DownMixingParams, map: &mut LabelSamples) -> Result<()> {
    let l5 = get(map, &L::L5)?.clone();
    let r5 = get(map, &L::R5)?.clone();
    let ls5 = get(map, &L::Ls5)?.clone();
    let rs5 = get(map, &L::Rs5)?.clone();
    map.insert(L::L3, combine(&l5, &ls5, 1.0, p.delta));
    map.insert(L::R3, combine(&r5, &rs5, 1.0, p.delta));
    Ok(())
}

fn down_s3_to_s2(_p: &DownMixingParams, map: &mut LabelSamples) -> Result<()> {
    let l3 = get(map, &L::L3)?.clone();
    let r3 = get(map, &L::R3)?.clone();
    let centre = get(map, &L::Centre)?.clone();
    map.insert(L::L2, combine(&l3, &centre, 1.0, std::f64::consts::FRAC_1_SQRT_2));
    map.insert(L::R2, combine(&r3, &centre, 1.0, std::f64::consts::FRAC_1_SQRT_2));
    Ok(())
}

fn down_s2_to_s1(_p: &DownMixingParams, map: &mut LabelSamples) -> Result<()> {
    let l2 = get(map, &L::L2)?.clone();
    let r2 = get(map, &L::R2)?.clone();
    map.insert(L::Mono, combine(&l2, &r2, 0.5, 0.5));
    Ok(())
}

fn down_t4_to_t2(p: &DownMixingParams, map: &mut LabelSamples) -> Result<()> {
    let ltf4 = get(map, &L::Ltf4)?.clone();
    let rtf4 = get(map, &L::Rtf4)?.clone();
    let ltb4 = get(map, &L::Ltb4)?.clone();
    let rtb4 = get(map, &L::Rtb4)?.clone();
    map.insert(L::Ltf2, combine(&ltf4, &ltb4, 1.0, p.gamma));
    map.insert(L::Rtf2, combine(&rtf4, &rtb4, 1.0, p.gamma));
    Ok(())
}

fn down_t2_to_tf2(p: &DownMixingParams, map: &mut LabelSamples) -> Result<()> {
    let ltf2 = get(map, &L::Ltf2)?.clone();
    let rtf2 = get(map, &L::Rtf2)?.clone();
    let ls5 = get(map, &L::Ls5)?.clone();
    let rs5 = get(map, &L::Rs5)?.clone();
    map.insert(L::Ltf3, combine(&ltf2, &combine1(&ls5, p.w * p.delta), 1.0, 1.0));
    map.insert(L::Rtf3, combine(&rtf2, &combine1(&rs5, p.w * p.delta), 1.0, 1.0));
    Ok(())
}

/// The down-mix chain, in the order it must run: surround first (coarsest
/// to finest), then height.
pub const DOWN_MIXERS: &[MixerFn] = &[
    down_s7_to_s5,
    down_s5_to_s3,
    down_s3_to_s2,
    down_s2_to_s1,
    down_t4_to_t2,
    down_t2_to_tf2,
];

fn up_s1_to_s2(_p: &DownMixingParams, map: &mut LabelSamples) -> Result<()> {
    let mono = get(map, &L::Mono)?.clone();
    let l2 = get(map, &L::L2)?.clone();
    let r2: Vec<f64> = mono.iter().zip(l2.iter()).map(|(&m, &l)| 2.0 * m - l).collect();
    map.insert(L::R2.demixed(), r2);
    Ok(())
}

fn up_s2_to_s3(_p: &DownMixingParams, map: &mut LabelSamples) -> Result<()> {
    let r2 = get(map, &L::R2.demixed())?.clone();
    let centre = get(map, &L::Centre)?.clone();
    let r3: Vec<f64> = r2
        .iter()
        .zip(centre.iter())
        .map(|(&r, &c)| r - std::f64::consts::FRAC_1_SQRT_2 * c)
        .collect();
    map.insert(L::R3.demixed(), r3);
    Ok(())
}

fn up_s3_to_s5(p: &DownMixingParams, map: &mut LabelSamples) -> Result<()> {
    let l3 = get(map, &L::L3)?.clone();
    let l5 = get(map, &L::L5)?.clone();
    let r3 = get(map, &L::R3.demixed())?.clone();
    let r5 = get(map, &L::R5)?.clone();
    map.insert(L::Ls5.demixed(), invert(&l3, &l5, p.delta));
    map.insert(L::Rs5.demixed(), invert(&r3, &r5, p.delta));
    Ok(())
}

fn up_s5_to_s7(p: &DownMixingParams, map: &mut LabelSamples) -> Result<()> {
    let ls5 = get(map, &L::Ls5.demixed())?.clone();
    let rs5 = get(map, &L::Rs5.demixed())?.clone();
    let lss7 = get(map, &L::Lss7)?.clone();
    let rss7 = get(map, &L::Rss7)?.clone();
    let lrs7: Vec<f64> = ls5
        .iter()
        .zip(lss7.iter())
        .map(|(&s, &lss)| (s - p.alpha * lss) / p.beta)
        .collect();
    let rrs7: Vec<f64> = rs5
        .iter()
        .zip(rss7.iter())
        .map(|(&s, &rss)| (s - p.alpha * rss) / p.beta)
        .collect();
    map.insert(L::Lrs7.demixed(), lrs7);
    map.insert(L::Rrs7.demixed(), rrs7);
    Ok(())
}

fn up_t2_to_t4(p: &DownMixingParams, map: &mut LabelSamples) -> Result<()> {
    let ltf2 = get(map, &L::Ltf2)?.clone();
    let rtf2 = get(map, &L::Rtf2)?.clone();
    let ltf4 = get(map, &L::Ltf4)?.clone();
    let rtf4 = get(map, &L::Rtf4)?.clone();
    map.insert(L::Ltb4.demixed(), invert(&ltf2, &ltf4, p.gamma));
    map.insert(L::Rtb4.demixed(), invert(&rtf2, &rtf4, p.gamma));
    Ok(())
}

fn up_tf2_to_t2(p: &DownMixingParams, map: &mut LabelSamples) -> Result<()> {
    let ltf3 = get(map, &L::Ltf3)?.clone();
    let rtf3 = get(map, &L::Rtf3)?.clone();
    let l3 = get(map, &L::L3)?.clone();
    let l5 = get(map, &L::L5)?.clone();
    let r3 = get(map, &L::R3.demixed())?.clone();
    let r5 = get(map, &L::R5)?.clone();
    let ltf2: Vec<f64> = ltf3
        .iter()
        .zip(l3.iter().zip(l5.iter()))
        .map(|(&t, (&l3, &l5))| t - p.w * (l3 - l5))
        .collect();
    let rtf2: Vec<f64> = rtf3
        .iter()
        .zip(r3.iter().zip(r5.iter()))
        .map(|(&t, (&r3, &r5))| t - p.w * (r3 - r5))
        .collect();
    map.insert(L::Ltf2.demixed(), ltf2);
    map.insert(L::Rtf2.demixed(), rtf2);
    Ok(())
}

/// The demixer chain, in the order it must run: height demixers run after
/// surround demixers, per §4.4.
pub const DEMIXERS: &[MixerFn] = &[
    up_s1_to_s2,
    up_s2_to_s3,
    up_s3_to_s5,
    up_s5_to_s7,
    up_tf2_to_t2,
    up_t2_to_t4,
];

/// Runs every down-mixer in order, tolerating mixers whose required input
/// labels aren't present (the audio element may not carry that layer).
pub fn run_down_mix_chain(params: &DownMixingParams, map: &mut LabelSamples) -> Result<()> {
    for mixer in DOWN_MIXERS {
        match mixer(params, map) {
            Ok(()) => {}
            Err(iamf_core::Error::InvalidArgument(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Runs every demixer in order, tolerating demixers whose required input
/// labels aren't present.
pub fn run_demix_chain(params: &DownMixingParams, map: &mut LabelSamples) -> Result<()> {
    for demixer in DEMIXERS {
        match demixer(params, map) {
            Ok(()) => {}
            Err(iamf_core::Error::InvalidArgument(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DownMixingParams {
        let (alpha, beta, gamma, delta) = coefficients_for_mode(DmixPMode::Mode1);
        DownMixingParams { alpha, beta, gamma, delta, w: w_from_idx(10) }
    }

    fn close(a: &[f64], b: &[f64]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-6, "{x} != {y}");
        }
    }

    #[test]
    fn mono_round_trip_reconstructs_r2() {
        let p = params();
        let mut map = LabelSamples::new();
        map.insert(L::L2, vec![0.2, -0.3, 0.5]);
        map.insert(L::R2, vec![-0.1, 0.4, 0.1]);
        let original_r2 = map[&L::R2].clone();

        down_s2_to_s1(&p, &mut map).unwrap();
        // Keep L2 (the "other" retained substream), drop R2 to simulate decode.
        map.remove(&L::R2);
        up_s1_to_s2(&p, &mut map).unwrap();

        close(&map[&L::R2.demixed()], &original_r2);
    }

    #[test]
    fn surround_round_trip_s7_s5() {
        let p = params();
        let mut map = LabelSamples::new();
        map.insert(L::L7, vec![0.1, 0.2]);
        map.insert(L::R7, vec![0.15, -0.2]);
        map.insert(L::Lss7, vec![0.3, 0.1]);
        map.insert(L::Rss7, vec![0.25, -0.05]);
        map.insert(L::Lrs7, vec![-0.1, 0.2]);
        map.insert(L::Rrs7, vec![-0.2, 0.3]);
        let original_lrs7 = map[&L::Lrs7].clone();
        let original_rrs7 = map[&L::Rrs7].clone();

        down_s7_to_s5(&p, &mut map).unwrap();
        map.remove(&L::Lrs7);
        map.remove(&L::Rrs7);
        up_s5_to_s7(&p, &mut map).unwrap();

        close(&map[&L::Lrs7.demixed()], &original_lrs7);
        close(&map[&L::Rrs7.demixed()], &original_rrs7);
    }

    #[test]
    fn w_idx_clamps_to_table_bounds() {
        assert_eq!(clamp_w_idx(9, 5), 10);
        assert_eq!(clamp_w_idx(1, -5), 0);
        assert_eq!(w_from_idx(10), 1.0);
        assert_eq!(w_from_idx(0), 0.0);
    }
}
