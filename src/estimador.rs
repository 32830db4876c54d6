//! estimador.rs
//!
//! Estimación sintética cuando ninguna fuente responde
//!
//! - Velocidad base según la franja horaria (madrugada fluida, día cargado)
//! - Fin de semana: el día se carga más (retorno desde Yilan)
//! - Ruido acotado e independiente por tramo/sentido/carril, recortado a [20, 90]
//!
//! Reloj y RNG llegan desde fuera para poder fijarlos en tests.

use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use rand::Rng;

use crate::types::{DirectionAverage, SegmentResult, SpeedMap, TunnelCfg};

pub const MIN_KMH: i32 = 20;
pub const MAX_KMH: i32 = 90;
/// Ruido máximo (+/-) sobre la base
pub const JITTER_KMH: i32 = 10;
/// Penalización diurna en fin de semana
const WEEKEND_PENALTY_KMH: i32 = 15;

/// (hora de inicio, velocidad base, es_diurna)
const FRANJAS: [(u32, i32, bool); 5] = [
    (0, 85, false),
    (6, 60, true),
    (10, 70, true),
    (16, 50, true),
    (20, 80, false),
];

pub fn baseline(now: &NaiveDateTime) -> i32 {
    let h = now.hour();
    let (_, base, diurna) = FRANJAS.iter().rev().find(|(start, _, _)| h >= *start).copied().unwrap_or(FRANJAS[0]);
    let weekend = matches!(now.weekday(), Weekday::Sat | Weekday::Sun);
    if diurna && weekend { base - WEEKEND_PENALTY_KMH } else { base }
}

pub fn estimate<R: Rng>(cfg: &TunnelCfg, now: &NaiveDateTime, rng: &mut R) -> SpeedMap {
    let base = baseline(now);
    let mut sample = || (base + rng.gen_range(-JITTER_KMH..=JITTER_KMH)).clamp(MIN_KMH, MAX_KMH) as u32;

    let mut out = SpeedMap::new();
    for (name, _) in &cfg.segments {
        let mut res = SegmentResult::new();
        for dir in &cfg.directions {
            res.insert(dir.clone(), DirectionAverage { inner: sample(), outer: sample() });
        }
        out.insert(name.clone(), res);
    }
    out
}
