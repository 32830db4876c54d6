//! recomendacion.rs
//! Qué carril conviene según la diferencia interior/exterior

use serde::Serialize;
use std::collections::BTreeMap;

use crate::types::{DirectionAverage, SpeedMap};

/// Ambos carriles por encima de esto = vía fluida
pub const FLUIDO_KMH: u32 = 70;
/// Diferencia mínima (km/h) para recomendar un carril
pub const MARGEN_KMH: i64 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Advice {
    NoData,
    /// Solo un grupo de carriles tiene lectura; no hay con qué comparar
    Partial,
    AllClear,
    Inner,
    Outer,
    Even,
}

pub fn advise(a: &DirectionAverage) -> Advice {
    // 0 = sin lectura, no 0 km/h
    if a.is_zero() { return Advice::NoData; }
    if a.inner == 0 || a.outer == 0 { return Advice::Partial; }
    if a.inner > FLUIDO_KMH && a.outer > FLUIDO_KMH { return Advice::AllClear; }
    let diff = a.inner as i64 - a.outer as i64;
    if diff >= MARGEN_KMH { Advice::Inner }
    else if diff <= -MARGEN_KMH { Advice::Outer }
    else { Advice::Even }
}

pub fn advise_all(m: &SpeedMap) -> BTreeMap<String, BTreeMap<String, Advice>> {
    m.iter()
        .map(|(seg, dirs)| (seg.clone(), dirs.iter().map(|(d, a)| (d.clone(), advise(a))).collect()))
        .collect()
}
