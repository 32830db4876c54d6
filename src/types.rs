//! types.rs
//! Modelos de datos compartidos por el servicio: registros de detectores (VD),
//! configuración del túnel, promedios por carril y el snapshot que ve la API

use anyhow::Context;
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::recomendacion::Advice;

/// Grupo lógico de carriles: interior (izquierda) o exterior (derecha)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaneGroup {
    #[serde(rename = "in")]
    Inner,
    #[serde(rename = "out")]
    Outer,
}

/// Lectura de un carril dentro de un registro VD
#[derive(Clone, Debug, PartialEq)]
pub struct LaneReading {
    pub lane_id: String,
    /// km/h; 0 o negativo = sin medida
    pub speed: f64,
}

/// Registro de un detector, tal cual sale del XML
#[derive(Clone, Debug, PartialEq)]
pub struct SensorRecord {
    pub road_id: String,
    pub start_m: f64,
    pub direction: String,
    pub lanes: Vec<LaneReading>,
}

/// Tramo de vía `[start_m, end_m)` en metros
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentRange {
    pub start_m: f64,
    pub end_m: f64,
}

impl SegmentRange {
    pub fn new(start_m: f64, end_m: f64) -> Self { Self { start_m, end_m } }

    #[inline]
    pub fn contains(&self, m: f64) -> bool { m >= self.start_m && m < self.end_m }
}

/// Promedio por grupo de carril para un sentido. 0 = desconocido, no "parado".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionAverage {
    #[serde(rename = "in")]
    pub inner: u32,
    #[serde(rename = "out")]
    pub outer: u32,
}

impl DirectionAverage {
    pub fn is_zero(&self) -> bool { self.inner == 0 && self.outer == 0 }
}

/// sentido -> promedios
pub type SegmentResult = BTreeMap<String, DirectionAverage>;
/// tramo -> sentido -> promedios
pub type SpeedMap = BTreeMap<String, SegmentResult>;

/// Configuración estática del túnel. Inmutable tras construirse.
#[derive(Clone, Debug)]
pub struct TunnelCfg {
    pub road_id: String,
    pub directions: Vec<String>,
    /// En orden: el primer tramo que contiene el punto se lo queda
    pub segments: Vec<(String, SegmentRange)>,
    pub lanes: HashMap<String, LaneGroup>,
}

impl Default for TunnelCfg {
    fn default() -> Self {
        Self {
            road_id: "5".into(),
            directions: vec!["N".into(), "S".into()],
            segments: vec![("雪山隧道".into(), SegmentRange::new(15_000.0, 28_000.0))],
            lanes: HashMap::from([
                ("1".to_string(), LaneGroup::Inner),
                ("2".to_string(), LaneGroup::Outer),
            ]),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppCfg {
    pub bind: String,
    pub url_feed: String,
    /// Plantillas de relays CORS, en orden de prioridad (ver `fetch::Candidate`)
    pub relays: Vec<String>,
    pub fetch_timeout_s: u64,
    pub t_refresh_s: u64,
    /// Huso horario del reloj del estimador
    pub tz_offset_h: i32,
}

impl Default for AppCfg {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
            url_feed: "https://tisvcloud.freeway.gov.tw/live/vd_value5.xml.gz".into(),
            relays: vec![
                "https://corsproxy.io/?".into(),
                "https://api.allorigins.win/raw?url=".into(),
                "https://api.codetabs.com/v1/proxy?quest=".into(),
            ],
            fetch_timeout_s: 8,
            t_refresh_s: 60,
            tz_offset_h: 8,
        }
    }
}

impl AppCfg {
    pub fn from_env() -> Self { Self::from_vars(|k| std::env::var(k).ok()) }

    /// Parte de los valores por defecto y pisa lo que venga en `get`.
    /// Los números que no parsean se quedan con el valor por defecto.
    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut c = AppCfg::default();
        if let Some(v) = get("BIND") { c.bind = v; }
        if let Some(v) = get("URL_FEED") { c.url_feed = v; }
        if let Some(v) = get("RELAYS") {
            c.relays = v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect();
        }
        if let Some(v) = get("FETCH_TIMEOUT_S") { c.fetch_timeout_s = v.parse().unwrap_or(c.fetch_timeout_s); }
        if let Some(v) = get("T_REFRESH_S") { c.t_refresh_s = v.parse().unwrap_or(c.t_refresh_s); }
        if let Some(v) = get("TZ_OFFSET_H") { c.tz_offset_h = v.parse().unwrap_or(c.tz_offset_h); }
        c
    }

    pub fn tz(&self) -> anyhow::Result<FixedOffset> {
        self.tz_offset_h
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .with_context(|| format!("TZ_OFFSET_H fuera de rango: {}", self.tz_offset_h))
    }
}

/// Origen de los datos del snapshot
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Status {
    Live { source: String },
    Estimate,
}

impl Status {
    pub fn label(&self) -> String {
        match self {
            Status::Live { source } => format!("datos en vivo vía {source}"),
            Status::Estimate => "estimación offline".into(),
        }
    }
}

/// Resultado de un ciclo completo
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub speeds: SpeedMap,
    pub status: Status,
    pub label: String,
    pub advice: BTreeMap<String, BTreeMap<String, Advice>>,
    pub snapshot_ts_utc: String,
}

#[derive(Clone, Debug, Default)]
pub struct DataState {
    pub snapshot: Option<Snapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(vars: &[(&str, &str)]) -> AppCfg {
        let m: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppCfg::from_vars(|k| m.get(k).cloned())
    }

    #[test]
    fn defaults_without_vars() {
        let c = cfg(&[]);
        assert_eq!(c.bind, "0.0.0.0:8080");
        assert_eq!(c.relays.len(), 3);
        assert_eq!((c.fetch_timeout_s, c.t_refresh_s, c.tz_offset_h), (8, 60, 8));
    }

    #[test]
    fn vars_override_defaults() {
        let c = cfg(&[
            ("BIND", "127.0.0.1:9000"),
            ("URL_FEED", "http://feed/vd.xml.gz"),
            ("RELAYS", " https://a.io/?, ,https://b.io/raw?url= ,"),
            ("FETCH_TIMEOUT_S", "3"),
            ("T_REFRESH_S", "no-numero"),
            ("TZ_OFFSET_H", "-3"),
        ]);
        assert_eq!(c.bind, "127.0.0.1:9000");
        assert_eq!(c.url_feed, "http://feed/vd.xml.gz");
        assert_eq!(c.relays, vec!["https://a.io/?".to_string(), "https://b.io/raw?url=".into()]);
        assert_eq!(c.fetch_timeout_s, 3);
        assert_eq!(c.t_refresh_s, 60);
        assert_eq!(c.tz().unwrap(), FixedOffset::west_opt(3 * 3600).unwrap());
    }

    #[test]
    fn huge_tz_offset_is_an_error_not_a_panic() {
        assert!(cfg(&[("TZ_OFFSET_H", "2147483647")]).tz().is_err());
        assert!(cfg(&[("TZ_OFFSET_H", "30")]).tz().is_err());
        assert!(cfg(&[]).tz().is_ok());
    }
}
