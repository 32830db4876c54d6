//! segmentos.rs
//!
//! Agregación de velocidades por tramo, sentido y grupo de carril
//!
//! - Filtra los registros VD de la vía objetivo y los clasifica por tramo
//!   según su kilometraje (en metros)
//! - Descarta lecturas con velocidad <= 0 (carril cerrado o sin dato)
//! - Promedio truncado a entero; 0 = sin muestras
//! - Un resultado con todos los promedios a 0 se considera degenerado

use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::data::vd::{decode_feed, DecodeOutcome};
use crate::types::{DirectionAverage, LaneGroup, SegmentResult, SensorRecord, SpeedMap, TunnelCfg};

/// Por encima de esto la lectura es sospechosa; solo se registra
const SPEED_SUSPECT_KMH: f64 = 130.0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("payload ilegible (ni gzip+XML ni XML)")]
    Undecodable,
    #[error("todos los promedios son 0")]
    Degenerate,
}

pub struct SegmentAggregator {
    cfg: TunnelCfg,
}

impl SegmentAggregator {
    pub fn new(cfg: TunnelCfg) -> Self { Self { cfg } }

    pub fn cfg(&self) -> &TunnelCfg { &self.cfg }

    /// Bytes crudos -> promedios validados
    pub fn aggregate(&self, payload: &[u8]) -> Result<SpeedMap, AggregateError> {
        let records = match decode_feed(payload) {
            DecodeOutcome::Decoded { records, compressed } => {
                debug!("feed decodificado: {} registros (gzip={compressed})", records.len());
                records
            }
            DecodeOutcome::Failed => return Err(AggregateError::Undecodable),
        };
        let out = self.aggregate_records(&records);
        if is_degenerate(&out) { return Err(AggregateError::Degenerate); }
        Ok(out)
    }

    /// Sin validación: siempre cubre todos los tramos y sentidos configurados
    pub fn aggregate_records(&self, records: &[SensorRecord]) -> SpeedMap {
        let mut samples: HashMap<(&str, &str, LaneGroup), Vec<f64>> = HashMap::new();

        for rec in records.iter().filter(|r| r.road_id == self.cfg.road_id) {
            let Some(seg) = self.segment_for(rec.start_m) else { continue };
            let Some(dir) = self.cfg.directions.iter().find(|d| **d == rec.direction) else { continue };
            for lane in &rec.lanes {
                if !(lane.speed > 0.0) { continue; }
                let Some(group) = self.cfg.lanes.get(&lane.lane_id) else { continue };
                if lane.speed > SPEED_SUSPECT_KMH {
                    debug!("velocidad sospechosa {} km/h en {seg}/{dir} carril {}", lane.speed, lane.lane_id);
                }
                samples.entry((seg, dir.as_str(), *group)).or_default().push(lane.speed);
            }
        }

        let mut out = SpeedMap::new();
        for (name, _) in &self.cfg.segments {
            let mut res = SegmentResult::new();
            for dir in &self.cfg.directions {
                let avg = |g: LaneGroup| samples.get(&(name.as_str(), dir.as_str(), g)).map_or(0, |v| mean_floor(v));
                res.insert(dir.clone(), DirectionAverage { inner: avg(LaneGroup::Inner), outer: avg(LaneGroup::Outer) });
            }
            out.insert(name.clone(), res);
        }
        out
    }

    fn segment_for(&self, m: f64) -> Option<&str> {
        self.cfg.segments.iter().find(|(_, r)| r.contains(m)).map(|(n, _)| n.as_str())
    }
}

/// floor(sum/count); 0 si no hay muestras
pub fn mean_floor(v: &[f64]) -> u32 {
    if v.is_empty() { return 0; }
    let sum: f64 = v.iter().sum();
    (sum / v.len() as f64).floor() as u32
}

pub fn is_degenerate(m: &SpeedMap) -> bool {
    m.values().flat_map(|s| s.values()).all(DirectionAverage::is_zero)
}
