//! vd.rs
//!
//! Parser del feed de detectores vehiculares (VD) de la autopista
//!
//! - El feed llega como XML comprimido con gzip, pero algunos relays
//!   lo devuelven ya descomprimido: se prueba gzip -> XML y luego XML directo
//! - Cada `<Info>` se convierte en un `SensorRecord` con sus `<Lane>`
//! - El kilometraje viene en km; aquí se pasa a metros

use anyhow::{bail, Result};
use flate2::read::MultiGzDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::Read;

use crate::types::{LaneReading, SensorRecord};

const INFO: &[u8] = b"info";
const LANE: &[u8] = b"lane";

/// Resultado de la decodificación; ningún error sale de aquí
#[derive(Clone, Debug, PartialEq)]
pub enum DecodeOutcome {
    Decoded { records: Vec<SensorRecord>, compressed: bool },
    Failed,
}

pub fn decode_feed(payload: &[u8]) -> DecodeOutcome {
    if let Some(xml) = gunzip(payload) {
        if let Ok(records) = parse_vd_xml(&xml) {
            return DecodeOutcome::Decoded { records, compressed: true };
        }
    }
    match parse_vd_xml(payload) {
        Ok(records) => DecodeOutcome::Decoded { records, compressed: false },
        Err(e) => {
            tracing::debug!("payload no es XML válido: {e:#}");
            DecodeOutcome::Failed
        }
    }
}

fn gunzip(payload: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    // el feed puede venir en varios miembros gzip concatenados
    MultiGzDecoder::new(payload).read_to_end(&mut out).ok()?;
    Some(out)
}

fn fix_num(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() { return None; }
    let v = if s.contains(',') && s.contains('.') { s.replace('.', "").replace(',', ".") } else { s.replace(',', ".") };
    v.parse::<f64>().ok().filter(|x| x.is_finite())
}

/// Parsea el documento. Falla si el XML está roto, cortado o sin ningún elemento.
pub fn parse_vd_xml(xml: &[u8]) -> Result<Vec<SensorRecord>> {
    let mut out = Vec::new();
    let mut r = Reader::from_reader(xml);
    r.trim_text(true);
    let mut buf = Vec::new();

    let mut seen_element = false;
    let mut depth = 0usize;
    let mut cur: Option<InfoTmp> = None;

    loop {
        match r.read_event_into(&mut buf)? {
            Event::Start(e) => {
                seen_element = true;
                depth += 1;
                let name = e.name().as_ref().to_ascii_lowercase();
                if name == INFO {
                    cur = Some(InfoTmp::from_attrs(&e));
                } else if name == LANE {
                    if let Some(info) = cur.as_mut() { info.push_lane(&e); }
                }
            }
            Event::Empty(e) => {
                seen_element = true;
                let name = e.name().as_ref().to_ascii_lowercase();
                if name == INFO {
                    // <Info .../> sin carriles
                    if let Some(rec) = InfoTmp::from_attrs(&e).finish() { out.push(rec); }
                } else if name == LANE {
                    if let Some(info) = cur.as_mut() { info.push_lane(&e); }
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if e.name().as_ref().eq_ignore_ascii_case(INFO) {
                    if let Some(rec) = cur.take().and_then(InfoTmp::finish) { out.push(rec); }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !seen_element { bail!("documento sin elementos"); }
    if depth != 0 || cur.is_some() { bail!("documento cortado ({depth} elementos sin cerrar)"); }
    Ok(out)
}

/// Atributos como (clave en minúsculas, valor). `None` si alguno está roto
/// (duplicado, entidad desconocida...).
fn attrs(e: &BytesStart) -> Option<Vec<(Vec<u8>, String)>> {
    e.attributes()
        .map(|a| {
            let a = a.ok()?;
            let val = a.unescape_value().ok()?.trim().to_string();
            Some((a.key.as_ref().to_ascii_lowercase(), val))
        })
        .collect()
}

#[derive(Default)]
struct InfoTmp {
    road_id: Option<String>,
    start_km: Option<f64>,
    direction: String,
    lanes: Vec<LaneReading>,
    /// algún atributo ilegible: el registro entero se descarta
    broken: bool,
}

impl InfoTmp {
    fn from_attrs(e: &BytesStart) -> Self {
        let mut t = InfoTmp::default();
        let Some(kv) = attrs(e) else {
            t.broken = true;
            return t;
        };
        for (k, val) in kv {
            match k.as_slice() {
                b"roadid" => t.road_id = Some(val),
                b"startkm" => t.start_km = fix_num(&val),
                b"direction" => t.direction = val,
                _ => {}
            }
        }
        t
    }

    fn push_lane(&mut self, e: &BytesStart) {
        let Some(kv) = attrs(e) else {
            self.broken = true;
            return;
        };
        let mut lane = LaneReading { lane_id: String::new(), speed: 0.0 };
        for (k, val) in kv {
            match k.as_slice() {
                b"laneid" => lane.lane_id = val,
                b"speed" => lane.speed = fix_num(&val).unwrap_or(0.0),
                _ => {}
            }
        }
        self.lanes.push(lane);
    }

    fn finish(self) -> Option<SensorRecord> {
        if self.broken {
            tracing::debug!("registro VD descartado por atributos ilegibles");
            return None;
        }
        let (road_id, km) = (self.road_id?, self.start_km?);
        Some(SensorRecord { road_id, start_m: km * 1000.0, direction: self.direction, lanes: self.lanes })
    }
}
