//! fetch.rs
//!
//! Descarga del feed VD con fallback por varias fuentes
//!
//! - La conexión directa va primero; luego los relays CORS públicos en orden
//! - Cada candidato se intenta una sola vez, con su propio timeout
//! - Gana el primero que responda 200; el resto de errores se registran y se saltan

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use reqwest::{Client, StatusCode, Url};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Forma de llegar al feed
#[derive(Clone, Debug, PartialEq)]
pub enum Candidate {
    Direct,
    /// `base?param=<feed codificado>`
    Query { base: String, param: String },
    /// `prefix<feed tal cual>`
    Prefix { prefix: String },
}

impl Candidate {
    /// Plantilla terminada en `=` -> relay por query; cualquier otra -> prefijo.
    pub fn from_template(t: &str) -> Result<Self> {
        let t = t.trim();
        if t.is_empty() { bail!("plantilla de relay vacía"); }
        if let Some(head) = t.strip_suffix('=') {
            if let Some((base, param)) = head.rsplit_once(['?', '&']) {
                if !param.is_empty() {
                    return Ok(Candidate::Query { base: base.to_string(), param: param.to_string() });
                }
            }
        }
        Ok(Candidate::Prefix { prefix: t.to_string() })
    }

    pub fn resolve(&self, feed: &str) -> Result<Source> {
        let (url, label) = match self {
            Candidate::Direct => (feed.to_string(), "directo".to_string()),
            Candidate::Query { base, param } => {
                let u = Url::parse_with_params(base, &[(param.as_str(), feed)])
                    .with_context(|| format!("relay inválido: {base}"))?;
                let label = u.host_str().unwrap_or(base).to_string();
                (u.to_string(), label)
            }
            Candidate::Prefix { prefix } => {
                let label = Url::parse(prefix)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string))
                    .unwrap_or_else(|| prefix.clone());
                (format!("{prefix}{feed}"), label)
            }
        };
        Ok(Source { url, label })
    }
}

/// Endpoint ya resuelto con su etiqueta para el status
#[derive(Clone, Debug, PartialEq)]
pub struct Source {
    pub url: String,
    pub label: String,
}

/// Lista ordenada de fuentes: directo + relays. Las plantillas rotas se descartan.
pub fn sources_for(feed: &str, relays: &[String]) -> Vec<Source> {
    let candidates = std::iter::once(Ok(Candidate::Direct))
        .chain(relays.iter().map(|t| Candidate::from_template(t).with_context(|| format!("relay '{t}'"))));
    let mut out = Vec::with_capacity(relays.len() + 1);
    for c in candidates {
        match c.and_then(|c| c.resolve(feed)) {
            Ok(s) => out.push(s),
            Err(e) => warn!("fuente ignorada: {e:#}"),
        }
    }
    out
}

/// Resultado de una adquisición
#[derive(Clone, Debug, PartialEq)]
pub enum FetchOutcome {
    Fetched { payload: Bytes, source: String },
    Exhausted,
}

/// Transporte HTTP intercambiable (en tests se sustituye por uno falso)
#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn get(&self, url: &str) -> Result<Bytes>;
}

pub struct HttpTransport {
    client: Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(client: Client, timeout: Duration) -> Self { Self { client, timeout } }
}

impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Bytes> {
        let resp = self.client.get(url).timeout(self.timeout).send().await?;
        match resp.status() {
            StatusCode::OK => Ok(resp.bytes().await?),
            s => bail!("HTTP {} en {}", s, url),
        }
    }
}

/// Recorre las fuentes en orden y devuelve el primer `Ok` junto a su fuente.
/// Los errores se registran y se pasa a la siguiente.
pub async fn first_success<'a, T, F, Fut>(sources: &'a [Source], mut attempt: F) -> Option<(T, &'a Source)>
where
    F: FnMut(&'a Source) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for s in sources {
        debug!("probando fuente {}", s.label);
        match attempt(s).await {
            Ok(v) => return Some((v, s)),
            Err(e) => warn!("fuente {} descartada: {e:#}", s.label),
        }
    }
    None
}

/// Adquisición pura: primer payload con 200, sin mirar su contenido.
pub async fn acquire<T: Transport>(transport: &T, sources: &[Source]) -> FetchOutcome {
    match first_success(sources, |s| transport.get(&s.url)).await {
        Some((payload, s)) => FetchOutcome::Fetched { payload, source: s.label.clone() },
        None => FetchOutcome::Exhausted,
    }
}
