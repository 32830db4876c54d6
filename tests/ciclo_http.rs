//! Ciclo completo contra un servidor axum local: timeout, relays y fallback.
//!
//! cargo test --test ciclo_http

use axum::{extract::Query, http::StatusCode, response::IntoResponse, routing::get, Router};
use chrono::{FixedOffset, NaiveDate};
use flate2::{write::GzEncoder, Compression};
use rand::{rngs::StdRng, SeedableRng};
use reqwest::Client;
use std::{collections::HashMap, io::Write, time::Duration};

use tunelvel::ciclo::Monitor;
use tunelvel::fetch::{acquire, sources_for, FetchOutcome, HttpTransport, Source};
use tunelvel::segmentos::SegmentAggregator;
use tunelvel::recomendacion::Advice;
use tunelvel::types::{DirectionAverage, Status, TunnelCfg};

const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<XML_Head><Infos>
  <Info roadid="5" startkm="20.0" direction="N"><Lane laneid="1" speed="80"/><Lane laneid="2" speed="60"/></Info>
  <Info roadid="5" startkm="25.3" direction="S"><Lane laneid="1" speed="45"/><Lane laneid="2" speed="0"/></Info>
</Infos></XML_Head>"#;

fn gz(b: &[u8]) -> Vec<u8> {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(b).unwrap();
    enc.finish().unwrap()
}

async fn slow() -> impl IntoResponse {
    tokio::time::sleep(Duration::from_secs(3)).await;
    gz(FEED.as_bytes())
}

async fn relay(Query(q): Query<HashMap<String, String>>) -> impl IntoResponse {
    // el relay devuelve el XML ya descomprimido
    match q.get("url") {
        Some(u) if u.ends_with("/vd.xml.gz") => (StatusCode::OK, FEED.as_bytes().to_vec()),
        _ => (StatusCode::BAD_REQUEST, Vec::new()),
    }
}

async fn serve() -> String {
    let app = Router::new()
        .route("/vd.xml.gz", get(|| async { gz(FEED.as_bytes()) }))
        .route("/slow.xml.gz", get(slow))
        .route("/down", get(|| async { StatusCode::BAD_GATEWAY }))
        .route("/empty", get(|| async { "<XML_Head><Infos/></XML_Head>" }))
        .route("/relay", get(relay));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}")
}

fn transport() -> HttpTransport { HttpTransport::new(Client::new(), Duration::from_millis(300)) }

fn monitor(sources: Vec<Source>) -> Monitor<HttpTransport> {
    Monitor::new(transport(), sources, SegmentAggregator::new(TunnelCfg::default()), FixedOffset::east_opt(8 * 3600).unwrap())
}

fn src(url: String, label: &str) -> Source { Source { url, label: label.into() } }

#[tokio::test]
async fn timeout_then_direct_gzip() {
    let base = serve().await;
    let m = monitor(vec![src(format!("{base}/slow.xml.gz"), "lento"), src(format!("{base}/vd.xml.gz"), "bueno")]);
    let snap = m.run_cycle().await;
    assert_eq!(snap.status, Status::Live { source: "bueno".into() });
    assert_eq!(snap.speeds["雪山隧道"]["N"], DirectionAverage { inner: 80, outer: 60 });
    assert_eq!(snap.speeds["雪山隧道"]["S"], DirectionAverage { inner: 45, outer: 0 });
    assert_eq!(snap.advice["雪山隧道"]["N"], Advice::Inner);
    // el exterior sin lectura no cuenta como 0 km/h
    assert_eq!(snap.advice["雪山隧道"]["S"], Advice::Partial);
}

#[tokio::test]
async fn query_relay_after_direct_failure() {
    let base = serve().await;
    let feed = format!("{base}/vd.xml.gz");
    let mut sources = sources_for(&feed, &[format!("{base}/relay?url=")]);
    // la conexión directa "bloqueada"
    sources[0].url = format!("{base}/down");
    let snap = monitor(sources).run_cycle().await;
    assert_eq!(snap.status, Status::Live { source: "127.0.0.1".into() });
    assert_eq!(snap.speeds["雪山隧道"]["N"], DirectionAverage { inner: 80, outer: 60 });
}

#[tokio::test]
async fn acquire_takes_first_200_even_if_useless() {
    let base = serve().await;
    let out = acquire(&transport(), &[src(format!("{base}/down"), "caido"), src(format!("{base}/empty"), "vacio")]).await;
    match out {
        FetchOutcome::Fetched { source, .. } => assert_eq!(source, "vacio"),
        FetchOutcome::Exhausted => panic!("esperaba payload"),
    }
}

#[tokio::test]
async fn everything_down_gives_estimate() {
    let base = serve().await;
    let m = monitor(vec![
        src(format!("{base}/down"), "caido"),
        src(format!("{base}/empty"), "vacio"),
        src(format!("{base}/slow.xml.gz"), "lento"),
    ]);
    let now = NaiveDate::from_ymd_opt(2024, 5, 11).unwrap().and_hms_opt(3, 0, 0).unwrap();
    let snap = m.run_cycle_with(&now, &mut StdRng::seed_from_u64(5)).await;
    assert_eq!(snap.status, Status::Estimate);
    assert_eq!(snap.label, "estimación offline");
    for dir in ["N", "S"] {
        let a = snap.speeds["雪山隧道"][dir];
        assert!((20..=90).contains(&a.inner) && (20..=90).contains(&a.outer));
    }
}
