use anyhow::Result;
use reqwest::Client;
use std::{sync::Arc, time::Duration};
use tokio::{signal, sync::RwLock, time::sleep};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tunelvel::ciclo::Monitor;
use tunelvel::fetch::{sources_for, HttpTransport};
use tunelvel::segmentos::SegmentAggregator;
use tunelvel::types::{AppCfg, DataState, TunnelCfg};
use tunelvel::api;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[tokio::main]
async fn main() -> Result<()> {
    // Logs: RUST_LOG manda si está; si no, info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let app_cfg = AppCfg::from_env();
    let tz = app_cfg.tz()?;

    // HTTP client con compresión; el timeout va por petición
    let client = Client::builder().user_agent(USER_AGENT).brotli(true).gzip(true).deflate(true).build()?;
    let transport = HttpTransport::new(client, Duration::from_secs(app_cfg.fetch_timeout_s));
    let sources = sources_for(&app_cfg.url_feed, &app_cfg.relays);
    info!("fuentes: {}", sources.iter().map(|s| s.label.as_str()).collect::<Vec<_>>().join(" -> "));

    let monitor = Arc::new(Monitor::new(transport, sources, SegmentAggregator::new(TunnelCfg::default()), tz));
    let data = Arc::new(RwLock::new(DataState::default()));

    {
        let data_c = data.clone(); let cfg_c = app_cfg.clone();
        tokio::spawn(async move { refresh_loop(monitor, data_c, cfg_c).await; });
    }

    // API
    let app = api::router(api::ApiState { data: data.clone() });
    info!("Escuchando en http://{}", app_cfg.bind);
    let listener = tokio::net::TcpListener::bind(&app_cfg.bind).await?;
    let serve = axum::serve(listener, app);
    tokio::select! {
        r = serve => { r?; },
        _ = signal::ctrl_c() => { info!("Señal de salida recibida"); }
    }

    Ok(())
}

async fn refresh_loop(monitor: Arc<Monitor<HttpTransport>>, data: Arc<RwLock<DataState>>, cfg: AppCfg) {
    loop {
        let snap = monitor.run_cycle().await;
        info!("ciclo OK: {}", snap.label);
        data.write().await.snapshot = Some(snap);
        sleep(Duration::from_secs(cfg.t_refresh_s)).await;
    }
}
