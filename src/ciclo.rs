//! ciclo.rs
//!
//! Un ciclo de refresco completo:
//! fuentes en orden -> decodificar y agregar -> si nada sirve, estimación
//!
//! Un payload degenerado o ilegible cuenta como fallo de esa fuente,
//! igual que un timeout. Nunca devuelve error.

use chrono::{FixedOffset, NaiveDateTime, SecondsFormat, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::{info, warn};

use crate::estimador::estimate;
use crate::fetch::{first_success, Source, Transport};
use crate::recomendacion::advise_all;
use crate::segmentos::SegmentAggregator;
use crate::types::{Snapshot, SpeedMap, Status};

pub struct Monitor<T: Transport> {
    transport: T,
    sources: Vec<Source>,
    aggregator: SegmentAggregator,
    tz: FixedOffset,
}

impl<T: Transport> Monitor<T> {
    pub fn new(transport: T, sources: Vec<Source>, aggregator: SegmentAggregator, tz: FixedOffset) -> Self {
        Self { transport, sources, aggregator, tz }
    }

    /// Punto de entrada para el consumidor: sin argumentos, siempre hay resultado.
    pub async fn run_cycle(&self) -> Snapshot {
        let now = Utc::now().with_timezone(&self.tz).naive_local();
        self.run_cycle_with(&now, &mut StdRng::from_entropy()).await
    }

    pub async fn run_cycle_with<R: Rng>(&self, now: &NaiveDateTime, rng: &mut R) -> Snapshot {
        let (speeds, status) = match self.fetch_live().await {
            Some((speeds, source)) => {
                info!("datos en vivo desde {source}");
                (speeds, Status::Live { source })
            }
            None => {
                warn!("ninguna fuente utilizable; usando estimación");
                (estimate(self.aggregator.cfg(), now, rng), Status::Estimate)
            }
        };
        Snapshot {
            advice: advise_all(&speeds),
            label: status.label(),
            speeds,
            status,
            snapshot_ts_utc: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    // No pasa por `acquire`: allí gana cualquier 200, aquí la fuente también
    // tiene que dar datos decodificables y no degenerados para ganar.
    async fn fetch_live(&self) -> Option<(SpeedMap, String)> {
        let (transport, aggregator) = (&self.transport, &self.aggregator);
        let (speeds, s) = first_success(&self.sources, |s| async move {
            let payload = transport.get(&s.url).await?;
            Ok::<_, anyhow::Error>(aggregator.aggregate(&payload)?)
        })
        .await?;
        Some((speeds, s.label.clone()))
    }
}
