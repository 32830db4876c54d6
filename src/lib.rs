pub mod api;
pub mod ciclo;
pub mod data;
pub mod estimador;
pub mod fetch;
pub mod recomendacion;
pub mod segmentos;
pub mod types;
