pub mod vd;
