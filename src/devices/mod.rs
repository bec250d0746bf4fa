// Instruments driven by this crate.  Only the Tektronix TDS family for now.

pub mod tds;
