// External data representation, a protocol for serializing data to be sent over the network
pub mod xdr;

// Remote procedure call, a protocol build on top of XDR to provide something like C-style function calls over the network
pub mod rpc;

// A protocol using RPC that's meant to communicate with instruments like oscilloscopes, power supplies, waveform generators, etc
pub mod vxi11;

// What the instrument drivers need from a transport: commands out, text and binary blocks back
pub mod link;

pub mod error;

// Instrument drivers built on a Link
pub mod devices;

pub use error::{Error, Result, Stage};
pub use link::{ElementType, Endianness, Link, ResourceAddress};
