//! DPI-evading network stack: TCP dial, ClientHello fragmentation, and the
//! fingerprinting TLS connector, plus the minimal HTTP/1.1 probe client.

pub mod connector;
pub mod fragment;
pub mod h1;
pub mod tcp;

pub use connector::{ConnectTimings, EvasiveConnector, EvasiveStream};
pub use fragment::{FragmentSettings, FragmentingStream};
