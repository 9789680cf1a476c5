//! Build-time formats of apppack: TAR, gzip, AR and Debian packages, asset bundles and
//! single-executable containers.

pub mod ar;
pub mod bundle;
pub mod config;
pub mod container;
pub mod deb;
pub mod entry;
pub mod error;
pub mod gzip;
pub mod output;
pub mod tar;

pub use error::{PackError, PackResult};
