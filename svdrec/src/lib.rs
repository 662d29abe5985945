// src/lib.rs
pub mod error;
pub mod config;

pub mod data {
    pub mod calibration;
    pub mod event;
    pub mod handle;
}

pub mod cluster {
    pub mod driver;
    pub mod io;
}

pub mod sim {
    pub mod generator;
}

pub use error::{RecError, Result};
pub use config::RecConfig;
