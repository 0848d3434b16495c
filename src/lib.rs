pub mod alerts;
pub mod calendar;
pub mod error;
pub mod history;
pub mod loader;
pub mod model;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod pivot;
pub mod publish;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
