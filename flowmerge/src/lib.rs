/*!
# Flow merger

Reads the flow exports of every collector of a network, removes the
records that are observations of the same physical flow by several
collectors, and writes one merged flow dataset.

See [`flowmerge_core`] for the matching rules.
*/

mod config;
pub mod emit;
pub mod input;
mod run;

pub use self::{
    config::{ConfigError, RunConfig},
    run::{RunOptions, RunSummary, run},
};
