//! ferrodock-ranker — turns docking logs into ranked pose selections.
//!
//! 1. Parse the results table of every docking log (`dlg`)
//! 2. Persist all records as one tab-separated table (`table`)
//! 3. Pick the K best and worst scores (`rank`)
//! 4. Cut the matching poses out of the multi-model pose files
//!    (`model_block`, `select`)

pub mod table;
pub mod dlg;
pub mod rank;
pub mod model_block;
pub mod select;
pub mod stage;

pub use dlg::{collect_directory, parse_log, LogParse, RowOutcome};
pub use rank::{rank, Direction, RankedSelection};
pub use table::ScoredRecord;
