//! ferrodock-molecules — stages that drive the external structural-biology
//! tools.
//!
//! 1. Homology modelling and alignment preparation (`modeller`, `alignment`)
//! 2. Structure repair (`repair`)
//! 3. Receptor preparation (`receptor`)
//! 4. Affinity-map generation (`affinity`)
//! 5. Cross-product docking (`docking`)
//! 6. Chemical format conversion (`convert`)

pub mod stage;
pub mod alignment;
pub mod modeller;
pub mod repair;
pub mod receptor;
pub mod affinity;
pub mod docking;
pub mod convert;
pub mod pipeline;

pub use ferrodock_common::error::Result;
