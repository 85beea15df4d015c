pub mod checkpoint;
pub mod lenet;
pub mod mlp;
pub mod mnist;
pub mod model;
pub mod ptb;
pub mod schedule;
pub mod train;
pub mod utils;

pub mod prelude {
    pub use crate::checkpoint::Checkpointer;
    pub use crate::lenet::{LeNet, LeNetConfig};
    pub use crate::mlp::{Mlp, MlpConfig};
    pub use crate::model::ModelConfigExt;
    pub use crate::ptb::{PtbConfig, PtbModel, PtbModelConfig, PtbState};
    pub use crate::schedule::LrSchedule;
}
