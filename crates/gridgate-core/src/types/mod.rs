mod domain;
mod record;
mod routing;
mod tunnel;
mod workload;

pub use domain::*;
pub use record::*;
pub use routing::*;
pub use tunnel::*;
pub use workload::*;
