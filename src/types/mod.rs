pub mod constants;
pub mod error;
pub mod protocol;

pub use constants::*;
pub use error::{CentrifugeError, Result};
pub use protocol::{ClientInfo, Publication};
