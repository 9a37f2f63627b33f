//! Plain data shared by every JoyNet crate. Nothing in here performs I/O.
#![forbid(unsafe_code)]

pub mod prelude {
    pub use crate::chat::*;
    pub use crate::errors::ChatError;
    pub use crate::ice::*;
    pub use crate::proto::*;
    pub use crate::user::*;
}

pub mod chat;
pub mod errors;
pub mod ice;
pub mod proto;
pub mod user;
