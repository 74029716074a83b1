pub mod common;
pub mod loyalty;
pub mod order;
pub mod outbox;
pub mod pagination;
pub mod product;
pub mod return_request;
pub mod user;
pub mod voucher;

pub use common::*;
pub use loyalty::*;
pub use order::*;
pub use outbox::*;
pub use pagination::*;
pub use product::*;
pub use return_request::*;
pub use user::*;
pub use voucher::*;
