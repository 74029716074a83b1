pub mod admin;
pub mod auth;
pub mod loyalty;
pub mod order;
pub mod product;
pub mod return_request;
pub mod user;
pub mod voucher;

pub use admin::admin_config;
pub use auth::auth_config;
pub use loyalty::loyalty_config;
pub use order::order_config;
pub use product::product_config;
pub use return_request::return_config;
pub use user::user_config;
pub use voucher::voucher_config;
