pub mod admin_service;
pub mod auth_service;
pub mod loyalty_service;
pub mod order_service;
pub mod outbox_service;
pub mod product_service;
pub mod return_service;
pub mod user_service;
pub mod voucher_service;

pub use admin_service::AdminService;
pub use auth_service::AuthService;
pub use loyalty_service::LoyaltyService;
pub use order_service::OrderService;
pub use outbox_service::OutboxService;
pub use product_service::ProductService;
pub use return_service::ReturnService;
pub use user_service::UserService;
pub use voucher_service::VoucherService;
