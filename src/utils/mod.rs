pub mod code_generator;
pub mod currency;
pub mod email;
pub mod jwt;
pub mod password;

pub use code_generator::*;
pub use currency::*;
pub use email::*;
pub use jwt::*;
pub use password::*;
