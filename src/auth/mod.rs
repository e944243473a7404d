pub mod flash;
pub mod handlers;
pub mod local;
pub mod oauth;
pub mod password;
pub mod session;
pub mod validation;
