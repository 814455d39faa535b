pub mod auth;
pub mod client;
pub mod digest_mailer;
pub mod digest_message;
pub mod email_template;
pub mod fetch;
