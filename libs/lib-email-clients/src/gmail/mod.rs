pub mod api_quota;
pub mod deep_link;
