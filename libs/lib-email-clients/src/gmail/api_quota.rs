//! Gmail API quota units per method.
//! https://developers.google.com/gmail/api/reference/quota

/// Per-user quota units available each second.
pub const GMAIL_QUOTA_PER_SECOND: usize = 250;

pub struct GmailApiQuota {
    pub messages_list: usize,
    pub messages_get: usize,
    pub messages_send: usize,
    pub get_profile: usize,
}

pub const GMAIL_API_QUOTA: GmailApiQuota = GmailApiQuota {
    messages_list: 5,
    messages_get: 5,
    messages_send: 100,
    get_profile: 1,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_fits_in_one_second_of_quota() {
        assert!(GMAIL_API_QUOTA.messages_send <= GMAIL_QUOTA_PER_SECOND);
        assert!(GMAIL_API_QUOTA.messages_get <= GMAIL_QUOTA_PER_SECOND);
    }
}
