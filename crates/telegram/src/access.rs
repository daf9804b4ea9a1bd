use crate::config::TelegramConfig;

/// Determine if a command from a chat should be processed.
///
/// A chat passes when the allowlist is empty, or when it names the chat ID,
/// the sender's user ID or the sender's username. Usernames match
/// case-insensitively, with or without a leading `@`.
pub fn check_access(
    config: &TelegramConfig,
    chat_id: &str,
    sender_id: Option<&str>,
    username: Option<&str>,
) -> Result<(), AccessDenied> {
    if config.allowlist.is_empty() {
        return Ok(());
    }
    let allowed = config.allowlist.iter().any(|entry| {
        let entry = entry.trim().trim_start_matches('@');
        entry == chat_id
            || sender_id.is_some_and(|id| entry == id)
            || username.is_some_and(|u| entry.eq_ignore_ascii_case(u.trim_start_matches('@')))
    });
    if allowed {
        Ok(())
    } else {
        Err(AccessDenied::NotOnAllowlist)
    }
}

/// Reason a command was ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDenied {
    NotOnAllowlist,
}

impl std::fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotOnAllowlist => write!(f, "chat not on allowlist"),
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn cfg(allowlist: &[&str]) -> TelegramConfig {
        TelegramConfig {
            allowlist: allowlist.iter().map(|s| (*s).to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_allowlist_is_open() {
        assert!(check_access(&cfg(&[]), "42", None, None).is_ok());
    }

    #[rstest]
    #[case("42", None, None)]
    #[case("-100", Some("1001"), None)]
    #[case("-100", Some("7"), Some("Alice"))]
    #[case("-100", None, Some("@alice"))]
    fn allowlisted_chats_pass(
        #[case] chat_id: &str,
        #[case] sender_id: Option<&str>,
        #[case] username: Option<&str>,
    ) {
        let c = cfg(&["42", "1001", "@alice"]);
        assert!(check_access(&c, chat_id, sender_id, username).is_ok());
    }

    #[test]
    fn other_chats_are_denied() {
        let c = cfg(&["42", "alice"]);
        assert_eq!(
            check_access(&c, "43", Some("1001"), Some("bob")),
            Err(AccessDenied::NotOnAllowlist)
        );
        assert_eq!(
            check_access(&c, "43", None, None),
            Err(AccessDenied::NotOnAllowlist)
        );
    }
}
