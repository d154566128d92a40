//! Composes the ordered message list sent to the inference backend. Pure, no I/O.

use crate::domain::{Message, MessageRole, Turn};

/// Builds the ordered message list sent to the inference backend:
/// `[system?] ++ dialog ++ [new user turn]`.
///
/// The system message is omitted entirely when `system_prompt` is empty.
pub fn compose(system_prompt: &str, dialog: &[Turn], new_user_turn: &str) -> Vec<Message> {
    let mut out = Vec::with_capacity(dialog.len() + 2);

    if !system_prompt.is_empty() {
        out.push(Message {
            role: MessageRole::System,
            content: system_prompt.to_string(),
        });
    }

    for turn in dialog {
        let role = match turn.role {
            crate::domain::Role::User => MessageRole::User,
            crate::domain::Role::Assistant => MessageRole::Assistant,
        };
        out.push(Message {
            role,
            content: turn.content.clone(),
        });
    }

    out.push(Message {
        role: MessageRole::User,
        content: new_user_turn.to_string(),
    });

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;

    #[test]
    fn omits_system_message_when_empty() {
        let messages = compose("", &[], "hello");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, MessageRole::User);
    }

    #[test]
    fn prepends_system_and_appends_new_turn() {
        let dialog = vec![Turn::user("hi"), Turn::assistant("yo")];
        let messages = compose("SYS", &dialog, "again");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[0].content, "SYS");
        assert_eq!(messages[1].role, MessageRole::User);
        assert_eq!(messages[2].role, MessageRole::Assistant);
        assert_eq!(messages[3].role, MessageRole::User);
        assert_eq!(messages[3].content, "again");
    }

    #[test]
    fn dialog_role_mapping_preserved() {
        let dialog = vec![Turn::user("a"), Turn::assistant("b")];
        let messages = compose("sys", &dialog, "c");
        assert_eq!(messages[1].role, MessageRole::User);
        assert_eq!(messages[2].role, MessageRole::Assistant);
        let _ = Role::User;
    }
}
